//! End-to-end tests for the namesake binary: fit, predict, eval.

use std::collections::BTreeMap;
use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use namesake::{ClusterSeeds, Dataset, Signature};

// =============================================================================
// Fixture
// =============================================================================

fn sig(
    id: &str,
    position: usize,
    tokens: &[&str],
    affiliation: &str,
    coauthors: &[&str],
) -> Signature {
    Signature::new(id, format!("paper-{id}"), position, tokens.join(" "))
        .with_name_tokens(tokens.iter().map(ToString::to_string).collect())
        .with_affiliations(vec![affiliation.to_string()])
        .with_coauthors(coauthors.iter().map(ToString::to_string).collect())
}

fn labeled_dataset() -> Dataset {
    let signatures = vec![
        sig("c1", 0, &["wei", "chen"], "pku", &["maria garcia"]),
        sig("c2", 1, &["wei", "chen"], "pku", &["maria garcia"]),
        sig("c3", 4, &["wen", "chen"], "nus", &[]),
        sig("g1", 0, &["maria", "garcia"], "uam", &["wei chen", "na li"]),
        sig("g2", 0, &["maria", "garcia"], "uam", &["wei chen", "soo kim"]),
        sig("g3", 1, &["maria", "garcia"], "uam", &["na li"]),
        sig("g4", 2, &["miguel", "garcia"], "ufrj", &["ana santos"]),
        sig("g5", 3, &["miguel", "garcia"], "ufrj", &["ana santos"]),
    ];
    let mut blocks = BTreeMap::new();
    blocks.insert(
        "chen_w".to_string(),
        vec!["c1".to_string(), "c2".to_string(), "c3".to_string()],
    );
    blocks.insert(
        "garcia_m".to_string(),
        vec![
            "g1".to_string(),
            "g2".to_string(),
            "g3".to_string(),
            "g4".to_string(),
            "g5".to_string(),
        ],
    );
    let mut gold_clusters = BTreeMap::new();
    for (id, author) in [
        ("c1", "wei-chen"),
        ("c2", "wei-chen"),
        ("c3", "wen-chen"),
        ("g1", "maria-garcia"),
        ("g2", "maria-garcia"),
        ("g3", "maria-garcia"),
        ("g4", "miguel-garcia"),
        ("g5", "miguel-garcia"),
    ] {
        gold_clusters.insert(id.to_string(), author.to_string());
    }
    Dataset {
        signatures,
        blocks,
        gold_clusters,
        seeds: None,
    }
}

fn write_json(dir: &TempDir, name: &str, value: &impl serde::Serialize) -> String {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_string_pretty(value).expect("serialize"))
        .expect("write fixture");
    path.to_string_lossy().to_string()
}

fn namesake() -> Command {
    Command::cargo_bin("namesake").expect("binary should build")
}

// =============================================================================
// Fit → Predict → Eval
// =============================================================================

#[test]
fn test_fit_predict_eval_round_trip() {
    let dir = tempfile::tempdir().expect("temp dir");
    let dataset = write_json(&dir, "dataset.json", &labeled_dataset());
    let model = dir.path().join("model.json");
    let clusters = dir.path().join("clusters.json");

    namesake()
        .args(["fit", "--dataset", &dataset, "--out", model.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("model written to"));

    namesake()
        .args([
            "predict",
            "--dataset",
            &dataset,
            "--model",
            model.to_str().unwrap(),
            "--out",
            clusters.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("clustered 8 signatures"));

    let raw = fs::read_to_string(&clusters).expect("read clusters");
    let assignments: BTreeMap<String, BTreeMap<String, String>> =
        serde_json::from_str(&raw).expect("clusters JSON");
    let garcia = &assignments["garcia_m"];
    assert_eq!(garcia["g1"], garcia["g2"]);
    assert_eq!(garcia["g1"], garcia["g3"]);
    assert_ne!(garcia["g1"], garcia["g4"]);

    let output = namesake()
        .args([
            "eval",
            "--dataset",
            &dataset,
            "--model",
            model.to_str().unwrap(),
            "--json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let metrics: serde_json::Value = serde_json::from_slice(&output).expect("metrics JSON");
    let f1 = metrics["pairwise"]["f1"].as_f64().expect("pairwise f1");
    assert!(f1 > 0.99, "expected near-perfect F1, got {f1}");
    assert_eq!(metrics["signatures_scored"], 8);
}

#[test]
fn test_predict_honors_dataset_seeds() {
    let dir = tempfile::tempdir().expect("temp dir");
    let train = write_json(&dir, "train.json", &labeled_dataset());
    let model = dir.path().join("model.json");

    namesake()
        .args(["fit", "--dataset", &train, "--out", model.to_str().unwrap()])
        .assert()
        .success();

    let mut seeded = labeled_dataset();
    let mut seeds = ClusterSeeds::new();
    seeds.add_require("g1", "author-maria");
    seeded.seeds = Some(seeds);
    let dataset = write_json(&dir, "seeded.json", &seeded);
    let clusters = dir.path().join("clusters.json");

    namesake()
        .args([
            "predict",
            "--dataset",
            &dataset,
            "--model",
            model.to_str().unwrap(),
            "--out",
            clusters.to_str().unwrap(),
        ])
        .assert()
        .success();

    let raw = fs::read_to_string(&clusters).expect("read clusters");
    let assignments: BTreeMap<String, BTreeMap<String, String>> =
        serde_json::from_str(&raw).expect("clusters JSON");
    let garcia = &assignments["garcia_m"];
    assert_eq!(garcia["g1"], "author-maria");
    assert_eq!(garcia["g2"], "author-maria");
    assert_ne!(garcia["g4"], "author-maria");
}

// =============================================================================
// Failure modes
// =============================================================================

#[test]
fn test_fit_requires_gold_clusters() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut dataset = labeled_dataset();
    dataset.gold_clusters.clear();
    let path = write_json(&dir, "unlabeled.json", &dataset);
    let model = dir.path().join("model.json");

    namesake()
        .args(["fit", "--dataset", &path, "--out", model.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no gold clusters"));
}

#[test]
fn test_fit_rejects_unknown_linkage() {
    let dir = tempfile::tempdir().expect("temp dir");
    let dataset = write_json(&dir, "dataset.json", &labeled_dataset());
    let model = dir.path().join("model.json");

    namesake()
        .args([
            "fit",
            "--dataset",
            &dataset,
            "--out",
            model.to_str().unwrap(),
            "--linkage",
            "ward",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown linkage"));
}

#[test]
fn test_predict_reports_missing_dataset() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("nope.json");
    let model = dir.path().join("model.json");

    namesake()
        .args([
            "predict",
            "--dataset",
            missing.to_str().unwrap(),
            "--model",
            model.to_str().unwrap(),
            "--out",
            dir.path().join("out.json").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read dataset"));
}
