//! namesake - Author Name Disambiguation CLI
//!
//! Fits, applies, and scores two-stage disambiguation models over
//! signature datasets.
//!
//! # Pipeline
//!
//! ```text
//! Stage 1 (Pairwise) : classifier scores same-author probability per pair
//! Stage 2 (Cluster)  : agglomerative clustering cut at a fitted threshold
//! ```
//!
//! # Usage
//!
//! ```bash
//! # Fit a model on a labeled dataset
//! namesake fit --dataset train.json --out model.json
//!
//! # Cluster a dataset with a fitted model
//! namesake predict --dataset papers.json --model model.json --out clusters.json
//!
//! # Score predictions against gold clusters
//! namesake eval --dataset labeled.json --model model.json
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};

use namesake::cluster::fit_model;
use namesake::eval::{evaluate, EvalOptions};
use namesake::linkage::Linkage;
use namesake::modeler::ModelerConfig;
use namesake::{ClusterConfig, ClusterSeeds, Clusterer, Dataset, ModelState, SignatureStore};

// ============================================================================
// CLI Structure
// ============================================================================

/// Author Name Disambiguation CLI - fit, predict, and score clustering models
#[derive(Parser)]
#[command(name = "namesake")]
#[command(
    author,
    version,
    about = "Author name disambiguation - fit, predict, and score clustering models",
    long_about = r#"
namesake - author name disambiguation over signature blocks

PIPELINE:
  Stage 1 (Pairwise) : classifier scores same-author probability per pair
  Stage 2 (Cluster)  : agglomerative clustering cut at a fitted threshold

DATASETS:
  A dataset is a JSON object with "signatures" (the mentions), "blocks"
  (block id to member signature ids), optional "gold_clusters" (signature
  id to true author id, required for fit/eval), and optional "seeds"
  (pinned cluster assignments plus cannot-link pairs).

EXAMPLES:
  namesake fit --dataset train.json --out model.json --n-iter 50
  namesake predict --dataset papers.json --model model.json --out clusters.json
  namesake eval --dataset labeled.json --model model.json --json
"#
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a model on a labeled dataset
    #[command(visible_alias = "f")]
    Fit(FitArgs),

    /// Cluster a dataset with a fitted model
    #[command(visible_alias = "p")]
    Predict(PredictArgs),

    /// Score model predictions against gold clusters
    #[command(visible_alias = "e")]
    Eval(EvalArgs),
}

// ============================================================================
// Command Arguments
// ============================================================================

#[derive(Parser)]
struct FitArgs {
    /// Labeled dataset JSON (signatures, blocks, gold_clusters)
    #[arg(short, long, value_name = "PATH")]
    dataset: String,

    /// Where to write the fitted model JSON
    #[arg(short, long, value_name = "PATH")]
    out: String,

    /// Trial budget for classifier and threshold search
    #[arg(long, default_value = "25", value_name = "N")]
    n_iter: usize,

    /// Worker threads (0 = all cores)
    #[arg(long, default_value = "0", value_name = "N")]
    n_jobs: usize,

    /// Linkage rule: average, single, or complete
    #[arg(long, default_value = "average", value_name = "RULE")]
    linkage: String,

    /// Print the full threshold trial curve
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser)]
struct PredictArgs {
    /// Dataset JSON to cluster
    #[arg(short, long, value_name = "PATH")]
    dataset: String,

    /// Fitted model JSON from `namesake fit`
    #[arg(short, long, value_name = "PATH")]
    model: String,

    /// Where to write cluster assignments JSON
    #[arg(short, long, value_name = "PATH")]
    out: String,

    /// Worker threads (0 = all cores)
    #[arg(long, default_value = "0", value_name = "N")]
    n_jobs: usize,

    /// Suppress the summary line
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Parser)]
struct EvalArgs {
    /// Labeled dataset JSON to score against
    #[arg(short, long, value_name = "PATH")]
    dataset: String,

    /// Fitted model JSON from `namesake fit`
    #[arg(short, long, value_name = "PATH")]
    model: String,

    /// Worker threads (0 = all cores)
    #[arg(long, default_value = "0", value_name = "N")]
    n_jobs: usize,

    /// Emit metrics as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Include the per-signature B³ breakdown
    #[arg(long)]
    per_signature: bool,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result: Result<(), String> = match cli.command {
        Commands::Fit(args) => cmd_fit(args),
        Commands::Predict(args) => cmd_predict(args),
        Commands::Eval(args) => cmd_eval(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_fit(args: FitArgs) -> Result<(), String> {
    let linkage = Linkage::from_label(&args.linkage).ok_or_else(|| {
        format!(
            "unknown linkage '{}'; use average, single, or complete",
            args.linkage
        )
    })?;
    let (store, seeds) = load_dataset(&args.dataset)?;
    if !store.has_gold() {
        return Err(format!(
            "dataset '{}' has no gold clusters to fit against",
            args.dataset
        ));
    }

    let config = ClusterConfig::default()
        .with_linkage(linkage)
        .with_n_iter(args.n_iter)
        .with_n_jobs(args.n_jobs);
    let modeler = ModelerConfig::default().with_n_iter(args.n_iter);

    let start = Instant::now();
    let (state, report) =
        fit_model(&store, &seeds, config, modeler).map_err(|e| format!("fit failed: {e}"))?;
    let elapsed = start.elapsed();

    let json = state
        .to_json()
        .map_err(|e| format!("failed to serialize model: {e}"))?;
    fs::write(&args.out, json)
        .map_err(|e| format!("failed to write model '{}': {}", args.out, e))?;

    eprintln!(
        "fitted eps {:.3} (pairwise F1 {:.3}) over {} trials in {:.1}s; model written to {}",
        report.eps,
        report.f1,
        report.trials.len(),
        elapsed.as_secs_f64(),
        args.out
    );
    if args.verbose {
        for trial in &report.trials {
            eprintln!("  eps {:.3}  F1 {:.3}", trial.eps, trial.f1);
        }
    }
    Ok(())
}

fn cmd_predict(args: PredictArgs) -> Result<(), String> {
    let (store, seeds) = load_dataset(&args.dataset)?;
    let clusterer = load_model(&args.model, args.n_jobs)?;

    let start = Instant::now();
    let assignments = run_clusterer(&clusterer, &store, &seeds)?;
    let elapsed = start.elapsed();

    let json = serde_json::to_string_pretty(&assignments)
        .map_err(|e| format!("failed to serialize clusters: {e}"))?;
    fs::write(&args.out, json)
        .map_err(|e| format!("failed to write clusters '{}': {}", args.out, e))?;

    if !args.quiet {
        let signatures: usize = assignments.values().map(BTreeMap::len).sum();
        let clusters: BTreeSet<&str> = assignments
            .values()
            .flat_map(|a| a.values().map(String::as_str))
            .collect();
        eprintln!(
            "clustered {} signatures into {} clusters across {} blocks in {:.1}s; written to {}",
            signatures,
            clusters.len(),
            assignments.len(),
            elapsed.as_secs_f64(),
            args.out
        );
    }
    Ok(())
}

fn cmd_eval(args: EvalArgs) -> Result<(), String> {
    let (store, seeds) = load_dataset(&args.dataset)?;
    if !store.has_gold() {
        return Err(format!(
            "dataset '{}' has no gold clusters to score against",
            args.dataset
        ));
    }
    let clusterer = load_model(&args.model, args.n_jobs)?;
    let assignments = run_clusterer(&clusterer, &store, &seeds)?;

    let options = EvalOptions {
        per_signature: args.per_signature,
        ..EvalOptions::default()
    };
    let evaluation =
        evaluate(&assignments, &store, &options).map_err(|e| format!("evaluation failed: {e}"))?;

    if args.json {
        let json = serde_json::to_string_pretty(&evaluation)
            .map_err(|e| format!("failed to serialize metrics: {e}"))?;
        println!("{json}");
    } else {
        println!("{evaluation}");
        if args.per_signature {
            if let Some(per_signature) = &evaluation.per_signature {
                println!();
                for (sig_id, scores) in per_signature {
                    println!("  {sig_id}\t{scores}");
                }
            }
        }
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn load_dataset(path: &str) -> Result<(SignatureStore, ClusterSeeds), String> {
    let raw =
        fs::read_to_string(path).map_err(|e| format!("failed to read dataset '{path}': {e}"))?;
    let mut dataset: Dataset =
        serde_json::from_str(&raw).map_err(|e| format!("failed to parse dataset '{path}': {e}"))?;
    let seeds = dataset.seeds.take().unwrap_or_default();
    let store = dataset
        .into_store()
        .map_err(|e| format!("invalid dataset '{path}': {e}"))?;
    Ok((store, seeds))
}

fn load_model(path: &str, n_jobs: usize) -> Result<Clusterer, String> {
    let raw =
        fs::read_to_string(path).map_err(|e| format!("failed to read model '{path}': {e}"))?;
    let state =
        ModelState::from_json(&raw).map_err(|e| format!("failed to load model '{path}': {e}"))?;
    state
        .into_clusterer(ClusterConfig::default().with_n_jobs(n_jobs))
        .map_err(|e| format!("failed to restore model '{path}': {e}"))
}

/// Cluster every block, taking the seed-aware path when seeds are present.
fn run_clusterer(
    clusterer: &Clusterer,
    store: &SignatureStore,
    seeds: &ClusterSeeds,
) -> Result<BTreeMap<String, BTreeMap<String, String>>, String> {
    if seeds.is_empty() {
        let predictions = clusterer
            .predict(store, seeds)
            .map_err(|e| format!("prediction failed: {e}"))?;
        Ok(predictions
            .into_iter()
            .map(|(block, prediction)| (block, prediction.assignment))
            .collect())
    } else {
        clusterer
            .predict_seeded(store, seeds)
            .map_err(|e| format!("prediction failed: {e}"))
    }
}
