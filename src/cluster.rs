//! Block clustering: fit, predict, and incremental placement.
//!
//! The [`Clusterer`] drives the whole pipeline per block: score pairs into a
//! distance matrix, build the dendrogram, cut at `eps`, and name the
//! resulting clusters. Blocks are independent, so prediction fans out over
//! the rayon pool and results are merged by block id. Fitting sweeps a
//! bounded grid of `eps` values against gold clusters and keeps the best
//! pairwise F1; the chosen threshold is the model state together with the
//! fitted classifier.
//!
//! Cluster seeds are honored in two ways. During scoring they act as hard
//! constraints; after the cut, every seeded signature is assigned its seed
//! cluster id outright, and unseeded members of a component adopt the
//! component's seed id when it has one. [`Clusterer::predict_incremental`]
//! places new signatures into an existing clustering without rebuilding the
//! full matrix; leftovers are re-clustered among themselves only.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::classifier::{
    BaselineFeaturizer, FeaturizedScorer, LinearPairClassifier, PairScorer, TrainParams,
};
use crate::constraints::{ConstraintConfig, ConstraintSet};
use crate::error::{Error, Result};
use crate::eval::{pairwise_counts, PairCounts, ORPHAN_CLUSTER_ID};
use crate::linkage::{dendrogram, Dendrogram, Linkage};
use crate::matrix::{build_distance_matrix, pair_distance, DistanceMatrix};
use crate::modeler::{labeled_pairs, ModelerConfig, PairwiseModeler};
use crate::signature::{Block, ClusterSeeds, SignatureStore};

/// Distance threshold used before any fit has run.
pub const DEFAULT_EPS: f64 = 0.5;
/// Default number of `eps` trials during fit.
pub const DEFAULT_EPS_TRIALS: usize = 25;

/// Clustering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Dendrogram cut threshold in `[0, 1]`.
    pub eps: f64,
    /// Inter-cluster distance rule.
    pub linkage: Linkage,
    /// Number of `eps` trials during fit.
    pub n_iter: usize,
    /// Worker count; 0 uses every core, 1 is sequential.
    pub n_jobs: usize,
    /// Which built-in constraints are active.
    pub constraints: ConstraintConfig,
    /// Gold cluster id excluded from fitting and evaluation.
    pub orphan_cluster_id: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            eps: DEFAULT_EPS,
            linkage: Linkage::default(),
            n_iter: DEFAULT_EPS_TRIALS,
            n_jobs: 0,
            constraints: ConstraintConfig::default(),
            orphan_cluster_id: ORPHAN_CLUSTER_ID.to_string(),
        }
    }
}

impl ClusterConfig {
    /// Set the cut threshold.
    #[must_use]
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// Set the linkage rule.
    #[must_use]
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    /// Set the fit trial budget.
    #[must_use]
    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    /// Set the worker count.
    #[must_use]
    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Set the constraint configuration.
    #[must_use]
    pub fn with_constraints(mut self, constraints: ConstraintConfig) -> Self {
        self.constraints = constraints;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.eps.is_finite() || !(0.0..=1.0).contains(&self.eps) {
            return Err(Error::invalid_parameter(
                "eps",
                format!("must be in [0, 1], got {}", self.eps),
            ));
        }
        if self.n_iter == 0 {
            return Err(Error::invalid_parameter("n_iter", "must be at least 1"));
        }
        Ok(())
    }
}

/// Prediction for one block: the assignment and the matrix behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockPrediction {
    /// Signature id to cluster id.
    pub assignment: BTreeMap<String, String>,
    /// Distance matrix in block signature order, kept for inspection.
    pub matrix: DistanceMatrix,
}

/// Predictions for a whole store, keyed by block id.
pub type Predictions = BTreeMap<String, BlockPrediction>;

/// One `eps` trial outcome during fit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EpsTrial {
    /// Threshold tried.
    pub eps: f64,
    /// Pairwise F1 across the fitting blocks at that threshold.
    pub f1: f64,
}

/// Fit outcome: the winning threshold and the full trial curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    /// Chosen threshold.
    pub eps: f64,
    /// Pairwise F1 at the chosen threshold.
    pub f1: f64,
    /// Every trial, in trial order.
    pub trials: Vec<EpsTrial>,
}

/// Persistable model state: fitted classifier plus clustering
/// hyperparameters.
///
/// Serialized as tagged JSON with a schema version; loading any other
/// version fails rather than guessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    schema_version: u32,
    /// Fitted cut threshold.
    pub eps: f64,
    /// Linkage rule the threshold was fitted with.
    pub linkage: Linkage,
    /// Fitted pairwise classifier.
    pub classifier: LinearPairClassifier,
    /// Classifier training parameters, kept for provenance.
    pub train_params: TrainParams,
}

impl ModelState {
    const SCHEMA_VERSION: u32 = 1;

    /// Bundle a fitted classifier with clustering hyperparameters.
    #[must_use]
    pub fn new(
        eps: f64,
        linkage: Linkage,
        classifier: LinearPairClassifier,
        train_params: TrainParams,
    ) -> Self {
        Self {
            schema_version: Self::SCHEMA_VERSION,
            eps,
            linkage,
            classifier,
            train_params,
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`] on encoder failure.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON, rejecting unknown schema versions.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`] on malformed JSON or a version mismatch.
    pub fn from_json(json: &str) -> Result<Self> {
        let state: Self = serde_json::from_str(json)?;
        if state.schema_version != Self::SCHEMA_VERSION {
            return Err(Error::serialization(format!(
                "unsupported model schema version {} (expected {})",
                state.schema_version,
                Self::SCHEMA_VERSION
            )));
        }
        Ok(state)
    }

    /// Rebuild a ready-to-predict clusterer from this state.
    ///
    /// The stored `eps` and linkage override whatever `config` carries.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the classifier does not match the
    /// baseline featurizer.
    pub fn into_clusterer(self, config: ClusterConfig) -> Result<Clusterer> {
        let scorer = FeaturizedScorer::new(BaselineFeaturizer, self.classifier)?;
        Ok(Clusterer::new(
            Box::new(scorer),
            config.with_eps(self.eps).with_linkage(self.linkage),
        ))
    }
}

/// Two-stage clusterer over a pairwise scorer.
pub struct Clusterer {
    scorer: Box<dyn PairScorer>,
    config: ClusterConfig,
}

impl Clusterer {
    /// Build from a scorer and configuration.
    #[must_use]
    pub fn new(scorer: Box<dyn PairScorer>, config: ClusterConfig) -> Self {
        Self { scorer, config }
    }

    /// Current cut threshold.
    #[must_use]
    pub fn eps(&self) -> f64 {
        self.config.eps
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Cluster every block in the store.
    ///
    /// Returns, per block, the assignment and the distance matrix. An empty
    /// block yields an empty assignment, not an error. Output is
    /// independent of worker scheduling.
    ///
    /// # Errors
    ///
    /// Configuration validation failures, unknown signature ids, and scorer
    /// failures.
    pub fn predict(&self, store: &SignatureStore, seeds: &ClusterSeeds) -> Result<Predictions> {
        self.config.validate()?;
        let constraints = ConstraintSet::standard(&self.config.constraints, seeds.clone());
        let blocks: Vec<&Block> = store.blocks().collect();
        let results: Vec<(String, BlockPrediction)> = self.run_pool(|| {
            blocks
                .par_iter()
                .map(|block| {
                    self.cluster_block(block, store, &constraints, seeds)
                        .map(|prediction| (block.id.clone(), prediction))
                })
                .collect::<Result<_>>()
        })?;
        log::debug!("predicted {} blocks", results.len());
        Ok(results.into_iter().collect())
    }

    /// Fit `eps` by sweeping `n_iter` thresholds against gold clusters.
    ///
    /// Matrices and dendrograms are built once per block; each trial only
    /// re-cuts them, scores pairwise F1 across all blocks, and the best
    /// trial wins with ties going to the lowest trial index. The winning
    /// threshold replaces `eps` in the configuration once every trial has
    /// finished.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyInput`] when the store has no gold clusters;
    /// validation, scoring, and matrix failures propagate.
    pub fn fit(&mut self, store: &SignatureStore, seeds: &ClusterSeeds) -> Result<FitReport> {
        self.config.validate()?;
        if !store.has_gold() {
            return Err(Error::empty_input("fit requires gold clusters"));
        }
        let constraints = ConstraintSet::standard(&self.config.constraints, seeds.clone());
        let blocks: Vec<&Block> = store.blocks().collect();

        // Shared precompute: one matrix and dendrogram per block, plus the
        // interned gold labels of its scorable signatures.
        struct Prepared {
            tree: Dendrogram,
            scored: Vec<usize>,
            gold: Vec<usize>,
        }
        let prepared: Vec<Prepared> = self.run_pool(|| {
            blocks
                .par_iter()
                .map(|block| {
                    let matrix =
                        build_distance_matrix(block, store, self.scorer.as_ref(), &constraints)?;
                    let tree = dendrogram(&matrix, self.config.linkage);
                    let mut scored = Vec::new();
                    let mut gold_ids = Vec::new();
                    for (index, sig_id) in block.signatures.iter().enumerate() {
                        if let Some(gold) = store.gold_cluster(sig_id) {
                            if gold != self.config.orphan_cluster_id {
                                scored.push(index);
                                gold_ids.push(gold);
                            }
                        }
                    }
                    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
                    let gold = gold_ids
                        .iter()
                        .map(|&g| {
                            let next = seen.len();
                            *seen.entry(g).or_insert(next)
                        })
                        .collect();
                    Ok(Prepared { tree, scored, gold })
                })
                .collect::<Result<_>>()
        })?;

        let grid = eps_grid(self.config.n_iter);
        let trials: Vec<EpsTrial> = self.run_pool(|| {
            grid.par_iter()
                .map(|&eps| {
                    let mut counts = PairCounts::default();
                    for block in &prepared {
                        let labels = block.tree.cut(eps);
                        let pred: Vec<usize> =
                            block.scored.iter().map(|&i| labels[i]).collect();
                        counts.absorb(pairwise_counts(&pred, &block.gold)?);
                    }
                    Ok(EpsTrial {
                        eps,
                        f1: counts.scores().f1,
                    })
                })
                .collect::<Result<_>>()
        })?;

        let mut best: Option<EpsTrial> = None;
        for trial in &trials {
            if !trial.f1.is_finite() {
                log::warn!("eps trial {:.3} produced non-finite F1, skipping", trial.eps);
                continue;
            }
            if best.map_or(true, |b| trial.f1 > b.f1) {
                best = Some(*trial);
            }
        }
        let Some(best) = best else {
            return Err(Error::search_failed(format!(
                "all {} eps trials failed",
                trials.len()
            )));
        };
        // Single mutation point, after every trial has been collected.
        self.config.eps = best.eps;
        log::info!(
            "fit: eps={:.3} with pairwise F1 {:.4} over {} trials",
            best.eps,
            best.f1,
            trials.len()
        );
        Ok(FitReport {
            eps: best.eps,
            f1: best.f1,
            trials,
        })
    }

    /// Place new signatures into an existing clustering.
    ///
    /// Each new signature joins the existing cluster with the smallest mean
    /// pair distance when that mean is within `eps`; distance ties go to
    /// the lowest cluster id. The rest form a residual set that is
    /// clustered among itself with the standard path and emitted under
    /// fresh cluster ids, never merged into the existing clusters. The
    /// returned map covers existing members (unchanged) and new signatures.
    ///
    /// # Errors
    ///
    /// Unknown signature ids and scorer failures; configuration validation
    /// failures.
    pub fn predict_incremental(
        &self,
        new_signatures: &[String],
        existing: &BTreeMap<String, Vec<String>>,
        store: &SignatureStore,
        seeds: &ClusterSeeds,
    ) -> Result<BTreeMap<String, String>> {
        self.config.validate()?;
        let constraints = ConstraintSet::standard(&self.config.constraints, seeds.clone());

        let mut assignment: BTreeMap<String, String> = BTreeMap::new();
        for (cluster_id, members) in existing {
            for member in members {
                store.signature(member)?;
                assignment.insert(member.clone(), cluster_id.clone());
            }
        }

        let placements: Vec<(String, Option<String>)> = self.run_pool(|| {
            new_signatures
                .par_iter()
                .map(|sig_id| {
                    let signature = store.signature(sig_id)?;
                    let mut nearest: Option<(&str, f64)> = None;
                    for (cluster_id, members) in existing {
                        if members.is_empty() {
                            continue;
                        }
                        let mut total = 0.0;
                        for member in members {
                            let other = store.signature(member)?;
                            total += pair_distance(
                                signature,
                                other,
                                self.scorer.as_ref(),
                                &constraints,
                            )?;
                        }
                        let mean = total / members.len() as f64;
                        if nearest.map_or(true, |(_, best)| mean < best) {
                            nearest = Some((cluster_id, mean));
                        }
                    }
                    let placed = nearest
                        .filter(|&(_, mean)| mean <= self.config.eps)
                        .map(|(cluster_id, _)| cluster_id.to_string());
                    Ok((sig_id.clone(), placed))
                })
                .collect::<Result<_>>()
        })?;

        let mut residual: Vec<String> = Vec::new();
        for (sig_id, placed) in placements {
            match placed {
                Some(cluster_id) => {
                    assignment.insert(sig_id, cluster_id);
                }
                None => residual.push(sig_id),
            }
        }

        if !residual.is_empty() {
            log::debug!("re-clustering {} residual signatures", residual.len());
            let block = Block::new("residual", residual);
            let matrix =
                build_distance_matrix(&block, store, self.scorer.as_ref(), &constraints)?;
            let labels = dendrogram(&matrix, self.config.linkage).cut(self.config.eps);
            let mut used: BTreeSet<&str> = existing.keys().map(String::as_str).collect();
            used.extend(seeds.require.values().map(String::as_str));
            let names = fresh_cluster_names(&labels, "new", &used);
            for (sig_id, label) in block.signatures.iter().zip(&labels) {
                assignment.insert(sig_id.clone(), names[*label].clone());
            }
        }

        // Seeded signatures always land in their designated cluster.
        for sig_id in new_signatures {
            if let Some(cluster) = seeds.seed_cluster(sig_id) {
                assignment.insert(sig_id.clone(), cluster.to_string());
            }
        }
        Ok(assignment)
    }

    /// Seed-aware serving entry point.
    ///
    /// Blocks containing seeded signatures start from the seed clusters and
    /// place every other signature incrementally; blocks without seeds take
    /// the standard predict path. Returns assignments only, since the
    /// incremental path never builds a full matrix.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Clusterer::predict`] and
    /// [`Clusterer::predict_incremental`].
    pub fn predict_seeded(
        &self,
        store: &SignatureStore,
        seeds: &ClusterSeeds,
    ) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
        self.config.validate()?;
        let constraints = ConstraintSet::standard(&self.config.constraints, seeds.clone());
        let mut results = BTreeMap::new();
        for block in store.blocks() {
            let mut seeded: BTreeMap<String, Vec<String>> = BTreeMap::new();
            let mut unseeded: Vec<String> = Vec::new();
            for sig_id in &block.signatures {
                match seeds.seed_cluster(sig_id) {
                    Some(cluster) => seeded
                        .entry(cluster.to_string())
                        .or_default()
                        .push(sig_id.clone()),
                    None => unseeded.push(sig_id.clone()),
                }
            }
            let assignment = if seeded.is_empty() {
                self.cluster_block(block, store, &constraints, seeds)?
                    .assignment
            } else {
                self.predict_incremental(&unseeded, &seeded, store, seeds)?
            };
            results.insert(block.id.clone(), assignment);
        }
        Ok(results)
    }

    fn cluster_block(
        &self,
        block: &Block,
        store: &SignatureStore,
        constraints: &ConstraintSet,
        seeds: &ClusterSeeds,
    ) -> Result<BlockPrediction> {
        let matrix = build_distance_matrix(block, store, self.scorer.as_ref(), constraints)?;
        let labels = dendrogram(&matrix, self.config.linkage).cut(self.config.eps);
        let assignment = assign_cluster_ids(block, &labels, seeds);
        Ok(BlockPrediction { assignment, matrix })
    }

    fn run_pool<T: Send>(&self, task: impl FnOnce() -> Result<T> + Send) -> Result<T> {
        if self.config.n_jobs == 0 {
            task()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.n_jobs)
                .build()
                .map_err(|e| {
                    Error::invalid_parameter("n_jobs", format!("worker pool failed: {e}"))
                })?;
            pool.install(task)
        }
    }
}

/// Name each component and map signatures to cluster ids.
///
/// Components adopt a member's seed cluster id when one exists (the lowest
/// id when the merge-distinct option allowed several into one component);
/// seeded signatures always receive exactly their own seed id. Components
/// without seeds get `{block_id}-{n}` names, skipping any id a seed
/// already claims.
fn assign_cluster_ids(
    block: &Block,
    labels: &[usize],
    seeds: &ClusterSeeds,
) -> BTreeMap<String, String> {
    let component_count = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut component_seed: Vec<Option<&str>> = vec![None; component_count];
    for (sig_id, &label) in block.signatures.iter().zip(labels) {
        if let Some(cluster) = seeds.seed_cluster(sig_id) {
            let slot = &mut component_seed[label];
            if slot.map_or(true, |current| cluster < current) {
                *slot = Some(cluster);
            }
        }
    }

    let used: BTreeSet<&str> = seeds.require.values().map(String::as_str).collect();
    let mut names: Vec<String> = Vec::with_capacity(component_count);
    let mut counter = 0usize;
    for seed in &component_seed {
        match seed {
            Some(cluster) => names.push((*cluster).to_string()),
            None => {
                let mut candidate = format!("{}-{}", block.id, counter);
                counter += 1;
                while used.contains(candidate.as_str()) {
                    candidate = format!("{}-{}", block.id, counter);
                    counter += 1;
                }
                names.push(candidate);
            }
        }
    }

    let mut assignment = BTreeMap::new();
    for (sig_id, &label) in block.signatures.iter().zip(labels) {
        let cluster = seeds
            .seed_cluster(sig_id)
            .map_or_else(|| names[label].clone(), ToString::to_string);
        assignment.insert(sig_id.clone(), cluster);
    }
    assignment
}

fn fresh_cluster_names(labels: &[usize], prefix: &str, used: &BTreeSet<&str>) -> Vec<String> {
    let component_count = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut names = Vec::with_capacity(component_count);
    let mut counter = 0usize;
    for _ in 0..component_count {
        let mut candidate = format!("{prefix}-{counter}");
        counter += 1;
        while used.contains(candidate.as_str()) {
            candidate = format!("{prefix}-{counter}");
            counter += 1;
        }
        names.push(candidate);
    }
    names
}

fn eps_grid(n_iter: usize) -> Vec<f64> {
    if n_iter == 1 {
        return vec![DEFAULT_EPS];
    }
    (0..n_iter)
        .map(|t| t as f64 / (n_iter - 1) as f64)
        .collect()
}

/// Fit the full pipeline: classifier search, then `eps` search.
///
/// Derives labeled pairs from the store's gold clusters, tunes the built-in
/// classifier with `modeler_config`, then fits the clustering threshold
/// with `config`. Returns the persistable state and the threshold curve.
///
/// # Errors
///
/// Propagates modeler and clusterer fit failures.
pub fn fit_model(
    store: &SignatureStore,
    seeds: &ClusterSeeds,
    config: ClusterConfig,
    modeler_config: ModelerConfig,
) -> Result<(ModelState, FitReport)> {
    let pairs = labeled_pairs(store, &BaselineFeaturizer, &config.orphan_cluster_id)?;
    let fitted = PairwiseModeler::new(modeler_config).fit(&pairs.train, &pairs.validation)?;
    let linkage = config.linkage;
    let scorer = FeaturizedScorer::new(BaselineFeaturizer, fitted.classifier.clone())?;
    let mut clusterer = Clusterer::new(Box::new(scorer), config);
    let report = clusterer.fit(store, seeds)?;
    let state = ModelState::new(report.eps, linkage, fitted.classifier, fitted.params);
    Ok((state, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TableScorer;
    use crate::signature::Signature;

    fn abc_store() -> SignatureStore {
        let signatures = vec![
            Signature::new("a", "p1", 0, "R. Vidal"),
            Signature::new("b", "p2", 0, "R. Vidal"),
            Signature::new("c", "p3", 0, "R. Vidal"),
        ];
        let block = Block::new("vidal_r", vec!["a".into(), "b".into(), "c".into()]);
        SignatureStore::build(signatures, vec![block]).unwrap()
    }

    fn abc_scorer() -> TableScorer {
        // Distances: (a,b)=0.1, (a,c)=0.9, (b,c)=0.5.
        TableScorer::new(0.5)
            .with_pair("a", "b", 0.9)
            .with_pair("a", "c", 0.1)
            .with_pair("b", "c", 0.5)
    }

    fn clusterer(eps: f64) -> Clusterer {
        Clusterer::new(
            Box::new(abc_scorer()),
            ClusterConfig::default().with_eps(eps),
        )
    }

    #[test]
    fn example_block_clusters_at_eps_03() {
        let store = abc_store();
        let predictions = clusterer(0.3).predict(&store, &ClusterSeeds::new()).unwrap();
        let assignment = &predictions["vidal_r"].assignment;
        assert_eq!(assignment["a"], assignment["b"]);
        assert_ne!(assignment["a"], assignment["c"]);
    }

    #[test]
    fn cannot_link_splits_the_close_pair() {
        let store = abc_store();
        let mut seeds = ClusterSeeds::new();
        seeds.add_disallow("a", "b");
        let predictions = clusterer(0.3).predict(&store, &seeds).unwrap();
        let assignment = &predictions["vidal_r"].assignment;
        assert_ne!(assignment["a"], assignment["b"]);
        assert_ne!(assignment["a"], assignment["c"]);
        assert_ne!(assignment["b"], assignment["c"]);
    }

    #[test]
    fn predict_is_idempotent_and_a_partition() {
        let store = abc_store();
        let c = clusterer(0.3);
        let first = c.predict(&store, &ClusterSeeds::new()).unwrap();
        let second = c.predict(&store, &ClusterSeeds::new()).unwrap();
        assert_eq!(first["vidal_r"].assignment, second["vidal_r"].assignment);
        let assignment = &first["vidal_r"].assignment;
        let block = store.block("vidal_r").unwrap();
        assert_eq!(assignment.len(), block.len());
        for sig_id in &block.signatures {
            assert!(assignment.contains_key(sig_id));
        }
    }

    #[test]
    fn empty_block_predicts_empty_assignment() {
        let store = SignatureStore::build(vec![], vec![Block::new("empty", vec![])]).unwrap();
        let predictions = clusterer(0.3).predict(&store, &ClusterSeeds::new()).unwrap();
        assert!(predictions["empty"].assignment.is_empty());
        assert!(predictions["empty"].matrix.is_empty());
    }

    #[test]
    fn seeded_signature_keeps_its_cluster_id() {
        let store = abc_store();
        let mut seeds = ClusterSeeds::new();
        seeds.add_require("a", "author-7");
        let predictions = clusterer(0.3).predict(&store, &seeds).unwrap();
        let assignment = &predictions["vidal_r"].assignment;
        assert_eq!(assignment["a"], "author-7");
        // b merges with a by distance, and the component adopts a's seed id.
        assert_eq!(assignment["b"], "author-7");
        assert_ne!(assignment["c"], "author-7");
    }

    #[test]
    fn invalid_eps_is_rejected() {
        let store = abc_store();
        let err = clusterer(1.5).predict(&store, &ClusterSeeds::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name, .. } if name == "eps"));
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let store = abc_store();
        let parallel = clusterer(0.3).predict(&store, &ClusterSeeds::new()).unwrap();
        let sequential = Clusterer::new(
            Box::new(abc_scorer()),
            ClusterConfig::default().with_eps(0.3).with_n_jobs(1),
        )
        .predict(&store, &ClusterSeeds::new())
        .unwrap();
        assert_eq!(
            parallel["vidal_r"].assignment,
            sequential["vidal_r"].assignment
        );
    }

    #[test]
    fn fit_finds_a_separating_eps() {
        let mut store = abc_store();
        store.set_gold("a", "g1");
        store.set_gold("b", "g1");
        store.set_gold("c", "g2");
        let mut c = clusterer(0.9);
        let report = c.fit(&store, &ClusterSeeds::new()).unwrap();
        assert_eq!(report.f1, 1.0);
        assert!(report.eps > 0.1 && report.eps < 0.7, "eps {}", report.eps);
        assert_eq!(c.eps(), report.eps);
        assert_eq!(report.trials.len(), DEFAULT_EPS_TRIALS);
    }

    #[test]
    fn fit_without_gold_is_an_error() {
        let store = abc_store();
        let err = clusterer(0.5).fit(&store, &ClusterSeeds::new()).unwrap_err();
        assert!(matches!(err, Error::EmptyInput(_)));
    }

    #[test]
    fn incremental_places_close_and_isolates_far() {
        let signatures = vec![
            Signature::new("a", "p1", 0, "R. Vidal"),
            Signature::new("b", "p2", 0, "R. Vidal"),
            Signature::new("c", "p3", 0, "R. Vidal"),
            Signature::new("d", "p4", 0, "R. Vidal"),
        ];
        let block = Block::new(
            "vidal_r",
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
        );
        let store = SignatureStore::build(signatures, vec![block]).unwrap();
        // c is near a and b; d is far from everything.
        let scorer = TableScorer::new(0.0)
            .with_pair("a", "c", 0.9)
            .with_pair("b", "c", 0.9);
        let c = Clusterer::new(Box::new(scorer), ClusterConfig::default().with_eps(0.3));
        let existing = BTreeMap::from([("k1".to_string(), vec!["a".to_string(), "b".to_string()])]);
        let assignment = c
            .predict_incremental(
                &["c".to_string(), "d".to_string()],
                &existing,
                &store,
                &ClusterSeeds::new(),
            )
            .unwrap();
        assert_eq!(assignment["a"], "k1");
        assert_eq!(assignment["b"], "k1");
        assert_eq!(assignment["c"], "k1");
        assert_ne!(assignment["d"], "k1");
        assert!(assignment["d"].starts_with("new-"));
    }

    #[test]
    fn residuals_never_rejoin_existing_clusters() {
        let signatures = vec![
            Signature::new("a", "p1", 0, "R. Vidal"),
            Signature::new("x", "p2", 0, "R. Vidal"),
            Signature::new("y", "p3", 0, "R. Vidal"),
        ];
        let block = Block::new("vidal_r", vec!["a".into(), "x".into(), "y".into()]);
        let store = SignatureStore::build(signatures, vec![block]).unwrap();
        // x and y are far from a but near each other.
        let scorer = TableScorer::new(0.1).with_pair("x", "y", 0.95);
        let c = Clusterer::new(Box::new(scorer), ClusterConfig::default().with_eps(0.3));
        let existing = BTreeMap::from([("k1".to_string(), vec!["a".to_string()])]);
        let assignment = c
            .predict_incremental(
                &["x".to_string(), "y".to_string()],
                &existing,
                &store,
                &ClusterSeeds::new(),
            )
            .unwrap();
        assert_ne!(assignment["x"], "k1");
        assert_eq!(assignment["x"], assignment["y"]);
    }

    #[test]
    fn seeded_serving_path_honors_seed_clusters() {
        let store = abc_store();
        let mut seeds = ClusterSeeds::new();
        seeds.add_require("a", "k-real");
        let c = clusterer(0.3);
        let results = c.predict_seeded(&store, &seeds).unwrap();
        let assignment = &results["vidal_r"];
        assert_eq!(assignment["a"], "k-real");
        // b sits at distance 0.1 from a, within eps of cluster k-real.
        assert_eq!(assignment["b"], "k-real");
        assert_ne!(assignment["c"], "k-real");
    }

    #[test]
    fn model_state_round_trip_preserves_predictions() {
        let signatures = vec![
            Signature::new("a", "p1", 0, "R. Vidal")
                .with_name_tokens(vec!["vidal".into(), "rebecca".into()])
                .with_affiliations(vec!["jhu".into()]),
            Signature::new("b", "p2", 0, "R. Vidal")
                .with_name_tokens(vec!["vidal".into(), "rebecca".into()])
                .with_affiliations(vec!["jhu".into()]),
            Signature::new("c", "p3", 0, "R. Vidal")
                .with_name_tokens(vec!["vidal".into(), "rafael".into()]),
        ];
        let block = Block::new("vidal_r", vec!["a".into(), "b".into(), "c".into()]);
        let mut store = SignatureStore::build(signatures, vec![block]).unwrap();
        store.set_gold("a", "g1");
        store.set_gold("b", "g1");
        store.set_gold("c", "g2");

        let (state, _) = fit_model(
            &store,
            &ClusterSeeds::new(),
            ClusterConfig::default(),
            ModelerConfig::default(),
        )
        .unwrap();
        let json = state.to_json().unwrap();
        let restored = ModelState::from_json(&json).unwrap();

        let before = state
            .into_clusterer(ClusterConfig::default())
            .unwrap()
            .predict(&store, &ClusterSeeds::new())
            .unwrap();
        let after = restored
            .into_clusterer(ClusterConfig::default())
            .unwrap()
            .predict(&store, &ClusterSeeds::new())
            .unwrap();
        assert_eq!(before["vidal_r"].assignment, after["vidal_r"].assignment);
    }

    #[test]
    fn model_state_rejects_foreign_schema() {
        let classifier =
            LinearPairClassifier::fit(&[(vec![1.0], true)], &TrainParams::default()).unwrap();
        let state = ModelState::new(0.4, Linkage::Average, classifier, TrainParams::default());
        let json = state.to_json().unwrap().replace(
            "\"schema_version\": 1",
            "\"schema_version\": 99",
        );
        assert!(ModelState::from_json(&json).is_err());
    }

    #[test]
    fn eps_grid_spans_the_unit_interval() {
        let grid = eps_grid(25);
        assert_eq!(grid.len(), 25);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[24], 1.0);
        assert_eq!(eps_grid(1), vec![DEFAULT_EPS]);
    }
}
