//! # namesake
//!
//! Author name disambiguation for scholarly corpora.
//!
//! A signature is one author-name mention on one paper. Signatures arrive
//! pre-grouped into blocks (same surname key), and namesake partitions each
//! block into author entities with a two-stage pipeline: a pairwise
//! classifier scores how likely two signatures are the same person, then
//! constrained agglomerative clustering cuts the resulting distances at a
//! threshold `eps`. Hard constraints (explicit seeds, shared identifiers,
//! curated-source record identity) override the classifier in either
//! direction, with "never merge" always beating "always merge".
//!
//! ## Pipeline
//!
//! | Stage | Entry point | Role |
//! |-------|-------------|------|
//! | scoring | [`PairScorer`](classifier::PairScorer) | same-author probability per pair |
//! | constraints | [`ConstraintSet`](constraints::ConstraintSet) | hard overrides, force-different dominant |
//! | matrix | [`build_distance_matrix`](matrix::build_distance_matrix) | symmetric `[0, 1]` distances per block |
//! | linkage | [`dendrogram`](linkage::dendrogram) | agglomerative merge history, cut at `eps` |
//! | clustering | [`Clusterer`] | per-block orchestration, fit and predict |
//! | evaluation | [`eval::evaluate`] | pairwise F1 and B³ against gold |
//!
//! Blocks never interact: prediction parallelizes across them and merges
//! results by block id, so output is identical regardless of worker count.
//!
//! ## Quick start
//!
//! ```rust
//! use namesake::prelude::*;
//!
//! // One block of three mentions; the scorer thinks a and b match.
//! let store = SignatureStore::build(
//!     vec![
//!         Signature::new("a", "p1", 0, "R. Vidal"),
//!         Signature::new("b", "p2", 0, "R. Vidal"),
//!         Signature::new("c", "p3", 0, "R. Vidal"),
//!     ],
//!     vec![Block::new("vidal_r", vec!["a".into(), "b".into(), "c".into()])],
//! )?;
//! let scorer = TableScorer::new(0.5)
//!     .with_pair("a", "b", 0.9)
//!     .with_pair("a", "c", 0.1);
//!
//! let clusterer = Clusterer::new(
//!     Box::new(scorer),
//!     ClusterConfig::default().with_eps(0.3),
//! );
//! let predictions = clusterer.predict(&store, &ClusterSeeds::new())?;
//!
//! let assignment = &predictions["vidal_r"].assignment;
//! assert_eq!(assignment["a"], assignment["b"]);
//! assert_ne!(assignment["a"], assignment["c"]);
//! # Ok::<(), namesake::Error>(())
//! ```
//!
//! ## Fitting
//!
//! [`fit_model`](cluster::fit_model) runs the whole training path: labeled
//! pairs from gold clusters, a bounded hyperparameter search for the
//! built-in classifier, then an `eps` sweep maximizing pairwise F1. The
//! result is a [`ModelState`] that serializes to versioned JSON and rebuilds
//! a ready-to-predict [`Clusterer`].
//!
//! ## Seeds and incremental updates
//!
//! [`ClusterSeeds`] pin signatures to fixed cluster ids and list forbidden
//! pairs. Seeded signatures always end up in their designated cluster.
//! [`Clusterer::predict_incremental`] places a handful of new signatures
//! into an existing clustering without rebuilding the full matrix,
//! re-clustering only the leftovers among themselves.

#![warn(missing_docs)]

pub mod classifier;
pub mod cluster;
pub mod constraints;
mod error;
pub mod eval;
pub mod linkage;
pub mod matrix;
pub mod modeler;
pub mod signature;

pub use cluster::{BlockPrediction, ClusterConfig, Clusterer, FitReport, ModelState, Predictions};
pub use error::{Error, Result};
pub use signature::{Block, ClusterSeeds, Dataset, Signature, SignatureStore};

/// Commonly used types in one import.
pub mod prelude {
    pub use crate::classifier::{
        BaselineFeaturizer, LinearPairClassifier, PairClassifier, PairFeaturizer, PairScorer,
        TableScorer,
    };
    pub use crate::cluster::{
        fit_model, BlockPrediction, ClusterConfig, Clusterer, FitReport, ModelState, Predictions,
    };
    pub use crate::constraints::{ConstraintConfig, ConstraintSet, PairConstraint, Verdict};
    pub use crate::error::{Error, Result};
    pub use crate::eval::{evaluate, ClusterEvaluation, ClusterScores, EvalOptions};
    pub use crate::linkage::Linkage;
    pub use crate::matrix::DistanceMatrix;
    pub use crate::modeler::{ModelerConfig, PairwiseModeler};
    pub use crate::signature::{Block, ClusterSeeds, Dataset, Signature, SignatureStore};
}
