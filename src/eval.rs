//! Clustering evaluation metrics.
//!
//! Two complementary views of a predicted partition against gold:
//!
//! | Metric | Focus | Key property |
//! |--------|-------|--------------|
//! | **Pairwise F1** | same-cluster pairs | what the `eps` search optimizes |
//! | **B³** | per-signature P/R | exposes which signatures suffer |
//!
//! Both are label-agnostic: cluster ids are opaque and only co-membership
//! matters. Pair counts are summed across blocks before the ratios are
//! taken (micro-average); B³ averages over signatures across all blocks.
//! Signatures whose gold cluster is the designated orphan cluster
//! (unknown true author) are excluded from both.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use namesake::eval::{pairwise_counts, PairCounts};
//!
//! // Gold says {0,1} and {2}; prediction agrees.
//! let counts = pairwise_counts(&[0, 0, 1], &[5, 5, 9]).unwrap();
//! assert_eq!(counts.true_positive, 1);
//! assert_eq!(counts.scores().f1, 1.0);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::signature::SignatureStore;

/// Default gold cluster id marking signatures with no known author.
pub const ORPHAN_CLUSTER_ID: &str = "orphans";

// =============================================================================
// Result types
// =============================================================================

/// Precision, recall, and their harmonic mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterScores {
    /// Precision.
    pub precision: f64,
    /// Recall.
    pub recall: f64,
    /// F1 score.
    pub f1: f64,
}

impl ClusterScores {
    /// Build from precision and recall; F1 is derived.
    #[must_use]
    pub fn new(precision: f64, recall: f64) -> Self {
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
        }
    }
}

impl std::fmt::Display for ClusterScores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "P={:.1}%  R={:.1}%  F1={:.1}%",
            self.precision * 100.0,
            self.recall * 100.0,
            self.f1 * 100.0
        )
    }
}

/// Same-cluster pair tallies, summable across blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCounts {
    /// Pairs predicted together that gold puts together.
    pub true_positive: usize,
    /// Pairs predicted together that gold splits.
    pub false_positive: usize,
    /// Pairs gold puts together that the prediction splits.
    pub false_negative: usize,
}

impl PairCounts {
    /// Add another block's tallies into this one.
    pub fn absorb(&mut self, other: PairCounts) {
        self.true_positive += other.true_positive;
        self.false_positive += other.false_positive;
        self.false_negative += other.false_negative;
    }

    /// Precision over predicted-together pairs; 0 when none were predicted.
    #[must_use]
    pub fn precision(&self) -> f64 {
        let predicted = self.true_positive + self.false_positive;
        if predicted == 0 {
            0.0
        } else {
            self.true_positive as f64 / predicted as f64
        }
    }

    /// Recall over gold-together pairs; 0 when gold has none.
    #[must_use]
    pub fn recall(&self) -> f64 {
        let gold = self.true_positive + self.false_negative;
        if gold == 0 {
            0.0
        } else {
            self.true_positive as f64 / gold as f64
        }
    }

    /// Precision, recall, F1 in one bundle.
    #[must_use]
    pub fn scores(&self) -> ClusterScores {
        ClusterScores::new(self.precision(), self.recall())
    }
}

/// Evaluation of a predicted clustering over a block set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterEvaluation {
    /// Micro-averaged pairwise scores.
    pub pairwise: ClusterScores,
    /// Raw pair tallies behind `pairwise`.
    pub pair_counts: PairCounts,
    /// B³ scores averaged over scored signatures.
    pub b_cubed: ClusterScores,
    /// Blocks that contributed at least one scored signature.
    pub blocks_scored: usize,
    /// Signatures with usable gold, orphans excluded.
    pub signatures_scored: usize,
    /// Per-signature B³ breakdown, present when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_signature: Option<BTreeMap<String, ClusterScores>>,
}

impl std::fmt::Display for ClusterEvaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Clustering evaluation:")?;
        writeln!(f, "  pairwise: {}", self.pairwise)?;
        writeln!(f, "  B³:       {}", self.b_cubed)?;
        write!(
            f,
            "  scored {} signatures across {} blocks",
            self.signatures_scored, self.blocks_scored
        )
    }
}

/// Evaluator options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalOptions {
    /// Gold cluster id whose members are excluded from scoring.
    pub orphan_cluster_id: String,
    /// Also emit the per-signature B³ breakdown.
    #[serde(default)]
    pub per_signature: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            orphan_cluster_id: ORPHAN_CLUSTER_ID.to_string(),
            per_signature: false,
        }
    }
}

// =============================================================================
// Pair counting
// =============================================================================

/// Count same-cluster pair agreement for one block.
///
/// `predicted` and `gold` are parallel label slices over the block's
/// signatures; label values are opaque. A block of fewer than two
/// signatures yields all-zero counts.
///
/// # Errors
///
/// [`Error::DimensionMismatch`] if the slices differ in length.
pub fn pairwise_counts(predicted: &[usize], gold: &[usize]) -> Result<PairCounts> {
    if predicted.len() != gold.len() {
        return Err(Error::DimensionMismatch {
            expected: gold.len(),
            actual: predicted.len(),
        });
    }
    let mut counts = PairCounts::default();
    for i in 0..predicted.len() {
        for j in (i + 1)..predicted.len() {
            let pred_same = predicted[i] == predicted[j];
            let gold_same = gold[i] == gold[j];
            match (pred_same, gold_same) {
                (true, true) => counts.true_positive += 1,
                (true, false) => counts.false_positive += 1,
                (false, true) => counts.false_negative += 1,
                (false, false) => {}
            }
        }
    }
    Ok(counts)
}

// =============================================================================
// Evaluator
// =============================================================================

/// Score predicted assignments against the store's gold clusters.
///
/// `predicted` maps block id to (signature id → predicted cluster id).
/// Signatures missing gold, and signatures whose gold cluster is the
/// configured orphan cluster, are skipped. Blocks absent from `predicted`
/// are skipped entirely; an unknown signature id inside a prediction is a
/// hard error.
///
/// # Errors
///
/// [`Error::UnknownSignature`] if a predicted id is not in the store.
pub fn evaluate(
    predicted: &BTreeMap<String, BTreeMap<String, String>>,
    store: &SignatureStore,
    options: &EvalOptions,
) -> Result<ClusterEvaluation> {
    let mut pair_counts = PairCounts::default();
    let mut b3_precision_sum = 0.0;
    let mut b3_recall_sum = 0.0;
    let mut scored = 0usize;
    let mut blocks_scored = 0usize;
    let mut per_signature: BTreeMap<String, ClusterScores> = BTreeMap::new();

    for (block_id, assignment) in predicted {
        for sig_id in assignment.keys() {
            store.signature(sig_id)?;
        }
        // Scored universe: signatures with non-orphan gold, in block order.
        let Some(block) = store.block(block_id) else {
            continue;
        };
        let members: Vec<(&str, &str, &str)> = block
            .signatures
            .iter()
            .filter_map(|sig_id| {
                let gold = store.gold_cluster(sig_id)?;
                if gold == options.orphan_cluster_id {
                    return None;
                }
                let pred = assignment.get(sig_id)?;
                Some((sig_id.as_str(), pred.as_str(), gold))
            })
            .collect();
        if members.is_empty() {
            continue;
        }
        blocks_scored += 1;

        let pred_labels = intern(members.iter().map(|(_, pred, _)| *pred));
        let gold_labels = intern(members.iter().map(|(_, _, gold)| *gold));
        pair_counts.absorb(pairwise_counts(&pred_labels, &gold_labels)?);

        for (idx, (sig_id, _, _)) in members.iter().enumerate() {
            let pred_size = pred_labels.iter().filter(|&&l| l == pred_labels[idx]).count();
            let gold_size = gold_labels.iter().filter(|&&l| l == gold_labels[idx]).count();
            let overlap = (0..members.len())
                .filter(|&k| pred_labels[k] == pred_labels[idx] && gold_labels[k] == gold_labels[idx])
                .count();
            let p = overlap as f64 / pred_size as f64;
            let r = overlap as f64 / gold_size as f64;
            b3_precision_sum += p;
            b3_recall_sum += r;
            scored += 1;
            if options.per_signature {
                per_signature.insert((*sig_id).to_string(), ClusterScores::new(p, r));
            }
        }
    }

    let b_cubed = if scored == 0 {
        ClusterScores::default()
    } else {
        ClusterScores::new(
            b3_precision_sum / scored as f64,
            b3_recall_sum / scored as f64,
        )
    };
    Ok(ClusterEvaluation {
        pairwise: pair_counts.scores(),
        pair_counts,
        b_cubed,
        blocks_scored,
        signatures_scored: scored,
        per_signature: options.per_signature.then_some(per_signature),
    })
}

fn intern<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<usize> {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    labels
        .map(|label| {
            let next = seen.len();
            *seen.entry(label).or_insert(next)
        })
        .collect()
}
