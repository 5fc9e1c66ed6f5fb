//! Dense pairwise distance matrices.
//!
//! [`build_distance_matrix`] turns one block's pairwise same-author
//! probabilities into a symmetric zero-diagonal matrix with every entry in
//! `[0, 1]`. Hard constraint verdicts override the classifier: force-same
//! writes 0, force-different writes 1, and an overridden pair is never sent
//! to the scorer at all. Pair scoring fans out across the rayon pool; the
//! result does not depend on scheduling order.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::classifier::PairScorer;
use crate::constraints::ConstraintSet;
use crate::error::Result;
use crate::signature::{Block, Signature, SignatureStore};

/// Symmetric zero-diagonal distance matrix over one block's signatures.
///
/// Entry `(i, j)` is the distance between the block's `i`-th and `j`-th
/// signatures in block order; lower means more likely the same author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    size: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    /// All-zero matrix of the given size.
    #[must_use]
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            data: vec![0.0; size * size],
        }
    }

    /// Number of rows (and columns).
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the matrix has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Distance at `(i, j)`.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.size && j < self.size, "index out of bounds");
        self.data[i * self.size + j]
    }

    /// Set the distance at `(i, j)` and `(j, i)`, clamped to `[0, 1]`.
    ///
    /// Writing the diagonal is a no-op; it stays zero.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn set(&mut self, i: usize, j: usize, distance: f64) {
        assert!(i < self.size && j < self.size, "index out of bounds");
        if i == j {
            return;
        }
        let d = distance.clamp(0.0, 1.0);
        self.data[i * self.size + j] = d;
        self.data[j * self.size + i] = d;
    }

    /// Mean distance from row `i` to the given column indices.
    ///
    /// Returns 1.0 for an empty index set.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of bounds.
    #[must_use]
    pub fn mean_to(&self, i: usize, columns: &[usize]) -> f64 {
        if columns.is_empty() {
            return 1.0;
        }
        let total: f64 = columns.iter().map(|&j| self.get(i, j)).sum();
        total / columns.len() as f64
    }
}

/// Classifier-or-override distance for one signature pair.
///
/// This is the single pair rule shared by the matrix builder and the
/// incremental predictor: a hard verdict wins outright, otherwise the
/// distance is `1 - p` clamped to `[0, 1]`.
///
/// # Errors
///
/// Propagates scorer failures.
pub fn pair_distance(
    a: &Signature,
    b: &Signature,
    scorer: &dyn PairScorer,
    constraints: &ConstraintSet,
) -> Result<f64> {
    if let Some(forced) = constraints.override_distance(a, b) {
        return Ok(forced);
    }
    let p = scorer.same_author_probability(a, b)?;
    Ok((1.0 - p).clamp(0.0, 1.0))
}

/// Build the distance matrix for one block.
///
/// Blocks of size zero or one return an all-zero matrix without consulting
/// the scorer. Identical inputs produce an identical matrix.
///
/// # Errors
///
/// [`crate::Error::UnknownSignature`] if the block references an id missing
/// from the store; scorer failures propagate.
pub fn build_distance_matrix(
    block: &Block,
    store: &SignatureStore,
    scorer: &dyn PairScorer,
    constraints: &ConstraintSet,
) -> Result<DistanceMatrix> {
    let signatures: Vec<&Signature> = block
        .signatures
        .iter()
        .map(|id| store.signature(id))
        .collect::<Result<_>>()?;
    let n = signatures.len();
    let mut matrix = DistanceMatrix::zeros(n);
    if n < 2 {
        return Ok(matrix);
    }

    let mut pairs = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((i, j));
        }
    }
    let distances: Vec<(usize, usize, f64)> = pairs
        .par_iter()
        .map(|&(i, j)| {
            pair_distance(signatures[i], signatures[j], scorer, constraints)
                .map(|d| (i, j, d))
        })
        .collect::<Result<_>>()?;
    for (i, j, d) in distances {
        matrix.set(i, j, d);
    }
    Ok(matrix)
}
