//! Hierarchical agglomerative clustering over a distance matrix.
//!
//! [`dendrogram`] merges clusters bottom-up until one remains, recording
//! every merge and its linkage distance. [`Dendrogram::cut`] then replays
//! merges up to a threshold `eps` to produce flat cluster labels. Building
//! once and cutting many times is what makes the `eps` search cheap.
//!
//! Inter-cluster distance follows the configured [`Linkage`]:
//!
//! - `single`: minimum pairwise distance between members
//! - `complete`: maximum pairwise distance
//! - `average`: size-weighted mean pairwise distance
//!
//! All three are monotone, so merge distances never decrease along the
//! sequence and a threshold cut is a prefix of the merges. Ties are broken
//! deterministically: among equally distant pending merges, the pair whose
//! clusters contain the lowest leaf indices merges first.

use serde::{Deserialize, Serialize};

use crate::matrix::DistanceMatrix;

/// Inter-cluster distance rule for agglomerative merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Size-weighted mean of pairwise distances.
    #[default]
    Average,
    /// Minimum pairwise distance (chains aggressively).
    Single,
    /// Maximum pairwise distance (most conservative).
    Complete,
}

impl Linkage {
    /// Stable lowercase label.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            Linkage::Average => "average",
            Linkage::Single => "single",
            Linkage::Complete => "complete",
        }
    }

    /// Parse a label; `None` for anything unrecognized.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "average" => Some(Linkage::Average),
            "single" => Some(Linkage::Single),
            "complete" => Some(Linkage::Complete),
            _ => None,
        }
    }

    fn combine(self, d_ak: f64, d_bk: f64, size_a: usize, size_b: usize) -> f64 {
        match self {
            Linkage::Single => d_ak.min(d_bk),
            Linkage::Complete => d_ak.max(d_bk),
            Linkage::Average => {
                let (na, nb) = (size_a as f64, size_b as f64);
                (na * d_ak + nb * d_bk) / (na + nb)
            }
        }
    }
}

impl std::fmt::Display for Linkage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// One recorded merge: the two cluster representatives and their linkage
/// distance. A representative is the smallest leaf index in its cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// Representative of the surviving (lower) cluster.
    pub left: usize,
    /// Representative of the absorbed cluster.
    pub right: usize,
    /// Linkage distance at which the merge happened.
    pub distance: f64,
}

/// Full merge history for one block.
#[derive(Debug, Clone, Default)]
pub struct Dendrogram {
    leaves: usize,
    merges: Vec<Merge>,
}

impl Dendrogram {
    /// Number of leaf signatures.
    #[must_use]
    pub fn leaves(&self) -> usize {
        self.leaves
    }

    /// Recorded merges in execution order.
    #[must_use]
    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Flat cluster labels after cutting at `eps`.
    ///
    /// Replays merges while their distance is at most `eps` and labels the
    /// resulting components. Labels are normalized by first appearance in
    /// leaf order: leaf 0 is always in cluster 0, the next leaf outside
    /// cluster 0 starts cluster 1, and so on.
    #[must_use]
    pub fn cut(&self, eps: f64) -> Vec<usize> {
        let mut components = UnionFind::new(self.leaves);
        for merge in &self.merges {
            if merge.distance > eps {
                break;
            }
            components.union(merge.left, merge.right);
        }
        let mut labels = vec![usize::MAX; self.leaves];
        let mut next = 0;
        for leaf in 0..self.leaves {
            let root = components.find(leaf);
            if labels[root] == usize::MAX {
                labels[root] = next;
                next += 1;
            }
            labels[leaf] = labels[root];
        }
        labels
    }

    /// Number of clusters a cut at `eps` would produce.
    #[must_use]
    pub fn cluster_count(&self, eps: f64) -> usize {
        let merged = self
            .merges
            .iter()
            .take_while(|m| m.distance <= eps)
            .count();
        self.leaves - merged
    }
}

/// Build the full dendrogram for a distance matrix.
///
/// Runs the naive O(n^3) merge loop over a working copy of the matrix.
/// Block sizes are bounded by the blocking key, which keeps this well under
/// the cost of scoring the pairs in the first place.
#[must_use]
pub fn dendrogram(matrix: &DistanceMatrix, linkage: Linkage) -> Dendrogram {
    let n = matrix.size();
    let mut result = Dendrogram {
        leaves: n,
        merges: Vec::with_capacity(n.saturating_sub(1)),
    };
    if n < 2 {
        return result;
    }

    // Working distances between live clusters; slot index is the smallest
    // leaf index of its cluster, merges keep the lower slot alive.
    let mut dist = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            dist[i][j] = matrix.get(i, j);
        }
    }
    let mut alive = vec![true; n];
    let mut sizes = vec![1usize; n];

    for _ in 0..(n - 1) {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if !alive[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !alive[j] {
                    continue;
                }
                let d = dist[i][j];
                if best.map_or(true, |(_, _, bd)| d < bd) {
                    best = Some((i, j, d));
                }
            }
        }
        let Some((a, b, d)) = best else { break };
        result.merges.push(Merge {
            left: a,
            right: b,
            distance: d,
        });
        for k in 0..n {
            if !alive[k] || k == a || k == b {
                continue;
            }
            let combined = linkage.combine(dist[a][k], dist[b][k], sizes[a], sizes[b]);
            dist[a][k] = combined;
            dist[k][a] = combined;
        }
        sizes[a] += sizes[b];
        alive[b] = false;
    }
    result
}

struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(n: usize, entries: &[(usize, usize, f64)]) -> DistanceMatrix {
        let mut m = DistanceMatrix::zeros(n);
        for &(i, j, d) in entries {
            m.set(i, j, d);
        }
        m
    }

    #[test]
    fn three_point_example_cuts_as_expected() {
        // A-B close, C far from both.
        let m = matrix(3, &[(0, 1, 0.1), (0, 2, 0.9), (1, 2, 0.5)]);
        let tree = dendrogram(&m, Linkage::Average);
        assert_eq!(tree.cut(0.3), vec![0, 0, 1]);
        // Average of 0.9 and 0.5 is 0.7, so everything joins above that.
        assert_eq!(tree.cut(0.7), vec![0, 0, 0]);
    }

    #[test]
    fn forced_apart_pair_stays_apart() {
        // Same block, but A-B is forced to distance 1.
        let m = matrix(3, &[(0, 1, 1.0), (0, 2, 0.9), (1, 2, 0.5)]);
        let tree = dendrogram(&m, Linkage::Average);
        assert_eq!(tree.cut(0.3), vec![0, 1, 2]);
    }

    #[test]
    fn single_chains_where_complete_splits() {
        let entries = [
            (0, 1, 0.2),
            (2, 3, 0.2),
            (1, 2, 0.25),
            (0, 2, 0.9),
            (0, 3, 0.9),
            (1, 3, 0.9),
        ];
        let m = matrix(4, &entries);
        let single = dendrogram(&m, Linkage::Single).cut(0.3);
        assert_eq!(single, vec![0, 0, 0, 0]);
        let complete = dendrogram(&m, Linkage::Complete).cut(0.3);
        assert_eq!(complete, vec![0, 0, 1, 1]);
    }

    #[test]
    fn equal_distances_merge_lowest_pair_first() {
        let m = matrix(4, &[
            (0, 1, 0.2),
            (2, 3, 0.2),
            (0, 2, 0.9),
            (0, 3, 0.9),
            (1, 2, 0.9),
            (1, 3, 0.9),
        ]);
        let tree = dendrogram(&m, Linkage::Average);
        assert_eq!(tree.merges()[0].left, 0);
        assert_eq!(tree.merges()[0].right, 1);
        assert_eq!(tree.merges()[1].left, 2);
        assert_eq!(tree.merges()[1].right, 3);
        assert_eq!(tree.cut(0.3), vec![0, 0, 1, 1]);
    }

    #[test]
    fn merge_distances_never_decrease() {
        let m = matrix(5, &[
            (0, 1, 0.1),
            (0, 2, 0.4),
            (1, 2, 0.3),
            (0, 3, 0.8),
            (1, 3, 0.7),
            (2, 3, 0.6),
            (0, 4, 0.9),
            (1, 4, 0.9),
            (2, 4, 0.9),
            (3, 4, 0.2),
        ]);
        for linkage in [Linkage::Average, Linkage::Single, Linkage::Complete] {
            let tree = dendrogram(&m, linkage);
            let distances: Vec<f64> = tree.merges().iter().map(|m| m.distance).collect();
            for pair in distances.windows(2) {
                assert!(pair[0] <= pair[1], "{linkage}: {distances:?}");
            }
        }
    }

    #[test]
    fn wider_cut_is_coarser() {
        let m = matrix(4, &[
            (0, 1, 0.1),
            (0, 2, 0.5),
            (1, 2, 0.5),
            (0, 3, 0.9),
            (1, 3, 0.9),
            (2, 3, 0.9),
        ]);
        let tree = dendrogram(&m, Linkage::Average);
        assert!(tree.cluster_count(0.05) >= tree.cluster_count(0.3));
        assert!(tree.cluster_count(0.3) >= tree.cluster_count(0.95));
    }

    #[test]
    fn degenerate_sizes() {
        let empty = dendrogram(&DistanceMatrix::zeros(0), Linkage::Average);
        assert!(empty.cut(0.5).is_empty());
        let single = dendrogram(&DistanceMatrix::zeros(1), Linkage::Average);
        assert_eq!(single.cut(0.5), vec![0]);
    }

    #[test]
    fn labels_are_first_appearance_ordered() {
        let m = matrix(4, &[
            (0, 1, 0.9),
            (0, 2, 0.9),
            (1, 2, 0.9),
            (1, 3, 0.1),
            (0, 3, 0.9),
            (2, 3, 0.9),
        ]);
        let labels = dendrogram(&m, Linkage::Average).cut(0.3);
        // Leaf 0 opens cluster 0, leaf 1 opens cluster 1, leaf 3 joins it.
        assert_eq!(labels, vec![0, 1, 2, 1]);
    }

    #[test]
    fn cut_is_idempotent() {
        let m = matrix(3, &[(0, 1, 0.2), (0, 2, 0.6), (1, 2, 0.7)]);
        let tree = dendrogram(&m, Linkage::Average);
        assert_eq!(tree.cut(0.4), tree.cut(0.4));
    }

    #[test]
    fn linkage_labels_round_trip() {
        for linkage in [Linkage::Average, Linkage::Single, Linkage::Complete] {
            assert_eq!(Linkage::from_label(linkage.as_label()), Some(linkage));
        }
        assert_eq!(Linkage::from_label("ward"), None);
    }
}
