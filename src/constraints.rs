//! Hard pairwise constraints.
//!
//! A constraint inspects two signatures and either forces them into the same
//! cluster, forces them apart, or abstains. The [`ConstraintSet`] evaluates
//! its active constraints in order and folds the verdicts with
//! force-different strictly dominant: one force-different outweighs any
//! number of force-same verdicts. An empty set abstains on every pair, which
//! degrades clustering to pure classifier distances.
//!
//! Built-in constraints, each toggleable by name:
//!
//! | Name | Fires when |
//! |------|-----------|
//! | `seed-disallow` | the pair is on the explicit cannot-link list |
//! | `seed-require` | both signatures carry seed cluster ids |
//! | `shared-identifier` | the signatures share a strong identifier |
//! | `trusted-source-record` | both come from the same trusted source |

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::signature::{ClusterSeeds, Signature};

/// Name of the explicit cannot-link constraint.
pub const SEED_DISALLOW: &str = "seed-disallow";
/// Name of the seed-cluster pinning constraint.
pub const SEED_REQUIRE: &str = "seed-require";
/// Name of the strong-identifier constraint.
pub const SHARED_IDENTIFIER: &str = "shared-identifier";
/// Name of the trusted-source record-identity constraint.
pub const TRUSTED_SOURCE_RECORD: &str = "trusted-source-record";

/// Outcome of evaluating one constraint on one signature pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The pair must end up in the same cluster.
    ForceSame,
    /// The pair must never share a cluster.
    ForceDifferent,
    /// The constraint has no opinion on this pair.
    Abstain,
}

/// A single pairwise rule.
///
/// Implementations must be cheap and side-effect free; they run for every
/// pair in a block, possibly from multiple worker threads.
pub trait PairConstraint: Send + Sync {
    /// Stable name used for enabling and disabling.
    fn name(&self) -> &str;

    /// Judge one unordered pair.
    fn evaluate(&self, a: &Signature, b: &Signature) -> Verdict;
}

/// Forces apart pairs on the explicit cannot-link list.
#[derive(Debug, Clone)]
pub struct SeedDisallow {
    seeds: Arc<ClusterSeeds>,
}

impl SeedDisallow {
    /// Build from a shared seed set.
    #[must_use]
    pub fn new(seeds: Arc<ClusterSeeds>) -> Self {
        Self { seeds }
    }
}

impl PairConstraint for SeedDisallow {
    fn name(&self) -> &str {
        SEED_DISALLOW
    }

    fn evaluate(&self, a: &Signature, b: &Signature) -> Verdict {
        if self.seeds.is_disallowed(&a.id, &b.id) {
            Verdict::ForceDifferent
        } else {
            Verdict::Abstain
        }
    }
}

/// Pins seeded signatures together or apart by their seed cluster ids.
///
/// Equal seed ids force a merge. Differing seed ids force a split unless
/// `merge_distinct` is set, in which case the classifier decides.
#[derive(Debug, Clone)]
pub struct SeedRequire {
    seeds: Arc<ClusterSeeds>,
    merge_distinct: bool,
}

impl SeedRequire {
    /// Build from a shared seed set.
    #[must_use]
    pub fn new(seeds: Arc<ClusterSeeds>, merge_distinct: bool) -> Self {
        Self {
            seeds,
            merge_distinct,
        }
    }
}

impl PairConstraint for SeedRequire {
    fn name(&self) -> &str {
        SEED_REQUIRE
    }

    fn evaluate(&self, a: &Signature, b: &Signature) -> Verdict {
        match (
            self.seeds.seed_cluster(&a.id),
            self.seeds.seed_cluster(&b.id),
        ) {
            (Some(ca), Some(cb)) if ca == cb => Verdict::ForceSame,
            (Some(_), Some(_)) if !self.merge_distinct => Verdict::ForceDifferent,
            _ => Verdict::Abstain,
        }
    }
}

/// Merges signatures sharing a strong identifier such as an ORCID.
#[derive(Debug, Clone, Default)]
pub struct SharedIdentifier;

impl PairConstraint for SharedIdentifier {
    fn name(&self) -> &str {
        SHARED_IDENTIFIER
    }

    fn evaluate(&self, a: &Signature, b: &Signature) -> Verdict {
        if a.shares_identifier(b) {
            Verdict::ForceSame
        } else {
            Verdict::Abstain
        }
    }
}

/// Trusts record identity within curated sources.
///
/// When both signatures come from the same trusted source, an equal record
/// id merges them and differing record ids split them. Any other source
/// combination abstains.
#[derive(Debug, Clone)]
pub struct TrustedSourceRecord {
    trusted: BTreeSet<String>,
}

impl TrustedSourceRecord {
    /// Build with the set of trusted source names.
    #[must_use]
    pub fn new(trusted: BTreeSet<String>) -> Self {
        Self { trusted }
    }
}

impl PairConstraint for TrustedSourceRecord {
    fn name(&self) -> &str {
        TRUSTED_SOURCE_RECORD
    }

    fn evaluate(&self, a: &Signature, b: &Signature) -> Verdict {
        let (Some(sa), Some(sb)) = (a.source.as_deref(), b.source.as_deref()) else {
            return Verdict::Abstain;
        };
        if sa != sb || !self.trusted.contains(sa) {
            return Verdict::Abstain;
        }
        match (a.source_id.as_deref(), b.source_id.as_deref()) {
            (Some(ra), Some(rb)) if ra == rb => Verdict::ForceSame,
            (Some(_), Some(_)) => Verdict::ForceDifferent,
            _ => Verdict::Abstain,
        }
    }
}

/// Configuration for assembling the built-in constraints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintConfig {
    /// Names of built-in constraints to activate.
    pub enabled: BTreeSet<String>,
    /// Source names whose record ids are authoritative.
    #[serde(default)]
    pub trusted_sources: BTreeSet<String>,
    /// Allow the classifier to merge signatures pinned to distinct seed
    /// clusters. Off by default: distinct seed clusters never merge.
    #[serde(default)]
    pub merge_distinct_seed_clusters: bool,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            enabled: [
                SEED_DISALLOW,
                SEED_REQUIRE,
                SHARED_IDENTIFIER,
                TRUSTED_SOURCE_RECORD,
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            trusted_sources: BTreeSet::new(),
            merge_distinct_seed_clusters: false,
        }
    }
}

impl ConstraintConfig {
    /// Configuration with every built-in constraint disabled.
    #[must_use]
    pub fn none() -> Self {
        Self {
            enabled: BTreeSet::new(),
            ..Self::default()
        }
    }

    /// Enable a built-in constraint by name.
    #[must_use]
    pub fn with_enabled(mut self, name: impl Into<String>) -> Self {
        self.enabled.insert(name.into());
        self
    }

    /// Disable a built-in constraint by name.
    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.enabled.remove(name);
        self
    }

    /// Mark a source as trusted for record-identity decisions.
    #[must_use]
    pub fn with_trusted_source(mut self, source: impl Into<String>) -> Self {
        self.trusted_sources.insert(source.into());
        self
    }
}

/// An ordered collection of active constraints with the combination rule.
#[derive(Default)]
pub struct ConstraintSet {
    constraints: Vec<Box<dyn PairConstraint>>,
}

impl ConstraintSet {
    /// Empty set: abstains on every pair.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble the built-in constraints selected by `config`, binding the
    /// seed-backed ones to `seeds`.
    ///
    /// Evaluation order matches the table in the module docs. Order never
    /// changes a combined verdict; it only decides which constraint gets to
    /// short-circuit.
    #[must_use]
    pub fn standard(config: &ConstraintConfig, seeds: ClusterSeeds) -> Self {
        let seeds = Arc::new(seeds);
        let mut set = Self::new();
        if config.enabled.contains(SEED_DISALLOW) {
            set.push(SeedDisallow::new(Arc::clone(&seeds)));
        }
        if config.enabled.contains(SEED_REQUIRE) {
            set.push(SeedRequire::new(
                Arc::clone(&seeds),
                config.merge_distinct_seed_clusters,
            ));
        }
        if config.enabled.contains(SHARED_IDENTIFIER) {
            set.push(SharedIdentifier);
        }
        if config.enabled.contains(TRUSTED_SOURCE_RECORD) {
            set.push(TrustedSourceRecord::new(config.trusted_sources.clone()));
        }
        set
    }

    /// Append a constraint, keeping evaluation order.
    pub fn push(&mut self, constraint: impl PairConstraint + 'static) {
        self.constraints.push(Box::new(constraint));
    }

    /// Number of active constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether no constraints are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Combined verdict for one pair.
    ///
    /// Force-different wins outright and short-circuits; otherwise any
    /// force-same wins; otherwise abstain.
    #[must_use]
    pub fn evaluate(&self, a: &Signature, b: &Signature) -> Verdict {
        let mut combined = Verdict::Abstain;
        for constraint in &self.constraints {
            match constraint.evaluate(a, b) {
                Verdict::ForceDifferent => return Verdict::ForceDifferent,
                Verdict::ForceSame => combined = Verdict::ForceSame,
                Verdict::Abstain => {}
            }
        }
        combined
    }

    /// Distance override implied by the combined verdict, if any.
    #[must_use]
    pub fn override_distance(&self, a: &Signature, b: &Signature) -> Option<f64> {
        match self.evaluate(a, b) {
            Verdict::ForceSame => Some(0.0),
            Verdict::ForceDifferent => Some(1.0),
            Verdict::Abstain => None,
        }
    }
}

impl std::fmt::Debug for ConstraintSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.constraints.iter().map(|c| c.name()).collect();
        f.debug_struct("ConstraintSet").field("active", &names).finish()
    }
}
