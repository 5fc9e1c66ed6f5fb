//! Signature and block data model.
//!
//! A [`Signature`] is one author-name mention on one paper. Signatures are
//! grouped into [`Block`]s (candidate sets sharing a blocking key, e.g.
//! normalized surname plus first initial) and clustering never crosses a
//! block boundary. The [`SignatureStore`] owns both and validates that every
//! signature belongs to exactly one block.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One author-name mention on one paper.
///
/// Immutable once loaded. Attribute fields beyond the identifying triple
/// (signature id, paper id, author position) are optional metadata consumed
/// by featurizers and constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    /// Unique signature id.
    pub id: String,
    /// Paper the mention appears on.
    pub paper_id: String,
    /// Zero-based author position within the paper's author list.
    pub author_position: usize,
    /// Raw name as it appears on the paper.
    pub name: String,
    /// Normalized name tokens (lowercased, split, diacritics folded).
    #[serde(default)]
    pub name_tokens: Vec<String>,
    /// Affiliation strings attached to the mention.
    #[serde(default)]
    pub affiliations: Vec<String>,
    /// Normalized names of co-authors on the same paper.
    #[serde(default)]
    pub coauthors: Vec<String>,
    /// Record source (e.g. a curated registry) if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Source-assigned record id, meaningful within `source`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Strong author identifiers (ORCID and the like).
    #[serde(default)]
    pub identifiers: Vec<String>,
}

impl Signature {
    /// Create a signature with the identifying triple and a raw name.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        paper_id: impl Into<String>,
        author_position: usize,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            paper_id: paper_id.into(),
            author_position,
            name: name.into(),
            name_tokens: Vec::new(),
            affiliations: Vec::new(),
            coauthors: Vec::new(),
            source: None,
            source_id: None,
            identifiers: Vec::new(),
        }
    }

    /// Attach normalized name tokens.
    #[must_use]
    pub fn with_name_tokens(mut self, tokens: Vec<String>) -> Self {
        self.name_tokens = tokens;
        self
    }

    /// Attach affiliation strings.
    #[must_use]
    pub fn with_affiliations(mut self, affiliations: Vec<String>) -> Self {
        self.affiliations = affiliations;
        self
    }

    /// Attach normalized co-author names.
    #[must_use]
    pub fn with_coauthors(mut self, coauthors: Vec<String>) -> Self {
        self.coauthors = coauthors;
        self
    }

    /// Attach the record source and its record id.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>, source_id: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self.source_id = Some(source_id.into());
        self
    }

    /// Attach strong author identifiers.
    #[must_use]
    pub fn with_identifiers(mut self, identifiers: Vec<String>) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Whether the two signatures share at least one strong identifier.
    #[must_use]
    pub fn shares_identifier(&self, other: &Signature) -> bool {
        self.identifiers
            .iter()
            .any(|id| other.identifiers.iter().any(|o| o == id))
    }
}

/// An ordered set of signature ids clustered as one independent unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Blocking key, unique within a store.
    pub id: String,
    /// Member signature ids, in load order.
    pub signatures: Vec<String>,
}

impl Block {
    /// Create a block from its key and members.
    #[must_use]
    pub fn new(id: impl Into<String>, signatures: Vec<String>) -> Self {
        Self {
            id: id.into(),
            signatures,
        }
    }

    /// Number of member signatures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether the block has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// Externally supplied clustering ground truth: fixed cluster assignments
/// plus explicit cannot-link pairs.
///
/// A signature with a `require` entry is pinned to that cluster id; a pair
/// in `disallow` must never share a cluster. Pairs are stored with the two
/// ids in sorted order so lookups are orientation-free.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSeeds {
    /// Signature id to fixed cluster id.
    #[serde(default)]
    pub require: BTreeMap<String, String>,
    /// Unordered cannot-link signature-id pairs.
    #[serde(default)]
    pub disallow: BTreeSet<(String, String)>,
}

impl ClusterSeeds {
    /// Empty seed set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a signature to a cluster id.
    pub fn add_require(&mut self, signature: impl Into<String>, cluster: impl Into<String>) {
        self.require.insert(signature.into(), cluster.into());
    }

    /// Forbid two signatures from sharing a cluster.
    pub fn add_disallow(&mut self, a: impl Into<String>, b: impl Into<String>) {
        let (a, b) = (a.into(), b.into());
        let pair = if a <= b { (a, b) } else { (b, a) };
        self.disallow.insert(pair);
    }

    /// The pinned cluster id for a signature, if any.
    #[must_use]
    pub fn seed_cluster(&self, signature: &str) -> Option<&str> {
        self.require.get(signature).map(String::as_str)
    }

    /// Whether the pair is explicitly forbidden from merging.
    #[must_use]
    pub fn is_disallowed(&self, a: &str, b: &str) -> bool {
        let pair = if a <= b { (a, b) } else { (b, a) };
        self.disallow
            .contains(&(pair.0.to_string(), pair.1.to_string()))
    }

    /// Whether no seeds of either kind are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.require.is_empty() && self.disallow.is_empty()
    }
}

/// Read-only store of signatures, blocks, and optional gold clusters.
///
/// Built once at load time; every later stage borrows it immutably. Blocks
/// iterate in sorted id order so multi-block results are reproducible
/// regardless of insertion or scheduling order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignatureStore {
    signatures: HashMap<String, Signature>,
    blocks: BTreeMap<String, Block>,
    /// Signature id to gold cluster id, when ground truth is known.
    #[serde(default)]
    gold: BTreeMap<String, String>,
}

impl SignatureStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from signatures and blocks, validating membership.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateSignature`] if a signature id appears in two
    /// blocks, [`Error::UnknownSignature`] if a block lists an id with no
    /// corresponding signature.
    pub fn build(signatures: Vec<Signature>, blocks: Vec<Block>) -> Result<Self> {
        let mut store = Self::new();
        for signature in signatures {
            store.signatures.insert(signature.id.clone(), signature);
        }
        let mut owner: HashMap<String, String> = HashMap::new();
        for block in blocks {
            for sig_id in &block.signatures {
                if !store.signatures.contains_key(sig_id) {
                    return Err(Error::unknown_signature(sig_id));
                }
                if let Some(first) = owner.get(sig_id) {
                    return Err(Error::DuplicateSignature {
                        id: sig_id.clone(),
                        first: first.clone(),
                        second: block.id.clone(),
                    });
                }
                owner.insert(sig_id.clone(), block.id.clone());
            }
            store.blocks.insert(block.id.clone(), block);
        }
        Ok(store)
    }

    /// Record the gold cluster id for a signature.
    pub fn set_gold(&mut self, signature: impl Into<String>, cluster: impl Into<String>) {
        self.gold.insert(signature.into(), cluster.into());
    }

    /// Look up a signature.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownSignature`] if the id is not in the store.
    pub fn signature(&self, id: &str) -> Result<&Signature> {
        self.signatures
            .get(id)
            .ok_or_else(|| Error::unknown_signature(id))
    }

    /// Look up a block by id.
    #[must_use]
    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// All blocks in sorted id order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of signatures.
    #[must_use]
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// Gold cluster id for a signature, if recorded.
    #[must_use]
    pub fn gold_cluster(&self, signature: &str) -> Option<&str> {
        self.gold.get(signature).map(String::as_str)
    }

    /// Whether any gold assignments are recorded.
    #[must_use]
    pub fn has_gold(&self) -> bool {
        !self.gold.is_empty()
    }

    /// Gold partition of one block: cluster id to member signature ids.
    ///
    /// Signatures without a gold assignment are omitted.
    #[must_use]
    pub fn gold_partition(&self, block: &Block) -> BTreeMap<String, Vec<String>> {
        let mut partition: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for sig_id in &block.signatures {
            if let Some(cluster) = self.gold.get(sig_id) {
                partition
                    .entry(cluster.clone())
                    .or_default()
                    .push(sig_id.clone());
            }
        }
        partition
    }
}

/// On-disk dataset: the JSON shape consumed by the command-line tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// All signatures.
    pub signatures: Vec<Signature>,
    /// Block id to member signature ids.
    pub blocks: BTreeMap<String, Vec<String>>,
    /// Signature id to gold cluster id, when labeled.
    #[serde(default)]
    pub gold_clusters: BTreeMap<String, String>,
    /// Optional seeds shipped with the dataset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeds: Option<ClusterSeeds>,
}

impl Dataset {
    /// Validate and convert into a [`SignatureStore`].
    ///
    /// # Errors
    ///
    /// Same validation failures as [`SignatureStore::build`].
    pub fn into_store(self) -> Result<SignatureStore> {
        let blocks = self
            .blocks
            .into_iter()
            .map(|(id, signatures)| Block::new(id, signatures))
            .collect();
        let mut store = SignatureStore::build(self.signatures, blocks)?;
        for (sig, cluster) in self.gold_clusters {
            store.set_gold(sig, cluster);
        }
        Ok(store)
    }
}
