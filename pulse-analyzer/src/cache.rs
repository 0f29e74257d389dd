//! Analysis caches.
//!
//! Caches are explicit objects owned by an analyzer instance rather than
//! process globals, so two analyzers (or two tests) never see each other's
//! entries. Entries are append-only: the first value inserted for a key wins
//! and is never mutated afterwards. Readers may race with writers freely.
//!
//! The node cache is the one exception to strict append-only behavior: a node
//! whose name or keywords changed gets a fresh context embedding.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use xxhash_rust::xxh3::Xxh3;

use crate::types::{Embedding, KpiDimension, Node, RawSentiment};

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

// ============================================================================
// Append-only cache
// ============================================================================

/// Insert-if-absent map with hit/miss counters.
#[derive(Debug)]
pub struct AppendOnlyCache<K: Eq + Hash, V: Clone> {
    entries: DashMap<K, V>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Eq + Hash, V: Clone> Default for AppendOnlyCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V: Clone> AppendOnlyCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a key, counting the hit or miss.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert unless the key is already present. Returns the stored value,
    /// which is the earlier one when another writer got there first.
    pub fn insert_if_absent(&self, key: K, value: V) -> V {
        self.entries.entry(key).or_insert(value).value().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Node context cache
// ============================================================================

/// Fingerprint of the node fields that feed its context embedding.
pub fn node_fingerprint(node: &Node) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(node.name.as_bytes());
    for keyword in &node.keywords {
        hasher.update(&[0x1f]);
        hasher.update(keyword.as_bytes());
    }
    hasher.digest()
}

/// Node context embeddings keyed by node id and validated by fingerprint.
#[derive(Debug, Default)]
pub struct NodeEmbeddingCache {
    entries: DashMap<String, (u64, Embedding)>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl NodeEmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached embedding for `node`, or `None` if absent or built from an
    /// older name/keyword set.
    pub fn get(&self, node: &Node) -> Option<Embedding> {
        let fingerprint = node_fingerprint(node);
        let found = self
            .entries
            .get(&node.id)
            .filter(|entry| entry.value().0 == fingerprint)
            .map(|entry| entry.value().1.clone());

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store the embedding for the node's current fingerprint, replacing a
    /// stale entry. A concurrent insert for the same fingerprint keeps the
    /// first value.
    pub fn insert(&self, node: &Node, embedding: Embedding) -> Embedding {
        let fingerprint = node_fingerprint(node);
        let mut entry = self
            .entries
            .entry(node.id.clone())
            .or_insert_with(|| (fingerprint, embedding.clone()));
        if entry.0 != fingerprint {
            *entry = (fingerprint, embedding);
        }
        entry.1.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Cache bundle
// ============================================================================

/// All caches used by one local analyzer.
#[derive(Debug, Default)]
pub struct AnalysisCaches {
    /// Text embeddings keyed by normalized text
    pub embeddings: AppendOnlyCache<String, Embedding>,
    /// Raw sentiment keyed by the normalized text prefix
    pub sentiments: AppendOnlyCache<String, RawSentiment>,
    /// KPI concept embeddings
    pub concepts: AppendOnlyCache<KpiDimension, Embedding>,
    /// Node context embeddings
    pub nodes: NodeEmbeddingCache,
}

impl AnalysisCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> [(&'static str, CacheStats); 4] {
        [
            ("embeddings", self.embeddings.stats()),
            ("sentiments", self.sentiments.stats()),
            ("concepts", self.concepts.stats()),
            ("nodes", self.nodes.stats()),
        ]
    }
}

// ============================================================================
// Tests
// ============================================================================
