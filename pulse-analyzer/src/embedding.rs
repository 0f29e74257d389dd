//! Embedding capability.
//!
//! [`EmbeddingModel`] is the pluggable model seam. [`HashingEmbedder`] is the
//! built-in model: signed feature hashing over word unigrams, word bigrams and
//! character trigrams, so it needs no weights and is fully deterministic.
//! [`EmbeddingService`] puts a model behind lazy initialization, long-text
//! chunking and the shared embedding cache.

use async_trait::async_trait;
use futures_util::future::join_all;
use pulse_common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::cache::AnalysisCaches;
use crate::capability::LazyCapability;
use crate::normalizer::TextNormalizer;
use crate::types::Embedding;

/// Text embedding model.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Model name, for logs.
    fn name(&self) -> &str;

    /// Output vector length.
    fn dimensions(&self) -> usize;

    /// Embed one text. Must be deterministic for identical input.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed several texts; the output is aligned with the input.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

// ============================================================================
// Vector helpers
// ============================================================================

/// Cosine similarity in [-1, 1].
///
/// Returns 0 when the lengths differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return 0.0;
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if sim.is_finite() {
        sim.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Scale a vector to unit length in place. Zero vectors are left as-is.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Element-wise mean of equally sized vectors.
pub fn mean_pool(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let dim = first.len();
    let mut out = vec![0.0_f32; dim];
    for v in vectors.iter().filter(|v| v.len() == dim) {
        for (acc, x) in out.iter_mut().zip(v) {
            *acc += x;
        }
    }
    let n = vectors.len() as f32;
    out.iter_mut().for_each(|x| *x /= n);
    out
}

// ============================================================================
// HashingEmbedder
// ============================================================================

/// Default output size of [`HashingEmbedder`].
pub const DEFAULT_DIMENSIONS: usize = 384;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;
const TRIGRAM_WEIGHT: f32 = 0.25;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "for", "from", "had", "has",
    "have", "i", "in", "is", "it", "its", "me", "my", "of", "on", "or", "our", "so", "that", "the",
    "their", "them", "there", "these", "they", "this", "those", "to", "too", "was", "we", "were",
    "what", "which", "who", "will", "with", "would", "you", "your",
];

/// Deterministic feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let hash = xxh3_64(feature.as_bytes());
        let idx = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }

    /// Compute the unit vector for a text synchronously.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty() && !STOPWORDS.contains(w))
            .collect();

        let mut v = vec![0.0_f32; self.dimensions];

        for word in &words {
            if word.chars().count() > 2 {
                self.add_feature(&mut v, &format!("u:{word}"), UNIGRAM_WEIGHT);
            }

            let marked: Vec<char> = std::iter::once('#')
                .chain(word.chars())
                .chain(std::iter::once('#'))
                .collect();
            for tri in marked.windows(3) {
                let tri: String = tri.iter().collect();
                self.add_feature(&mut v, &format!("c:{tri}"), TRIGRAM_WEIGHT);
            }
        }

        for pair in words.windows(2) {
            self.add_feature(&mut v, &format!("b:{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl EmbeddingModel for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

// ============================================================================
// EmbeddingService
// ============================================================================

/// Cached, lazily initialized access to an embedding model.
pub struct EmbeddingService {
    model: LazyCapability<dyn EmbeddingModel>,
    normalizer: TextNormalizer,
    caches: Arc<AnalysisCaches>,
}

impl EmbeddingService {
    pub fn new(
        model: LazyCapability<dyn EmbeddingModel>,
        normalizer: TextNormalizer,
        caches: Arc<AnalysisCaches>,
    ) -> Self {
        Self {
            model,
            normalizer,
            caches,
        }
    }

    /// Load the model now. Fails with a capability error.
    pub async fn ensure_ready(&self) -> Result<()> {
        let model = self.model.get().await?;
        debug!(model = model.name(), dimensions = model.dimensions(), "Embedding model ready");
        Ok(())
    }

    /// Embed a normalized text, reusing the cache.
    ///
    /// Long texts are embedded per chunk and mean-pooled into one unit vector.
    pub async fn embed(&self, normalized: &str) -> Result<Embedding> {
        if let Some(hit) = self.caches.embeddings.get(&normalized.to_string()) {
            return Ok(hit);
        }

        let model = self.model.get().await?;
        let chunks = self.normalizer.chunks(normalized);
        let embedded = if chunks.len() == 1 {
            model.embed(normalized).await
        } else {
            model.embed_batch(&chunks).await.map(|vectors| {
                let mut pooled = mean_pool(&vectors);
                l2_normalize(&mut pooled);
                pooled
            })
        };
        let vector = embedded.map_err(|e| Error::External(format!("embedding failed: {e}")))?;

        Ok(self
            .caches
            .embeddings
            .insert_if_absent(normalized.to_string(), Arc::from(vector)))
    }

    /// Embed several normalized texts, keyed by text.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<HashMap<String, Embedding>> {
        let mut unique: Vec<&String> = texts.iter().collect();
        unique.sort();
        unique.dedup();

        let embedded = join_all(unique.iter().map(|t| self.embed(t))).await;
        unique
            .into_iter()
            .zip(embedded)
            .map(|(text, emb)| emb.map(|e| (text.clone(), e)))
            .collect()
    }
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("model", &self.model)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
