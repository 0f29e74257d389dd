//! KPI concept scorer.
//!
//! Each of the six dimensions has a curated keyword lexicon. A dimension's
//! score blends two signals:
//!
//! 1. cosine similarity between the text embedding and a concept embedding
//!    built from the lexicon, and
//! 2. the sum of matched keyword weights, where a negator shortly before a
//!    keyword flips its sign; the sum is scaled and clipped.
//!
//! The blend is then modulated by polarity (inverted for frustration) and
//! clamped to [-1, 1].

use aho_corasick::{AhoCorasick, MatchKind};
use pulse_common::{AnalysisConfig, Error, Result, ResultExt};
use std::sync::Arc;
use tracing::debug;

use crate::cache::AnalysisCaches;
use crate::embedding::{cosine_similarity, EmbeddingService};
use crate::negation::NegationWindow;
use crate::normalizer::TextNormalizer;
use crate::types::{clamp_unit, Embedding, KpiDimension, KpiScores};

// ============================================================================
// Lexicons
// ============================================================================

const TRUST: &[(&str, f64)] = &[
    ("trust", 1.4),
    ("reliab", 1.3),
    ("honest", 1.3),
    ("transparen", 1.2),
    ("credib", 1.2),
    ("accountab", 1.2),
    ("integrity", 1.0),
    ("depend", 1.0),
    ("believ", 1.0),
    ("genuine", 1.0),
    ("secure", 1.0),
];

const OPTIMISM: &[(&str, f64)] = &[
    ("optimis", 1.4),
    ("hope", 1.3),
    ("promis", 1.2),
    ("improv", 1.2),
    ("excit", 1.2),
    ("progress", 1.0),
    ("future", 1.0),
    ("better", 1.0),
    ("opportunit", 1.0),
    ("bright", 1.0),
    ("forward", 1.0),
];

const FRUSTRATION: &[(&str, f64)] = &[
    ("frustrat", 1.4),
    ("annoy", 1.3),
    ("broken", 1.2),
    ("fail", 1.2),
    ("useless", 1.2),
    ("angry", 1.2),
    ("difficult", 1.0),
    ("problem", 1.0),
    ("slow", 1.0),
    ("waste", 1.0),
    ("complain", 1.0),
    ("stuck", 1.0),
    ("hassle", 1.0),
    ("confus", 1.0),
];

const CLARITY: &[(&str, f64)] = &[
    ("clarity", 1.4),
    ("clear", 1.3),
    ("clarif", 1.2),
    ("understand", 1.2),
    ("straightforward", 1.2),
    ("explain", 1.0),
    ("explanation", 1.0),
    ("simple", 1.0),
    ("concise", 1.0),
    ("intuitive", 1.0),
    ("obvious", 1.0),
    ("document", 1.0),
];

const ACCESS: &[(&str, f64)] = &[
    ("access", 1.4),
    ("afford", 1.3),
    ("availab", 1.2),
    ("inclusi", 1.2),
    ("convenien", 1.0),
    ("reach", 1.0),
    ("obtain", 1.0),
    ("usabl", 1.0),
];

const FAIRNESS: &[(&str, f64)] = &[
    ("fair", 1.4),
    ("equit", 1.3),
    ("justice", 1.3),
    ("equal", 1.2),
    ("impartial", 1.2),
    ("unbiased", 1.2),
    ("balanced", 1.0),
    ("rights", 1.0),
    ("even-handed", 1.0),
    ("deserv", 1.0),
];

/// Keyword lexicon with weights for one dimension.
pub fn lexicon(dim: KpiDimension) -> &'static [(&'static str, f64)] {
    match dim {
        KpiDimension::Trust => TRUST,
        KpiDimension::Optimism => OPTIMISM,
        KpiDimension::Frustration => FRUSTRATION,
        KpiDimension::Clarity => CLARITY,
        KpiDimension::Access => ACCESS,
        KpiDimension::Fairness => FAIRNESS,
    }
}

/// Synthetic sentence the concept embedding is built from.
pub fn concept_description(dim: KpiDimension) -> String {
    let keywords: Vec<&str> = lexicon(dim).iter().map(|(k, _)| *k).collect();
    format!("{}: {}", dim.as_str(), keywords.join(", "))
}

// ============================================================================
// KpiScorer
// ============================================================================

pub struct KpiScorer {
    matcher: AhoCorasick,
    /// Pattern id -> (dimension, weight)
    entries: Vec<(KpiDimension, f64)>,
    negation: NegationWindow,
    keyword_scale: f64,
    keyword_clip: f64,
    normalizer: TextNormalizer,
    embeddings: Arc<EmbeddingService>,
    caches: Arc<AnalysisCaches>,
}

impl KpiScorer {
    pub fn new(
        config: &AnalysisConfig,
        embeddings: Arc<EmbeddingService>,
        caches: Arc<AnalysisCaches>,
    ) -> Result<Self> {
        let mut patterns = Vec::new();
        let mut entries = Vec::new();
        for dim in KpiDimension::ALL {
            for (keyword, weight) in lexicon(dim) {
                patterns.push(*keyword);
                entries.push((dim, *weight));
            }
        }

        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(&patterns)
            .map_err(|e| Error::capability_init("kpi lexicon", e))?;

        Ok(Self {
            matcher,
            entries,
            negation: NegationWindow::from_config(config),
            keyword_scale: config.keyword_scale,
            keyword_clip: config.keyword_clip.abs(),
            normalizer: TextNormalizer::from_config(config),
            embeddings,
            caches,
        })
    }

    /// Raw per-dimension keyword weight sums, indexed by [`KpiDimension::index`].
    ///
    /// Every lexicon keyword occurring as a substring counts once per
    /// occurrence; a negator in the look-back window negates that occurrence.
    pub fn keyword_signal(&self, normalized: &str) -> [f64; 6] {
        let mut sums = [0.0; 6];
        for mat in self.matcher.find_overlapping_iter(normalized) {
            let (dim, weight) = self.entries[mat.pattern().as_usize()];
            let signed = if self.negation.is_negated(normalized, mat.start()) {
                -weight
            } else {
                weight
            };
            sums[dim.index()] += signed;
        }
        sums
    }

    /// Scaled and clipped keyword contribution for one dimension's sum.
    pub fn keyword_contribution(&self, sum: f64) -> f64 {
        (sum * self.keyword_scale).clamp(-self.keyword_clip, self.keyword_clip)
    }

    /// Concept embedding for a dimension, built once and cached.
    pub async fn concept_embedding(&self, dim: KpiDimension) -> Result<Embedding> {
        if let Some(hit) = self.caches.concepts.get(&dim) {
            return Ok(hit);
        }
        let description = self.normalizer.normalize(&concept_description(dim));
        let embedding = self
            .embeddings
            .embed(&description)
            .await
            .context(format!("embedding {} concept", dim.as_str()))?;
        Ok(self.caches.concepts.insert_if_absent(dim, embedding))
    }

    /// Build all six concept embeddings up front.
    pub async fn prepare(&self) -> Result<()> {
        let descriptions: Vec<String> = KpiDimension::ALL
            .iter()
            .map(|d| self.normalizer.normalize(&concept_description(*d)))
            .collect();
        let embedded = self.embeddings.embed_batch(&descriptions).await?;

        for (dim, description) in KpiDimension::ALL.iter().zip(&descriptions) {
            if let Some(embedding) = embedded.get(description) {
                self.caches.concepts.insert_if_absent(*dim, embedding.clone());
            }
        }
        debug!(concepts = self.caches.concepts.len(), "KPI concept embeddings ready");
        Ok(())
    }

    /// Score all six dimensions for one text.
    ///
    /// `polarity` is the value used for modulation, which callers may have
    /// attenuated for short texts.
    pub async fn score(
        &self,
        text_embedding: &[f32],
        normalized: &str,
        polarity: f64,
    ) -> Result<KpiScores> {
        let signal = self.keyword_signal(normalized);
        let mut scores = KpiScores::default();

        for dim in KpiDimension::ALL {
            let concept = self.concept_embedding(dim).await?;
            let similarity = cosine_similarity(text_embedding, &concept);
            let blended = similarity + self.keyword_contribution(signal[dim.index()]);
            let modulation = if dim.is_inverse() {
                1.0 - polarity
            } else {
                1.0 + polarity
            };
            scores.set(dim, clamp_unit(blended * modulation));
        }

        Ok(scores)
    }
}

impl std::fmt::Debug for KpiScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KpiScorer")
            .field("patterns", &self.entries.len())
            .field("negation", &self.negation)
            .field("keyword_scale", &self.keyword_scale)
            .field("keyword_clip", &self.keyword_clip)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::LazyCapability;
    use crate::embedding::{EmbeddingModel, HashingEmbedder};

    fn scorer() -> KpiScorer {
        let config = AnalysisConfig::default();
        let caches = Arc::new(AnalysisCaches::new());
        let model: Arc<dyn EmbeddingModel> = Arc::new(HashingEmbedder::default());
        let embeddings = Arc::new(EmbeddingService::new(
            LazyCapability::ready("embedding", model),
            TextNormalizer::from_config(&config),
            caches.clone(),
        ));
        KpiScorer::new(&config, embeddings, caches).unwrap()
    }

    #[test]
    fn test_lexicons_have_no_duplicates() {
        let mut all: Vec<&str> = KpiDimension::ALL
            .iter()
            .flat_map(|d| lexicon(*d).iter().map(|(k, _)| *k))
            .collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn test_keyword_signal_negation() {
        let s = scorer();
        let plain = s.keyword_signal("this process is reliable and fair");
        let negated = s.keyword_signal("this process is not reliable and not fair");

        let trust = KpiDimension::Trust.index();
        let fairness = KpiDimension::Fairness.index();
        assert!(plain[trust] > 0.0);
        assert!(plain[fairness] > 0.0);
        assert!(negated[trust] < plain[trust]);
        assert!(negated[fairness] < plain[fairness]);
        assert!(negated[trust] < 0.0);
        assert!(negated[fairness] < 0.0);
    }

    #[test]
    fn test_keyword_contribution_clips() {
        let s = scorer();
        assert!((s.keyword_contribution(1.0) - 0.2).abs() < 1e-12);
        assert_eq!(s.keyword_contribution(10.0), 0.5);
        assert_eq!(s.keyword_contribution(-10.0), -0.5);
    }

    #[tokio::test]
    async fn test_scores_bounded_and_modulated() {
        let s = scorer();
        let text = "so frustrating and broken, a useless waste";
        let emb = s.embeddings.embed(text).await.unwrap();

        let negative = s.score(&emb, text, -0.8).await.unwrap();
        let positive = s.score(&emb, text, 0.8).await.unwrap();
        for (_, v) in negative.iter().chain(positive.iter()) {
            assert!((-1.0..=1.0).contains(&v));
        }
        assert!(negative.frustration > 0.0);
        assert!(negative.frustration > positive.frustration);
    }

    #[tokio::test]
    async fn test_concepts_cached_once() {
        let s = scorer();
        s.prepare().await.unwrap();
        assert_eq!(s.caches.concepts.len(), 6);

        let a = s.concept_embedding(KpiDimension::Access).await.unwrap();
        let b = s.concept_embedding(KpiDimension::Access).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
