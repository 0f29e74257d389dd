//! Sentiment capability.
//!
//! [`SentimentModel`] is the model seam; [`LexiconSentiment`] is the built-in
//! weighted-lexicon model with intensifiers and negation. [`SentimentService`]
//! adds lazy initialization and a cache keyed by the normalized text prefix.

use aho_corasick::{AhoCorasick, MatchKind};
use async_trait::async_trait;
use pulse_common::util::char_prefix;
use pulse_common::{Error, Result};
use std::sync::Arc;
use tracing::debug;

use crate::cache::AnalysisCaches;
use crate::capability::LazyCapability;
use crate::negation::{is_negator, NegationWindow};
use crate::types::{RawSentiment, SentimentLabel};

/// Text sentiment model producing a label and a confidence.
#[async_trait]
pub trait SentimentModel: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, text: &str) -> anyhow::Result<RawSentiment>;

    async fn classify_batch(&self, texts: &[String]) -> anyhow::Result<Vec<RawSentiment>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.classify(text).await?);
        }
        Ok(out)
    }
}

// ============================================================================
// LexiconSentiment
// ============================================================================

/// Word-prefix polarity weights. Matches must start at a word boundary.
const LEXICON: &[(&str, f64)] = &[
    // Positive
    ("love", 3.0),
    ("excellent", 3.0),
    ("wonderful", 2.8),
    ("awesome", 2.8),
    ("amazing", 2.8),
    ("great", 2.5),
    ("happy", 2.2),
    ("enjoy", 2.0),
    ("good", 1.8),
    ("helpful", 1.8),
    ("success", 1.8),
    ("thank", 1.5),
    ("fair", 1.5),
    ("honest", 1.5),
    ("trust", 1.5),
    ("benefi", 1.4),
    ("effective", 1.4),
    ("reliab", 1.3),
    ("improv", 1.3),
    ("hope", 1.2),
    ("easy", 1.2),
    ("transparen", 1.0),
    ("clear", 1.0),
    ("support", 0.8),
    ("nice", 0.6),
    // Negative
    ("hate", -3.0),
    ("terrible", -3.0),
    ("awful", -3.0),
    ("horrible", -3.0),
    ("worst", -3.0),
    ("scam", -2.8),
    ("frustrat", -2.5),
    ("corrupt", -2.5),
    ("useless", -2.4),
    ("angry", -2.4),
    ("disappoint", -2.3),
    ("worse", -2.2),
    ("broken", -2.0),
    ("fail", -2.0),
    ("annoy", -2.0),
    ("unfair", -2.0),
    ("ridiculous", -2.0),
    ("bad", -1.8),
    ("poor", -1.8),
    ("sad", -1.8),
    ("waste", -1.6),
    ("confus", -1.5),
    ("difficult", -1.3),
    ("bias", -1.2),
    ("problem", -1.2),
    ("slow", -1.0),
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("extremely", 1.8),
    ("incredibly", 1.7),
    ("absolutely", 1.6),
    ("very", 1.5),
    ("completely", 1.5),
    ("really", 1.4),
    ("totally", 1.4),
    ("highly", 1.4),
    ("so", 1.3),
    ("quite", 1.2),
    ("somewhat", 0.7),
    ("slightly", 0.6),
];

/// Scale applied to a negated word's weight.
const NEGATED_SCALE: f64 = -0.75;

/// Squashing constant for `net / sqrt(net^2 + alpha)`.
const NORMALIZATION_ALPHA: f64 = 15.0;

fn intensifier(word: &str) -> Option<f64> {
    INTENSIFIERS
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, scale)| *scale)
}

fn is_word_start(text: &str, start: usize) -> bool {
    text.get(..start)
        .and_then(|before| before.chars().next_back())
        .map_or(true, |c| !c.is_alphanumeric())
}

/// Weighted-lexicon sentiment model.
#[derive(Debug, Clone)]
pub struct LexiconSentiment {
    matcher: AhoCorasick,
    weights: Vec<f64>,
    negation: NegationWindow,
}

impl LexiconSentiment {
    pub fn new() -> anyhow::Result<Self> {
        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(LEXICON.iter().map(|(word, _)| *word))
            .map_err(|e| anyhow::anyhow!("Failed to build sentiment lexicon matcher: {e}"))?;

        Ok(Self {
            matcher,
            weights: LEXICON.iter().map(|(_, w)| *w).collect(),
            negation: NegationWindow::default(),
        })
    }

    pub fn with_negation_window(mut self, window: NegationWindow) -> Self {
        self.negation = window;
        self
    }

    /// Sum of matched word weights after intensifiers and negation.
    pub fn net_valence(&self, text: &str) -> f64 {
        let text = text.to_lowercase();
        let mut net = 0.0;

        for mat in self.matcher.find_iter(&text) {
            let start = mat.start();
            if !is_word_start(&text, start) {
                continue;
            }

            let mut weight = self.weights[mat.pattern().as_usize()];
            let preceding: Vec<&str> = self.negation.preceding(&text, start).collect();
            if let Some(scale) = preceding.first().and_then(|w| intensifier(w)) {
                weight *= scale;
            }
            if preceding.iter().any(|w| is_negator(w)) {
                weight *= NEGATED_SCALE;
            }
            net += weight;
        }
        net
    }

    /// Classify synchronously.
    pub fn score(&self, text: &str) -> RawSentiment {
        let net = self.net_valence(text);
        let compound = net / (net * net + NORMALIZATION_ALPHA).sqrt();
        let label = if compound < 0.0 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Positive
        };
        RawSentiment::new(label, 0.5 + 0.5 * compound.abs())
    }
}

#[async_trait]
impl SentimentModel for LexiconSentiment {
    fn name(&self) -> &str {
        "lexicon"
    }

    async fn classify(&self, text: &str) -> anyhow::Result<RawSentiment> {
        Ok(self.score(text))
    }

    async fn classify_batch(&self, texts: &[String]) -> anyhow::Result<Vec<RawSentiment>> {
        Ok(texts.iter().map(|t| self.score(t)).collect())
    }
}

// ============================================================================
// SentimentService
// ============================================================================

/// Cached, lazily initialized access to a sentiment model.
pub struct SentimentService {
    model: LazyCapability<dyn SentimentModel>,
    caches: Arc<AnalysisCaches>,
    key_chars: usize,
}

impl SentimentService {
    pub fn new(
        model: LazyCapability<dyn SentimentModel>,
        caches: Arc<AnalysisCaches>,
        key_chars: usize,
    ) -> Self {
        Self {
            model,
            caches,
            key_chars: key_chars.max(1),
        }
    }

    /// Load the model now. Fails with a capability error.
    pub async fn ensure_ready(&self) -> Result<()> {
        let model = self.model.get().await?;
        debug!(model = model.name(), "Sentiment model ready");
        Ok(())
    }

    fn cache_key(&self, normalized: &str) -> String {
        char_prefix(normalized, self.key_chars).to_string()
    }

    /// Classify a normalized text, reusing the prefix-keyed cache.
    pub async fn classify(&self, normalized: &str) -> Result<RawSentiment> {
        let key = self.cache_key(normalized);
        if let Some(hit) = self.caches.sentiments.get(&key) {
            return Ok(hit);
        }

        let model = self.model.get().await?;
        let raw = model
            .classify(normalized)
            .await
            .map_err(|e| Error::External(format!("sentiment classification failed: {e}")))?;
        Ok(self.caches.sentiments.insert_if_absent(key, raw))
    }

    /// Classify several normalized texts; output is aligned with the input.
    pub async fn classify_batch(&self, texts: &[String]) -> Result<Vec<RawSentiment>> {
        let keys: Vec<String> = texts.iter().map(|t| self.cache_key(t)).collect();
        let mut out: Vec<Option<RawSentiment>> =
            keys.iter().map(|k| self.caches.sentiments.get(k)).collect();

        let missing: Vec<usize> = (0..texts.len()).filter(|i| out[*i].is_none()).collect();
        if !missing.is_empty() {
            let model = self.model.get().await?;
            let batch: Vec<String> = missing.iter().map(|i| texts[*i].clone()).collect();
            let scored = model
                .classify_batch(&batch)
                .await
                .map_err(|e| Error::External(format!("sentiment classification failed: {e}")))?;
            if scored.len() != batch.len() {
                return Err(Error::External(format!(
                    "sentiment model returned {} results for {} texts",
                    scored.len(),
                    batch.len()
                )));
            }
            for (i, raw) in missing.into_iter().zip(scored) {
                out[i] = Some(self.caches.sentiments.insert_if_absent(keys[i].clone(), raw));
            }
        }

        Ok(out.into_iter().flatten().collect())
    }
}

impl std::fmt::Debug for SentimentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentService")
            .field("model", &self.model)
            .field("key_chars", &self.key_chars)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexicon() -> LexiconSentiment {
        LexiconSentiment::new().unwrap()
    }

    #[test]
    fn test_positive_and_negative_labels() {
        let model = lexicon();
        let pos = model.score("i love this transparent and fair process");
        assert_eq!(pos.label, SentimentLabel::Positive);
        assert!(pos.score > 0.85);

        let neg = model.score("this is so frustrating and broken");
        assert_eq!(neg.label, SentimentLabel::Negative);
        assert!(neg.score > 0.85);
    }

    #[test]
    fn test_no_matches_is_coin_flip() {
        let raw = lexicon().score("the meeting is on tuesday");
        assert_eq!(raw.label, SentimentLabel::Positive);
        assert_eq!(raw.score, 0.5);
    }

    #[test]
    fn test_mild_word_stays_low_confidence() {
        let raw = lexicon().score("the weather is nice today");
        assert!(raw.score < 0.6);
    }

    #[test]
    fn test_negation_flips() {
        let model = lexicon();
        assert!(model.net_valence("this process is reliable and fair") > 0.0);
        assert!(model.net_valence("this process is not reliable and not fair") < 0.0);
    }

    #[test]
    fn test_intensifier_scales() {
        let model = lexicon();
        assert!(model.net_valence("very good") > model.net_valence("good"));
        assert!(model.net_valence("slightly good") < model.net_valence("good"));
    }

    #[test]
    fn test_matches_need_word_start() {
        let model = lexicon();
        assert_eq!(model.net_valence("affair"), 0.0);
        assert!(model.net_valence("unfair") < 0.0);
    }

    #[tokio::test]
    async fn test_service_caches_by_prefix() {
        let model: Arc<dyn SentimentModel> = Arc::new(lexicon());
        let caches = Arc::new(AnalysisCaches::new());
        let svc = SentimentService::new(LazyCapability::ready("sentiment", model), caches.clone(), 8);

        let a = svc.classify("great stuff, truly").await.unwrap();
        let b = svc.classify("great stuff and more").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(caches.sentiments.len(), 1);

        let batch = svc
            .classify_batch(&["great stuff!".to_string(), "awful".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].label, SentimentLabel::Negative);
        assert_eq!(caches.sentiments.len(), 2);
    }
}
