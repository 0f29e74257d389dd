//! Text normalization.
//!
//! Produces the canonical form used as cache key and as input to every
//! scoring step: lowercase, conservative character allow-list, collapsed
//! whitespace, capped length. Also classifies texts by token count and
//! splits long texts into fixed token windows for embedding.

use pulse_common::AnalysisConfig;

/// Length class of a normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextLength {
    /// Fewer tokens than the short threshold
    Short,
    Regular,
    /// More tokens than the long threshold; embedded chunk by chunk
    Long,
}

/// Pure, deterministic text normalizer.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    max_chars: usize,
    short_tokens: usize,
    long_tokens: usize,
    chunk_tokens: usize,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

impl TextNormalizer {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            max_chars: config.max_text_chars,
            short_tokens: config.short_text_tokens,
            long_tokens: config.long_text_tokens,
            chunk_tokens: config.chunk_tokens.max(1),
        }
    }

    /// Canonicalize raw text.
    pub fn normalize(&self, raw: &str) -> String {
        let mut out = String::with_capacity(raw.len().min(self.max_chars));
        let mut pending_space = false;

        for ch in raw.chars().flat_map(char::to_lowercase) {
            if ch.is_whitespace() {
                pending_space = !out.is_empty();
                continue;
            }
            if !is_allowed(ch) {
                continue;
            }
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }

        match out.char_indices().nth(self.max_chars) {
            Some((idx, _)) => out[..idx].trim_end().to_string(),
            None => out,
        }
    }

    /// Classify a normalized text by whitespace token count. The long limit
    /// is checked first.
    pub fn classify(&self, normalized: &str) -> TextLength {
        let tokens = normalized.split_whitespace().count();
        if tokens > self.long_tokens {
            TextLength::Long
        } else if tokens < self.short_tokens {
            TextLength::Short
        } else {
            TextLength::Regular
        }
    }

    /// Split a normalized text into embedding windows.
    ///
    /// Texts that are not long come back as a single chunk.
    pub fn chunks(&self, normalized: &str) -> Vec<String> {
        if self.classify(normalized) != TextLength::Long {
            return vec![normalized.to_string()];
        }

        normalized
            .split_whitespace()
            .collect::<Vec<_>>()
            .chunks(self.chunk_tokens)
            .map(|window| window.join(" "))
            .collect()
    }
}

/// Word characters, spaces, and `. , ! ? -`.
fn is_allowed(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || matches!(ch, '.' | ',' | '!' | '?' | '-')
}
