//! Negation look-back shared by the lexicon sentiment model and the KPI scorer.

use pulse_common::AnalysisConfig;

/// Closed list of negation markers, in normalized (apostrophe-free) form.
pub const NEGATORS: &[&str] = &[
    "not", "no", "never", "cannot", "dont", "cant", "wont", "isnt", "doesnt", "didnt", "wasnt",
    "arent", "shouldnt", "couldnt", "wouldnt", "aint", "lack", "lacks", "lacking", "without",
    "absence", "missing", "barely", "hardly", "scarcely", "neither", "nor", "none",
];

pub fn is_negator(word: &str) -> bool {
    NEGATORS.contains(&word)
}

/// Look-back window in front of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegationWindow {
    /// Maximum number of preceding tokens inspected
    pub tokens: usize,
    /// Maximum number of preceding characters inspected
    pub chars: usize,
}

impl NegationWindow {
    pub fn new(tokens: usize, chars: usize) -> Self {
        Self { tokens, chars }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.negation_window_tokens, config.negation_window_chars)
    }

    /// Tokens before byte offset `start`, nearest first, limited by the window.
    ///
    /// The partial token cut by the character limit is kept; it simply never
    /// matches a negator unless it is a whole one.
    pub fn preceding<'a>(&self, text: &'a str, start: usize) -> impl Iterator<Item = &'a str> {
        let before = text.get(..start).unwrap_or("");
        let from = before
            .char_indices()
            .rev()
            .nth(self.chars.saturating_sub(1))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        let window = if self.chars == 0 { "" } else { &before[from..] };

        window
            .split_whitespace()
            .rev()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .take(self.tokens)
    }

    /// True when a negator occurs in the window before `start`.
    pub fn is_negated(&self, text: &str, start: usize) -> bool {
        self.preceding(text, start).any(is_negator)
    }
}

impl Default for NegationWindow {
    fn default() -> Self {
        Self::new(3, 30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(text: &str, needle: &str) -> usize {
        text.find(needle).unwrap()
    }

    #[test]
    fn test_cannot_negates() {
        let w = NegationWindow::default();
        let text = "the board cannot be trusted";
        assert!(w.is_negated(text, at(text, "trusted")));
    }

    #[test]
    fn test_window_from_config() {
        let config = AnalysisConfig {
            negation_window_tokens: 0,
            negation_window_chars: 0,
            ..AnalysisConfig::default()
        };
        let w = NegationWindow::from_config(&config);
        let text = "not fair";
        assert!(!w.is_negated(text, at(text, "fair")));
        assert_eq!(
            NegationWindow::from_config(&AnalysisConfig::default()),
            NegationWindow::default()
        );
    }

    #[test]
    fn test_negation_within_three_tokens() {
        let w = NegationWindow::default();
        let text = "this is not very reliable";
        assert!(w.is_negated(text, at(text, "reliable")));

        let text = "not that it was ever reliable";
        assert!(!w.is_negated(text, at(text, "reliable")));
    }

    #[test]
    fn test_negation_char_limit() {
        let w = NegationWindow::new(3, 10);
        let text = "no extraordinarily reliable";
        assert!(!w.is_negated(text, at(text, "reliable")));
        assert!(NegationWindow::new(3, 30).is_negated(text, at(text, "reliable")));
    }

    #[test]
    fn test_preceding_strips_punctuation() {
        let w = NegationWindow::default();
        let text = "never, ever fair";
        let words: Vec<_> = w.preceding(text, at(text, "fair")).collect();
        assert_eq!(words, vec!["ever", "never"]);
    }

    #[test]
    fn test_start_of_text() {
        let w = NegationWindow::default();
        assert!(!w.is_negated("fair", 0));
        assert_eq!(NegationWindow::new(3, 0).preceding("no fair", 3).count(), 0);
    }
}
