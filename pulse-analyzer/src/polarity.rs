//! Polarity calibration.
//!
//! Maps a raw `(label, score)` pair onto a signed value in [-1, 1] with a
//! piecewise-linear curve, and picks a three-way category. Scores below the
//! neutral threshold are always neutral and additionally dampened so
//! low-confidence outputs never produce extreme values.

use pulse_common::AnalysisConfig;

use crate::types::{PolarityCategory, PolarityScore, RawSentiment, SentimentLabel};

/// Value reached at the scale threshold.
const KNEE_VALUE: f64 = 0.3;

/// Width of the dampening ramp above 0.5.
const DAMPENING_SPAN: f64 = 0.10;

/// Lower bound of the dampening factor.
const MIN_DAMPENING: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct PolarityCalibrator {
    neutral_threshold: f64,
    scale_threshold: f64,
}

impl Default for PolarityCalibrator {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

impl PolarityCalibrator {
    pub fn new(neutral_threshold: f64, scale_threshold: f64) -> Self {
        Self {
            neutral_threshold,
            scale_threshold,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.neutral_threshold, config.scale_threshold)
    }

    pub fn calibrate(&self, raw: RawSentiment) -> PolarityScore {
        let score = raw.score;
        let scale = self.scale_threshold;

        let magnitude = if score >= scale {
            KNEE_VALUE + (1.0 - KNEE_VALUE) * (score - scale) / (1.0 - scale)
        } else {
            KNEE_VALUE * (score - 0.5) / (scale - 0.5)
        };

        let mut value = match raw.label {
            SentimentLabel::Positive => magnitude,
            SentimentLabel::Negative => -magnitude,
        };

        if score < self.neutral_threshold {
            value *= MIN_DAMPENING.max((score - 0.5) / DAMPENING_SPAN);
        }

        let category = if score >= self.neutral_threshold {
            match raw.label {
                SentimentLabel::Positive => PolarityCategory::Positive,
                SentimentLabel::Negative => PolarityCategory::Negative,
            }
        } else {
            PolarityCategory::Neutral
        };

        PolarityScore {
            value: crate::types::clamp_unit(value),
            category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibrate(label: SentimentLabel, score: f64) -> PolarityScore {
        PolarityCalibrator::default().calibrate(RawSentiment::new(label, score))
    }

    #[test]
    fn test_upper_segment() {
        let p = calibrate(SentimentLabel::Positive, 1.0);
        assert!((p.value - 1.0).abs() < 1e-9);
        assert_eq!(p.category, PolarityCategory::Positive);

        let p = calibrate(SentimentLabel::Positive, 0.65);
        assert!((p.value - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_lower_segment_between_thresholds() {
        let p = calibrate(SentimentLabel::Positive, 0.62);
        assert!((p.value - 0.3 * 0.12 / 0.15).abs() < 1e-9);
        assert_eq!(p.category, PolarityCategory::Positive);
    }

    #[test]
    fn test_negative_mirrors_positive() {
        let pos = calibrate(SentimentLabel::Positive, 0.8);
        let neg = calibrate(SentimentLabel::Negative, 0.8);
        assert!((pos.value + neg.value).abs() < 1e-12);
        assert_eq!(neg.category, PolarityCategory::Negative);
    }

    #[test]
    fn test_low_confidence_is_neutral_and_dampened() {
        let p = calibrate(SentimentLabel::Negative, 0.55);
        assert_eq!(p.category, PolarityCategory::Neutral);
        // 0.3 * 0.05 / 0.15 = 0.1, times max(0.5, 0.5)
        assert!((p.value + 0.05).abs() < 1e-9);

        let p = calibrate(SentimentLabel::Positive, 0.5);
        assert_eq!(p.value, 0.0);
        assert_eq!(p.category, PolarityCategory::Neutral);
    }

    #[test]
    fn test_always_in_range() {
        for i in 0..=100 {
            let s = i as f64 / 100.0;
            for label in [SentimentLabel::Positive, SentimentLabel::Negative] {
                let p = calibrate(label, s);
                assert!((-1.0..=1.0).contains(&p.value), "score {s} gave {}", p.value);
            }
        }
    }
}
