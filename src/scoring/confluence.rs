//! Cross-timeframe confluence

use serde::{Deserialize, Serialize};
use std::fmt;

use super::MAX_SCORE;

/// Core alert tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreStatus {
    Watch,
    Setup,
    Trigger,
}

impl CoreStatus {
    /// TRIGGER: >=2 aligned and score >= 40; SETUP: >=1 and >= 35; WATCH: >= 30
    pub fn classify(confluence: usize, score: f64) -> Option<Self> {
        if confluence >= 2 && score >= 40.0 {
            Some(CoreStatus::Trigger)
        } else if confluence >= 1 && score >= 35.0 {
            Some(CoreStatus::Setup)
        } else if score >= 30.0 {
            Some(CoreStatus::Watch)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CoreStatus::Watch => "WATCH",
            CoreStatus::Setup => "SETUP",
            CoreStatus::Trigger => "TRIGGER",
        }
    }
}

impl fmt::Display for CoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ×1.3 when every analyzed timeframe (at least two) is aligned, ×1.1 when
/// at least one is, ×1.0 otherwise
pub fn confluence_multiplier(aligned: usize, analyzed: usize) -> f64 {
    if aligned >= 2 && aligned == analyzed {
        1.3
    } else if aligned >= 1 {
        1.1
    } else {
        1.0
    }
}

/// Mean of the per-timeframe scores times `multiplier`, capped at 100
pub fn combine(scores: &[f64], multiplier: f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean * multiplier).clamp(0.0, MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_status_ladder() {
        assert_eq!(CoreStatus::classify(2, 40.0), Some(CoreStatus::Trigger));
        assert_eq!(CoreStatus::classify(2, 39.9), Some(CoreStatus::Setup));
        assert_eq!(CoreStatus::classify(1, 90.0), Some(CoreStatus::Setup));
        assert_eq!(CoreStatus::classify(0, 34.0), Some(CoreStatus::Watch));
        assert_eq!(CoreStatus::classify(1, 29.9), None);
    }

    #[test]
    fn test_multiplier() {
        assert_relative_eq!(confluence_multiplier(2, 2), 1.3);
        assert_relative_eq!(confluence_multiplier(1, 2), 1.1);
        assert_relative_eq!(confluence_multiplier(2, 3), 1.1);
        assert_relative_eq!(confluence_multiplier(0, 2), 1.0);
        assert_relative_eq!(confluence_multiplier(1, 1), 1.1);
    }

    #[test]
    fn test_combine_caps_at_100() {
        assert_relative_eq!(combine(&[90.0, 86.0], 1.3), 100.0);
        assert_relative_eq!(combine(&[40.0, 20.0], 1.1), 33.0, epsilon = 1e-9);
        assert_eq!(combine(&[], 1.3), 0.0);
    }

    #[test]
    fn test_status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&CoreStatus::Trigger).unwrap(),
            r#""TRIGGER""#
        );
    }
}
