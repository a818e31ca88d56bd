//! Confluence scoring
//!
//! One parameterized scorer. Each [`RuleSet`] awards points in the same five
//! dimensions (overextension, crowding, exhaustion, structure, momentum loss),
//! every dimension is capped independently, and the capped values are combined
//! with rule-set specific weights into a per-timeframe score in `[0, 100]`.
//!
//! Cross-timeframe confluence lives in [`confluence`]; the per-symbol views
//! built on top of it live in [`views`].

pub mod confluence;
mod rules;
pub mod views;

use serde::{Deserialize, Serialize};

use crate::features::MarketFeatures;

pub use confluence::{combine, confluence_multiplier, CoreStatus};
pub use views::{
    evaluate_breakout, evaluate_core, evaluate_intraday, evaluate_pullback, AuxiliaryView,
    BreakoutStatus, CoreOutcome, Direction, IntradayStatus, PullbackStatus, TimeframeScore,
};

/// Upper bound of any per-timeframe or combined score
pub const MAX_SCORE: f64 = 100.0;

/// Independent ceiling for each scoring dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionCaps {
    pub overextension: f64,
    pub crowding: f64,
    pub exhaustion: f64,
    pub structure: f64,
    pub momentum: f64,
}

pub const DIMENSION_CAPS: DimensionCaps = DimensionCaps {
    overextension: 30.0,
    crowding: 20.0,
    exhaustion: 30.0,
    structure: 20.0,
    momentum: 15.0,
};

/// Multipliers applied to each capped dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub overextension: f64,
    pub crowding: f64,
    pub exhaustion: f64,
    pub structure: f64,
    pub momentum: f64,
}

impl ScoreWeights {
    pub const UNIFORM: ScoreWeights = ScoreWeights {
        overextension: 1.0,
        crowding: 1.0,
        exhaustion: 1.0,
        structure: 1.0,
        momentum: 1.0,
    };
}

/// Per-dimension points for one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SubScores {
    pub overextension: f64,
    pub crowding: f64,
    pub exhaustion: f64,
    pub structure: f64,
    pub momentum: f64,
}

impl SubScores {
    /// Clamp every dimension to `[0, cap]`
    pub fn capped(self, caps: &DimensionCaps) -> Self {
        Self {
            overextension: self.overextension.clamp(0.0, caps.overextension),
            crowding: self.crowding.clamp(0.0, caps.crowding),
            exhaustion: self.exhaustion.clamp(0.0, caps.exhaustion),
            structure: self.structure.clamp(0.0, caps.structure),
            momentum: self.momentum.clamp(0.0, caps.momentum),
        }
    }

    /// Weighted sum clamped to [`MAX_SCORE`]
    pub fn weighted_total(&self, weights: &ScoreWeights) -> f64 {
        let total = self.overextension * weights.overextension
            + self.crowding * weights.crowding
            + self.exhaustion * weights.exhaustion
            + self.structure * weights.structure
            + self.momentum * weights.momentum;
        total.clamp(0.0, MAX_SCORE)
    }
}

/// Named point tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSet {
    /// Short-bias pump exhaustion on the core timeframes
    Core,
    /// Short readiness on the intraday confirmation timeframes
    IntradayShort,
    /// Dip-buy into an uptrend
    Pullback,
    BreakoutLong,
    BreakoutShort,
}

impl RuleSet {
    pub fn weights(&self) -> ScoreWeights {
        match self {
            RuleSet::Core => ScoreWeights {
                overextension: 1.5,
                crowding: 0.5,
                exhaustion: 1.5,
                structure: 0.5,
                momentum: 1.0,
            },
            RuleSet::IntradayShort
            | RuleSet::Pullback
            | RuleSet::BreakoutLong
            | RuleSet::BreakoutShort => ScoreWeights::UNIFORM,
        }
    }

    /// Raw (uncapped) dimension points
    pub fn raw_points(&self, f: &MarketFeatures) -> SubScores {
        match self {
            RuleSet::Core => rules::core(f),
            RuleSet::IntradayShort => rules::intraday_short(f),
            RuleSet::Pullback => rules::pullback(f),
            RuleSet::BreakoutLong => rules::breakout(f, Direction::Long),
            RuleSet::BreakoutShort => rules::breakout(f, Direction::Short),
        }
    }

    /// Capped dimension points
    pub fn sub_scores(&self, f: &MarketFeatures) -> SubScores {
        self.raw_points(f).capped(&DIMENSION_CAPS)
    }

    /// Per-timeframe score in `[0, 100]`
    pub fn score(&self, f: &MarketFeatures) -> f64 {
        self.sub_scores(f).weighted_total(&self.weights())
    }

    /// Whether this timeframe independently agrees with the rule-set's thesis
    pub fn is_aligned(&self, f: &MarketFeatures) -> bool {
        match self {
            RuleSet::Core => {
                let overbought = f.rsi > 60.0 || f.over_ext_ema > 0.02 || f.is_above_upper_band;
                let fading = f.momentum.is_losing_momentum
                    || f.momentum.has_rsi_divergence
                    || f.momentum.has_volume_divergence;
                overbought || fading
            }
            RuleSet::IntradayShort => {
                f.rsi > 65.0 || f.is_above_upper_band || f.momentum.has_rsi_divergence
            }
            RuleSet::Pullback => rules::is_pullback_setup(f),
            RuleSet::BreakoutLong => rules::breakout_checks(f, Direction::Long).is_confirmed(),
            RuleSet::BreakoutShort => rules::breakout_checks(f, Direction::Short).is_confirmed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::MomentumSignals;

    fn exhausted_pump() -> MarketFeatures {
        MarketFeatures {
            price: 109.0,
            rsi: 82.0,
            over_ext_ema: 0.09,
            rejection_wick_ratio: 0.6,
            is_above_upper_band: true,
            ..Default::default()
        }
    }

    fn everything_firing() -> MarketFeatures {
        MarketFeatures {
            pct_change_24h: 60.0,
            over_ext_ema: 0.2,
            over_ext_vwap: 0.2,
            rsi: 95.0,
            is_above_upper_band: true,
            rejection_wick_ratio: 0.9,
            funding_rate: 0.002,
            open_interest_delta: 0.5,
            nearest_support: Some(100.0),
            dist_to_support_atr: Some(-1.0),
            is_breakdown: true,
            is_retest: true,
            momentum: MomentumSignals {
                has_rsi_divergence: true,
                has_volume_divergence: true,
                momentum_slope: -3.0,
                rsi_slope: -5.0,
                volume_decline_ratio: 0.2,
                is_losing_momentum: true,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_exhausted_pump_scores_high() {
        let f = exhausted_pump();
        let subs = RuleSet::Core.sub_scores(&f);
        assert_eq!(subs.overextension, 30.0);
        assert_eq!(subs.exhaustion, 30.0);
        assert!(RuleSet::Core.score(&f) >= 85.0);
        assert!(RuleSet::Core.is_aligned(&f));
    }

    #[test]
    fn test_caps_hold_for_every_rule_set() {
        let f = everything_firing();
        for rule_set in [
            RuleSet::Core,
            RuleSet::IntradayShort,
            RuleSet::Pullback,
            RuleSet::BreakoutLong,
            RuleSet::BreakoutShort,
        ] {
            let subs = rule_set.sub_scores(&f);
            assert!(subs.overextension <= DIMENSION_CAPS.overextension);
            assert!(subs.crowding <= DIMENSION_CAPS.crowding);
            assert!(subs.exhaustion <= DIMENSION_CAPS.exhaustion);
            assert!(subs.structure <= DIMENSION_CAPS.structure);
            assert!(subs.momentum <= DIMENSION_CAPS.momentum);
            let score = rule_set.score(&f);
            assert!((0.0..=MAX_SCORE).contains(&score));
        }
    }

    #[test]
    fn test_rescoring_is_deterministic() {
        let f = everything_firing();
        assert_eq!(RuleSet::Core.score(&f), RuleSet::Core.score(&f));
        assert_eq!(
            RuleSet::IntradayShort.score(&f),
            RuleSet::IntradayShort.score(&f.clone())
        );
    }

    #[test]
    fn test_quiet_market_scores_zero() {
        let f = MarketFeatures::default();
        assert_eq!(RuleSet::Core.score(&f), 0.0);
        assert!(!RuleSet::Core.is_aligned(&f));
    }

    #[test]
    fn test_momentum_loss_alone_aligns() {
        let f = MarketFeatures {
            momentum: MomentumSignals {
                is_losing_momentum: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(RuleSet::Core.is_aligned(&f));
        assert_eq!(RuleSet::Core.sub_scores(&f).momentum, 10.0);
    }
}
