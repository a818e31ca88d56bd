//! Per-symbol views built from per-timeframe features
//!
//! The core view drives alerts and auto-scalp entries. The auxiliary views
//! (intraday short readiness, pullback, breakout) reuse the same scorer with
//! their own rule-sets and status ladders and are evaluated independently, so
//! a symbol can carry conflicting statuses across views.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::confluence::{combine, confluence_multiplier, CoreStatus};
use super::rules;
use super::RuleSet;
use crate::features::MarketFeatures;
use crate::types::Timeframe;

/// Minimum analyzed core timeframes for a symbol to be published
pub const MIN_CORE_TIMEFRAMES: usize = 2;

/// The intraday view needs both confirmation timeframes
pub const MIN_INTRADAY_TIMEFRAMES: usize = 2;

const VOLUME_CLIMAX_RATIO: f64 = 2.0;

/// Score of one analyzed timeframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeframeScore {
    pub timeframe: Timeframe,
    pub score: f64,
    pub rsi: f64,
    pub aligned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("LONG"),
            Direction::Short => f.write_str("SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntradayStatus {
    /// Break of structure on a volume climax
    Hot,
    /// Break of structure
    Ready,
    Warm,
    Cool,
    /// Still trending up, no short yet
    StrongBuy,
}

impl IntradayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntradayStatus::Hot => "HOT",
            IntradayStatus::Ready => "READY",
            IntradayStatus::Warm => "WARM",
            IntradayStatus::Cool => "COOL",
            IntradayStatus::StrongBuy => "STRONG_BUY",
        }
    }
}

impl fmt::Display for IntradayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PullbackStatus {
    Dip,
    Bounce,
    Wait,
}

impl fmt::Display for PullbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PullbackStatus::Dip => "DIP",
            PullbackStatus::Bounce => "BOUNCE",
            PullbackStatus::Wait => "WAIT",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum BreakoutStatus {
    Breakout(Direction),
    Testing(Direction),
    Wait(Direction),
}

impl BreakoutStatus {
    pub fn direction(&self) -> Direction {
        match self {
            BreakoutStatus::Breakout(d) | BreakoutStatus::Testing(d) | BreakoutStatus::Wait(d) => {
                *d
            }
        }
    }

    pub fn is_breakout(&self) -> bool {
        matches!(self, BreakoutStatus::Breakout(_))
    }
}

impl fmt::Display for BreakoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakoutStatus::Breakout(d) => write!(f, "BREAKOUT_{}", d),
            BreakoutStatus::Testing(d) => write!(f, "TESTING_{}", d),
            BreakoutStatus::Wait(d) => write!(f, "WAIT_{}", d),
        }
    }
}

impl From<BreakoutStatus> for String {
    fn from(status: BreakoutStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for BreakoutStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (stage, side) = value
            .rsplit_once('_')
            .ok_or_else(|| format!("invalid breakout status: {}", value))?;
        let direction = match side {
            "LONG" => Direction::Long,
            "SHORT" => Direction::Short,
            _ => return Err(format!("invalid breakout direction: {}", value)),
        };
        match stage {
            "BREAKOUT" => Ok(BreakoutStatus::Breakout(direction)),
            "TESTING" => Ok(BreakoutStatus::Testing(direction)),
            "WAIT" => Ok(BreakoutStatus::Wait(direction)),
            _ => Err(format!("invalid breakout stage: {}", value)),
        }
    }
}

/// Result of the core confluence evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreOutcome {
    pub score: f64,
    pub confluence_count: usize,
    pub status: Option<CoreStatus>,
    pub primary_timeframe: Timeframe,
    pub features: MarketFeatures,
    pub timeframe_scores: Vec<TimeframeScore>,
}

/// One auxiliary strategy view of a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryView<S> {
    pub score: f64,
    pub status: Option<S>,
    pub confluence_count: usize,
    pub primary_timeframe: Timeframe,
    pub features: MarketFeatures,
    pub timeframe_scores: Vec<TimeframeScore>,
}

struct Scored<'a> {
    entries: Vec<(TimeframeScore, &'a MarketFeatures)>,
}

impl<'a> Scored<'a> {
    fn new(
        rule_set: RuleSet,
        timeframes: &[Timeframe],
        analyses: &'a BTreeMap<Timeframe, MarketFeatures>,
    ) -> Self {
        let entries = timeframes
            .iter()
            .filter_map(|tf| analyses.get(tf).map(|f| (*tf, f)))
            .map(|(timeframe, f)| {
                let score = TimeframeScore {
                    timeframe,
                    score: rule_set.score(f),
                    rsi: f.rsi,
                    aligned: rule_set.is_aligned(f),
                };
                (score, f)
            })
            .collect();
        Self { entries }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn aligned(&self) -> usize {
        self.entries.iter().filter(|(s, _)| s.aligned).count()
    }

    fn scores(&self) -> Vec<f64> {
        self.entries.iter().map(|(s, _)| s.score).collect()
    }

    fn mean(&self) -> f64 {
        combine(&self.scores(), 1.0)
    }

    /// Highest-scoring timeframe; the first listed wins ties
    fn primary(&self) -> Option<&(TimeframeScore, &'a MarketFeatures)> {
        self.entries.iter().fold(None, |best, entry| match best {
            Some(b) if b.0.score >= entry.0.score => Some(b),
            _ => Some(entry),
        })
    }

    fn timeframe_scores(&self) -> Vec<TimeframeScore> {
        self.entries.iter().map(|(s, _)| *s).collect()
    }

    fn into_view<S>(
        self,
        score: f64,
        status: Option<S>,
        confluence_count: usize,
    ) -> Option<AuxiliaryView<S>> {
        let (primary, features) = self.primary().map(|(s, f)| (s.timeframe, (*f).clone()))?;
        Some(AuxiliaryView {
            score,
            status,
            confluence_count,
            primary_timeframe: primary,
            features,
            timeframe_scores: self.timeframe_scores(),
        })
    }
}

/// Core short-bias confluence. `None` when fewer than two core timeframes
/// were analyzed.
pub fn evaluate_core(
    timeframes: &[Timeframe],
    analyses: &BTreeMap<Timeframe, MarketFeatures>,
) -> Option<CoreOutcome> {
    let scored = Scored::new(RuleSet::Core, timeframes, analyses);
    if scored.len() < MIN_CORE_TIMEFRAMES {
        return None;
    }

    let aligned = scored.aligned();
    let score = combine(&scored.scores(), confluence_multiplier(aligned, scored.len()));
    let (primary, features) = scored
        .primary()
        .map(|(s, f)| (s.timeframe, (*f).clone()))?;

    Some(CoreOutcome {
        score,
        confluence_count: aligned,
        status: CoreStatus::classify(aligned, score),
        primary_timeframe: primary,
        features,
        timeframe_scores: scored.timeframe_scores(),
    })
}

/// Intraday short readiness on the confirmation timeframes
///
/// Structure states are read from the first listed timeframe that was
/// analyzed, which is the fastest execution timeframe.
pub fn evaluate_intraday(
    timeframes: &[Timeframe],
    analyses: &BTreeMap<Timeframe, MarketFeatures>,
) -> Option<AuxiliaryView<IntradayStatus>> {
    let scored = Scored::new(RuleSet::IntradayShort, timeframes, analyses);
    if scored.len() < MIN_INTRADAY_TIMEFRAMES {
        return None;
    }
    let (_, execution) = scored.entries.first()?;

    let aligned = scored.aligned();
    let score = combine(&scored.scores(), confluence_multiplier(aligned, scored.len()));

    let bos = execution.is_break_of_structure;
    let status = if score >= 70.0 {
        if bos && execution.volume_ratio > VOLUME_CLIMAX_RATIO {
            Some(IntradayStatus::Hot)
        } else if bos {
            Some(IntradayStatus::Ready)
        } else {
            Some(IntradayStatus::Warm)
        }
    } else if score >= 50.0 {
        Some(IntradayStatus::Cool)
    } else if execution.is_higher_high && execution.is_strong_uptrend() {
        Some(IntradayStatus::StrongBuy)
    } else {
        None
    };

    scored.into_view(score, status, aligned)
}

/// Dip-buy into an uptrend: setup timeframes carry the trend and the pullback,
/// execution timeframes confirm the bounce
pub fn evaluate_pullback(
    setup_timeframes: &[Timeframe],
    execution_timeframes: &[Timeframe],
    analyses: &BTreeMap<Timeframe, MarketFeatures>,
) -> Option<AuxiliaryView<PullbackStatus>> {
    let setup = Scored::new(RuleSet::Pullback, setup_timeframes, analyses);
    let execution = Scored::new(RuleSet::Pullback, execution_timeframes, analyses);
    if setup.len() == 0 || execution.len() == 0 {
        return None;
    }

    let in_uptrend = setup
        .entries
        .iter()
        .filter(|(_, f)| rules::is_uptrend(f))
        .count();
    let in_pullback = setup.aligned();
    let bounce = execution
        .entries
        .iter()
        .any(|(_, f)| rules::is_bounce_confirmed(f));

    let multiplier = if bounce && in_pullback == setup.len() {
        1.4
    } else if bounce && in_pullback >= 1 {
        1.2
    } else {
        1.0
    };
    let confluence = in_pullback + usize::from(bounce);

    let mut scores = setup.scores();
    scores.extend(execution.scores());
    let score = combine(&scores, multiplier);

    let status = if in_uptrend == 0 {
        None
    } else if confluence >= 2 && score >= 45.0 {
        Some(PullbackStatus::Dip)
    } else if confluence >= 1 && score >= 35.0 {
        Some(PullbackStatus::Bounce)
    } else if confluence >= 1 && score >= 30.0 {
        Some(PullbackStatus::Wait)
    } else {
        None
    };

    let mut combined = setup;
    combined.entries.extend(execution.entries);
    combined.into_view(score, status, confluence)
}

/// Breakout or breakdown from a rolling extreme
pub fn evaluate_breakout(
    timeframes: &[Timeframe],
    analyses: &BTreeMap<Timeframe, MarketFeatures>,
) -> Option<AuxiliaryView<BreakoutStatus>> {
    let long = Scored::new(RuleSet::BreakoutLong, timeframes, analyses);
    let short = Scored::new(RuleSet::BreakoutShort, timeframes, analyses);
    if long.len() == 0 {
        return None;
    }

    let testing = |scored: &Scored<'_>, direction: Direction| {
        scored
            .entries
            .iter()
            .filter(|(_, f)| rules::breakout_checks(f, direction).is_testing())
            .count()
    };

    let long_rank = (long.aligned(), testing(&long, Direction::Long));
    let short_rank = (short.aligned(), testing(&short, Direction::Short));

    let prefer_long = match long_rank.cmp(&short_rank) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => long.mean() >= short.mean(),
    };

    let (scored, direction, (confirmed, testing)) = if prefer_long {
        (long, Direction::Long, long_rank)
    } else {
        (short, Direction::Short, short_rank)
    };

    let multiplier = if confirmed >= 2 {
        1.5
    } else if confirmed >= 1 || testing >= 2 {
        1.2
    } else {
        1.0
    };
    let score = combine(&scored.scores(), multiplier);

    let status = if confirmed >= 2 && score >= 50.0 {
        Some(BreakoutStatus::Breakout(direction))
    } else if confirmed >= 1 && score >= 40.0 {
        Some(BreakoutStatus::Testing(direction))
    } else if testing >= 1 && score >= 30.0 {
        Some(BreakoutStatus::Wait(direction))
    } else {
        None
    };

    scored.into_view(score, status, confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exhausted() -> MarketFeatures {
        MarketFeatures {
            price: 109.0,
            rsi: 82.0,
            over_ext_ema: 0.09,
            rejection_wick_ratio: 0.6,
            is_above_upper_band: true,
            ..Default::default()
        }
    }

    fn analyses(entries: &[(Timeframe, MarketFeatures)]) -> BTreeMap<Timeframe, MarketFeatures> {
        entries.iter().cloned().collect()
    }

    const CORE: [Timeframe; 2] = [Timeframe::M1, Timeframe::M5];

    #[test]
    fn test_core_trigger_on_double_exhaustion() {
        let map = analyses(&[(Timeframe::M1, exhausted()), (Timeframe::M5, exhausted())]);
        let outcome = evaluate_core(&CORE, &map).unwrap();

        for tf in &outcome.timeframe_scores {
            assert!(tf.score >= 85.0);
            assert!(tf.aligned);
        }
        assert_eq!(outcome.confluence_count, 2);
        assert_eq!(outcome.score, 100.0);
        assert_eq!(outcome.status, Some(CoreStatus::Trigger));
        assert_eq!(outcome.primary_timeframe, Timeframe::M1);
    }

    #[test]
    fn test_core_requires_two_timeframes() {
        let map = analyses(&[(Timeframe::M1, exhausted())]);
        assert!(evaluate_core(&CORE, &map).is_none());
    }

    #[test]
    fn test_core_primary_is_highest_score() {
        let mild = MarketFeatures {
            rsi: 65.0,
            ..Default::default()
        };
        let map = analyses(&[(Timeframe::M1, mild), (Timeframe::M5, exhausted())]);
        let outcome = evaluate_core(&CORE, &map).unwrap();
        assert_eq!(outcome.primary_timeframe, Timeframe::M5);
        assert_eq!(outcome.features.rsi, 82.0);
    }

    #[test]
    fn test_intraday_ready_on_break_of_structure() {
        let f = MarketFeatures {
            is_break_of_structure: true,
            volume_ratio: 1.5,
            pct_change_24h: 25.0,
            funding_rate: 0.0006,
            ..exhausted()
        };
        let map = analyses(&[(Timeframe::M15, f.clone()), (Timeframe::H1, f)]);
        let view = evaluate_intraday(&[Timeframe::M15, Timeframe::H1], &map).unwrap();
        assert!(view.score >= 70.0);
        assert_eq!(view.status, Some(IntradayStatus::Ready));

        let climax = MarketFeatures {
            is_break_of_structure: true,
            volume_ratio: 2.5,
            pct_change_24h: 25.0,
            funding_rate: 0.0006,
            ..exhausted()
        };
        let map = analyses(&[(Timeframe::M15, climax.clone()), (Timeframe::H1, climax)]);
        let view = evaluate_intraday(&[Timeframe::M15, Timeframe::H1], &map).unwrap();
        assert_eq!(view.status, Some(IntradayStatus::Hot));
    }

    #[test]
    fn test_intraday_strong_buy_when_trending() {
        let f = MarketFeatures {
            price: 105.0,
            ema_fast: 103.0,
            ema_slow: 100.0,
            is_higher_high: true,
            rsi: 55.0,
            ..Default::default()
        };
        let map = analyses(&[(Timeframe::M15, f.clone()), (Timeframe::H1, f)]);
        let view = evaluate_intraday(&[Timeframe::M15, Timeframe::H1], &map).unwrap();
        assert_eq!(view.status, Some(IntradayStatus::StrongBuy));
    }

    #[test]
    fn test_intraday_needs_both_timeframes() {
        let map = analyses(&[(Timeframe::M15, exhausted())]);
        assert!(evaluate_intraday(&[Timeframe::M15, Timeframe::H1], &map).is_none());
    }

    #[test]
    fn test_pullback_dip() {
        let setup = MarketFeatures {
            price: 100.0,
            rsi: 35.0,
            over_ext_ema: -0.01,
            ema_fast: 101.0,
            ema_slow: 100.0,
            dist_to_support_atr: Some(0.8),
            funding_rate: -0.0001,
            momentum: crate::indicators::MomentumSignals {
                rsi_slope: 1.0,
                momentum_slope: 0.5,
                ..Default::default()
            },
            ..Default::default()
        };
        let map = analyses(&[
            (Timeframe::M5, setup.clone()),
            (Timeframe::M15, setup.clone()),
            (Timeframe::M1, setup.clone()),
            (Timeframe::M3, setup),
        ]);
        let view = evaluate_pullback(
            &[Timeframe::M5, Timeframe::M15],
            &[Timeframe::M1, Timeframe::M3],
            &map,
        )
        .unwrap();
        assert_eq!(view.confluence_count, 3);
        assert_eq!(view.status, Some(PullbackStatus::Dip));
        assert_eq!(view.timeframe_scores.len(), 4);
    }

    #[test]
    fn test_pullback_needs_uptrend() {
        let downtrend = MarketFeatures {
            rsi: 35.0,
            over_ext_ema: -0.05,
            ema_fast: 95.0,
            ema_slow: 100.0,
            ..Default::default()
        };
        let map = analyses(&[(Timeframe::M5, downtrend.clone()), (Timeframe::M1, downtrend)]);
        let view = evaluate_pullback(&[Timeframe::M5], &[Timeframe::M1], &map).unwrap();
        assert_eq!(view.status, None);
    }

    #[test]
    fn test_breakout_long_confirmed() {
        let f = MarketFeatures {
            rsi: 64.0,
            over_ext_ema: 0.03,
            volume_ratio: 2.4,
            dist_to_high: 0.004,
            dist_to_low: 0.08,
            momentum: crate::indicators::MomentumSignals {
                momentum_slope: 0.2,
                rsi_slope: 1.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let map = analyses(&[(Timeframe::M15, f.clone()), (Timeframe::H1, f)]);
        let view = evaluate_breakout(&[Timeframe::M15, Timeframe::H1], &map).unwrap();
        assert_eq!(view.confluence_count, 2);
        assert_eq!(view.status, Some(BreakoutStatus::Breakout(Direction::Long)));
    }

    #[test]
    fn test_breakout_short_testing() {
        let f = MarketFeatures {
            rsi: 40.0,
            over_ext_ema: -0.02,
            volume_ratio: 1.0,
            dist_to_high: -0.09,
            dist_to_low: 0.001,
            ..Default::default()
        };
        let map = analyses(&[(Timeframe::M15, f)]);
        let view = evaluate_breakout(&[Timeframe::M15, Timeframe::H1], &map).unwrap();
        assert_eq!(view.confluence_count, 0);
        assert_eq!(view.status, Some(BreakoutStatus::Wait(Direction::Short)));
    }

    #[test]
    fn test_breakout_status_strings() {
        let status = BreakoutStatus::Testing(Direction::Short);
        assert_eq!(status.to_string(), "TESTING_SHORT");
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#""TESTING_SHORT""#);
        let back: BreakoutStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
