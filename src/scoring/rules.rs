//! Point tables for each rule-set. Tiers are checked highest first and only the
//! best matching tier of a signal counts.

use super::{Direction, SubScores};
use crate::features::MarketFeatures;

fn tier(value: f64, tiers: &[(f64, f64)]) -> f64 {
    tiers
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map(|(_, points)| *points)
        .unwrap_or(0.0)
}

fn flag(on: bool, points: f64) -> f64 {
    if on {
        points
    } else {
        0.0
    }
}

pub(super) fn core(f: &MarketFeatures) -> SubScores {
    let overextension = tier(f.pct_change_24h, &[(40.0, 15.0), (20.0, 10.0), (10.0, 5.0)])
        + tier(
            f.over_ext_ema,
            &[(0.08, 30.0), (0.05, 20.0), (0.03, 15.0), (0.02, 10.0)],
        )
        + tier(f.over_ext_vwap, &[(0.06, 10.0), (0.03, 5.0)]);

    let funding = if f.funding_rate > 0.0005 {
        15.0
    } else {
        flag(f.funding_rate > 0.0001, 5.0)
    };
    let open_interest = if f.open_interest_delta > 0.05 {
        10.0
    } else {
        flag(f.open_interest_delta > 0.0, 5.0)
    };
    let crowding = funding + open_interest;

    let exhaustion = tier(f.rsi, &[(80.0, 20.0), (70.0, 15.0), (60.0, 5.0)])
        + flag(f.is_above_upper_band, 5.0)
        + tier(f.rejection_wick_ratio, &[(0.5, 10.0), (0.3, 5.0)]);

    let structure = flag(f.is_breakdown, 15.0) + flag(f.is_retest, 10.0);

    let momentum = flag(f.momentum.is_losing_momentum, 10.0)
        + flag(f.momentum.has_rsi_divergence, 5.0)
        + flag(f.momentum.has_volume_divergence, 5.0);

    SubScores {
        overextension,
        crowding,
        exhaustion,
        structure,
        momentum,
    }
}

pub(super) fn intraday_short(f: &MarketFeatures) -> SubScores {
    let overextension = tier(f.over_ext_ema, &[(0.05, 15.0), (0.02, 10.0)])
        + tier(f.over_ext_vwap, &[(0.03, 5.0)])
        + tier(f.pct_change_24h, &[(20.0, 10.0)]);

    let crowding = tier(f.funding_rate, &[(0.0005, 15.0), (0.0001, 5.0)])
        + flag(f.open_interest_delta > 0.0, 5.0);

    let exhaustion = tier(f.rsi, &[(75.0, 20.0), (65.0, 15.0), (55.0, 5.0)])
        + flag(f.is_above_upper_band, 10.0)
        + tier(f.rejection_wick_ratio, &[(0.4, 5.0)]);

    let structure = flag(f.is_break_of_structure, 15.0)
        + flag(f.is_breakdown, 10.0)
        + flag(f.is_retest, 5.0);

    let momentum = flag(f.momentum.has_rsi_divergence, 10.0)
        + flag(f.momentum.is_losing_momentum, 5.0)
        + flag(f.momentum.has_volume_divergence, 5.0);

    SubScores {
        overextension,
        crowding,
        exhaustion,
        structure,
        momentum,
    }
}

/// Uptrend intact and RSI pulled back into 25-45
pub(super) fn is_pullback_setup(f: &MarketFeatures) -> bool {
    is_uptrend(f) && f.rsi > 25.0 && f.rsi < 45.0
}

pub(super) fn is_uptrend(f: &MarketFeatures) -> bool {
    f.over_ext_ema > -0.02 && f.is_trend_up()
}

/// Lower-timeframe confirmation that the dip is being bought
pub(super) fn is_bounce_confirmed(f: &MarketFeatures) -> bool {
    let rsi_turning = f.rsi > 30.0 && f.rsi < 50.0;
    let near_support = f
        .dist_to_support_atr
        .map(|d| (0.0..1.5).contains(&d))
        .unwrap_or(false);
    let holding = !f.is_breakdown && f.rejection_wick_ratio < 0.3;
    rsi_turning || near_support || holding
}

pub(super) fn pullback(f: &MarketFeatures) -> SubScores {
    // Depth: sitting on the mean or a nearby support
    let depth = if (-0.02..=0.0).contains(&f.over_ext_ema) {
        15.0
    } else if f.over_ext_ema > 0.0 && f.over_ext_ema <= 0.02 {
        10.0
    } else {
        0.0
    };
    let near_support = match f.dist_to_support_atr {
        Some(d) if (0.0..1.5).contains(&d) => 15.0,
        _ => 0.0,
    };

    let crowding = if f.funding_rate < 0.0 {
        10.0
    } else {
        flag(f.funding_rate <= 0.0001, 5.0)
    };

    let rsi_zone = if f.rsi >= 30.0 && f.rsi <= 40.0 {
        25.0
    } else {
        flag(f.rsi > 25.0 && f.rsi < 45.0, 20.0)
    };
    let exhaustion = rsi_zone + flag(f.momentum.rsi_slope > 0.0, 5.0);

    let structure =
        flag(f.is_trend_up(), 10.0) + flag(!f.is_breakdown, 5.0) + flag(f.is_retest, 5.0);

    let momentum =
        flag(f.momentum.momentum_slope > 0.0, 10.0) + flag(f.momentum.rsi_slope > 0.0, 5.0);

    SubScores {
        overextension: depth + near_support,
        crowding,
        exhaustion,
        structure,
        momentum,
    }
}

/// Breakout conditions for one side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BreakoutChecks {
    pub near_extreme: bool,
    pub volume_spike: bool,
    pub momentum: bool,
}

impl BreakoutChecks {
    pub fn is_confirmed(&self) -> bool {
        self.near_extreme && self.volume_spike && self.momentum
    }

    pub fn is_testing(&self) -> bool {
        self.near_extreme && (self.volume_spike || self.momentum)
    }
}

pub(crate) const BREAKOUT_PROXIMITY: f64 = 0.005;
pub(crate) const VOLUME_SPIKE_RATIO: f64 = 1.2;

pub(crate) fn breakout_checks(f: &MarketFeatures, direction: Direction) -> BreakoutChecks {
    let volume_spike = f.volume_ratio >= VOLUME_SPIKE_RATIO;
    match direction {
        Direction::Long => BreakoutChecks {
            near_extreme: f.dist_to_high >= -BREAKOUT_PROXIMITY,
            volume_spike,
            momentum: f.rsi > 50.0 && f.rsi < 75.0 && f.over_ext_ema > 0.0,
        },
        Direction::Short => BreakoutChecks {
            near_extreme: f.dist_to_low <= BREAKOUT_PROXIMITY,
            volume_spike,
            momentum: f.rsi > 25.0 && f.rsi < 50.0 && f.over_ext_ema < 0.0,
        },
    }
}

pub(super) fn breakout(f: &MarketFeatures, direction: Direction) -> SubScores {
    let (distance, trend, rsi_zone, rsi_near, slope_with_move, rsi_slope_with_move) =
        match direction {
            Direction::Long => (
                -f.dist_to_high,
                f.over_ext_ema > 0.01,
                f.rsi > 50.0 && f.rsi < 75.0,
                f.rsi > 45.0 && f.rsi < 80.0,
                f.momentum.momentum_slope > 0.0,
                f.momentum.rsi_slope > 0.0,
            ),
            Direction::Short => (
                f.dist_to_low,
                f.over_ext_ema < -0.01,
                f.rsi > 25.0 && f.rsi < 50.0,
                f.rsi > 20.0 && f.rsi < 55.0,
                f.momentum.momentum_slope < 0.0,
                f.momentum.rsi_slope < 0.0,
            ),
        };

    let proximity = if distance <= BREAKOUT_PROXIMITY {
        20.0
    } else {
        flag(distance <= 2.0 * BREAKOUT_PROXIMITY, 10.0)
    };

    // Breakouts on top of an already crowded book tend to fail
    let crowded = match direction {
        Direction::Long => f.funding_rate >= 0.0005,
        Direction::Short => f.funding_rate <= -0.0005,
    };

    let exhaustion = if rsi_zone {
        20.0
    } else {
        flag(rsi_near, 10.0)
    };

    let structure = tier(f.volume_ratio, &[(2.0, 20.0), (VOLUME_SPIKE_RATIO, 15.0)]);

    SubScores {
        overextension: proximity + flag(trend, 10.0),
        crowding: flag(!crowded, 10.0),
        exhaustion,
        structure,
        momentum: flag(slope_with_move, 10.0) + flag(rsi_slope_with_move, 5.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_picks_highest_matching() {
        let tiers = [(80.0, 20.0), (70.0, 15.0), (60.0, 5.0)];
        assert_eq!(tier(85.0, &tiers), 20.0);
        assert_eq!(tier(70.0, &tiers), 15.0);
        assert_eq!(tier(65.0, &tiers), 5.0);
        assert_eq!(tier(10.0, &tiers), 0.0);
    }

    #[test]
    fn test_core_crowding() {
        let f = MarketFeatures {
            funding_rate: 0.0008,
            open_interest_delta: 0.01,
            ..Default::default()
        };
        assert_eq!(core(&f).crowding, 20.0);
    }

    #[test]
    fn test_pullback_setup_and_bounce() {
        let f = MarketFeatures {
            price: 100.0,
            rsi: 38.0,
            over_ext_ema: -0.01,
            ema_fast: 101.0,
            ema_slow: 100.0,
            rejection_wick_ratio: 0.1,
            ..Default::default()
        };
        assert!(is_pullback_setup(&f));
        assert!(is_bounce_confirmed(&f));

        let broken = MarketFeatures {
            over_ext_ema: -0.05,
            ..f.clone()
        };
        assert!(!is_pullback_setup(&broken));
    }

    #[test]
    fn test_breakout_checks_long() {
        let f = MarketFeatures {
            rsi: 62.0,
            over_ext_ema: 0.02,
            volume_ratio: 1.8,
            dist_to_high: 0.003,
            ..Default::default()
        };
        let long = breakout_checks(&f, Direction::Long);
        assert!(long.is_confirmed());
        let short = breakout_checks(&f, Direction::Short);
        assert!(!short.is_testing());
    }
}
