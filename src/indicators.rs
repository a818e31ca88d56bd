//! Technical indicators
//!
//! Pure functions over oldest-first price/volume slices. Every per-bar
//! indicator returns one `Option<f64>` per input sample; `None` marks the
//! warm-up region and a series shorter than the warm-up yields all `None`.
//! No function panics on short input or produces NaN.

use serde::{Deserialize, Serialize};

/// Calculate Exponential Moving Average
///
/// Seeded with the simple average at index `period - 1`, then smoothed with
/// k = 2 / (period + 1).
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];

    if period == 0 || values.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(seed);

    let mut prev = seed;
    for i in period..values.len() {
        prev = values[i] * multiplier + prev * (1.0 - multiplier);
        result[i] = Some(prev);
    }

    result
}

/// Calculate RSI (Relative Strength Index) with Wilder smoothing
///
/// The first value sits at index `period` and averages the first `period`
/// deltas. RSI is 100 whenever the average loss is zero.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];

    if period == 0 || values.len() < period + 1 {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    let p = period as f64;
    for i in period + 1..values.len() {
        let change = values[i] - values[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        result[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let len = high.len().min(low.len()).min(close.len());
    let mut tr = Vec::with_capacity(len);

    for i in 0..len {
        let hl = high[i] - low[i];
        let tr_value = if i == 0 {
            hl
        } else {
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Calculate Average True Range (ATR)
///
/// The first value at `period - 1` is the simple mean of the first `period`
/// true ranges, then Wilder-smoothed. Requires `period + 1` samples.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let tr = true_range(high, low, close);
    let mut result = vec![None; tr.len()];

    if period == 0 || tr.len() < period + 1 {
        return result;
    }

    let mut prev = tr[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(prev);

    let p = period as f64;
    for i in period..tr.len() {
        prev = (prev * (p - 1.0) + tr[i]) / p;
        result[i] = Some(prev);
    }

    result
}

/// Bollinger band lines, aligned with the input series
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Calculate Bollinger Bands (population standard deviation)
pub fn bollinger_bands(values: &[f64], period: usize, num_std: f64) -> BollingerBands {
    let len = values.len();
    let mut bands = BollingerBands {
        upper: vec![None; len],
        middle: vec![None; len],
        lower: vec![None; len],
    };

    if period == 0 || len < period {
        return bands;
    }

    for i in period - 1..len {
        let window = &values[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();

        bands.middle[i] = Some(mean);
        bands.upper[i] = Some(mean + num_std * std_dev);
        bands.lower[i] = Some(mean - num_std * std_dev);
    }

    bands
}

/// Calculate cumulative VWAP from typical price (H+L+C)/3
///
/// Undefined until some volume has traded.
pub fn vwap(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<Option<f64>> {
    let len = high
        .len()
        .min(low.len())
        .min(close.len())
        .min(volume.len());
    let mut result = Vec::with_capacity(len);

    let mut cumulative_tpv = 0.0;
    let mut cumulative_vol = 0.0;

    for i in 0..len {
        let typical = (high[i] + low[i] + close[i]) / 3.0;
        cumulative_tpv += typical * volume[i];
        cumulative_vol += volume[i];

        if cumulative_vol > 0.0 {
            result.push(Some(cumulative_tpv / cumulative_vol));
        } else {
            result.push(None);
        }
    }

    result
}

// =============================================================================
// Pivots and structure
// =============================================================================

/// A local extreme in a price series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
}

/// Indices strictly lower than `left` neighbors before and `right` after
pub fn pivot_lows(values: &[f64], left: usize, right: usize) -> Vec<Pivot> {
    find_pivots(values, left, right, |candidate, neighbor| neighbor > candidate)
}

/// Indices strictly higher than `left` neighbors before and `right` after
pub fn pivot_highs(values: &[f64], left: usize, right: usize) -> Vec<Pivot> {
    find_pivots(values, left, right, |candidate, neighbor| neighbor < candidate)
}

fn find_pivots<F>(values: &[f64], left: usize, right: usize, beats: F) -> Vec<Pivot>
where
    F: Fn(f64, f64) -> bool,
{
    let len = values.len();
    if len < left + right + 1 {
        return Vec::new();
    }

    (left..len - right)
        .filter(|&i| {
            let candidate = values[i];
            (1..=left).all(|j| beats(candidate, values[i - j]))
                && (1..=right).all(|j| beats(candidate, values[i + j]))
        })
        .map(|i| Pivot {
            index: i,
            price: values[i],
        })
        .collect()
}

/// Most recent pivot whose index is strictly below `current_index`
pub fn nearest_support(pivots: &[Pivot], current_index: usize) -> Option<Pivot> {
    pivots.iter().rev().find(|p| p.index < current_index).copied()
}

/// Close has broken below support by more than `factor` ATRs
pub fn is_breakdown(close: f64, support: f64, atr: f64, factor: f64) -> bool {
    close < support - factor * atr
}

/// Candle range overlaps the band support ± `factor` ATRs
pub fn is_in_retest_zone(high: f64, low: f64, support: f64, atr: f64, factor: f64) -> bool {
    let upper_zone = support + factor * atr;
    let lower_zone = support - factor * atr;
    low <= upper_zone && high >= lower_zone
}

// =============================================================================
// Momentum loss
// =============================================================================

/// Minimum closes required before momentum loss is evaluated
pub const MOMENTUM_MIN_SAMPLES: usize = 20;

const DIVERGENCE_LOOKBACK: usize = 10;
const RSI_SLOPE_WINDOW: usize = 5;

/// Momentum exhaustion signals for the latest bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumSignals {
    pub has_rsi_divergence: bool,
    pub has_volume_divergence: bool,
    pub momentum_slope: f64,
    pub rsi_slope: f64,
    pub volume_decline_ratio: f64,
    pub is_losing_momentum: bool,
}

impl Default for MomentumSignals {
    fn default() -> Self {
        Self {
            has_rsi_divergence: false,
            has_volume_divergence: false,
            momentum_slope: 0.0,
            rsi_slope: 0.0,
            volume_decline_ratio: 1.0,
            is_losing_momentum: false,
        }
    }
}

impl MomentumSignals {
    /// Number of momentum-loss conditions currently firing
    pub fn loss_count(&self) -> usize {
        [
            self.has_rsi_divergence,
            self.has_volume_divergence,
            self.rsi_slope < -2.0,
            self.momentum_slope < 0.0,
        ]
        .iter()
        .filter(|&&hit| hit)
        .count()
    }
}

/// Detect loss of upside momentum
///
/// `rsi_values` must be aligned with `closes` (as returned by [`rsi`]).
/// Returns the default signals for fewer than [`MOMENTUM_MIN_SAMPLES`] closes.
pub fn detect_momentum_loss(
    closes: &[f64],
    highs: &[f64],
    volumes: &[f64],
    rsi_values: &[Option<f64>],
) -> MomentumSignals {
    let n = closes.len();
    if n < MOMENTUM_MIN_SAMPLES || highs.len() < n || volumes.len() < n || rsi_values.len() < n {
        return MomentumSignals::default();
    }

    let has_rsi_divergence = detect_rsi_divergence(&highs[..n], &rsi_values[..n]);
    let (has_volume_divergence, volume_decline_ratio) =
        detect_volume_divergence(closes, &volumes[..n]);

    let rsi_tail: Option<Vec<f64>> = rsi_values[n - RSI_SLOPE_WINDOW..n].iter().copied().collect();
    let rsi_slope = rsi_tail.map(|tail| linear_regression_slope(&tail)).unwrap_or(0.0);
    let momentum_slope = rate_of_change_slope(closes);

    let mut signals = MomentumSignals {
        has_rsi_divergence,
        has_volume_divergence,
        momentum_slope,
        rsi_slope,
        volume_decline_ratio,
        is_losing_momentum: false,
    };
    signals.is_losing_momentum = signals.loss_count() >= 2;
    signals
}

/// Price prints a higher local high while RSI prints a lower one
fn detect_rsi_divergence(highs: &[f64], rsi_values: &[Option<f64>]) -> bool {
    let n = highs.len();
    let start = n - DIVERGENCE_LOOKBACK;

    let peaks: Vec<usize> = (start + 1..n - 1)
        .filter(|&i| highs[i] > highs[i - 1] && highs[i] > highs[i + 1])
        .collect();

    let [.., prev, last] = peaks.as_slice() else {
        return false;
    };

    match (rsi_values[*prev], rsi_values[*last]) {
        (Some(prev_rsi), Some(last_rsi)) => highs[*last] > highs[*prev] && last_rsi < prev_rsi,
        _ => false,
    }
}

/// Price up more than 2% while recent volume fell more than 30% below baseline
fn detect_volume_divergence(closes: &[f64], volumes: &[f64]) -> (bool, f64) {
    let n = closes.len();
    let base_close = closes[n - DIVERGENCE_LOOKBACK];
    if base_close == 0.0 {
        return (false, 1.0);
    }

    let price_change = (closes[n - 1] - base_close) / base_close;
    let recent = mean(&volumes[n - 3..]);
    let baseline = mean(&volumes[n - DIVERGENCE_LOOKBACK..n - 3]);

    if baseline == 0.0 {
        return (false, 1.0);
    }

    let ratio = recent / baseline;
    (price_change > 0.02 && ratio < 0.7, ratio)
}

/// Slope of the one-bar percentage rate of change over the lookback window
fn rate_of_change_slope(closes: &[f64]) -> f64 {
    let n = closes.len();
    let rocs: Vec<f64> = (n - DIVERGENCE_LOOKBACK + 1..n)
        .map(|i| {
            if closes[i - 1] != 0.0 {
                (closes[i] - closes[i - 1]) / closes[i - 1] * 100.0
            } else {
                0.0
            }
        })
        .collect();
    linear_regression_slope(&rocs)
}

/// Least-squares slope of `values` against their index
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    let n = n as f64;
    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denominator
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Last defined value of an indicator line
pub fn last_value(values: &[Option<f64>]) -> Option<f64> {
    values.last().copied().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    // Wilder's worked example (33 closes)
    const WILDER_CLOSES: [f64; 33] = [
        44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03, 45.61,
        46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64, 46.21, 46.25, 45.71, 46.45, 45.78, 45.35,
        44.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
    ];

    const WILDER_RSI: [f64; 19] = [
        70.46, 66.25, 66.48, 69.35, 66.29, 57.92, 62.88, 63.21, 56.01, 62.34, 54.67, 50.39, 40.02,
        41.49, 41.90, 45.50, 37.32, 33.09, 37.79,
    ];

    #[test]
    fn test_ema_seed_and_smoothing() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = ema(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(2.0));
        // k = 0.5: 4*0.5 + 2*0.5
        assert_abs_diff_eq!(result[3].unwrap(), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result[4].unwrap(), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ema_short_series_is_undefined() {
        assert!(ema(&[1.0, 2.0], 3).iter().all(Option::is_none));
        assert_eq!(ema(&[1.0, 2.0, 3.0], 3)[2], Some(2.0));
    }

    #[test]
    fn test_rsi_matches_wilder_reference() {
        let result = rsi(&WILDER_CLOSES, 14);

        assert!(result[..14].iter().all(Option::is_none));
        for (offset, expected) in WILDER_RSI.iter().enumerate() {
            let actual = result[14 + offset].unwrap();
            assert_abs_diff_eq!(actual, *expected, epsilon = 0.01);
        }
    }

    #[test]
    fn test_rsi_warmup_boundary() {
        let exact = rsi(&WILDER_CLOSES[..15], 14);
        assert!(exact[14].is_some());

        let short = rsi(&WILDER_CLOSES[..14], 14);
        assert_eq!(short.len(), 14);
        assert!(short.iter().all(Option::is_none));
    }

    #[test]
    fn test_rsi_bounds_and_no_losses() {
        let rising: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        assert!(rsi(&rising, 14).iter().flatten().all(|&v| v == 100.0));

        let noisy: Vec<f64> = (0..60)
            .map(|i| 100.0 + ((i * 7) % 11) as f64 - 5.0)
            .collect();
        for value in rsi(&noisy, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value));
            assert!(!value.is_nan());
        }
    }

    #[test]
    fn test_atr_seed_and_wilder() {
        let high = vec![10.0, 11.0, 12.0, 13.0];
        let low = vec![9.0, 10.0, 11.0, 12.0];
        let close = vec![9.5, 10.5, 11.5, 12.5];
        let result = atr(&high, &low, &close, 3);

        // TR: 1.0, 1.5, 1.5, 1.5
        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_abs_diff_eq!(result[2].unwrap(), 4.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result[3].unwrap(), (4.0 / 3.0 * 2.0 + 1.5) / 3.0, epsilon = 1e-12);

        assert!(atr(&high[..3], &low[..3], &close[..3], 3)
            .iter()
            .all(Option::is_none));
    }

    #[test]
    fn test_bollinger_ordering() {
        let values: Vec<f64> = (0..40).map(|i| 50.0 + (i as f64 * 0.7).sin() * 3.0).collect();
        let bands = bollinger_bands(&values, 20, 2.0);

        assert!(bands.middle[18].is_none());
        for i in 19..values.len() {
            let (u, m, l) = (
                bands.upper[i].unwrap(),
                bands.middle[i].unwrap(),
                bands.lower[i].unwrap(),
            );
            assert!(u >= m && m >= l);
        }

        let flat = bollinger_bands(&[5.0; 20], 20, 2.0);
        assert_eq!(flat.upper[19], Some(5.0));
        assert_eq!(flat.lower[19], Some(5.0));
    }

    #[test]
    fn test_vwap_weights_typical_price() {
        let result = vwap(&[12.0, 13.0], &[8.0, 9.0], &[10.0, 11.0], &[1.0, 3.0]);
        assert_abs_diff_eq!(result[0].unwrap(), 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result[1].unwrap(), (10.0 + 33.0) / 4.0, epsilon = 1e-12);

        assert_eq!(vwap(&[1.0], &[1.0], &[1.0], &[0.0]), vec![None]);
    }

    #[test]
    fn test_pivots_are_strict() {
        let lows = vec![5.0, 4.0, 3.0, 4.0, 5.0, 3.0, 4.0];
        let pivots = pivot_lows(&lows, 2, 2);
        assert_eq!(pivots, vec![Pivot { index: 2, price: 3.0 }]);

        // equal neighbor disqualifies
        let ties = vec![5.0, 3.0, 3.0, 5.0, 6.0];
        assert!(pivot_lows(&ties, 1, 1).is_empty());

        let highs = vec![1.0, 2.0, 5.0, 2.0, 1.0];
        assert_eq!(pivot_highs(&highs, 2, 2)[0].index, 2);
    }

    #[test]
    fn test_nearest_support_and_zones() {
        let pivots = vec![
            Pivot { index: 3, price: 10.0 },
            Pivot { index: 8, price: 11.0 },
        ];
        assert_eq!(nearest_support(&pivots, 9).map(|p| p.price), Some(11.0));
        assert_eq!(nearest_support(&pivots, 8).map(|p| p.price), Some(10.0));
        assert!(nearest_support(&pivots, 3).is_none());

        assert!(is_breakdown(9.8, 10.0, 1.0, 0.1));
        assert!(!is_breakdown(9.95, 10.0, 1.0, 0.1));
        assert!(is_in_retest_zone(10.5, 10.15, 10.0, 1.0, 0.2));
        assert!(!is_in_retest_zone(11.0, 10.3, 10.0, 1.0, 0.2));
    }

    #[test]
    fn test_linear_regression_slope() {
        assert_abs_diff_eq!(linear_regression_slope(&[1.0, 3.0, 5.0, 7.0]), 2.0, epsilon = 1e-12);
        assert_eq!(linear_regression_slope(&[4.0]), 0.0);
    }

    #[test]
    fn test_momentum_defaults_on_short_input() {
        let closes = vec![1.0; 19];
        let rsi_values = vec![Some(50.0); 19];
        let signals = detect_momentum_loss(&closes, &closes, &closes, &rsi_values);
        assert_eq!(signals, MomentumSignals::default());
    }

    #[test]
    fn test_volume_divergence_and_losing_momentum() {
        // Price grinds up 5% over the window while volume collapses on the last bars
        let n = 30;
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 0.5).collect();
        let highs: Vec<f64> = closes.iter().map(|c| c + 0.2).collect();
        let mut volumes = vec![1000.0; n];
        for v in volumes.iter_mut().skip(n - 3) {
            *v = 300.0;
        }
        // RSI rolling over
        let rsi_values: Vec<Option<f64>> = (0..n).map(|i| Some(90.0 - i as f64)).collect();

        let signals = detect_momentum_loss(&closes, &highs, &volumes, &rsi_values);
        assert!(signals.has_volume_divergence);
        assert_abs_diff_eq!(signals.volume_decline_ratio, 0.3, epsilon = 1e-12);
        assert!(signals.rsi_slope < -0.9);
        // constant increment -> shrinking ROC
        assert!(signals.momentum_slope < 0.0);
        assert!(signals.is_losing_momentum);
    }

    #[test]
    fn test_rsi_divergence() {
        let mut highs = vec![100.0; 20];
        // peaks at 13 and 17, second one higher
        highs[13] = 105.0;
        highs[17] = 106.0;
        let mut rsi_values = vec![Some(50.0); 20];
        rsi_values[13] = Some(80.0);
        rsi_values[17] = Some(70.0);
        let closes = vec![100.0; 20];
        let volumes = vec![1.0; 20];

        let signals = detect_momentum_loss(&closes, &highs, &volumes, &rsi_values);
        assert!(signals.has_rsi_divergence);
    }
}
