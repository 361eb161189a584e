// =============================================================================
// Double Exponential Moving Average (DEMA)
// =============================================================================
//
// DEMA reduces the lag of a plain EMA by subtracting the EMA-of-the-EMA:
//
//   DEMA = 2 * EMA(close) - EMA(EMA(close))
//
// The inner EMA uses the standard seeding (SMA of the first `period` values),
// so a full DEMA read needs at least `2 * period - 1` closes: `period` to
// seed the first EMA plus another `period - 1` EMA values to seed the second.
// =============================================================================

/// Compute the EMA series for the given `values` slice and look-back `period`.
///
/// Returns an empty `Vec` when the input is too short or the period is zero.
/// The first element is the SMA seed; production stops at the first
/// non-finite value so downstream consumers never see a broken series.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the first `period` values.
    let sma: f64 = values[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(values.len() - period + 1);
    result.push(sma);

    let mut prev_ema = sma;
    for &value in &values[period..] {
        let ema = value * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        result.push(ema);
        prev_ema = ema;
    }

    result
}

/// Most recent DEMA value over `closes`.
///
/// `None` when `period` is zero, there are fewer than `2 * period - 1`
/// closes, or any intermediate value is non-finite.
pub fn calculate_dema(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < 2 * period - 1 {
        return None;
    }

    let ema1 = ema_series(closes, period);
    if ema1.len() < period {
        return None;
    }
    let ema2 = ema_series(&ema1, period);

    let e1 = *ema1.last()?;
    let e2 = *ema2.last()?;

    let dema = 2.0 * e1 - e2;
    if dema.is_finite() {
        Some(dema)
    } else {
        None
    }
}
