//! Fast/slow EMA crossover used as trend context in signal rationales.

use serde::Serialize;

pub const DEFAULT_FAST_SPAN: usize = 9;
pub const DEFAULT_SLOW_SPAN: usize = 20;

/// Direction of the fast EMA relative to the slow one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendReading {
    pub fast: f64,
    pub slow: f64,
    pub direction: TrendDirection,
}

/// Span-weighted exponential moving average of `closes`, oldest first.
///
/// Uses the bias-adjusted form (weights `(1-α)^i` normalised by their sum,
/// `α = 2 / (span + 1)`), so early values are not dragged towards zero.
/// Returns `None` for an empty slice, a zero span, or a non-finite close.
pub fn ema(closes: &[f64], span: usize) -> Option<f64> {
    if closes.is_empty() || span == 0 {
        return None;
    }
    let decay = 1.0 - 2.0 / (span as f64 + 1.0);
    let mut weighted = 0.0;
    let mut weights = 0.0;
    for &close in closes {
        if !close.is_finite() {
            return None;
        }
        weighted = close + decay * weighted;
        weights = 1.0 + decay * weights;
    }
    Some(weighted / weights)
}

/// Compares fast and slow EMAs; needs at least `slow_span` closes.
pub fn ema_trend(closes: &[f64], fast_span: usize, slow_span: usize) -> Option<TrendReading> {
    if closes.len() < slow_span.max(fast_span) {
        return None;
    }
    let fast = ema(closes, fast_span)?;
    let slow = ema(closes, slow_span)?;
    let direction = match fast.partial_cmp(&slow) {
        Some(std::cmp::Ordering::Greater) => TrendDirection::Bullish,
        Some(std::cmp::Ordering::Less) => TrendDirection::Bearish,
        _ => TrendDirection::Flat,
    };
    Some(TrendReading {
        fast,
        slow,
        direction,
    })
}
