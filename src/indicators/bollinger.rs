//! Bollinger Bands over a fixed lookback window.

use serde::Serialize;

use crate::error::ScreenError;

/// Band period used when none is configured.
pub const DEFAULT_PERIOD: usize = 20;

/// Standard-deviation multiplier used when none is configured.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Simple moving average envelope ± `multiplier` population standard deviations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BollingerBands {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
    /// Population standard deviation (ddof = 0) of the window.
    pub std_dev: f64,
}

impl BollingerBands {
    /// Distance between the outer bands.
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Computes bands over the last `period` closes.
///
/// # Errors
///
/// Returns [`ScreenError::InsufficientHistory`] when fewer than `period`
/// finite closes are available in the window. No partial band set is ever
/// produced.
pub fn bollinger_bands(
    closes: &[f64],
    period: usize,
    multiplier: f64,
) -> Result<BollingerBands, ScreenError> {
    let period = period.max(1);
    if closes.len() < period {
        return Err(ScreenError::InsufficientHistory {
            required: period,
            available: closes.len(),
        });
    }

    let window = &closes[closes.len() - period..];
    let finite = window.iter().filter(|c| c.is_finite()).count();
    if finite < period {
        return Err(ScreenError::InsufficientHistory {
            required: period,
            available: finite,
        });
    }

    let n = period as f64;
    let middle = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|c| (c - middle).powi(2)).sum::<f64>() / n;
    let std_dev = variance.max(0.0).sqrt();
    let offset = multiplier.abs() * std_dev;

    Ok(BollingerBands {
        middle,
        upper: middle + offset,
        lower: middle - offset,
        std_dev,
    })
}
