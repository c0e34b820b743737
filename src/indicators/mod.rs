//! Indicator engine.
//!
//! Pure functions over price history and option quotes:
//! - [`bollinger`] - SMA ± K population standard deviations
//! - [`black_scholes`] - European option pricing and vega
//! - [`implied_vol`] - IV root-finding and representative quote selection
//! - [`ladder`] - theoretical calls and puts across strikes around spot
//! - [`trend`] - fast/slow EMA crossover context

pub mod black_scholes;
pub mod bollinger;
pub mod implied_vol;
pub mod ladder;
pub mod trend;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ScreenError;
use crate::models::{OptionQuote, PriceHistory};

pub use bollinger::{BollingerBands, bollinger_bands};
pub use implied_vol::{IvEstimate, estimate_implied_volatility, solve_implied_volatility};
pub use ladder::{LadderRung, strike_ladder};
pub use trend::{TrendDirection, TrendReading, ema_trend};

/// Parameters for one computation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSettings {
    pub band_period: usize,
    pub band_multiplier: f64,
    pub ema_fast_span: usize,
    pub ema_slow_span: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            band_period: bollinger::DEFAULT_PERIOD,
            band_multiplier: bollinger::DEFAULT_MULTIPLIER,
            ema_fast_span: trend::DEFAULT_FAST_SPAN,
            ema_slow_span: trend::DEFAULT_SLOW_SPAN,
        }
    }
}

impl IndicatorSettings {
    /// Number of closes to request so every indicator can be computed.
    pub fn lookback(&self) -> usize {
        self.band_period.max(self.ema_slow_span).max(self.ema_fast_span)
    }
}

/// Immutable result of one computation pass for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub bands: BollingerBands,
    /// Representative implied volatility, absent when none could be solved.
    pub implied_volatility: Option<f64>,
    pub iv_estimate: Option<IvEstimate>,
    /// Why `implied_volatility` is absent.
    pub iv_failure: Option<ScreenError>,
    pub trend: Option<TrendReading>,
    /// Theoretical prices across strikes, empty until priced.
    pub strike_ladder: Vec<LadderRung>,
    pub computed_at: DateTime<Utc>,
}

impl IndicatorSnapshot {
    /// Assembles a snapshot from bands and the outcome of IV estimation.
    pub fn new(
        bands: BollingerBands,
        iv: Result<IvEstimate, ScreenError>,
        trend: Option<TrendReading>,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let (iv_estimate, iv_failure) = match iv {
            Ok(estimate) => (Some(estimate), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            bands,
            implied_volatility: iv_estimate.as_ref().map(|e| e.volatility),
            iv_estimate,
            iv_failure,
            trend,
            strike_ladder: Vec::new(),
            computed_at,
        }
    }

    /// Prices the strike ladder around `spot` at the solved IV, or at
    /// `fallback_vol` when IV is unknown.
    #[must_use]
    pub fn with_ladder(mut self, spot: f64, rate: f64, fallback_vol: f64) -> Self {
        let vol = self.implied_volatility.unwrap_or(fallback_vol);
        self.strike_ladder = strike_ladder(spot, rate, vol);
        self
    }
}

/// Bands and trend context from price history.
///
/// # Errors
///
/// Returns [`ScreenError::InsufficientHistory`] when the history is shorter
/// than the band period.
pub fn compute_price_indicators(
    history: &PriceHistory,
    settings: &IndicatorSettings,
) -> Result<(BollingerBands, Option<TrendReading>), ScreenError> {
    let closes = history.closes();
    let bands = bollinger_bands(&closes, settings.band_period, settings.band_multiplier)?;
    let trend = ema_trend(&closes, settings.ema_fast_span, settings.ema_slow_span);
    Ok((bands, trend))
}

/// Full snapshot from history and quotes.
///
/// # Errors
///
/// Only fails when bands cannot be computed; IV problems are recorded in the
/// snapshot's `iv_failure` instead.
pub fn compute_snapshot(
    history: &PriceHistory,
    quotes: &[OptionQuote],
    settings: &IndicatorSettings,
    computed_at: DateTime<Utc>,
) -> Result<IndicatorSnapshot, ScreenError> {
    let (bands, trend) = compute_price_indicators(history, settings)?;
    let iv = estimate_implied_volatility(quotes);
    Ok(IndicatorSnapshot::new(bands, iv, trend, computed_at))
}
