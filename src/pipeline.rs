//! Single-symbol evaluation: fetch, compute, classify.
//!
//! [`evaluate_symbol`] never fails. Every problem is folded into the
//! returned [`SymbolUpdate`] so the scheduler can commit it and move on.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::classifier::{IvRegimePolicy, classify};
use crate::config::ScreenerConfig;
use crate::error::ScreenError;
use crate::gateway::MarketDataGateway;
use crate::indicators::{IndicatorSettings, IndicatorSnapshot, compute_price_indicators};
use crate::indicators::implied_vol::estimate_implied_volatility;
use crate::models::{PriceHistory, Signal, decimal_to_f64};
use crate::registry::SymbolUpdate;

/// Everything the pipeline needs besides the gateway.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub indicators: IndicatorSettings,
    pub iv_policy: IvRegimePolicy,
    /// Budget shared by all gateway calls for one symbol.
    pub fetch_timeout: Duration,
    /// Rate used when the gateway's rate lookup times out.
    pub fallback_risk_free_rate: f64,
    /// Volatility for the strike ladder when IV is unknown.
    pub ladder_fallback_vol: f64,
}

impl PipelineSettings {
    pub fn from_config(config: &ScreenerConfig) -> Self {
        Self {
            indicators: config.indicator_settings(),
            iv_policy: config.iv_policy(),
            fetch_timeout: config.fetch_timeout(),
            fallback_risk_free_rate: config.fallback_risk_free_rate,
            ladder_fallback_vol: config.ladder_fallback_volatility,
        }
    }
}

/// Evaluates one symbol against fresh market data.
///
/// History, rate and chain lookups share a single deadline of
/// `settings.fetch_timeout` from the start of the call. A rate lookup cut
/// off by the deadline uses the fallback rate; a chain lookup cut off by it
/// leaves IV unknown.
///
/// `iv_history` is the symbol's trailing IV, oldest first, used by the
/// trailing IV policy. `now` stamps the snapshot and sets time to expiry.
pub async fn evaluate_symbol<G: MarketDataGateway>(
    gateway: &G,
    symbol: &str,
    settings: &PipelineSettings,
    iv_history: &[f64],
    now: DateTime<Utc>,
) -> SymbolUpdate {
    let lookback = settings.indicators.lookback();
    let deadline = Instant::now() + settings.fetch_timeout;
    let points = match with_deadline(
        symbol,
        deadline,
        settings.fetch_timeout,
        gateway.price_history(symbol, lookback),
    )
    .await
    {
        Ok(points) => points,
        Err(e) => {
            warn!(symbol, error = %e, "Price history unavailable");
            return SymbolUpdate {
                price_history: None,
                outcome: Err(e),
                signal: None,
                evaluated_at: now,
            };
        }
    };
    let history = PriceHistory::from_points(points, lookback);

    let (bands, trend) = match compute_price_indicators(&history, &settings.indicators) {
        Ok(computed) => computed,
        Err(e) => {
            debug!(symbol, closes = history.len(), "Not enough history for bands");
            return SymbolUpdate {
                price_history: Some(history),
                signal: Some(Signal::insufficient_data(e.to_string())),
                outcome: Err(e),
                evaluated_at: now,
            };
        }
    };

    let rate = match tokio::time::timeout_at(deadline, gateway.risk_free_rate()).await {
        Ok(rate) if rate.is_finite() => rate,
        _ => {
            warn!(
                symbol,
                fallback = settings.fallback_risk_free_rate,
                "Risk-free rate unavailable, using fallback"
            );
            settings.fallback_risk_free_rate
        }
    };

    let chain = with_deadline(
        symbol,
        deadline,
        settings.fetch_timeout,
        gateway.option_chain(symbol),
    )
    .await;
    let spot = chain
        .as_ref()
        .ok()
        .map(|c| decimal_to_f64(c.underlying_price))
        .filter(|p| p.is_finite() && *p > 0.0);
    let iv = match chain {
        Ok(chain) if chain.contracts.is_empty() => {
            Err(ScreenError::data_unavailable(symbol, "option chain is empty"))
        }
        Ok(chain) => estimate_implied_volatility(&chain.quotes(rate, now)),
        Err(e) => Err(e),
    };
    if let Err(e) = &iv {
        debug!(symbol, reason = e.kind(), "No implied volatility: {e}");
    }

    // Spot from the chain, else the latest close.
    let price = spot
        .or_else(|| history.latest().map(|p| decimal_to_f64(p.close)))
        .unwrap_or(f64::NAN);
    let snapshot = IndicatorSnapshot::new(bands, iv, trend, now).with_ladder(
        price,
        rate,
        settings.ladder_fallback_vol,
    );
    let signal = classify(price, Some(&snapshot), &settings.iv_policy, iv_history);
    debug!(symbol, signal = %signal.kind, price, "Classified");

    SymbolUpdate {
        price_history: Some(history),
        outcome: Ok(snapshot),
        signal: Some(signal),
        evaluated_at: now,
    }
}

/// Bounds a gateway call by the symbol's deadline, reporting expiry as
/// [`ScreenError::DataUnavailable`].
async fn with_deadline<T>(
    symbol: &str,
    deadline: Instant,
    limit: Duration,
    call: impl Future<Output = Result<T, ScreenError>>,
) -> Result<T, ScreenError> {
    match tokio::time::timeout_at(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(ScreenError::data_unavailable(
            symbol,
            format!("timed out after {}s", limit.as_secs_f64()),
        )),
    }
}
