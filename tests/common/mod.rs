//! Shared test utilities: a scripted in-memory gateway and market builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::time::Instant;

use volscan::config::ScreenerConfig;
use volscan::error::ScreenError;
use volscan::gateway::MarketDataGateway;
use volscan::indicators::black_scholes::{PricingInputs, price};
use volscan::models::{OptionChain, OptionContract, OptionType, PricePoint};
use volscan::registry::WatchList;

/// Fixed evaluation instant used by pipeline scenarios.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 20, 0, 0).unwrap()
}

/// Twenty closes alternating 98/102: mean 100, population σ 2.
pub fn closes_mean_100_sd_2() -> Vec<Decimal> {
    (0..20)
        .map(|i| Decimal::from(if i % 2 == 0 { 98 } else { 102 }))
        .collect()
}

/// Daily points ending the day before [`now`].
pub fn daily_points(closes: &[Decimal]) -> Vec<PricePoint> {
    let n = closes.len() as i64;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PricePoint::new(now() - chrono::Duration::days(n - i as i64), close))
        .collect()
}

/// At-the-money call and put priced at `vol`, expiring 60 days after [`now`].
pub fn atm_chain(symbol: &str, spot: i64, vol: f64, rate: f64) -> OptionChain {
    let expiry = now() + chrono::Duration::days(60);
    let contracts = [OptionType::Call, OptionType::Put]
        .into_iter()
        .map(|option_type| {
            let fair = price(&PricingInputs {
                spot: spot as f64,
                strike: spot as f64,
                time: 60.0 / 365.0,
                rate,
                vol,
                option_type,
            });
            OptionContract {
                strike: Decimal::from(spot),
                expiry,
                option_type,
                last_price: Decimal::try_from(fair).unwrap().round_dp(4),
                bid: None,
                ask: None,
            }
        })
        .collect();
    OptionChain {
        symbol: symbol.to_string(),
        underlying_price: Decimal::from(spot),
        contracts,
    }
}

/// How the scripted gateway answers for one symbol.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub closes: Vec<Decimal>,
    pub chain: Option<OptionChain>,
    /// Virtual time spent inside `price_history`.
    pub history_delay: Duration,
    pub fail: Option<String>,
    pub panic: bool,
    /// `option_chain` never answers.
    pub stall_chain: bool,
}

/// In-memory gateway that records when each symbol's history is requested.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    scripts: HashMap<String, Script>,
    rate: f64,
    stall_rate: bool,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedGateway {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            ..Self::default()
        }
    }

    /// `risk_free_rate` never answers.
    pub fn stalling_rate(mut self) -> Self {
        self.stall_rate = true;
        self
    }

    pub fn with(mut self, symbol: &str, script: Script) -> Self {
        self.scripts.insert(symbol.to_string(), script);
        self
    }

    /// Instants at which `symbol`'s history was requested.
    pub fn history_calls(&self, symbol: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == symbol)
            .map(|(_, at)| *at)
            .collect()
    }

    fn script(&self, symbol: &str) -> Result<&Script, ScreenError> {
        let script = self
            .scripts
            .get(symbol)
            .ok_or_else(|| ScreenError::data_unavailable(symbol, "not scripted"))?;
        match &script.fail {
            Some(reason) => Err(ScreenError::data_unavailable(symbol, reason.clone())),
            None => Ok(script),
        }
    }
}

impl MarketDataGateway for ScriptedGateway {
    async fn price_history(
        &self,
        symbol: &str,
        _lookback: usize,
    ) -> Result<Vec<PricePoint>, ScreenError> {
        self.calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), Instant::now()));
        let delay = self.scripts.get(symbol).map(|s| s.history_delay);
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }
        let script = self.script(symbol)?;
        if script.panic {
            panic!("scripted panic for {symbol}");
        }
        Ok(daily_points(&script.closes))
    }

    async fn option_chain(&self, symbol: &str) -> Result<OptionChain, ScreenError> {
        let script = self.script(symbol)?;
        if script.stall_chain {
            std::future::pending::<()>().await;
        }
        script
            .chain
            .clone()
            .ok_or_else(|| ScreenError::data_unavailable(symbol, "no chain scripted"))
    }

    async fn risk_free_rate(&self) -> f64 {
        if self.stall_rate {
            std::future::pending::<()>().await;
        }
        self.rate
    }
}

/// Config watching `symbols` with otherwise default settings.
pub fn config(symbols: &[&str]) -> ScreenerConfig {
    ScreenerConfig {
        watch_symbols: symbols.iter().map(|s| s.to_string()).collect(),
        ..ScreenerConfig::default()
    }
}

/// Registry pre-populated with `symbols`.
pub fn registry(symbols: &[&str]) -> Arc<WatchList> {
    let registry = Arc::new(WatchList::new(20, 10));
    for s in symbols {
        registry.add(s);
    }
    registry
}
