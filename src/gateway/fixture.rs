//! Offline gateway serving canned market data from a JSON file.
//!
//! ```json
//! {
//!   "risk_free_rate": 0.045,
//!   "symbols": {
//!     "SPY": {
//!       "history": [{ "timestamp": "2024-06-03T20:00:00Z", "close": "527.80" }],
//!       "option_chain": { "symbol": "SPY", "underlying_price": "527.80", "contracts": [] }
//!     }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::MarketDataGateway;
use crate::VolscanError;
use crate::error::ScreenError;
use crate::models::{OptionChain, PricePoint, normalize_symbol};

/// Canned data for one symbol.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SymbolFixture {
    #[serde(default)]
    pub history: Vec<PricePoint>,
    #[serde(default)]
    pub option_chain: Option<OptionChain>,
    /// When set, every request for the symbol fails with this reason.
    #[serde(default)]
    pub unavailable: Option<String>,
}

/// Contents of a fixture file.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketFixture {
    #[serde(default)]
    pub risk_free_rate: Option<f64>,
    #[serde(default)]
    pub symbols: HashMap<String, SymbolFixture>,
}

/// Gateway that answers from a [`MarketFixture`].
#[derive(Debug, Clone)]
pub struct FixtureGateway {
    symbols: HashMap<String, SymbolFixture>,
    risk_free_rate: f64,
}

impl FixtureGateway {
    /// Wraps an in-memory fixture. `fallback_rate` applies when the fixture
    /// has no rate of its own.
    pub fn new(fixture: MarketFixture, fallback_rate: f64) -> Self {
        let symbols = fixture
            .symbols
            .into_iter()
            .map(|(symbol, data)| (normalize_symbol(&symbol), data))
            .collect();
        Self {
            symbols,
            risk_free_rate: fixture.risk_free_rate.unwrap_or(fallback_rate),
        }
    }

    /// Loads a fixture file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid fixture.
    pub fn load(path: &Path, fallback_rate: f64) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            VolscanError::Io(format!("failed to read fixture {}: {e}", path.display()))
        })?;
        let fixture: MarketFixture = serde_json::from_str(&contents)?;
        debug!(
            path = %path.display(),
            symbols = fixture.symbols.len(),
            "Loaded market fixture"
        );
        Ok(Self::new(fixture, fallback_rate))
    }

    /// Symbols present in the fixture, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.symbols.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    fn lookup(&self, symbol: &str) -> Result<&SymbolFixture, ScreenError> {
        let data = self
            .symbols
            .get(&normalize_symbol(symbol))
            .ok_or_else(|| ScreenError::data_unavailable(symbol, "symbol not in fixture"))?;
        match &data.unavailable {
            Some(reason) => Err(ScreenError::data_unavailable(symbol, reason.clone())),
            None => Ok(data),
        }
    }
}

impl MarketDataGateway for FixtureGateway {
    async fn price_history(
        &self,
        symbol: &str,
        lookback: usize,
    ) -> Result<Vec<PricePoint>, ScreenError> {
        let history = &self.lookup(symbol)?.history;
        let start = history.len().saturating_sub(lookback);
        Ok(history[start..].to_vec())
    }

    async fn option_chain(&self, symbol: &str) -> Result<OptionChain, ScreenError> {
        self.lookup(symbol)?
            .option_chain
            .clone()
            .ok_or_else(|| ScreenError::data_unavailable(symbol, "no option chain in fixture"))
    }

    async fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }
}
