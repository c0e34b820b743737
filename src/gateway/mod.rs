//! Market data gateways.
//!
//! The scheduler talks to market data only through [`MarketDataGateway`].
//! Two implementations ship with the crate:
//! - [`YahooGateway`] - live data from the Yahoo Finance JSON API
//! - [`FixtureGateway`] - canned data loaded from a JSON file, for offline
//!   runs and tests
//!
//! Gateways report failures as [`ScreenError::DataUnavailable`]; timeouts are
//! applied by the caller.

pub mod fixture;
pub mod yahoo;

use std::future::Future;

use crate::error::ScreenError;
use crate::models::{OptionChain, PricePoint};

pub use fixture::{FixtureGateway, MarketFixture, SymbolFixture};
pub use yahoo::YahooGateway;

/// Source of price history, option chains and the risk-free rate.
pub trait MarketDataGateway: Send + Sync {
    /// Daily closes for `symbol`, oldest first, ideally at least `lookback`
    /// of them.
    fn price_history(
        &self,
        symbol: &str,
        lookback: usize,
    ) -> impl Future<Output = Result<Vec<PricePoint>, ScreenError>> + Send;

    /// Option chain for the nearest upcoming expiry.
    fn option_chain(
        &self,
        symbol: &str,
    ) -> impl Future<Output = Result<OptionChain, ScreenError>> + Send;

    /// Annualised, continuously-compounded risk-free rate.
    ///
    /// Implementations fall back to a configured constant rather than fail.
    fn risk_free_rate(&self) -> impl Future<Output = f64> + Send;
}
