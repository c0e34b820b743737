//! Option chain models.
//!
//! [`OptionChain`] is the shape returned by a market data gateway: decimal
//! prices and absolute expiry instants. [`OptionQuote`] is the numeric input
//! to the implied volatility solver, derived from a chain contract at a given
//! evaluation instant and risk-free rate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::decimal_to_f64;
use crate::error::ScreenError;

/// Strikes further than 30% from spot are rejected as unrepresentative.
pub const MIN_MONEYNESS: f64 = 0.7;
pub const MAX_MONEYNESS: f64 = 1.3;

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

/// A single listed contract within a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub strike: Decimal,
    pub expiry: DateTime<Utc>,
    pub option_type: OptionType,
    pub last_price: Decimal,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
}

impl OptionContract {
    /// Mid of a sane two-sided market, otherwise the last traded price.
    pub fn market_price(&self) -> Decimal {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if bid > Decimal::ZERO && ask >= bid => {
                (bid + ask) / Decimal::TWO
            }
            _ => self.last_price,
        }
    }
}

/// Option chain snapshot for one underlying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub symbol: String,
    pub underlying_price: Decimal,
    pub contracts: Vec<OptionContract>,
}

impl OptionChain {
    /// Converts every contract into a solver input evaluated at `now`.
    ///
    /// No filtering happens here; invalid quotes are rejected by
    /// [`OptionQuote::validate`] during IV estimation.
    pub fn quotes(&self, risk_free_rate: f64, now: DateTime<Utc>) -> Vec<OptionQuote> {
        let underlying = decimal_to_f64(self.underlying_price);
        self.contracts
            .iter()
            .map(|c| OptionQuote {
                strike: decimal_to_f64(c.strike),
                expiry: c.expiry,
                option_type: c.option_type,
                market_price: decimal_to_f64(c.market_price()),
                underlying_price: underlying,
                risk_free_rate,
                time_to_expiry: years_between(now, c.expiry),
            })
            .collect()
    }
}

/// Numeric input to the implied volatility solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptionQuote {
    pub strike: f64,
    pub expiry: DateTime<Utc>,
    pub option_type: OptionType,
    pub market_price: f64,
    pub underlying_price: f64,
    pub risk_free_rate: f64,
    /// Years until expiry, ACT/365.
    pub time_to_expiry: f64,
}

impl OptionQuote {
    /// Strike divided by underlying price.
    pub fn moneyness(&self) -> f64 {
        self.strike / self.underlying_price
    }

    /// Checks the domain rules a quote must satisfy before solving.
    ///
    /// # Errors
    ///
    /// Returns [`ScreenError::InvalidQuote`] naming the first violated rule.
    pub fn validate(&self) -> std::result::Result<(), ScreenError> {
        if !(self.market_price.is_finite() && self.market_price > 0.0) {
            return Err(ScreenError::invalid_quote(format!(
                "market price must be positive, got {}",
                self.market_price
            )));
        }
        if !(self.time_to_expiry.is_finite() && self.time_to_expiry > 0.0) {
            return Err(ScreenError::invalid_quote(format!(
                "time to expiry must be positive, got {:.6}y",
                self.time_to_expiry
            )));
        }
        if !(self.underlying_price.is_finite() && self.underlying_price > 0.0) {
            return Err(ScreenError::invalid_quote(format!(
                "underlying price must be positive, got {}",
                self.underlying_price
            )));
        }
        if !(self.strike.is_finite() && self.strike > 0.0) {
            return Err(ScreenError::invalid_quote(format!(
                "strike must be positive, got {}",
                self.strike
            )));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(ScreenError::invalid_quote("risk-free rate is not finite"));
        }
        let moneyness = self.moneyness();
        if !(MIN_MONEYNESS..=MAX_MONEYNESS).contains(&moneyness) {
            return Err(ScreenError::invalid_quote(format!(
                "strike/underlying ratio {moneyness:.3} outside [{MIN_MONEYNESS}, {MAX_MONEYNESS}]"
            )));
        }
        Ok(())
    }
}

/// Fractional years from `from` to `to`; negative when `to` is in the past.
pub fn years_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / SECONDS_PER_YEAR
}
