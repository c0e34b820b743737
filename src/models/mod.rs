//! Shared models for market data and screening output.
//!
//! Gateway-facing types carry prices as [`Decimal`]; the indicator engine
//! works in `f64` and converts at the boundary with [`decimal_to_f64`].

pub mod option;
pub mod price;
pub mod signal;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

pub use option::{OptionChain, OptionContract, OptionQuote, OptionType};
pub use price::{PriceHistory, PricePoint};
pub use signal::{BandBreach, IvRegime, Rationale, Signal, SignalKind};

/// Converts a decimal to `f64`, yielding NaN if it is not representable.
///
/// NaN is rejected downstream by the finiteness checks in the indicator
/// engine, so an unrepresentable value never produces a signal.
pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// Canonical form of a ticker symbol: trimmed and upper-cased.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}
