//! Implied volatility solving and representative quote selection.
//!
//! [`solve_implied_volatility`] inverts Black-Scholes for one quote with a
//! bounded Newton-Raphson iteration that falls back to bisection.
//! [`estimate_implied_volatility`] picks the near-term, near-the-money quotes
//! of a chain and averages the ones that converge.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::black_scholes::{self, PricingInputs};
use crate::error::ScreenError;
use crate::models::OptionQuote;

/// Vega below this switches Newton-Raphson to bisection.
const MIN_VEGA: f64 = 1e-8;

/// Bounds and stopping rules for the root-finder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    /// Newton-Raphson starting volatility.
    pub seed: f64,
    pub min_vol: f64,
    pub max_vol: f64,
    /// Absolute tolerance on the price error.
    pub tolerance: f64,
    /// Cap on Newton and bisection iterations combined.
    pub max_iterations: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            seed: 0.3,
            min_vol: 0.0001,
            max_vol: 5.0,
            tolerance: 1e-4,
            max_iterations: 100,
        }
    }
}

/// How the solver reached its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveMethod {
    Newton,
    Bisection,
}

/// A converged implied volatility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IvSolution {
    pub volatility: f64,
    pub iterations: usize,
    pub method: SolveMethod,
}

/// Representative implied volatility for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IvEstimate {
    /// Mean of the converged quotes in the selected group.
    pub volatility: f64,
    pub expiry: DateTime<Utc>,
    /// Strikes that contributed, ascending.
    pub strikes: Vec<f64>,
    /// Quotes that converged and were averaged.
    pub samples: usize,
    /// Quotes rejected as invalid or non-convergent before a group converged.
    pub rejected: usize,
}

/// Solves for implied volatility with the default [`SolverSettings`].
///
/// # Errors
///
/// See [`solve_with`].
pub fn solve_implied_volatility(quote: &OptionQuote) -> Result<IvSolution, ScreenError> {
    solve_with(quote, &SolverSettings::default())
}

/// Solves for the volatility at which Black-Scholes reproduces the quote's
/// market price.
///
/// # Errors
///
/// - [`ScreenError::InvalidQuote`] if the quote fails domain validation or its
///   price is below the model's no-arbitrage floor.
/// - [`ScreenError::IvConvergenceFailure`] if the price needs a volatility
///   above `max_vol`, or the tolerance is not met within `max_iterations`.
pub fn solve_with(
    quote: &OptionQuote,
    settings: &SolverSettings,
) -> Result<IvSolution, ScreenError> {
    quote.validate()?;

    let base = PricingInputs {
        spot: quote.underlying_price,
        strike: quote.strike,
        time: quote.time_to_expiry,
        rate: quote.risk_free_rate,
        vol: settings.seed,
        option_type: quote.option_type,
    };
    let target = quote.market_price;
    let error_at = |vol: f64| black_scholes::price(&base.with_vol(vol)) - target;

    let (floor, _) = black_scholes::price_bounds(&base);
    if target < floor - settings.tolerance {
        return Err(ScreenError::invalid_quote(format!(
            "price {target:.4} below no-arbitrage floor {floor:.4}"
        )));
    }

    let mut lo = settings.min_vol;
    let mut hi = settings.max_vol;
    let lo_error = error_at(lo);
    if lo_error.abs() < settings.tolerance {
        return Ok(IvSolution {
            volatility: lo,
            iterations: 0,
            method: SolveMethod::Bisection,
        });
    }
    let hi_error = error_at(hi);
    if hi_error < 0.0 {
        return Err(ScreenError::IvConvergenceFailure {
            iterations: 0,
            price_error: -hi_error,
        });
    }

    let mut vol = settings.seed.clamp(lo, hi);
    let mut iterations = 0;
    let mut last_error = f64::INFINITY;

    // Newton-Raphson, narrowing the bracket as it goes. Price is increasing
    // in volatility, so the sign of the error tells which side the root is on.
    while iterations < settings.max_iterations {
        iterations += 1;
        let err = error_at(vol);
        last_error = err.abs();
        if last_error < settings.tolerance {
            return Ok(IvSolution {
                volatility: vol,
                iterations,
                method: SolveMethod::Newton,
            });
        }
        if err > 0.0 {
            hi = vol;
        } else {
            lo = vol;
        }

        let vega = black_scholes::vega(&base.with_vol(vol));
        if vega < MIN_VEGA {
            break;
        }
        let next = vol - err / vega;
        if !next.is_finite() || next <= lo || next >= hi {
            break;
        }
        vol = next;
    }

    while iterations < settings.max_iterations {
        iterations += 1;
        let mid = 0.5 * (lo + hi);
        let err = error_at(mid);
        last_error = err.abs();
        if last_error < settings.tolerance {
            return Ok(IvSolution {
                volatility: mid,
                iterations,
                method: SolveMethod::Bisection,
            });
        }
        if err > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    Err(ScreenError::IvConvergenceFailure {
        iterations,
        price_error: last_error,
    })
}

/// Picks the representative implied volatility from a set of quotes.
///
/// Valid quotes are ordered by expiry, absolute distance from strike to spot,
/// strike, option type and price, then grouped by (expiry, distance). The
/// first group in which at least one quote converges wins, and its converged
/// volatilities are averaged. The result depends only on the quote set, not
/// on its order.
///
/// # Errors
///
/// Returns the last rejection (an [`ScreenError::InvalidQuote`] or
/// [`ScreenError::IvConvergenceFailure`]) when no quote converges.
pub fn estimate_implied_volatility(quotes: &[OptionQuote]) -> Result<IvEstimate, ScreenError> {
    estimate_with(quotes, &SolverSettings::default())
}

/// [`estimate_implied_volatility`] with explicit solver settings.
///
/// # Errors
///
/// See [`estimate_implied_volatility`].
pub fn estimate_with(
    quotes: &[OptionQuote],
    settings: &SolverSettings,
) -> Result<IvEstimate, ScreenError> {
    let mut last_error = ScreenError::invalid_quote("no option quotes supplied");
    let mut rejected = 0;

    let mut valid: Vec<&OptionQuote> = Vec::with_capacity(quotes.len());
    for quote in quotes {
        match quote.validate() {
            Ok(()) => valid.push(quote),
            Err(e) => {
                rejected += 1;
                last_error = e;
            }
        }
    }
    valid.sort_by(|a, b| selection_order(a, b));

    for group in valid.chunk_by(|a, b| same_group(a, b)) {
        let mut strikes = Vec::new();
        let mut vols = Vec::new();
        for quote in group {
            match solve_with(quote, settings) {
                Ok(solution) => {
                    vols.push(solution.volatility);
                    if !strikes.contains(&quote.strike) {
                        strikes.push(quote.strike);
                    }
                }
                Err(e) => {
                    debug!(
                        strike = quote.strike,
                        option_type = ?quote.option_type,
                        error = %e,
                        "Quote excluded from IV estimate"
                    );
                    rejected += 1;
                    last_error = e;
                }
            }
        }

        if !vols.is_empty() {
            return Ok(IvEstimate {
                volatility: vols.iter().sum::<f64>() / vols.len() as f64,
                expiry: group[0].expiry,
                strikes,
                samples: vols.len(),
                rejected,
            });
        }
    }

    Err(last_error)
}

fn strike_distance(quote: &OptionQuote) -> f64 {
    (quote.strike - quote.underlying_price).abs()
}

fn selection_order(a: &OptionQuote, b: &OptionQuote) -> Ordering {
    a.expiry
        .cmp(&b.expiry)
        .then_with(|| strike_distance(a).total_cmp(&strike_distance(b)))
        .then_with(|| a.strike.total_cmp(&b.strike))
        .then_with(|| a.option_type.cmp(&b.option_type))
        .then_with(|| a.market_price.total_cmp(&b.market_price))
}

fn same_group(a: &OptionQuote, b: &OptionQuote) -> bool {
    a.expiry == b.expiry && strike_distance(a) == strike_distance(b)
}
