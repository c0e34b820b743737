//! Black-Scholes-Merton pricing for European options.

use std::f64::consts::{PI, SQRT_2};

use statrs::function::erf::erfc;

use crate::models::OptionType;

/// Below this `σ·√T` the price is taken as the discounted intrinsic value.
const MIN_TOTAL_VOL: f64 = 1e-12;

/// Inputs for Black-Scholes pricing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingInputs {
    pub spot: f64,
    pub strike: f64,
    /// Time to expiry in years.
    pub time: f64,
    /// Continuously compounded risk-free rate.
    pub rate: f64,
    /// Annualised volatility (0.3 = 30%).
    pub vol: f64,
    pub option_type: OptionType,
}

impl PricingInputs {
    /// Same inputs at a different volatility.
    pub fn with_vol(self, vol: f64) -> Self {
        Self { vol, ..self }
    }

    fn discounted_strike(&self) -> f64 {
        self.strike * (-self.rate * self.time).exp()
    }

    fn d1_d2(&self) -> Option<(f64, f64)> {
        let total_vol = self.vol * self.time.sqrt();
        if total_vol < MIN_TOTAL_VOL {
            return None;
        }
        let d1 = ((self.spot / self.strike).ln() + (self.rate + 0.5 * self.vol * self.vol) * self.time)
            / total_vol;
        Some((d1, d1 - total_vol))
    }
}

/// Standard normal cumulative distribution function.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal probability density function.
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Theoretical option price.
pub fn price(inputs: &PricingInputs) -> f64 {
    let discounted = inputs.discounted_strike();
    match (inputs.d1_d2(), inputs.option_type) {
        (Some((d1, d2)), OptionType::Call) => {
            inputs.spot * norm_cdf(d1) - discounted * norm_cdf(d2)
        }
        (Some((d1, d2)), OptionType::Put) => {
            discounted * norm_cdf(-d2) - inputs.spot * norm_cdf(-d1)
        }
        (None, OptionType::Call) => (inputs.spot - discounted).max(0.0),
        (None, OptionType::Put) => (discounted - inputs.spot).max(0.0),
    }
}

/// ∂price/∂σ, identical for calls and puts.
pub fn vega(inputs: &PricingInputs) -> f64 {
    match inputs.d1_d2() {
        Some((d1, _)) => inputs.spot * norm_pdf(d1) * inputs.time.sqrt(),
        None => 0.0,
    }
}

/// No-arbitrage price range `(σ → 0, σ → ∞)` for the contract.
pub fn price_bounds(inputs: &PricingInputs) -> (f64, f64) {
    let discounted = inputs.discounted_strike();
    match inputs.option_type {
        OptionType::Call => ((inputs.spot - discounted).max(0.0), inputs.spot),
        OptionType::Put => ((discounted - inputs.spot).max(0.0), discounted),
    }
}
