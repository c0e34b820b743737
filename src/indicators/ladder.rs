//! Theoretical call and put prices across a ladder of strikes around spot.

use serde::Serialize;

use super::black_scholes::{PricingInputs, price};
use crate::models::OptionType;

/// Horizon the ladder is priced at, in days.
pub const LADDER_HORIZON_DAYS: f64 = 30.0;

/// Strikes step by 10% of spot, three steps either side.
const STEP: f64 = 0.10;
const STEPS_EACH_SIDE: i32 = 3;

/// Volatility used when no implied volatility could be solved.
pub const DEFAULT_FALLBACK_VOL: f64 = 0.2;

/// One strike with its theoretical call and put.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LadderRung {
    pub strike: f64,
    pub call: f64,
    pub put: f64,
}

/// Prices strikes `spot × (1 + i/10)` for `i` in `-3..=3`, lowest first.
///
/// Returns an empty ladder when `spot` or `vol` is not a positive finite
/// number or `rate` is not finite.
pub fn strike_ladder(spot: f64, rate: f64, vol: f64) -> Vec<LadderRung> {
    let positive = |x: f64| x.is_finite() && x > 0.0;
    if !(positive(spot) && positive(vol) && rate.is_finite()) {
        return Vec::new();
    }
    let time = LADDER_HORIZON_DAYS / 365.0;

    (-STEPS_EACH_SIDE..=STEPS_EACH_SIDE)
        .map(|i| {
            let strike = spot * (1.0 + f64::from(i) * STEP);
            let call = PricingInputs {
                spot,
                strike,
                time,
                rate,
                vol,
                option_type: OptionType::Call,
            };
            let put = PricingInputs {
                option_type: OptionType::Put,
                ..call
            };
            LadderRung {
                strike,
                call: price(&call),
                put: price(&put),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_spans_thirty_percent_either_side() {
        let ladder = strike_ladder(150.0, 0.01, 0.2);
        let strikes: Vec<f64> = ladder.iter().map(|r| r.strike).collect();
        let expected = [105.0, 120.0, 135.0, 150.0, 165.0, 180.0, 195.0];
        assert_eq!(strikes.len(), expected.len());
        for (got, want) in strikes.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
    }

    #[test]
    fn every_rung_satisfies_put_call_parity() {
        let (spot, rate, vol) = (105.0, 0.045, 0.45);
        let time = LADDER_HORIZON_DAYS / 365.0;
        for rung in strike_ladder(spot, rate, vol) {
            let parity = spot - rung.strike * (-rate * time).exp();
            assert!(
                (rung.call - rung.put - parity).abs() < 1e-9,
                "strike {}: C - P = {}, S - K·e^(-rT) = {parity}",
                rung.strike,
                rung.call - rung.put
            );
        }
    }

    #[test]
    fn calls_fall_and_puts_rise_with_strike() {
        let ladder = strike_ladder(100.0, 0.03, 0.3);
        for pair in ladder.windows(2) {
            assert!(pair[1].call < pair[0].call);
            assert!(pair[1].put > pair[0].put);
        }
    }

    #[test]
    fn unusable_inputs_give_empty_ladder() {
        assert!(strike_ladder(0.0, 0.01, 0.2).is_empty());
        assert!(strike_ladder(f64::NAN, 0.01, 0.2).is_empty());
        assert!(strike_ladder(100.0, 0.01, 0.0).is_empty());
        assert!(strike_ladder(100.0, f64::INFINITY, 0.2).is_empty());
    }
}
