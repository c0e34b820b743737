//! Signal classification.
//!
//! Maps the current price and an [`IndicatorSnapshot`] to exactly one
//! [`Signal`]. Classification is a pure function of its arguments.

use serde::Serialize;

use crate::indicators::IndicatorSnapshot;
use crate::models::{BandBreach, IvRegime, Rationale, Signal, SignalKind};

/// Compare against a multiple of the symbol's recent IV instead of a fixed level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrailingReference {
    /// Number of past samples required (and averaged).
    pub window: usize,
    /// IV at or above `mean × ratio` counts as elevated.
    pub ratio: f64,
}

/// Decides whether implied volatility is elevated.
///
/// The fixed `threshold` applies until the trailing window (if any) has
/// enough samples for the symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IvRegimePolicy {
    pub threshold: f64,
    pub trailing: Option<TrailingReference>,
}

impl IvRegimePolicy {
    pub fn fixed(threshold: f64) -> Self {
        Self {
            threshold,
            trailing: None,
        }
    }

    /// Returns the regime and the level IV was compared against.
    ///
    /// `history` holds the symbol's past IV samples, oldest first, excluding
    /// the current one.
    pub fn assess(&self, iv: Option<f64>, history: &[f64]) -> (IvRegime, Option<f64>) {
        let reference = self.reference(history);
        let regime = match iv {
            Some(v) if v.is_finite() && v >= reference => IvRegime::Elevated,
            Some(v) if v.is_finite() => IvRegime::Normal,
            _ => IvRegime::Unknown,
        };
        (regime, Some(reference))
    }

    fn reference(&self, history: &[f64]) -> f64 {
        match self.trailing {
            Some(t) if t.window > 0 && history.len() >= t.window => {
                let recent = &history[history.len() - t.window..];
                let mean = recent.iter().sum::<f64>() / t.window as f64;
                mean * t.ratio
            }
            _ => self.threshold,
        }
    }
}

/// Classifies one symbol.
///
/// - no snapshot → `INSUFFICIENT_DATA`
/// - price ≥ upper band with elevated IV → `LONG_PUT_CANDIDATE`
/// - price ≤ lower band with elevated IV → `LONG_CALL_CANDIDATE`
/// - anything else, including a price touching both bands at once → `NO_SIGNAL`
pub fn classify(
    price: f64,
    snapshot: Option<&IndicatorSnapshot>,
    policy: &IvRegimePolicy,
    iv_history: &[f64],
) -> Signal {
    let Some(snapshot) = snapshot else {
        return Signal::insufficient_data("no indicator snapshot");
    };

    let iv = snapshot.implied_volatility;
    let (iv_regime, iv_reference) = policy.assess(iv, iv_history);
    let bands = &snapshot.bands;

    let mut rationale = Rationale {
        price: price.is_finite().then_some(price),
        band_breach: None,
        iv_regime,
        implied_volatility: iv,
        iv_reference,
        note: String::new(),
    };

    if !price.is_finite() {
        rationale.note = "current price unavailable".to_string();
        return no_signal(rationale);
    }

    let at_upper = price >= bands.upper;
    let at_lower = price <= bands.lower;
    let iv_text = describe_iv(iv, iv_regime, iv_reference);

    let (kind, breach, note) = match (at_upper, at_lower) {
        (true, true) => (
            SignalKind::NoSignal,
            None,
            format!(
                "price {price:.2} touches both bands ({:.2}/{:.2}); no directional signal",
                bands.lower, bands.upper
            ),
        ),
        (true, false) if iv_regime == IvRegime::Elevated => (
            SignalKind::LongPutCandidate,
            Some(BandBreach::Upper),
            format!(
                "price {price:.2} at or above upper band {:.2}, {iv_text}",
                bands.upper
            ),
        ),
        (false, true) if iv_regime == IvRegime::Elevated => (
            SignalKind::LongCallCandidate,
            Some(BandBreach::Lower),
            format!(
                "price {price:.2} at or below lower band {:.2}, {iv_text}",
                bands.lower
            ),
        ),
        (true, false) => (
            SignalKind::NoSignal,
            Some(BandBreach::Upper),
            format!(
                "price {price:.2} at or above upper band {:.2} but {iv_text}",
                bands.upper
            ),
        ),
        (false, true) => (
            SignalKind::NoSignal,
            Some(BandBreach::Lower),
            format!(
                "price {price:.2} at or below lower band {:.2} but {iv_text}",
                bands.lower
            ),
        ),
        (false, false) => (
            SignalKind::NoSignal,
            None,
            format!(
                "price {price:.2} inside bands [{:.2}, {:.2}]",
                bands.lower, bands.upper
            ),
        ),
    };

    rationale.band_breach = breach;
    rationale.note = note;
    Signal { kind, rationale }
}

fn no_signal(rationale: Rationale) -> Signal {
    Signal {
        kind: SignalKind::NoSignal,
        rationale,
    }
}

fn describe_iv(iv: Option<f64>, regime: IvRegime, reference: Option<f64>) -> String {
    let reference = reference.map_or_else(|| "n/a".to_string(), |r| format!("{r:.3}"));
    match (iv, regime) {
        (Some(v), IvRegime::Elevated) => format!("IV {v:.3} elevated (reference {reference})"),
        (Some(v), _) => format!("IV {v:.3} not elevated (reference {reference})"),
        (None, _) => "IV unavailable".to_string(),
    }
}
