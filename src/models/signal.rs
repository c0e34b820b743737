//! Screening signal models.

use std::fmt;

use serde::Serialize;

/// Recommendation produced for one symbol in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    LongCallCandidate,
    LongPutCandidate,
    NoSignal,
    InsufficientData,
}

impl SignalKind {
    /// Wire-format name, as used in logs and serialized snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::LongCallCandidate => "LONG_CALL_CANDIDATE",
            SignalKind::LongPutCandidate => "LONG_PUT_CANDIDATE",
            SignalKind::NoSignal => "NO_SIGNAL",
            SignalKind::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which Bollinger band the price touched or crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BandBreach {
    Upper,
    Lower,
}

/// Implied volatility environment relative to the configured policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IvRegime {
    Elevated,
    Normal,
    /// No implied volatility was available this cycle.
    Unknown,
}

/// Inputs that led to a signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rationale {
    pub price: Option<f64>,
    pub band_breach: Option<BandBreach>,
    pub iv_regime: IvRegime,
    pub implied_volatility: Option<f64>,
    /// Level the IV was compared against (fixed threshold or trailing reference).
    pub iv_reference: Option<f64>,
    pub note: String,
}

impl Rationale {
    fn bare(note: impl Into<String>) -> Self {
        Self {
            price: None,
            band_breach: None,
            iv_regime: IvRegime::Unknown,
            implied_volatility: None,
            iv_reference: None,
            note: note.into(),
        }
    }
}

/// A classified recommendation with its explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub rationale: Rationale,
}

impl Signal {
    /// An `INSUFFICIENT_DATA` signal explained by `note`.
    pub fn insufficient_data(note: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::InsufficientData,
            rationale: Rationale::bare(note),
        }
    }

    /// `true` for long call and long put candidates.
    pub fn is_candidate(&self) -> bool {
        matches!(
            self.kind,
            SignalKind::LongCallCandidate | SignalKind::LongPutCandidate
        )
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.rationale.note)
    }
}
