//! One-line summaries of registry state for the console.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::models::Signal;
use crate::registry::{RegistrySnapshot, SymbolEntry};

/// Renders one entry, e.g.
/// `SPY     LONG_PUT_CANDIDATE   px 105.00 bands [96.00, 104.00] iv 0.420`,
/// followed by the strike ladder as `strike:call/put` triples.
pub fn entry_summary(entry: &SymbolEntry) -> String {
    let kind = entry
        .last_signal
        .as_ref()
        .map_or("PENDING", |s| s.kind.as_str());
    let mut line = format!("{:<7} {kind:<20}", entry.symbol);

    if let Some(price) = entry.last_signal.as_ref().and_then(|s| s.rationale.price) {
        line.push_str(&format!(" px {price:.2}"));
    }
    if let Some(snapshot) = &entry.last_indicators {
        line.push_str(&format!(
            " bands [{:.2}, {:.2}]",
            snapshot.bands.lower, snapshot.bands.upper
        ));
        match snapshot.implied_volatility {
            Some(iv) => line.push_str(&format!(" iv {iv:.3}")),
            None => line.push_str(" iv n/a"),
        }
        if let Some(trend) = &snapshot.trend {
            line.push_str(&format!(" trend {:?}", trend.direction).to_lowercase());
        }
        if !snapshot.strike_ladder.is_empty() {
            line.push_str(" ladder");
            for rung in &snapshot.strike_ladder {
                line.push_str(&format!(" {:.2}:{:.2}/{:.2}", rung.strike, rung.call, rung.put));
            }
        }
    }
    if let Some(error) = &entry.last_error {
        line.push_str(&format!(" error: {error}"));
    }
    line
}

/// Logs the candidates in a snapshot, followed by a per-cycle tally.
pub fn log_snapshot(snapshot: &RegistrySnapshot) {
    let mut candidates = 0;
    let mut failing = 0;
    for entry in &snapshot.entries {
        if entry.last_signal.as_ref().is_some_and(Signal::is_candidate) {
            candidates += 1;
            info!(cycle = snapshot.cycle, "{}", entry_summary(entry));
        }
        if entry.last_error.is_some() {
            failing += 1;
        }
    }
    info!(
        cycle = snapshot.cycle,
        symbols = snapshot.entries.len(),
        candidates,
        failing,
        "Watch list summary"
    );
}

/// Logs every published snapshot until the publisher goes away, including
/// one published just before it did. Returns how many were logged.
pub async fn follow_snapshots(mut snapshots: watch::Receiver<Arc<RegistrySnapshot>>) -> u64 {
    let mut logged = 0;
    while snapshots.changed().await.is_ok() {
        let snapshot = Arc::clone(&snapshots.borrow_and_update());
        log_snapshot(&snapshot);
        logged += 1;
    }
    logged
}
