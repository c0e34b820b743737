//! Watch list registry.
//!
//! Holds one [`SymbolEntry`] per watched ticker behind a `RwLock`. Entries
//! are never mutated in place: [`WatchList::apply_result`] builds a new entry
//! and swaps the `Arc`, so a reader holding an entry always sees a complete
//! cycle's worth of fields.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ScreenError;
use crate::indicators::IndicatorSnapshot;
use crate::models::{PriceHistory, Signal, normalize_symbol};

/// Last-known state of one watched symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolEntry {
    pub symbol: String,
    pub price_history: PriceHistory,
    pub last_indicators: Option<IndicatorSnapshot>,
    pub last_signal: Option<Signal>,
    /// Time of the last successful computation.
    pub last_updated: Option<DateTime<Utc>>,
    /// Most recent failure, cleared on the next success.
    pub last_error: Option<ScreenError>,
    /// Past representative IV samples, oldest first.
    pub iv_history: Vec<f64>,
    pub cycles_evaluated: u64,
    pub consecutive_failures: u32,
    pub added_at: DateTime<Utc>,
}

impl SymbolEntry {
    fn new(symbol: String, history_capacity: usize) -> Self {
        Self {
            symbol,
            price_history: PriceHistory::new(history_capacity),
            last_indicators: None,
            last_signal: None,
            last_updated: None,
            last_error: None,
            iv_history: Vec::new(),
            cycles_evaluated: 0,
            consecutive_failures: 0,
            added_at: Utc::now(),
        }
    }
}

/// Outcome of evaluating one symbol, committed as a single unit.
#[derive(Debug, Clone)]
pub struct SymbolUpdate {
    /// Freshly fetched history, if the fetch succeeded.
    pub price_history: Option<PriceHistory>,
    pub outcome: Result<IndicatorSnapshot, ScreenError>,
    /// Signal to publish; on failure `None` publishes `INSUFFICIENT_DATA`.
    pub signal: Option<Signal>,
    pub evaluated_at: DateTime<Utc>,
}

/// Point-in-time copy of every entry, published after each cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrySnapshot {
    pub cycle: u64,
    pub completed_at: Option<DateTime<Utc>>,
    /// Sorted by symbol.
    pub entries: Vec<SymbolEntry>,
}

impl RegistrySnapshot {
    pub fn get(&self, symbol: &str) -> Option<&SymbolEntry> {
        let symbol = normalize_symbol(symbol);
        self.entries.iter().find(|e| e.symbol == symbol)
    }
}

/// The set of symbols under evaluation and their latest results.
pub struct WatchList {
    entries: RwLock<HashMap<String, Arc<SymbolEntry>>>,
    history_capacity: usize,
    iv_history_capacity: usize,
}

impl WatchList {
    /// Creates an empty registry.
    ///
    /// `history_capacity` bounds each entry's price history;
    /// `iv_history_capacity` bounds its trailing IV samples.
    #[must_use]
    pub fn new(history_capacity: usize, iv_history_capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            history_capacity,
            iv_history_capacity,
        }
    }

    /// Adds a symbol. Returns `false` if it is blank or already watched.
    pub fn add(&self, symbol: &str) -> bool {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return false;
        }
        let mut entries = self.write();
        if entries.contains_key(&symbol) {
            return false;
        }
        let entry = SymbolEntry::new(symbol.clone(), self.history_capacity);
        entries.insert(symbol, Arc::new(entry));
        true
    }

    /// Removes a symbol, returning its final entry.
    pub fn remove(&self, symbol: &str) -> Option<Arc<SymbolEntry>> {
        self.write().remove(&normalize_symbol(symbol))
    }

    /// Watched symbols, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<SymbolEntry>> {
        self.read().get(&normalize_symbol(symbol)).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Replaces a symbol's computed fields with the result of one evaluation.
    ///
    /// Returns `false` if the symbol is no longer watched; the update is
    /// dropped in that case.
    pub fn apply_result(&self, symbol: &str, update: SymbolUpdate) -> bool {
        let symbol = normalize_symbol(symbol);
        let mut entries = self.write();
        let Some(current) = entries.get(&symbol) else {
            return false;
        };

        let mut next = SymbolEntry::clone(current);
        next.cycles_evaluated += 1;
        if let Some(history) = update.price_history {
            next.price_history =
                PriceHistory::from_points(history.points().iter().cloned(), self.history_capacity);
        }

        match update.outcome {
            Ok(snapshot) => {
                if let Some(iv) = snapshot.implied_volatility {
                    next.iv_history.push(iv);
                    if next.iv_history.len() > self.iv_history_capacity {
                        let excess = next.iv_history.len() - self.iv_history_capacity;
                        next.iv_history.drain(..excess);
                    }
                }
                next.last_indicators = Some(snapshot);
                next.last_signal = update.signal;
                next.last_updated = Some(update.evaluated_at);
                next.last_error = None;
                next.consecutive_failures = 0;
            }
            Err(e) => {
                next.last_signal = Some(
                    update
                        .signal
                        .unwrap_or_else(|| Signal::insufficient_data(e.to_string())),
                );
                next.last_error = Some(e);
                next.consecutive_failures += 1;
            }
        }

        entries.insert(symbol, Arc::new(next));
        true
    }

    /// All entries, sorted by symbol.
    pub fn snapshot(&self) -> Vec<Arc<SymbolEntry>> {
        let mut entries: Vec<Arc<SymbolEntry>> = self.read().values().cloned().collect();
        entries.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        entries
    }

    /// Owned copy of every entry, tagged with the cycle that produced it.
    pub fn publishable(&self, cycle: u64, completed_at: DateTime<Utc>) -> RegistrySnapshot {
        RegistrySnapshot {
            cycle,
            completed_at: Some(completed_at),
            entries: self
                .snapshot()
                .iter()
                .map(|e| SymbolEntry::clone(e))
                .collect(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<SymbolEntry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<SymbolEntry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
