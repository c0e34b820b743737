//! Closing-price history models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::decimal_to_f64;

/// A single closing price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: Decimal,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, close: Decimal) -> Self {
        Self { timestamp, close }
    }
}

/// Bounded, chronologically ordered close history, most recent last.
///
/// Timestamps are unique: a point carrying an existing timestamp replaces
/// the stored close instead of being appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceHistory {
    points: Vec<PricePoint>,
    capacity: usize,
}

impl PriceHistory {
    /// Creates an empty history holding at most `capacity` points.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            points: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Builds a history from unordered points.
    ///
    /// Points are sorted by timestamp, duplicates keep the last occurrence in
    /// input order, and only the newest `capacity` points are retained.
    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = PricePoint>, capacity: usize) -> Self {
        let mut sorted: Vec<PricePoint> = points.into_iter().collect();
        // Stable sort keeps input order among equal timestamps.
        sorted.sort_by_key(|p| p.timestamp);

        let mut history = Self::new(capacity);
        for point in sorted {
            match history.points.last_mut() {
                Some(last) if last.timestamp == point.timestamp => *last = point,
                _ => history.points.push(point),
            }
        }
        history.trim();
        history
    }

    /// Appends a close.
    ///
    /// Returns `false` (and leaves the history untouched) when the point is
    /// older than the most recent stored point.
    pub fn push(&mut self, point: PricePoint) -> bool {
        match self.points.last_mut() {
            Some(last) if point.timestamp < last.timestamp => return false,
            Some(last) if point.timestamp == last.timestamp => *last = point,
            _ => self.points.push(point),
        }
        self.trim();
        true
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// Most recent point, if any.
    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Closes as `f64`, oldest first.
    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| decimal_to_f64(p.close)).collect()
    }

    fn trim(&mut self) {
        if self.points.len() > self.capacity {
            let excess = self.points.len() - self.capacity;
            self.points.drain(..excess);
        }
    }
}
