use std::collections::VecDeque;
use std::collections::vec_deque;

use chrono::{DateTime, Utc};

pub const DEFAULT_WINDOW_CAPACITY: usize = 20;

/// One price point taken from an accepted snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriceObservation {
    pub ts: DateTime<Utc>,
    pub price: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Change between the two most recent observations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriceChange {
    /// Unsigned change in percent (10.0 == 10%).
    pub magnitude_pct: f64,
    pub direction: Direction,
}

impl PriceChange {
    pub fn is_up(&self) -> bool {
        self.direction == Direction::Up
    }

    /// Signed fraction, e.g. -0.1 for a 10% drop.
    pub fn signed_ratio(&self) -> f64 {
        match self.direction {
            Direction::Up => self.magnitude_pct / 100.0,
            Direction::Down => -self.magnitude_pct / 100.0,
        }
    }
}

/// Count-bounded FIFO of recent price observations.
///
/// Observations are kept in arrival order. Once `capacity` is reached every
/// push evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<PriceObservation>,
    capacity: usize,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, observation: PriceObservation) {
        self.values.push_back(observation);

        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    /// `None` until two observations exist, or when the previous price
    /// cannot serve as a base (zero, negative or not finite).
    pub fn latest_change(&self) -> Option<PriceChange> {
        let n = self.values.len();
        if n < 2 {
            return None;
        }

        let prev = self.values[n - 2].price;
        let last = self.values[n - 1].price;
        if prev <= 0.0 {
            return None;
        }

        let change = (last - prev) / prev * 100.0;
        if !change.is_finite() {
            return None;
        }

        Some(PriceChange {
            magnitude_pct: change.abs(),
            direction: if change >= 0.0 {
                Direction::Up
            } else {
                Direction::Down
            },
        })
    }

    /// Observations in arrival order. The iterator is cheap to clone, so a
    /// renderer can walk it as many times as it needs.
    pub fn series(&self) -> vec_deque::Iter<'_, PriceObservation> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
