//! Demand-response requests.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Tick;

/// Which way the grid operator wants consumption to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Consume less than the baseline (positive flexibility).
    #[serde(rename = "positive", alias = "decrease")]
    Decrease,
    /// Consume more than the baseline (negative flexibility).
    #[serde(rename = "negative", alias = "increase")]
    Increase,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Decrease => f.write_str("decrease"),
            Direction::Increase => f.write_str("increase"),
        }
    }
}

/// One request: hold consumption `power_delta` kW below (or above) the
/// baseline for `window` ticks starting at `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrRequest {
    pub timestamp: Tick,
    /// Kilowatts.
    pub power_delta: f64,
    pub direction: Direction,
    pub window: i64,
    /// Payment offered for serving the request.
    #[serde(default)]
    pub compensation: f64,
}
