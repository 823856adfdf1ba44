// =============================================================================
// Position Model — read-only view of a remote leveraged position
// =============================================================================
//
// Positions are owned by the remote trading endpoint. The monitor receives a
// fresh copy on every pass and never mutates or stores it.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade direction as reported by the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    /// Anything else the endpoint sends; such positions evaluate to 0 %.
    Other(String),
}

impl Direction {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => Self::Long,
            "short" | "sell" => Self::Short,
            _ => Self::Other(raw.to_string()),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
            Self::Other(raw) => write!(f, "{raw}"),
        }
    }
}

/// Instrument key used for price lookups (the endpoint's pair id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub u32);

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pair#{}", self.0)
    }
}

/// A single open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub instrument: InstrumentId,
    pub open_rate: f64,
    pub direction: Direction,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Signed profit in percent of the open rate at `current_price`.
    ///
    /// Long: `(current - open) / open * 100`. Short: `(open - current) / open
    /// * 100`. Unrecognised direction or a non-positive open rate yields 0.
    pub fn profit_pct(&self, current_price: f64) -> f64 {
        if self.open_rate <= 0.0 {
            return 0.0;
        }
        match self.direction {
            Direction::Long => (current_price - self.open_rate) / self.open_rate * 100.0,
            Direction::Short => (self.open_rate - current_price) / self.open_rate * 100.0,
            Direction::Other(_) => 0.0,
        }
    }
}

/// Confirmation returned by the endpoint after closing a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseReceipt {
    /// Points credited for the closed trade.
    pub reward_vt: f64,
    /// Realised PNL in percent as computed by the endpoint.
    pub pnl: f64,
}
