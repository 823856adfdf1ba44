// =============================================================================
// Shared types used across the autopilot
// =============================================================================

use serde::{Deserialize, Serialize};

/// One poll of the egg mini-game: how many plays remain and how much has been
/// accumulated for claiming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub available_actions: i64,
    pub total_reward: i64,
}

/// Reward attached to a successful action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reward {
    /// Plain point amount (egg mini-game).
    Amount(i64),
    /// Virtual currency pair used by the trading endpoints.
    Virtual { virt_money: f64, virt_points: f64 },
}

impl std::fmt::Display for Reward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amount(n) => write!(f, "{n}"),
            Self::Virtual {
                virt_money,
                virt_points,
            } => write!(f, "{virt_money} vUSD & {virt_points} VT"),
        }
    }
}

/// Result of a play/claim style action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub succeeded: bool,
    #[serde(default)]
    pub payload: Option<Reward>,
}

impl ActionResult {
    pub fn rewarded(reward: Reward) -> Self {
        Self {
            succeeded: true,
            payload: Some(reward),
        }
    }

    pub fn failed() -> Self {
        Self {
            succeeded: false,
            payload: None,
        }
    }

    /// The reward, only when the action succeeded and actually paid out.
    pub fn reward(&self) -> Option<&Reward> {
        if self.succeeded {
            self.payload.as_ref()
        } else {
            None
        }
    }
}

fn default_profit_pct() -> f64 {
    5.0
}

fn default_loss_pct() -> f64 {
    -2.0
}

/// Profit / loss bounds (in percent) at which an open position is closed.
/// Loaded once at start and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_profit_pct")]
    pub profit_pct: f64,
    #[serde(default = "default_loss_pct")]
    pub loss_pct: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            profit_pct: default_profit_pct(),
            loss_pct: default_loss_pct(),
        }
    }
}

impl ThresholdConfig {
    pub fn new(profit_pct: f64, loss_pct: f64) -> Self {
        Self {
            profit_pct,
            loss_pct,
        }
    }

    /// Which bound, if any, `profit_pct` crosses. Profit wins when both match
    /// (only possible with an inverted config).
    pub fn crossed(&self, profit_pct: f64) -> Option<ThresholdHit> {
        if profit_pct >= self.profit_pct {
            Some(ThresholdHit::Profit)
        } else if profit_pct <= self.loss_pct {
            Some(ThresholdHit::Loss)
        } else {
            None
        }
    }
}

/// Which side of the threshold band was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdHit {
    Profit,
    Loss,
}

impl std::fmt::Display for ThresholdHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Profit => write!(f, "profit"),
            Self::Loss => write!(f, "loss"),
        }
    }
}
