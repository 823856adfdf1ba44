// =============================================================================
// Gateways — remote capabilities consumed by the automation components
// =============================================================================
//
// The components only see these traits. `birds::BirdsClient` and
// `vooi::VooiClient` implement them over HTTP; the tests implement them with
// scripted fakes.
// =============================================================================

use async_trait::async_trait;

use crate::autotrade::{AutotradeClaim, AutotradeSession};
use crate::error::GatewayError;
use crate::position::{CloseReceipt, InstrumentId, Position};
use crate::quests::{Quest, QuestStatus};
use crate::tapping::{Tapped, TappingSession};
use crate::types::{ActionResult, Reward, StateSnapshot};

/// Egg mini-game capabilities.
#[async_trait]
pub trait GameGateway: Send + Sync {
    /// Register for the current round. Idempotent.
    async fn join_game(&self) -> Result<(), GatewayError>;

    /// Current number of plays left and the accumulated reward.
    async fn fetch_game_state(&self) -> Result<StateSnapshot, GatewayError>;

    /// Spend one play.
    async fn perform_play(&self) -> Result<ActionResult, GatewayError>;

    /// Claim the accumulated reward. Returns the raw response text.
    async fn perform_claim(&self) -> Result<String, GatewayError>;
}

/// Leveraged-position capabilities.
#[async_trait]
pub trait TradingGateway: Send + Sync {
    /// Open positions, in the order the endpoint returns them.
    async fn list_open_positions(&self) -> Result<Vec<Position>, GatewayError>;

    /// Latest price for `instrument`; `UnknownInstrument` when unmapped.
    async fn lookup_price(&self, instrument: InstrumentId) -> Result<f64, GatewayError>;

    async fn close_position(&self, id: &str) -> Result<CloseReceipt, GatewayError>;
}

/// Server-side autotrade session capabilities.
#[async_trait]
pub trait AutotradeGateway: Send + Sync {
    /// The current autotrade, `None` when there is none running.
    async fn current_autotrade(&self) -> Result<Option<AutotradeSession>, GatewayError>;

    async fn start_autotrade(&self) -> Result<AutotradeSession, GatewayError>;

    async fn claim_autotrade(&self, auto_trade_id: &str) -> Result<AutotradeClaim, GatewayError>;
}

/// Tap-coin game capabilities.
#[async_trait]
pub trait TappingGateway: Send + Sync {
    async fn start_tapping(&self) -> Result<TappingSession, GatewayError>;

    /// Close `session_id`, reporting `tapped`. Returns the amount credited.
    async fn finish_tapping(&self, session_id: &str, tapped: Tapped) -> Result<Reward, GatewayError>;
}

/// Quest board capabilities.
#[async_trait]
pub trait QuestGateway: Send + Sync {
    async fn list_quests(&self) -> Result<Vec<Quest>, GatewayError>;

    /// Start a quest; returns the status the server moved it to.
    async fn start_quest(&self, id: &str) -> Result<QuestStatus, GatewayError>;

    /// Claim a finished quest. `None` when the server credited nothing.
    async fn claim_quest(&self, id: &str) -> Result<Option<Reward>, GatewayError>;
}
