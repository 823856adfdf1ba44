// =============================================================================
// Vooi REST Client — autotrade, positions, rates, tapping, quests
// =============================================================================
//
// SECURITY: the bearer token is never logged or serialized. It is supplied in
// the account config and used as-is for the lifetime of the process.
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::autotrade::{AutotradeClaim, AutotradeSession};
use crate::error::GatewayError;
use crate::gateway::{AutotradeGateway, QuestGateway, TappingGateway, TradingGateway};
use crate::position::{CloseReceipt, InstrumentId, Position};
use crate::quests::{Quest, QuestStatus};
use crate::session::{build_session, read_json};
use crate::tapping::{Tapped, TappingSession};
use crate::types::Reward;
use crate::vooi::wire;

/// Page size used when listing open positions.
const POSITIONS_PAGE: u32 = 10;

/// Page size used when listing quests.
const QUESTS_PAGE: u32 = 200;

/// The server expects numeric ids as numbers when they were issued as such.
fn id_value(id: &str) -> Value {
    id.parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(id))
}

/// Vooi REST client bound to one account's session.
#[derive(Clone)]
pub struct VooiClient {
    base_url: String,
    client: reqwest::Client,
}

impl VooiClient {
    /// Create a new `VooiClient`.
    ///
    /// # Arguments
    /// * `base_url`     — e.g. `https://api-tg.vooi.io/api`
    /// * `access_token` — bearer token of the account.
    /// * `proxy`        — optional proxy URL with scheme.
    pub fn new(
        base_url: impl Into<String>,
        access_token: &str,
        proxy: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let extra = [
            ("authorization", format!("Bearer {access_token}")),
            ("origin", "https://app.tg.vooi.io".to_string()),
            ("referer", "https://app.tg.vooi.io/".to_string()),
        ];
        let client = build_session(&extra, proxy, timeout_secs)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        debug!(base_url = %base_url, "VooiClient initialised");

        Ok(Self { base_url, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn get(&self, path: &str) -> Result<Value, GatewayError> {
        let resp = self.client.get(self.url(path)).send().await?;
        read_json(resp).await
    }

    async fn post(&self, path: &str, payload: Value) -> Result<Value, GatewayError> {
        let resp = self.client.post(self.url(path)).json(&payload).send().await?;
        read_json(resp).await
    }
}

#[async_trait]
impl TradingGateway for VooiClient {
    /// GET /trades/positions?limit=10&skip=0&statuses=open
    #[instrument(skip(self), name = "vooi::list_open_positions")]
    async fn list_open_positions(&self) -> Result<Vec<Position>, GatewayError> {
        let body = self
            .get(&format!("trades/positions?limit={POSITIONS_PAGE}&skip=0&statuses=open"))
            .await?;
        let positions = wire::parse_positions(&body)?;
        debug!(count = positions.len(), "open positions retrieved");
        Ok(positions)
    }

    /// GET /rates/0?pairId=N
    #[instrument(skip(self), name = "vooi::lookup_price")]
    async fn lookup_price(&self, instrument: InstrumentId) -> Result<f64, GatewayError> {
        let ticker = wire::pair_ticker(instrument)
            .ok_or_else(|| GatewayError::UnknownInstrument(instrument.to_string()))?;
        let body = self.get(&format!("rates/0?pairId={}", instrument.0)).await?;
        let price = wire::parse_latest_price(&body)?;
        debug!(ticker, price, "price retrieved");
        Ok(price)
    }

    /// PATCH /trades/close/{id}
    #[instrument(skip(self), name = "vooi::close_position")]
    async fn close_position(&self, id: &str) -> Result<CloseReceipt, GatewayError> {
        let resp = self
            .client
            .patch(self.url(&format!("trades/close/{id}")))
            .json(&json!({}))
            .send()
            .await?;
        let body = read_json(resp).await?;
        wire::parse_close(&body)
    }
}

#[async_trait]
impl AutotradeGateway for VooiClient {
    /// GET /autotrade
    #[instrument(skip(self), name = "vooi::current_autotrade")]
    async fn current_autotrade(&self) -> Result<Option<AutotradeSession>, GatewayError> {
        let body = self.get("autotrade").await?;
        wire::parse_autotrade(&body)
    }

    /// POST /autotrade/start
    #[instrument(skip(self), name = "vooi::start_autotrade")]
    async fn start_autotrade(&self) -> Result<AutotradeSession, GatewayError> {
        let body = self.post("autotrade/start", json!({})).await?;
        wire::parse_autotrade(&body)?.ok_or_else(|| {
            GatewayError::Malformed("autotrade start returned an empty body".to_string())
        })
    }

    /// POST /autotrade/claim
    #[instrument(skip(self), name = "vooi::claim_autotrade")]
    async fn claim_autotrade(&self, auto_trade_id: &str) -> Result<AutotradeClaim, GatewayError> {
        let body = self
            .post("autotrade/claim", json!({ "autoTradeId": id_value(auto_trade_id) }))
            .await?;
        wire::parse_autotrade_claim(&body)
    }
}

#[async_trait]
impl TappingGateway for VooiClient {
    /// POST /tapping/start_session
    #[instrument(skip(self), name = "vooi::start_tapping")]
    async fn start_tapping(&self) -> Result<TappingSession, GatewayError> {
        let body = self.post("tapping/start_session", json!({})).await?;
        wire::parse_tapping_session(&body)
    }

    /// POST /tapping/finish
    #[instrument(skip(self), name = "vooi::finish_tapping")]
    async fn finish_tapping(&self, session_id: &str, tapped: Tapped) -> Result<Reward, GatewayError> {
        let body = self
            .post("tapping/finish", finish_payload(session_id, tapped))
            .await?;
        wire::parse_tapped(&body)
    }
}

#[async_trait]
impl QuestGateway for VooiClient {
    /// GET /tasks?limit=200&skip=0
    #[instrument(skip(self), name = "vooi::list_quests")]
    async fn list_quests(&self) -> Result<Vec<Quest>, GatewayError> {
        let body = self.get(&format!("tasks?limit={QUESTS_PAGE}&skip=0")).await?;
        let quests = wire::parse_quests(&body)?;
        debug!(count = quests.len(), "quests retrieved");
        Ok(quests)
    }

    /// POST /tasks/start/{id}
    #[instrument(skip(self), name = "vooi::start_quest")]
    async fn start_quest(&self, id: &str) -> Result<QuestStatus, GatewayError> {
        let body = self.post(&format!("tasks/start/{id}"), json!({})).await?;
        wire::parse_quest_start(&body)
    }

    /// POST /tasks/claim/{id}
    #[instrument(skip(self), name = "vooi::claim_quest")]
    async fn claim_quest(&self, id: &str) -> Result<Option<Reward>, GatewayError> {
        let body = self.post(&format!("tasks/claim/{id}"), json!({})).await?;
        wire::parse_quest_claim(&body)
    }
}

fn finish_payload(session_id: &str, tapped: Tapped) -> Value {
    json!({
        "sessionId": id_value(session_id),
        "tapped": {
            "virtMoney": tapped.virt_money,
            "virtPoints": tapped.virt_points,
        }
    })
}

impl std::fmt::Debug for VooiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VooiClient")
            .field("access_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}
