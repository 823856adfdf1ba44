// =============================================================================
// Birds REST Client — egg mini-game (join / turn / play / claim)
// =============================================================================
//
// Every request carries `Telegramauth: tma <init-data>`. The endpoint sits
// behind Cloudflare, so 403 / 5xx answers are common and surface as
// transient `GatewayError::Status` for the action loop to retry.
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::GatewayError;
use crate::gateway::GameGateway;
use crate::session::{build_session, read_json, read_text};
use crate::types::{ActionResult, Reward, StateSnapshot};

/// Birds REST client bound to one account's session.
#[derive(Clone)]
pub struct BirdsClient {
    base_url: String,
    client: reqwest::Client,
}

impl BirdsClient {
    /// Create a new `BirdsClient`.
    ///
    /// # Arguments
    /// * `base_url`  — e.g. `https://api.birds.dog`
    /// * `tele_auth` — Telegram init-data of the account.
    /// * `proxy`     — optional proxy URL with scheme.
    pub fn new(
        base_url: impl Into<String>,
        tele_auth: &str,
        proxy: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let extra = [
            ("telegramauth", format!("tma {tele_auth}")),
            ("origin", "https://birdx.birds.dog".to_string()),
            ("referer", "https://birdx.birds.dog/".to_string()),
        ];
        let client = build_session(&extra, proxy, timeout_secs)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        debug!(base_url = %base_url, "BirdsClient initialised");

        Ok(Self { base_url, client })
    }

    fn url(&self, action: &str) -> String {
        format!("{}/minigame/egg/{action}", self.base_url)
    }

    async fn get_json(&self, action: &str) -> Result<Value, GatewayError> {
        let resp = self.client.get(self.url(action)).send().await?;
        read_json(resp).await
    }
}

#[async_trait]
impl GameGateway for BirdsClient {
    /// GET /minigame/egg/join
    #[instrument(skip(self), name = "birds::join_game")]
    async fn join_game(&self) -> Result<(), GatewayError> {
        self.get_json("join").await.map(|_| ())
    }

    /// GET /minigame/egg/turn
    #[instrument(skip(self), name = "birds::fetch_game_state")]
    async fn fetch_game_state(&self) -> Result<StateSnapshot, GatewayError> {
        let body = self.get_json("turn").await?;
        parse_turn(&body)
    }

    /// GET /minigame/egg/play.
    #[instrument(skip(self), name = "birds::perform_play")]
    async fn perform_play(&self) -> Result<ActionResult, GatewayError> {
        let body = self.get_json("play").await?;
        Ok(parse_play(&body))
    }

    /// GET /minigame/egg/claim. The body is returned verbatim.
    #[instrument(skip(self), name = "birds::perform_claim")]
    async fn perform_claim(&self) -> Result<String, GatewayError> {
        let resp = self.client.get(self.url("claim")).send().await?;
        read_text(resp).await
    }
}

impl std::fmt::Debug for BirdsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BirdsClient")
            .field("auth", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// `{"turn": n, "total": m}` → snapshot.
fn parse_turn(body: &Value) -> Result<StateSnapshot, GatewayError> {
    let available_actions = as_i64(&body["turn"])
        .ok_or_else(|| GatewayError::Malformed(format!("turn response missing 'turn': {body}")))?;
    let total_reward = as_i64(&body["total"])
        .ok_or_else(|| GatewayError::Malformed(format!("turn response missing 'total': {body}")))?;
    Ok(StateSnapshot {
        available_actions,
        total_reward,
    })
}

/// `{"result": n}` with `n != 0` → rewarded; anything else → failed play.
fn parse_play(body: &Value) -> ActionResult {
    match as_i64(&body["result"]) {
        Some(amount) if amount != 0 => ActionResult::rewarded(Reward::Amount(amount)),
        _ => {
            debug!(body = %body, "play response carried no result");
            ActionResult::failed()
        }
    }
}

/// Integer from a JSON number or numeric string.
fn as_i64(val: &Value) -> Option<i64> {
    val.as_i64()
        .or_else(|| val.as_f64().map(|f| f.round() as i64))
        .or_else(|| val.as_str().and_then(|s| s.trim().parse().ok()))
}
