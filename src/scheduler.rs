// =============================================================================
// Scheduler — fixed-interval invocation of the components, per account
// =============================================================================
//
// Every account gets its own tasks (egg loop, position monitor, autotrade
// cycle, tap-coin games, quests), each ticking on a fixed interval until the shared shutdown token is
// cancelled. Accounts share nothing but that token.
//
// Each invocation runs inside an `info_span!` carrying a fresh `run_id` so
// the log lines of one invocation can be grouped.
// =============================================================================

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::action_loop::{run_action_loop, LoopOutcome};
use crate::app_state::{AccountState, Component};
use crate::autotrade::{run_autotrade_cycle, AutotradeOutcome};
use crate::birds::BirdsClient;
use crate::gateway::{AutotradeGateway, GameGateway, QuestGateway, TappingGateway, TradingGateway};
use crate::journal::{LogSink, TracingSink};
use crate::monitor::{evaluate_positions, MonitorOutcome};
use crate::pacing::pause;
use crate::quests::{run_quests, QuestOutcome};
use crate::runtime_config::{AccountConfig, RetrySettings, RuntimeConfig, TappingSettings};
use crate::tapping::{run_tapping_games, TappingOutcome};
use crate::types::ThresholdConfig;
use crate::vooi::VooiClient;

/// Everything one account needs to run: its gateways, sink and state.
pub struct AccountRuntime {
    pub state: Arc<AccountState>,
    pub sink: Arc<dyn LogSink>,
    pub game: Option<Arc<dyn GameGateway>>,
    pub trading: Option<Arc<dyn TradingGateway>>,
    pub autotrade: Option<Arc<dyn AutotradeGateway>>,
    pub tapping: Option<Arc<dyn TappingGateway>>,
    pub quests: Option<Arc<dyn QuestGateway>>,
}

/// Component settings copied out of `RuntimeConfig` once at start.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub loop_interval: Duration,
    pub monitor_interval: Duration,
    pub retry: RetrySettings,
    pub thresholds: ThresholdConfig,
    pub tapping: TappingSettings,
    pub quest_pause: Duration,
    pub auto_break_egg: bool,
    pub auto_trade_positions: bool,
    pub auto_autotrade: bool,
    pub auto_play_tapping: bool,
    pub auto_complete_quests: bool,
}

impl Schedule {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            loop_interval: Duration::from_secs(config.loop_interval_secs),
            monitor_interval: Duration::from_secs(config.monitor_interval_secs),
            retry: config.retry,
            thresholds: config.thresholds,
            tapping: config.tapping,
            quest_pause: Duration::from_secs(config.quest_pause_secs),
            auto_break_egg: config.auto_break_egg,
            auto_trade_positions: config.auto_trade_positions,
            auto_autotrade: config.auto_autotrade,
            auto_play_tapping: config.auto_play_tapping,
            auto_complete_quests: config.auto_complete_quests,
        }
    }
}

/// Build the HTTP sessions for one account. Capabilities without credentials
/// are left out.
pub fn build_account(config: &RuntimeConfig, account: &AccountConfig) -> anyhow::Result<AccountRuntime> {
    let proxy = account.proxy_url();
    let timeout = config.request_timeout_secs;

    let game = match account.birds_auth.as_deref() {
        Some(auth) => {
            let client: Arc<dyn GameGateway> = Arc::new(BirdsClient::new(
                config.birds_base_url.as_str(),
                auth,
                proxy.as_deref(),
                timeout,
            )?);
            Some(client)
        }
        None => None,
    };

    let (trading, autotrade, tapping, quests) = match account.vooi_access_token.as_deref() {
        Some(token) => {
            let client = Arc::new(VooiClient::new(
                config.vooi_base_url.as_str(),
                token,
                proxy.as_deref(),
                timeout,
            )?);
            let trading: Arc<dyn TradingGateway> = client.clone();
            let autotrade: Arc<dyn AutotradeGateway> = client.clone();
            let tapping: Arc<dyn TappingGateway> = client.clone();
            let quests: Arc<dyn QuestGateway> = client;
            (Some(trading), Some(autotrade), Some(tapping), Some(quests))
        }
        None => (None, None, None, None),
    };

    Ok(AccountRuntime {
        state: Arc::new(AccountState::new(account.name.clone())),
        sink: Arc::new(TracingSink::new(account.name.clone())),
        game,
        trading,
        autotrade,
        tapping,
        quests,
    })
}

/// Spawn the enabled component tasks of one account.
pub fn spawn_account(
    runtime: &AccountRuntime,
    schedule: Schedule,
    start_delay: Duration,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    let name = runtime.state.name.clone();

    if let (true, Some(game)) = (schedule.auto_break_egg, runtime.game.clone()) {
        let state = runtime.state.clone();
        let sink = runtime.sink.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            every(schedule.loop_interval, start_delay, &cancel, || {
                egg_tick(game.clone(), state.clone(), sink.clone(), schedule.retry, cancel.clone())
            })
            .await;
        }));
    }

    if let (true, Some(trading)) = (schedule.auto_trade_positions, runtime.trading.clone()) {
        let state = runtime.state.clone();
        let sink = runtime.sink.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            every(schedule.monitor_interval, start_delay, &cancel, || {
                monitor_tick(trading.clone(), state.clone(), sink.clone(), schedule.thresholds)
            })
            .await;
        }));
    }

    if let (true, Some(autotrade)) = (schedule.auto_autotrade, runtime.autotrade.clone()) {
        let state = runtime.state.clone();
        let sink = runtime.sink.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            every(schedule.loop_interval, start_delay, &cancel, || {
                autotrade_tick(autotrade.clone(), state.clone(), sink.clone())
            })
            .await;
        }));
    }

    if let (true, Some(tapping)) = (schedule.auto_play_tapping, runtime.tapping.clone()) {
        let state = runtime.state.clone();
        let sink = runtime.sink.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            every(schedule.loop_interval, start_delay, &cancel, || {
                tapping_tick(tapping.clone(), state.clone(), sink.clone(), schedule.tapping, cancel.clone())
            })
            .await;
        }));
    }

    if let (true, Some(quests)) = (schedule.auto_complete_quests, runtime.quests.clone()) {
        let state = runtime.state.clone();
        let sink = runtime.sink.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            every(schedule.loop_interval, start_delay, &cancel, || {
                quests_tick(quests.clone(), state.clone(), sink.clone(), schedule.quest_pause, cancel.clone())
            })
            .await;
        }));
    }

    if handles.is_empty() {
        warn!(account = %name, "no component enabled with credentials for this account");
    } else {
        info!(account = %name, tasks = handles.len(), "account tasks spawned");
    }

    handles
}

/// Call `tick` every `period` (first call after `start_delay`) until `cancel`
/// fires. A tick in progress is allowed to finish.
async fn every<F, Fut>(period: Duration, start_delay: Duration, cancel: &CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    if !pause(start_delay, cancel).await {
        return;
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => tick().await,
        }
    }
}

async fn egg_tick(
    game: Arc<dyn GameGateway>,
    state: Arc<AccountState>,
    sink: Arc<dyn LogSink>,
    retry: RetrySettings,
    cancel: CancellationToken,
) {
    let span = info_span!("egg_loop", account = %state.name, run_id = %Uuid::new_v4());
    async move {
        let report = run_action_loop(game.as_ref(), &retry, sink.as_ref(), &cancel).await;
        info!(
            outcome = %report.outcome,
            attempts = report.attempts,
            plays = report.plays,
            "egg loop finished"
        );
        if matches!(
            report.outcome,
            LoopOutcome::RetriesExhausted
                | LoopOutcome::Aborted { .. }
                | LoopOutcome::ClaimFailed { .. }
        ) {
            state.push_error(
                Component::EggLoop,
                report
                    .last_message
                    .clone()
                    .unwrap_or_else(|| report.outcome.to_string()),
            );
        }
        state.record_outcome(Component::EggLoop, report.outcome.to_string(), report.last_message);
    }
    .instrument(span)
    .await
}

async fn monitor_tick(
    trading: Arc<dyn TradingGateway>,
    state: Arc<AccountState>,
    sink: Arc<dyn LogSink>,
    thresholds: ThresholdConfig,
) {
    let span = info_span!("position_monitor", account = %state.name, run_id = %Uuid::new_v4());
    async move {
        let report = evaluate_positions(trading.as_ref(), &thresholds, sink.as_ref()).await;
        info!(
            outcome = %report.outcome,
            evaluated = report.evaluated,
            skipped = report.skipped,
            "position monitor pass finished"
        );
        if let MonitorOutcome::FetchError { reason } | MonitorOutcome::CloseFailed { reason, .. } =
            &report.outcome
        {
            state.push_error(Component::PositionMonitor, reason.clone());
        }
        state.record_outcome(
            Component::PositionMonitor,
            report.outcome.to_string(),
            report.last_message,
        );
    }
    .instrument(span)
    .await
}

async fn autotrade_tick(
    autotrade: Arc<dyn AutotradeGateway>,
    state: Arc<AccountState>,
    sink: Arc<dyn LogSink>,
) {
    let span = info_span!("autotrade", account = %state.name, run_id = %Uuid::new_v4());
    async move {
        let report = run_autotrade_cycle(autotrade.as_ref(), sink.as_ref(), Utc::now()).await;
        info!(outcome = %report.outcome, "autotrade cycle finished");
        match &report.outcome {
            AutotradeOutcome::StartFailed { reason }
            | AutotradeOutcome::ClaimFailed { reason, .. }
            | AutotradeOutcome::RestartFailed { reason } => {
                state.push_error(Component::Autotrade, reason.clone());
            }
            _ => {}
        }
        state.record_outcome(Component::Autotrade, report.outcome.to_string(), report.last_message);
    }
    .instrument(span)
    .await
}

async fn tapping_tick(
    tapping: Arc<dyn TappingGateway>,
    state: Arc<AccountState>,
    sink: Arc<dyn LogSink>,
    settings: TappingSettings,
    cancel: CancellationToken,
) {
    let span = info_span!("tapping", account = %state.name, run_id = %Uuid::new_v4());
    async move {
        let report = run_tapping_games(tapping.as_ref(), &settings, sink.as_ref(), &cancel).await;
        info!(
            outcome = %report.outcome,
            earned_money = report.earned_money,
            earned_points = report.earned_points,
            "tapping games finished"
        );
        if let TappingOutcome::Aborted { reason, .. } = &report.outcome {
            state.push_error(Component::Tapping, reason.clone());
        }
        state.record_outcome(Component::Tapping, report.outcome.to_string(), report.last_message);
    }
    .instrument(span)
    .await
}

async fn quests_tick(
    quests: Arc<dyn QuestGateway>,
    state: Arc<AccountState>,
    sink: Arc<dyn LogSink>,
    quest_pause: Duration,
    cancel: CancellationToken,
) {
    let span = info_span!("quests", account = %state.name, run_id = %Uuid::new_v4());
    async move {
        let report = run_quests(quests.as_ref(), quest_pause, sink.as_ref(), &cancel).await;
        info!(
            outcome = %report.outcome,
            earned_money = report.earned_money,
            earned_points = report.earned_points,
            "quest pass finished"
        );
        if let QuestOutcome::FetchError { reason } = &report.outcome {
            state.push_error(Component::Quests, reason.clone());
        }
        state.record_outcome(Component::Quests, report.outcome.to_string(), report.last_message);
    }
    .instrument(span)
    .await
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::GatewayError;
    use crate::journal::RecordingSink;
    use crate::position::{CloseReceipt, InstrumentId, Position};
    use crate::quests::{Quest, QuestStatus};
    use crate::types::{ActionResult, Reward, StateSnapshot};

    #[derive(Default)]
    struct IdleGame {
        polls: AtomicU32,
    }

    #[async_trait]
    impl GameGateway for IdleGame {
        async fn join_game(&self) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn fetch_game_state(&self) -> Result<StateSnapshot, GatewayError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(StateSnapshot {
                available_actions: 0,
                total_reward: 0,
            })
        }
        async fn perform_play(&self) -> Result<ActionResult, GatewayError> {
            Ok(ActionResult::failed())
        }
        async fn perform_claim(&self) -> Result<String, GatewayError> {
            Ok(String::new())
        }
    }

    struct BrokenDesk;

    #[async_trait]
    impl TradingGateway for BrokenDesk {
        async fn list_open_positions(&self) -> Result<Vec<Position>, GatewayError> {
            Err(GatewayError::Status {
                code: 502,
                body: "bad gateway".into(),
            })
        }
        async fn lookup_price(&self, _: InstrumentId) -> Result<f64, GatewayError> {
            unreachable!("no positions are ever listed")
        }
        async fn close_position(&self, _: &str) -> Result<CloseReceipt, GatewayError> {
            unreachable!("no positions are ever listed")
        }
    }

    fn schedule() -> Schedule {
        let mut config = RuntimeConfig::default();
        config.auto_autotrade = false;
        let mut s = Schedule::from_config(&config);
        s.loop_interval = Duration::from_secs(3600);
        s.monitor_interval = Duration::from_secs(3600);
        s
    }

    #[tokio::test]
    async fn ticks_until_cancelled() {
        let game = Arc::new(IdleGame::default());
        let game_gateway: Arc<dyn GameGateway> = game.clone();
        let trading: Arc<dyn TradingGateway> = Arc::new(BrokenDesk);
        let runtime = AccountRuntime {
            state: Arc::new(AccountState::new("acc-1")),
            sink: Arc::new(RecordingSink::default()),
            game: Some(game_gateway),
            trading: Some(trading),
            autotrade: None,
            tapping: None,
            quests: None,
        };
        let cancel = CancellationToken::new();
        let handles = spawn_account(&runtime, schedule(), Duration::ZERO, &cancel);
        assert_eq!(handles.len(), 2);

        // First interval tick fires immediately.
        for _ in 0..100 {
            if runtime.state.invocations() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(game.polls.load(Ordering::SeqCst), 1);
        let summary = runtime.state.summary();
        assert_eq!(
            summary.egg_loop.map(|r| r.outcome).as_deref(),
            Some("NothingToDo")
        );
        assert!(summary
            .position_monitor
            .map(|r| r.outcome.starts_with("FetchError"))
            .unwrap_or(false));
        assert_eq!(summary.recent_errors.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let game = Arc::new(IdleGame::default());
        let game_gateway: Arc<dyn GameGateway> = game.clone();
        let runtime = AccountRuntime {
            state: Arc::new(AccountState::new("acc-2")),
            sink: Arc::new(RecordingSink::default()),
            game: Some(game_gateway),
            trading: None,
            autotrade: None,
            tapping: None,
            quests: None,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        for h in spawn_account(&runtime, schedule(), Duration::from_secs(60), &cancel) {
            h.await.unwrap();
        }
        assert_eq!(game.polls.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.state.invocations(), 0);
    }

    #[test]
    fn accounts_without_credentials_get_no_gateways() {
        let config = RuntimeConfig::default();
        let account = AccountConfig {
            name: "empty".into(),
            ..Default::default()
        };
        let runtime = build_account(&config, &account).unwrap();
        assert!(runtime.game.is_none());
        assert!(runtime.trading.is_none());
        assert!(runtime.autotrade.is_none());
        assert!(runtime.tapping.is_none());
        assert!(runtime.quests.is_none());
    }

    struct EmptyBoard;

    #[async_trait]
    impl QuestGateway for EmptyBoard {
        async fn list_quests(&self) -> Result<Vec<Quest>, GatewayError> {
            Ok(Vec::new())
        }
        async fn start_quest(&self, _: &str) -> Result<QuestStatus, GatewayError> {
            unreachable!("the board is empty")
        }
        async fn claim_quest(&self, _: &str) -> Result<Option<Reward>, GatewayError> {
            unreachable!("the board is empty")
        }
    }

    #[tokio::test]
    async fn quest_task_only_runs_when_enabled() {
        let quests: Arc<dyn QuestGateway> = Arc::new(EmptyBoard);
        let runtime = AccountRuntime {
            state: Arc::new(AccountState::new("acc-3")),
            sink: Arc::new(RecordingSink::default()),
            game: None,
            trading: None,
            autotrade: None,
            tapping: None,
            quests: Some(quests),
        };
        let cancel = CancellationToken::new();
        assert!(spawn_account(&runtime, schedule(), Duration::ZERO, &cancel).is_empty());

        let mut enabled = schedule();
        enabled.auto_complete_quests = true;
        let handles = spawn_account(&runtime, enabled, Duration::ZERO, &cancel);
        assert_eq!(handles.len(), 1);
        for _ in 0..100 {
            if runtime.state.invocations() >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(
            runtime.state.summary().quests.map(|r| r.outcome).as_deref(),
            Some("NoQuests")
        );
    }

    #[test]
    fn vooi_token_wires_every_vooi_capability() {
        let config = RuntimeConfig::default();
        let account = AccountConfig {
            name: "trader".into(),
            vooi_access_token: Some("tok".into()),
            ..Default::default()
        };
        let runtime = build_account(&config, &account).unwrap();
        assert!(runtime.game.is_none());
        assert!(runtime.trading.is_some());
        assert!(runtime.autotrade.is_some());
        assert!(runtime.tapping.is_some());
        assert!(runtime.quests.is_some());
    }
}
