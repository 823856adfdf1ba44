// =============================================================================
// Action Loop Controller — poll / decide / act / retry for the egg mini-game
// =============================================================================
//
// State machine:
//
//   Polling ──ok──▶ Deciding ──plays left──▶ Acting ──reward──▶ Polling
//      │                 ├──reward pending──▶ Claiming ─────────▶ Done
//      │                 └──nothing─────────▶ Idle ─────────────▶ Done
//      └──error──▶ back off (RetryBudget) ──▶ Polling | Done
//
// Rules:
//   - The game is joined once per invocation before the first poll. A failed
//     join is reported and polling goes ahead anyway.
//   - Only transient failures are retried. A terminal failure (bad
//     credentials, missing route) ends the invocation with Aborted.
//   - Fetch and play failures share one RetryBudget. The failure that would
//     push `attempts` past `max` ends the invocation with RetriesExhausted.
//   - Claim runs at most once per invocation and is never retried here; the
//     next scheduled tick picks it up again.
//   - Backoff sleeps race the cancellation token so a supervisor can stop the
//     account mid-cycle.
// =============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::GatewayError;
use crate::gateway::GameGateway;
use crate::journal::{LogSink, Narrator};
use crate::pacing::pause;
use crate::runtime_config::RetrySettings;
use crate::types::StateSnapshot;

const LABEL: &str = "Auto Break Egg";

// ---------------------------------------------------------------------------
// Retry budget
// ---------------------------------------------------------------------------

/// Retry counter scoped to a single invocation.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    attempts: u32,
    max: u32,
    backoff: Duration,
}

impl RetryBudget {
    pub fn new(max: u32, backoff_secs: u64) -> Self {
        Self {
            attempts: 0,
            max,
            backoff: Duration::from_secs(backoff_secs),
        }
    }

    /// Spend one retry. Returns `false` once the budget is exhausted, in which
    /// case `attempts` stays at `max`.
    pub fn consume(&mut self) -> bool {
        if self.attempts >= self.max {
            return false;
        }
        self.attempts += 1;
        true
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

// ---------------------------------------------------------------------------
// States and outcomes
// ---------------------------------------------------------------------------

/// What to do with a freshly polled snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Act,
    Claim,
    Idle,
}

pub fn decide(snapshot: &StateSnapshot) -> Decision {
    if snapshot.available_actions > 0 {
        Decision::Act
    } else if snapshot.total_reward > 0 {
        Decision::Claim
    } else {
        Decision::Idle
    }
}

#[derive(Debug)]
enum LoopState {
    Polling,
    Deciding(StateSnapshot),
    Acting,
    Claiming { total: i64 },
    Idle,
    Done(LoopOutcome),
}

/// Terminal outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopOutcome {
    Claimed { amount: i64 },
    ClaimFailed { reason: String },
    RetriesExhausted,
    Aborted { reason: String },
    NothingToDo,
    PlaySucceeded { plays: u32 },
    Cancelled,
}

impl std::fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claimed { amount } => write!(f, "Claimed({amount})"),
            Self::ClaimFailed { reason } => write!(f, "ClaimFailed({reason})"),
            Self::RetriesExhausted => write!(f, "RetriesExhausted"),
            Self::Aborted { reason } => write!(f, "Aborted({reason})"),
            Self::NothingToDo => write!(f, "NothingToDo"),
            Self::PlaySucceeded { plays } => write!(f, "PlaySucceeded({plays})"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Everything the caller gets back from one invocation.
#[derive(Debug, Clone)]
pub struct LoopReport {
    pub outcome: LoopOutcome,
    pub attempts: u32,
    pub plays: u32,
    pub last_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Run the egg loop once, to a terminal outcome.
pub async fn run_action_loop(
    gateway: &dyn GameGateway,
    settings: &RetrySettings,
    sink: &dyn LogSink,
    cancel: &CancellationToken,
) -> LoopReport {
    let mut budget = RetryBudget::new(settings.max_retries, settings.backoff_secs);
    let mut narrator = Narrator::new(sink);
    let mut plays: u32 = 0;
    let mut state = LoopState::Polling;

    if let Err(e) = gateway.join_game().await {
        narrator.warn(format!("{LABEL}: Join failed ({}): {e}", e.class()));
    }

    let outcome = loop {
        state = match state {
            LoopState::Polling => match gateway.fetch_game_state().await {
                Ok(snapshot) => {
                    debug!(
                        available_actions = snapshot.available_actions,
                        total_reward = snapshot.total_reward,
                        "egg state polled"
                    );
                    LoopState::Deciding(snapshot)
                }
                Err(e) if !e.is_transient() => LoopState::Done(abort(&mut narrator, "State fetch", e)),
                Err(e) => {
                    narrator.warn(format!("{LABEL}: State fetch failed ({}): {e}", e.class()));
                    match back_off(&mut budget, &mut narrator, cancel).await {
                        Some(outcome) => LoopState::Done(outcome),
                        None => LoopState::Polling,
                    }
                }
            },

            LoopState::Deciding(snapshot) => match decide(&snapshot) {
                Decision::Act => LoopState::Acting,
                Decision::Claim => LoopState::Claiming {
                    total: snapshot.total_reward,
                },
                Decision::Idle => LoopState::Idle,
            },

            LoopState::Acting => {
                if plays >= settings.max_plays_per_run {
                    narrator.warn(format!(
                        "{LABEL}: Play limit of {} reached for this run",
                        settings.max_plays_per_run
                    ));
                    LoopState::Done(LoopOutcome::PlaySucceeded { plays })
                } else {
                    let failure = match gateway.perform_play().await {
                        Ok(result) => match result.reward() {
                            Some(reward) => {
                                plays += 1;
                                narrator.info(format!("{LABEL}: Play Success | Reward: {reward}"));
                                None
                            }
                            None => Some(Ok(format!("{LABEL}: Play Fail (no reward in response)"))),
                        },
                        Err(e) if !e.is_transient() => Some(Err(e)),
                        Err(e) => Some(Ok(format!("{LABEL}: Play Fail ({}): {e}", e.class()))),
                    };
                    match failure {
                        None => LoopState::Polling,
                        Some(Err(e)) => LoopState::Done(abort(&mut narrator, "Play", e)),
                        Some(Ok(message)) => {
                            narrator.warn(message);
                            match back_off(&mut budget, &mut narrator, cancel).await {
                                Some(outcome) => LoopState::Done(outcome),
                                None => LoopState::Polling,
                            }
                        }
                    }
                }
            }

            LoopState::Claiming { total } => match gateway.perform_claim().await {
                Ok(body) => {
                    debug!(body = %body, "egg claim response");
                    narrator.info(format!("{LABEL}: Claim Success | Added {total} points"));
                    LoopState::Done(LoopOutcome::Claimed { amount: total })
                }
                Err(e) => {
                    narrator.error(format!("{LABEL}: Claim Fail ({}): {e}", e.class()));
                    LoopState::Done(LoopOutcome::ClaimFailed {
                        reason: e.to_string(),
                    })
                }
            },

            LoopState::Idle => {
                if plays > 0 {
                    narrator.info(format!("{LABEL}: {plays} play(s) done, nothing to claim yet"));
                    LoopState::Done(LoopOutcome::PlaySucceeded { plays })
                } else {
                    narrator.info(format!("{LABEL}: No turn to crack egg"));
                    LoopState::Done(LoopOutcome::NothingToDo)
                }
            }

            LoopState::Done(outcome) => break outcome,
        };
    };

    LoopReport {
        outcome,
        attempts: budget.attempts(),
        plays,
        last_message: narrator.into_last(),
    }
}

/// Terminal failure: no retry can fix it within this invocation.
fn abort(narrator: &mut Narrator<'_>, step: &str, e: GatewayError) -> LoopOutcome {
    narrator.error(format!("{LABEL}: {step} failed ({}), giving up: {e}", e.class()));
    LoopOutcome::Aborted {
        reason: e.to_string(),
    }
}

/// Spend one retry and sleep the backoff. Returns the terminal outcome when
/// the loop must stop instead.
async fn back_off(
    budget: &mut RetryBudget,
    narrator: &mut Narrator<'_>,
    cancel: &CancellationToken,
) -> Option<LoopOutcome> {
    if !budget.consume() {
        narrator.error(format!(
            "{LABEL}: Maximum retries reached ({})",
            budget.max()
        ));
        return Some(LoopOutcome::RetriesExhausted);
    }

    narrator.warn(format!(
        "{LABEL}: Retry after {}s: {}/{}",
        budget.backoff().as_secs(),
        budget.attempts(),
        budget.max()
    ));

    if pause(budget.backoff(), cancel).await {
        None
    } else {
        narrator.warn(format!("{LABEL}: Cancelled during backoff"));
        Some(LoopOutcome::Cancelled)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::journal::RecordingSink;
    use crate::types::{ActionResult, Reward};

    /// Scripted game endpoint. Each queue is consumed front to back; an empty
    /// queue answers with a transport error.
    #[derive(Default)]
    struct ScriptedGame {
        join_error: Option<GatewayError>,
        polls: Mutex<VecDeque<Result<StateSnapshot, GatewayError>>>,
        plays: Mutex<VecDeque<Result<ActionResult, GatewayError>>>,
        claims: Mutex<VecDeque<Result<String, GatewayError>>>,
        poll_calls: AtomicU32,
        play_calls: AtomicU32,
        claim_calls: AtomicU32,
    }

    impl ScriptedGame {
        fn poll(self, r: Result<StateSnapshot, GatewayError>) -> Self {
            self.polls.lock().push_back(r);
            self
        }
        fn play(self, r: Result<ActionResult, GatewayError>) -> Self {
            self.plays.lock().push_back(r);
            self
        }
        fn claim(self, r: Result<String, GatewayError>) -> Self {
            self.claims.lock().push_back(r);
            self
        }
        fn calls(&self) -> (u32, u32, u32) {
            (
                self.poll_calls.load(Ordering::SeqCst),
                self.play_calls.load(Ordering::SeqCst),
                self.claim_calls.load(Ordering::SeqCst),
            )
        }
    }

    fn down() -> GatewayError {
        GatewayError::Transport("connection reset".into())
    }

    #[async_trait]
    impl GameGateway for ScriptedGame {
        async fn join_game(&self) -> Result<(), GatewayError> {
            match &self.join_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
        async fn fetch_game_state(&self) -> Result<StateSnapshot, GatewayError> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            self.polls.lock().pop_front().unwrap_or_else(|| Err(down()))
        }
        async fn perform_play(&self) -> Result<ActionResult, GatewayError> {
            self.play_calls.fetch_add(1, Ordering::SeqCst);
            self.plays.lock().pop_front().unwrap_or_else(|| Err(down()))
        }
        async fn perform_claim(&self) -> Result<String, GatewayError> {
            self.claim_calls.fetch_add(1, Ordering::SeqCst);
            self.claims.lock().pop_front().unwrap_or_else(|| Err(down()))
        }
    }

    fn snap(available_actions: i64, total_reward: i64) -> StateSnapshot {
        StateSnapshot {
            available_actions,
            total_reward,
        }
    }

    fn settings(max_retries: u32) -> RetrySettings {
        RetrySettings {
            max_retries,
            backoff_secs: 0,
            max_plays_per_run: 50,
        }
    }

    async fn run(game: &ScriptedGame, s: RetrySettings) -> (LoopReport, RecordingSink) {
        let sink = RecordingSink::default();
        let report = run_action_loop(game, &s, &sink, &CancellationToken::new()).await;
        (report, sink)
    }

    #[test]
    fn budget_never_exceeds_max() {
        let mut b = RetryBudget::new(2, 10);
        assert!(b.consume());
        assert!(b.consume());
        assert!(!b.consume());
        assert!(!b.consume());
        assert_eq!(b.attempts(), 2);
        assert_eq!(b.backoff(), Duration::from_secs(10));
    }

    #[test]
    fn available_actions_always_mean_act() {
        for (a, t) in [(1, 0), (1, 50), (7, 1_000)] {
            assert_eq!(decide(&snap(a, t)), Decision::Act);
        }
        assert_eq!(decide(&snap(0, 5)), Decision::Claim);
        assert_eq!(decide(&snap(0, 0)), Decision::Idle);
    }

    #[tokio::test]
    async fn nothing_to_do_makes_no_further_calls() {
        let game = ScriptedGame::default().poll(Ok(snap(0, 0)));
        let (report, _) = run(&game, settings(5)).await;
        assert_eq!(report.outcome, LoopOutcome::NothingToDo);
        assert_eq!(game.calls(), (1, 0, 0));
        assert_eq!(report.last_message.as_deref(), Some("Auto Break Egg: No turn to crack egg"));
    }

    #[tokio::test]
    async fn plays_until_exhausted_then_claims_once() {
        let game = ScriptedGame::default()
            .poll(Ok(snap(2, 0)))
            .play(Ok(ActionResult::rewarded(Reward::Amount(5))))
            .poll(Ok(snap(1, 5)))
            .play(Ok(ActionResult::rewarded(Reward::Amount(7))))
            .poll(Ok(snap(0, 12)))
            .claim(Ok("ok".into()));
        let (report, sink) = run(&game, settings(5)).await;
        assert_eq!(report.outcome, LoopOutcome::Claimed { amount: 12 });
        assert_eq!(report.plays, 2);
        assert_eq!(report.attempts, 0);
        assert_eq!(game.calls(), (3, 2, 1));
        assert!(sink.messages()[0].contains("Reward: 5"));
    }

    #[tokio::test]
    async fn first_decision_with_actions_never_claims() {
        // Reward pending AND plays left: must play first.
        let game = ScriptedGame::default()
            .poll(Ok(snap(1, 40)))
            .play(Ok(ActionResult::rewarded(Reward::Amount(1))))
            .poll(Ok(snap(0, 0)));
        let (report, _) = run(&game, settings(5)).await;
        assert_eq!(report.outcome, LoopOutcome::PlaySucceeded { plays: 1 });
        assert_eq!(game.calls(), (2, 1, 0));
    }

    #[tokio::test]
    async fn poll_failures_exhaust_budget_exactly_once() {
        let game = ScriptedGame::default();
        let (report, sink) = run(&game, settings(3)).await;
        assert_eq!(report.outcome, LoopOutcome::RetriesExhausted);
        assert_eq!(report.attempts, 3);
        // initial poll + 3 retries, no action calls
        assert_eq!(game.calls(), (4, 0, 0));
        let exhausted = sink
            .messages()
            .iter()
            .filter(|m| m.contains("Maximum retries reached"))
            .count();
        assert_eq!(exhausted, 1);
    }

    #[tokio::test]
    async fn transient_poll_failure_recovers() {
        let game = ScriptedGame::default()
            .poll(Err(GatewayError::Status {
                code: 403,
                body: "cloudflare".into(),
            }))
            .poll(Ok(snap(0, 3)))
            .claim(Ok("claimed".into()));
        let (report, sink) = run(&game, settings(5)).await;
        assert_eq!(report.outcome, LoopOutcome::Claimed { amount: 3 });
        assert_eq!(report.attempts, 1);
        assert!(sink.messages().iter().any(|m| m.contains("403")));
    }

    #[tokio::test]
    async fn play_failures_share_the_budget() {
        let game = ScriptedGame::default()
            .poll(Ok(snap(3, 0)))
            .play(Ok(ActionResult::failed()))
            .poll(Ok(snap(3, 0)))
            .play(Err(down()))
            .poll(Ok(snap(3, 0)))
            .play(Err(down()));
        let (report, _) = run(&game, settings(2)).await;
        assert_eq!(report.outcome, LoopOutcome::RetriesExhausted);
        assert_eq!(report.attempts, 2);
        assert_eq!(game.calls(), (3, 3, 0));
    }

    #[tokio::test]
    async fn failed_claim_is_not_retried() {
        let game = ScriptedGame::default()
            .poll(Ok(snap(0, 9)))
            .claim(Err(GatewayError::Status {
                code: 500,
                body: "boom".into(),
            }));
        let (report, _) = run(&game, settings(5)).await;
        assert!(matches!(report.outcome, LoopOutcome::ClaimFailed { .. }));
        assert_eq!(game.calls(), (1, 0, 1));
        assert_eq!(report.attempts, 0);
    }

    #[tokio::test]
    async fn play_cap_ends_the_run() {
        let game = ScriptedGame::default()
            .poll(Ok(snap(9, 0)))
            .play(Ok(ActionResult::rewarded(Reward::Amount(1))))
            .poll(Ok(snap(8, 1)));
        let s = RetrySettings {
            max_retries: 5,
            backoff_secs: 0,
            max_plays_per_run: 1,
        };
        let (report, _) = run(&game, s).await;
        assert_eq!(report.outcome, LoopOutcome::PlaySucceeded { plays: 1 });
        assert_eq!(game.calls(), (2, 1, 0));
    }

    #[tokio::test]
    async fn cancelled_token_stops_backoff() {
        let game = ScriptedGame::default();
        let sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let s = RetrySettings {
            max_retries: 5,
            backoff_secs: 3600,
            max_plays_per_run: 50,
        };
        let report = run_action_loop(&game, &s, &sink, &cancel).await;
        assert_eq!(report.outcome, LoopOutcome::Cancelled);
        assert_eq!(report.attempts, 1);
        assert_eq!(game.calls(), (1, 0, 0));
    }

    #[tokio::test]
    async fn terminal_poll_failure_is_not_retried() {
        let game = ScriptedGame::default().poll(Err(GatewayError::Status {
            code: 401,
            body: "invalid init data".into(),
        }));
        let (report, sink) = run(&game, settings(5)).await;
        assert!(matches!(report.outcome, LoopOutcome::Aborted { .. }));
        assert_eq!(report.attempts, 0);
        assert_eq!(game.calls(), (1, 0, 0));
        assert_eq!(sink.count_at(tracing::Level::ERROR), 1);
    }

    #[tokio::test]
    async fn terminal_play_failure_ends_the_run() {
        let game = ScriptedGame::default()
            .poll(Ok(snap(4, 0)))
            .play(Err(GatewayError::Status {
                code: 404,
                body: "not found".into(),
            }));
        let (report, _) = run(&game, settings(5)).await;
        assert!(matches!(report.outcome, LoopOutcome::Aborted { ref reason } if reason.contains("404")));
        assert_eq!(report.attempts, 0);
        assert_eq!(game.calls(), (1, 1, 0));
    }

    #[tokio::test]
    async fn failed_join_is_reported_and_polling_continues() {
        let game = ScriptedGame {
            join_error: Some(GatewayError::Status {
                code: 500,
                body: "join down".into(),
            }),
            ..Default::default()
        }
        .poll(Ok(snap(0, 0)));
        let (report, sink) = run(&game, settings(5)).await;
        assert_eq!(report.outcome, LoopOutcome::NothingToDo);
        let messages = sink.messages();
        assert!(messages[0].contains("Join failed") && messages[0].contains("500"));
        assert_eq!(sink.count_at(tracing::Level::WARN), 1);
    }
}
