// =============================================================================
// Tap-Coin Game — start / hold / finish sessions, a few games per invocation
// =============================================================================
//
// Per game:
//   1. Start a session. The server answers with the session id and the most
//      vUSD / VT a single game may report.
//   2. Hold the session open for `play_secs`.
//   3. Finish it, reporting a tapped amount between 50% and 80% of the vUSD
//      limit and the full VT limit.
//
// A transient failure costs only the game it happened in. A terminal failure
// ends the invocation. Every wait gives way to the shutdown token.
// =============================================================================

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::gateway::TappingGateway;
use crate::journal::{LogSink, Narrator};
use crate::pacing::pause;
use crate::runtime_config::TappingSettings;
use crate::types::Reward;

const LABEL: &str = "Tap Coin";

/// An open game session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TappingSession {
    pub session_id: String,
    pub virt_money_limit: i64,
    pub virt_points_limit: i64,
}

/// Amount reported when finishing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tapped {
    pub virt_money: i64,
    pub virt_points: i64,
}

/// Pick the amount to report for `session`.
pub fn tapped_amount<R: Rng + ?Sized>(session: &TappingSession, rng: &mut R) -> Tapped {
    let limit = session.virt_money_limit;
    let low = ((limit as f64 * 0.5) as i64).max(1);
    let high = ((limit as f64 * 0.8) as i64).max(low);
    Tapped {
        virt_money: rng.gen_range(low..=high),
        virt_points: session.virt_points_limit.max(0),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TappingOutcome {
    /// Every game ran; `failed` of them were lost to transient errors.
    Completed { won: u32, failed: u32 },
    Aborted { reason: String, won: u32 },
    Cancelled { won: u32 },
}

impl std::fmt::Display for TappingOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed { won, failed } => write!(f, "Completed(won={won}, failed={failed})"),
            Self::Aborted { reason, won } => write!(f, "Aborted({reason}, won={won})"),
            Self::Cancelled { won } => write!(f, "Cancelled(won={won})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TappingReport {
    pub outcome: TappingOutcome,
    pub earned_money: f64,
    pub earned_points: f64,
    pub last_message: Option<String>,
}

/// Play up to `settings.max_games_per_run` games.
pub async fn run_tapping_games(
    gateway: &dyn TappingGateway,
    settings: &TappingSettings,
    sink: &dyn LogSink,
    cancel: &CancellationToken,
) -> TappingReport {
    let mut narrator = Narrator::new(sink);
    let mut won = 0u32;
    let mut failed = 0u32;
    let mut earned_money = 0.0;
    let mut earned_points = 0.0;
    let max = settings.max_games_per_run;

    let outcome = 'games: {
        for game in 1..=max {
            narrator.info(format!("{LABEL}: Starting game {game}/{max}"));

            let session = match gateway.start_tapping().await {
                Ok(session) => session,
                Err(e) if !e.is_transient() => {
                    narrator.error(format!("{LABEL}: Unable to start game ({}): {e}", e.class()));
                    break 'games TappingOutcome::Aborted {
                        reason: e.to_string(),
                        won,
                    };
                }
                Err(e) => {
                    failed += 1;
                    narrator.warn(format!(
                        "{LABEL}: Unable to start game {game} ({}): {e}. Skipping this game.",
                        e.class()
                    ));
                    continue;
                }
            };

            narrator.info(format!("{LABEL}: Playing the game for {}s", settings.play_secs));
            if !pause(Duration::from_secs(settings.play_secs), cancel).await {
                narrator.warn(format!("{LABEL}: Cancelled while playing game {game}"));
                break 'games TappingOutcome::Cancelled { won };
            }

            let tapped = tapped_amount(&session, &mut rand::thread_rng());
            debug!(
                session_id = %session.session_id,
                virt_money = tapped.virt_money,
                virt_points = tapped.virt_points,
                "finishing tapping session"
            );

            match gateway.finish_tapping(&session.session_id, tapped).await {
                Ok(reward) => {
                    won += 1;
                    if let Reward::Virtual {
                        virt_money,
                        virt_points,
                    } = reward
                    {
                        earned_money += virt_money;
                        earned_points += virt_points;
                    }
                    narrator.info(format!("{LABEL}: Success get {reward} from game"));
                }
                Err(e) if !e.is_transient() => {
                    narrator.error(format!("{LABEL}: Failed completing game {game} ({}): {e}", e.class()));
                    break 'games TappingOutcome::Aborted {
                        reason: e.to_string(),
                        won,
                    };
                }
                Err(e) => {
                    failed += 1;
                    narrator.warn(format!("{LABEL}: Failed completing game {game} ({}): {e}", e.class()));
                }
            }

            if game < max && !pause(Duration::from_secs(settings.pause_secs), cancel).await {
                break 'games TappingOutcome::Cancelled { won };
            }
        }
        TappingOutcome::Completed { won, failed }
    };

    TappingReport {
        outcome,
        earned_money,
        earned_points,
        last_message: narrator.into_last(),
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::error::GatewayError;
    use crate::journal::RecordingSink;

    fn session(id: &str) -> TappingSession {
        TappingSession {
            session_id: id.into(),
            virt_money_limit: 100,
            virt_points_limit: 4,
        }
    }

    /// Scripted tapping endpoint; an empty queue answers with a transport error.
    #[derive(Default)]
    struct ScriptedTapping {
        starts: Mutex<VecDeque<Result<TappingSession, GatewayError>>>,
        finishes: Mutex<VecDeque<Result<Reward, GatewayError>>>,
        reported: Mutex<Vec<(String, Tapped)>>,
    }

    impl ScriptedTapping {
        fn start(self, r: Result<TappingSession, GatewayError>) -> Self {
            self.starts.lock().push_back(r);
            self
        }
        fn finish(self, r: Result<Reward, GatewayError>) -> Self {
            self.finishes.lock().push_back(r);
            self
        }
    }

    fn down() -> GatewayError {
        GatewayError::Transport("connection reset".into())
    }

    #[async_trait]
    impl TappingGateway for ScriptedTapping {
        async fn start_tapping(&self) -> Result<TappingSession, GatewayError> {
            self.starts.lock().pop_front().unwrap_or_else(|| Err(down()))
        }
        async fn finish_tapping(&self, session_id: &str, tapped: Tapped) -> Result<Reward, GatewayError> {
            self.reported.lock().push((session_id.to_string(), tapped));
            self.finishes.lock().pop_front().unwrap_or_else(|| Err(down()))
        }
    }

    fn settings(max_games_per_run: u32) -> TappingSettings {
        TappingSettings {
            max_games_per_run,
            play_secs: 0,
            pause_secs: 0,
        }
    }

    fn coins(virt_money: f64, virt_points: f64) -> Reward {
        Reward::Virtual {
            virt_money,
            virt_points,
        }
    }

    #[test]
    fn tapped_amount_stays_within_half_and_four_fifths() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let t = tapped_amount(&session("s"), &mut rng);
            assert!((50..=80).contains(&t.virt_money), "{}", t.virt_money);
            assert_eq!(t.virt_points, 4);
        }
    }

    #[test]
    fn tiny_and_negative_limits_still_report_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let s = TappingSession {
            session_id: "s".into(),
            virt_money_limit: 1,
            virt_points_limit: -3,
        };
        let t = tapped_amount(&s, &mut rng);
        assert_eq!(t.virt_money, 1);
        assert_eq!(t.virt_points, 0);
    }

    #[tokio::test]
    async fn plays_every_game_and_totals_rewards() {
        let gw = ScriptedTapping::default()
            .start(Ok(session("a")))
            .finish(Ok(coins(60.0, 4.0)))
            .start(Ok(session("b")))
            .finish(Ok(coins(70.0, 4.0)));
        let sink = RecordingSink::default();
        let report = run_tapping_games(&gw, &settings(2), &sink, &CancellationToken::new()).await;
        assert_eq!(report.outcome, TappingOutcome::Completed { won: 2, failed: 0 });
        assert!((report.earned_money - 130.0).abs() < 1e-9);
        assert!((report.earned_points - 8.0).abs() < 1e-9);
        let reported = gw.reported.lock();
        assert_eq!(reported[0].0, "a");
        assert_eq!(reported[1].0, "b");
    }

    #[tokio::test]
    async fn transient_start_failure_skips_only_that_game() {
        let gw = ScriptedTapping::default()
            .start(Err(GatewayError::Status {
                code: 502,
                body: "bad gateway".into(),
            }))
            .start(Ok(session("b")))
            .finish(Ok(coins(55.0, 4.0)));
        let sink = RecordingSink::default();
        let report = run_tapping_games(&gw, &settings(2), &sink, &CancellationToken::new()).await;
        assert_eq!(report.outcome, TappingOutcome::Completed { won: 1, failed: 1 });
        assert_eq!(gw.reported.lock().len(), 1);
    }

    #[tokio::test]
    async fn terminal_failure_ends_the_run() {
        let gw = ScriptedTapping::default()
            .start(Ok(session("a")))
            .finish(Err(GatewayError::Status {
                code: 401,
                body: "expired token".into(),
            }))
            .start(Ok(session("b")));
        let sink = RecordingSink::default();
        let report = run_tapping_games(&gw, &settings(3), &sink, &CancellationToken::new()).await;
        assert!(matches!(report.outcome, TappingOutcome::Aborted { won: 0, .. }));
        assert_eq!(gw.starts.lock().len(), 1, "second game never started");
    }

    #[tokio::test]
    async fn shutdown_during_play_skips_finish() {
        let gw = ScriptedTapping::default().start(Ok(session("a")));
        let sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = run_tapping_games(&gw, &settings(3), &sink, &cancel).await;
        assert_eq!(report.outcome, TappingOutcome::Cancelled { won: 0 });
        assert!(gw.reported.lock().is_empty());
    }
}
