// =============================================================================
// Autotrade Cycle — check / claim / restart of the server-side autotrade
// =============================================================================
//
// One invocation:
//   1. Check the current autotrade. None (or a failed check) → start one.
//   2. Status "finished" → claim its reward, then start a new one. A failed
//      claim is logged; the restart is still attempted.
//   3. Still running but past its end time → start a new one.
//   4. Otherwise report the time left.
//
// Like the egg loop, nothing here is retried in-invocation; the scheduler's
// next tick re-runs the cycle.
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gateway::AutotradeGateway;
use crate::journal::{LogSink, Narrator};
use crate::types::Reward;

/// Status string reported by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutotradeStatus {
    Finished,
    InProgress,
    Other(String),
}

impl AutotradeStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "finished" => Self::Finished,
            "in_progress" | "inProgress" | "started" => Self::InProgress,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for AutotradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finished => write!(f, "finished"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Other(raw) => write!(f, "{raw}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutotradeSession {
    pub auto_trade_id: String,
    pub status: AutotradeStatus,
    pub end_time: DateTime<Utc>,
}

/// Reward credited by claiming a finished autotrade, plus the new balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutotradeClaim {
    pub reward: Reward,
    pub balance_money: f64,
    pub balance_points: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutotradeOutcome {
    /// Nothing was running; a new autotrade was started.
    Started { ends_at: DateTime<Utc> },
    /// Nothing was running and starting one failed too.
    StartFailed { reason: String },
    /// Finished autotrade claimed; `restarted` tells whether a new one began.
    Claimed { reward: Reward, restarted: bool },
    ClaimFailed { reason: String, restarted: bool },
    /// The running autotrade had expired and was replaced.
    Restarted { ends_at: DateTime<Utc> },
    RestartFailed { reason: String },
    Running { time_left: Duration },
}

impl std::fmt::Display for AutotradeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started { ends_at } => write!(f, "Started(until {ends_at})"),
            Self::StartFailed { reason } => write!(f, "StartFailed({reason})"),
            Self::Claimed { reward, restarted } => {
                write!(f, "Claimed({reward}, restarted={restarted})")
            }
            Self::ClaimFailed { reason, restarted } => {
                write!(f, "ClaimFailed({reason}, restarted={restarted})")
            }
            Self::Restarted { ends_at } => write!(f, "Restarted(until {ends_at})"),
            Self::RestartFailed { reason } => write!(f, "RestartFailed({reason})"),
            Self::Running { time_left } => write!(f, "Running({})", format_time_left(*time_left)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutotradeReport {
    pub outcome: AutotradeOutcome,
    pub last_message: Option<String>,
}

/// `HH:MM:SS`, hours unbounded. Negative durations clamp to zero.
pub fn format_time_left(time_left: Duration) -> String {
    let secs = time_left.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Run one autotrade cycle, evaluating end times against `now`.
pub async fn run_autotrade_cycle(
    gateway: &dyn AutotradeGateway,
    sink: &dyn LogSink,
    now: DateTime<Utc>,
) -> AutotradeReport {
    let mut narrator = Narrator::new(sink);
    let outcome = cycle(gateway, &mut narrator, now).await;
    debug!(outcome = %outcome, "autotrade cycle finished");
    AutotradeReport {
        outcome,
        last_message: narrator.into_last(),
    }
}

async fn cycle(
    gateway: &dyn AutotradeGateway,
    narrator: &mut Narrator<'_>,
    now: DateTime<Utc>,
) -> AutotradeOutcome {
    let current = match gateway.current_autotrade().await {
        Ok(current) => current,
        Err(e) => {
            narrator.warn(format!("Autotrade check failed ({}): {e}", e.class()));
            None
        }
    };

    let Some(session) = current else {
        narrator.info("No ongoing autotrade found. Starting autotrade.");
        return match start(gateway, narrator, now).await {
            Ok(ends_at) => AutotradeOutcome::Started { ends_at },
            Err(reason) => {
                narrator.error("Unable to start or check autotrade.");
                AutotradeOutcome::StartFailed { reason }
            }
        };
    };

    narrator.info(format!("Autotrade state: {}", session.status));

    if session.status == AutotradeStatus::Finished {
        narrator.info("Autotrade finished. Claiming rewards...");
        let claimed = match gateway.claim_autotrade(&session.auto_trade_id).await {
            Ok(claim) => {
                narrator.info(format!("Autotrade reward {}", claim.reward));
                narrator.info(format!(
                    "Total balance: {} USDT | {} VT",
                    claim.balance_money, claim.balance_points
                ));
                Ok(claim.reward)
            }
            Err(e) => {
                narrator.error(format!("Unable to claim autotrade rewards ({}): {e}", e.class()));
                Err(e.to_string())
            }
        };

        narrator.info("Starting a new autotrade...");
        let restarted = start(gateway, narrator, now).await.is_ok();
        if !restarted {
            narrator.error("Unable to start a new autotrade.");
        }

        return match claimed {
            Ok(reward) => AutotradeOutcome::Claimed { reward, restarted },
            Err(reason) => AutotradeOutcome::ClaimFailed { reason, restarted },
        };
    }

    let time_left = session.end_time - now;
    if time_left < Duration::zero() {
        narrator.info("Autotrade has already completed. Starting a new autotrade...");
        return match start(gateway, narrator, now).await {
            Ok(ends_at) => AutotradeOutcome::Restarted { ends_at },
            Err(reason) => {
                narrator.error("Unable to start a new autotrade.");
                AutotradeOutcome::RestartFailed { reason }
            }
        };
    }

    log_time_left(narrator, session.end_time, time_left);
    AutotradeOutcome::Running { time_left }
}

async fn start(
    gateway: &dyn AutotradeGateway,
    narrator: &mut Narrator<'_>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, String> {
    match gateway.start_autotrade().await {
        Ok(session) => {
            log_time_left(narrator, session.end_time, session.end_time - now);
            Ok(session.end_time)
        }
        Err(e) => {
            narrator.warn(format!("Autotrade start request failed ({}): {e}", e.class()));
            Err(e.to_string())
        }
    }
}

fn log_time_left(narrator: &mut Narrator<'_>, end_time: DateTime<Utc>, time_left: Duration) {
    narrator.info(format!(
        "Time left: {} | {}",
        format_time_left(time_left),
        end_time.format("%Y-%m-%d %H:%M:%S")
    ));
}
