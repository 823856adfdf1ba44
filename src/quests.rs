// =============================================================================
// Quests — start new tasks, claim finished ones
// =============================================================================
//
// One invocation works from a single listing: every `new` quest is started,
// then every quest that was already `done` in that listing is claimed. A
// failure on one quest is logged and counted; the rest still run.
// =============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::gateway::QuestGateway;
use crate::journal::{LogSink, Narrator};
use crate::pacing::pause;
use crate::types::Reward;

const LABEL: &str = "Quest";

/// Quest ids the server lists but never lets complete.
const SKIPPED_QUEST_IDS: [&str; 1] = ["71"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestStatus {
    New,
    InProgress,
    Done,
    Claimed,
    Other(String),
}

impl QuestStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "new" => Self::New,
            "in_progress" => Self::InProgress,
            "done" => Self::Done,
            "claimed" => Self::Claimed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
            Self::Claimed => write!(f, "claimed"),
            Self::Other(raw) => write!(f, "{raw}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub description: String,
    pub status: QuestStatus,
}

impl Quest {
    fn actionable(&self, status: &QuestStatus) -> bool {
        self.status == *status && !SKIPPED_QUEST_IDS.contains(&self.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestOutcome {
    FetchError { reason: String },
    NoQuests,
    Processed { started: u32, claimed: u32, failed: u32 },
    Cancelled { started: u32, claimed: u32 },
}

impl std::fmt::Display for QuestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FetchError { reason } => write!(f, "FetchError({reason})"),
            Self::NoQuests => write!(f, "NoQuests"),
            Self::Processed {
                started,
                claimed,
                failed,
            } => write!(f, "Processed(started={started}, claimed={claimed}, failed={failed})"),
            Self::Cancelled { started, claimed } => {
                write!(f, "Cancelled(started={started}, claimed={claimed})")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuestReport {
    pub outcome: QuestOutcome,
    pub earned_money: f64,
    pub earned_points: f64,
    pub last_message: Option<String>,
}

#[derive(Default)]
struct Tally {
    started: u32,
    claimed: u32,
    failed: u32,
    earned_money: f64,
    earned_points: f64,
}

/// Run one quest pass, waiting `quest_pause` after each successful step.
pub async fn run_quests(
    gateway: &dyn QuestGateway,
    quest_pause: Duration,
    sink: &dyn LogSink,
    cancel: &CancellationToken,
) -> QuestReport {
    let mut narrator = Narrator::new(sink);
    let mut tally = Tally::default();
    let outcome = pass(gateway, quest_pause, &mut narrator, cancel, &mut tally).await;
    QuestReport {
        outcome,
        earned_money: tally.earned_money,
        earned_points: tally.earned_points,
        last_message: narrator.into_last(),
    }
}

async fn pass(
    gateway: &dyn QuestGateway,
    quest_pause: Duration,
    narrator: &mut Narrator<'_>,
    cancel: &CancellationToken,
    tally: &mut Tally,
) -> QuestOutcome {
    let quests = match gateway.list_quests().await {
        Ok(quests) => quests,
        Err(e) => {
            narrator.error(format!("{LABEL}: Error getting quests ({}): {e}", e.class()));
            return QuestOutcome::FetchError {
                reason: e.to_string(),
            };
        }
    };

    if quests.is_empty() {
        narrator.info(format!("{LABEL}: Currently no quest available to complete."));
        return QuestOutcome::NoQuests;
    }

    let cancelled = |tally: &Tally| QuestOutcome::Cancelled {
        started: tally.started,
        claimed: tally.claimed,
    };

    let fresh: Vec<&Quest> = quests.iter().filter(|q| q.actionable(&QuestStatus::New)).collect();
    if fresh.is_empty() {
        narrator.info(format!("{LABEL}: No new quest available to start."));
    }
    for quest in fresh {
        match gateway.start_quest(&quest.id).await {
            Ok(QuestStatus::InProgress) => {
                tally.started += 1;
                narrator.info(format!("{LABEL}: Successfully started task {}", quest.description));
                if !pause(quest_pause, cancel).await {
                    return cancelled(&*tally);
                }
            }
            Ok(status) => {
                tally.failed += 1;
                narrator.warn(format!(
                    "{LABEL}: Unable to start task {} (status {status})",
                    quest.description
                ));
            }
            Err(e) => {
                tally.failed += 1;
                narrator.error(format!(
                    "{LABEL}: Error starting task {} ({}): {e}",
                    quest.description,
                    e.class()
                ));
            }
        }
    }

    let done: Vec<&Quest> = quests.iter().filter(|q| q.actionable(&QuestStatus::Done)).collect();
    if done.is_empty() {
        narrator.info(format!("{LABEL}: No completed quest available to claim."));
    }
    for quest in done {
        match gateway.claim_quest(&quest.id).await {
            Ok(Some(reward)) => {
                tally.claimed += 1;
                if let Reward::Virtual {
                    virt_money,
                    virt_points,
                } = reward
                {
                    tally.earned_money += virt_money;
                    tally.earned_points += virt_points;
                }
                narrator.info(format!(
                    "{LABEL}: Task {} completed | Reward {reward}",
                    quest.description
                ));
                if !pause(quest_pause, cancel).await {
                    return cancelled(&*tally);
                }
            }
            Ok(None) => {
                tally.failed += 1;
                narrator.warn(format!(
                    "{LABEL}: Unable to claim reward for task {}",
                    quest.description
                ));
            }
            Err(e) => {
                tally.failed += 1;
                narrator.error(format!(
                    "{LABEL}: Error claiming task {} ({}): {e}",
                    quest.description,
                    e.class()
                ));
            }
        }
    }

    QuestOutcome::Processed {
        started: tally.started,
        claimed: tally.claimed,
        failed: tally.failed,
    }
}
