// =============================================================================
// Account State — per-account run bookkeeping
// =============================================================================
//
// Each account owns one `AccountState`, shared (via Arc) between that
// account's component tasks only. Accounts never share state with each other.
//
// Thread safety:
//   - Atomic counter for the number of completed invocations.
//   - parking_lot::RwLock for the last outcomes and the error ring buffer.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 20;

/// Which component produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Component {
    EggLoop,
    PositionMonitor,
    Autotrade,
    Tapping,
    Quests,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EggLoop => write!(f, "egg_loop"),
            Self::PositionMonitor => write!(f, "position_monitor"),
            Self::Autotrade => write!(f, "autotrade"),
            Self::Tapping => write!(f, "tapping"),
            Self::Quests => write!(f, "quests"),
        }
    }
}

/// Last outcome recorded for a component.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeRecord {
    pub outcome: String,
    pub message: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// A recorded failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub component: Component,
    pub message: String,
    pub at: String,
}

/// Serialisable view of an `AccountState`.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub account: String,
    pub invocations: u64,
    pub egg_loop: Option<OutcomeRecord>,
    pub position_monitor: Option<OutcomeRecord>,
    pub autotrade: Option<OutcomeRecord>,
    pub tapping: Option<OutcomeRecord>,
    pub quests: Option<OutcomeRecord>,
    pub recent_errors: Vec<ErrorRecord>,
}

pub struct AccountState {
    pub name: String,
    invocations: AtomicU64,
    egg_loop: RwLock<Option<OutcomeRecord>>,
    position_monitor: RwLock<Option<OutcomeRecord>>,
    autotrade: RwLock<Option<OutcomeRecord>>,
    tapping: RwLock<Option<OutcomeRecord>>,
    quests: RwLock<Option<OutcomeRecord>>,
    recent_errors: RwLock<Vec<ErrorRecord>>,
}

impl AccountState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            invocations: AtomicU64::new(0),
            egg_loop: RwLock::new(None),
            position_monitor: RwLock::new(None),
            autotrade: RwLock::new(None),
            tapping: RwLock::new(None),
            quests: RwLock::new(None),
            recent_errors: RwLock::new(Vec::new()),
        }
    }

    fn slot(&self, component: Component) -> &RwLock<Option<OutcomeRecord>> {
        match component {
            Component::EggLoop => &self.egg_loop,
            Component::PositionMonitor => &self.position_monitor,
            Component::Autotrade => &self.autotrade,
            Component::Tapping => &self.tapping,
            Component::Quests => &self.quests,
        }
    }

    /// Store the outcome of a finished invocation.
    pub fn record_outcome(&self, component: Component, outcome: String, message: Option<String>) {
        *self.slot(component).write() = Some(OutcomeRecord {
            outcome,
            message,
            at: Utc::now().to_rfc3339(),
        });
        self.invocations.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a failure. Oldest entries are evicted past
    /// [`MAX_RECENT_ERRORS`].
    pub fn push_error(&self, component: Component, message: String) {
        let mut errors = self.recent_errors.write();
        if errors.len() >= MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        errors.push(ErrorRecord {
            component,
            message,
            at: Utc::now().to_rfc3339(),
        });
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            account: self.name.clone(),
            invocations: self.invocations(),
            egg_loop: self.egg_loop.read().clone(),
            position_monitor: self.position_monitor.read().clone(),
            autotrade: self.autotrade.read().clone(),
            tapping: self.tapping.read().clone(),
            quests: self.quests.read().clone(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

impl std::fmt::Debug for AccountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountState")
            .field("name", &self.name)
            .field("invocations", &self.invocations())
            .field("recent_errors", &self.recent_errors.read().len())
            .finish()
    }
}
