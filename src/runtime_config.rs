// =============================================================================
// Runtime Configuration — autopilot settings with atomic save
// =============================================================================
//
// Loaded once at start from a JSON file. Thresholds and retry settings are
// handed to the components by value; nothing reads this struct through a
// global.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::ThresholdConfig;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_secs() -> u64 {
    10
}

fn default_max_plays_per_run() -> u32 {
    50
}

fn default_max_games_per_run() -> u32 {
    5
}

fn default_play_secs() -> u64 {
    30
}

fn default_pause_secs() -> u64 {
    3
}

fn default_loop_interval_secs() -> u64 {
    3800
}

fn default_monitor_interval_secs() -> u64 {
    60
}

fn default_account_delay_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_birds_base_url() -> String {
    "https://api.birds.dog".to_string()
}

fn default_vooi_base_url() -> String {
    "https://api-tg.vooi.io/api".to_string()
}

// =============================================================================
// RetrySettings
// =============================================================================

/// Retry policy for the action loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries allowed per invocation before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed wait between retries.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    /// Upper bound on successful plays in one invocation.
    #[serde(default = "default_max_plays_per_run")]
    pub max_plays_per_run: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
            max_plays_per_run: default_max_plays_per_run(),
        }
    }
}

// =============================================================================
// TappingSettings
// =============================================================================

/// Pacing of the tap-coin game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TappingSettings {
    /// Games played per invocation.
    #[serde(default = "default_max_games_per_run")]
    pub max_games_per_run: u32,

    /// How long a game session is held open before it is finished.
    #[serde(default = "default_play_secs")]
    pub play_secs: u64,

    /// Wait between two games.
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
}

impl Default for TappingSettings {
    fn default() -> Self {
        Self {
            max_games_per_run: default_max_games_per_run(),
            play_secs: default_play_secs(),
            pause_secs: default_pause_secs(),
        }
    }
}

// =============================================================================
// AccountConfig
// =============================================================================

/// Credentials and session options for one account. Tokens are supplied
/// as-is; they are never refreshed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,

    /// Telegram init-data for the egg mini-game.
    #[serde(default)]
    pub birds_auth: Option<String>,

    /// Bearer token for the trading endpoints.
    #[serde(default)]
    pub vooi_access_token: Option<String>,

    /// Optional proxy, `host:port`, `http(s)://…` or `socks5://…`.
    #[serde(default)]
    pub proxy: Option<String>,
}

impl AccountConfig {
    /// Proxy URL with a scheme. Bare `host:port` entries get `http://`.
    pub fn proxy_url(&self) -> Option<String> {
        let raw = self.proxy.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.starts_with("socks5://") || raw.starts_with("http://") || raw.starts_with("https://") {
            Some(raw.to_string())
        } else {
            Some(format!("http://{raw}"))
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Feature flags --------------------------------------------------------

    /// Run the egg mini-game loop.
    #[serde(default = "default_true")]
    pub auto_break_egg: bool,

    /// Run the threshold position monitor.
    #[serde(default = "default_true")]
    pub auto_trade_positions: bool,

    /// Run the autotrade claim / restart cycle.
    #[serde(default = "default_true")]
    pub auto_autotrade: bool,

    /// Play the tap-coin game.
    #[serde(default)]
    pub auto_play_tapping: bool,

    /// Start new quests and claim finished ones.
    #[serde(default)]
    pub auto_complete_quests: bool,

    // --- Policy ---------------------------------------------------------------

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub tapping: TappingSettings,

    /// Wait after each started or claimed quest.
    #[serde(default = "default_pause_secs")]
    pub quest_pause_secs: u64,

    // --- Scheduling -----------------------------------------------------------

    /// Interval between egg / autotrade / tapping / quest invocations.
    #[serde(default = "default_loop_interval_secs")]
    pub loop_interval_secs: u64,

    /// Interval between position monitor passes.
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,

    /// Stagger between account start-ups.
    #[serde(default = "default_account_delay_secs")]
    pub account_delay_secs: u64,

    // --- Transport ------------------------------------------------------------

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_birds_base_url")]
    pub birds_base_url: String,

    #[serde(default = "default_vooi_base_url")]
    pub vooi_base_url: String,

    // --- Accounts -------------------------------------------------------------

    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            auto_break_egg: true,
            auto_trade_positions: true,
            auto_autotrade: true,
            auto_play_tapping: false,
            auto_complete_quests: false,
            thresholds: ThresholdConfig::default(),
            retry: RetrySettings::default(),
            tapping: TappingSettings::default(),
            quest_pause_secs: default_pause_secs(),
            loop_interval_secs: default_loop_interval_secs(),
            monitor_interval_secs: default_monitor_interval_secs(),
            account_delay_secs: default_account_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            birds_base_url: default_birds_base_url(),
            vooi_base_url: default_vooi_base_url(),
            accounts: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            accounts = config.accounts.len(),
            profit_pct = config.thresholds.profit_pct,
            loss_pct = config.thresholds.loss_pct,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Reject settings the components cannot run with.
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if t.loss_pct.is_nan() || t.profit_pct.is_nan() || t.loss_pct >= t.profit_pct {
            anyhow::bail!(
                "loss threshold {} must be below profit threshold {}",
                t.loss_pct,
                t.profit_pct
            );
        }
        if self.retry.max_retries == 0 {
            anyhow::bail!("retry.max_retries must be at least 1");
        }
        if self.loop_interval_secs == 0 || self.monitor_interval_secs == 0 {
            anyhow::bail!("scheduling intervals must be non-zero");
        }
        for account in &self.accounts {
            if account.name.trim().is_empty() {
                anyhow::bail!("every account needs a name");
            }
        }
        Ok(())
    }
}
