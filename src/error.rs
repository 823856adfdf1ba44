// =============================================================================
// Gateway Errors — typed failures returned by the remote collaborators
// =============================================================================
//
// Every remote call returns `Result<T, GatewayError>`. Callers use `class()` to
// decide whether a failure is worth retrying within the current invocation
// (Transient) or must end it (Terminal). Terminal failures are still logged;
// nothing here ever crashes the process.
// =============================================================================

use thiserror::Error;

/// Whether a failure may clear up on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network timeout, 5xx / 403 / 408 / 429, malformed body.
    Transient,
    /// Unknown instrument, any other 4xx (bad credentials, missing route).
    Terminal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

/// Failure of a single remote capability call.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),
}

impl GatewayError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transport(_) | Self::Malformed(_) => ErrorClass::Transient,
            // 403 is the Cloudflare challenge, it clears on its own.
            Self::Status { code, .. } => match code {
                403 | 408 | 429 => ErrorClass::Transient,
                400..=499 => ErrorClass::Terminal,
                _ => ErrorClass::Transient,
            },
            Self::UnknownInstrument(_) => ErrorClass::Terminal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                code: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
