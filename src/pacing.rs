// =============================================================================
// Pacing — waits that give way to shutdown
// =============================================================================

use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless `cancel` fires first. Returns `false` when
/// cancelled; a token that is already cancelled wins over a zero wait.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
