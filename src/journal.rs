// =============================================================================
// Journal — injected log sink for the automation components
// =============================================================================
//
// Components never log through a global. They receive a `&dyn LogSink` and
// wrap it in a `Narrator`, which also remembers the last message so it can be
// returned to the caller alongside the outcome.
// =============================================================================

use tracing::Level;

/// Destination for human-readable progress messages.
pub trait LogSink: Send + Sync {
    fn record(&self, level: Level, message: &str);
}

/// Default sink: forwards to `tracing`, tagged with the account name.
#[derive(Debug, Clone)]
pub struct TracingSink {
    account: String,
}

impl TracingSink {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }
}

impl LogSink for TracingSink {
    fn record(&self, level: Level, message: &str) {
        let account = self.account.as_str();
        match level {
            Level::ERROR => tracing::error!(account, "{message}"),
            Level::WARN => tracing::warn!(account, "{message}"),
            Level::INFO => tracing::info!(account, "{message}"),
            Level::DEBUG => tracing::debug!(account, "{message}"),
            Level::TRACE => tracing::trace!(account, "{message}"),
        }
    }
}

/// Per-invocation wrapper around a sink that keeps the last message.
pub struct Narrator<'a> {
    sink: &'a dyn LogSink,
    last: Option<String>,
}

impl<'a> Narrator<'a> {
    pub fn new(sink: &'a dyn LogSink) -> Self {
        Self { sink, last: None }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.emit(Level::INFO, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.emit(Level::WARN, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.emit(Level::ERROR, message.into());
    }

    pub fn into_last(self) -> Option<String> {
        self.last
    }

    fn emit(&mut self, level: Level, message: String) {
        self.sink.record(level, &message);
        self.last = Some(message);
    }
}

/// Sink that keeps every message in memory; used by the component tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: parking_lot::Mutex<Vec<(Level, String)>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn count_at(&self, level: Level) -> usize {
        self.entries.lock().iter().filter(|(l, _)| *l == level).count()
    }
}

#[cfg(test)]
impl LogSink for RecordingSink {
    fn record(&self, level: Level, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrator_tracks_last_message() {
        let sink = RecordingSink::default();
        let mut n = Narrator::new(&sink);
        n.info("first");
        n.error("second");
        assert_eq!(sink.messages(), vec!["first", "second"]);
        assert_eq!(sink.count_at(Level::ERROR), 1);
        assert_eq!(n.into_last().as_deref(), Some("second"));
    }
}
