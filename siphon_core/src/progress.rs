use std::sync::Mutex;
use tracing::info;

/// Receives the best-known prefix after every character the extractor finds.
///
/// Purely observational: the extractor does not wait on, or care about, what
/// a sink does with the value.
pub trait ProgressSink: Send + Sync {
    fn on_prefix(&self, prefix: &str);
}

/// A `ProgressSink` that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    fn on_prefix(&self, _prefix: &str) {}
}

/// Emits each prefix as an `info` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_prefix(&self, prefix: &str) {
        info!(prefix, len = prefix.chars().count(), "prefix extended");
    }
}

/// Keeps every reported prefix in order. Mostly useful in tests and for
/// post-mortem output after a failed run.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    seen: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefixes(&self) -> Vec<String> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last(&self) -> Option<String> {
        self.prefixes().pop()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_prefix(&self, prefix: &str) {
        match self.seen.lock() {
            Ok(mut seen) => seen.push(prefix.to_string()),
            Err(poisoned) => poisoned.into_inner().push(prefix.to_string()),
        }
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &S {
    fn on_prefix(&self, prefix: &str) {
        (**self).on_prefix(prefix);
    }
}
