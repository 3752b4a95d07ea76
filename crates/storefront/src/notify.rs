//! User-facing notifications.
//!
//! The only error surface the stores expose to the user is the
//! warning-level "quantity unavailable" toast; everything else degrades
//! silently. The embedding UI supplies a `Notifier` implementation that
//! renders the toast; the default implementation just logs.

use std::sync::Mutex;

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync {
    /// Surface a message to the user. Must not block.
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Default notifier that forwards notices to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => tracing::info!(notice = message, "user notice"),
            NoticeLevel::Warning => tracing::warn!(notice = message, "user notice"),
        }
    }
}

/// Notifier that records notices in memory. Intended for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(NoticeLevel, String)>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All notices recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the interior mutex is poisoned.
    #[must_use]
    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.notices.lock().expect("notifier mutex poisoned").clone()
    }

    /// Warning-level messages recorded so far.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter(|(level, _)| *level == NoticeLevel::Warning)
            .map(|(_, message)| message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices
            .lock()
            .expect("notifier mutex poisoned")
            .push((level, message.to_string()));
    }
}
