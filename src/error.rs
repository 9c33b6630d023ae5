//! Central error reporting
//!
//! Screen managers never propagate failures across manager boundaries. Anything
//! unexpected is handed to an [`ErrorReporter`] and execution continues.

use std::sync::{Arc, Mutex};
use tracing::error;

/// Sink for non-fatal errors (user-visible reporting lives behind this)
pub trait ErrorReporter: Send + Sync {
    fn report(&self, err: &anyhow::Error);
}

pub type SharedErrorReporter = Arc<dyn ErrorReporter>;

/// Default reporter: log and move on
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn report(&self, err: &anyhow::Error) {
        error!(error = ?err, "Recovered from error");
    }
}

/// Keeps every reported error message; used by tests
#[derive(Debug, Default)]
pub struct CollectingErrorReporter {
    messages: Mutex<Vec<String>>,
}

impl CollectingErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl ErrorReporter for CollectingErrorReporter {
    fn report(&self, err: &anyhow::Error) {
        error!(error = ?err, "Recovered from error");
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(format!("{err:#}"));
        }
    }
}
