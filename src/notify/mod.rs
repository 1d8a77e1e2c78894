// Notification sinks - where the consolidated run summary goes
//
// Delivery is best effort: a failed send is logged and never changes the
// outcome of a run.

pub mod telegram;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

pub use telegram::TelegramSink;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel is not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("channel rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver `message` (Markdown) to `destination`, e.g. a chat id
    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError>;
}

/// Send and swallow the error; returns whether delivery succeeded
pub async fn notify_best_effort(sink: &dyn NotificationSink, destination: &str, message: &str) -> bool {
    match sink.send(destination, message).await {
        Ok(()) => {
            info!(destination, "Notification sent");
            true
        }
        Err(e) => {
            warn!(destination, error = %e, "Failed to send notification");
            false
        }
    }
}

/// Writes messages to the log; used when no messaging channel is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError> {
        info!(destination, "Notification:\n{}", message);
        Ok(())
    }
}
