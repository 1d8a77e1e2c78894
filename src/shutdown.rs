use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Exit status for a forced stop, as a shell reports SIGINT
pub const FORCE_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    Graceful,
    ForceExit,
}

/// Cooperative stop flag checked between accounts.
///
/// A run in progress is never cut off mid-stage; the runner finishes the
/// current account and reports the rest as interrupted.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.on_interrupt();
    }

    /// Record an interrupt. The first one asks for a graceful stop; any
    /// later one means the operator wants out now.
    pub fn on_interrupt(&self) -> InterruptAction {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            return InterruptAction::ForceExit;
        }
        info!("Shutdown requested, finishing current account");
        self.inner.notify.notify_waiters();
        InterruptAction::Graceful
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Resolves once `trigger` has been called
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Install a Ctrl-C handler: the first press stops after the current
    /// account, a second one exits immediately
    pub fn install_ctrl_c_handler(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                match signal.on_interrupt() {
                    InterruptAction::Graceful => {
                        warn!("Press Ctrl-C again to exit immediately");
                    }
                    InterruptAction::ForceExit => {
                        warn!("Second interrupt received, exiting without cleanup");
                        std::process::exit(FORCE_EXIT_CODE);
                    }
                }
            }
        });
    }
}
