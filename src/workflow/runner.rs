// Multi-account runner - sequential accounts, isolated sessions, one summary

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

use super::coordinator::WorkflowCoordinator;
use super::driver::DriverFactory;
use super::report::{AccountResult, RunReport};
use super::types::{FinalStatus, WorkflowState};
use crate::accounts::UserCredentialSet;
use crate::notify::{notify_best_effort, NotificationSink};
use crate::shutdown::ShutdownSignal;
use crate::telemetry::{create_account_span, generate_correlation_id};

const NO_ACCOUNTS_MESSAGE: &str =
    "ℹ️ *No accounts configured*\n\nNo valid accounts were found for ASBA automation.";

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Pause between consecutive accounts
    pub account_pause: Duration,
    /// Notification destination, e.g. a Telegram chat id
    pub destination: String,
    pub portal_host: String,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            account_pause: Duration::from_secs(3),
            destination: String::new(),
            portal_host: "meroshare.cdsc.com.np".to_string(),
        }
    }
}

pub struct MultiAccountRunner {
    coordinator: WorkflowCoordinator,
    drivers: Arc<dyn DriverFactory>,
    sink: Arc<dyn NotificationSink>,
    options: RunnerOptions,
    shutdown: ShutdownSignal,
}

impl MultiAccountRunner {
    pub fn new(
        coordinator: WorkflowCoordinator,
        drivers: Arc<dyn DriverFactory>,
        sink: Arc<dyn NotificationSink>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            coordinator,
            drivers,
            sink,
            options,
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn coordinator(&self) -> &WorkflowCoordinator {
        &self.coordinator
    }

    /// Process every account in order and send one consolidated notification.
    ///
    /// Never fails: per-account problems end up in the report, and a failed
    /// notification is only logged. Use [`RunReport::run_error`] for the
    /// run-level verdict.
    pub async fn run(&self, accounts: &[UserCredentialSet]) -> RunReport {
        let category = self.coordinator.options().filter.category.clone();
        let portal_host = self.options.portal_host.clone();

        if accounts.is_empty() {
            warn!("No valid accounts configured, nothing to process");
            notify_best_effort(self.sink.as_ref(), &self.options.destination, NO_ACCOUNTS_MESSAGE).await;
            return RunReport::new(Vec::new(), category, portal_host);
        }

        info!(count = accounts.len(), "Processing accounts");
        let metrics = self.coordinator.metrics();
        let mut results = Vec::with_capacity(accounts.len());

        for (index, account) in accounts.iter().enumerate() {
            if self.shutdown.is_triggered() {
                warn!(
                    remaining = accounts.len() - index,
                    "Run interrupted, skipping remaining accounts"
                );
                for skipped in &accounts[index..] {
                    metrics.record_account(FinalStatus::Unknown);
                    results.push(AccountResult::new(
                        skipped.label.clone(),
                        FinalStatus::Unknown,
                        Some("run interrupted".to_string()),
                    ));
                }
                break;
            }

            info!(
                account = %account.label,
                position = index + 1,
                total = accounts.len(),
                "Processing account"
            );
            let correlation_id = generate_correlation_id();
            let state = self
                .run_account(account)
                .instrument(create_account_span(&account.label, &correlation_id))
                .await;

            metrics.record_account(state.status());
            results.push(AccountResult::from(&state));

            let has_next = index + 1 < accounts.len();
            if has_next && !self.options.account_pause.is_zero() {
                debug!(
                    pause_ms = self.options.account_pause.as_millis() as u64,
                    "Waiting before next account"
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.options.account_pause) => {}
                    _ = self.shutdown.wait() => {}
                }
            }
        }

        for result in &results {
            info!(
                account = %result.account,
                status = %result.status,
                reason = result.reason.as_deref().unwrap_or(""),
                "Account summary"
            );
        }

        let report = RunReport::new(results, category, portal_host);
        let delivered = notify_best_effort(self.sink.as_ref(), &self.options.destination, &report.render()).await;
        if !delivered {
            warn!("Consolidated notification was not delivered");
        }
        metrics.log_stats();
        report
    }

    /// One account in its own session; the session is always closed
    async fn run_account(&self, account: &UserCredentialSet) -> WorkflowState {
        let driver = match self.drivers.open(account).await {
            Ok(driver) => driver,
            Err(e) => {
                error!(account = %account.label, error = %e, "Could not open a session");
                let mut state = WorkflowState::new(account.label.clone());
                state.conclude(
                    FinalStatus::Failed,
                    Some(format!("Could not open a browser session: {}", e)),
                );
                return state;
            }
        };

        let state = self.coordinator.run(driver.as_ref(), account).await;
        driver.close().await;
        state
    }
}
