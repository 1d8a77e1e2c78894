// Workflow coordinator - drives one account through the stage sequence
//
// Each stage call goes through the retry executor with its own policy.
// Stage errors never escape: they are classified here and turned into the
// account's final status.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::driver::StageDriver;
use super::eligibility::EligibilityCriteria;
use super::errors::StageError;
use super::types::{
    Confirmation, Detection, EligibilityFacts, FinalStatus, OpportunityFilter, Stage,
    WorkflowState,
};
use crate::accounts::UserCredentialSet;
use crate::observability::{OperationTimer, WorkflowMetrics};
use crate::retry::{RetryError, RetryExecutor, RetryObserver, RetryPolicy};

/// Retry policy per stage
#[derive(Debug, Clone, PartialEq)]
pub struct StagePolicies {
    pub login: RetryPolicy,
    pub listing: RetryPolicy,
    pub detection: RetryPolicy,
    pub eligibility: RetryPolicy,
    pub submission: RetryPolicy,
    pub confirmation: RetryPolicy,
}

impl Default for StagePolicies {
    fn default() -> Self {
        let secs = Duration::from_secs;
        Self {
            login: RetryPolicy::new(3, secs(3)),
            listing: RetryPolicy::new(3, secs(2)),
            detection: RetryPolicy::new(3, secs(3)),
            eligibility: RetryPolicy::new(2, secs(2)),
            submission: RetryPolicy::new(2, secs(3)),
            confirmation: RetryPolicy::new(1, secs(2)),
        }
    }
}

impl StagePolicies {
    /// Same policy for every stage, handy in tests
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            login: policy.clone(),
            listing: policy.clone(),
            detection: policy.clone(),
            eligibility: policy.clone(),
            submission: policy.clone(),
            confirmation: policy,
        }
    }

    pub fn for_stage(&self, stage: Stage) -> &RetryPolicy {
        match stage {
            Stage::Login => &self.login,
            Stage::NavigateToListing => &self.listing,
            Stage::DetectOpportunity => &self.detection,
            Stage::VerifyEligibility => &self.eligibility,
            Stage::SubmitApplication => &self.submission,
            Stage::ConfirmOutcome | Stage::Notify => &self.confirmation,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoordinatorOptions {
    pub criteria: EligibilityCriteria,
    pub filter: OpportunityFilter,
    /// Stop before submitting and report the account for review
    pub dry_run: bool,
}

/// Asks the driver to reset its session between attempts of a stage
struct StageRecovery<'a> {
    driver: &'a dyn StageDriver,
    stage: Stage,
}

#[async_trait]
impl RetryObserver<StageError> for StageRecovery<'_> {
    async fn on_retry(&self, error: &StageError, attempt: u32) {
        if let Err(e) = self.driver.recover(self.stage).await {
            warn!(
                stage = %self.stage,
                attempt,
                error = %error,
                recovery_error = %e,
                "Stage recovery failed, retrying anyway"
            );
        }
    }
}

pub struct WorkflowCoordinator {
    policies: StagePolicies,
    options: CoordinatorOptions,
    metrics: Arc<WorkflowMetrics>,
}

impl WorkflowCoordinator {
    pub fn new(policies: StagePolicies, options: CoordinatorOptions) -> Self {
        Self {
            policies,
            options,
            metrics: Arc::new(WorkflowMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<WorkflowMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<WorkflowMetrics> {
        self.metrics.clone()
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Run every stage up to Notify for one account.
    ///
    /// The returned state always carries a final status and stops at
    /// `Stage::Notify`; delivering the notification is the caller's job.
    pub async fn run(&self, driver: &dyn StageDriver, account: &UserCredentialSet) -> WorkflowState {
        let mut state = WorkflowState::new(account.label.clone());
        info!(account = %account.label, "Starting workflow");

        self.drive(&mut state, driver, account).await;

        state.current_stage = Stage::Notify;
        let status = state.status();
        match status {
            FinalStatus::Failed => error!(
                account = %state.account,
                reason = state.failure_reason.as_deref().unwrap_or(""),
                "Workflow failed"
            ),
            FinalStatus::Unknown | FinalStatus::NeedsReview => warn!(
                account = %state.account,
                status = %status,
                reason = state.failure_reason.as_deref().unwrap_or(""),
                "Workflow needs manual verification"
            ),
            _ => info!(account = %state.account, status = %status, "Workflow finished"),
        }
        state
    }

    async fn drive(&self, state: &mut WorkflowState, driver: &dyn StageDriver, account: &UserCredentialSet) {
        // Login
        if let Err(e) = self
            .run_stage(state, driver, Stage::Login, |_| async move {
                driver.login(account).await
            })
            .await
        {
            return state.conclude(FinalStatus::Failed, Some(format!("Login failed: {}", e.last_error())));
        }

        // NavigateToListing
        self.advance(state, Stage::NavigateToListing);
        if let Err(e) = self
            .run_stage(state, driver, Stage::NavigateToListing, |_| async move {
                driver.open_listing().await
            })
            .await
        {
            return state.conclude(
                FinalStatus::Failed,
                Some(format!("Could not open the application listing: {}", e.last_error())),
            );
        }

        // DetectOpportunity
        self.advance(state, Stage::DetectOpportunity);
        let filter = &self.options.filter;
        let detection = self
            .run_stage(state, driver, Stage::DetectOpportunity, |_| async move {
                driver.detect_opportunity(filter).await
            })
            .await;
        let mut opportunity = match detection {
            Ok(Detection::Found(details)) => {
                info!(account = %state.account, company = %details.company, "Opportunity found");
                details
            }
            Ok(Detection::NotFound { reason }) => {
                info!(account = %state.account, reason = %reason, "No opportunity available");
                return state.conclude(FinalStatus::NoOpportunity, None);
            }
            Ok(Detection::AlreadyActioned(details)) => {
                info!(account = %state.account, "Opportunity already applied for");
                state.opportunity = details;
                return state.conclude(FinalStatus::AlreadyActioned, None);
            }
            Err(e) => {
                return state.conclude(
                    FinalStatus::Failed,
                    Some(format!("Opportunity detection failed: {}", e.last_error())),
                );
            }
        };
        state.opportunity = Some(opportunity.clone());

        // VerifyEligibility
        self.advance(state, Stage::VerifyEligibility);
        let facts = match (opportunity.share_value_per_unit, opportunity.min_unit) {
            (Some(value), Some(unit)) => EligibilityFacts {
                share_value_per_unit: Some(value),
                min_unit: Some(unit),
            },
            _ => {
                let details = &opportunity;
                match self
                    .run_stage(state, driver, Stage::VerifyEligibility, |_| async move {
                        driver.read_eligibility(details).await
                    })
                    .await
                {
                    Ok(facts) => facts,
                    Err(e) => {
                        let status = match e.last_error() {
                            StageError::SessionClosed(_) => FinalStatus::Failed,
                            _ => FinalStatus::NeedsReview,
                        };
                        return state.conclude(
                            status,
                            Some(format!("Could not read share details: {}", e.last_error())),
                        );
                    }
                }
            }
        };
        opportunity.share_value_per_unit = facts.share_value_per_unit;
        opportunity.min_unit = facts.min_unit;
        state.opportunity = Some(opportunity);

        let verdict = self.options.criteria.verify(&facts);
        if !verdict.valid {
            let reason = verdict.reason().unwrap_or_default();
            warn!(account = %state.account, reason = %reason, "Eligibility criteria not met");
            state.record(Stage::VerifyEligibility, "criteria_mismatch", 0, 0);
            return state.conclude(FinalStatus::NeedsReview, Some(reason));
        }

        let missing = account.missing_application_fields();
        if !missing.is_empty() {
            let reason = format!("Missing application details: {}", missing.join(", "));
            warn!(account = %state.account, reason = %reason, "Cannot submit automatically");
            state.record(Stage::VerifyEligibility, "missing_parameters", 0, 0);
            return state.conclude(FinalStatus::NeedsReview, Some(reason));
        }

        if self.options.dry_run {
            info!(account = %state.account, "Dry run, skipping submission");
            state.record(Stage::VerifyEligibility, "dry_run", 0, 0);
            return state.conclude(
                FinalStatus::NeedsReview,
                Some("dry run, application not submitted".to_string()),
            );
        }

        // SubmitApplication
        self.advance(state, Stage::SubmitApplication);
        if let Err(e) = self
            .run_stage(state, driver, Stage::SubmitApplication, |_| async move {
                driver.submit_application(account).await
            })
            .await
        {
            return match e.last_error() {
                // The form may or may not have gone through
                StageError::SessionClosed(_) => state.conclude(
                    FinalStatus::Unknown,
                    Some("Session closed during submission - please verify manually".to_string()),
                ),
                other => state.conclude(FinalStatus::Failed, Some(format!("Submission failed: {}", other))),
            };
        }

        // ConfirmOutcome
        self.advance(state, Stage::ConfirmOutcome);
        if !driver.is_session_active().await {
            state.record(Stage::ConfirmOutcome, "session_closed", 0, 0);
            return state.conclude(
                FinalStatus::Unknown,
                Some("Session closed before the outcome could be confirmed".to_string()),
            );
        }

        match self
            .run_stage(state, driver, Stage::ConfirmOutcome, |_| async move {
                driver.confirm_outcome().await
            })
            .await
        {
            Ok(Confirmation::Succeeded { message }) => {
                if let Some(message) = message {
                    info!(account = %state.account, message = %message, "Application confirmed");
                }
                state.conclude(FinalStatus::Success, None)
            }
            Ok(Confirmation::Rejected { message }) => state.conclude(FinalStatus::Failed, Some(message)),
            Ok(Confirmation::Indeterminate { detail }) => state.conclude(FinalStatus::Unknown, Some(detail)),
            Err(e) => state.conclude(
                FinalStatus::Unknown,
                Some(format!("Could not verify application status: {}", e.last_error())),
            ),
        }
    }

    fn advance(&self, state: &mut WorkflowState, to: Stage) {
        info!(
            account = %state.account,
            from = %state.current_stage,
            to = %to,
            "Stage transition"
        );
        state.current_stage = to;
    }

    /// Execute one stage through the retry executor and append it to the history
    async fn run_stage<T, F, Fut>(
        &self,
        state: &mut WorkflowState,
        driver: &dyn StageDriver,
        stage: Stage,
        mut operation: F,
    ) -> Result<T, RetryError<StageError>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let executor = RetryExecutor::new(stage.as_str()).with_metrics(self.metrics.clone());
        let recovery = StageRecovery { driver, stage };
        let last_attempt = AtomicU32::new(0);
        let timer = OperationTimer::new(stage.as_str());

        let result = executor
            .execute_with(
                self.policies.for_stage(stage),
                |attempt| {
                    last_attempt.store(attempt, Ordering::Relaxed);
                    operation(attempt)
                },
                &recovery,
                StageError::is_transient,
            )
            .await;

        let duration_ms = timer.finish();
        let attempts = last_attempt.load(Ordering::Relaxed);
        let outcome = match &result {
            Ok(_) => "ok".to_string(),
            Err(RetryError::Exhausted { .. }) => "exhausted".to_string(),
            Err(RetryError::Aborted { error, .. }) => format!("aborted: {}", error),
        };
        state.record(stage, outcome, attempts, duration_ms);
        result
    }
}
