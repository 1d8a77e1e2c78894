// Workflow data types - stages, outcomes and per-account state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed, ordered steps of one account's run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Login,
    NavigateToListing,
    DetectOpportunity,
    VerifyEligibility,
    SubmitApplication,
    ConfirmOutcome,
    Notify,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Login,
        Stage::NavigateToListing,
        Stage::DetectOpportunity,
        Stage::VerifyEligibility,
        Stage::SubmitApplication,
        Stage::ConfirmOutcome,
        Stage::Notify,
    ];

    /// The stage that follows on success; `None` after Notify
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Login => Some(Stage::NavigateToListing),
            Stage::NavigateToListing => Some(Stage::DetectOpportunity),
            Stage::DetectOpportunity => Some(Stage::VerifyEligibility),
            Stage::VerifyEligibility => Some(Stage::SubmitApplication),
            Stage::SubmitApplication => Some(Stage::ConfirmOutcome),
            Stage::ConfirmOutcome => Some(Stage::Notify),
            Stage::Notify => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Login => "login",
            Stage::NavigateToListing => "navigate_to_listing",
            Stage::DetectOpportunity => "detect_opportunity",
            Stage::VerifyEligibility => "verify_eligibility",
            Stage::SubmitApplication => "submit_application",
            Stage::ConfirmOutcome => "confirm_outcome",
            Stage::Notify => "notify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalStatus {
    NoOpportunity,
    AlreadyActioned,
    Success,
    Failed,
    NeedsReview,
    /// Outcome could not be confirmed; never treated as success
    Unknown,
}

impl FinalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FinalStatus::NoOpportunity => "no_opportunity",
            FinalStatus::AlreadyActioned => "already_actioned",
            FinalStatus::Success => "success",
            FinalStatus::Failed => "failed",
            FinalStatus::NeedsReview => "needs_review",
            FinalStatus::Unknown => "unknown",
        }
    }

    /// Statuses an operator should look at on the portal
    pub fn needs_attention(self) -> bool {
        matches!(
            self,
            FinalStatus::Failed | FinalStatus::NeedsReview | FinalStatus::Unknown
        )
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the listing said about an open issue
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OpportunityDetails {
    pub company: String,
    pub share_group: Option<String>,
    pub share_value_per_unit: Option<f64>,
    pub min_unit: Option<u64>,
}

impl OpportunityDetails {
    pub fn new(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            ..Default::default()
        }
    }
}

/// Which listing entries count as an opportunity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityFilter {
    /// Share type shown in the listing row, matched case-insensitively
    pub category: String,
}

impl Default for OpportunityFilter {
    fn default() -> Self {
        Self {
            category: "Ordinary Shares".to_string(),
        }
    }
}

impl OpportunityFilter {
    pub fn matches(&self, text: &str) -> bool {
        text.to_lowercase().contains(&self.category.to_lowercase())
    }
}

/// Result of DetectOpportunity; the last two variants are terminal but not failures
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Found(OpportunityDetails),
    NotFound { reason: String },
    AlreadyActioned(Option<OpportunityDetails>),
}

/// Attribute values read from the opened opportunity
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EligibilityFacts {
    pub share_value_per_unit: Option<f64>,
    pub min_unit: Option<u64>,
}

/// What the portal showed after submitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Succeeded { message: Option<String> },
    Rejected { message: String },
    /// Neither a success nor an error indicator was visible
    Indeterminate { detail: String },
}

/// Audit entry for one stage execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: String,
    pub attempts: u32,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// One account's progress through the stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub account: String,
    pub current_stage: Stage,
    pub opportunity: Option<OpportunityDetails>,
    pub final_status: Option<FinalStatus>,
    pub failure_reason: Option<String>,
    pub history: Vec<StageRecord>,
}

impl WorkflowState {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            current_stage: Stage::Login,
            opportunity: None,
            final_status: None,
            failure_reason: None,
            history: Vec::new(),
        }
    }

    /// Final status, falling back to Unknown for a run that never concluded
    pub fn status(&self) -> FinalStatus {
        self.final_status.unwrap_or(FinalStatus::Unknown)
    }

    pub fn is_finished(&self) -> bool {
        self.final_status.is_some()
    }

    pub(crate) fn record(&mut self, stage: Stage, outcome: impl Into<String>, attempts: u32, duration_ms: u64) {
        self.history.push(StageRecord {
            stage,
            outcome: outcome.into(),
            attempts,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn conclude(&mut self, status: FinalStatus, reason: Option<String>) {
        self.final_status = Some(status);
        self.failure_reason = reason;
    }

    /// Stages that actually ran, in order
    pub fn visited_stages(&self) -> Vec<Stage> {
        self.history.iter().map(|r| r.stage).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_ends_at_notify() {
        let mut stage = Stage::Login;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            visited.push(next);
            stage = next;
        }
        assert_eq!(visited, Stage::ALL.to_vec());
    }

    #[test]
    fn test_filter_matches_case_insensitively() {
        let filter = OpportunityFilter::default();
        assert!(filter.matches("ORDINARY SHARES"));
        assert!(!filter.matches("Debentures"));
    }

    #[test]
    fn test_unfinished_state_reports_unknown() {
        let state = WorkflowState::new("User 1");
        assert!(!state.is_finished());
        assert_eq!(state.status(), FinalStatus::Unknown);
    }
}
