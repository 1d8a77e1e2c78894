// Run report - per-account results reduced into one consolidated message

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use thiserror::Error;

use super::types::{FinalStatus, OpportunityDetails, WorkflowState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountResult {
    pub account: String,
    pub status: FinalStatus,
    pub reason: Option<String>,
    pub opportunity: Option<OpportunityDetails>,
}

impl AccountResult {
    pub fn new(account: impl Into<String>, status: FinalStatus, reason: Option<String>) -> Self {
        Self {
            account: account.into(),
            status,
            reason,
            opportunity: None,
        }
    }
}

impl From<&WorkflowState> for AccountResult {
    fn from(state: &WorkflowState) -> Self {
        Self {
            account: state.account.clone(),
            status: state.status(),
            reason: state.failure_reason.clone(),
            opportunity: state.opportunity.clone(),
        }
    }
}

/// Run-level failure signal: at least one account ended in Failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} account(s) failed: {}", .accounts.len(), .accounts.join(", "))]
pub struct RunFailure {
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub results: Vec<AccountResult>,
    /// Opportunity category that was searched for
    pub category: String,
    /// Where an operator should double-check doubtful outcomes
    pub portal_host: String,
    pub finished_at: DateTime<Local>,
}

impl RunReport {
    pub fn new(results: Vec<AccountResult>, category: impl Into<String>, portal_host: impl Into<String>) -> Self {
        Self {
            results,
            category: category.into(),
            portal_host: portal_host.into(),
            finished_at: Local::now(),
        }
    }

    pub fn with_status(&self, status: FinalStatus) -> impl Iterator<Item = &AccountResult> {
        self.results.iter().filter(move |r| r.status == status)
    }

    pub fn count(&self, status: FinalStatus) -> usize {
        self.with_status(status).count()
    }

    pub fn failed_accounts(&self) -> Vec<String> {
        self.with_status(FinalStatus::Failed)
            .map(|r| r.account.clone())
            .collect()
    }

    /// `Err` when any account failed; other statuses never fail the run
    pub fn run_error(&self) -> Result<(), RunFailure> {
        let accounts = self.failed_accounts();
        if accounts.is_empty() {
            Ok(())
        } else {
            Err(RunFailure { accounts })
        }
    }

    /// First opportunity any account saw, used for the message header
    pub fn opportunity(&self) -> Option<&OpportunityDetails> {
        self.results.iter().find_map(|r| r.opportunity.as_ref())
    }

    /// Markdown message grouping accounts by final status
    pub fn render(&self) -> String {
        if self
            .results
            .iter()
            .all(|r| r.status == FinalStatus::NoOpportunity)
        {
            return format!(
                "ℹ️ *No IPO Today* 🤦‍♀️\n\nChecked for {} user(s) - No {} IPO available.",
                self.results.len(),
                escape_markdown(&self.category)
            );
        }

        let mut message = String::new();
        if let Some(opportunity) = self.opportunity().filter(|o| !o.company.is_empty()) {
            let _ = writeln!(message, "🏢 *{}*", escape_markdown(&opportunity.company));
            if let Some(group) = &opportunity.share_group {
                let _ = writeln!(message, "Share Group: {}", escape_markdown(group));
            }
            message.push('\n');
        }

        let sections = [
            (FinalStatus::Success, "✅ *Applied Successfully", false),
            (FinalStatus::AlreadyActioned, "✅ *Already Applied", false),
            (FinalStatus::Failed, "❌ *Failed", true),
            (FinalStatus::NeedsReview, "⚠️ *Needs Manual Review", true),
            (FinalStatus::Unknown, "❓ *Status Unknown", false),
        ];
        for (status, title, with_reason) in sections {
            let entries: Vec<&AccountResult> = self.with_status(status).collect();
            if entries.is_empty() {
                continue;
            }
            let _ = writeln!(message, "{} ({})*", title, entries.len());
            for entry in entries {
                match (&entry.reason, with_reason) {
                    (Some(reason), true) => {
                        let _ = writeln!(
                            message,
                            "  • {}: {}",
                            escape_markdown(&entry.account),
                            escape_markdown(reason)
                        );
                    }
                    _ => {
                        let _ = writeln!(message, "  • {}", escape_markdown(&entry.account));
                    }
                }
            }
            message.push('\n');
        }

        if self.results.iter().any(|r| r.status.needs_attention()) {
            let _ = write!(message, "\n⚠️ Please verify at {}", escape_markdown(&self.portal_host));
        }
        let _ = write!(
            message,
            "\n\n_Time: {}_",
            self.finished_at.format("%Y-%m-%d %H:%M:%S")
        );
        message
    }
}

/// Backslash the characters legacy Telegram Markdown treats as markup
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '[' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
