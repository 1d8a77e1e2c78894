// Accounts - per-user credential sets and where they come from
//
// Every account that reaches the workflow has a non-empty username,
// password and depository participant. Incomplete entries are dropped
// (with a warning) before a run starts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// Highest `USER{n}_*` index scanned in the environment
pub const MAX_ENV_ACCOUNTS: usize = 10;

/// Login identity plus the parameters needed to submit an application
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentialSet {
    pub label: String,
    pub username: String,
    pub password: String,
    /// Depository participant selected on the login form
    pub dp: String,
    #[serde(default)]
    pub bank: String,
    #[serde(default)]
    pub account_number: String,
    /// Number of units ("kitta") to apply for
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub crn: String,
    #[serde(default)]
    pub txn_pin: String,
}

impl std::fmt::Debug for UserCredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentialSet")
            .field("label", &self.label)
            .field("username", &self.username)
            .field("password", &"***")
            .field("dp", &self.dp)
            .field("bank", &self.bank)
            .field("account_number", &mask(&self.account_number))
            .field("units", &self.units)
            .field("crn", &mask(&self.crn))
            .field("txn_pin", &"***")
            .finish()
    }
}

impl UserCredentialSet {
    /// Login fields that are empty; any entry here disqualifies the account
    pub fn missing_login_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.username) {
            missing.push("username");
        }
        if is_blank(&self.password) {
            missing.push("password");
        }
        if is_blank(&self.dp) {
            missing.push("dp");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_login_fields().is_empty()
    }

    /// Application fields that are empty. Accounts missing these can still
    /// log in and check for opportunities but are never auto-submitted.
    pub fn missing_application_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.bank) {
            missing.push("bank");
        }
        if is_blank(&self.account_number) {
            missing.push("account");
        }
        if is_blank(&self.units) {
            missing.push("kitta");
        }
        if is_blank(&self.crn) {
            missing.push("crn");
        }
        if is_blank(&self.txn_pin) {
            missing.push("txnPin");
        }
        missing
    }

    /// Short form for listings, e.g. `User 1 (u***1, DP 13700)`
    pub fn summary(&self) -> String {
        format!("{} ({}, DP {})", self.label, mask(&self.username), self.dp)
    }
}

/// Anything that can produce account records
pub trait CredentialSource {
    /// Raw records, possibly incomplete
    fn load(&self) -> Vec<UserCredentialSet>;

    /// Records that passed validation; empty means nothing to process
    fn validated(&self) -> Vec<UserCredentialSet> {
        validate_accounts(self.load())
    }
}

/// Drop incomplete sets and duplicate labels, keeping the first occurrence
pub fn validate_accounts(raw: Vec<UserCredentialSet>) -> Vec<UserCredentialSet> {
    let mut seen = HashSet::new();
    let mut valid = Vec::with_capacity(raw.len());

    for account in raw {
        let missing = account.missing_login_fields();
        if !missing.is_empty() {
            warn!(
                account = %account.label,
                missing = %missing.join(", "),
                "Skipping account with incomplete credentials"
            );
            continue;
        }
        if !seen.insert(account.label.clone()) {
            warn!(account = %account.label, "Skipping duplicate account label");
            continue;
        }
        valid.push(account);
    }

    info!(count = valid.len(), "Validated accounts");
    valid
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no configured account matches: {}", .0.join(", "))]
    UnknownAccounts(Vec<String>),
}

/// Keep only the accounts whose label matches one of `labels`
/// (case-insensitive). An empty filter keeps everything; a label that
/// matches nothing is an error rather than a silently shorter run.
pub fn filter_by_labels(
    accounts: Vec<UserCredentialSet>,
    labels: &[String],
) -> Result<Vec<UserCredentialSet>, CredentialError> {
    if labels.is_empty() {
        return Ok(accounts);
    }

    let unknown: Vec<String> = labels
        .iter()
        .filter(|l| !accounts.iter().any(|a| l.eq_ignore_ascii_case(&a.label)))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(CredentialError::UnknownAccounts(unknown));
    }

    Ok(accounts
        .into_iter()
        .filter(|account| labels.iter().any(|l| l.eq_ignore_ascii_case(&account.label)))
        .collect())
}

/// Reads `USER{n}_*` variables for n in 1..=MAX_ENV_ACCOUNTS.
///
/// Account 1 also accepts the single-user `MEROSHARE_*` names, which take
/// precedence. Extra accounts from the configuration file are appended.
pub struct EnvCredentialSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    lookup: F,
    extra: Vec<UserCredentialSet>,
}

impl EnvCredentialSource<fn(&str) -> Option<String>> {
    pub fn from_process_env() -> Self {
        Self::with_lookup(process_env as fn(&str) -> Option<String>)
    }
}

impl<F> EnvCredentialSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn with_lookup(lookup: F) -> Self {
        Self {
            lookup,
            extra: Vec::new(),
        }
    }

    pub fn with_extra_accounts(mut self, extra: Vec<UserCredentialSet>) -> Self {
        self.extra = extra;
        self
    }

    fn var(&self, keys: &[&str]) -> String {
        keys.iter()
            .filter_map(|key| (self.lookup)(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .unwrap_or_default()
    }

    fn account(&self, n: usize) -> UserCredentialSet {
        let key = |suffix: &str| format!("USER{n}_{suffix}");
        let pick = |legacy: &str, suffix: &str| {
            if n == 1 {
                self.var(&[legacy, &key(suffix)])
            } else {
                self.var(&[&key(suffix)])
            }
        };

        let label = self.var(&[&key("NAME")]);
        UserCredentialSet {
            label: if label.is_empty() { format!("User {n}") } else { label },
            username: pick("MEROSHARE_USERNAME", "USERNAME"),
            password: pick("MEROSHARE_PASSWORD", "PASSWORD"),
            dp: pick("MEROSHARE_DP_NP", "DP"),
            bank: pick("MEROSHARE_BANK", "BANK"),
            account_number: pick("MEROSHARE_P_ACCOUNT_NO", "ACCOUNT_NO"),
            units: pick("MEROSHARE_KITTA_N0", "KITTA"),
            crn: pick("MEROSHARE_CRN_NO", "CRN"),
            txn_pin: pick("MEROSHARE_TXN_PIN", "TXN_PIN"),
        }
    }
}

impl<F> CredentialSource for EnvCredentialSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn load(&self) -> Vec<UserCredentialSet> {
        let mut accounts: Vec<UserCredentialSet> = (1..=MAX_ENV_ACCOUNTS)
            .map(|n| self.account(n))
            .filter(|account| {
                // Slots with nothing set at all are simply unused
                !(is_blank(&account.username) && is_blank(&account.password))
            })
            .collect();
        accounts.extend(self.extra.iter().cloned());
        accounts
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Keep the first and last character, e.g. `12345` -> `1***5`
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        0 => String::new(),
        1 | 2 => "*".repeat(chars.len()),
        n => format!("{}***{}", chars[0], chars[n - 1]),
    }
}
