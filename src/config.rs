use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::accounts::UserCredentialSet;
use crate::portal::{DriverPolicies, PortalProfile};
use crate::retry::RetryPolicy;
use crate::workflow::{
    CoordinatorOptions, EligibilityCriteria, OpportunityFilter, RunnerOptions, StagePolicies,
};

/// Main configuration structure for ASBA autopilot
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AsbaConfig {
    /// Portal URLs, element specs and text patterns
    pub portal: PortalProfile,
    pub eligibility: EligibilityConfig,
    /// Retry policy per call site
    pub retry: RetryConfig,
    pub run: RunConfig,
    pub browser: BrowserSettings,
    pub notification: NotificationConfig,
    pub observability: ObservabilityConfig,
    /// Accounts declared in the config file, appended to the environment ones
    pub accounts: Vec<UserCredentialSet>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EligibilityConfig {
    pub share_value_per_unit: f64,
    pub min_unit: u64,
    /// Share category an opportunity must belong to
    pub category: String,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            share_value_per_unit: 100.0,
            min_unit: 10,
            category: "Ordinary Shares".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub attempt_timeout_ms: Option<u64>,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::new(5, 2000)
    }
}

impl RetrySettings {
    fn new(max_attempts: u32, initial_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            attempt_timeout_ms: None,
            jitter: false,
        }
    }

    pub fn to_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.max_attempts, Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_factor(self.backoff_factor)
            .with_jitter(self.jitter);
        match self.attempt_timeout_ms {
            Some(ms) => policy.with_attempt_timeout(Duration::from_millis(ms)),
            None => policy,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub navigation: RetrySettings,
    pub element_wait: RetrySettings,
    pub login: RetrySettings,
    pub listing: RetrySettings,
    pub detection: RetrySettings,
    pub eligibility: RetrySettings,
    pub submission: RetrySettings,
    pub confirmation: RetrySettings,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            navigation: RetrySettings {
                attempt_timeout_ms: Some(120_000),
                ..RetrySettings::new(5, 3000)
            },
            element_wait: RetrySettings::new(3, 2000),
            login: RetrySettings::new(3, 3000),
            listing: RetrySettings::new(3, 2000),
            detection: RetrySettings::new(3, 3000),
            eligibility: RetrySettings::new(2, 2000),
            submission: RetrySettings::new(2, 3000),
            confirmation: RetrySettings::new(1, 2000),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// Pause between consecutive accounts
    pub account_pause_ms: u64,
    /// Stop before submitting and report for review instead
    pub dry_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            account_pause_ms: 3000,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Chrome/Chromium binary; auto-detected when unset
    pub executable: Option<String>,
    pub request_timeout_secs: u64,
    /// Needed inside most containers
    pub no_sandbox: bool,
    /// Parent of the per-session profile directories; system temp dir when unset
    pub profile_root: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            request_timeout_secs: 120,
            no_sandbox: false,
            profile_root: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Telegram bot token (can be set via TELEGRAM_BOT_TOKEN)
    pub telegram_bot_token: Option<String>,
    /// Telegram chat id (can be set via TELEGRAM_CHAT_ID)
    pub telegram_chat_id: Option<String>,
}

impl NotificationConfig {
    /// Token and chat id, only when both are present
    pub fn telegram(&self) -> Option<(&str, &str)> {
        let token = self.telegram_bot_token.as_deref().filter(|t| !t.trim().is_empty())?;
        let chat = self.telegram_chat_id.as_deref().filter(|c| !c.trim().is_empty())?;
        Some((token, chat))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level, overridden by RUST_LOG
    pub log_level: String,
    /// JSON log lines instead of compact text
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: true,
        }
    }
}

impl AsbaConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (asba-autopilot.toml, .asba-autopilot-rc)
    /// 3. Environment variables (ASBA__SECTION__KEY)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`AsbaConfig::load`] with config files looked up in `dir`
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&AsbaConfig::default())?);

        let toml_path = dir.join("asba-autopilot.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path));
        }

        let rc_path = dir.join(".asba-autopilot-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("ASBA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut asba_config: AsbaConfig = builder.build()?.try_deserialize()?;

        // Telegram credentials also come from the conventional variable names
        if asba_config.notification.telegram_bot_token.is_none() {
            asba_config.notification.telegram_bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
        }
        if asba_config.notification.telegram_chat_id.is_none() {
            asba_config.notification.telegram_chat_id = std::env::var("TELEGRAM_CHAT_ID").ok();
        }

        Ok(asba_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    /// Copy with secrets blanked out, for printing
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.notification.telegram_bot_token.is_some() {
            copy.notification.telegram_bot_token = Some("***".to_string());
        }
        for account in &mut copy.accounts {
            account.password = "***".to_string();
            account.txn_pin = "***".to_string();
        }
        copy
    }

    pub fn stage_policies(&self) -> StagePolicies {
        StagePolicies {
            login: self.retry.login.to_policy(),
            listing: self.retry.listing.to_policy(),
            detection: self.retry.detection.to_policy(),
            eligibility: self.retry.eligibility.to_policy(),
            submission: self.retry.submission.to_policy(),
            confirmation: self.retry.confirmation.to_policy(),
        }
    }

    pub fn driver_policies(&self) -> DriverPolicies {
        DriverPolicies {
            navigation: self.retry.navigation.to_policy(),
            element_wait: self.retry.element_wait.to_policy(),
        }
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            criteria: EligibilityCriteria::new(
                self.eligibility.share_value_per_unit,
                self.eligibility.min_unit,
            ),
            filter: OpportunityFilter {
                category: self.eligibility.category.clone(),
            },
            dry_run: self.run.dry_run,
        }
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            account_pause: Duration::from_millis(self.run.account_pause_ms),
            destination: self
                .notification
                .telegram_chat_id
                .clone()
                .unwrap_or_else(|| "log".to_string()),
            portal_host: self.portal.portal_host.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_mirror_stage_budgets() {
        let config = AsbaConfig::default();
        let policies = config.stage_policies();
        assert_eq!(policies.login.max_attempts, 3);
        assert_eq!(policies.login.initial_delay, Duration::from_secs(3));
        assert_eq!(policies.submission.max_attempts, 2);

        let driver = config.driver_policies();
        assert_eq!(driver.navigation.max_attempts, 5);
        assert_eq!(driver.navigation.attempt_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("asba-autopilot.toml"),
            r#"
[eligibility]
min_unit = 20

[run]
dry_run = true

[retry.login]
max_attempts = 1
initial_delay_ms = 500
"#,
        )
        .unwrap();

        let config = AsbaConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.eligibility.min_unit, 20);
        assert_eq!(config.eligibility.share_value_per_unit, 100.0);
        assert!(config.run.dry_run);
        assert_eq!(config.retry.login.max_attempts, 1);
        assert_eq!(config.retry.login.max_delay_ms, 30_000);
        assert!(config.coordinator_options().dry_run);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AsbaConfig::default();
        config.run.account_pause_ms = 1234;
        config.save_to_file(dir.path().join("asba-autopilot.toml")).unwrap();

        let loaded = AsbaConfig::load_from(dir.path()).unwrap();
        assert_eq!(loaded.run.account_pause_ms, 1234);
        assert_eq!(loaded.portal, PortalProfile::default());
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = AsbaConfig::default();
        config.notification.telegram_bot_token = Some("123:abc".to_string());
        config.accounts.push(UserCredentialSet {
            label: "A".into(),
            password: "pw".into(),
            txn_pin: "1234".into(),
            ..Default::default()
        });

        let redacted = config.redacted();
        assert_eq!(redacted.notification.telegram_bot_token.as_deref(), Some("***"));
        assert_eq!(redacted.accounts[0].password, "***");
    }

    #[test]
    fn test_telegram_requires_token_and_chat() {
        let mut notification = NotificationConfig {
            telegram_bot_token: Some("token".into()),
            telegram_chat_id: None,
        };
        assert!(notification.telegram().is_none());
        notification.telegram_chat_id = Some("42".into());
        assert_eq!(notification.telegram(), Some(("token", "42")));
    }
}
