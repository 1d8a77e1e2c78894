// Portal profile - URLs, element specs and text patterns for one portal
//
// Everything that depends on the portal's markup lives in this table so
// it can be overridden from configuration when the site changes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::remote::ElementSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalProfile {
    pub login_url: String,
    pub listing_url: String,
    /// Host shown to operators when an outcome needs checking by hand
    pub portal_host: String,
    /// Pause after clicks and navigations so the page can render
    pub settle_delay_ms: u64,
    pub elements: PortalElements,
    pub patterns: PortalPatterns,
}

impl Default for PortalProfile {
    fn default() -> Self {
        Self {
            login_url: "https://meroshare.cdsc.com.np/#/login".to_string(),
            listing_url: "https://meroshare.cdsc.com.np/#/asba".to_string(),
            portal_host: "meroshare.cdsc.com.np".to_string(),
            settle_delay_ms: 2000,
            elements: PortalElements::default(),
            patterns: PortalPatterns::default(),
        }
    }
}

impl PortalProfile {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Same profile without settle pauses, for fakes and tests
    pub fn without_delays(mut self) -> Self {
        self.settle_delay_ms = 0;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalElements {
    pub page_body: ElementSpec,
    pub login_form: ElementSpec,
    pub dp_select: ElementSpec,
    pub username: ElementSpec,
    pub password: ElementSpec,
    pub login_button: ElementSpec,
    pub logged_in_marker: ElementSpec,
    pub listing_link: ElementSpec,
    pub listing_row: ElementSpec,
    pub apply_button: ElementSpec,
    pub bank_select: ElementSpec,
    pub account_select: ElementSpec,
    pub units_input: ElementSpec,
    pub crn_input: ElementSpec,
    pub declaration_checkbox: ElementSpec,
    pub proceed_button: ElementSpec,
    pub pin_input: ElementSpec,
    pub submit_button: ElementSpec,
    pub success_alert: ElementSpec,
    pub error_alert: ElementSpec,
}

impl Default for PortalElements {
    fn default() -> Self {
        Self {
            page_body: ElementSpec::new("page body", ["body"]),
            login_form: ElementSpec::new("login form", ["form", "input#username"]),
            dp_select: ElementSpec::new(
                "depository participant",
                ["select#selectBranch", "select[name*='branch' i]", "select"],
            ),
            username: ElementSpec::new("username", ["input#username", "input[name='username']"]),
            password: ElementSpec::new(
                "password",
                ["input#password", "input[name='password']", "input[type='password']"],
            ),
            login_button: ElementSpec::new(
                "login button",
                ["button[type='submit']", "button.sign-in"],
            )
            .with_text("Login"),
            logged_in_marker: ElementSpec::new(
                "dashboard",
                ["app-dashboard", ".user-profile", "a[href*='logout' i]"],
            ),
            listing_link: ElementSpec::new(
                "My ASBA link",
                ["a[href*='asba' i]", "li a", "a"],
            )
            .with_text("My ASBA"),
            listing_row: ElementSpec::new(
                "listing row",
                [".company-list", "table tbody tr", ".table tr"],
            ),
            apply_button: ElementSpec::new(
                "apply button",
                ["button.btn-issue", "button", "a"],
            )
            .with_text("Apply"),
            bank_select: ElementSpec::new("bank", ["select#selectBank", "select[name*='bank' i]"]),
            account_select: ElementSpec::new(
                "account number",
                ["select#accountNumber", "select[name*='account' i]", "select[id*='account' i]"],
            ),
            units_input: ElementSpec::new(
                "applied units",
                ["input#appliedKitta", "input[name*='kitta' i]", "input[placeholder*='kitta' i]"],
            ),
            crn_input: ElementSpec::new(
                "CRN",
                ["input#crnNumber", "input[name*='crn' i]", "input[placeholder*='CRN' i]"],
            ),
            declaration_checkbox: ElementSpec::new(
                "declaration",
                ["input#disclaimer", "input[name*='declare' i]", "input[type='checkbox']"],
            ),
            proceed_button: ElementSpec::new(
                "proceed button",
                ["button[type='submit']", "button.btn-primary", "button"],
            )
            .with_text("Proceed"),
            pin_input: ElementSpec::new(
                "transaction PIN",
                ["input#transactionPIN", "input[placeholder*='PIN' i]", "input[type='password']"],
            ),
            submit_button: ElementSpec::new(
                "submit button",
                ["button[type='submit']", "button.btn-primary", "button"],
            )
            .with_text("Apply"),
            success_alert: ElementSpec::new(
                "success alert",
                [".toast-success", ".alert-success", "[class*='success-message']"],
            ),
            error_alert: ElementSpec::new(
                "error alert",
                [".toast-error", ".alert-danger", "[class*='error-message']"],
            ),
        }
    }
}

/// Regular expressions applied to page or element text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalPatterns {
    pub no_record: String,
    /// Row text that means the opportunity can be applied for
    pub open_marker: String,
    /// Row text that means this account already applied
    pub already_applied_marker: String,
    pub share_value: String,
    pub min_unit: String,
    pub success: Vec<String>,
    pub error: Vec<String>,
}

impl Default for PortalPatterns {
    fn default() -> Self {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            no_record: r"(?i)no\s+record".to_string(),
            open_marker: r"(?i)\bapply\b".to_string(),
            already_applied_marker: r"(?i)\b(edit|reapply|in\s+process)\b".to_string(),
            share_value: r"(?i)share\s+value\s+per\s+unit\s*:?\s*(?:rs\.?\s*)?([\d,]+(?:\.\d+)?)".to_string(),
            min_unit: r"(?i)min(?:imum)?\s*unit\s*:?\s*(\d[\d,]*)".to_string(),
            success: owned(&[
                r"(?i)IPO\s+(has\s+been\s+)?applied\s+successfully",
                r"(?i)application\s+(has\s+been\s+)?submitted\s+successfully",
                r"(?i)successfully\s+applied",
                r"(?i)your\s+application\s+has\s+been\s+submitted",
                r"(?i)application\s+successful",
            ]),
            error: owned(&[
                r"(?i)already\s+(applied|submitted)",
                r"(?i)duplicate\s+application",
                r"(?i)application\s+(has\s+)?failed",
                r"(?i)error\s+(occurred|processing)",
                r"(?i)invalid\s+(PIN|CRN|account)",
                r"(?i)insufficient\s+balance",
                r"(?i)transaction\s+failed",
                r"(?i)unable\s+to\s+(process|submit)",
                r"(?i)please\s+try\s+again",
                r"(?i)something\s+went\s+wrong",
                r"(?i)server\s+error",
                r"(?i)session\s+expired",
                r"(?i)not\s+eligible",
                r"(?i)quota\s+exceeded",
                r"(?i)limit\s+(exceeded|reached)",
            ]),
        }
    }
}

/// Compiled form of [`PortalPatterns`]
#[derive(Debug, Clone)]
pub struct CompiledPatterns {
    pub no_record: Regex,
    pub open_marker: Regex,
    pub already_applied_marker: Regex,
    pub share_value: Regex,
    pub min_unit: Regex,
    pub success: Vec<Regex>,
    pub error: Vec<Regex>,
}

impl PortalPatterns {
    pub fn compile(&self) -> Result<CompiledPatterns, regex::Error> {
        let many = |patterns: &[String]| -> Result<Vec<Regex>, regex::Error> {
            patterns.iter().map(|p| Regex::new(p)).collect()
        };
        Ok(CompiledPatterns {
            no_record: Regex::new(&self.no_record)?,
            open_marker: Regex::new(&self.open_marker)?,
            already_applied_marker: Regex::new(&self.already_applied_marker)?,
            share_value: Regex::new(&self.share_value)?,
            min_unit: Regex::new(&self.min_unit)?,
            success: many(&self.success)?,
            error: many(&self.error)?,
        })
    }
}

impl CompiledPatterns {
    pub fn share_value(&self, text: &str) -> Option<f64> {
        self.share_value
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().replace(',', "").parse().ok())
    }

    pub fn min_unit(&self, text: &str) -> Option<u64> {
        self.min_unit
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().replace(',', "").parse().ok())
    }

    pub fn first_success<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.success.iter().find_map(|re| re.find(text)).map(|m| m.as_str())
    }

    pub fn first_error<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.error.iter().find_map(|re| re.find(text)).map(|m| m.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_patterns_compile() {
        assert!(PortalPatterns::default().compile().is_ok());
    }

    #[test]
    fn test_share_details_are_extracted() {
        let patterns = PortalPatterns::default().compile().unwrap();
        let text = "Issue Manager: XYZ Capital\nShare Value Per Unit: 100\nMin Unit: 10\nMax Unit: 1,000";
        assert_eq!(patterns.share_value(text), Some(100.0));
        assert_eq!(patterns.min_unit(text), Some(10));
        assert_eq!(patterns.share_value("Share Value Per Unit Rs. 1,250.50"), Some(1250.5));
        assert_eq!(patterns.min_unit("no details here"), None);
    }

    #[test]
    fn test_row_markers() {
        let patterns = PortalPatterns::default().compile().unwrap();
        assert!(patterns.open_marker.is_match("Example Hydro (EHL) Ordinary Shares Apply"));
        assert!(!patterns.open_marker.is_match("Example Hydro (EHL) Ordinary Shares Reapply"));
        assert!(patterns.already_applied_marker.is_match("Example Hydro Ordinary Shares Edit"));
    }

    #[test]
    fn test_outcome_patterns() {
        let patterns = PortalPatterns::default().compile().unwrap();
        assert!(patterns.first_success("Your IPO has been applied successfully.").is_some());
        assert_eq!(
            patterns.first_error("Error: Invalid PIN entered"),
            Some("Invalid PIN")
        );
    }

    #[test]
    fn test_profile_round_trips_through_toml() {
        let profile = PortalProfile::default();
        let text = toml::to_string(&profile).unwrap();
        let parsed: PortalProfile = toml::from_str(&text).unwrap();
        assert_eq!(parsed, profile);
    }
}
