// Portal driver - implements each workflow stage on top of a remote UI session

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::profile::{CompiledPatterns, PortalProfile};
use crate::accounts::UserCredentialSet;
use crate::remote::{ElementHandle, ElementSpec, RemoteUi, SessionFactory};
use crate::retry::{RetryError, RetryExecutor, RetryObserver, RetryPolicy};
use crate::workflow::{
    Confirmation, Detection, DriverFactory, EligibilityFacts, OpportunityDetails,
    OpportunityFilter, Stage, StageDriver, StageError,
};

/// Retry policies for the low-level waits inside a stage
#[derive(Debug, Clone, PartialEq)]
pub struct DriverPolicies {
    pub navigation: RetryPolicy,
    pub element_wait: RetryPolicy,
}

impl Default for DriverPolicies {
    fn default() -> Self {
        Self {
            navigation: RetryPolicy::new(5, Duration::from_secs(3))
                .with_max_delay(Duration::from_secs(30))
                .with_attempt_timeout(Duration::from_secs(120)),
            element_wait: RetryPolicy::new(3, Duration::from_secs(2)),
        }
    }
}

/// Reloads the page between element-wait attempts when enabled
struct ReloadObserver<'a, R: RemoteUi> {
    ui: &'a R,
    enabled: bool,
}

#[async_trait]
impl<R: RemoteUi> RetryObserver<StageError> for ReloadObserver<'_, R> {
    async fn on_retry(&self, _error: &StageError, attempt: u32) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.ui.reload().await {
            warn!(attempt, "Page reload failed, continuing: {}", e);
        }
    }
}

pub struct PortalDriver<R: RemoteUi> {
    ui: R,
    profile: Arc<PortalProfile>,
    patterns: Arc<CompiledPatterns>,
    policies: DriverPolicies,
}

impl<R: RemoteUi> PortalDriver<R> {
    pub fn new(ui: R, profile: Arc<PortalProfile>, patterns: Arc<CompiledPatterns>, policies: DriverPolicies) -> Self {
        Self {
            ui,
            profile,
            patterns,
            policies,
        }
    }

    /// Build a driver, compiling the profile's patterns
    pub fn from_profile(ui: R, profile: PortalProfile, policies: DriverPolicies) -> Result<Self, regex::Error> {
        let patterns = profile.patterns.compile()?;
        Ok(Self::new(ui, Arc::new(profile), Arc::new(patterns), policies))
    }

    pub fn ui(&self) -> &R {
        &self.ui
    }

    async fn settle(&self) {
        let delay = self.profile.settle_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn find(&self, spec: &ElementSpec) -> Result<Option<ElementHandle>, StageError> {
        Ok(self.ui.find_element(spec).await?)
    }

    async fn require(&self, spec: &ElementSpec) -> Result<ElementHandle, StageError> {
        self.find(spec)
            .await?
            .ok_or_else(|| StageError::transient(format!("{} not found", spec.name)))
    }

    /// Poll for an element under the element-wait policy
    async fn wait_for(&self, spec: &ElementSpec, reload_on_fail: bool) -> Result<ElementHandle, StageError> {
        let observer = ReloadObserver {
            ui: &self.ui,
            enabled: reload_on_fail,
        };
        RetryExecutor::new(format!("wait for {}", spec.name))
            .execute_with(
                &self.policies.element_wait,
                |_| async move { self.require(spec).await },
                &observer,
                StageError::is_transient,
            )
            .await
            .map_err(RetryError::into_last_error)
    }

    async fn navigate(&self, url: &str) -> Result<(), StageError> {
        RetryExecutor::new("navigate")
            .execute_with(
                &self.policies.navigation,
                |attempt| async move {
                    debug!(url, attempt, "Navigating");
                    self.ui.navigate(url).await.map_err(StageError::from)
                },
                &crate::retry::NoopObserver,
                StageError::is_transient,
            )
            .await
            .map_err(RetryError::into_last_error)
    }

    async fn fill(&self, spec: &ElementSpec, value: &str) -> Result<(), StageError> {
        let element = self.require(spec).await?;
        Ok(self.ui.fill_field(element, value).await?)
    }

    /// Find and click, retrying both under the element-wait policy
    async fn click_on(&self, spec: &ElementSpec) -> Result<(), StageError> {
        RetryExecutor::new(format!("click {}", spec.name))
            .execute_with(
                &self.policies.element_wait,
                |_| async move {
                    let element = self.require(spec).await?;
                    self.ui.click(element).await?;
                    Ok::<(), StageError>(())
                },
                &crate::retry::NoopObserver,
                StageError::is_transient,
            )
            .await
            .map_err(RetryError::into_last_error)
    }

    async fn page_text(&self) -> Result<String, StageError> {
        let body = self
            .find(&self.profile.elements.page_body)
            .await?
            .ok_or_else(|| StageError::transient("Page not fully loaded"))?;
        Ok(self.ui.read_text(body).await?)
    }

    async fn alert_text(&self, spec: &ElementSpec) -> Result<Option<String>, StageError> {
        match self.find(spec).await? {
            Some(alert) => {
                let text = self.ui.read_text(alert).await?;
                let text = text.trim();
                Ok((!text.is_empty()).then(|| text.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn return_to_listing(&self) -> Result<(), StageError> {
        self.ui.navigate(&self.profile.listing_url).await?;
        self.settle().await;
        Ok(())
    }

    /// Company name is whatever precedes the share category in the row
    fn describe(&self, row_text: &str, filter: &OpportunityFilter) -> OpportunityDetails {
        let flattened = row_text.split_whitespace().collect::<Vec<_>>().join(" ");
        let category = Regex::new(&format!("(?i){}", regex::escape(&filter.category))).ok();
        let company = category
            .and_then(|re| re.find(&flattened).map(|m| flattened[..m.start()].trim().to_string()))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                row_text
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .unwrap_or_default()
                    .to_string()
            });

        OpportunityDetails {
            company,
            share_group: Some(filter.category.clone()),
            share_value_per_unit: None,
            min_unit: None,
        }
    }

    async fn check_logged_in(&self) -> Result<(), StageError> {
        if self.find(&self.profile.elements.logged_in_marker).await?.is_some() {
            return Ok(());
        }
        let url = self.ui.current_url().await?;
        if !url.is_empty() && !url.to_lowercase().contains("login") {
            return Ok(());
        }
        if let Some(message) = self.alert_text(&self.profile.elements.error_alert).await? {
            return Err(StageError::rejected(format!("login rejected: {}", message)));
        }
        Err(StageError::transient("login did not complete"))
    }
}

#[async_trait]
impl<R: RemoteUi> StageDriver for PortalDriver<R> {
    async fn login(&self, account: &UserCredentialSet) -> Result<(), StageError> {
        let elements = &self.profile.elements;
        self.navigate(&self.profile.login_url).await?;

        if let Err(e) = self.wait_for(&elements.login_form, true).await {
            warn!("Login form not detected, continuing anyway: {}", e);
        }
        self.settle().await;

        self.fill(&elements.dp_select, &account.dp).await?;
        self.fill(&elements.username, &account.username).await?;
        self.fill(&elements.password, &account.password).await?;
        self.click_on(&elements.login_button).await?;
        self.settle().await;

        self.check_logged_in().await?;
        info!(account = %account.label, "Login successful");
        Ok(())
    }

    async fn open_listing(&self) -> Result<(), StageError> {
        match self.find(&self.profile.elements.listing_link).await? {
            Some(link) => self.ui.click(link).await?,
            None => {
                debug!("Listing link not visible, navigating directly");
                self.navigate(&self.profile.listing_url).await?;
            }
        }
        self.settle().await;
        self.wait_for(&self.profile.elements.page_body, false).await?;
        Ok(())
    }

    async fn detect_opportunity(&self, filter: &OpportunityFilter) -> Result<Detection, StageError> {
        self.settle().await;
        let text = self.page_text().await?;
        if self.patterns.no_record.is_match(&text) {
            return Ok(Detection::NotFound {
                reason: "No Record(s) Found".to_string(),
            });
        }

        let row_spec = self
            .profile
            .elements
            .listing_row
            .clone()
            .with_text(filter.category.clone());
        let Some(row) = self.find(&row_spec).await? else {
            // Rows of other categories mean the table rendered; none at all
            // means it is still loading
            if self.find(&self.profile.elements.listing_row).await?.is_some() {
                return Ok(Detection::NotFound {
                    reason: format!("No {} opportunity listed", filter.category),
                });
            }
            return Err(StageError::transient("Page not fully loaded"));
        };

        let row_text = self.ui.read_text(row).await?;
        let details = self.describe(&row_text, filter);
        if self.patterns.already_applied_marker.is_match(&row_text) {
            return Ok(Detection::AlreadyActioned(Some(details)));
        }
        if self.patterns.open_marker.is_match(&row_text) {
            return Ok(Detection::Found(details));
        }
        Err(StageError::transient("Listing row has no apply action yet"))
    }

    async fn read_eligibility(&self, opportunity: &OpportunityDetails) -> Result<EligibilityFacts, StageError> {
        let row_spec = self
            .profile
            .elements
            .listing_row
            .clone()
            .with_text(opportunity.company.clone());
        let row = self.require(&row_spec).await?;
        self.ui.click(row).await?;
        self.settle().await;

        let text = self.page_text().await?;
        let facts = EligibilityFacts {
            share_value_per_unit: self.patterns.share_value(&text),
            min_unit: self.patterns.min_unit(&text),
        };
        self.return_to_listing().await?;

        if facts.share_value_per_unit.is_none() && facts.min_unit.is_none() {
            return Err(StageError::transient("Share details not loaded"));
        }
        Ok(facts)
    }

    async fn submit_application(&self, account: &UserCredentialSet) -> Result<(), StageError> {
        let elements = &self.profile.elements;
        let apply = self.wait_for(&elements.apply_button, false).await?;
        self.ui.click(apply).await?;
        self.settle().await;

        let bank = self.wait_for(&elements.bank_select, false).await?;
        self.ui.fill_field(bank, &account.bank).await?;
        self.settle().await;
        let account_field = self.wait_for(&elements.account_select, false).await?;
        self.ui.fill_field(account_field, &account.account_number).await?;
        self.fill(&elements.units_input, &account.units).await?;
        self.fill(&elements.crn_input, &account.crn).await?;
        self.click_on(&elements.declaration_checkbox).await?;
        self.click_on(&elements.proceed_button).await?;
        self.settle().await;

        if let Some(message) = self.alert_text(&elements.error_alert).await? {
            return Err(StageError::rejected(message));
        }

        let pin = self.wait_for(&elements.pin_input, false).await?;
        self.ui.fill_field(pin, &account.txn_pin).await?;
        self.click_on(&elements.submit_button).await?;
        info!(account = %account.label, "Application submitted");
        Ok(())
    }

    async fn confirm_outcome(&self) -> Result<Confirmation, StageError> {
        let elements = &self.profile.elements;
        self.settle().await;

        let text = self.page_text().await?;
        if let Some(message) = self.patterns.first_success(&text) {
            return Ok(Confirmation::Succeeded {
                message: Some(message.to_string()),
            });
        }
        if let Some(message) = self.patterns.first_error(&text) {
            return Ok(Confirmation::Rejected {
                message: message.to_string(),
            });
        }

        if let Some(message) = self.alert_text(&elements.success_alert).await? {
            return Ok(Confirmation::Succeeded {
                message: Some(message),
            });
        }
        if let Some(message) = self.alert_text(&elements.error_alert).await? {
            return Ok(Confirmation::Rejected { message });
        }
        if self.find(&elements.pin_input).await?.is_some() {
            return Ok(Confirmation::Rejected {
                message: "Application form still visible - submission may not have completed".to_string(),
            });
        }

        Ok(Confirmation::Indeterminate {
            detail: format!(
                "Could not verify application status - please check {} manually",
                self.profile.portal_host
            ),
        })
    }

    async fn is_session_active(&self) -> bool {
        self.ui.is_session_active().await
    }

    async fn recover(&self, stage: Stage) -> Result<(), StageError> {
        match stage {
            Stage::Login | Stage::NavigateToListing | Stage::DetectOpportunity => {
                self.ui.reload().await?;
                self.settle().await;
                Ok(())
            }
            Stage::VerifyEligibility | Stage::SubmitApplication => self.return_to_listing().await,
            Stage::ConfirmOutcome | Stage::Notify => Ok(()),
        }
    }

    async fn close(&self) {
        if let Err(e) = self.ui.close().await {
            warn!("Failed to close session: {}", e);
        }
    }
}

/// Opens a fresh session per account and wraps it in a [`PortalDriver`]
pub struct PortalDriverFactory {
    sessions: Arc<dyn SessionFactory>,
    profile: Arc<PortalProfile>,
    patterns: Arc<CompiledPatterns>,
    policies: DriverPolicies,
}

impl PortalDriverFactory {
    pub fn new(sessions: Arc<dyn SessionFactory>, profile: PortalProfile, policies: DriverPolicies) -> Result<Self, regex::Error> {
        let patterns = profile.patterns.compile()?;
        Ok(Self {
            sessions,
            profile: Arc::new(profile),
            patterns: Arc::new(patterns),
            policies,
        })
    }
}

#[async_trait]
impl DriverFactory for PortalDriverFactory {
    async fn open(&self, account: &UserCredentialSet) -> Result<Box<dyn StageDriver>, StageError> {
        debug!(account = %account.label, "Opening browser session");
        let ui = self.sessions.open_session().await?;
        Ok(Box::new(PortalDriver::new(
            ui,
            self.profile.clone(),
            self.patterns.clone(),
            self.policies.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemoteUi;

    fn driver(ui: MockRemoteUi) -> PortalDriver<MockRemoteUi> {
        let policies = DriverPolicies {
            navigation: RetryPolicy::immediate(1),
            element_wait: RetryPolicy::immediate(1),
        };
        PortalDriver::from_profile(ui, PortalProfile::default().without_delays(), policies).unwrap()
    }

    #[test]
    fn test_company_name_precedes_category() {
        let driver = driver(MockRemoteUi::new());
        let details = driver.describe(
            "Example Hydropower Ltd. (EHPL)\n  Ordinary Shares  IPO  Apply",
            &OpportunityFilter::default(),
        );
        assert_eq!(details.company, "Example Hydropower Ltd. (EHPL)");
        assert_eq!(details.share_group.as_deref(), Some("Ordinary Shares"));
    }

    #[tokio::test]
    async fn test_no_record_page_means_no_opportunity() {
        let mut ui = MockRemoteUi::new();
        ui.expect_find_element()
            .returning(|spec| Ok((spec.name == "page body").then_some(ElementHandle(1))));
        ui.expect_read_text()
            .returning(|_| Ok("My ASBA\nNo Record(s) Found".to_string()));

        let detection = driver(ui)
            .detect_opportunity(&OpportunityFilter::default())
            .await
            .unwrap();
        assert_eq!(
            detection,
            Detection::NotFound {
                reason: "No Record(s) Found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_listing_without_rows_is_still_loading() {
        let mut ui = MockRemoteUi::new();
        ui.expect_find_element()
            .returning(|spec| Ok((spec.name == "page body").then_some(ElementHandle(1))));
        ui.expect_read_text()
            .returning(|_| Ok("My ASBA\nApply for Issue\nCurrent Issue\nApplication Report".to_string()));

        let err = driver(ui)
            .detect_opportunity(&OpportunityFilter::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err, StageError::transient("Page not fully loaded"));
    }

    #[tokio::test]
    async fn test_click_is_retried_after_interaction_error() {
        let mut ui = MockRemoteUi::new();
        ui.expect_find_element()
            .returning(|_| Ok(Some(ElementHandle(7))));
        let mut seq = mockall::Sequence::new();
        ui.expect_click()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(crate::remote::RemoteUiError::Interaction("detached".to_string())));
        ui.expect_click()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let driver = driver(ui);
        let spec = driver.profile.elements.proceed_button.clone();
        driver.click_on(&spec).await.unwrap();
    }

    #[tokio::test]
    async fn test_confirm_reports_portal_error_text() {
        let mut ui = MockRemoteUi::new();
        ui.expect_find_element()
            .returning(|spec| Ok((spec.name == "page body").then_some(ElementHandle(1))));
        ui.expect_read_text()
            .returning(|_| Ok("Error: Invalid PIN entered".to_string()));

        let confirmation = driver(ui).confirm_outcome().await.unwrap();
        assert_eq!(
            confirmation,
            Confirmation::Rejected {
                message: "Invalid PIN".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_closed_session_surfaces_as_session_closed() {
        let mut ui = MockRemoteUi::new();
        ui.expect_find_element()
            .returning(|_| Err(crate::remote::RemoteUiError::SessionClosed));

        let err = driver(ui).confirm_outcome().await.unwrap_err();
        assert!(matches!(err, StageError::SessionClosed(_)));
    }
}
