//! Shared fakes for the integration tests: a scripted stage driver, a
//! recording notification sink and a screen-based remote UI.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use asba_autopilot::notify::{NotificationSink, NotifyError};
use asba_autopilot::remote::{ElementHandle, ElementSpec, RemoteUi, RemoteUiError};
use asba_autopilot::retry::RetryPolicy;
use asba_autopilot::workflow::{
    Confirmation, CoordinatorOptions, Detection, DriverFactory, EligibilityFacts,
    OpportunityDetails, OpportunityFilter, Stage, StageDriver, StageError, StagePolicies,
    WorkflowCoordinator,
};
use asba_autopilot::UserCredentialSet;

pub const COMPANY: &str = "ABC Hydropower Ltd.";

/// A complete account, ready for submission
pub fn account(label: &str) -> UserCredentialSet {
    UserCredentialSet {
        label: label.to_string(),
        username: format!("{}-user", label.to_lowercase()),
        password: "secret".to_string(),
        dp: "13700".to_string(),
        bank: "NIC Asia Bank".to_string(),
        account_number: "0123456789".to_string(),
        units: "10".to_string(),
        crn: "CRN-001".to_string(),
        txn_pin: "1234".to_string(),
    }
}

/// Listing entry as detection reports it, before the details are read
pub fn open_opportunity() -> OpportunityDetails {
    OpportunityDetails {
        share_group: Some("Ordinary Shares".to_string()),
        ..OpportunityDetails::new(COMPANY)
    }
}

pub fn facts(share_value_per_unit: f64, min_unit: u64) -> EligibilityFacts {
    EligibilityFacts {
        share_value_per_unit: Some(share_value_per_unit),
        min_unit: Some(min_unit),
    }
}

/// Coordinator that retries every stage twice without sleeping
pub fn fast_coordinator(options: CoordinatorOptions) -> WorkflowCoordinator {
    WorkflowCoordinator::new(StagePolicies::uniform(RetryPolicy::immediate(2)), options)
}

pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Responses per stage, consumed in order. Once a queue runs dry the stage
/// behaves like a healthy portal with an eligible opportunity.
#[derive(Debug, Default)]
pub struct DriverScript {
    pub login: VecDeque<Result<(), StageError>>,
    pub listing: VecDeque<Result<(), StageError>>,
    pub detection: VecDeque<Result<Detection, StageError>>,
    pub eligibility: VecDeque<Result<EligibilityFacts, StageError>>,
    pub submission: VecDeque<Result<(), StageError>>,
    pub confirmation: VecDeque<Result<Confirmation, StageError>>,
    pub session_closed_before_confirm: bool,
}

impl DriverScript {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn login(mut self, result: Result<(), StageError>) -> Self {
        self.login.push_back(result);
        self
    }

    pub fn listing(mut self, result: Result<(), StageError>) -> Self {
        self.listing.push_back(result);
        self
    }

    pub fn detection(mut self, result: Result<Detection, StageError>) -> Self {
        self.detection.push_back(result);
        self
    }

    pub fn eligibility(mut self, result: Result<EligibilityFacts, StageError>) -> Self {
        self.eligibility.push_back(result);
        self
    }

    pub fn submission(mut self, result: Result<(), StageError>) -> Self {
        self.submission.push_back(result);
        self
    }

    pub fn confirmation(mut self, result: Result<Confirmation, StageError>) -> Self {
        self.confirmation.push_back(result);
        self
    }

    pub fn session_closed_before_confirm(mut self) -> Self {
        self.session_closed_before_confirm = true;
        self
    }
}

pub struct ScriptedDriver {
    label: String,
    script: Mutex<DriverScript>,
    log: CallLog,
}

impl ScriptedDriver {
    pub fn new(script: DriverScript) -> Self {
        Self::with_log("", script, Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_log(label: &str, script: DriverScript, log: CallLog) -> Self {
        Self {
            label: label.to_string(),
            script: Mutex::new(script),
            log,
        }
    }

    /// Call names in order, e.g. `login`, `recover:login`, `close`
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn called(&self, call: &str) {
        let entry = if self.label.is_empty() {
            call.to_string()
        } else {
            format!("{}:{}", self.label, call)
        };
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl StageDriver for ScriptedDriver {
    async fn login(&self, _account: &UserCredentialSet) -> Result<(), StageError> {
        self.called("login");
        self.script.lock().unwrap().login.pop_front().unwrap_or(Ok(()))
    }

    async fn open_listing(&self) -> Result<(), StageError> {
        self.called("open_listing");
        self.script.lock().unwrap().listing.pop_front().unwrap_or(Ok(()))
    }

    async fn detect_opportunity(&self, _filter: &OpportunityFilter) -> Result<Detection, StageError> {
        self.called("detect_opportunity");
        self.script
            .lock()
            .unwrap()
            .detection
            .pop_front()
            .unwrap_or_else(|| Ok(Detection::Found(open_opportunity())))
    }

    async fn read_eligibility(&self, _opportunity: &OpportunityDetails) -> Result<EligibilityFacts, StageError> {
        self.called("read_eligibility");
        self.script
            .lock()
            .unwrap()
            .eligibility
            .pop_front()
            .unwrap_or_else(|| Ok(facts(100.0, 10)))
    }

    async fn submit_application(&self, _account: &UserCredentialSet) -> Result<(), StageError> {
        self.called("submit_application");
        self.script.lock().unwrap().submission.pop_front().unwrap_or(Ok(()))
    }

    async fn confirm_outcome(&self) -> Result<Confirmation, StageError> {
        self.called("confirm_outcome");
        self.script
            .lock()
            .unwrap()
            .confirmation
            .pop_front()
            .unwrap_or_else(|| {
                Ok(Confirmation::Succeeded {
                    message: Some("IPO applied successfully".to_string()),
                })
            })
    }

    async fn is_session_active(&self) -> bool {
        !self.script.lock().unwrap().session_closed_before_confirm
    }

    async fn recover(&self, stage: Stage) -> Result<(), StageError> {
        self.called(&format!("recover:{}", stage));
        Ok(())
    }

    async fn close(&self) {
        self.called("close");
    }
}

/// Hands out one scripted driver per account label; unscripted labels get
/// a healthy driver. All drivers write to the same call log.
#[derive(Default)]
pub struct ScriptedDriverFactory {
    scripts: Mutex<HashMap<String, DriverScript>>,
    open_failures: HashSet<String>,
    log: CallLog,
}

impl ScriptedDriverFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, label: &str, script: DriverScript) -> Self {
        self.scripts.lock().unwrap().insert(label.to_string(), script);
        self
    }

    pub fn fail_to_open(mut self, label: &str) -> Self {
        self.open_failures.insert(label.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn calls_for(&self, label: &str) -> Vec<String> {
        let prefix = format!("{}:", label);
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl DriverFactory for ScriptedDriverFactory {
    async fn open(&self, account: &UserCredentialSet) -> Result<Box<dyn StageDriver>, StageError> {
        self.log.lock().unwrap().push(format!("{}:open", account.label));
        if self.open_failures.contains(&account.label) {
            return Err(StageError::SessionClosed("browser failed to launch".to_string()));
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .remove(&account.label)
            .unwrap_or_default();
        Ok(Box::new(ScriptedDriver::with_log(&account.label, script, self.log.clone())))
    }
}

/// Keeps every message it is asked to send
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the message, then reports a delivery failure
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap()
            .push((destination.to_string(), message.to_string()));
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(())
    }
}

/// Elements visible on one page, as (element spec name, text)
#[derive(Debug, Clone, Default)]
pub struct Screen {
    pub elements: Vec<(String, String)>,
}

impl Screen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, text: &str) -> Self {
        self.elements.push((name.to_string(), text.to_string()));
        self
    }
}

#[derive(Debug, Default)]
struct FakeUiState {
    current: String,
    handles: Vec<(String, String)>,
    fills: Vec<(String, String)>,
    clicks: Vec<String>,
    navigations: Vec<String>,
    reloads: u32,
    loaded: HashMap<String, Screen>,
    closed: bool,
    session_lost: bool,
}

/// Remote UI over a fixed set of screens. Navigating to a URL shows the
/// screen registered under that URL; clicking an element with a transition
/// shows the target screen.
#[derive(Default)]
pub struct FakeRemoteUi {
    screens: HashMap<String, Screen>,
    transitions: HashMap<String, String>,
    reload_screens: HashMap<String, Screen>,
    lose_session_on: Option<String>,
    state: Mutex<FakeUiState>,
}

impl FakeRemoteUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(mut self, key: &str, screen: Screen) -> Self {
        self.screens.insert(key.to_string(), screen);
        self
    }

    pub fn on_click(mut self, element: &str, target: &str) -> Self {
        self.transitions.insert(element.to_string(), target.to_string());
        self
    }

    /// Page `key` shows `screen` from the first reload onwards
    pub fn loads_on_reload(mut self, key: &str, screen: Screen) -> Self {
        self.reload_screens.insert(key.to_string(), screen);
        self
    }

    /// The browser dies right after `element` is clicked
    pub fn lose_session_on_click(mut self, element: &str) -> Self {
        self.lose_session_on = Some(element.to_string());
        self
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().fills.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn reloads(&self) -> u32 {
        self.state.lock().unwrap().reloads
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn current_screen(&self) -> String {
        self.state.lock().unwrap().current.clone()
    }

    fn element(&self, handle: ElementHandle) -> Result<(String, String), RemoteUiError> {
        let state = self.state.lock().unwrap();
        if state.session_lost {
            return Err(RemoteUiError::SessionClosed);
        }
        state
            .handles
            .get(handle.0 as usize)
            .cloned()
            .ok_or(RemoteUiError::StaleElement(handle.0))
    }
}

#[async_trait]
impl RemoteUi for FakeRemoteUi {
    async fn navigate(&self, url: &str) -> Result<(), RemoteUiError> {
        let mut state = self.state.lock().unwrap();
        if state.session_lost {
            return Err(RemoteUiError::SessionClosed);
        }
        state.navigations.push(url.to_string());
        if !self.screens.contains_key(url) {
            return Err(RemoteUiError::Navigation(format!("no page at {}", url)));
        }
        state.current = url.to_string();
        Ok(())
    }

    async fn find_element(&self, spec: &ElementSpec) -> Result<Option<ElementHandle>, RemoteUiError> {
        let mut state = self.state.lock().unwrap();
        if state.session_lost {
            return Err(RemoteUiError::SessionClosed);
        }
        let screen = state
            .loaded
            .get(&state.current)
            .or_else(|| self.screens.get(&state.current));
        let found = screen.and_then(|screen| {
            screen
                .elements
                .iter()
                .find(|(name, text)| name == &spec.name && spec.text_matches(text))
                .cloned()
        });
        Ok(found.map(|element| {
            state.handles.push(element);
            ElementHandle(state.handles.len() as u64 - 1)
        }))
    }

    async fn read_text(&self, element: ElementHandle) -> Result<String, RemoteUiError> {
        Ok(self.element(element)?.1)
    }

    async fn click(&self, element: ElementHandle) -> Result<(), RemoteUiError> {
        let (name, _) = self.element(element)?;
        let mut state = self.state.lock().unwrap();
        state.clicks.push(name.clone());
        if let Some(target) = self.transitions.get(&name) {
            state.current = target.clone();
        }
        if self.lose_session_on.as_deref() == Some(name.as_str()) {
            state.session_lost = true;
        }
        Ok(())
    }

    async fn fill_field(&self, element: ElementHandle, value: &str) -> Result<(), RemoteUiError> {
        let (name, _) = self.element(element)?;
        self.state.lock().unwrap().fills.push((name, value.to_string()));
        Ok(())
    }

    async fn current_url(&self) -> Result<String, RemoteUiError> {
        let state = self.state.lock().unwrap();
        if state.session_lost {
            return Err(RemoteUiError::SessionClosed);
        }
        Ok(state.current.clone())
    }

    async fn is_session_active(&self) -> bool {
        let state = self.state.lock().unwrap();
        !state.session_lost && !state.closed
    }

    async fn reload(&self) -> Result<(), RemoteUiError> {
        let mut state = self.state.lock().unwrap();
        if state.session_lost {
            return Err(RemoteUiError::SessionClosed);
        }
        state.reloads += 1;
        if let Some(screen) = self.reload_screens.get(&state.current) {
            let key = state.current.clone();
            state.loaded.insert(key, screen.clone());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), RemoteUiError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}
