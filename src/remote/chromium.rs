// Chromium-backed remote UI over the DevTools protocol
//
// Each session launches its own browser process with a throwaway profile
// directory, so accounts never share cookies or local storage.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::errors::RemoteUiError;
use super::traits::{ElementHandle, ElementSpec, RemoteUi, SessionFactory};
use crate::config::BrowserSettings;

pub struct ChromiumSessionFactory {
    settings: BrowserSettings,
}

impl ChromiumSessionFactory {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn open_session(&self) -> Result<Box<dyn RemoteUi>, RemoteUiError> {
        let session = ChromiumSession::launch(&self.settings).await?;
        Ok(Box::new(session))
    }
}

pub struct ChromiumSession {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
    /// Removed when the session closes, or on drop if launch fails midway
    profile: Mutex<Option<TempDir>>,
    elements: Mutex<HashMap<u64, Element>>,
    next_handle: AtomicU64,
    closed: AtomicBool,
}

impl ChromiumSession {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self, RemoteUiError> {
        let profile = create_profile_dir(settings.profile_root.clone()).await?;
        let user_data_dir = profile.path().to_path_buf();

        let mut builder = BrowserConfig::builder()
            .request_timeout(Duration::from_secs(settings.request_timeout_secs))
            .window_size(1366, 900)
            .user_data_dir(&user_data_dir)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-notifications")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(executable);
        }
        if settings.no_sandbox {
            builder = builder.arg("--no-sandbox").arg("--disable-setuid-sandbox");
        }
        let config = builder.build().map_err(RemoteUiError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RemoteUiError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    // chromiumoxide does not know every CDP message; those are noise
                    trace!("Browser handler event error: {}", e);
                }
            }
            debug!("Browser handler task completed");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RemoteUiError::Launch(e.to_string()))?;

        info!(profile = %user_data_dir.display(), "Browser session started");
        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler,
            profile: Mutex::new(Some(profile)),
            elements: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), RemoteUiError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(RemoteUiError::SessionClosed)
        } else {
            Ok(())
        }
    }

    async fn remember(&self, element: Element) -> ElementHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.elements.lock().await.insert(id, element);
        ElementHandle(id)
    }

    /// A failed call on a dead page means the session went away
    async fn classify(&self, message: String, wrap: fn(String) -> RemoteUiError) -> RemoteUiError {
        if self.is_session_active().await {
            wrap(message)
        } else {
            RemoteUiError::SessionClosed
        }
    }
}

#[async_trait]
impl RemoteUi for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<(), RemoteUiError> {
        self.ensure_open()?;
        debug!(url, "Navigating");
        self.elements.lock().await.clear();
        if let Err(e) = self.page.goto(url).await {
            return Err(self.classify(e.to_string(), RemoteUiError::Navigation).await);
        }
        if let Err(e) = self.page.wait_for_navigation().await {
            return Err(self.classify(e.to_string(), RemoteUiError::Navigation).await);
        }
        Ok(())
    }

    async fn find_element(&self, spec: &ElementSpec) -> Result<Option<ElementHandle>, RemoteUiError> {
        self.ensure_open()?;
        for selector in &spec.selectors {
            let candidates = match self.page.find_elements(selector.as_str()).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    if !self.is_session_active().await {
                        return Err(RemoteUiError::SessionClosed);
                    }
                    trace!(element = %spec.name, selector = %selector, "No match: {}", e);
                    continue;
                }
            };

            for candidate in candidates {
                if spec.text.is_some() {
                    let text = candidate.inner_text().await.ok().flatten().unwrap_or_default();
                    if !spec.text_matches(&text) {
                        continue;
                    }
                }
                debug!(element = %spec.name, selector = %selector, "Element found");
                return Ok(Some(self.remember(candidate).await));
            }
        }
        Ok(None)
    }

    async fn read_text(&self, element: ElementHandle) -> Result<String, RemoteUiError> {
        self.ensure_open()?;
        let elements = self.elements.lock().await;
        let element = lookup(&elements, element)?;
        match element.inner_text().await {
            Ok(text) => Ok(text.unwrap_or_default()),
            Err(e) => Err(self.classify(e.to_string(), RemoteUiError::Interaction).await),
        }
    }

    async fn click(&self, element: ElementHandle) -> Result<(), RemoteUiError> {
        self.ensure_open()?;
        let elements = self.elements.lock().await;
        let element = lookup(&elements, element)?;
        if let Err(e) = element.scroll_into_view().await {
            trace!("Scroll into view failed: {}", e);
        }
        match element.click().await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.classify(e.to_string(), RemoteUiError::Interaction).await),
        }
    }

    async fn fill_field(&self, element: ElementHandle, value: &str) -> Result<(), RemoteUiError> {
        self.ensure_open()?;
        let literal = serde_json::to_string(value)
            .map_err(|e| RemoteUiError::Interaction(e.to_string()))?;
        let script = format!(
            r#"function() {{
                const value = {literal};
                if (this.tagName === 'SELECT') {{
                    const wanted = value.trim().toLowerCase();
                    const option = Array.from(this.options).find(
                        (o) => o.value === value || o.text.trim().toLowerCase().includes(wanted)
                    );
                    if (!option) {{ return false; }}
                    this.value = option.value;
                }} else {{
                    this.focus();
                    this.value = value;
                    this.dispatchEvent(new Event('input', {{ bubbles: true }}));
                }}
                this.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }}"#
        );

        let elements = self.elements.lock().await;
        let element = lookup(&elements, element)?;
        let result = match element.call_js_fn(script, false).await {
            Ok(result) => result,
            Err(e) => return Err(self.classify(e.to_string(), RemoteUiError::Interaction).await),
        };
        let filled = result
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if filled {
            Ok(())
        } else {
            Err(RemoteUiError::Interaction(format!("no option matching '{}'", value)))
        }
    }

    async fn current_url(&self) -> Result<String, RemoteUiError> {
        self.ensure_open()?;
        match self.page.url().await {
            Ok(url) => Ok(url.unwrap_or_default()),
            Err(_) => Err(RemoteUiError::SessionClosed),
        }
    }

    async fn is_session_active(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.page.url().await.is_ok()
    }

    async fn reload(&self) -> Result<(), RemoteUiError> {
        self.ensure_open()?;
        self.elements.lock().await.clear();
        match self.page.reload().await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.classify(e.to_string(), RemoteUiError::Navigation).await),
        }
    }

    async fn close(&self) -> Result<(), RemoteUiError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.elements.lock().await.clear();

        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser cleanly: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("Failed waiting for browser exit: {}", e);
            }
        }
        self.handler.abort();

        if let Some(profile) = self.profile.lock().await.take() {
            let path = profile.path().display().to_string();
            match tokio::task::spawn_blocking(move || profile.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to clean up profile directory {}: {}", path, e),
                Err(e) => warn!("Profile cleanup task failed: {}", e),
            }
        }
        info!("Browser session closed");
        Ok(())
    }
}

/// Fresh per-session profile under `root`, or the system temp dir
async fn create_profile_dir(root: Option<String>) -> Result<TempDir, RemoteUiError> {
    let created = tokio::task::spawn_blocking(move || {
        let root = root.map(PathBuf::from).unwrap_or_else(std::env::temp_dir);
        tempfile::Builder::new()
            .prefix(&format!("asba_autopilot_{}_", std::process::id()))
            .tempdir_in(root)
    })
    .await
    .map_err(|e| RemoteUiError::Launch(format!("profile directory: {}", e)))?;
    created.map_err(|e| RemoteUiError::Launch(format!("profile directory: {}", e)))
}

fn lookup(elements: &HashMap<u64, Element>, handle: ElementHandle) -> Result<&Element, RemoteUiError> {
    elements
        .get(&handle.0)
        .ok_or(RemoteUiError::StaleElement(handle.0))
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_launch_leaves_no_profile_behind() {
        let root = tempfile::tempdir().unwrap();
        let settings = BrowserSettings {
            executable: Some("/nonexistent/chromium".to_string()),
            profile_root: Some(root.path().display().to_string()),
            ..Default::default()
        };

        let result = ChromiumSession::launch(&settings).await;

        assert!(matches!(result, Err(RemoteUiError::Launch(_))));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_profile_dir_is_created_under_root() {
        let root = tempfile::tempdir().unwrap();
        let profile = create_profile_dir(Some(root.path().display().to_string()))
            .await
            .unwrap();

        assert!(profile.path().starts_with(root.path()));
        let name = profile.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("asba_autopilot_"));
    }
}
