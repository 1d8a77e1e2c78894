// Remote UI capabilities - the only way the workflow touches the portal

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::RemoteUiError;

#[cfg(test)]
use mockall::automock;

/// A named element description: candidate CSS selectors tried in order,
/// optionally narrowed to elements whose text contains `text`
/// (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementSpec {
    pub name: String,
    pub selectors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ElementSpec {
    pub fn new<I, S>(name: &str, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            selectors: selectors.into_iter().map(Into::into).collect(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Whether `candidate` satisfies the text filter
    pub fn text_matches(&self, candidate: &str) -> bool {
        match &self.text {
            Some(wanted) => candidate.to_lowercase().contains(&wanted.to_lowercase()),
            None => true,
        }
    }
}

/// Opaque reference to an element found in the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub u64);

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteUi: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), RemoteUiError>;

    /// First element matching `spec`, or `None` when nothing matches yet
    async fn find_element(&self, spec: &ElementSpec) -> Result<Option<ElementHandle>, RemoteUiError>;

    async fn read_text(&self, element: ElementHandle) -> Result<String, RemoteUiError>;

    async fn click(&self, element: ElementHandle) -> Result<(), RemoteUiError>;

    /// Type into an input, or pick the option whose label contains `value`
    /// when the element is a select
    async fn fill_field(&self, element: ElementHandle, value: &str) -> Result<(), RemoteUiError>;

    async fn current_url(&self) -> Result<String, RemoteUiError>;

    async fn is_session_active(&self) -> bool;

    async fn reload(&self) -> Result<(), RemoteUiError>;

    async fn close(&self) -> Result<(), RemoteUiError>;
}

#[async_trait]
impl<T: RemoteUi + ?Sized> RemoteUi for Box<T> {
    async fn navigate(&self, url: &str) -> Result<(), RemoteUiError> {
        (**self).navigate(url).await
    }

    async fn find_element(&self, spec: &ElementSpec) -> Result<Option<ElementHandle>, RemoteUiError> {
        (**self).find_element(spec).await
    }

    async fn read_text(&self, element: ElementHandle) -> Result<String, RemoteUiError> {
        (**self).read_text(element).await
    }

    async fn click(&self, element: ElementHandle) -> Result<(), RemoteUiError> {
        (**self).click(element).await
    }

    async fn fill_field(&self, element: ElementHandle, value: &str) -> Result<(), RemoteUiError> {
        (**self).fill_field(element, value).await
    }

    async fn current_url(&self) -> Result<String, RemoteUiError> {
        (**self).current_url().await
    }

    async fn is_session_active(&self) -> bool {
        (**self).is_session_active().await
    }

    async fn reload(&self) -> Result<(), RemoteUiError> {
        (**self).reload().await
    }

    async fn close(&self) -> Result<(), RemoteUiError> {
        (**self).close().await
    }
}

/// Opens a fresh, isolated session (no shared cookies or storage)
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn RemoteUi>, RemoteUiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_filter_is_case_insensitive() {
        let spec = ElementSpec::new("row", ["tr"]).with_text("Ordinary Shares");
        assert!(spec.text_matches("ABC Hydro (ABC) ORDINARY SHARES Apply"));
        assert!(!spec.text_matches("ABC Debenture"));
        assert!(ElementSpec::new("body", ["body"]).text_matches("anything"));
    }

    #[tokio::test]
    async fn test_boxed_ui_delegates() {
        let mut mock = MockRemoteUi::new();
        mock.expect_current_url()
            .returning(|| Ok("https://portal/#/dashboard".to_string()));
        mock.expect_is_session_active().return_const(true);

        let boxed: Box<dyn RemoteUi> = Box::new(mock);
        assert_eq!(boxed.current_url().await.unwrap(), "https://portal/#/dashboard");
        assert!(boxed.is_session_active().await);
    }
}
