// Remote UI - abstract capabilities over a browser session

pub mod errors;
pub mod traits;

#[cfg(feature = "chromium")]
pub mod chromium;

pub use errors::RemoteUiError;
pub use traits::{ElementHandle, ElementSpec, RemoteUi, SessionFactory};

#[cfg(test)]
pub use traits::MockRemoteUi;

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumSession, ChromiumSessionFactory};
