// Portal - stage implementations for the ASBA brokerage portal

pub mod driver;
pub mod profile;

pub use driver::{DriverPolicies, PortalDriver, PortalDriverFactory};
pub use profile::{CompiledPatterns, PortalElements, PortalPatterns, PortalProfile};
