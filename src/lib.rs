// ASBA Autopilot Library - IPO application automation for brokerage portals
// This exposes the core components for testing and integration

pub mod accounts;
pub mod config;
pub mod notify;
pub mod observability;
pub mod portal;
pub mod remote;
pub mod retry;
pub mod shutdown;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use accounts::{CredentialError, CredentialSource, EnvCredentialSource, UserCredentialSet};
pub use config::AsbaConfig;
pub use notify::{LogSink, NotificationSink, NotifyError, TelegramSink};
pub use observability::{OperationTimer, WorkflowMetrics};
pub use portal::{DriverPolicies, PortalDriver, PortalDriverFactory, PortalProfile};
pub use remote::{ElementHandle, ElementSpec, RemoteUi, RemoteUiError, SessionFactory};
pub use retry::{RetryError, RetryExecutor, RetryPolicy};
pub use shutdown::{InterruptAction, ShutdownSignal};
pub use telemetry::{create_account_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use workflow::{
    FinalStatus, MultiAccountRunner, RunReport, Stage, StageDriver, StageError, WorkflowCoordinator,
    WorkflowState,
};
