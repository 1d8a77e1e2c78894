// Workflow - per-account stage machine and the multi-account run around it

pub mod coordinator;
pub mod driver;
pub mod eligibility;
pub mod errors;
pub mod report;
pub mod runner;
pub mod types;

pub use coordinator::{CoordinatorOptions, StagePolicies, WorkflowCoordinator};
pub use driver::{DriverFactory, StageDriver};
pub use eligibility::{EligibilityCriteria, EligibilityVerdict};
pub use errors::{ErrorClass, StageError};
pub use report::{AccountResult, RunFailure, RunReport};
pub use runner::{MultiAccountRunner, RunnerOptions};
pub use types::{
    Confirmation, Detection, EligibilityFacts, FinalStatus, OpportunityDetails,
    OpportunityFilter, Stage, StageRecord, WorkflowState,
};
