// Stage driver - the per-stage capabilities the coordinator relies on

use async_trait::async_trait;

use super::errors::StageError;
use super::types::{Confirmation, Detection, EligibilityFacts, OpportunityDetails, OpportunityFilter, Stage};
use crate::accounts::UserCredentialSet;

/// One method per stage. Implementations own a single remote session.
#[async_trait]
pub trait StageDriver: Send + Sync {
    async fn login(&self, account: &UserCredentialSet) -> Result<(), StageError>;

    async fn open_listing(&self) -> Result<(), StageError>;

    async fn detect_opportunity(&self, filter: &OpportunityFilter) -> Result<Detection, StageError>;

    async fn read_eligibility(&self, opportunity: &OpportunityDetails) -> Result<EligibilityFacts, StageError>;

    async fn submit_application(&self, account: &UserCredentialSet) -> Result<(), StageError>;

    async fn confirm_outcome(&self) -> Result<Confirmation, StageError>;

    async fn is_session_active(&self) -> bool;

    /// Bring the session back to a state where `stage` can be retried
    async fn recover(&self, stage: Stage) -> Result<(), StageError>;

    async fn close(&self);
}

/// Opens an isolated driver for one account
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(&self, account: &UserCredentialSet) -> Result<Box<dyn StageDriver>, StageError>;
}
