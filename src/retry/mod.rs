// Retry module - bounded retries with exponential backoff

pub mod executor;
pub mod policy;

pub use executor::{
    AttemptOutcome, AttemptTimedOut, NoopObserver, RetryError, RetryExecutor, RetryObserver,
};
pub use policy::RetryPolicy;
