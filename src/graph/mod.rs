//! Outbound Graph API boundary
//!
//! Two calls leave the process: an identity lookup used to validate a credential
//! before a run, and a comment post used to deliver one message. Both are
//! expressed as traits so the task runner can be driven by the reqwest client
//! ([`GraphClient`]) in production and by the scripted fake in `mock` in tests
//! (built only for unit tests or with the `test-utils` feature).
//!
//! Neither call retries. Rotating to a different credential after a failed
//! delivery is the runner's job.

mod classify;
mod http;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
mod types;

pub use classify::{CODE_TOKEN_EXPIRED, CODES_PERMISSION_DENIED, classify_delivery, classify_identity};
pub use http::{GraphClient, GraphError, HttpConfig};
pub use types::{
    Credential, DeliveryOutcome, GraphErrorBody, GraphErrorEnvelope, Identity, ValidationFailure,
};

use async_trait::async_trait;

/// Checks a single credential against the external service
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// Resolve the account behind `credential`. Transport failures, error
    /// responses and malformed bodies all come back as `Err`, never as a panic.
    async fn validate(&self, credential: &Credential) -> Result<Identity, ValidationFailure>;
}

/// Posts one message to a target with one credential
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn deliver(&self, credential: &Credential, target_id: &str, message: &str) -> DeliveryOutcome;
}
