use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::db::{KeyValueStore, StoreError};

/// Lifetime of an outstanding one-time passcode.
pub const OTP_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("OTP expired or not found")]
    NotFound,
    #[error("invalid OTP")]
    Mismatch,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of `OtpService::issue`. `code` is only present when a new record was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpIssue {
    pub created: bool,
    pub code: Option<String>,
}

/// One-time passcodes keyed by email: at most one live code per address.
#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl OtpService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store, ttl: OTP_TTL }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Writes a fresh code unless one is already outstanding for `email`.
    pub async fn issue(&self, email: &str) -> Result<OtpIssue, OtpError> {
        let code = generate_code();
        let created = self.store.set_nx_ex(&key(email), &code, self.ttl).await?;
        Ok(OtpIssue {
            created,
            code: created.then_some(code),
        })
    }

    /// Consumes the outstanding code for `email` if `candidate` matches it exactly.
    pub async fn verify(&self, email: &str, candidate: &str) -> Result<(), OtpError> {
        let key = key(email);
        let stored = self.store.get(&key).await?.ok_or(OtpError::NotFound)?;
        if stored != candidate {
            return Err(OtpError::Mismatch);
        }
        // Whoever deletes the record owns the code; a concurrent verifier loses.
        if !self.store.del(&key).await? {
            return Err(OtpError::NotFound);
        }
        Ok(())
    }

    /// Drops the outstanding code for `email`, e.g. when it could not be delivered.
    pub async fn revoke(&self, email: &str) -> Result<(), OtpError> {
        self.store.del(&key(email)).await?;
        Ok(())
    }
}

fn key(email: &str) -> String {
    format!("otp:{email}")
}

/// Uniformly random code in 100000..=999999, rendered fixed-width.
pub fn generate_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(100_000..=999_999);
    format!("{code:06}")
}
