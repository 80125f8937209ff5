//! Error taxonomy for the donation core.
//!
//! Every operation either applies its change completely or leaves the
//! donation exactly as it found it, so any of these can be retried once the
//! triggering condition is fixed.

use thiserror::Error;

use crate::types::{DonationId, DonationStatus};

/// Failure reported by a [`crate::storage::Storage`] backend.
#[derive(Debug, Error)]
#[error("storage backend error: {0}")]
pub struct StorageError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl StorageError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(err))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("donation {0} not found")]
    NotFound(DonationId),

    #[error("cannot {action} donation {id} while it is {from}")]
    InvalidTransition {
        id: DonationId,
        from: DonationStatus,
        action: &'static str,
    },

    #[error("donation {id} changed concurrently: expected {expected}, found {actual}")]
    Conflict {
        id: DonationId,
        expected: DonationStatus,
        actual: DonationStatus,
    },

    #[error("donation {0} is already assigned to a volunteer")]
    AlreadyAssigned(DonationId),

    #[error("donation {0} is already reserved by another receiver")]
    ResourceAlreadyReserved(DonationId),

    #[error("invalid code for donation {0}")]
    InvalidOtp(DonationId),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("could not issue collision-free codes after {0} attempts")]
    OtpSpaceExhausted(usize),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    /// Losses that mean "someone else got there first".
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::AlreadyAssigned(_) | Self::ResourceAlreadyReserved(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
