//! # Storage
//!
//! The persistence contract the core depends on, plus an in-memory backend.
//!
//! | Operation          | Semantics                                               |
//! |--------------------|---------------------------------------------------------|
//! | `create_record`    | Insert a draft unless either code is live elsewhere     |
//! | `read_by_id`       | Point read; `None` when the id is unknown               |
//! | `list_by_filter`   | All matches, newest `created_at` first                  |
//! | `compare_and_swap` | Apply a [`Mutation`] only if status and guards match,   |
//! |                    | returning the record exactly as that write left it     |
//!
//! ## Atomicity
//!
//! `compare_and_swap` is the single serialization point per donation. The
//! status check, the write-once guards and the write must happen as one step;
//! a read followed by a separate write is not an acceptable implementation.
//! `create_record` likewise checks for live code collisions in the same step
//! as the insert.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::errors::StorageError;
use crate::types::{Donation, DonationDraft, DonationFilter, DonationId, DonationStatus, Mutation};

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert `draft` and return its new id, or `None` if one of its codes is
    /// already held by a donation that is not delivered or cancelled.
    async fn create_record(&self, draft: DonationDraft) -> StorageResult<Option<DonationId>>;

    async fn read_by_id(&self, id: DonationId) -> StorageResult<Option<Donation>>;

    async fn list_by_filter(&self, filter: &DonationFilter) -> StorageResult<Vec<Donation>>;

    /// The updated record if the mutation was applied, `None` otherwise.
    ///
    /// The returned record must come from the same atomic step as the write,
    /// never from a later read.
    async fn compare_and_swap(
        &self,
        id: DonationId,
        expected: DonationStatus,
        mutation: &Mutation,
    ) -> StorageResult<Option<Donation>>;
}

// ── In-memory backend ────────────────────────────────────────────────

#[derive(Default)]
struct Records {
    next_id: DonationId,
    donations: BTreeMap<DonationId, Donation>,
}

/// Process-local storage guarded by a single lock.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Records>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_record(&self, draft: DonationDraft) -> StorageResult<Option<DonationId>> {
        let mut records = self.inner.write();

        let codes = [draft.pickup_otp, draft.drop_otp];
        let collides = records
            .donations
            .values()
            .filter(|d| !d.status.is_terminal())
            .any(|d| codes.contains(&d.pickup_otp) || codes.contains(&d.drop_otp));
        if collides {
            return Ok(None);
        }

        // Ids start at 1 so that 0 is never a valid donation id.
        records.next_id += 1;
        let id = records.next_id;
        records.donations.insert(id, draft.into_donation(id));
        Ok(Some(id))
    }

    async fn read_by_id(&self, id: DonationId) -> StorageResult<Option<Donation>> {
        Ok(self.inner.read().donations.get(&id).cloned())
    }

    async fn list_by_filter(&self, filter: &DonationFilter) -> StorageResult<Vec<Donation>> {
        let records = self.inner.read();
        let mut matches: Vec<Donation> = records
            .donations
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matches)
    }

    async fn compare_and_swap(
        &self,
        id: DonationId,
        expected: DonationStatus,
        mutation: &Mutation,
    ) -> StorageResult<Option<Donation>> {
        let mut records = self.inner.write();
        let Some(donation) = records.donations.get_mut(&id) else {
            return Ok(None);
        };
        if donation.status != expected || !mutation.guards_hold(donation) {
            return Ok(None);
        }
        mutation.apply_to(donation);
        Ok(Some(donation.clone()))
    }
}
