//! # DonationRegistry
//!
//! Source of truth for donation records. Owns creation (with collision-free
//! code issuance) and the compare-and-swap primitive every other component
//! mutates through.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::errors::{Error, Result};
use crate::events::{DonationEvent, EventKind, EventSink, LogEventSink};
use crate::otp::{CodeSource, OsCodeSource};
use crate::storage::Storage;
use crate::types::{
    ActorId, Donation, DonationDraft, DonationFilter, DonationId, DonationStatus, Mutation,
    NewDonation,
};

/// How many code pairs to draw before giving up on finding a free one.
pub const MAX_CODE_DRAWS: usize = 32;

/// Listing result, newest first.
///
/// The matching set is materialised by the storage backend in one query and
/// then handed out one record at a time; it is a snapshot, not a live cursor.
pub type DonationIter = std::vec::IntoIter<Donation>;

#[derive(Clone)]
pub struct DonationRegistry {
    storage: Arc<dyn Storage>,
    codes: Arc<dyn CodeSource>,
    events: Arc<dyn EventSink>,
}

impl DonationRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            codes: Arc::new(OsCodeSource),
            events: Arc::new(LogEventSink),
        }
    }

    pub fn with_code_source(mut self, codes: Arc<dyn CodeSource>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    // ─────────────────────────────────────────────────────────
    // Creation
    // ─────────────────────────────────────────────────────────

    /// Validate `input` and persist it as a pending donation with two fresh,
    /// distinct codes that no live donation currently holds.
    pub async fn create(&self, input: NewDonation) -> Result<Donation> {
        validate(&input)?;
        let food_type = input.food_type.trim().to_string();
        let quantity = input.quantity.trim().to_string();
        let pickup_location = input.pickup_location.trim().to_string();
        let donor_id = input.donor_id.trim().to_string();
        let expiry_time = input.expiry_time.trim().to_string();

        for attempt in 1..=MAX_CODE_DRAWS {
            let (pickup_otp, drop_otp) = self.codes.next_pair();
            let draft = DonationDraft {
                food_type: food_type.clone(),
                quantity: quantity.clone(),
                expiry_time: expiry_time.clone(),
                pickup_location: pickup_location.clone(),
                donor_id: donor_id.clone(),
                pickup_otp,
                drop_otp,
                created_at: Utc::now(),
            };

            match self.storage.create_record(draft.clone()).await? {
                Some(id) => {
                    let donation = draft.into_donation(id);
                    info!(donation_id = id, donor_id = %donation.donor_id, "donation created");
                    self.emit(DonationEvent::new(
                        id,
                        EventKind::Created,
                        DonationStatus::Pending,
                        Some(&donation.donor_id),
                    ))
                    .await;
                    return Ok(donation);
                }
                None => debug!(attempt, "code pair collided with a live donation; redrawing"),
            }
        }

        warn!("exhausted {MAX_CODE_DRAWS} code draws");
        Err(Error::OtpSpaceExhausted(MAX_CODE_DRAWS))
    }

    // ─────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────

    /// Move `id` from `expected` to `new`, atomically.
    ///
    /// Fails with [`Error::InvalidTransition`] if the edge is not part of the
    /// lifecycle and with [`Error::Conflict`] if the stored status is no longer
    /// `expected`.
    pub async fn transition(
        &self,
        id: DonationId,
        expected: DonationStatus,
        new: DonationStatus,
    ) -> Result<Donation> {
        if !expected.can_transition_to(new) {
            return Err(Error::InvalidTransition {
                id,
                from: expected,
                action: action_for(new),
            });
        }
        self.apply(id, expected, &Mutation::status(new)).await
    }

    /// Run the compare-and-swap and translate a lost swap into the precise
    /// reason by re-reading the record.
    ///
    /// On success the record is the one the swap itself produced, so later
    /// writes by other callers never leak into it.
    pub(crate) async fn apply(
        &self,
        id: DonationId,
        expected: DonationStatus,
        mutation: &Mutation,
    ) -> Result<Donation> {
        if let Some(updated) = self.storage.compare_and_swap(id, expected, mutation).await? {
            return Ok(updated);
        }

        let current = self.get(id).await?;
        if current.status != expected {
            warn!(donation_id = id, %expected, actual = %current.status, "lost compare-and-swap");
            return Err(Error::Conflict {
                id,
                expected,
                actual: current.status,
            });
        }
        if mutation.volunteer_id.is_some() && current.volunteer_id.is_some() {
            return Err(Error::AlreadyAssigned(id));
        }
        if mutation.reservation.is_some() && current.receiver_id.is_some() {
            return Err(Error::ResourceAlreadyReserved(id));
        }
        // Status and guards both hold now, so the record changed and changed
        // back between the swap and the re-read.
        Err(Error::Conflict {
            id,
            expected,
            actual: current.status,
        })
    }

    // ─────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────

    pub async fn get(&self, id: DonationId) -> Result<Donation> {
        self.storage
            .read_by_id(id)
            .await?
            .ok_or(Error::NotFound(id))
    }

    /// Snapshot of every donation matching `filter`, newest `created_at`
    /// first. Later writes are not reflected in an iterator already returned.
    pub async fn list(&self, filter: &DonationFilter) -> Result<DonationIter> {
        Ok(self.storage.list_by_filter(filter).await?.into_iter())
    }

    // ─────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────

    pub(crate) async fn emit(&self, event: DonationEvent) {
        let (id, kind) = (event.donation_id, event.kind);
        if let Err(e) = self.events.publish(event).await {
            warn!(donation_id = id, kind = kind.as_str(), "failed to publish event: {e}");
        }
    }

    pub(crate) async fn emit_for(&self, donation: &Donation, kind: EventKind, actor: Option<&ActorId>) {
        self.emit(DonationEvent::new(donation.id, kind, donation.status, actor))
            .await;
    }
}

/// Reject input with any required field missing or blank.
pub(crate) fn validate(input: &NewDonation) -> Result<()> {
    let required = [
        ("food_type", &input.food_type),
        ("quantity", &input.quantity),
        ("pickup_location", &input.pickup_location),
        ("donor_id", &input.donor_id),
    ];
    match required.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((field, _)) => Err(Error::Validation(format!("{field} is required"))),
        None => Ok(()),
    }
}

pub(crate) fn action_for(status: DonationStatus) -> &'static str {
    match status {
        DonationStatus::Pending => "reopen",
        DonationStatus::Assigned => "assign",
        DonationStatus::PickedUp => "pick up",
        DonationStatus::Delivered => "deliver",
        DonationStatus::Cancelled => "cancel",
    }
}
