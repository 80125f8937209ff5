//! # AnnSetu Donation Core
//!
//! State machine for a food donation's lifecycle: creation, volunteer
//! matching, receiver reservation and the two-phase handoff gated by one-time
//! codes. [`DonationService`] exposes the operations consumed by UI/API layers:
//!
//! | Phase        | Entry Point(s)                                        |
//! |--------------|-------------------------------------------------------|
//! | Offer        | [`DonationService::create_donation`]                  |
//! | Withdrawal   | [`DonationService::cancel_donation`]                  |
//! | Matching     | [`DonationService::assign_volunteer`]                 |
//! | Reservation  | [`DonationService::request_food`]                     |
//! | Handoff      | `verify_pickup_otp`, `verify_drop_otp`                |
//! | Queries      | `get_donation`, `list_donations`, `list_delivery_tasks` |
//! | Dashboard    | [`DonationService::stats`]                            |
//! | Maintenance  | [`DonationService::expire_overdue`]                   |
//!
//! ## Architecture
//!
//! Authorization is fully delegated to [`rbac`]. State changes are fully
//! delegated to the components ([`registry`], [`matching`], [`broker`],
//! [`guard`], [`tracker`]), which in turn mutate only through the registry's
//! compare-and-swap over a [`storage::Storage`] backend. This file contains
//! the public entry points and nothing else.
//!
//! ```text
//! Pending ──assign──► Assigned ──pickup code──► PickedUp ──drop code──► Delivered
//!    │                   │
//!    └──────cancel───────┴──► Cancelled
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub mod broker;
pub mod errors;
pub mod events;
pub mod expiry;
pub mod guard;
pub mod matching;
pub mod otp;
pub mod rbac;
pub mod registry;
pub mod storage;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_concurrency;
#[cfg(test)]
mod test_lifecycle;

pub use broker::RequestBroker;
pub use errors::{Error, Result, StorageError};
pub use events::{DonationEvent, EventKind, EventSink};
pub use guard::OtpGuard;
pub use matching::MatchingService;
pub use registry::DonationRegistry;
pub use storage::{MemoryStorage, Storage};
pub use tracker::DeliveryTaskTracker;
pub use types::{
    Actor, ActorId, DeliveryTask, Donation, DonationFilter, DonationId, DonationStats,
    DonationStatus, DonationView, NewDonation, Otp, Role,
};

use crate::otp::CodeSource;

#[derive(Clone)]
pub struct DonationService {
    registry: DonationRegistry,
    matching: MatchingService,
    broker: RequestBroker,
    guard: OtpGuard,
    tracker: DeliveryTaskTracker,
}

impl DonationService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::from_registry(DonationRegistry::new(storage))
    }

    /// Build every component around one shared registry.
    pub fn from_registry(registry: DonationRegistry) -> Self {
        Self {
            matching: MatchingService::new(registry.clone()),
            broker: RequestBroker::new(registry.clone()),
            guard: OtpGuard::new(registry.clone()),
            tracker: DeliveryTaskTracker::new(registry.clone()),
            registry,
        }
    }

    pub fn with_event_sink(self, events: Arc<dyn EventSink>) -> Self {
        Self::from_registry(self.registry.with_event_sink(events))
    }

    pub fn with_code_source(self, codes: Arc<dyn CodeSource>) -> Self {
        Self::from_registry(self.registry.with_code_source(codes))
    }

    pub fn registry(&self) -> &DonationRegistry {
        &self.registry
    }

    // ─────────────────────────────────────────────────────────
    // Donor
    // ─────────────────────────────────────────────────────────

    /// Offer a new donation. `input.donor_id` must be the calling donor.
    ///
    /// The returned record carries both codes; the donor hands the pickup
    /// code to the volunteer at collection.
    pub async fn create_donation(&self, actor: &Actor, input: NewDonation) -> Result<Donation> {
        registry::validate(&input)?;
        rbac::require_self(actor, Role::Donor, &input.donor_id, "create donations for another donor")?;
        self.registry.create(input).await
    }

    /// Withdraw a pending or assigned donation owned by the caller.
    pub async fn cancel_donation(&self, actor: &Actor, id: DonationId) -> Result<DonationView> {
        let current = self.registry.get(id).await?;
        rbac::require_donor_of(actor, &current, "cancel this donation")?;

        let cancelled = self
            .registry
            .transition(id, current.status, DonationStatus::Cancelled)
            .await?;
        self.registry
            .emit_for(&cancelled, EventKind::Cancelled, Some(&actor.id))
            .await;
        Ok(DonationView::for_actor(cancelled, actor))
    }

    // ─────────────────────────────────────────────────────────
    // Volunteer
    // ─────────────────────────────────────────────────────────

    /// Claim a pending donation for the calling volunteer.
    pub async fn assign_volunteer(
        &self,
        actor: &Actor,
        donation_id: DonationId,
        volunteer_id: &ActorId,
    ) -> Result<DonationView> {
        rbac::require_self(actor, Role::Volunteer, volunteer_id, "assign another volunteer")?;
        let assigned = self.matching.assign(donation_id, volunteer_id).await?;
        Ok(DonationView::for_actor(assigned, actor))
    }

    /// `Ok(false)` for a wrong, malformed or replayed code; the donation is
    /// unchanged in every such case.
    pub async fn verify_pickup_otp(&self, actor: &Actor, donation_id: DonationId, code: &str) -> Result<bool> {
        let current = self.registry.get(donation_id).await?;
        rbac::require_volunteer_of(actor, &current, "verify pickup for this donation")?;
        let Ok(code) = code.parse::<Otp>() else {
            return Ok(false);
        };
        verified(self.guard.verify_pickup(donation_id, code).await)
    }

    /// `Ok(false)` for a wrong, malformed or replayed code; the donation is
    /// unchanged in every such case.
    pub async fn verify_drop_otp(&self, actor: &Actor, donation_id: DonationId, code: &str) -> Result<bool> {
        let current = self.registry.get(donation_id).await?;
        rbac::require_volunteer_of(actor, &current, "verify drop for this donation")?;
        let Ok(code) = code.parse::<Otp>() else {
            return Ok(false);
        };
        verified(self.guard.verify_drop(donation_id, code).await)
    }

    pub async fn list_delivery_tasks(&self, actor: &Actor, volunteer_id: &ActorId) -> Result<Vec<DeliveryTask>> {
        rbac::require_self_or_admin(actor, Role::Volunteer, volunteer_id, "view another volunteer's tasks")?;
        self.tracker.list_tasks_for(volunteer_id).await
    }

    // ─────────────────────────────────────────────────────────
    // Receiver
    // ─────────────────────────────────────────────────────────

    /// Reserve a donation for the calling receiver and return the drop code.
    pub async fn request_food(
        &self,
        actor: &Actor,
        donation_id: DonationId,
        receiver_id: &ActorId,
        drop_location: Option<String>,
    ) -> Result<Otp> {
        rbac::require_self(actor, Role::Receiver, receiver_id, "request food for another receiver")?;
        self.broker
            .request_food(donation_id, receiver_id, drop_location)
            .await
    }

    // ─────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────

    pub async fn get_donation(&self, actor: &Actor, id: DonationId) -> Result<DonationView> {
        let donation = self.registry.get(id).await?;
        if !rbac::can_view(actor, &donation) {
            return Err(Error::Unauthorized(format!("donation {id} is not visible to `{}`", actor.id)));
        }
        Ok(DonationView::for_actor(donation, actor))
    }

    /// Donations matching `filter`, narrowed to what `actor` may see, newest
    /// first.
    pub async fn list_donations(&self, actor: &Actor, filter: DonationFilter) -> Result<Vec<DonationView>> {
        let filter = rbac::scope_listing(actor, filter)?;
        Ok(self
            .registry
            .list(&filter)
            .await?
            .map(|d| DonationView::for_actor(d, actor))
            .collect())
    }

    /// Totals for the admin dashboard.
    pub async fn stats(&self, actor: &Actor) -> Result<DonationStats> {
        rbac::require_admin(actor, "view donation statistics")?;
        let all = self.registry.list(&DonationFilter::default()).await?;
        Ok(DonationStats::tally(all))
    }

    // ─────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────

    /// Cancel claimable donations whose expiry has passed at `now`.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<DonationId>> {
        expiry::expire_overdue(&self.registry, now).await
    }
}

fn verified(outcome: Result<Donation>) -> Result<bool> {
    match outcome {
        Ok(_) => Ok(true),
        Err(Error::InvalidOtp(_) | Error::InvalidTransition { .. } | Error::Conflict { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}
