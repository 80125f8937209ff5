//! # MatchingService
//!
//! Binds a volunteer to a pending donation. The status move and the
//! volunteer binding go through one compare-and-swap, so concurrent callers
//! racing on the same donation produce exactly one winner.

use tracing::info;

use crate::errors::{Error, Result};
use crate::events::EventKind;
use crate::registry::DonationRegistry;
use crate::types::{ActorId, Donation, DonationId, DonationStatus, Mutation};

#[derive(Clone)]
pub struct MatchingService {
    registry: DonationRegistry,
}

impl MatchingService {
    pub fn new(registry: DonationRegistry) -> Self {
        Self { registry }
    }

    /// Assign `volunteer_id` to a pending donation.
    ///
    /// Losing a race to another volunteer yields [`Error::AlreadyAssigned`];
    /// the loser leaves no trace on the record.
    pub async fn assign(&self, donation_id: DonationId, volunteer_id: &ActorId) -> Result<Donation> {
        if volunteer_id.trim().is_empty() {
            return Err(Error::Validation("volunteer_id is required".into()));
        }

        let current = self.registry.get(donation_id).await?;
        if current.volunteer_id.is_some() {
            return Err(Error::AlreadyAssigned(donation_id));
        }
        if current.status != DonationStatus::Pending {
            return Err(Error::InvalidTransition {
                id: donation_id,
                from: current.status,
                action: "assign",
            });
        }

        let assigned = self
            .registry
            .apply(
                donation_id,
                DonationStatus::Pending,
                &Mutation::assign(volunteer_id.clone()),
            )
            .await
            .map_err(|e| match e {
                // Pending -> Assigned is the only way out of Pending that
                // keeps the donation live, so a lost swap to Assigned means
                // another volunteer won.
                Error::Conflict {
                    actual: DonationStatus::Assigned | DonationStatus::PickedUp | DonationStatus::Delivered,
                    ..
                } => Error::AlreadyAssigned(donation_id),
                Error::Conflict { actual, .. } => Error::InvalidTransition {
                    id: donation_id,
                    from: actual,
                    action: "assign",
                },
                other => other,
            })?;

        info!(donation_id, volunteer_id = %volunteer_id, "volunteer assigned");
        self.registry
            .emit_for(&assigned, EventKind::Assigned, Some(volunteer_id))
            .await;
        Ok(assigned)
    }
}
