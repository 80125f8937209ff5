//! # OtpGuard
//!
//! Verifies handoff codes and fires the matching transition:
//!
//! | Phase  | Required status | Code         | On match               |
//! |--------|-----------------|--------------|------------------------|
//! | Pickup | `assigned`      | `pickup_otp` | `assigned → picked_up` |
//! | Drop   | `picked_up`     | `drop_otp`   | `picked_up → delivered`|
//!
//! A mismatch never touches the record. Replaying a code after its phase has
//! fired fails because the required status no longer holds, and two
//! concurrent correct submissions race on the same compare-and-swap.

use tracing::{info, warn};

use crate::errors::{Error, Result};
use crate::events::EventKind;
use crate::registry::{action_for, DonationRegistry};
use crate::types::{Donation, DonationId, DonationStatus, Otp, OtpPhase};

#[derive(Clone)]
pub struct OtpGuard {
    registry: DonationRegistry,
}

impl OtpGuard {
    pub fn new(registry: DonationRegistry) -> Self {
        Self { registry }
    }

    pub async fn verify_pickup(&self, donation_id: DonationId, code: Otp) -> Result<Donation> {
        self.verify(donation_id, OtpPhase::Pickup, code).await
    }

    pub async fn verify_drop(&self, donation_id: DonationId, code: Otp) -> Result<Donation> {
        self.verify(donation_id, OtpPhase::Drop, code).await
    }

    async fn verify(&self, donation_id: DonationId, phase: OtpPhase, code: Otp) -> Result<Donation> {
        let (from, to, kind) = match phase {
            OtpPhase::Pickup => (DonationStatus::Assigned, DonationStatus::PickedUp, EventKind::PickedUp),
            OtpPhase::Drop => (DonationStatus::PickedUp, DonationStatus::Delivered, EventKind::Delivered),
        };

        let current = self.registry.get(donation_id).await?;
        if current.status != from {
            return Err(Error::InvalidTransition {
                id: donation_id,
                from: current.status,
                action: action_for(to),
            });
        }

        let expected = match phase {
            OtpPhase::Pickup => current.pickup_otp,
            OtpPhase::Drop => current.drop_otp,
        };
        if code != expected {
            warn!(donation_id, ?phase, "code mismatch");
            return Err(Error::InvalidOtp(donation_id));
        }

        let updated = self.registry.transition(donation_id, from, to).await?;
        info!(donation_id, ?phase, "handoff verified");
        self.registry
            .emit_for(&updated, kind, current.volunteer_id.as_ref())
            .await;
        Ok(updated)
    }
}
