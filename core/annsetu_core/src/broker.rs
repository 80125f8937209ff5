//! # RequestBroker
//!
//! Reserves a donation for a receiver and hands back the drop code. The
//! receiver binding is write-once and applied through the registry's
//! compare-and-swap; reservation alone never moves the status.

use tracing::info;

use crate::errors::{Error, Result};
use crate::events::EventKind;
use crate::registry::DonationRegistry;
use crate::types::{ActorId, Donation, DonationId, DonationStatus, Mutation, Otp, Reservation};

/// Re-reads allowed when the status moves underneath a reservation attempt.
const MAX_RESERVE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct RequestBroker {
    registry: DonationRegistry,
}

impl RequestBroker {
    pub fn new(registry: DonationRegistry) -> Self {
        Self { registry }
    }

    /// Reserve `donation_id` for `receiver_id` and return its drop code.
    ///
    /// A repeat request by the bound receiver returns the same code. Any
    /// other receiver gets [`Error::ResourceAlreadyReserved`].
    pub async fn request_food(
        &self,
        donation_id: DonationId,
        receiver_id: &ActorId,
        drop_location: Option<String>,
    ) -> Result<Otp> {
        if receiver_id.trim().is_empty() {
            return Err(Error::Validation("receiver_id is required".into()));
        }
        let drop_location = drop_location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.registry.get(donation_id).await?;
            if let Some(code) = existing_reservation(&current, receiver_id)? {
                return Ok(code);
            }
            if !matches!(current.status, DonationStatus::Pending | DonationStatus::Assigned) {
                return Err(Error::InvalidTransition {
                    id: donation_id,
                    from: current.status,
                    action: "reserve",
                });
            }

            let reservation = Reservation {
                receiver_id: receiver_id.clone(),
                drop_location: drop_location.clone(),
            };
            let mutation = Mutation::reserve(current.status, reservation);

            match self.registry.apply(donation_id, current.status, &mutation).await {
                Ok(reserved) => {
                    info!(donation_id, receiver_id = %receiver_id, "donation reserved");
                    self.registry
                        .emit_for(&reserved, EventKind::Reserved, Some(receiver_id))
                        .await;
                    return Ok(reserved.drop_otp);
                }
                // Lost to a concurrent reservation or the status moved
                // underneath us; the next read either returns our own code,
                // reports the other holder or retries against the new status.
                Err(e) if e.is_contention() && attempt < MAX_RESERVE_ATTEMPTS => {}
                Err(e) => return Err(e),
            }
        }
    }
}

/// The drop code if `receiver_id` already holds the reservation, an error if
/// someone else does, `None` if the donation is unreserved.
fn existing_reservation(donation: &Donation, receiver_id: &ActorId) -> Result<Option<Otp>> {
    match &donation.receiver_id {
        Some(bound) if bound == receiver_id && !donation.status.is_terminal() => {
            Ok(Some(donation.drop_otp))
        }
        Some(bound) if bound == receiver_id => Err(Error::InvalidTransition {
            id: donation.id,
            from: donation.status,
            action: "reserve",
        }),
        Some(_) => Err(Error::ResourceAlreadyReserved(donation.id)),
        None => Ok(None),
    }
}
