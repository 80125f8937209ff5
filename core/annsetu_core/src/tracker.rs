//! # DeliveryTaskTracker
//!
//! Read-only projection of a volunteer's donations into task views. Nothing
//! here is stored; every call re-reads the registry.

use crate::errors::Result;
use crate::registry::DonationRegistry;
use crate::types::{
    ActorId, DeliveryTask, Donation, DonationFilter, DonationStatus, OtpPhase, OtpRef,
};

#[derive(Clone)]
pub struct DeliveryTaskTracker {
    registry: DonationRegistry,
}

impl DeliveryTaskTracker {
    pub fn new(registry: DonationRegistry) -> Self {
        Self { registry }
    }

    /// Tasks for `volunteer_id`, newest donation first.
    pub async fn list_tasks_for(&self, volunteer_id: &ActorId) -> Result<Vec<DeliveryTask>> {
        let filter = DonationFilter {
            volunteer_id: Some(volunteer_id.clone()),
            statuses: Some(DonationStatus::TASK.to_vec()),
            ..DonationFilter::default()
        };
        Ok(self.registry.list(&filter).await?.map(project).collect())
    }
}

fn project(donation: Donation) -> DeliveryTask {
    let picked_up = matches!(
        donation.status,
        DonationStatus::PickedUp | DonationStatus::Delivered
    );
    DeliveryTask {
        id: format!("task-{}", donation.id),
        donation_id: donation.id,
        food_details: donation.food_details(),
        pickup_location: donation.pickup_location,
        drop_location: donation.drop_location,
        status: donation.status,
        pickup_otp: OtpRef {
            phase: OtpPhase::Pickup,
            verified: picked_up,
        },
        drop_otp: OtpRef {
            phase: OtpPhase::Drop,
            verified: donation.status == DonationStatus::Delivered,
        },
    }
}
