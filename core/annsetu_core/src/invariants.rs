#![allow(dead_code)]

use std::collections::HashSet;

use crate::events::DonationEvent;
use crate::types::{Donation, DonationStatus};

/// INV-1: Codes are 4 digits and the two codes of one donation differ.
pub fn assert_codes_well_formed(donation: &Donation) {
    for code in [donation.pickup_otp, donation.drop_otp] {
        assert_eq!(
            code.to_string().len(),
            4,
            "INV-1 violated: donation {} has code {code}",
            donation.id
        );
    }
    assert_ne!(
        donation.pickup_otp, donation.drop_otp,
        "INV-1 violated: donation {} reuses its pickup code for drop",
        donation.id
    );
}

/// INV-2: No code is shared between two live donations.
pub fn assert_live_codes_unique(donations: &[Donation]) {
    let mut seen = HashSet::new();
    for d in donations.iter().filter(|d| !d.status.is_terminal()) {
        for code in [d.pickup_otp, d.drop_otp] {
            assert!(
                seen.insert(code),
                "INV-2 violated: code {code} is live on more than one donation (latest {})",
                d.id
            );
        }
    }
}

/// INV-3: Status transition validity. Only lifecycle edges are allowed:
///   Pending  -> Assigned | Cancelled
///   Assigned -> PickedUp | Cancelled
///   PickedUp -> Delivered
///   Delivered, Cancelled -> (none)
pub fn assert_valid_status_transition(from: DonationStatus, to: DonationStatus) {
    assert!(
        from.can_transition_to(to),
        "INV-3 violated: invalid status transition from {from} to {to}"
    );
}

/// INV-4: An observed status history is a prefix of one of
/// pending→assigned→picked_up→delivered, pending→cancelled or
/// pending→assigned→cancelled.
pub fn assert_valid_status_sequence(statuses: &[DonationStatus]) {
    use DonationStatus::*;
    const PATHS: [&[DonationStatus]; 3] = [
        &[Pending, Assigned, PickedUp, Delivered],
        &[Pending, Cancelled],
        &[Pending, Assigned, Cancelled],
    ];
    assert!(
        PATHS.iter().any(|path| path.starts_with(statuses)),
        "INV-4 violated: status history {statuses:?} is not a lifecycle path"
    );
}

/// INV-4 over the published event stream of one donation.
pub fn assert_event_history_valid(events: &[DonationEvent]) {
    let mut statuses: Vec<DonationStatus> = Vec::new();
    for e in events {
        // Reservations leave the status where it was.
        if statuses.last() != Some(&e.status) {
            statuses.push(e.status);
        }
    }
    assert_valid_status_sequence(&statuses);
}

/// INV-5: Volunteer and receiver bindings never change once set.
pub fn assert_bindings_write_once(before: &Donation, after: &Donation) {
    if before.volunteer_id.is_some() {
        assert_eq!(
            before.volunteer_id, after.volunteer_id,
            "INV-5 violated: donation {} volunteer rebound",
            before.id
        );
    }
    if before.receiver_id.is_some() {
        assert_eq!(
            before.receiver_id, after.receiver_id,
            "INV-5 violated: donation {} receiver rebound",
            before.id
        );
    }
}

/// INV-6: Fields fixed at creation stay fixed.
pub fn assert_immutable_fields(original: &Donation, current: &Donation) {
    assert_eq!(original.id, current.id, "INV-6 violated: id changed");
    assert_eq!(original.donor_id, current.donor_id, "INV-6 violated: donor changed");
    assert_eq!(original.food_type, current.food_type, "INV-6 violated: food_type changed");
    assert_eq!(original.quantity, current.quantity, "INV-6 violated: quantity changed");
    assert_eq!(
        original.pickup_location, current.pickup_location,
        "INV-6 violated: pickup_location changed"
    );
    assert_eq!(original.pickup_otp, current.pickup_otp, "INV-6 violated: pickup code changed");
    assert_eq!(original.drop_otp, current.drop_otp, "INV-6 violated: drop code changed");
    assert_eq!(original.created_at, current.created_at, "INV-6 violated: created_at changed");
}

/// INV-7: Statuses past pending carry a volunteer.
pub fn assert_progress_has_volunteer(donation: &Donation) {
    if matches!(
        donation.status,
        DonationStatus::Assigned | DonationStatus::PickedUp | DonationStatus::Delivered
    ) {
        assert!(
            donation.volunteer_id.is_some(),
            "INV-7 violated: donation {} is {} without a volunteer",
            donation.id,
            donation.status
        );
    }
}

/// Run all stateless donation invariants.
pub fn assert_all_donation_invariants(donation: &Donation) {
    assert_codes_well_formed(donation);
    assert_progress_has_volunteer(donation);
}
