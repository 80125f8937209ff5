//! # Role-based access control
//!
//! The core trusts the role claim supplied by the session layer and checks
//! it, together with ownership of the donation, inside every operation.
//!
//! | Role        | May                                                        |
//! |-------------|------------------------------------------------------------|
//! | `donor`     | create donations as self; cancel own; view own with codes  |
//! | `volunteer` | assign self; verify codes on own tasks; browse pending     |
//! | `receiver`  | request food as self; view own drop code; browse available |
//! | `admin`     | read everything and the dashboard totals, change nothing   |
//! | `warehouse` | nothing in this subsystem                                  |

use crate::errors::{Error, Result};
use crate::types::{Actor, ActorId, Donation, DonationFilter, DonationStatus, Role};

/// Statuses a receiver may browse without holding a reservation.
const AVAILABLE: [DonationStatus; 2] = [DonationStatus::Pending, DonationStatus::Assigned];

fn denied(actor: &Actor, action: &str) -> Error {
    Error::Unauthorized(format!("{:?} `{}` may not {action}", actor.role, actor.id))
}

/// `actor` must hold `role` and act on their own behalf (`subject`).
pub fn require_self(actor: &Actor, role: Role, subject: &ActorId, action: &str) -> Result<()> {
    if actor.role != role || &actor.id != subject {
        return Err(denied(actor, action));
    }
    Ok(())
}

/// `actor` must be the donor who created `donation`.
pub fn require_donor_of(actor: &Actor, donation: &Donation, action: &str) -> Result<()> {
    require_self(actor, Role::Donor, &donation.donor_id, action)
}

/// `actor` must be the volunteer bound to `donation`.
pub fn require_volunteer_of(actor: &Actor, donation: &Donation, action: &str) -> Result<()> {
    if actor.role != Role::Volunteer || !actor.is(donation.volunteer_id.as_ref()) {
        return Err(denied(actor, action));
    }
    Ok(())
}

pub fn require_admin(actor: &Actor, action: &str) -> Result<()> {
    if actor.role != Role::Admin {
        return Err(denied(actor, action));
    }
    Ok(())
}

/// The volunteer themself, or an admin reading on their behalf.
pub fn require_self_or_admin(actor: &Actor, role: Role, subject: &ActorId, action: &str) -> Result<()> {
    if actor.role == Role::Admin {
        return Ok(());
    }
    require_self(actor, role, subject, action)
}

pub fn can_view(actor: &Actor, donation: &Donation) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Donor => actor.id == donation.donor_id,
        Role::Volunteer => {
            donation.status == DonationStatus::Pending || actor.is(donation.volunteer_id.as_ref())
        }
        Role::Receiver => {
            AVAILABLE.contains(&donation.status) || actor.is(donation.receiver_id.as_ref())
        }
        Role::Warehouse => false,
    }
}

/// Narrow `filter` to what `actor` may see.
pub fn scope_listing(actor: &Actor, mut filter: DonationFilter) -> Result<DonationFilter> {
    match actor.role {
        Role::Admin => Ok(filter),
        Role::Donor => {
            if filter.donor_id.as_ref().is_some_and(|d| d != &actor.id) {
                return Err(denied(actor, "list another donor's donations"));
            }
            filter.donor_id = Some(actor.id.clone());
            Ok(filter)
        }
        Role::Volunteer => {
            if actor.is(filter.volunteer_id.as_ref()) {
                return Ok(filter);
            }
            filter.volunteer_id = None;
            filter.statuses = Some(intersect(filter.statuses, &[DonationStatus::Pending]));
            Ok(filter)
        }
        Role::Receiver => {
            if actor.is(filter.receiver_id.as_ref()) {
                return Ok(filter);
            }
            filter.receiver_id = None;
            filter.statuses = Some(intersect(filter.statuses, &AVAILABLE));
            Ok(filter)
        }
        Role::Warehouse => Err(denied(actor, "list donations")),
    }
}

fn intersect(requested: Option<Vec<DonationStatus>>, allowed: &[DonationStatus]) -> Vec<DonationStatus> {
    match requested {
        Some(requested) => requested.into_iter().filter(|s| allowed.contains(s)).collect(),
        None => allowed.to_vec(),
    }
}
