//! # Types
//!
//! Shared data structures used across all modules of the donation core.
//!
//! ## Design decisions
//!
//! ### Draft / Record split
//!
//! A [`Donation`] is created in two steps:
//!
//! - [`NewDonation`]: the donor-supplied fields, validated by the registry.
//! - [`DonationDraft`]: the validated fields plus freshly issued codes and a
//!   creation timestamp, handed to storage which assigns the id.
//!
//! ### Status as a Finite-State Machine
//!
//! [`DonationStatus`] enforces a strict forward-only lifecycle:
//!
//! ```text
//! Pending ──► Assigned ──► PickedUp ──► Delivered
//!    │           │
//!    └───────────┴──► Cancelled
//! ```
//!
//! `Delivered` and `Cancelled` are terminal. Every other pair is rejected by
//! [`DonationStatus::can_transition_to`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Storage-assigned donation identifier.
pub type DonationId = u64;

/// Identifier of an authenticated actor (donor, volunteer, receiver, ...).
pub type ActorId = String;

// ─────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────

/// Lifecycle status of a donation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    /// Offered by a donor; no volunteer yet.
    Pending,
    /// A volunteer has claimed the pickup.
    Assigned,
    /// Pickup code verified; food is in transit.
    PickedUp,
    /// Drop code verified.
    Delivered,
    /// Withdrawn by the donor or expired.
    Cancelled,
}

impl DonationStatus {
    pub const ALL: [DonationStatus; 5] = [
        Self::Pending,
        Self::Assigned,
        Self::PickedUp,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Statuses whose codes count as "active" for collision checks.
    pub const LIVE: [DonationStatus; 3] = [Self::Pending, Self::Assigned, Self::PickedUp];

    /// Statuses that appear on a volunteer's task list.
    pub const TASK: [DonationStatus; 3] = [Self::Assigned, Self::PickedUp, Self::Delivered];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether `self -> to` is one of the legal lifecycle edges.
    pub fn can_transition_to(self, to: DonationStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Assigned)
                | (Self::Assigned, Self::PickedUp)
                | (Self::PickedUp, Self::Delivered)
                | (Self::Pending, Self::Cancelled)
                | (Self::Assigned, Self::Cancelled)
        )
    }

    /// Short identifier used in storage and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::PickedUp => "picked_up",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DonationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown donation status `{s}`")))
    }
}

// ─────────────────────────────────────────────────────────
// One-time codes
// ─────────────────────────────────────────────────────────

/// A 4-digit numeric one-time code.
///
/// Always in `1000..=9999`, so the textual form never has a leading zero.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Otp(u16);

impl Otp {
    pub const MIN: u16 = 1000;
    pub const MAX: u16 = 9999;

    pub fn new(value: u16) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Otp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Validation(format!("`{s}` is not a 4-digit code")));
        }
        s.parse::<u16>()
            .ok()
            .and_then(Otp::new)
            .ok_or_else(|| Error::Validation(format!("`{s}` is out of the code range")))
    }
}

impl TryFrom<String> for Otp {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Otp> for String {
    fn from(otp: Otp) -> Self {
        otp.to_string()
    }
}

/// Which handoff a code gates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPhase {
    Pickup,
    Drop,
}

// ─────────────────────────────────────────────────────────
// Donation records
// ─────────────────────────────────────────────────────────

/// Donor-supplied fields for a new donation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewDonation {
    pub food_type: String,
    pub quantity: String,
    /// Free text such as "6 hours"; see [`crate::expiry`].
    #[serde(default)]
    pub expiry_time: String,
    pub pickup_location: String,
    pub donor_id: ActorId,
}

/// Validated donation fields ready to be persisted; storage assigns the id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DonationDraft {
    pub food_type: String,
    pub quantity: String,
    pub expiry_time: String,
    pub pickup_location: String,
    pub donor_id: ActorId,
    pub pickup_otp: Otp,
    pub drop_otp: Otp,
    pub created_at: DateTime<Utc>,
}

impl DonationDraft {
    /// Materialise the stored record once storage has assigned `id`.
    pub fn into_donation(self, id: DonationId) -> Donation {
        Donation {
            id,
            food_type: self.food_type,
            quantity: self.quantity,
            expiry_time: self.expiry_time,
            pickup_location: self.pickup_location,
            status: DonationStatus::Pending,
            pickup_otp: self.pickup_otp,
            drop_otp: self.drop_otp,
            donor_id: self.donor_id,
            volunteer_id: None,
            receiver_id: None,
            drop_location: None,
            created_at: self.created_at,
        }
    }
}

/// A food-surplus record and its handoff state.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: DonationId,
    pub food_type: String,
    pub quantity: String,
    pub expiry_time: String,
    pub pickup_location: String,
    pub status: DonationStatus,
    pub pickup_otp: Otp,
    pub drop_otp: Otp,
    pub donor_id: ActorId,
    /// Write-once.
    pub volunteer_id: Option<ActorId>,
    /// Write-once.
    pub receiver_id: Option<ActorId>,
    /// Bound together with `receiver_id`.
    pub drop_location: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Donation {
    pub fn food_details(&self) -> String {
        format!("{} - {}", self.food_type, self.quantity)
    }
}

/// Receiver binding applied by a reservation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reservation {
    pub receiver_id: ActorId,
    pub drop_location: Option<String>,
}

/// The change a compare-and-swap applies when the stored status matches.
///
/// Bindings are write-once: storage must refuse the swap if the bound field is
/// already set, in the same atomic step as the status check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mutation {
    pub status: DonationStatus,
    pub volunteer_id: Option<ActorId>,
    pub reservation: Option<Reservation>,
}

impl Mutation {
    pub fn status(status: DonationStatus) -> Self {
        Self {
            status,
            volunteer_id: None,
            reservation: None,
        }
    }

    pub fn assign(volunteer_id: ActorId) -> Self {
        Self {
            status: DonationStatus::Assigned,
            volunteer_id: Some(volunteer_id),
            reservation: None,
        }
    }

    /// Bind a receiver without moving the status.
    pub fn reserve(current: DonationStatus, reservation: Reservation) -> Self {
        Self {
            status: current,
            volunteer_id: None,
            reservation: Some(reservation),
        }
    }

    /// Whether the write-once guards allow applying this to `donation`.
    pub fn guards_hold(&self, donation: &Donation) -> bool {
        (self.volunteer_id.is_none() || donation.volunteer_id.is_none())
            && (self.reservation.is_none() || donation.receiver_id.is_none())
    }

    /// Apply to an in-memory record. Callers check status and guards first.
    pub fn apply_to(&self, donation: &mut Donation) {
        donation.status = self.status;
        if let Some(volunteer_id) = &self.volunteer_id {
            donation.volunteer_id = Some(volunteer_id.clone());
        }
        if let Some(reservation) = &self.reservation {
            donation.receiver_id = Some(reservation.receiver_id.clone());
            donation.drop_location = reservation.drop_location.clone();
        }
    }
}

// ─────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────

/// Predicate for listing donations. Empty fields match everything.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DonationFilter {
    pub donor_id: Option<ActorId>,
    pub volunteer_id: Option<ActorId>,
    pub receiver_id: Option<ActorId>,
    pub statuses: Option<Vec<DonationStatus>>,
}

impl DonationFilter {
    pub fn by_donor(donor_id: impl Into<ActorId>) -> Self {
        Self {
            donor_id: Some(donor_id.into()),
            ..Self::default()
        }
    }

    pub fn by_status(statuses: &[DonationStatus]) -> Self {
        Self {
            statuses: Some(statuses.to_vec()),
            ..Self::default()
        }
    }

    pub fn matches(&self, donation: &Donation) -> bool {
        fn eq(want: &Option<ActorId>, have: Option<&ActorId>) -> bool {
            want.as_ref().map_or(true, |w| have == Some(w))
        }

        eq(&self.donor_id, Some(&donation.donor_id))
            && eq(&self.volunteer_id, donation.volunteer_id.as_ref())
            && eq(&self.receiver_id, donation.receiver_id.as_ref())
            && self
                .statuses
                .as_ref()
                .map_or(true, |s| s.contains(&donation.status))
    }
}

// ─────────────────────────────────────────────────────────
// Actors
// ─────────────────────────────────────────────────────────

/// Role claim supplied by the external auth/session layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Donor,
    Volunteer,
    Warehouse,
    Receiver,
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "donor" => Ok(Self::Donor),
            "volunteer" => Ok(Self::Volunteer),
            "warehouse" => Ok(Self::Warehouse),
            "receiver" => Ok(Self::Receiver),
            other => Err(Error::Validation(format!("unknown role `{other}`"))),
        }
    }
}

/// An authenticated caller.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<ActorId>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn is(&self, id: Option<&ActorId>) -> bool {
        id == Some(&self.id)
    }
}

// ─────────────────────────────────────────────────────────
// Projections
// ─────────────────────────────────────────────────────────

/// A donation as shown to a particular actor; codes are withheld unless the
/// actor is entitled to hand them over.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DonationView {
    pub id: DonationId,
    pub food_type: String,
    pub quantity: String,
    pub expiry_time: String,
    pub pickup_location: String,
    pub status: DonationStatus,
    pub pickup_otp: Option<Otp>,
    pub drop_otp: Option<Otp>,
    pub donor_id: ActorId,
    pub volunteer_id: Option<ActorId>,
    pub receiver_id: Option<ActorId>,
    pub drop_location: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DonationView {
    pub fn for_actor(donation: Donation, actor: &Actor) -> Self {
        let is_donor = actor.role == Role::Donor && actor.id == donation.donor_id;
        let is_receiver =
            actor.role == Role::Receiver && actor.is(donation.receiver_id.as_ref());

        Self {
            id: donation.id,
            food_type: donation.food_type,
            quantity: donation.quantity,
            expiry_time: donation.expiry_time,
            pickup_location: donation.pickup_location,
            status: donation.status,
            pickup_otp: is_donor.then_some(donation.pickup_otp),
            drop_otp: (is_donor || is_receiver).then_some(donation.drop_otp),
            donor_id: donation.donor_id,
            volunteer_id: donation.volunteer_id,
            receiver_id: donation.receiver_id,
            drop_location: donation.drop_location,
            created_at: donation.created_at,
        }
    }
}

/// Reference to a handoff code: which phase, and whether it has been used.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OtpRef {
    pub phase: OtpPhase,
    pub verified: bool,
}

/// Volunteer-facing view of an assigned donation. Derived, never stored.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeliveryTask {
    pub id: String,
    pub donation_id: DonationId,
    pub pickup_location: String,
    pub drop_location: Option<String>,
    pub status: DonationStatus,
    pub food_details: String,
    pub pickup_otp: OtpRef,
    pub drop_otp: OtpRef,
}

/// Dashboard totals over every donation. Derived, never stored.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DonationStats {
    pub total_donations: usize,
    /// Assigned or picked up: a volunteer is on the job.
    pub ongoing_deliveries: usize,
    pub pending: usize,
    pub assigned: usize,
    pub picked_up: usize,
    pub delivered: usize,
    pub cancelled: usize,
}

impl DonationStats {
    pub fn tally(donations: impl IntoIterator<Item = Donation>) -> Self {
        donations.into_iter().fold(Self::default(), |mut stats, d| {
            stats.total_donations += 1;
            match d.status {
                DonationStatus::Pending => stats.pending += 1,
                DonationStatus::Assigned => stats.assigned += 1,
                DonationStatus::PickedUp => stats.picked_up += 1,
                DonationStatus::Delivered => stats.delivered += 1,
                DonationStatus::Cancelled => stats.cancelled += 1,
            }
            stats.ongoing_deliveries = stats.assigned + stats.picked_up;
            stats
        })
    }
}
