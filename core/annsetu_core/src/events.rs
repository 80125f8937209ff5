//! Lifecycle events emitted after each committed change.
//!
//! Events are published only once the compare-and-swap that produced them
//! has succeeded; a failing sink never rolls back the state change.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::StorageError;
use crate::types::{ActorId, DonationId, DonationStatus};

/// All recognised lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Donor offered food (`pending`).
    Created,
    /// Volunteer claimed the pickup (`assigned`).
    Assigned,
    /// Receiver reserved the food; status unchanged.
    Reserved,
    /// Pickup code verified (`picked_up`).
    PickedUp,
    /// Drop code verified (`delivered`).
    Delivered,
    /// Donor withdrew the donation (`cancelled`).
    Cancelled,
    /// Expiry sweep cancelled the donation (`cancelled`).
    Expired,
}

impl EventKind {
    /// Return a short identifier string suitable for storage in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Assigned => "assigned",
            Self::Reserved => "reserved",
            Self::PickedUp => "picked_up",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        Some(match kind {
            "created" => Self::Created,
            "assigned" => Self::Assigned,
            "reserved" => Self::Reserved,
            "picked_up" => Self::PickedUp,
            "delivered" => Self::Delivered,
            "cancelled" => Self::Cancelled,
            "expired" => Self::Expired,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationEvent {
    pub donation_id: DonationId,
    pub kind: EventKind,
    /// Status after the change.
    pub status: DonationStatus,
    /// Who caused it; `None` for system actions such as expiry.
    pub actor: Option<ActorId>,
    pub at: DateTime<Utc>,
}

impl DonationEvent {
    pub fn new(
        donation_id: DonationId,
        kind: EventKind,
        status: DonationStatus,
        actor: Option<&ActorId>,
    ) -> Self {
        Self {
            donation_id,
            kind,
            status,
            actor: actor.cloned(),
            at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: DonationEvent) -> Result<(), StorageError>;
}

/// Writes each event to the `tracing` log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, event: DonationEvent) -> Result<(), StorageError> {
        info!(
            donation_id = event.donation_id,
            kind = event.kind.as_str(),
            actor = event.actor.as_deref().unwrap_or("system"),
            "donation event"
        );
        Ok(())
    }
}

/// Keeps every event in memory, in publish order.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<DonationEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_donation(&self, id: DonationId) -> Vec<DonationEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.donation_id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn publish(&self, event: DonationEvent) -> Result<(), StorageError> {
        self.events.lock().push(event);
        Ok(())
    }
}
