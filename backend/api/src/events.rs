//! Persisted lifecycle events, as stored in / read from `donation_events`.

use annsetu_core::events::EventKind;
use annsetu_core::DonationEvent;
use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// A raw event record as stored in / read from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub donation_id: i64,
    pub kind: String,
    pub status: String,
    pub actor: Option<String>,
    /// Unix milliseconds.
    pub at: i64,
}

/// Column values for inserting a [`DonationEvent`].
#[derive(Debug, Clone)]
pub struct NewEventRow {
    pub donation_id: i64,
    pub kind: &'static str,
    pub status: &'static str,
    pub actor: Option<String>,
    pub at: i64,
}

impl From<&DonationEvent> for NewEventRow {
    fn from(event: &DonationEvent) -> Self {
        Self {
            donation_id: event.donation_id as i64,
            kind: event.kind.as_str(),
            status: event.status.as_str(),
            actor: event.actor.clone(),
            at: event.at.timestamp_millis(),
        }
    }
}

impl EventRecord {
    /// Decoded kind; `None` for rows written by a newer build.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::parse(&self.kind)
    }

    pub fn at_rfc3339(&self) -> Option<String> {
        DateTime::from_timestamp_millis(self.at).map(|t| t.to_rfc3339())
    }
}
