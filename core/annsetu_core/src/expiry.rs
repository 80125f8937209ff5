//! Expiry of unclaimed food.
//!
//! `expiry_time` is free text entered by the donor ("6 hours", "30 mins",
//! "2 days", "90m"). Text that does not parse never expires. A donation whose
//! `created_at + expiry` has passed is cancelled by [`expire_overdue`], but
//! only while it is still `pending` or `assigned`; food already picked up is
//! left to finish its delivery.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::errors::{Error, Result};
use crate::events::EventKind;
use crate::registry::DonationRegistry;
use crate::types::{Donation, DonationFilter, DonationId, DonationStatus};

/// Parse a descriptive duration such as "6 hours" or "45m".
pub fn parse_expiry(text: &str) -> Option<Duration> {
    let text = text.trim().to_ascii_lowercase();
    let split = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
    let (amount, unit) = text.split_at(split);
    let amount: i64 = amount.parse().ok()?;
    if amount <= 0 {
        return None;
    }

    match unit.trim() {
        "m" | "min" | "mins" | "minute" | "minutes" => Duration::try_minutes(amount),
        "h" | "hr" | "hrs" | "hour" | "hours" => Duration::try_hours(amount),
        "d" | "day" | "days" => Duration::try_days(amount),
        _ => None,
    }
}

/// When `donation` stops being claimable, if its expiry text parses.
pub fn deadline(donation: &Donation) -> Option<DateTime<Utc>> {
    parse_expiry(&donation.expiry_time).and_then(|d| donation.created_at.checked_add_signed(d))
}

/// Cancel every pending or assigned donation whose deadline is before `now`.
///
/// Donations that move concurrently are skipped; they are no longer the
/// sweep's business. Returns the ids that were cancelled.
pub async fn expire_overdue(registry: &DonationRegistry, now: DateTime<Utc>) -> Result<Vec<DonationId>> {
    let filter = DonationFilter::by_status(&[DonationStatus::Pending, DonationStatus::Assigned]);
    let overdue: Vec<Donation> = registry
        .list(&filter)
        .await?
        .filter(|d| deadline(d).is_some_and(|at| at <= now))
        .collect();

    let mut expired = Vec::with_capacity(overdue.len());
    for donation in overdue {
        match registry
            .transition(donation.id, donation.status, DonationStatus::Cancelled)
            .await
        {
            Ok(cancelled) => {
                info!(donation_id = donation.id, expiry = %donation.expiry_time, "donation expired");
                registry.emit_for(&cancelled, EventKind::Expired, None).await;
                expired.push(donation.id);
            }
            Err(Error::Conflict { .. }) => {
                warn!(donation_id = donation.id, "donation moved during expiry sweep; skipped");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(expired)
}
