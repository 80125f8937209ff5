use std::sync::Arc;

use crate::events::MemoryEventSink;
use crate::invariants::*;
use crate::types::DonationFilter;
use crate::{
    Actor, DonationService, DonationStatus, Error, EventKind, MemoryStorage, NewDonation, Role,
};

fn setup() -> (DonationService, Arc<MemoryEventSink>) {
    let sink = Arc::new(MemoryEventSink::new());
    let service = DonationService::new(Arc::new(MemoryStorage::new())).with_event_sink(sink.clone());
    (service, sink)
}

fn donor() -> Actor {
    Actor::new("donor1", Role::Donor)
}

fn volunteer(id: &str) -> Actor {
    Actor::new(id, Role::Volunteer)
}

fn receiver(id: &str) -> Actor {
    Actor::new(id, Role::Receiver)
}

fn rice_and_curry() -> NewDonation {
    NewDonation {
        food_type: "Rice & Curry".into(),
        quantity: "50 plates".into(),
        expiry_time: "6 hours".into(),
        pickup_location: "123 Main St".into(),
        donor_id: "donor1".into(),
    }
}

fn other_code(code: crate::Otp) -> String {
    let value = if code.value() == 9999 { 1000 } else { code.value() + 1 };
    value.to_string()
}

#[tokio::test]
async fn test_end_to_end_delivery() {
    let (service, sink) = setup();
    let v1 = volunteer("V1");

    let created = service.create_donation(&donor(), rice_and_curry()).await.unwrap();
    assert_eq!(created.status, DonationStatus::Pending);
    assert_all_donation_invariants(&created);

    let assigned = service
        .assign_volunteer(&v1, created.id, &"V1".to_string())
        .await
        .unwrap();
    assert_eq!(assigned.status, DonationStatus::Assigned);
    assert_eq!(assigned.pickup_otp, None, "volunteer must not see codes");

    let pickup = created.pickup_otp.to_string();
    assert!(service.verify_pickup_otp(&v1, created.id, &pickup).await.unwrap());
    let after_pickup = service.registry().get(created.id).await.unwrap();
    assert_eq!(after_pickup.status, DonationStatus::PickedUp);

    let drop = created.drop_otp.to_string();
    assert!(service.verify_drop_otp(&v1, created.id, &drop).await.unwrap());
    let delivered = service.registry().get(created.id).await.unwrap();
    assert_eq!(delivered.status, DonationStatus::Delivered);

    assert_immutable_fields(&created, &delivered);
    assert_bindings_write_once(&after_pickup, &delivered);
    assert_event_history_valid(&sink.for_donation(created.id));
    let kinds: Vec<EventKind> = sink.for_donation(created.id).iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Created,
            EventKind::Assigned,
            EventKind::PickedUp,
            EventKind::Delivered
        ]
    );
}

#[tokio::test]
async fn test_wrong_pickup_code_then_correct() {
    let (service, _) = setup();
    let v1 = volunteer("V1");
    let d = service.create_donation(&donor(), rice_and_curry()).await.unwrap();
    service.assign_volunteer(&v1, d.id, &"V1".to_string()).await.unwrap();

    assert!(!service
        .verify_pickup_otp(&v1, d.id, &other_code(d.pickup_otp))
        .await
        .unwrap());
    assert!(!service.verify_pickup_otp(&v1, d.id, "12x4").await.unwrap());
    assert_eq!(
        service.registry().get(d.id).await.unwrap().status,
        DonationStatus::Assigned
    );

    assert!(service
        .verify_pickup_otp(&v1, d.id, &d.pickup_otp.to_string())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_drop_code_cannot_deliver_twice() {
    let (service, sink) = setup();
    let v1 = volunteer("V1");
    let d = service.create_donation(&donor(), rice_and_curry()).await.unwrap();
    service.assign_volunteer(&v1, d.id, &"V1".to_string()).await.unwrap();
    service
        .verify_pickup_otp(&v1, d.id, &d.pickup_otp.to_string())
        .await
        .unwrap();

    let drop = d.drop_otp.to_string();
    assert!(service.verify_drop_otp(&v1, d.id, &drop).await.unwrap());
    assert!(!service.verify_drop_otp(&v1, d.id, &drop).await.unwrap());

    let delivered = sink
        .for_donation(d.id)
        .iter()
        .filter(|e| e.kind == EventKind::Delivered)
        .count();
    assert_eq!(delivered, 1);
}

#[tokio::test]
async fn test_request_food_idempotent_and_exclusive() {
    let (service, _) = setup();
    let r1 = receiver("R1");
    let d = service.create_donation(&donor(), rice_and_curry()).await.unwrap();

    let first = service
        .request_food(&r1, d.id, &"R1".to_string(), Some("789 Community Center".into()))
        .await
        .unwrap();
    let again = service
        .request_food(&r1, d.id, &"R1".to_string(), None)
        .await
        .unwrap();
    assert_eq!(first, again);
    assert_eq!(first, d.drop_otp);

    let err = service
        .request_food(&receiver("R2"), d.id, &"R2".to_string(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ResourceAlreadyReserved(_)));

    let view = service.get_donation(&r1, d.id).await.unwrap();
    assert_eq!(view.drop_otp, Some(d.drop_otp));
    assert_eq!(view.pickup_otp, None);
    assert_eq!(view.drop_location.as_deref(), Some("789 Community Center"));
}

#[tokio::test]
async fn test_cancel_paths() {
    let (service, sink) = setup();
    let pending = service.create_donation(&donor(), rice_and_curry()).await.unwrap();
    let assigned = service.create_donation(&donor(), rice_and_curry()).await.unwrap();
    let in_transit = service.create_donation(&donor(), rice_and_curry()).await.unwrap();
    let v1 = volunteer("V1");
    service
        .assign_volunteer(&v1, assigned.id, &"V1".to_string())
        .await
        .unwrap();
    service
        .assign_volunteer(&v1, in_transit.id, &"V1".to_string())
        .await
        .unwrap();
    service
        .verify_pickup_otp(&v1, in_transit.id, &in_transit.pickup_otp.to_string())
        .await
        .unwrap();

    for id in [pending.id, assigned.id] {
        let view = service.cancel_donation(&donor(), id).await.unwrap();
        assert_eq!(view.status, DonationStatus::Cancelled);
        assert_event_history_valid(&sink.for_donation(id));
    }

    let err = service.cancel_donation(&donor(), in_transit.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { from: DonationStatus::PickedUp, .. }));

    let err = service.cancel_donation(&donor(), pending.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { from: DonationStatus::Cancelled, .. }));

    // Cancelled donations can no longer be claimed.
    let err = service
        .assign_volunteer(&volunteer("V2"), pending.id, &"V2".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_authorization() {
    let (service, _) = setup();
    let d = service.create_donation(&donor(), rice_and_curry()).await.unwrap();

    // Donor may only create as self.
    let mut forged = rice_and_curry();
    forged.donor_id = "donor2".into();
    assert!(matches!(
        service.create_donation(&donor(), forged).await,
        Err(Error::Unauthorized(_))
    ));
    assert!(matches!(
        service
            .create_donation(&volunteer("donor1"), rice_and_curry())
            .await,
        Err(Error::Unauthorized(_))
    ));

    // Volunteer may only assign self; admin is read-only.
    assert!(matches!(
        service
            .assign_volunteer(&volunteer("V1"), d.id, &"V2".to_string())
            .await,
        Err(Error::Unauthorized(_))
    ));
    let admin = Actor::new("root", Role::Admin);
    assert!(matches!(
        service.assign_volunteer(&admin, d.id, &"root".to_string()).await,
        Err(Error::Unauthorized(_))
    ));
    assert!(matches!(
        service.cancel_donation(&admin, d.id).await,
        Err(Error::Unauthorized(_))
    ));

    service
        .assign_volunteer(&volunteer("V1"), d.id, &"V1".to_string())
        .await
        .unwrap();

    // Only the bound volunteer may verify.
    assert!(matches!(
        service
            .verify_pickup_otp(&volunteer("V2"), d.id, &d.pickup_otp.to_string())
            .await,
        Err(Error::Unauthorized(_))
    ));
    assert_eq!(
        service.registry().get(d.id).await.unwrap().status,
        DonationStatus::Assigned
    );

    // Other donors cannot cancel.
    assert!(matches!(
        service
            .cancel_donation(&Actor::new("donor2", Role::Donor), d.id)
            .await,
        Err(Error::Unauthorized(_))
    ));

    // Receivers request only for themselves.
    assert!(matches!(
        service
            .request_food(&receiver("R1"), d.id, &"R2".to_string(), None)
            .await,
        Err(Error::Unauthorized(_))
    ));

    // Tasks: self or admin.
    assert!(service
        .list_delivery_tasks(&admin, &"V1".to_string())
        .await
        .is_ok());
    assert!(matches!(
        service
            .list_delivery_tasks(&volunteer("V2"), &"V1".to_string())
            .await,
        Err(Error::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_listing_scoped_by_role() {
    let (service, _) = setup();
    let mine = service.create_donation(&donor(), rice_and_curry()).await.unwrap();
    let mut other = rice_and_curry();
    other.donor_id = "donor2".into();
    let theirs = service
        .create_donation(&Actor::new("donor2", Role::Donor), other)
        .await
        .unwrap();
    service
        .assign_volunteer(&volunteer("V1"), theirs.id, &"V1".to_string())
        .await
        .unwrap();

    let listed = service
        .list_donations(&donor(), DonationFilter::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, mine.id);
    assert_eq!(listed[0].pickup_otp, Some(mine.pickup_otp));

    let browsing = service
        .list_donations(&volunteer("V2"), DonationFilter::default())
        .await
        .unwrap();
    assert_eq!(browsing.iter().map(|d| d.id).collect::<Vec<_>>(), vec![mine.id]);
    assert!(browsing.iter().all(|d| d.pickup_otp.is_none() && d.drop_otp.is_none()));

    let admin = service
        .list_donations(&Actor::new("root", Role::Admin), DonationFilter::default())
        .await
        .unwrap();
    assert_eq!(admin.iter().map(|d| d.id).collect::<Vec<_>>(), vec![theirs.id, mine.id]);

    assert!(matches!(
        service
            .list_donations(&Actor::new("wh", Role::Warehouse), DonationFilter::default())
            .await,
        Err(Error::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_delivery_tasks_follow_the_handoff() {
    let (service, _) = setup();
    let v1 = volunteer("V1");
    let d = service.create_donation(&donor(), rice_and_curry()).await.unwrap();
    service
        .request_food(&receiver("R1"), d.id, &"R1".to_string(), Some("Shelter 4".into()))
        .await
        .unwrap();
    service.assign_volunteer(&v1, d.id, &"V1".to_string()).await.unwrap();

    let tasks = service.list_delivery_tasks(&v1, &"V1".to_string()).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].pickup_location, "123 Main St");
    assert_eq!(tasks[0].drop_location.as_deref(), Some("Shelter 4"));
    assert_eq!(tasks[0].status, DonationStatus::Assigned);

    service
        .verify_pickup_otp(&v1, d.id, &d.pickup_otp.to_string())
        .await
        .unwrap();
    let tasks = service.list_delivery_tasks(&v1, &"V1".to_string()).await.unwrap();
    assert_eq!(tasks[0].status, DonationStatus::PickedUp);
    assert!(tasks[0].pickup_otp.verified);
}

#[tokio::test]
async fn test_failures_leave_donation_unchanged() {
    let (service, _) = setup();
    let v1 = volunteer("V1");
    let d = service.create_donation(&donor(), rice_and_curry()).await.unwrap();
    service.assign_volunteer(&v1, d.id, &"V1".to_string()).await.unwrap();
    let before = service.registry().get(d.id).await.unwrap();

    let _ = service.verify_drop_otp(&v1, d.id, &d.drop_otp.to_string()).await;
    let _ = service
        .verify_pickup_otp(&v1, d.id, &other_code(d.pickup_otp))
        .await;
    let _ = service
        .assign_volunteer(&volunteer("V2"), d.id, &"V2".to_string())
        .await;
    let _ = service.cancel_donation(&Actor::new("donor2", Role::Donor), d.id).await;

    assert_eq!(service.registry().get(d.id).await.unwrap(), before);
}

#[tokio::test]
async fn test_unknown_donation() {
    let (service, _) = setup();
    assert!(matches!(
        service.get_donation(&donor(), 42).await,
        Err(Error::NotFound(42))
    ));
    assert!(matches!(
        service.verify_pickup_otp(&volunteer("V1"), 42, "1234").await,
        Err(Error::NotFound(42))
    ));
}

#[tokio::test]
async fn test_blank_donor_is_a_validation_error() {
    let (service, _) = setup();
    for donor_id in ["", "   "] {
        let mut input = rice_and_curry();
        input.donor_id = donor_id.into();
        assert!(matches!(
            service.create_donation(&donor(), input).await,
            Err(Error::Validation(msg)) if msg.contains("donor_id")
        ));
    }
}

#[tokio::test]
async fn test_admin_stats() {
    let (service, _) = setup();
    let admin = Actor::new("admin1", Role::Admin);
    let v1 = volunteer("V1");

    let first = service.create_donation(&donor(), rice_and_curry()).await.unwrap();
    let second = service.create_donation(&donor(), rice_and_curry()).await.unwrap();
    let third = service.create_donation(&donor(), rice_and_curry()).await.unwrap();
    service.create_donation(&donor(), rice_and_curry()).await.unwrap();

    service.assign_volunteer(&v1, first.id, &"V1".to_string()).await.unwrap();
    service.assign_volunteer(&v1, second.id, &"V1".to_string()).await.unwrap();
    assert!(service
        .verify_pickup_otp(&v1, second.id, &second.pickup_otp.to_string())
        .await
        .unwrap());
    service.cancel_donation(&donor(), third.id).await.unwrap();

    let stats = service.stats(&admin).await.unwrap();
    assert_eq!(stats.total_donations, 4);
    assert_eq!(stats.ongoing_deliveries, 2);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.cancelled, 1);

    for actor in [donor(), v1, receiver("R1"), Actor::new("wh1", Role::Warehouse)] {
        assert!(matches!(service.stats(&actor).await, Err(Error::Unauthorized(_))));
    }
}
