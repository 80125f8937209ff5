use std::sync::Arc;

use tokio::task::JoinSet;

use crate::invariants::*;
use crate::types::DonationFilter;
use crate::{Actor, DonationService, DonationStatus, Error, MemoryStorage, NewDonation, Role};

fn service() -> DonationService {
    DonationService::new(Arc::new(MemoryStorage::new()))
}

fn input() -> NewDonation {
    NewDonation {
        food_type: "Sandwiches".into(),
        quantity: "30 packs".into(),
        expiry_time: "4 hours".into(),
        pickup_location: "456 Park Ave".into(),
        donor_id: "donor1".into(),
    }
}

fn donor() -> Actor {
    Actor::new("donor1", Role::Donor)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_assign_has_one_winner() {
    for _ in 0..20 {
        let service = service();
        let d = service.create_donation(&donor(), input()).await.unwrap();
        let donation_id = d.id;

        let mut racers = JoinSet::new();
        for n in 0..16 {
            let service = service.clone();
            racers.spawn(async move {
                let id = format!("vol{n}");
                let actor = Actor::new(id.clone(), Role::Volunteer);
                (id.clone(), service.assign_volunteer(&actor, donation_id, &id).await)
            });
        }

        let mut winners = Vec::new();
        while let Some(joined) = racers.join_next().await {
            let (who, outcome) = joined.unwrap();
            match outcome {
                Ok(_) => winners.push(who),
                Err(Error::AlreadyAssigned(id)) => assert_eq!(id, d.id),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(winners.len(), 1, "winners: {winners:?}");
        let stored = service.registry().get(d.id).await.unwrap();
        assert_eq!(stored.status, DonationStatus::Assigned);
        assert_eq!(stored.volunteer_id.as_ref(), Some(&winners[0]));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_reservations_have_one_holder() {
    let service = service();
    let d = service.create_donation(&donor(), input()).await.unwrap();
    let donation_id = d.id;

    let mut racers = JoinSet::new();
    for n in 0..16 {
        let service = service.clone();
        racers.spawn(async move {
            let id = format!("rcv{n}");
            let actor = Actor::new(id.clone(), Role::Receiver);
            service.request_food(&actor, donation_id, &id, None).await
        });
    }

    let mut granted = 0;
    while let Some(joined) = racers.join_next().await {
        match joined.unwrap() {
            Ok(code) => {
                assert_eq!(code, d.drop_otp);
                granted += 1;
            }
            Err(Error::ResourceAlreadyReserved(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(granted, 1);
    assert!(service.registry().get(d.id).await.unwrap().receiver_id.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_pickup_fires_once() {
    let service = service();
    let d = service.create_donation(&donor(), input()).await.unwrap();
    let vol = Actor::new("vol1", Role::Volunteer);
    service
        .assign_volunteer(&vol, d.id, &"vol1".to_string())
        .await
        .unwrap();

    let donation_id = d.id;
    let mut racers = JoinSet::new();
    for _ in 0..8 {
        let (service, vol) = (service.clone(), vol.clone());
        let code = d.pickup_otp.to_string();
        racers.spawn(async move { service.verify_pickup_otp(&vol, donation_id, &code).await });
    }

    let mut verified = 0;
    while let Some(joined) = racers.join_next().await {
        if joined.unwrap().unwrap() {
            verified += 1;
        }
    }
    assert_eq!(verified, 1);
    assert_eq!(
        service.registry().get(d.id).await.unwrap().status,
        DonationStatus::PickedUp
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_creates_issue_unique_live_codes() {
    let service = service();

    let mut creators = JoinSet::new();
    for _ in 0..200 {
        let service = service.clone();
        creators.spawn(async move { service.create_donation(&donor(), input()).await });
    }
    while let Some(joined) = creators.join_next().await {
        assert_all_donation_invariants(&joined.unwrap().unwrap());
    }

    let all: Vec<_> = service
        .registry()
        .list(&DonationFilter::default())
        .await
        .unwrap()
        .collect();
    assert_eq!(all.len(), 200);
    assert_live_codes_unique(&all);
}
