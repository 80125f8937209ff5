//! Axum REST API handlers.
//!
//! The caller's identity arrives as a trusted claim from the upstream
//! session layer in the `x-actor-id` / `x-actor-role` headers.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use annsetu_core::events::EventKind;
use annsetu_core::{
    Actor, DeliveryTask, Donation, DonationFilter, DonationId, DonationService, DonationStats,
    DonationStatus, DonationView, NewDonation, Otp, Role,
};

use crate::db;
use crate::errors::{ApiError, Result};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Clone)]
pub struct ApiState {
    pub service: DonationService,
    pub pool: SqlitePool,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/donations", post(create_donation).get(list_donations))
        .route("/donations/:id", get(get_donation))
        .route("/donations/:id/cancel", post(cancel_donation))
        .route("/donations/:id/assign", post(assign_volunteer))
        .route("/donations/:id/request", post(request_food))
        .route("/donations/:id/verify/pickup", post(verify_pickup))
        .route("/donations/:id/verify/drop", post(verify_drop))
        .route("/donations/:id/events", get(get_donation_events))
        .route("/volunteers/:id/tasks", get(list_delivery_tasks))
        .route("/stats", get(get_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Caller identity
// ─────────────────────────────────────────────────────────

/// The authenticated caller, taken from the session layer's headers.
pub struct AuthActor(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let id = header(parts, ACTOR_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {ACTOR_ID_HEADER} header")))?;
        let role = header(parts, ACTOR_ROLE_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {ACTOR_ROLE_HEADER} header")))?;
        let role: Role = role
            .parse()
            .map_err(|_| ApiError::Unauthenticated(format!("unknown role `{role}`")))?;
        Ok(Self(Actor::new(id, role)))
    }
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Deserialize)]
pub struct CreateDonationRequest {
    pub food_type: String,
    pub quantity: String,
    #[serde(default)]
    pub expiry_time: String,
    pub pickup_location: String,
    /// Defaults to the caller.
    pub donor_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub donor_id: Option<String>,
    pub volunteer_id: Option<String>,
    pub receiver_id: Option<String>,
    /// Comma-separated statuses.
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct DonationsResponse {
    pub count: usize,
    pub donations: Vec<DonationView>,
}

#[derive(Deserialize, Default)]
pub struct AssignRequest {
    pub volunteer_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct FoodRequest {
    pub receiver_id: Option<String>,
    pub drop_location: Option<String>,
}

#[derive(Serialize)]
pub struct FoodRequestResponse {
    pub donation_id: DonationId,
    pub drop_otp: Otp,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub code: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub donation_id: DonationId,
    pub verified: bool,
}

#[derive(Serialize)]
pub struct EventView {
    pub id: i64,
    pub kind: Option<EventKind>,
    pub status: String,
    pub actor: Option<String>,
    pub at: Option<String>,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub donation_id: DonationId,
    pub count: usize,
    pub events: Vec<EventView>,
}

#[derive(Serialize)]
pub struct TasksResponse {
    pub volunteer_id: String,
    pub count: usize,
    pub tasks: Vec<DeliveryTask>,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /donations`
///
/// Returns the full record, codes included, to the donor who created it.
pub async fn create_donation(
    State(state): State<Arc<ApiState>>,
    AuthActor(actor): AuthActor,
    Json(body): Json<CreateDonationRequest>,
) -> Result<(StatusCode, Json<Donation>)> {
    let input = NewDonation {
        food_type: body.food_type,
        quantity: body.quantity,
        expiry_time: body.expiry_time,
        pickup_location: body.pickup_location,
        donor_id: body.donor_id.unwrap_or_else(|| actor.id.clone()),
    };
    let donation = state.service.create_donation(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(donation)))
}

/// `GET /donations?donor_id=&volunteer_id=&receiver_id=&status=pending,assigned`
pub async fn list_donations(
    State(state): State<Arc<ApiState>>,
    AuthActor(actor): AuthActor,
    Query(params): Query<ListParams>,
) -> Result<Json<DonationsResponse>> {
    let statuses = params
        .status
        .as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse::<DonationStatus>)
                .collect::<std::result::Result<Vec<_>, _>>()
        })
        .transpose()?;
    let filter = DonationFilter {
        donor_id: params.donor_id,
        volunteer_id: params.volunteer_id,
        receiver_id: params.receiver_id,
        statuses,
    };

    let donations = state.service.list_donations(&actor, filter).await?;
    Ok(Json(DonationsResponse {
        count: donations.len(),
        donations,
    }))
}

/// `GET /donations/:id`
pub async fn get_donation(
    State(state): State<Arc<ApiState>>,
    AuthActor(actor): AuthActor,
    Path(id): Path<DonationId>,
) -> Result<Json<DonationView>> {
    Ok(Json(state.service.get_donation(&actor, id).await?))
}

/// `POST /donations/:id/cancel`
pub async fn cancel_donation(
    State(state): State<Arc<ApiState>>,
    AuthActor(actor): AuthActor,
    Path(id): Path<DonationId>,
) -> Result<Json<DonationView>> {
    Ok(Json(state.service.cancel_donation(&actor, id).await?))
}

/// `POST /donations/:id/assign`
pub async fn assign_volunteer(
    State(state): State<Arc<ApiState>>,
    AuthActor(actor): AuthActor,
    Path(id): Path<DonationId>,
    body: Option<Json<AssignRequest>>,
) -> Result<Json<DonationView>> {
    let Json(body) = body.unwrap_or_default();
    let volunteer_id = body.volunteer_id.unwrap_or_else(|| actor.id.clone());
    Ok(Json(
        state
            .service
            .assign_volunteer(&actor, id, &volunteer_id)
            .await?,
    ))
}

/// `POST /donations/:id/request`
pub async fn request_food(
    State(state): State<Arc<ApiState>>,
    AuthActor(actor): AuthActor,
    Path(id): Path<DonationId>,
    body: Option<Json<FoodRequest>>,
) -> Result<Json<FoodRequestResponse>> {
    let Json(body) = body.unwrap_or_default();
    let receiver_id = body.receiver_id.unwrap_or_else(|| actor.id.clone());
    let drop_otp = state
        .service
        .request_food(&actor, id, &receiver_id, body.drop_location)
        .await?;
    Ok(Json(FoodRequestResponse {
        donation_id: id,
        drop_otp,
    }))
}

/// `POST /donations/:id/verify/pickup`
pub async fn verify_pickup(
    State(state): State<Arc<ApiState>>,
    AuthActor(actor): AuthActor,
    Path(id): Path<DonationId>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let verified = state
        .service
        .verify_pickup_otp(&actor, id, &body.code)
        .await?;
    Ok(Json(VerifyResponse {
        donation_id: id,
        verified,
    }))
}

/// `POST /donations/:id/verify/drop`
pub async fn verify_drop(
    State(state): State<Arc<ApiState>>,
    AuthActor(actor): AuthActor,
    Path(id): Path<DonationId>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let verified = state.service.verify_drop_otp(&actor, id, &body.code).await?;
    Ok(Json(VerifyResponse {
        donation_id: id,
        verified,
    }))
}

/// `GET /donations/:id/events`
///
/// Visible to anyone who may view the donation itself.
pub async fn get_donation_events(
    State(state): State<Arc<ApiState>>,
    AuthActor(actor): AuthActor,
    Path(id): Path<DonationId>,
) -> Result<Json<EventsResponse>> {
    state.service.get_donation(&actor, id).await?;
    let events: Vec<EventView> = db::get_events_for_donation(&state.pool, id)
        .await?
        .into_iter()
        .map(|record| EventView {
            id: record.id,
            kind: record.kind(),
            at: record.at_rfc3339(),
            status: record.status,
            actor: record.actor,
        })
        .collect();
    Ok(Json(EventsResponse {
        donation_id: id,
        count: events.len(),
        events,
    }))
}

/// `GET /volunteers/:id/tasks`
pub async fn list_delivery_tasks(
    State(state): State<Arc<ApiState>>,
    AuthActor(actor): AuthActor,
    Path(volunteer_id): Path<String>,
) -> Result<Json<TasksResponse>> {
    let tasks = state
        .service
        .list_delivery_tasks(&actor, &volunteer_id)
        .await?;
    Ok(Json(TasksResponse {
        volunteer_id,
        count: tasks.len(),
        tasks,
    }))
}

/// `GET /stats`
///
/// Admin dashboard totals.
pub async fn get_stats(
    State(state): State<Arc<ApiState>>,
    AuthActor(actor): AuthActor,
) -> Result<Json<DonationStats>> {
    Ok(Json(state.service.stats(&actor).await?))
}
