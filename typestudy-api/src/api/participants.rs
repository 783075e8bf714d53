//! Participant identifiers and per-person counters
//!
//! - `POST /api/register-device`: look up or create the participant for a device
//! - `POST /api/get-next-id`: same, then open a session for a person slot
//! - `POST /api/update-counter`: record a completed submission

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use typestudy_common::counter::{Person, PersonSlot};

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRequest {
    pub device_id: Option<String>,
    pub person: Option<Person>,
}

impl DeviceRequest {
    fn device_id(&self) -> ApiResult<&str> {
        self.device_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Missing deviceId".to_string()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub participant_id: String,
    pub registered_at: Option<DateTime<Utc>>,
    pub is_new_participant: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextIdResponse {
    pub participant_id: String,
    pub session_number: u32,
    pub person: Person,
    pub is_new_participant: bool,
    /// Unlocked person slots and their counters
    pub persons: BTreeMap<String, PersonSlot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCounterResponse {
    pub success: bool,
    pub participant_id: String,
    pub updated_session: u32,
    pub updated_completions: u32,
    /// Slot unlocked by this submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked_person: Option<Person>,
}

/// POST /api/register-device
pub async fn register_device(
    State(state): State<AppState>,
    payload: Result<Json<DeviceRequest>, JsonRejection>,
) -> ApiResult<Json<RegisterResponse>> {
    let Json(request) = payload?;
    let device_id = request.device_id()?;

    let registration = state.counter.register(device_id).await?;

    info!(
        device_id = %device_id,
        participant_id = %registration.participant_id,
        is_new = registration.is_new,
        "Device registered"
    );

    Ok(Json(RegisterResponse {
        participant_id: registration.participant_id,
        registered_at: registration.registered_at,
        is_new_participant: registration.is_new,
    }))
}

/// POST /api/get-next-id
///
/// Known devices always get their existing identifier back.
pub async fn get_next_id(
    State(state): State<AppState>,
    payload: Result<Json<DeviceRequest>, JsonRejection>,
) -> ApiResult<Json<NextIdResponse>> {
    let Json(request) = payload?;
    let device_id = request.device_id()?;

    let start = state.counter.contact(device_id, request.person).await?;

    info!(
        device_id = %device_id,
        participant_id = %start.participant_id,
        person = %start.person,
        session = start.session_number,
        "Session opened"
    );

    Ok(Json(NextIdResponse {
        participant_id: start.participant_id,
        session_number: start.session_number,
        person: start.person,
        is_new_participant: start.is_new,
        persons: start.participant.persons,
    }))
}

/// POST /api/update-counter
pub async fn update_counter(
    State(state): State<AppState>,
    payload: Result<Json<DeviceRequest>, JsonRejection>,
) -> ApiResult<Json<UpdateCounterResponse>> {
    let Json(request) = payload?;
    let (device_id, person) = match (request.device_id(), request.person) {
        (Ok(device_id), Some(person)) => (device_id, person),
        _ => return Err(ApiError::BadRequest("Missing deviceId or person".to_string())),
    };

    let completion = state.counter.complete(device_id, person).await?;

    info!(
        device_id = %device_id,
        participant_id = %completion.participant_id,
        person = %person,
        completions = completion.completed_submissions,
        unlocked = ?completion.unlocked,
        "Submission recorded"
    );

    Ok(Json(UpdateCounterResponse {
        success: true,
        participant_id: completion.participant_id,
        updated_session: completion.session_count,
        updated_completions: completion.completed_submissions,
        unlocked_person: completion.unlocked,
    }))
}

/// Build participant routes
pub fn participant_routes() -> Router<AppState> {
    Router::new()
        .route("/api/register-device", post(register_device))
        .route("/api/get-next-id", post(get_next_id))
        .route("/api/update-counter", post(update_counter))
}
