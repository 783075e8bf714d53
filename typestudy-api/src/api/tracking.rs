//! Tracking sheet endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use typestudy_common::tracking::{TrackingEntry, TrackingRow};

use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCsvResponse {
    pub success: bool,
    pub record_count: usize,
}

/// POST /api/update-csv
///
/// Appends one row to the tracking sheet, creating the sheet on first use.
pub async fn update_csv(
    State(state): State<AppState>,
    payload: Result<Json<TrackingEntry>, JsonRejection>,
) -> ApiResult<Json<UpdateCsvResponse>> {
    let Json(entry) = payload?;
    let row = TrackingRow::from_entry(&entry, Utc::now())?;

    let record_count = state.tracking.append(row).await?;

    info!(
        participant_id = entry.participant_id.as_deref().unwrap_or_default(),
        session = ?entry.session,
        record_count,
        "Tracking row appended"
    );

    Ok(Json(UpdateCsvResponse {
        success: true,
        record_count,
    }))
}

pub fn tracking_routes() -> Router<AppState> {
    Router::new().route("/api/update-csv", post(update_csv))
}
