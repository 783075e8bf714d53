//! Short-lived upload credentials for browsers uploading straight to Drive

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use tracing::info;

use crate::auth::AccessTokenSource;
use crate::{ApiError, ApiResult, AppState};

/// Browser clients read `access_token` in snake case
#[derive(Debug, Serialize)]
pub struct UploadTokenResponse {
    pub access_token: String,
    #[serde(rename = "rootFolderId")]
    pub root_folder_id: String,
}

/// POST /api/get-upload-token
pub async fn get_upload_token(State(state): State<AppState>) -> ApiResult<Json<UploadTokenResponse>> {
    let tokens = state
        .tokens
        .as_ref()
        .ok_or_else(|| ApiError::Internal("No Drive credentials configured".to_string()))?;

    let access_token = tokens.access_token().await?;
    info!(source = tokens.kind(), "Issued upload token");

    Ok(Json(UploadTokenResponse {
        access_token,
        root_folder_id: state.root_folder_id.clone(),
    }))
}

pub fn token_routes() -> Router<AppState> {
    Router::new().route("/api/get-upload-token", post(get_upload_token))
}
