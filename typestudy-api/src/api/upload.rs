//! Data bundle uploads
//!
//! - `POST /api/upload-stream`: multipart form, stored under
//!   `<participantId>/Person_<person>/Session_<session>/`
//! - `POST /api/upload-to-drive`: base64 ZIP in a JSON body, stored in the
//!   root folder

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use typestudy_common::counter::{parse_participant_id, Person};

use crate::drive::{self, ZIP_MIME_TYPE};
use crate::{ApiError, ApiResult, AppState};

/// Largest accepted request body for uploads
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStreamResponse {
    pub success: bool,
    pub file_id: String,
    pub file_name: String,
    pub folder: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipUploadRequest {
    pub zip_file_name: Option<String>,
    pub zip_data: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ZipUploadResponse {
    pub success: bool,
    pub id: String,
    pub link: Option<String>,
}

/// Where a bundle goes inside the root folder
#[derive(Debug, Clone, PartialEq)]
pub struct BundleLocation {
    pub participant_id: String,
    pub person: Person,
    pub session: u32,
}

impl BundleLocation {
    /// Build from form fields, rejecting anything that would create a stray folder
    pub fn from_fields(fields: &HashMap<String, String>) -> ApiResult<Self> {
        let field = |name: &str| {
            fields
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::BadRequest(format!("Missing {}", name)))
        };

        let participant_id = field("participantId")?;
        if parse_participant_id(participant_id).is_none() {
            return Err(ApiError::BadRequest(format!(
                "Invalid participantId: {}",
                participant_id
            )));
        }

        let person: Person = field("person")?.parse()?;

        let session_text = field("session")?;
        let session = session_text
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid session: {}", session_text)))?;

        Ok(Self {
            participant_id: participant_id.to_string(),
            person,
            session,
        })
    }

    pub fn segments(&self) -> Vec<String> {
        vec![
            self.participant_id.clone(),
            format!("Person_{}", self.person),
            format!("Session_{}", self.session),
        ]
    }

    /// Display path, e.g. `U001/Person_1/Session_2`
    pub fn path(&self) -> String {
        self.segments().join("/")
    }
}

/// POST /api/upload-stream
pub async fn upload_stream(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadStreamResponse>> {
    let mut data: Option<Vec<u8>> = None;
    let mut fields: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            data = Some(field.bytes().await?.to_vec());
        } else {
            let value = field.text().await?;
            fields.insert(name, value);
        }
    }

    let file_name = fields
        .get("fileName")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let (data, file_name) = match (data, file_name) {
        (Some(data), Some(file_name)) => (data, file_name),
        _ => return Err(ApiError::BadRequest("Missing file or fileName".to_string())),
    };

    let location = BundleLocation::from_fields(&fields)?;

    info!(
        file_name = %file_name,
        size = data.len(),
        folder = %location.path(),
        device_id = fields.get("deviceId").map(String::as_str).unwrap_or_default(),
        gender = fields.get("gender").map(String::as_str).unwrap_or_default(),
        handedness = fields.get("handedness").map(String::as_str).unwrap_or_default(),
        "Receiving bundle upload"
    );

    let folder_id = drive::ensure_path(state.drive.as_ref(), &state.root_folder_id, &location.segments()).await?;
    let file = state
        .drive
        .create_file(&folder_id, &file_name, ZIP_MIME_TYPE, data)
        .await?;

    info!(file_id = %file.id, folder = %location.path(), "Bundle uploaded");

    Ok(Json(UploadStreamResponse {
        success: true,
        file_id: file.id,
        file_name: file.name,
        folder: location.path(),
    }))
}

/// POST /api/upload-to-drive
pub async fn upload_to_drive(
    State(state): State<AppState>,
    payload: Result<Json<ZipUploadRequest>, JsonRejection>,
) -> ApiResult<Json<ZipUploadResponse>> {
    let Json(request) = payload?;

    let file_name = request
        .zip_file_name
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Invalid or missing zipFileName".to_string()))?;
    let encoded = request
        .zip_data
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Invalid or missing zipData".to_string()))?;

    let data = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ApiError::BadRequest(format!("zipData is not valid base64: {}", e)))?;

    let file = state
        .drive
        .create_file(&state.root_folder_id, file_name, ZIP_MIME_TYPE, data)
        .await?;

    info!(file_id = %file.id, file_name = %file_name, "ZIP uploaded");

    Ok(Json(ZipUploadResponse {
        success: true,
        id: file.id,
        link: file.web_view_link,
    }))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/api/upload-stream", post(upload_stream))
        .route("/api/upload-to-drive", post(upload_to_drive))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_bundle_location_path() {
        let location = BundleLocation::from_fields(&fields(&[
            ("participantId", "U007"),
            ("person", "2"),
            ("session", "3"),
        ]))
        .unwrap();

        assert_eq!(location.path(), "U007/Person_2/Session_3");
    }

    #[test]
    fn test_bundle_location_rejects_bad_fields() {
        for bad in [
            fields(&[("person", "1"), ("session", "1")]),
            fields(&[("participantId", "../etc"), ("person", "1"), ("session", "1")]),
            fields(&[("participantId", "U001"), ("person", "6"), ("session", "1")]),
            fields(&[("participantId", "U001"), ("person", "1"), ("session", "0")]),
            fields(&[("participantId", "U001"), ("person", "1"), ("session", "undefined")]),
        ] {
            assert!(BundleLocation::from_fields(&bad).is_err(), "{:?}", bad);
        }
    }
}
