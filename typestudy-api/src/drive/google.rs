//! Google Drive v3 client
//!
//! Plain REST over `reqwest`. Uploads use `uploadType=multipart` for new
//! files and `uploadType=media` for overwrites; both send the whole body in
//! one request.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{escape_query_value, DriveError, DriveFile, DriveStore, FOLDER_MIME_TYPE};
use crate::auth::AccessTokenSource;

const DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";
const FILE_FIELDS: &str = "id,name,mimeType,webViewLink";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,webViewLink)";
const PAGE_SIZE: &str = "1000";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

/// Drive client authenticated through an [`AccessTokenSource`]
pub struct GoogleDrive {
    http: reqwest::Client,
    tokens: Arc<dyn AccessTokenSource>,
}

impl GoogleDrive {
    pub fn new(tokens: Arc<dyn AccessTokenSource>) -> Result<Self, DriveError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| DriveError::Network(e.to_string()))?;
        Ok(Self { http, tokens })
    }

    /// Run a files.list query, following pagination
    async fn list(&self, query: &str, first_only: bool) -> Result<Vec<DriveFile>, DriveError> {
        let token = self.tokens.access_token().await?;
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.to_string()),
                ("fields", LIST_FIELDS.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
                ("orderBy", "createdTime".to_string()),
                ("supportsAllDrives", "true".to_string()),
                ("includeItemsFromAllDrives", "true".to_string()),
            ];
            if let Some(page) = &page_token {
                params.push(("pageToken", page.clone()));
            }

            tracing::debug!(q = %query, "Listing Drive files");

            let response = self
                .http
                .get(format!("{}/files", DRIVE_API_URL))
                .bearer_auth(&token)
                .query(&params)
                .send()
                .await
                .map_err(|e| DriveError::Network(e.to_string()))?;

            let page: FileList = check(response, "files.list")
                .await?
                .json()
                .await
                .map_err(|e| DriveError::Parse(e.to_string()))?;

            files.extend(page.files);
            page_token = page.next_page_token;

            if page_token.is_none() || (first_only && !files.is_empty()) {
                return Ok(files);
            }
        }
    }
}

/// Map non-success responses onto [`DriveError`]
async fn check(response: reqwest::Response, call: &str) -> Result<reqwest::Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(call, status = status.as_u16(), body = %body, "Drive API call failed");

    match status.as_u16() {
        401 => Err(DriveError::Auth(body)),
        404 => Err(DriveError::NotFound(format!("{}: {}", call, body))),
        code => Err(DriveError::Api(code, body)),
    }
}

/// `multipart/related` body: JSON metadata part then the media part
fn multipart_related(metadata: &serde_json::Value, mime_type: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = format!("typestudy-{}", Uuid::new_v4().simple());
    let mut body = Vec::with_capacity(data.len() + 512);

    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {mime}\r\n\r\n",
            b = boundary,
            meta = metadata,
            mime = mime_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    (format!("multipart/related; boundary={}", boundary), body)
}

#[async_trait]
impl DriveStore for GoogleDrive {
    async fn find_file(&self, parent_id: &str, name: &str) -> Result<Option<DriveFile>, DriveError> {
        let query = format!(
            "name='{}' and '{}' in parents and trashed=false",
            escape_query_value(name),
            escape_query_value(parent_id)
        );
        Ok(self.list(&query, true).await?.into_iter().next())
    }

    async fn find_folder(&self, parent_id: &str, name: &str) -> Result<Option<DriveFile>, DriveError> {
        let query = format!(
            "name='{}' and '{}' in parents and mimeType='{}' and trashed=false",
            escape_query_value(name),
            escape_query_value(parent_id),
            FOLDER_MIME_TYPE
        );
        Ok(self.list(&query, true).await?.into_iter().next())
    }

    async fn list_folders(&self, parent_id: &str) -> Result<Vec<DriveFile>, DriveError> {
        let query = format!(
            "'{}' in parents and mimeType='{}' and trashed=false",
            escape_query_value(parent_id),
            FOLDER_MIME_TYPE
        );
        self.list(&query, false).await
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<DriveFile, DriveError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(format!("{}/files", DRIVE_API_URL))
            .bearer_auth(&token)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": [parent_id],
            }))
            .send()
            .await
            .map_err(|e| DriveError::Network(e.to_string()))?;

        let folder: DriveFile = check(response, "files.create(folder)")
            .await?
            .json()
            .await
            .map_err(|e| DriveError::Parse(e.to_string()))?;

        tracing::info!(parent_id = %parent_id, name = %name, folder_id = %folder.id, "Created Drive folder");
        Ok(folder)
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, DriveError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(format!("{}/files/{}", DRIVE_API_URL, file_id))
            .bearer_auth(&token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(|e| DriveError::Network(e.to_string()))?;

        let bytes = check(response, "files.get")
            .await?
            .bytes()
            .await
            .map_err(|e| DriveError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn create_file(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<DriveFile, DriveError> {
        let token = self.tokens.access_token().await?;
        let metadata = json!({ "name": name, "parents": [parent_id] });
        let size = data.len();
        let (content_type, body) = multipart_related(&metadata, mime_type, &data);

        let response = self
            .http
            .post(format!("{}/files", DRIVE_UPLOAD_URL))
            .bearer_auth(&token)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", FILE_FIELDS),
                ("supportsAllDrives", "true"),
            ])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| DriveError::Network(e.to_string()))?;

        let file: DriveFile = check(response, "files.create")
            .await?
            .json()
            .await
            .map_err(|e| DriveError::Parse(e.to_string()))?;

        tracing::info!(name = %name, file_id = %file.id, size, "Uploaded file to Drive");
        Ok(file)
    }

    async fn update_file(&self, file_id: &str, mime_type: &str, data: Vec<u8>) -> Result<(), DriveError> {
        let token = self.tokens.access_token().await?;
        let size = data.len();
        let response = self
            .http
            .patch(format!("{}/files/{}", DRIVE_UPLOAD_URL, file_id))
            .bearer_auth(&token)
            .query(&[("uploadType", "media"), ("supportsAllDrives", "true")])
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(data)
            .send()
            .await
            .map_err(|e| DriveError::Network(e.to_string()))?;

        check(response, "files.update").await?;
        tracing::debug!(file_id = %file_id, size, "Updated Drive file");
        Ok(())
    }
}
