//! File storage backed by Google Drive
//!
//! [`DriveStore`] covers the handful of Drive v3 calls the handlers need:
//! name lookup inside a folder, folder listing and creation, download, and
//! whole-file create/update. [`google::GoogleDrive`] talks to the real API;
//! [`memory::MemoryDrive`] keeps everything in process for local runs and
//! tests.

pub mod google;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use google::GoogleDrive;
pub use memory::MemoryDrive;

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

pub const JSON_MIME_TYPE: &str = "application/json";
pub const CSV_MIME_TYPE: &str = "text/csv";
pub const ZIP_MIME_TYPE: &str = "application/zip";

/// Drive storage errors
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Drive API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("File not found: {0}")]
    NotFound(String),
}

impl DriveError {
    /// Worth retrying: the same request may succeed a moment later
    pub fn is_transient(&self) -> bool {
        match self {
            DriveError::Network(_) | DriveError::Parse(_) => true,
            DriveError::Api(status, _) => *status == 429 || *status >= 500,
            DriveError::Auth(_) | DriveError::NotFound(_) => false,
        }
    }
}

/// File or folder metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }
}

#[async_trait]
pub trait DriveStore: Send + Sync {
    /// First non-trashed file called `name` directly inside `parent_id`
    async fn find_file(&self, parent_id: &str, name: &str) -> Result<Option<DriveFile>, DriveError>;

    /// First non-trashed folder called `name` directly inside `parent_id`
    async fn find_folder(&self, parent_id: &str, name: &str) -> Result<Option<DriveFile>, DriveError>;

    /// All non-trashed folders directly inside `parent_id`
    async fn list_folders(&self, parent_id: &str) -> Result<Vec<DriveFile>, DriveError>;

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<DriveFile, DriveError>;

    /// Full content of a file
    async fn download(&self, file_id: &str) -> Result<Vec<u8>, DriveError>;

    async fn create_file(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<DriveFile, DriveError>;

    /// Replace the content of an existing file
    async fn update_file(&self, file_id: &str, mime_type: &str, data: Vec<u8>) -> Result<(), DriveError>;
}

/// Return the folder `name` inside `parent_id`, creating it if missing
pub async fn ensure_folder(
    drive: &dyn DriveStore,
    parent_id: &str,
    name: &str,
) -> Result<DriveFile, DriveError> {
    if let Some(folder) = drive.find_folder(parent_id, name).await? {
        return Ok(folder);
    }
    tracing::debug!(parent_id = %parent_id, name = %name, "Creating folder");
    drive.create_folder(parent_id, name).await
}

/// Walk (and create) a chain of nested folders, returning the innermost id
pub async fn ensure_path(
    drive: &dyn DriveStore,
    root_id: &str,
    segments: &[String],
) -> Result<String, DriveError> {
    let mut parent = root_id.to_string();
    for segment in segments {
        parent = ensure_folder(drive, &parent, segment).await?.id;
    }
    Ok(parent)
}

/// Overwrite `existing` if given, otherwise create `name` inside `parent_id`
pub async fn write_file(
    drive: &dyn DriveStore,
    parent_id: &str,
    existing: Option<&DriveFile>,
    name: &str,
    mime_type: &str,
    data: Vec<u8>,
) -> Result<(), DriveError> {
    match existing {
        Some(file) => drive.update_file(&file.id, mime_type, data).await,
        None => drive.create_file(parent_id, name, mime_type, data).await.map(|_| ()),
    }
}

/// Escape a value for use inside single quotes in a Drive `q` filter
pub(crate) fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
