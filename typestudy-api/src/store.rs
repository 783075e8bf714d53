//! Shared documents kept in the Drive root folder
//!
//! [`CounterStore`] owns `counter.json`, [`TrackingStore`] owns
//! `tracking.csv`. Each operation is a whole-document read-modify-write.
//! The mutexes only serialize writers inside this process; separate
//! instances of the service can still overwrite each other's updates.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use typestudy_common::counter::{
    parse_participant_id, Completion, CounterRecord, Person, Registration, SessionStart,
};
use typestudy_common::tracking::{TrackingRow, TrackingSheet};

use crate::drive::{self, DriveError, DriveFile, DriveStore, CSV_MIME_TYPE, JSON_MIME_TYPE};
use crate::error::{ApiError, ApiResult};
use crate::retry::retry_read;

/// Where a shared document lives and how its reads are retried
#[derive(Debug, Clone)]
pub struct DocumentLocation {
    pub folder_id: String,
    pub file_name: String,
    pub read_retries: u32,
    pub retry_backoff: Duration,
}

async fn fetch_document(
    drive: &dyn DriveStore,
    location: &DocumentLocation,
) -> Result<Option<(DriveFile, Vec<u8>)>, DriveError> {
    match drive.find_file(&location.folder_id, &location.file_name).await? {
        Some(file) => {
            let bytes = drive.download(&file.id).await?;
            Ok(Some((file, bytes)))
        }
        None => Ok(None),
    }
}

/// Fetch a document by name; `None` when it does not exist yet
async fn read_document(
    drive: &dyn DriveStore,
    location: &DocumentLocation,
) -> ApiResult<Option<(DriveFile, String)>> {
    let operation = format!("read {}", location.file_name);

    let found = retry_read(&operation, location.read_retries, location.retry_backoff, || {
        fetch_document(drive, location)
    })
    .await?;

    match found {
        Some((file, bytes)) => {
            let text = String::from_utf8(bytes).map_err(|e| {
                ApiError::Internal(format!("{} is not valid UTF-8: {}", location.file_name, e))
            })?;
            Ok(Some((file, text)))
        }
        None => Ok(None),
    }
}

/// What to do when `counter.json` is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WhenMissing {
    Create,
    Fail,
}

/// Read-modify-write access to the participant counter
pub struct CounterStore {
    drive: Arc<dyn DriveStore>,
    location: DocumentLocation,
    lock: Mutex<()>,
}

impl CounterStore {
    pub fn new(drive: Arc<dyn DriveStore>, location: DocumentLocation) -> Self {
        Self {
            drive,
            location,
            lock: Mutex::new(()),
        }
    }

    /// Current counter document, empty when the file does not exist
    pub async fn snapshot(&self) -> ApiResult<CounterRecord> {
        Ok(self.load().await?.1)
    }

    /// Look up or create the participant for a device
    pub async fn register(&self, device_id: &str) -> ApiResult<Registration> {
        self.modify(device_id, WhenMissing::Create, |counter, external| {
            counter.register(device_id, external, Utc::now())
        })
        .await
    }

    /// Open a session for a device's person slot, registering it if needed
    pub async fn contact(&self, device_id: &str, person: Option<Person>) -> ApiResult<SessionStart> {
        self.modify(device_id, WhenMissing::Create, |counter, external| {
            counter.contact(device_id, person, external, Utc::now())
        })
        .await
    }

    /// Record a completed submission
    pub async fn complete(&self, device_id: &str, person: Person) -> ApiResult<Completion> {
        self.modify(device_id, WhenMissing::Fail, |counter, _| {
            counter.complete(device_id, person, Utc::now())
        })
        .await
    }

    async fn load(&self) -> ApiResult<(Option<DriveFile>, CounterRecord)> {
        match read_document(self.drive.as_ref(), &self.location).await? {
            Some((file, text)) => Ok((Some(file), CounterRecord::from_json(&text)?)),
            None => Ok((None, CounterRecord::default())),
        }
    }

    /// Participant numbers taken by folders in the root folder
    async fn folder_numbers(&self) -> ApiResult<Vec<u32>> {
        let folders = self.drive.list_folders(&self.location.folder_id).await?;
        Ok(folders
            .iter()
            .filter_map(|f| parse_participant_id(&f.name))
            .collect())
    }

    async fn modify<F, T>(&self, device_id: &str, when_missing: WhenMissing, mutate: F) -> ApiResult<T>
    where
        F: FnOnce(&mut CounterRecord, Vec<u32>) -> typestudy_common::Result<T>,
    {
        let _guard = self.lock.lock().await;

        let (file, mut counter) = self.load().await?;
        if file.is_none() && when_missing == WhenMissing::Fail {
            return Err(ApiError::NotFound(format!("{} not found", self.location.file_name)));
        }

        // Folders only matter when a new identifier may be issued
        let may_issue = when_missing == WhenMissing::Create;
        let external = if may_issue && counter.participant(device_id.trim()).is_none() {
            self.folder_numbers().await?
        } else {
            Vec::new()
        };

        let result = mutate(&mut counter, external)?;

        let text = counter.to_json()?;
        drive::write_file(
            self.drive.as_ref(),
            &self.location.folder_id,
            file.as_ref(),
            &self.location.file_name,
            JSON_MIME_TYPE,
            text.into_bytes(),
        )
        .await?;

        debug!(
            file = %self.location.file_name,
            participants = counter.device_participants.len(),
            "Counter saved"
        );
        Ok(result)
    }
}

/// Append-only access to the tracking sheet
pub struct TrackingStore {
    drive: Arc<dyn DriveStore>,
    location: DocumentLocation,
    lock: Mutex<()>,
}

impl TrackingStore {
    pub fn new(drive: Arc<dyn DriveStore>, location: DocumentLocation) -> Self {
        Self {
            drive,
            location,
            lock: Mutex::new(()),
        }
    }

    /// Append a row and return the total number of rows
    pub async fn append(&self, row: TrackingRow) -> ApiResult<usize> {
        let _guard = self.lock.lock().await;

        let existing = read_document(self.drive.as_ref(), &self.location).await?;
        let (file, mut sheet) = match existing {
            Some((file, text)) => (Some(file), TrackingSheet::parse_or_fresh(&text)),
            None => {
                info!(file = %self.location.file_name, "Creating new tracking sheet");
                (None, TrackingSheet::default())
            }
        };

        sheet.push(row);
        let text = sheet.to_csv()?;

        drive::write_file(
            self.drive.as_ref(),
            &self.location.folder_id,
            file.as_ref(),
            &self.location.file_name,
            CSV_MIME_TYPE,
            text.into_bytes(),
        )
        .await?;

        Ok(sheet.len())
    }
}
