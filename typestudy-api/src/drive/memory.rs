//! In-process [`DriveStore`]
//!
//! Mirrors the Drive semantics the handlers rely on (parent/child lookup by
//! name, folders by MIME type, whole-file writes). Nothing survives a
//! restart.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DriveError, DriveFile, DriveStore, FOLDER_MIME_TYPE};

#[derive(Debug, Clone)]
struct Entry {
    file: DriveFile,
    parent_id: String,
    data: Vec<u8>,
    /// Insertion order, so lookups return the oldest match like Drive does
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct MemoryDrive {
    inner: RwLock<Inner>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert(&self, parent_id: &str, name: &str, mime_type: &str, data: Vec<u8>) -> DriveFile {
        let id = Uuid::new_v4().simple().to_string();
        let file = DriveFile {
            id: id.clone(),
            name: name.to_string(),
            mime_type: Some(mime_type.to_string()),
            web_view_link: Some(format!("memory://{}", id)),
        };

        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            id,
            Entry {
                file: file.clone(),
                parent_id: parent_id.to_string(),
                data,
                seq,
            },
        );
        file
    }

    async fn children<P>(&self, parent_id: &str, predicate: P) -> Vec<DriveFile>
    where
        P: Fn(&DriveFile) -> bool,
    {
        let inner = self.inner.read().await;
        let mut matches: Vec<&Entry> = inner
            .entries
            .values()
            .filter(|e| e.parent_id == parent_id && predicate(&e.file))
            .collect();
        matches.sort_by_key(|e| e.seq);
        matches.into_iter().map(|e| e.file.clone()).collect()
    }
}

#[async_trait]
impl DriveStore for MemoryDrive {
    async fn find_file(&self, parent_id: &str, name: &str) -> Result<Option<DriveFile>, DriveError> {
        Ok(self
            .children(parent_id, |f| f.name == name)
            .await
            .into_iter()
            .next())
    }

    async fn find_folder(&self, parent_id: &str, name: &str) -> Result<Option<DriveFile>, DriveError> {
        Ok(self
            .children(parent_id, |f| f.name == name && f.is_folder())
            .await
            .into_iter()
            .next())
    }

    async fn list_folders(&self, parent_id: &str) -> Result<Vec<DriveFile>, DriveError> {
        Ok(self.children(parent_id, DriveFile::is_folder).await)
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<DriveFile, DriveError> {
        Ok(self.insert(parent_id, name, FOLDER_MIME_TYPE, Vec::new()).await)
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, DriveError> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(file_id)
            .map(|e| e.data.clone())
            .ok_or_else(|| DriveError::NotFound(file_id.to_string()))
    }

    async fn create_file(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<DriveFile, DriveError> {
        Ok(self.insert(parent_id, name, mime_type, data).await)
    }

    async fn update_file(&self, file_id: &str, mime_type: &str, data: Vec<u8>) -> Result<(), DriveError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .entries
            .get_mut(file_id)
            .ok_or_else(|| DriveError::NotFound(file_id.to_string()))?;
        entry.data = data;
        entry.file.mime_type = Some(mime_type.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_is_scoped_to_parent() {
        let drive = MemoryDrive::new();
        let folder = drive.create_folder("root", "U001").await.unwrap();
        drive
            .create_file(&folder.id, "counter.json", "application/json", b"{}".to_vec())
            .await
            .unwrap();

        assert!(drive.find_file("root", "counter.json").await.unwrap().is_none());
        assert!(drive.find_file(&folder.id, "counter.json").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_find_folder_ignores_plain_files() {
        let drive = MemoryDrive::new();
        drive
            .create_file("root", "U001", "text/plain", Vec::new())
            .await
            .unwrap();

        assert!(drive.find_folder("root", "U001").await.unwrap().is_none());
        assert!(drive.list_folders("root").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oldest_duplicate_wins() {
        let drive = MemoryDrive::new();
        let first = drive.create_file("root", "a.csv", "text/csv", b"1".to_vec()).await.unwrap();
        drive.create_file("root", "a.csv", "text/csv", b"2".to_vec()).await.unwrap();

        let found = drive.find_file("root", "a.csv").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let drive = MemoryDrive::new();
        assert!(matches!(drive.download("nope").await, Err(DriveError::NotFound(_))));
        assert!(matches!(
            drive.update_file("nope", "text/csv", Vec::new()).await,
            Err(DriveError::NotFound(_))
        ));
    }
}
