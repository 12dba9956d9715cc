//! Append-only store of completed uploads
//!
//! Records live in a single JSON array. Every append rewrites the file
//! through a temporary sibling and an atomic rename, so readers never see a
//! half-written array.

use crate::error::Result;
use crate::types::UploadRecord;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// JSON-file record store
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RecordStore {
    /// Open a store at `path`; the file is created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the record file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, oldest first
    ///
    /// A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`](crate::Error::Serialization) when the file is
    /// not a JSON array of records.
    pub async fn list(&self) -> Result<Vec<UploadRecord>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append one record
    pub async fn append(&self, record: &UploadRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.list().await?;
        records.push(record.clone());

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let payload = serde_json::to_vec_pretty(&records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(
            path = ?self.path,
            file_id = %record.file_id,
            total = records.len(),
            "upload record appended"
        );
        Ok(())
    }
}
