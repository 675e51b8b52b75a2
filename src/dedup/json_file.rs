use std::collections::HashMap;
use std::path::{Path, PathBuf};

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use tokio::sync::Mutex;

use crate::dedup::DedupStore;
use crate::error::StorageError;

/// Key/value snapshot kept in memory and rewritten to disk on every `set`.
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Load the snapshot at `path`; a missing file starts empty.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .change_context(StorageError::Open)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let state = match tokio::fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .change_context(StorageError::Open)
                .attach_with(|| format!("corrupt snapshot: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(Report::new(e)
                    .change_context(StorageError::Open)
                    .attach(format!("path: {}", path.display())));
            }
        };

        Ok(Self {
            path: path.to_owned(),
            state: Mutex::new(state),
        })
    }
}

impl DedupStore for JsonFileStore {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, Report<StorageError>>> {
        let key = key.to_owned();
        Box::pin(async move { Ok(self.state.lock().await.get(&key).cloned()) })
    }

    fn set(&self, key: &str, value: &str) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let key = key.to_owned();
        let value = value.to_owned();
        Box::pin(async move {
            // Held across the write so snapshots land in order.
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            next.insert(key, value);
            let bytes = serde_json::to_vec_pretty(&next).change_context(StorageError::Write)?;
            tokio::fs::write(&self.path, bytes)
                .await
                .change_context(StorageError::Write)
                .attach_with(|| format!("path: {}", self.path.display()))?;
            *state = next;
            Ok(())
        })
    }
}
