//! Durable progress store backed by a single JSON file.
//!
//! The whole map is rewritten on every save: write to `<file>.tmp`, then
//! rename over the original, so a crash mid-write leaves the previous
//! contents intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ProgressRecord, ProgressStore, StoreError};
use crate::session::ChapterId;

type ProgressMap = BTreeMap<String, ProgressRecord>;

pub struct JsonFileStore {
    path: PathBuf,
    /// Serialises read-modify-write cycles.
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<ProgressMap, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(ProgressMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProgressMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, map: &ProgressMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(map)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for JsonFileStore {
    async fn read_last_index(&self, chapter: &ChapterId) -> Result<Option<usize>, StoreError> {
        let _guard = self.lock.lock().await;
        let map = self.load().await?;
        Ok(map.get(chapter.as_str()).map(|r| r.last_index))
    }

    async fn write_last_index(
        &self,
        chapter: &ChapterId,
        index: usize,
        is_complete: bool,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.load().await?;
        map.insert(
            chapter.as_str().to_string(),
            ProgressRecord {
                last_index: index,
                is_complete,
            },
        );
        self.persist(&map).await?;
        log::debug!("store: saved chapter {chapter} at {index} (complete: {is_complete})");
        Ok(())
    }
}
