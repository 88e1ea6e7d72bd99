//! In-memory progress store.  Serves as the fast cache in the binary and as
//! the store double in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ProgressRecord, ProgressStore, StoreError};
use crate::session::ChapterId;

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<ChapterId, ProgressRecord>,
    writes: Vec<(ChapterId, ProgressRecord)>,
    failing_writes: u32,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a chapter's record.
    pub fn with_record(self, chapter: ChapterId, last_index: usize) -> Self {
        self.with(|inner| {
            inner.records.insert(
                chapter,
                ProgressRecord {
                    last_index,
                    is_complete: false,
                },
            );
        });
        self
    }

    pub fn record(&self, chapter: &ChapterId) -> Option<ProgressRecord> {
        self.with(|inner| inner.records.get(chapter).copied())
    }

    /// Every successful write, oldest first.
    pub fn writes(&self) -> Vec<(ChapterId, ProgressRecord)> {
        self.with(|inner| inner.writes.clone())
    }

    pub fn fail_next_writes(&self, n: u32) {
        self.with(|inner| inner.failing_writes = n);
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn read_last_index(&self, chapter: &ChapterId) -> Result<Option<usize>, StoreError> {
        Ok(self.record(chapter).map(|r| r.last_index))
    }

    async fn write_last_index(
        &self,
        chapter: &ChapterId,
        index: usize,
        is_complete: bool,
    ) -> Result<(), StoreError> {
        self.with(|inner| {
            if inner.failing_writes > 0 {
                inner.failing_writes -= 1;
                return Err(StoreError::Unavailable);
            }
            let record = ProgressRecord {
                last_index: index,
                is_complete,
            };
            inner.records.insert(chapter.clone(), record);
            inner.writes.push((chapter.clone(), record));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read() {
        let store = MemoryStore::new();
        let chapter = ChapterId::from(3);

        assert_eq!(store.read_last_index(&chapter).await.unwrap(), None);
        store.write_last_index(&chapter, 17, false).await.unwrap();
        assert_eq!(store.read_last_index(&chapter).await.unwrap(), Some(17));
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_leave_record_untouched() {
        let store = MemoryStore::new().with_record(ChapterId::from(3), 4);
        store.fail_next_writes(1);

        assert!(store.write_last_index(&ChapterId::from(3), 9, true).await.is_err());
        assert_eq!(store.record(&ChapterId::from(3)).map(|r| r.last_index), Some(4));
        assert!(store.writes().is_empty());
    }
}
