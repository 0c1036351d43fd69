use crate::models::FileRecord;
use crate::{FileStore, StoreError};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Volatile [`FileStore`] for tests and for hosts that bring their own
/// persistence. Keeps insertion order like the SQLite store.
#[derive(Default)]
pub struct MemoryFileStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    order: BTreeMap<u64, String>,
    records: HashMap<String, (u64, FileRecord)>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock still holds consistent data: every write below is a
        // single map operation.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Inner {
    fn put(&mut self, path: &str, record: FileRecord) {
        if let Some(slot) = self.records.get_mut(path) {
            slot.1 = record;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, path.to_string());
        self.records.insert(path.to_string(), (seq, record));
    }

    fn delete(&mut self, path: &str) {
        if let Some((seq, _)) = self.records.remove(path) {
            self.order.remove(&seq);
        }
    }
}

#[async_trait::async_trait]
impl FileStore for MemoryFileStore {
    async fn bulk_load(&self) -> Result<Vec<(String, FileRecord)>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .order
            .values()
            .filter_map(|path| {
                inner
                    .records
                    .get(path)
                    .map(|(_, record)| (path.clone(), record.clone()))
            })
            .collect())
    }

    async fn get(&self, path: &str) -> Result<Option<FileRecord>, StoreError> {
        Ok(self.lock().records.get(path).map(|(_, r)| r.clone()))
    }

    async fn put(&self, path: &str, record: &FileRecord) -> Result<(), StoreError> {
        self.lock().put(path, record.clone());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.lock().delete(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overwrite_keeps_position_and_reinsert_moves_to_end() {
        let store = MemoryFileStore::new();
        store.put("a.md", &FileRecord::with_tags(["a"])).await.unwrap();
        store.put("b.md", &FileRecord::with_tags(["b"])).await.unwrap();
        store.put("a.md", &FileRecord::with_tags(["a2"])).await.unwrap();

        let paths: Vec<String> = store
            .bulk_load()
            .await
            .unwrap()
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        assert_eq!(paths, vec!["a.md", "b.md"]);

        store.delete("a.md").await.unwrap();
        store.put("a.md", &FileRecord::default()).await.unwrap();
        let paths: Vec<String> = store
            .bulk_load()
            .await
            .unwrap()
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        assert_eq!(paths, vec!["b.md", "a.md"]);
        assert_eq!(store.len(), 2);
    }
}
