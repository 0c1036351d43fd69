//! Synchronous in-memory copy of every persisted [`FileRecord`].
//!
//! All reads in the navigator go through the mirror. It never writes through
//! to the persistent store; [`crate::VaultDatabase`] owns the dual write.
//! Iteration follows insertion order: overwriting a path keeps its position,
//! deleting and re-adding it moves it to the end.

use crate::models::{ContentKind, FileChange, FileContentPatch, FileRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const RECORD_OVERHEAD_BYTES: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MirrorStats {
    pub file_count: usize,
    pub approximate_memory_bytes: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    record: FileRecord,
}

#[derive(Debug, Default)]
pub struct MemoryMirror {
    entries: HashMap<String, Entry>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
    ready: bool,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole mirror. A path listed twice keeps its first
    /// position and its last record.
    pub fn initialize<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = (String, FileRecord)>,
    {
        self.entries.clear();
        self.order.clear();
        self.next_seq = 0;
        for (path, record) in records {
            self.upsert(path, record);
        }
        self.ready = true;
        debug!("mirror initialized with {} records", self.entries.len());
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_file(&self, path: &str) -> Option<&FileRecord> {
        self.entries.get(path).map(|e| &e.record)
    }

    /// Batch lookup; missing paths are left out.
    pub fn get_files<I, P>(&self, paths: I) -> Vec<(&str, &FileRecord)>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        paths
            .into_iter()
            .filter_map(|p| {
                self.entries
                    .get_key_value(p.as_ref())
                    .map(|(k, e)| (k.as_str(), &e.record))
            })
            .collect()
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn has_preview(&self, path: &str) -> bool {
        self.get_file(path)
            .map(|r| r.preview.is_some())
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileRecord)> + '_ {
        self.order.values().filter_map(move |path| {
            self.entries
                .get_key_value(path)
                .map(|(k, e)| (k.as_str(), &e.record))
        })
    }

    pub fn get_all_files(&self) -> Vec<&FileRecord> {
        self.iter().map(|(_, r)| r).collect()
    }

    pub fn get_all_files_with_paths(&self) -> Vec<(&str, &FileRecord)> {
        self.iter().collect()
    }

    /// Upserts a whole record and returns the watched-field diff.
    pub fn update_file(&mut self, path: &str, record: FileRecord) -> FileChange {
        let change = FileChange::between(self.get_file(path), &record);
        self.upsert(path.to_string(), record);
        change
    }

    pub fn batch_update<I>(&mut self, records: I) -> Vec<(String, FileChange)>
    where
        I: IntoIterator<Item = (String, FileRecord)>,
    {
        records
            .into_iter()
            .map(|(path, record)| {
                let change = self.update_file(&path, record);
                (path, change)
            })
            .collect()
    }

    /// Applies a partial patch. Patching an unknown path creates the record.
    pub fn update_file_content(&mut self, path: &str, patch: &FileContentPatch) -> FileChange {
        let before = self.get_file(path).cloned();
        let mut record = before.clone().unwrap_or_default();
        patch.apply_to(&mut record);
        let change = FileChange::between(before.as_ref(), &record);
        self.upsert(path.to_string(), record);
        change
    }

    pub fn batch_update_file_content<I>(&mut self, patches: I) -> Vec<(String, FileChange)>
    where
        I: IntoIterator<Item = (String, FileContentPatch)>,
    {
        patches
            .into_iter()
            .map(|(path, patch)| {
                let change = self.update_file_content(&path, &patch);
                (path, change)
            })
            .collect()
    }

    /// Removes a record; absent paths are a no-op.
    pub fn delete_file(&mut self, path: &str) -> Option<FileRecord> {
        let entry = self.entries.remove(path)?;
        self.order.remove(&entry.seq);
        Some(entry.record)
    }

    /// Drops content fields from every record while keeping the entries.
    /// Returns the diff of each record that actually lost something.
    pub fn clear_all_file_content(&mut self, kind: ContentKind) -> Vec<(String, FileChange)> {
        let mut changes = Vec::new();
        for path in self.order.values() {
            let Some(entry) = self.entries.get_mut(path) else {
                continue;
            };
            let before = entry.record.clone();
            if kind.clear(&mut entry.record) {
                let change = FileChange::between(Some(&before), &entry.record);
                changes.push((path.clone(), change));
            }
        }
        debug!("cleared {:?} content from {} records", kind, changes.len());
        changes
    }

    pub fn get_stats(&self) -> MirrorStats {
        let approximate_memory_bytes = self
            .entries
            .iter()
            .map(|(path, e)| RECORD_OVERHEAD_BYTES + path.len() + record_bytes(&e.record))
            .sum();
        MirrorStats {
            file_count: self.entries.len(),
            approximate_memory_bytes,
        }
    }

    fn upsert(&mut self, path: String, record: FileRecord) {
        if let Some(entry) = self.entries.get_mut(&path) {
            entry.record = record;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, path.clone());
        self.entries.insert(path, Entry { seq, record });
    }
}

fn record_bytes(record: &FileRecord) -> usize {
    let text = |s: &Option<String>| s.as_ref().map(String::len).unwrap_or(0);
    let tags = record
        .tags
        .as_ref()
        .map(|t| t.iter().map(|s| s.len() + 24).sum())
        .unwrap_or(0);
    let metadata = record.metadata.as_ref().map(value_bytes).unwrap_or(0);
    text(&record.preview) + text(&record.feature_image) + tags + metadata
}

fn value_bytes(value: &serde_json::Value) -> usize {
    use serde_json::Value;
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => 8,
        Value::String(s) => s.len() + 24,
        Value::Array(items) => 24 + items.iter().map(value_bytes).sum::<usize>(),
        Value::Object(map) => {
            32 + map
                .iter()
                .map(|(k, v)| k.len() + 24 + value_bytes(v))
                .sum::<usize>()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(preview: &str, tags: &[&str]) -> FileRecord {
        FileRecord {
            mtime: 0,
            preview: Some(preview.to_string()),
            feature_image: Some(format!("{preview}.png")),
            tags: Some(tags.iter().map(|t| t.to_string()).collect()),
            metadata: None,
        }
    }

    #[test]
    fn initialize_replaces_contents_and_marks_ready() {
        let mut mirror = MemoryMirror::new();
        assert!(!mirror.is_ready());
        mirror.update_file("stale.md", FileRecord::default());

        let input = vec![
            ("b.md".to_string(), record("b", &["x"])),
            ("a.md".to_string(), record("a", &[])),
        ];
        mirror.initialize(input.clone());

        assert!(mirror.is_ready());
        assert!(!mirror.has_file("stale.md"));
        let all: Vec<(String, FileRecord)> = mirror
            .get_all_files_with_paths()
            .into_iter()
            .map(|(p, r)| (p.to_string(), r.clone()))
            .collect();
        assert_eq!(all, input);
    }

    #[test]
    fn last_write_wins_for_every_path() {
        let mut mirror = MemoryMirror::new();
        mirror.update_file("a.md", record("1", &[]));
        mirror.update_file("b.md", record("2", &[]));
        mirror.update_file("a.md", record("3", &[]));
        mirror.delete_file("b.md");
        mirror.delete_file("b.md");
        mirror.update_file("c.md", record("4", &[]));
        mirror.delete_file("c.md");
        mirror.update_file("c.md", record("5", &[]));

        assert_eq!(mirror.get_file("a.md").unwrap().preview.as_deref(), Some("3"));
        assert!(mirror.get_file("b.md").is_none());
        assert_eq!(mirror.get_file("c.md").unwrap().preview.as_deref(), Some("5"));
        assert_eq!(mirror.len(), 2);
    }

    #[test]
    fn get_files_returns_only_found_entries() {
        let mut mirror = MemoryMirror::new();
        mirror.update_file("a.md", record("a", &[]));
        mirror.update_file("b.md", record("b", &[]));
        let found = mirror.get_files(["b.md", "missing.md", "a.md"]);
        let paths: Vec<&str> = found.iter().map(|(p, _)| *p).collect();
        assert_eq!(paths, vec!["b.md", "a.md"]);
    }

    #[test]
    fn patch_reports_only_changed_fields() {
        let mut mirror = MemoryMirror::new();
        mirror.update_file("a.md", record("a", &["t"]));
        let change = mirror.update_file_content(
            "a.md",
            &FileContentPatch::new().with_preview(Some("a".into())),
        );
        assert!(change.is_empty());

        let change = mirror.update_file_content(
            "a.md",
            &FileContentPatch::new().with_feature_image(None),
        );
        assert_eq!(change.feature_image, Some(None));
        assert_eq!(change.preview, None);
        assert_eq!(mirror.get_file("a.md").unwrap().preview.as_deref(), Some("a"));
    }

    #[test]
    fn patch_on_unknown_path_creates_record() {
        let mut mirror = MemoryMirror::new();
        let change =
            mirror.update_file_content("new.md", &FileContentPatch::new().with_tags(Some(vec![])));
        assert_eq!(change.tags, Some(Some(vec![])));
        assert_eq!(mirror.get_file("new.md").unwrap().tags, Some(vec![]));
        assert!(!mirror.has_preview("new.md"));
    }

    #[test]
    fn batch_patch_touches_only_present_fields() {
        let mut mirror = MemoryMirror::new();
        mirror.update_file("a.md", record("a", &["x"]));
        mirror.update_file("b.md", record("b", &["y"]));

        let changes = mirror.batch_update_file_content(vec![
            (
                "a.md".to_string(),
                FileContentPatch::new().with_preview(Some("a2".into())),
            ),
            ("b.md".to_string(), FileContentPatch::new().with_feature_image(None)),
        ]);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].0, "a.md");
        assert_eq!(changes[0].1.preview, Some(Some("a2".to_string())));
        assert_eq!(changes[0].1.feature_image, None);
        assert_eq!(changes[1].1.feature_image, Some(None));
        assert_eq!(changes[1].1.preview, None);

        let a = mirror.get_file("a.md").unwrap();
        assert_eq!(a.feature_image.as_deref(), Some("a.png"));
        assert_eq!(a.tags, Some(vec!["x".to_string()]));
        let b = mirror.get_file("b.md").unwrap();
        assert_eq!(b.preview.as_deref(), Some("b"));
        assert_eq!(b.feature_image, None);
    }

    #[test]
    fn clear_preview_keeps_other_fields() {
        let mut mirror = MemoryMirror::new();
        mirror.update_file("a.md", record("a", &["x"]));
        mirror.update_file("b.md", record("b", &[]));
        mirror.update_file("c.md", FileRecord::default());

        let changes = mirror.clear_all_file_content(ContentKind::Preview);
        assert_eq!(changes.len(), 2);
        for (_, r) in mirror.get_all_files_with_paths() {
            assert_eq!(r.preview, None);
        }
        assert_eq!(
            mirror.get_file("a.md").unwrap().feature_image.as_deref(),
            Some("a.png")
        );
        assert_eq!(mirror.get_file("a.md").unwrap().tags, Some(vec!["x".into()]));
        assert_eq!(mirror.len(), 3);
    }

    #[test]
    fn stats_track_count_and_shrink_after_clear() {
        let mut mirror = MemoryMirror::new();
        mirror.update_file("a.md", record(&"long preview ".repeat(20), &["x"]));
        let before = mirror.get_stats();
        assert_eq!(before.file_count, 1);
        mirror.clear_all_file_content(ContentKind::All);
        let after = mirror.get_stats();
        assert_eq!(after.file_count, 1);
        assert!(after.approximate_memory_bytes < before.approximate_memory_bytes);
    }
}
