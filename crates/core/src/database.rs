//! Dual-write facade over the persistent store and the memory mirror.
//!
//! Every mutation lands in the mirror first, so a read issued right after a
//! write sees it even before the store write has finished. Change
//! notifications go out before the store write as well. The tag index is
//! rebuilt lazily on the first read after a mutation that touched tags or
//! removed a tagged file, which batches rebuilds during bulk rescans.

use crate::config::ContentConfig;
use crate::error::Result;
use crate::mirror::{MemoryMirror, MirrorStats};
use crate::models::{ContentKind, FileChange, FileContentPatch, FileRecord};
use crate::notify::{ChangeHub, Subscription};
use crate::tag_tree::{build_tag_tree_from_database, TagIndex, TagTreeOptions};
use storage::FileStore;
use tracing::{debug, info, warn};

pub struct VaultDatabase<S> {
    store: S,
    mirror: MemoryMirror,
    hub: ChangeHub,
    tag_options: TagTreeOptions,
    tag_index: Option<TagIndex>,
}

impl<S: FileStore> VaultDatabase<S> {
    /// Creates an unloaded database; [`VaultDatabase::is_ready`] stays false
    /// until [`VaultDatabase::reload`] runs.
    pub fn new(store: S, tag_options: TagTreeOptions) -> Self {
        Self {
            store,
            mirror: MemoryMirror::new(),
            hub: ChangeHub::new(),
            tag_options,
            tag_index: None,
        }
    }

    pub async fn open(store: S, tag_options: TagTreeOptions) -> Result<Self> {
        let mut db = Self::new(store, tag_options);
        db.reload().await?;
        Ok(db)
    }

    /// Replaces the mirror wholesale from the store's bulk load.
    pub async fn reload(&mut self) -> Result<usize> {
        let records = self.store.bulk_load().await?;
        let count = records.len();
        self.mirror.initialize(records);
        self.tag_index = None;
        info!("loaded {} file records", count);
        Ok(count)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn mirror(&self) -> &MemoryMirror {
        &self.mirror
    }

    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    pub fn is_ready(&self) -> bool {
        self.mirror.is_ready()
    }

    pub fn get_file(&self, path: &str) -> Option<&FileRecord> {
        self.mirror.get_file(path)
    }

    pub fn get_files<I, P>(&self, paths: I) -> Vec<(&str, &FileRecord)>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        self.mirror.get_files(paths)
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.mirror.has_file(path)
    }

    pub fn has_preview(&self, path: &str) -> bool {
        self.mirror.has_preview(path)
    }

    pub fn get_all_files(&self) -> Vec<&FileRecord> {
        self.mirror.get_all_files()
    }

    pub fn get_all_files_with_paths(&self) -> Vec<(&str, &FileRecord)> {
        self.mirror.get_all_files_with_paths()
    }

    pub fn get_stats(&self) -> MirrorStats {
        self.mirror.get_stats()
    }

    pub fn subscribe<F>(&self, path: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&FileChange) + Send + Sync + 'static,
    {
        self.hub.subscribe(path, callback)
    }

    pub async fn update_file(&mut self, path: &str, record: FileRecord) -> Result<()> {
        let change = self.mirror.update_file(path, record.clone());
        self.after_change(path, &change);
        self.persist(path, &record).await
    }

    pub async fn update_file_content(&mut self, path: &str, patch: FileContentPatch) -> Result<()> {
        let change = self.mirror.update_file_content(path, &patch);
        self.after_change(path, &change);
        let record = self.mirror.get_file(path).cloned().unwrap_or_default();
        self.persist(path, &record).await
    }

    pub async fn batch_update(&mut self, records: Vec<(String, FileRecord)>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let changes = self.mirror.batch_update(records.iter().cloned());
        self.after_changes(&changes);
        self.persist_many(records).await
    }

    pub async fn batch_update_file_content(
        &mut self,
        patches: Vec<(String, FileContentPatch)>,
    ) -> Result<()> {
        if patches.is_empty() {
            return Ok(());
        }
        let changes = self.mirror.batch_update_file_content(patches);
        self.after_changes(&changes);
        let records = self.snapshot(changes.iter().map(|(p, _)| p.as_str()));
        self.persist_many(records).await
    }

    /// No-op when the path is unknown.
    pub async fn delete_file(&mut self, path: &str) -> Result<()> {
        let Some(removed) = self.mirror.delete_file(path) else {
            return Ok(());
        };
        if removed.tags.is_some() {
            self.tag_index = None;
        }
        self.store.delete(path).await.map_err(|e| {
            warn!("store delete failed for {}: {}", path, e);
            e.into()
        })
    }

    pub async fn delete_files(&mut self, paths: &[String]) -> Result<()> {
        let mut removed = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(record) = self.mirror.delete_file(path) {
                if record.tags.is_some() {
                    self.tag_index = None;
                }
                removed.push(path.clone());
            }
        }
        if removed.is_empty() {
            return Ok(());
        }
        self.store.delete_many(&removed).await?;
        Ok(())
    }

    /// Clears a content field from every record, in memory and in the store.
    pub async fn clear_all_file_content(&mut self, kind: ContentKind) -> Result<usize> {
        let changes = self.mirror.clear_all_file_content(kind);
        self.after_changes(&changes);
        let records = self.snapshot(changes.iter().map(|(p, _)| p.as_str()));
        let cleared = records.len();
        self.persist_many(records).await?;
        Ok(cleared)
    }

    /// Drops content for every display feature that is switched off.
    pub async fn apply_content_settings(&mut self, content: &ContentConfig) -> Result<usize> {
        let mut cleared = 0;
        if !content.show_previews {
            cleared += self.clear_all_file_content(ContentKind::Preview).await?;
        }
        if !content.show_feature_images {
            cleared += self.clear_all_file_content(ContentKind::FeatureImage).await?;
        }
        if !content.keep_metadata {
            cleared += self.clear_all_file_content(ContentKind::Metadata).await?;
        }
        Ok(cleared)
    }

    /// Current tag index, rebuilt first if a mutation invalidated it.
    pub fn tag_index(&mut self) -> &TagIndex {
        self.tag_index
            .get_or_insert_with(|| build_tag_tree_from_database(&self.mirror, &self.tag_options))
    }

    pub fn rebuild_tag_index(&mut self) -> &TagIndex {
        self.tag_index = None;
        self.tag_index()
    }

    pub fn tag_options(&self) -> &TagTreeOptions {
        &self.tag_options
    }

    fn after_change(&mut self, path: &str, change: &FileChange) {
        if change.touches_tags() {
            self.tag_index = None;
        }
        self.hub.notify(path, change);
    }

    fn after_changes(&mut self, changes: &[(String, FileChange)]) {
        if changes.iter().any(|(_, c)| c.touches_tags()) {
            self.tag_index = None;
        }
        let delivered = self.hub.notify_all(changes);
        debug!("{} changes, {} deliveries", changes.len(), delivered);
    }

    fn snapshot<'a, I>(&self, paths: I) -> Vec<(String, FileRecord)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.mirror
            .get_files(paths)
            .into_iter()
            .map(|(p, r)| (p.to_string(), r.clone()))
            .collect()
    }

    async fn persist(&self, path: &str, record: &FileRecord) -> Result<()> {
        self.store.put(path, record).await.map_err(|e| {
            warn!("store write failed for {}: {}", path, e);
            e.into()
        })
    }

    async fn persist_many(&self, records: Vec<(String, FileRecord)>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.store.put_many(&records).await.map_err(|e| {
            warn!("store batch write of {} records failed: {}", records.len(), e);
            e.into()
        })
    }
}
