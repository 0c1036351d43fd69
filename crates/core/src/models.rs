use serde::{Deserialize, Deserializer, Serialize};

pub use storage::models::FileRecord;

/// Partial update for a [`FileRecord`].
///
/// The outer `Option` says whether a field takes part in the patch; the
/// inner one is the new value, so `Some(None)` clears the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileContentPatch {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub preview: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub feature_image: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub tags: Option<Option<Vec<String>>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub metadata: Option<Option<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
}

impl FileContentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preview(mut self, preview: Option<String>) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn with_feature_image(mut self, feature_image: Option<String>) -> Self {
        self.feature_image = Some(feature_image);
        self
    }

    pub fn with_tags(mut self, tags: Option<Vec<String>>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_metadata(mut self, metadata: Option<serde_json::Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_mtime(mut self, mtime: i64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.preview.is_none()
            && self.feature_image.is_none()
            && self.tags.is_none()
            && self.metadata.is_none()
            && self.mtime.is_none()
    }

    pub fn apply_to(&self, record: &mut FileRecord) {
        if let Some(preview) = &self.preview {
            record.preview = preview.clone();
        }
        if let Some(feature_image) = &self.feature_image {
            record.feature_image = feature_image.clone();
        }
        if let Some(tags) = &self.tags {
            record.tags = tags.clone();
        }
        if let Some(metadata) = &self.metadata {
            record.metadata = metadata.clone();
        }
        if let Some(mtime) = self.mtime {
            record.mtime = mtime;
        }
    }
}

/// Field-level diff delivered to change subscribers.
///
/// A `None` field is unchanged. A cleared field is `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_image: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Option<Vec<String>>>,
}

impl FileChange {
    /// Diff of the watched fields. A missing `before` compares against an
    /// empty record.
    pub fn between(before: Option<&FileRecord>, after: &FileRecord) -> Self {
        let empty = FileRecord::default();
        let before = before.unwrap_or(&empty);
        Self {
            preview: changed(&before.preview, &after.preview),
            feature_image: changed(&before.feature_image, &after.feature_image),
            tags: changed(&before.tags, &after.tags),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.preview.is_none() && self.feature_image.is_none() && self.tags.is_none()
    }

    pub fn touches_tags(&self) -> bool {
        self.tags.is_some()
    }
}

fn changed<T: Clone + PartialEq>(before: &Option<T>, after: &Option<T>) -> Option<Option<T>> {
    (before != after).then(|| after.clone())
}

/// Content fields that can be bulk-cleared from every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Preview,
    FeatureImage,
    Metadata,
    All,
}

impl ContentKind {
    /// Clears the selected fields; returns whether anything was removed.
    pub fn clear(self, record: &mut FileRecord) -> bool {
        let clear_preview = matches!(self, ContentKind::Preview | ContentKind::All);
        let clear_image = matches!(self, ContentKind::FeatureImage | ContentKind::All);
        let clear_metadata = matches!(self, ContentKind::Metadata | ContentKind::All);
        let mut cleared = false;
        if clear_preview {
            cleared |= record.preview.take().is_some();
        }
        if clear_image {
            cleared |= record.feature_image.take().is_some();
        }
        if clear_metadata {
            cleared |= record.metadata.take().is_some();
        }
        cleared
    }
}

// Keeps an explicit `null` distinct from an absent key.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
