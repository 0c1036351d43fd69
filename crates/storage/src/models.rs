use serde::{Deserialize, Serialize};

/// Per-file record persisted by a [`crate::FileStore`] and mirrored in memory.
///
/// `tags == None` means the file has not been scanned yet; `Some(vec![])`
/// means it was scanned and carries no tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Modification time in nanoseconds since the Unix epoch.
    #[serde(default)]
    pub mtime: i64,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub feature_image: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl FileRecord {
    pub fn with_tags<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tags: Some(tags.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn has_content(&self) -> bool {
        self.preview.is_some() || self.feature_image.is_some() || self.metadata.is_some()
    }
}
