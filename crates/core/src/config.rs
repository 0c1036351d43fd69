use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigatorConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub tags: TagConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "navigator.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub root: String,
    /// Globs matched against vault-relative paths.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            exclude: Vec::new(),
            extensions: default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Folders whose notes never contribute to the tag tree.
    #[serde(default)]
    pub excluded_folders: Vec<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            excluded_folders: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_true")]
    pub show_previews: bool,
    #[serde(default = "default_true")]
    pub show_feature_images: bool,
    #[serde(default = "default_true")]
    pub keep_metadata: bool,
    #[serde(default = "default_preview_length")]
    pub preview_length: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            show_previews: true,
            show_feature_images: true,
            keep_metadata: true,
            preview_length: default_preview_length(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}

fn default_max_depth() -> usize {
    crate::tag_tree::DEFAULT_MAX_DEPTH
}

fn default_true() -> bool {
    true
}

fn default_preview_length() -> usize {
    200
}

/// Loads `path` (or an optional `config/default.*`), then `VAULT_NAV__*`
/// environment overrides, e.g. `VAULT_NAV__DATABASE__PATH`.
pub fn load(path: Option<&str>) -> anyhow::Result<NavigatorConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("VAULT_NAV")
            .prefix_separator("__")
            .separator("__"),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nav.toml");
        std::fs::write(
            &file,
            r#"
            [tags]
            excluded_folders = ["Archive"]

            [content]
            show_previews = false
            "#,
        )
        .unwrap();

        let cfg = load(Some(file.to_str().unwrap())).unwrap();
        assert_eq!(cfg.database.path, "navigator.db");
        assert_eq!(cfg.vault.extensions, vec!["md"]);
        assert_eq!(cfg.tags.max_depth, crate::tag_tree::DEFAULT_MAX_DEPTH);
        assert_eq!(cfg.tags.excluded_folders, vec!["Archive"]);
        assert!(!cfg.content.show_previews);
        assert!(cfg.content.show_feature_images);
        assert_eq!(cfg.content.preview_length, 200);
    }
}
