//! Walks the vault, extracts note content and writes records through the
//! [`VaultDatabase`].

use crate::config::{ContentConfig, VaultConfig};
use crate::database::VaultDatabase;
use crate::extractor;
use crate::models::FileRecord;
use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use storage::FileStore;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub discovered: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    /// Entries that could not be read; their existing records are kept.
    pub failed: usize,
}

#[derive(Debug)]
enum ScannedNote {
    Unchanged(String),
    Changed(String, FileRecord),
    /// Vault-relative path of an unreadable file or directory. `None` when
    /// the walker could not say where it failed.
    Failed(Option<String>),
}

pub async fn scan_vault<S: FileStore>(
    db: &mut VaultDatabase<S>,
    vault: &VaultConfig,
    content: &ContentConfig,
) -> anyhow::Result<ScanSummary> {
    let root = PathBuf::from(&vault.root);
    anyhow::ensure!(root.is_dir(), "vault root {:?} is not a directory", root);

    let exclude_set = build_globset(&vault.exclude)?;
    let extensions: Vec<String> = vault.extensions.iter().map(|e| e.to_lowercase()).collect();
    // Only files that were fully scanned before can be skipped by mtime.
    let known: HashMap<String, i64> = db
        .get_all_files_with_paths()
        .into_iter()
        .filter(|(_, r)| r.tags.is_some())
        .map(|(p, r)| (p.to_string(), r.mtime))
        .collect();
    let content_cfg = content.clone();
    let (tx, mut rx) = mpsc::channel(100);

    // Walker task
    let walker_handle = task::spawn_blocking(move || {
        for entry in WalkDir::new(&root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || should_descend(e.path(), &root, &exclude_set))
        {
            let note = match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if !entry.file_type().is_file() || !has_extension(path, &extensions) {
                        continue;
                    }
                    let Some(rel_path) = relative_path(&root, path) else {
                        continue;
                    };
                    let mtime = modified_nanos(path);
                    if known.get(&rel_path) == Some(&mtime) {
                        ScannedNote::Unchanged(rel_path)
                    } else {
                        match read_note(path, mtime, &content_cfg) {
                            Ok(record) => ScannedNote::Changed(rel_path, record),
                            Err(e) => {
                                warn!("failed to read {:?}: {}", path, e);
                                ScannedNote::Failed(Some(rel_path))
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("vault walk error: {}", e);
                    ScannedNote::Failed(e.path().and_then(|p| relative_path(&root, p)))
                }
            };

            if tx.blocking_send(note).is_err() {
                // Receiver dropped, stop walking.
                break;
            }
        }
    });

    let mut summary = ScanSummary::default();
    let mut seen = HashSet::new();
    let mut failed_prefixes = Vec::new();
    let mut keep_everything = false;
    let mut updates = Vec::new();
    while let Some(note) = rx.recv().await {
        match note {
            ScannedNote::Unchanged(path) => {
                summary.discovered += 1;
                summary.unchanged += 1;
                seen.insert(path);
            }
            ScannedNote::Changed(path, record) => {
                summary.discovered += 1;
                seen.insert(path.clone());
                updates.push((path, record));
            }
            ScannedNote::Failed(path) => {
                summary.failed += 1;
                match path {
                    Some(p) if !p.is_empty() => failed_prefixes.push(p),
                    _ => keep_everything = true,
                }
            }
        }
    }
    walker_handle.await.context("vault walker panicked")?;

    summary.updated = updates.len();
    db.batch_update(updates)
        .await
        .context("failed to store scanned notes")?;

    let gone: Vec<String> = if keep_everything {
        debug!("walk failed at an unknown location, keeping all unseen records");
        Vec::new()
    } else {
        db.get_all_files_with_paths()
            .into_iter()
            .filter(|(p, _)| !seen.contains(*p) && !under_any(p, &failed_prefixes))
            .map(|(p, _)| p.to_string())
            .collect()
    };
    summary.removed = gone.len();
    db.delete_files(&gone)
        .await
        .context("failed to drop removed notes")?;

    info!(
        "scan complete: {} discovered, {} updated, {} unchanged, {} removed, {} failed",
        summary.discovered, summary.updated, summary.unchanged, summary.removed, summary.failed
    );
    Ok(summary)
}

fn read_note(path: &Path, mtime: i64, content: &ContentConfig) -> crate::Result<FileRecord> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let extracted = extractor::extract_note(&text, content.preview_length);
    Ok(extracted.into_record(mtime, content))
}

/// True if `path` is one of `prefixes` or lies below one of them.
fn under_any(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        path == prefix
            || path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid exclude glob {pat:?}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn should_descend(path: &Path, root: &Path, excludes: &GlobSet) -> bool {
    if is_hidden(path) {
        return false;
    }
    match path.strip_prefix(root) {
        Ok(rel) => !excludes.is_match(rel),
        Err(_) => true,
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Vault-relative path with `/` separators.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}

/// Nanoseconds since the epoch, so edits within the same second still count.
fn modified_nanos(path: &Path) -> i64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_nanos()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag_tree::TagTreeOptions;
    use storage::MemoryFileStore;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn vault_config(root: &Path) -> VaultConfig {
        VaultConfig {
            root: root.to_string_lossy().into_owned(),
            exclude: vec!["Templates/**".to_string()],
            ..VaultConfig::default()
        }
    }

    #[tokio::test]
    async fn scan_picks_up_notes_and_skips_hidden_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "#project/alpha first note");
        write(dir.path(), "nested/b.md", "---\ntags: [Area]\n---\nbody");
        write(dir.path(), "nested/image.png", "not a note");
        write(dir.path(), ".obsidian/workspace.md", "#hidden");
        write(dir.path(), "Templates/t.md", "#template");

        let mut db = VaultDatabase::new(MemoryFileStore::new(), TagTreeOptions::default());
        let summary = scan_vault(&mut db, &vault_config(dir.path()), &ContentConfig::default())
            .await
            .unwrap();

        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.updated, 2);
        assert!(db.has_file("a.md"));
        assert!(db.has_file("nested/b.md"));
        assert!(!db.has_file(".obsidian/workspace.md"));
        assert!(!db.has_file("Templates/t.md"));
        assert_eq!(
            db.get_file("nested/b.md").unwrap().tags,
            Some(vec!["Area".to_string()])
        );
        assert!(db.tag_index().find("project/alpha").is_some());
    }

    #[tokio::test]
    async fn rescan_skips_unchanged_and_drops_removed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "#one");
        write(dir.path(), "b.md", "#two");
        let vault = vault_config(dir.path());
        let content = ContentConfig::default();

        let mut db = VaultDatabase::new(MemoryFileStore::new(), TagTreeOptions::default());
        scan_vault(&mut db, &vault, &content).await.unwrap();

        fs::remove_file(dir.path().join("b.md")).unwrap();
        write(dir.path(), "c.md", "#three");
        let summary = scan_vault(&mut db, &vault, &content).await.unwrap();

        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.removed, 1);
        assert!(!db.has_file("b.md"));
        assert!(db.store().get("b.md").await.unwrap().is_none());
        assert!(db.store().get("c.md").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let vault = VaultConfig {
            root: dir.path().join("nope").to_string_lossy().into_owned(),
            ..VaultConfig::default()
        };
        let mut db = VaultDatabase::new(MemoryFileStore::new(), TagTreeOptions::default());
        assert!(scan_vault(&mut db, &vault, &ContentConfig::default())
            .await
            .is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn walk_errors_keep_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "#one");
        write(dir.path(), "b.md", "#two");
        let vault = vault_config(dir.path());
        let content = ContentConfig::default();

        let mut db = VaultDatabase::new(MemoryFileStore::new(), TagTreeOptions::default());
        scan_vault(&mut db, &vault, &content).await.unwrap();

        // A dangling symlink cannot be followed, so the walker reports an error for it.
        fs::remove_file(dir.path().join("b.md")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing.md"), dir.path().join("b.md"))
            .unwrap();
        let summary = scan_vault(&mut db, &vault, &content).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.removed, 0);
        assert!(db.has_file("b.md"));
        assert!(db.store().get("b.md").await.unwrap().is_some());
    }

    #[test]
    fn unreadable_note_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_note(&dir.path().join("gone.md"), 0, &ContentConfig::default())
            .unwrap_err();
        assert!(matches!(err, crate::NavigatorError::Io(_)));
    }

    #[test]
    fn failed_prefixes_cover_their_subtree_only() {
        let prefixes = vec!["notes".to_string(), "a.md".to_string()];
        assert!(under_any("notes/x.md", &prefixes));
        assert!(under_any("a.md", &prefixes));
        assert!(!under_any("notes2/x.md", &prefixes));
        assert!(!under_any("b.md", &prefixes));
    }

    #[test]
    fn mtime_has_sub_second_resolution() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "x");
        let nanos = modified_nanos(&dir.path().join("a.md"));
        let secs = fs::metadata(dir.path().join("a.md"))
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        assert_eq!(nanos / 1_000_000_000, secs);
    }
}
