//! Hierarchical tag index built from a [`MemoryMirror`] snapshot.
//!
//! The index is always rebuilt from scratch. Tag identity is
//! case-insensitive; the casing shown for a path is the first one met during
//! the build, so a rebuild may pick a different casing once the first
//! occurrence is gone.

use crate::counts::TagCountCache;
use crate::error::{NavigatorError, Result};
use crate::mirror::MemoryMirror;
use crate::models::FileRecord;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

pub const TAG_MARKER: char = '#';
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Children keyed by lower-cased full path.
pub type TagTree = BTreeMap<String, TagTreeNode>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagTreeNode {
    pub name: String,
    pub path: String,
    pub children: TagTree,
    /// Files tagged exactly at this node; descendants are not included.
    pub notes_with_tag: BTreeSet<String>,
}

impl TagTreeNode {
    pub fn new(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            name,
            path: path.to_string(),
            children: TagTree::new(),
            notes_with_tag: BTreeSet::new(),
        }
    }

    /// Case-normalized path, unique within one index.
    pub fn key(&self) -> String {
        self.path.to_lowercase()
    }

    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }
}

#[derive(Debug, Clone)]
pub struct TagTreeOptions {
    pub excluded_folders: Vec<String>,
    pub max_depth: usize,
}

impl Default for TagTreeOptions {
    fn default() -> Self {
        Self {
            excluded_folders: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl TagTreeOptions {
    /// Rejects excluded-folder patterns that do not compile. Building a tree
    /// with such patterns still works; they are skipped with a warning.
    pub fn validate(&self) -> Result<()> {
        for raw in &self.excluded_folders {
            if let Some((_, Err(source))) = folder_glob(raw) {
                return Err(NavigatorError::InvalidGlob {
                    pattern: raw.clone(),
                    source,
                });
            }
        }
        Ok(())
    }
}

impl From<&crate::config::TagConfig> for TagTreeOptions {
    fn from(cfg: &crate::config::TagConfig) -> Self {
        Self {
            excluded_folders: cfg.excluded_folders.clone(),
            max_depth: cfg.max_depth.max(1),
        }
    }
}

/// Result of one build: the tree, the untagged-file count and the count
/// cache that belongs to this tree.
///
/// `Send` but not `Sync`: the count cache memoizes through a `RefCell`, so an
/// index (and the `VaultDatabase` owning it) is used from one task at a time.
#[derive(Debug)]
pub struct TagIndex {
    tree: TagTree,
    untagged: usize,
    counts: TagCountCache,
}

impl TagIndex {
    pub fn tree(&self) -> &TagTree {
        &self.tree
    }

    pub fn untagged(&self) -> usize {
        self.untagged
    }

    /// Memoized; `node` must come from this index.
    pub fn get_total_note_count(&self, node: &TagTreeNode) -> usize {
        self.counts.total_note_count(node)
    }

    pub fn find(&self, path: &str) -> Option<&TagTreeNode> {
        find_tag_node(&self.tree, path)
    }

    pub fn into_parts(self) -> (TagTree, usize) {
        (self.tree, self.untagged)
    }
}

/// Matches notes that live under an excluded folder. A pattern without `/`
/// is tested against every folder name; one with `/` against the folder path
/// from the vault root.
struct FolderExclusions {
    names: GlobSet,
    paths: GlobSet,
}

impl FolderExclusions {
    fn compile(patterns: &[String]) -> Self {
        let mut names = GlobSetBuilder::new();
        let mut paths = GlobSetBuilder::new();
        for raw in patterns {
            match folder_glob(raw) {
                Some((true, Ok(glob))) => {
                    paths.add(glob);
                }
                Some((false, Ok(glob))) => {
                    names.add(glob);
                }
                Some((_, Err(e))) => {
                    warn!("ignoring invalid excluded folder pattern {:?}: {}", raw, e)
                }
                None => {}
            }
        }
        Self {
            names: names.build().unwrap_or_else(|_| GlobSet::empty()),
            paths: paths.build().unwrap_or_else(|_| GlobSet::empty()),
        }
    }

    fn is_excluded(&self, file_path: &str) -> bool {
        if self.names.is_empty() && self.paths.is_empty() {
            return false;
        }
        let Some((folder, _)) = file_path.rsplit_once('/') else {
            return false;
        };
        let mut end = 0;
        for segment in folder.split('/') {
            end += segment.len();
            if self.names.is_match(segment) || self.paths.is_match(&folder[..end]) {
                return true;
            }
            end += 1;
        }
        false
    }
}

/// Compiles one excluded-folder pattern. The flag is true for path patterns
/// (containing `/`). Blank patterns yield `None`.
fn folder_glob(raw: &str) -> Option<(bool, std::result::Result<Glob, globset::Error>)> {
    let pattern = raw.trim().trim_matches('/');
    if pattern.is_empty() {
        return None;
    }
    let glob = GlobBuilder::new(pattern).literal_separator(true).build();
    Some((pattern.contains('/'), glob))
}

/// Full rebuild over every mirrored record, in mirror order.
pub fn build_tag_tree_from_database(mirror: &MemoryMirror, options: &TagTreeOptions) -> TagIndex {
    build_tag_tree(mirror.iter(), options)
}

pub fn build_tag_tree<'a, I>(records: I, options: &TagTreeOptions) -> TagIndex
where
    I: IntoIterator<Item = (&'a str, &'a FileRecord)>,
{
    let exclusions = FolderExclusions::compile(&options.excluded_folders);
    let max_depth = options.max_depth.max(1);
    let mut tree = TagTree::new();
    // lower-cased prefix -> first-seen canonical prefix
    let mut casing: HashMap<String, String> = HashMap::new();
    let mut untagged = 0usize;
    let mut occurrences = 0usize;

    for (file_path, record) in records {
        let Some(tags) = record.tags.as_ref() else {
            continue;
        };
        if exclusions.is_excluded(file_path) {
            continue;
        }
        if tags.is_empty() {
            untagged += 1;
            continue;
        }
        for raw in tags {
            let tag = raw.strip_prefix(TAG_MARKER).unwrap_or(raw);
            let mut segments: Vec<&str> = tag.split('/').filter(|s| !s.is_empty()).collect();
            if segments.is_empty() {
                continue;
            }
            if segments.len() > max_depth {
                debug!(
                    "truncating tag {:?} on {} to {} levels",
                    raw, file_path, max_depth
                );
                segments.truncate(max_depth);
            }
            occurrences += 1;
            insert_occurrence(&mut tree, &mut casing, &segments, file_path);
        }
    }

    debug!(
        "built tag tree: {} roots, {} occurrences, {} untagged",
        tree.len(),
        occurrences,
        untagged
    );
    TagIndex {
        tree,
        untagged,
        counts: TagCountCache::new(),
    }
}

fn insert_occurrence(
    tree: &mut TagTree,
    casing: &mut HashMap<String, String>,
    segments: &[&str],
    file_path: &str,
) {
    let mut level = tree;
    let mut lower_prefix = String::new();
    let mut parent = String::new();
    for (depth, segment) in segments.iter().enumerate() {
        if depth > 0 {
            lower_prefix.push('/');
        }
        lower_prefix.push_str(&segment.to_lowercase());
        let canonical = casing
            .entry(lower_prefix.clone())
            .or_insert_with(|| {
                if depth == 0 {
                    segment.to_string()
                } else {
                    format!("{parent}/{segment}")
                }
            })
            .clone();
        let node = level
            .entry(lower_prefix.clone())
            .or_insert_with(|| TagTreeNode::new(&canonical));
        if depth + 1 == segments.len() {
            node.notes_with_tag.insert(file_path.to_string());
        }
        parent = canonical;
        level = &mut node.children;
    }
}

/// Case-insensitive lookup by full path; a leading `#` is ignored.
///
/// Prefixes missing from the current level are skipped rather than treated
/// as a miss, so nodes hoisted by [`crate::patterns::exclude_from_tag_tree`]
/// are still found.
pub fn find_tag_node<'a>(tree: &'a TagTree, path: &str) -> Option<&'a TagTreeNode> {
    let path = path.strip_prefix(TAG_MARKER).unwrap_or(path);
    let mut level = tree;
    let mut found = None;
    let mut key = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !key.is_empty() {
            key.push('/');
        }
        key.push_str(&segment.to_lowercase());
        found = level.get(&key);
        if let Some(node) = found {
            level = &node.children;
        }
    }
    found
}

/// Canonical paths of `node` and all of its descendants.
pub fn collect_all_tag_paths(node: &TagTreeNode) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        paths.insert(current.path.clone());
        stack.extend(current.children.values());
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(tags: &[&str]) -> FileRecord {
        FileRecord::with_tags(tags.iter().copied())
    }

    #[test]
    fn invalid_folder_glob_fails_validation_but_not_the_build() {
        let options = TagTreeOptions {
            excluded_folders: vec!["Archive".to_string(), "[broken".to_string()],
            ..TagTreeOptions::default()
        };
        let err = options.validate().unwrap_err();
        assert!(matches!(err, NavigatorError::InvalidGlob { ref pattern, .. } if pattern == "[broken"));

        let records = vec![
            ("Archive/old.md", tagged(&["old"])),
            ("keep.md", tagged(&["kept"])),
        ];
        let index = build_tag_tree(records.iter().map(|(p, r)| (*p, r)), &options);
        assert!(index.find("old").is_none());
        assert!(index.find("kept").is_some());
        assert!(TagTreeOptions::default().validate().is_ok());
    }

    fn build(records: &[(&str, FileRecord)]) -> TagIndex {
        build_tag_tree(
            records.iter().map(|(p, r)| (*p, r)),
            &TagTreeOptions::default(),
        )
    }

    #[test]
    fn casing_variants_collapse_to_first_seen() {
        let records = vec![
            ("a.md", tagged(&["Project"])),
            ("b.md", tagged(&["project"])),
        ];
        let index = build(&records);
        assert_eq!(index.tree().len(), 1);
        let node = &index.tree()["project"];
        assert_eq!(node.name, "Project");
        assert_eq!(node.path, "Project");
        assert_eq!(node.notes_with_tag.len(), 2);

        let reversed = vec![
            ("b.md", tagged(&["project"])),
            ("a.md", tagged(&["Project"])),
        ];
        assert_eq!(build(&reversed).tree()["project"].name, "project");
    }

    #[test]
    fn nested_casing_follows_first_seen_prefix() {
        let records = vec![
            ("a.md", tagged(&["#Work/Alpha"])),
            ("b.md", tagged(&["work/beta", "WORK/ALPHA/deep"])),
        ];
        let index = build(&records);
        let work = &index.tree()["work"];
        assert_eq!(work.path, "Work");
        assert!(work.notes_with_tag.is_empty());
        assert_eq!(work.children["work/beta"].path, "Work/beta");
        let deep = find_tag_node(index.tree(), "work/alpha/DEEP").unwrap();
        assert_eq!(deep.path, "Work/Alpha/deep");
        assert_eq!(deep.name, "deep");
    }

    #[test]
    fn notes_attach_only_at_leaf_occurrence() {
        let records = vec![("a.md", tagged(&["a/b/c"]))];
        let index = build(&records);
        let a = &index.tree()["a"];
        let b = &a.children["a/b"];
        let c = &b.children["a/b/c"];
        assert!(a.notes_with_tag.is_empty());
        assert!(b.notes_with_tag.is_empty());
        assert_eq!(c.notes_with_tag.iter().collect::<Vec<_>>(), vec!["a.md"]);
    }

    #[test]
    fn null_tags_are_skipped_and_empty_tags_count_as_untagged() {
        let records = vec![
            ("unscanned.md", FileRecord::default()),
            ("empty.md", tagged(&[])),
            ("tagged.md", tagged(&["x"])),
        ];
        let index = build(&records);
        assert_eq!(index.untagged(), 1);
        assert_eq!(index.tree().len(), 1);
    }

    #[test]
    fn excluded_folders_skip_notes_entirely() {
        let records = vec![
            ("Archive/old.md", tagged(&["old"])),
            ("Archive/empty.md", tagged(&[])),
            ("Projects/Archive/x.md", tagged(&["nested"])),
            ("Daily/2024/jan.md", tagged(&["daily"])),
            ("notes/keep.md", tagged(&["keep"])),
        ];
        let options = TagTreeOptions {
            excluded_folders: vec!["Archive".into(), "/Daily/20*".into()],
            ..TagTreeOptions::default()
        };
        let index = build_tag_tree(records.iter().map(|(p, r)| (*p, r)), &options);
        let roots: Vec<&str> = index.tree().keys().map(String::as_str).collect();
        assert_eq!(roots, vec!["keep"]);
        assert_eq!(index.untagged(), 0);
    }

    #[test]
    fn deep_tags_are_truncated_at_max_depth() {
        let records = vec![("a.md", tagged(&["a/b/c/d"]))];
        let options = TagTreeOptions {
            max_depth: 2,
            ..TagTreeOptions::default()
        };
        let index = build_tag_tree(records.iter().map(|(p, r)| (*p, r)), &options);
        let b = find_tag_node(index.tree(), "a/b").unwrap();
        assert!(b.children.is_empty());
        assert!(b.notes_with_tag.contains("a.md"));
    }

    #[test]
    fn empty_segments_and_bare_markers_are_ignored() {
        let records = vec![("a.md", tagged(&["#", "a//b/", ""]))];
        let index = build(&records);
        assert_eq!(
            collect_all_tag_paths(&index.tree()["a"]),
            ["a", "a/b"]
                .iter()
                .map(|s| s.to_string())
                .collect::<BTreeSet<String>>()
        );
    }

    #[test]
    fn find_tag_node_misses_cleanly() {
        let index = build(&[("a.md", tagged(&["a/b"]))]);
        assert!(find_tag_node(index.tree(), "a/c").is_none());
        assert!(find_tag_node(index.tree(), "").is_none());
        assert!(find_tag_node(index.tree(), "#A").is_some());
    }
}
