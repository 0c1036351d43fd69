//! Include/exclude filtering of tag trees.
//!
//! A pattern wrapped in slashes (`/^foo.*$/`) is a case-insensitive regex
//! searched in the tag path. Anything else is a wildcard pattern where `*`
//! matches any run of characters and the whole path must match.
//!
//! Inclusion is inherited by descendants; exclusion is not.

use crate::error::{NavigatorError, Result};
use crate::tag_tree::{TagTree, TagTreeNode, TAG_MARKER};
use regex::{Regex, RegexBuilder};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct TagPattern {
    source: String,
    regex: Regex,
}

impl TagPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let expression = match regex_body(pattern) {
            Some(body) => body.to_string(),
            None => wildcard_expression(pattern.strip_prefix(TAG_MARKER).unwrap_or(pattern)),
        };
        let regex = RegexBuilder::new(&expression)
            .case_insensitive(true)
            .build()
            .map_err(|source| NavigatorError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, tag_path: &str) -> bool {
        self.regex.is_match(tag_path)
    }
}

fn regex_body(pattern: &str) -> Option<&str> {
    if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        Some(&pattern[1..pattern.len() - 1])
    } else {
        None
    }
}

fn wildcard_expression(pattern: &str) -> String {
    let body: Vec<String> = pattern.split('*').map(regex::escape).collect();
    format!("^{}$", body.join(".*"))
}

/// Compiled pattern list. Malformed patterns are logged and dropped, so they
/// never match.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<TagPattern>,
}

impl PatternSet {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match TagPattern::parse(p.as_ref()) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_match(&self, tag_path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(tag_path))
    }

    /// True if `tag_path` or any of its ancestor prefixes matches.
    pub fn is_match_or_ancestor(&self, tag_path: &str) -> bool {
        tag_path
            .match_indices('/')
            .map(|(i, _)| &tag_path[..i])
            .chain(std::iter::once(tag_path))
            .any(|prefix| self.is_match(prefix))
    }
}

pub fn matches_tag_pattern(tag_path: &str, pattern: &str) -> bool {
    match TagPattern::parse(pattern) {
        Ok(compiled) => compiled.is_match(tag_path),
        Err(e) => {
            warn!("{}", e);
            false
        }
    }
}

/// Keeps nodes whose path, or an ancestor prefix of it, matches an include
/// pattern. Prefixes are taken from the node's own path, so nodes hoisted by
/// [`exclude_from_tag_tree`] still inherit. Unmatched ancestors of kept nodes
/// stay as empty containers. An empty pattern list keeps everything.
pub fn filter_tag_tree<S: AsRef<str>>(tree: &TagTree, include_patterns: &[S]) -> TagTree {
    if include_patterns.is_empty() {
        return tree.clone();
    }
    let set = PatternSet::compile(include_patterns);
    tree.iter()
        .filter_map(|(key, node)| filter_node(node, false, &set).map(|n| (key.clone(), n)))
        .collect()
}

fn filter_node(node: &TagTreeNode, inherited: bool, set: &PatternSet) -> Option<TagTreeNode> {
    let matched = inherited || set.is_match_or_ancestor(&node.path);
    let children: TagTree = node
        .children
        .iter()
        .filter_map(|(key, child)| filter_node(child, matched, set).map(|c| (key.clone(), c)))
        .collect();
    if !matched && children.is_empty() {
        return None;
    }
    Some(TagTreeNode {
        name: node.name.clone(),
        path: node.path.clone(),
        children,
        notes_with_tag: if matched {
            node.notes_with_tag.clone()
        } else {
            Default::default()
        },
    })
}

/// Drops nodes whose own path matches an exclude pattern. Children of a
/// dropped node are evaluated on their own and move up to its parent.
pub fn exclude_from_tag_tree<S: AsRef<str>>(tree: &TagTree, exclude_patterns: &[S]) -> TagTree {
    if exclude_patterns.is_empty() {
        return tree.clone();
    }
    let set = PatternSet::compile(exclude_patterns);
    let mut out = TagTree::new();
    exclude_into(tree, &set, &mut out);
    out
}

fn exclude_into(source: &TagTree, set: &PatternSet, out: &mut TagTree) {
    for (key, node) in source {
        if set.is_match(&node.path) {
            exclude_into(&node.children, set, out);
            continue;
        }
        let mut children = TagTree::new();
        exclude_into(&node.children, set, &mut children);
        out.insert(
            key.clone(),
            TagTreeNode {
                name: node.name.clone(),
                path: node.path.clone(),
                children,
                notes_with_tag: node.notes_with_tag.clone(),
            },
        );
    }
}
