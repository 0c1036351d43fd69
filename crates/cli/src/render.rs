use navigator_core::counts::TagCountCache;
use navigator_core::patterns::{exclude_from_tag_tree, filter_tag_tree};
use navigator_core::TagTree;
use serde::Serialize;
use std::fmt::Write;

/// Applies exclusion first, then inclusion, as the navigator pane does.
pub fn visible_tree(tree: &TagTree, include: &[String], exclude: &[String]) -> TagTree {
    let pruned = exclude_from_tag_tree(tree, exclude);
    filter_tag_tree(&pruned, include)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagSummary {
    pub path: String,
    pub name: String,
    pub count: usize,
    pub children: Vec<TagSummary>,
}

pub fn summarize(tree: &TagTree, counts: &TagCountCache) -> Vec<TagSummary> {
    tree.values()
        .map(|node| TagSummary {
            path: node.path.clone(),
            name: node.name.clone(),
            count: counts.total_note_count(node),
            children: summarize(&node.children, counts),
        })
        .collect()
}

/// Indented outline, one tag per line with its subtree note count.
pub fn render_text(tree: &TagTree, counts: &TagCountCache) -> String {
    let mut out = String::new();
    for summary in summarize(tree, counts) {
        write_summary(&mut out, &summary, 0);
    }
    out
}

fn write_summary(out: &mut String, summary: &TagSummary, level: usize) {
    let _ = writeln!(
        out,
        "{}#{} ({})",
        "  ".repeat(level),
        summary.name,
        summary.count
    );
    for child in &summary.children {
        write_summary(out, child, level + 1);
    }
}
