use crate::tag_tree::TagTreeNode;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Memoized subtree note counts for one tag tree.
///
/// Entries are keyed by the node's case-normalized path, which identifies a
/// node only within the tree the cache was created for. A rebuilt or
/// filtered tree needs its own cache; call [`TagCountCache::clear`] after
/// mutating a tree in place.
#[derive(Debug, Default)]
pub struct TagCountCache {
    totals: RefCell<HashMap<String, usize>>,
}

impl TagCountCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct files tagged at `node` or anywhere below it.
    pub fn total_note_count(&self, node: &TagTreeNode) -> usize {
        let key = node.key();
        if let Some(total) = self.totals.borrow().get(&key) {
            return *total;
        }
        let total = distinct_notes(node).len();
        self.totals.borrow_mut().insert(key, total);
        total
    }

    pub fn clear(&self) {
        self.totals.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.totals.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn distinct_notes(node: &TagTreeNode) -> HashSet<&str> {
    let mut notes = HashSet::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        notes.extend(current.notes_with_tag.iter().map(String::as_str));
        stack.extend(current.children.values());
    }
    notes
}
