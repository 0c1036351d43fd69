//! Core library: in-memory mirror of per-file records, hierarchical tag
//! index, pattern filters, change notifications and vault scanning.

pub mod config;
pub mod counts;
pub mod database;
pub mod error;
pub mod extractor;
pub mod mirror;
pub mod models;
pub mod notify;
pub mod patterns;
pub mod scanner;
pub mod tag_tree;

pub use database::VaultDatabase;
pub use error::{NavigatorError, Result};
pub use mirror::MemoryMirror;
pub use models::{ContentKind, FileChange, FileContentPatch, FileRecord};
pub use notify::{ChangeHub, Subscription};
pub use tag_tree::{TagIndex, TagTree, TagTreeNode};
