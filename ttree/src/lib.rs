//! Branching message tree persistence.
//!
//! Every thread is a tree of messages linked by `parent_id`. The path from a root to the
//! thread's active leaf is the conversation a model sees. [`MessageTreeStore`] implements the
//! tree operations on top of a [`TreeBackend`]; backends only store rows.

mod backend;
mod backends;
mod error;
mod store;
mod tree;
mod types;

pub mod prelude {
    pub use crate::{
        Attachment, BranchInfo, InMemoryTreeBackend, LeafPointer, MessageOrigin, MessageTreeStore,
        NewMessage, ParentSelector, SqliteTreeBackend, StoreError, StoreErrorKind, StoredMessage,
        Thread, ThreadSettings, TreeBackend, TreeBackendConfig, TreeBackup, create_tree_backend,
    };
}

pub use backend::{
    InMemoryTreeBackend, SqliteTreeBackend, TreeBackend, TreeBackendConfig,
    create_default_tree_backend, create_tree_backend,
};
pub use error::{StoreError, StoreErrorKind};
pub use store::MessageTreeStore;
pub use tree::{MAX_ANCESTRY_DEPTH, MessageTree};
pub use types::{
    Attachment, BACKUP_FORMAT_VERSION, BranchInfo, DeleteOutcome, LeafPointer, MessageOrigin,
    NewMessage, ParentSelector, StoredMessage, Thread, ThreadSettings, TreeBackup, UsageMetrics,
};
