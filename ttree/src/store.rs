//! Tree semantics over a [`TreeBackend`]: active paths, branches, subtree deletion and backups.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use tcommon::{MessageId, ThreadId};

use crate::{
    Attachment, BACKUP_FORMAT_VERSION, BranchInfo, DeleteOutcome, InMemoryTreeBackend,
    LeafPointer, MAX_ANCESTRY_DEPTH, MessageTree, NewMessage, ParentSelector, StoreError,
    StoredMessage, Thread, ThreadSettings, TreeBackend, TreeBackup,
};

#[derive(Clone)]
pub struct MessageTreeStore {
    backend: Arc<dyn TreeBackend>,
}

impl MessageTreeStore {
    pub fn new(backend: Arc<dyn TreeBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryTreeBackend::new()))
    }

    pub fn backend(&self) -> Arc<dyn TreeBackend> {
        Arc::clone(&self.backend)
    }

    pub async fn create_thread(
        &self,
        title: impl Into<String>,
        settings: ThreadSettings,
    ) -> Result<Thread, StoreError> {
        let thread = Thread::new(title, settings);
        self.backend.insert_thread(&thread).await?;
        Ok(thread)
    }

    pub async fn get_thread(&self, thread_id: &ThreadId) -> Result<Thread, StoreError> {
        self.backend
            .load_thread(thread_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("thread '{thread_id}' not found")))
    }

    pub async fn list_threads(&self) -> Result<Vec<Thread>, StoreError> {
        self.backend.list_threads().await
    }

    pub async fn rename_thread(
        &self,
        thread_id: &ThreadId,
        title: impl Into<String>,
    ) -> Result<Thread, StoreError> {
        let mut thread = self.get_thread(thread_id).await?;
        thread.title = title.into();
        thread.updated_at = SystemTime::now();
        self.backend.save_thread(&thread).await?;
        Ok(thread)
    }

    pub async fn update_thread_settings(
        &self,
        thread_id: &ThreadId,
        settings: ThreadSettings,
    ) -> Result<Thread, StoreError> {
        let mut thread = self.get_thread(thread_id).await?;
        thread.settings = settings;
        thread.updated_at = SystemTime::now();
        self.backend.save_thread(&thread).await?;
        Ok(thread)
    }

    /// Deletes the thread and every message in it.
    pub async fn delete_thread(&self, thread_id: &ThreadId) -> Result<bool, StoreError> {
        self.backend.delete_thread(thread_id).await
    }

    pub async fn set_active_leaf(
        &self,
        thread_id: &ThreadId,
        leaf: LeafPointer,
    ) -> Result<(), StoreError> {
        let mut thread = self.get_thread(thread_id).await?;
        if let LeafPointer::Message(id) = &leaf {
            self.message_in_thread(id, thread_id).await?;
        }
        thread.active_leaf = leaf;
        thread.updated_at = SystemTime::now();
        self.backend.save_thread(&thread).await
    }

    pub async fn get_message(&self, message_id: &MessageId) -> Result<StoredMessage, StoreError> {
        self.backend
            .load_message(message_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("message '{message_id}' not found")))
    }

    pub async fn tree(&self, thread_id: &ThreadId) -> Result<MessageTree, StoreError> {
        Ok(MessageTree::new(self.backend.load_messages(thread_id).await?))
    }

    /// Stores a new message under the parent chosen by `message.parent`.
    pub async fn append_message(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        let thread = self.get_thread(&message.thread_id).await?;
        let parent_id = match &message.parent {
            ParentSelector::Root => None,
            ParentSelector::Message(id) => {
                self.message_in_thread(id, &thread.id).await?;
                Some(id.clone())
            }
            ParentSelector::CurrentLeaf => match &thread.active_leaf {
                LeafPointer::Root => None,
                LeafPointer::Message(id) => Some(id.clone()),
                LeafPointer::Latest => self.tree(&thread.id).await?.latest().map(|m| m.id.clone()),
            },
        };

        let advance_leaf = message.advance_leaf;
        let stored = message.into_stored(parent_id, SystemTime::now());
        self.backend.insert_message(stored, advance_leaf).await
    }

    /// Edits a message in place, keeping its position in the tree.
    pub async fn update_message_content(
        &self,
        message_id: &MessageId,
        content: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<StoredMessage, StoreError> {
        let mut message = self.get_message(message_id).await?;
        message.content = content.into();
        message.attachments = attachments;
        self.backend.update_message(&message).await?;
        Ok(message)
    }

    /// Messages from the root down to `leaf`, or to the thread's active leaf when `leaf` is
    /// `None`. An explicit [`LeafPointer::Root`] gives an empty path.
    pub async fn get_active_path(
        &self,
        thread_id: &ThreadId,
        leaf: Option<LeafPointer>,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        if leaf == Some(LeafPointer::Root) {
            return Ok(Vec::new());
        }

        let leaf = match leaf {
            Some(leaf) => leaf,
            None => self.get_thread(thread_id).await?.active_leaf,
        };
        self.tree(thread_id).await?.path_to(&leaf)
    }

    pub async fn get_branch_info(&self, message_id: &MessageId) -> Result<BranchInfo, StoreError> {
        let message = self.get_message(message_id).await?;
        self.tree(&message.thread_id).await?.branch_info(message_id)
    }

    pub async fn children(&self, message_id: &MessageId) -> Result<Vec<StoredMessage>, StoreError> {
        let message = self.get_message(message_id).await?;
        Ok(self
            .tree(&message.thread_id)
            .await?
            .children(message_id)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Removes a message and all of its descendants. When the thread's effective active leaf is
    /// among them, the leaf moves to the removed message's parent, or to `Root` for a root.
    pub async fn delete_subtree(&self, message_id: &MessageId) -> Result<DeleteOutcome, StoreError> {
        let message = self.get_message(message_id).await?;
        let thread = self.get_thread(&message.thread_id).await?;
        let tree = self.tree(&thread.id).await?;

        let deleted = tree.subtree_ids(message_id)?;
        let effective_leaf = match &thread.active_leaf {
            // A stale explicit leaf is treated as deleted.
            LeafPointer::Message(id) if !tree.contains(id) => Some(id.clone()),
            leaf => tree.resolve_leaf(leaf)?,
        };

        let reassigned_leaf = effective_leaf
            .filter(|leaf| deleted.contains(leaf) || !tree.contains(leaf))
            .map(|_| match &message.parent_id {
                Some(parent) => LeafPointer::Message(parent.clone()),
                None => LeafPointer::Root,
            });

        self.backend
            .delete_messages(&thread.id, &deleted, reassigned_leaf.clone())
            .await?;

        Ok(DeleteOutcome {
            deleted,
            reassigned_leaf,
        })
    }

    /// Makes the deepest most-recent descendant of `message_id` the active leaf.
    pub async fn switch_branch(&self, message_id: &MessageId) -> Result<MessageId, StoreError> {
        let message = self.get_message(message_id).await?;
        let mut thread = self.get_thread(&message.thread_id).await?;
        let leaf = self
            .tree(&thread.id)
            .await?
            .deepest_latest_descendant(message_id)?;

        let pointer = LeafPointer::Message(leaf.clone());
        if thread.active_leaf != pointer {
            thread.active_leaf = pointer;
            thread.updated_at = SystemTime::now();
            self.backend.save_thread(&thread).await?;
        }
        Ok(leaf)
    }

    pub async fn export_backup(&self) -> Result<TreeBackup, StoreError> {
        self.backend.export_backup().await
    }

    /// Validates the whole backup, then imports it in one atomic write.
    pub async fn import_backup(&self, backup: TreeBackup) -> Result<(), StoreError> {
        validate_backup(&backup)?;
        self.backend.import_backup(backup).await
    }

    async fn message_in_thread(
        &self,
        message_id: &MessageId,
        thread_id: &ThreadId,
    ) -> Result<StoredMessage, StoreError> {
        let message = self.get_message(message_id).await?;
        if &message.thread_id != thread_id {
            return Err(StoreError::invalid_request(format!(
                "message '{message_id}' belongs to another thread"
            )));
        }
        Ok(message)
    }
}

fn validate_backup(backup: &TreeBackup) -> Result<(), StoreError> {
    if backup.version > BACKUP_FORMAT_VERSION {
        return Err(StoreError::invalid_request(format!(
            "unsupported backup version {}",
            backup.version
        )));
    }

    let mut threads = HashSet::new();
    for thread in &backup.threads {
        if !threads.insert(&thread.id) {
            return Err(StoreError::invalid_request(format!(
                "duplicate thread '{}' in backup",
                thread.id
            )));
        }
    }

    let mut index: HashMap<&MessageId, (&ThreadId, Option<&MessageId>)> =
        HashMap::with_capacity(backup.messages.len());
    for message in &backup.messages {
        if !threads.contains(&message.thread_id) {
            return Err(StoreError::invalid_request(format!(
                "message '{}' references unknown thread '{}'",
                message.id, message.thread_id
            )));
        }
        let entry = (&message.thread_id, message.parent_id.as_ref());
        if index.insert(&message.id, entry).is_some() {
            return Err(StoreError::invalid_request(format!(
                "duplicate message '{}' in backup",
                message.id
            )));
        }
    }

    for message in &backup.messages {
        if let Some(parent) = &message.parent_id
            && !index.contains_key(parent)
        {
            return Err(StoreError::invalid_request(format!(
                "message '{}' references missing parent '{parent}'",
                message.id
            )));
        }
    }

    // Reject cyclic or overly deep ancestry before anything is written. Depths are memoized so
    // every message is walked once; a parent in another thread ends the walk.
    let mut depths: HashMap<&MessageId, usize> = HashMap::with_capacity(index.len());
    for message in &backup.messages {
        let mut pending = Vec::new();
        let mut on_walk = HashSet::new();
        let mut depth = 0;
        let mut cursor = Some(&message.id);
        while let Some(id) = cursor {
            if let Some(known) = depths.get(id) {
                depth = *known;
                break;
            }
            if !on_walk.insert(id) {
                return Err(StoreError::corrupted(format!(
                    "cycle detected in ancestry at message '{id}'"
                )));
            }
            pending.push(id);
            let Some(&(thread_id, parent)) = index.get(id) else {
                break;
            };
            cursor = parent.filter(|parent| {
                index
                    .get(parent)
                    .is_some_and(|(parent_thread, _)| *parent_thread == thread_id)
            });
        }

        for id in pending.into_iter().rev() {
            depth += 1;
            if depth > MAX_ANCESTRY_DEPTH {
                return Err(StoreError::corrupted(format!(
                    "ancestry deeper than {MAX_ANCESTRY_DEPTH} messages"
                )));
            }
            depths.insert(id, depth);
        }
    }

    Ok(())
}
