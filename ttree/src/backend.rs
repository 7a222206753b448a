//! Storage backend trait and the in-memory backend.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use tcommon::{BoxFuture, MessageId, ThreadId};

use crate::backends::sqlite::default_sqlite_path;
use crate::error::StoreError;
use crate::types::{BACKUP_FORMAT_VERSION, LeafPointer, StoredMessage, Thread, TreeBackup};

pub use crate::backends::sqlite::SqliteTreeBackend;

/// Raw persistence primitives. Tree semantics live in [`crate::MessageTreeStore`].
///
/// Multi-row writes (`delete_messages`, `import_backup`) must be all-or-nothing.
pub trait TreeBackend: Send + Sync {
    fn insert_thread<'a>(&'a self, thread: &'a Thread) -> BoxFuture<'a, Result<(), StoreError>>;

    fn load_thread<'a>(
        &'a self,
        thread_id: &'a ThreadId,
    ) -> BoxFuture<'a, Result<Option<Thread>, StoreError>>;

    /// Most recently updated first.
    fn list_threads<'a>(&'a self) -> BoxFuture<'a, Result<Vec<Thread>, StoreError>>;

    /// Overwrites title, settings, active leaf and update time.
    fn save_thread<'a>(&'a self, thread: &'a Thread) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Removes a thread and all of its messages. Returns whether it existed.
    fn delete_thread<'a>(
        &'a self,
        thread_id: &'a ThreadId,
    ) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Messages of one thread in creation order.
    fn load_messages<'a>(
        &'a self,
        thread_id: &'a ThreadId,
    ) -> BoxFuture<'a, Result<Vec<StoredMessage>, StoreError>>;

    fn load_message<'a>(
        &'a self,
        message_id: &'a MessageId,
    ) -> BoxFuture<'a, Result<Option<StoredMessage>, StoreError>>;

    /// Assigns the next sequence number, stores the message and touches the thread. When
    /// `advance_leaf` is set the message also becomes the thread's active leaf.
    fn insert_message<'a>(
        &'a self,
        message: StoredMessage,
        advance_leaf: bool,
    ) -> BoxFuture<'a, Result<StoredMessage, StoreError>>;

    /// Rewrites content and attachments of an existing message.
    fn update_message<'a>(
        &'a self,
        message: &'a StoredMessage,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Deletes `message_ids` and optionally moves the active leaf, in one atomic step.
    fn delete_messages<'a>(
        &'a self,
        thread_id: &'a ThreadId,
        message_ids: &'a [MessageId],
        active_leaf: Option<LeafPointer>,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    fn export_backup<'a>(&'a self) -> BoxFuture<'a, Result<TreeBackup, StoreError>>;

    /// Replaces any thread present in the backup, including its messages.
    fn import_backup<'a>(&'a self, backup: TreeBackup) -> BoxFuture<'a, Result<(), StoreError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeBackendConfig {
    Sqlite { path: PathBuf },
    InMemory,
}

impl Default for TreeBackendConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

pub fn create_tree_backend(config: TreeBackendConfig) -> Result<Arc<dyn TreeBackend>, StoreError> {
    match config {
        TreeBackendConfig::Sqlite { path } => Ok(Arc::new(SqliteTreeBackend::new(path)?)),
        TreeBackendConfig::InMemory => Ok(Arc::new(InMemoryTreeBackend::new())),
    }
}

pub fn create_default_tree_backend() -> Result<Arc<dyn TreeBackend>, StoreError> {
    create_tree_backend(TreeBackendConfig::default())
}

#[derive(Debug, Default)]
pub struct InMemoryTreeBackend {
    state: Mutex<TreeState>,
}

#[derive(Debug, Default)]
struct TreeState {
    threads: HashMap<ThreadId, Thread>,
    messages: HashMap<ThreadId, Vec<StoredMessage>>,
    thread_of: HashMap<MessageId, ThreadId>,
    next_sequence: u64,
}

impl TreeState {
    fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    fn remove_thread(&mut self, thread_id: &ThreadId) -> bool {
        let existed = self.threads.remove(thread_id).is_some();
        for message in self.messages.remove(thread_id).unwrap_or_default() {
            self.thread_of.remove(&message.id);
        }
        existed
    }
}

impl InMemoryTreeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, TreeState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::storage("tree backend lock poisoned"))
    }
}

impl TreeBackend for InMemoryTreeBackend {
    fn insert_thread<'a>(&'a self, thread: &'a Thread) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut state = self.state()?;
            if state.threads.contains_key(&thread.id) {
                return Err(StoreError::invalid_request(format!(
                    "thread '{}' already exists",
                    thread.id
                )));
            }
            state.threads.insert(thread.id.clone(), thread.clone());
            Ok(())
        })
    }

    fn load_thread<'a>(
        &'a self,
        thread_id: &'a ThreadId,
    ) -> BoxFuture<'a, Result<Option<Thread>, StoreError>> {
        Box::pin(async move { Ok(self.state()?.threads.get(thread_id).cloned()) })
    }

    fn list_threads<'a>(&'a self) -> BoxFuture<'a, Result<Vec<Thread>, StoreError>> {
        Box::pin(async move {
            let mut threads = self.state()?.threads.values().cloned().collect::<Vec<_>>();
            threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(threads)
        })
    }

    fn save_thread<'a>(&'a self, thread: &'a Thread) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut state = self.state()?;
            let Some(stored) = state.threads.get_mut(&thread.id) else {
                return Err(StoreError::not_found(format!(
                    "thread '{}' not found",
                    thread.id
                )));
            };
            stored.title = thread.title.clone();
            stored.settings = thread.settings.clone();
            stored.active_leaf = thread.active_leaf.clone();
            stored.updated_at = thread.updated_at;
            Ok(())
        })
    }

    fn delete_thread<'a>(
        &'a self,
        thread_id: &'a ThreadId,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move { Ok(self.state()?.remove_thread(thread_id)) })
    }

    fn load_messages<'a>(
        &'a self,
        thread_id: &'a ThreadId,
    ) -> BoxFuture<'a, Result<Vec<StoredMessage>, StoreError>> {
        Box::pin(async move {
            Ok(self
                .state()?
                .messages
                .get(thread_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn load_message<'a>(
        &'a self,
        message_id: &'a MessageId,
    ) -> BoxFuture<'a, Result<Option<StoredMessage>, StoreError>> {
        Box::pin(async move {
            let state = self.state()?;
            let Some(thread_id) = state.thread_of.get(message_id) else {
                return Ok(None);
            };
            Ok(state.messages.get(thread_id).and_then(|messages| {
                messages
                    .iter()
                    .find(|message| &message.id == message_id)
                    .cloned()
            }))
        })
    }

    fn insert_message<'a>(
        &'a self,
        mut message: StoredMessage,
        advance_leaf: bool,
    ) -> BoxFuture<'a, Result<StoredMessage, StoreError>> {
        Box::pin(async move {
            let mut state = self.state()?;
            if !state.threads.contains_key(&message.thread_id) {
                return Err(StoreError::not_found(format!(
                    "thread '{}' not found",
                    message.thread_id
                )));
            }

            message.sequence = state.next_sequence();
            let thread_id = message.thread_id.clone();
            state
                .thread_of
                .insert(message.id.clone(), thread_id.clone());
            state
                .messages
                .entry(thread_id.clone())
                .or_default()
                .push(message.clone());

            if let Some(thread) = state.threads.get_mut(&thread_id) {
                thread.updated_at = SystemTime::now();
                if advance_leaf {
                    thread.active_leaf = LeafPointer::Message(message.id.clone());
                }
            }

            Ok(message)
        })
    }

    fn update_message<'a>(
        &'a self,
        message: &'a StoredMessage,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut state = self.state()?;
            let stored = state
                .messages
                .get_mut(&message.thread_id)
                .and_then(|messages| messages.iter_mut().find(|item| item.id == message.id))
                .ok_or_else(|| {
                    StoreError::not_found(format!("message '{}' not found", message.id))
                })?;
            stored.content = message.content.clone();
            stored.attachments = message.attachments.clone();
            Ok(())
        })
    }

    fn delete_messages<'a>(
        &'a self,
        thread_id: &'a ThreadId,
        message_ids: &'a [MessageId],
        active_leaf: Option<LeafPointer>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut state = self.state()?;
            if !state.threads.contains_key(thread_id) {
                return Err(StoreError::not_found(format!(
                    "thread '{thread_id}' not found"
                )));
            }

            let doomed = message_ids.iter().collect::<HashSet<_>>();
            if let Some(messages) = state.messages.get_mut(thread_id) {
                messages.retain(|message| !doomed.contains(&message.id));
            }
            for id in message_ids {
                state.thread_of.remove(id);
            }
            if let Some(thread) = state.threads.get_mut(thread_id) {
                if let Some(leaf) = active_leaf {
                    thread.active_leaf = leaf;
                }
                thread.updated_at = SystemTime::now();
            }
            Ok(())
        })
    }

    fn export_backup<'a>(&'a self) -> BoxFuture<'a, Result<TreeBackup, StoreError>> {
        Box::pin(async move {
            let state = self.state()?;
            let mut threads = state.threads.values().cloned().collect::<Vec<_>>();
            threads.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            let mut messages = state
                .messages
                .values()
                .flatten()
                .cloned()
                .collect::<Vec<_>>();
            messages.sort_by_key(|message| message.sequence);

            Ok(TreeBackup {
                version: BACKUP_FORMAT_VERSION,
                exported_at: SystemTime::now(),
                threads,
                messages,
            })
        })
    }

    fn import_backup<'a>(&'a self, backup: TreeBackup) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut state = self.state()?;

            let replaced = backup
                .threads
                .iter()
                .map(|thread| &thread.id)
                .collect::<HashSet<_>>();
            if let Some(conflict) = backup.messages.iter().find(|message| {
                state
                    .thread_of
                    .get(&message.id)
                    .is_some_and(|owner| !replaced.contains(owner))
            }) {
                return Err(StoreError::invalid_request(format!(
                    "message '{}' already exists in another thread",
                    conflict.id
                )));
            }

            // Everything below is infallible, so the import cannot stop halfway.
            for thread in &backup.threads {
                state.remove_thread(&thread.id);
            }
            for thread in backup.threads {
                state.threads.insert(thread.id.clone(), thread);
            }

            let mut messages = backup.messages;
            messages.sort_by_key(|message| message.sequence);
            for mut message in messages {
                message.sequence = state.next_sequence();
                state
                    .thread_of
                    .insert(message.id.clone(), message.thread_id.clone());
                state
                    .messages
                    .entry(message.thread_id.clone())
                    .or_default()
                    .push(message);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use tprovider::Role;

    use super::*;
    use crate::{MessageOrigin, ThreadSettings};

    fn flat_message(thread_id: &ThreadId, index: usize) -> StoredMessage {
        StoredMessage {
            id: MessageId::new(format!("m-{index}")),
            thread_id: thread_id.clone(),
            parent_id: None,
            role: Role::User,
            content: index.to_string(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            reasoning: None,
            usage: None,
            model: None,
            attachments: Vec::new(),
            images: Vec::new(),
            origin: MessageOrigin::User,
            ui_resource: None,
            created_at: SystemTime::now(),
            sequence: index as u64,
        }
    }

    #[tokio::test]
    async fn bulk_deletes_remove_exactly_the_requested_messages() {
        let backend = InMemoryTreeBackend::new();
        let thread = Thread::new("bulk", ThreadSettings::default());
        let messages = (0..20_000)
            .map(|index| flat_message(&thread.id, index))
            .collect::<Vec<_>>();
        let doomed = messages
            .iter()
            .filter(|message| message.sequence % 2 == 0)
            .map(|message| message.id.clone())
            .collect::<Vec<_>>();
        backend
            .import_backup(TreeBackup {
                version: BACKUP_FORMAT_VERSION,
                exported_at: SystemTime::now(),
                threads: vec![thread.clone()],
                messages,
            })
            .await
            .expect("import");

        let started = Instant::now();
        backend
            .delete_messages(&thread.id, &doomed, Some(LeafPointer::Latest))
            .await
            .expect("delete");
        assert!(started.elapsed() < Duration::from_secs(5));

        let remaining = backend.load_messages(&thread.id).await.expect("load");
        assert_eq!(remaining.len(), 10_000);
        assert!(
            remaining
                .iter()
                .all(|message| message.content.parse::<usize>().is_ok_and(|index| index % 2 == 1))
        );
        assert!(backend.load_message(&doomed[0]).await.expect("lookup").is_none());
    }
}
