use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde::{Deserialize, Serialize};
use tcommon::{BoxFuture, MessageId, ThreadId};
use tprovider::{InlineImage, Role, ToolCall};
use ttooling::UiResource;

use crate::backend::TreeBackend;
use crate::error::StoreError;
use crate::types::{
    Attachment, BACKUP_FORMAT_VERSION, LeafPointer, MessageOrigin, StoredMessage, Thread,
    ThreadSettings, TreeBackup, UsageMetrics,
};

const THREAD_COLUMNS: &str = "thread_id, title, active_leaf_json, settings_json, \
     created_at_secs, created_at_nanos, updated_at_secs, updated_at_nanos";

const MESSAGE_COLUMNS: &str = "sequence, message_id, thread_id, parent_id, role, content, \
     origin, details_json, created_at_secs, created_at_nanos";

/// SQLite backend. Messages are indexed by thread and by parent; the less frequently queried
/// fields are kept in a JSON details column.
#[derive(Debug)]
pub struct SqliteTreeBackend {
    connection: Mutex<Connection>,
}

impl SqliteTreeBackend {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| {
                StoreError::storage(format!("failed to create sqlite parent directory: {error}"))
            })?;
        }

        let connection = Connection::open(path)
            .map_err(storage_error("failed to open sqlite database"))?;
        Self::from_connection(connection)
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory()
            .map_err(storage_error("failed to open in-memory sqlite database"))?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        connection
            .busy_timeout(Duration::from_secs(5))
            .map_err(storage_error("failed to configure sqlite busy timeout"))?;
        let backend = Self {
            connection: Mutex::new(connection),
        };
        backend.initialize_schema()?;
        Ok(backend)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::storage("sqlite backend lock poisoned"))
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS threads (
                thread_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                active_leaf_json TEXT NOT NULL,
                settings_json TEXT NOT NULL,
                created_at_secs INTEGER NOT NULL,
                created_at_nanos INTEGER NOT NULL,
                updated_at_secs INTEGER NOT NULL,
                updated_at_nanos INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                sequence INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL UNIQUE,
                thread_id TEXT NOT NULL,
                parent_id TEXT,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                origin TEXT NOT NULL,
                details_json TEXT NOT NULL,
                created_at_secs INTEGER NOT NULL,
                created_at_nanos INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_thread_sequence
            ON messages(thread_id, sequence);

            CREATE INDEX IF NOT EXISTS idx_messages_parent
            ON messages(parent_id);
            ",
        )
        .map_err(storage_error("failed to initialize sqlite schema"))?;

        Ok(())
    }

    fn insert_thread_row(conn: &Connection, thread: &Thread) -> Result<(), StoreError> {
        let (created_secs, created_nanos) = encode_system_time(thread.created_at)?;
        let (updated_secs, updated_nanos) = encode_system_time(thread.updated_at)?;
        conn.execute(
            &format!("INSERT INTO threads ({THREAD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                thread.id.as_str(),
                &thread.title,
                serde_json::to_string(&thread.active_leaf)?,
                serde_json::to_string(&thread.settings)?,
                created_secs,
                created_nanos,
                updated_secs,
                updated_nanos,
            ],
        )
        .map_err(storage_error("failed to insert thread"))?;
        Ok(())
    }

    /// Inserts a message row and returns the assigned sequence.
    fn insert_message_row(conn: &Connection, message: &StoredMessage) -> Result<u64, StoreError> {
        let (secs, nanos) = encode_system_time(message.created_at)?;
        conn.execute(
            "
            INSERT INTO messages (
                message_id, thread_id, parent_id, role, content, origin, details_json,
                created_at_secs, created_at_nanos
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
            params![
                message.id.as_str(),
                message.thread_id.as_str(),
                message.parent_id.as_ref().map(MessageId::as_str),
                message.role.as_str(),
                &message.content,
                origin_to_str(message.origin),
                serde_json::to_string(&MessageDetails::from_message(message))?,
                secs,
                nanos,
            ],
        )
        .map_err(storage_error("failed to insert message"))?;
        Ok(conn.last_insert_rowid() as u64)
    }

    fn touch_thread(
        tx: &Transaction<'_>,
        thread_id: &ThreadId,
        active_leaf: Option<&LeafPointer>,
    ) -> Result<(), StoreError> {
        let (secs, nanos) = encode_system_time(SystemTime::now())?;
        let updated = match active_leaf {
            Some(leaf) => tx.execute(
                "
                UPDATE threads
                SET active_leaf_json = ?2, updated_at_secs = ?3, updated_at_nanos = ?4
                WHERE thread_id = ?1
                ",
                params![thread_id.as_str(), serde_json::to_string(leaf)?, secs, nanos],
            ),
            None => tx.execute(
                "UPDATE threads SET updated_at_secs = ?2, updated_at_nanos = ?3 WHERE thread_id = ?1",
                params![thread_id.as_str(), secs, nanos],
            ),
        }
        .map_err(storage_error("failed to update thread"))?;

        if updated == 0 {
            return Err(StoreError::not_found(format!("thread '{thread_id}' not found")));
        }
        Ok(())
    }

    fn query_threads(conn: &Connection, sql: &str) -> Result<Vec<Thread>, StoreError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(storage_error("failed to prepare thread query"))?;
        let rows = stmt
            .query_map([], RawThread::read)
            .map_err(storage_error("failed to query threads"))?;

        let mut threads = Vec::new();
        for row in rows {
            threads.push(row.map_err(storage_error("failed to read thread row"))?.decode()?);
        }
        Ok(threads)
    }

    fn query_messages(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(storage_error("failed to prepare message query"))?;
        let rows = stmt
            .query_map(params, RawMessage::read)
            .map_err(storage_error("failed to query messages"))?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(storage_error("failed to read message row"))?.decode()?);
        }
        Ok(messages)
    }
}

impl TreeBackend for SqliteTreeBackend {
    fn insert_thread<'a>(&'a self, thread: &'a Thread) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            Self::insert_thread_row(&conn, thread)
        })
    }

    fn load_thread<'a>(
        &'a self,
        thread_id: &'a ThreadId,
    ) -> BoxFuture<'a, Result<Option<Thread>, StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let raw = conn
                .query_row(
                    &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE thread_id = ?1"),
                    params![thread_id.as_str()],
                    RawThread::read,
                )
                .optional()
                .map_err(storage_error("failed to load thread"))?;
            raw.map(RawThread::decode).transpose()
        })
    }

    fn list_threads<'a>(&'a self) -> BoxFuture<'a, Result<Vec<Thread>, StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            Self::query_threads(
                &conn,
                &format!(
                    "SELECT {THREAD_COLUMNS} FROM threads \
                     ORDER BY updated_at_secs DESC, updated_at_nanos DESC"
                ),
            )
        })
    }

    fn save_thread<'a>(&'a self, thread: &'a Thread) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let (secs, nanos) = encode_system_time(thread.updated_at)?;
            let updated = conn
                .execute(
                    "
                    UPDATE threads
                    SET title = ?2, active_leaf_json = ?3, settings_json = ?4,
                        updated_at_secs = ?5, updated_at_nanos = ?6
                    WHERE thread_id = ?1
                    ",
                    params![
                        thread.id.as_str(),
                        &thread.title,
                        serde_json::to_string(&thread.active_leaf)?,
                        serde_json::to_string(&thread.settings)?,
                        secs,
                        nanos,
                    ],
                )
                .map_err(storage_error("failed to save thread"))?;

            if updated == 0 {
                return Err(StoreError::not_found(format!(
                    "thread '{}' not found",
                    thread.id
                )));
            }
            Ok(())
        })
    }

    fn delete_thread<'a>(
        &'a self,
        thread_id: &'a ThreadId,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let mut conn = self.connection()?;
            let tx = conn
                .transaction()
                .map_err(storage_error("failed to begin transaction"))?;
            tx.execute(
                "DELETE FROM messages WHERE thread_id = ?1",
                params![thread_id.as_str()],
            )
            .map_err(storage_error("failed to delete thread messages"))?;
            let deleted = tx
                .execute(
                    "DELETE FROM threads WHERE thread_id = ?1",
                    params![thread_id.as_str()],
                )
                .map_err(storage_error("failed to delete thread"))?;
            tx.commit()
                .map_err(storage_error("failed to commit thread deletion"))?;
            Ok(deleted > 0)
        })
    }

    fn load_messages<'a>(
        &'a self,
        thread_id: &'a ThreadId,
    ) -> BoxFuture<'a, Result<Vec<StoredMessage>, StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            Self::query_messages(
                &conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE thread_id = ?1 ORDER BY sequence ASC"
                ),
                params![thread_id.as_str()],
            )
        })
    }

    fn load_message<'a>(
        &'a self,
        message_id: &'a MessageId,
    ) -> BoxFuture<'a, Result<Option<StoredMessage>, StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let raw = conn
                .query_row(
                    &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?1"),
                    params![message_id.as_str()],
                    RawMessage::read,
                )
                .optional()
                .map_err(storage_error("failed to load message"))?;
            raw.map(RawMessage::decode).transpose()
        })
    }

    fn insert_message<'a>(
        &'a self,
        mut message: StoredMessage,
        advance_leaf: bool,
    ) -> BoxFuture<'a, Result<StoredMessage, StoreError>> {
        Box::pin(async move {
            let mut conn = self.connection()?;
            let tx = conn
                .transaction()
                .map_err(storage_error("failed to begin transaction"))?;

            message.sequence = Self::insert_message_row(&tx, &message)?;
            let leaf = advance_leaf.then(|| LeafPointer::Message(message.id.clone()));
            Self::touch_thread(&tx, &message.thread_id, leaf.as_ref())?;

            tx.commit()
                .map_err(storage_error("failed to commit message insert"))?;
            Ok(message)
        })
    }

    fn update_message<'a>(
        &'a self,
        message: &'a StoredMessage,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let updated = conn
                .execute(
                    "UPDATE messages SET content = ?2, details_json = ?3 WHERE message_id = ?1",
                    params![
                        message.id.as_str(),
                        &message.content,
                        serde_json::to_string(&MessageDetails::from_message(message))?,
                    ],
                )
                .map_err(storage_error("failed to update message"))?;

            if updated == 0 {
                return Err(StoreError::not_found(format!(
                    "message '{}' not found",
                    message.id
                )));
            }
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
            let mut conn = self.connection()?;
            let tx = conn
                .transaction()
                .map_err(storage_error("failed to begin transaction"))?;

            {
                let mut stmt = tx
                    .prepare("DELETE FROM messages WHERE message_id = ?1 AND thread_id = ?2")
                    .map_err(storage_error("failed to prepare message deletion"))?;
                for id in message_ids {
                    stmt.execute(params![id.as_str(), thread_id.as_str()])
                        .map_err(storage_error("failed to delete message"))?;
                }
            }
            Self::touch_thread(&tx, thread_id, active_leaf.as_ref())?;

            tx.commit()
                .map_err(storage_error("failed to commit subtree deletion"))?;
            Ok(())
        })
    }

    fn export_backup<'a>(&'a self) -> BoxFuture<'a, Result<TreeBackup, StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let threads = Self::query_threads(
                &conn,
                &format!(
                    "SELECT {THREAD_COLUMNS} FROM threads \
                     ORDER BY created_at_secs ASC, created_at_nanos ASC"
                ),
            )?;
            let messages = Self::query_messages(
                &conn,
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY sequence ASC"),
                [],
            )?;

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
            let mut conn = self.connection()?;
            let tx = conn
                .transaction()
                .map_err(storage_error("failed to begin transaction"))?;

            for thread in &backup.threads {
                tx.execute(
                    "DELETE FROM messages WHERE thread_id = ?1",
                    params![thread.id.as_str()],
                )
                .map_err(storage_error("failed to clear thread messages"))?;
                tx.execute(
                    "DELETE FROM threads WHERE thread_id = ?1",
                    params![thread.id.as_str()],
                )
                .map_err(storage_error("failed to clear thread"))?;
                Self::insert_thread_row(&tx, thread)?;
            }

            let mut messages = backup.messages;
            messages.sort_by_key(|message| message.sequence);
            for message in &messages {
                Self::insert_message_row(&tx, message)?;
            }

            // Dropping an uncommitted transaction rolls it back, so any error above leaves the
            // database untouched.
            tx.commit()
                .map_err(storage_error("failed to commit backup import"))?;
            Ok(())
        })
    }
}

/// Columns that are only ever read back with the whole message.
#[derive(Debug, Default, Serialize, Deserialize)]
struct MessageDetails {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage: Option<UsageMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<InlineImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ui_resource: Option<UiResource>,
}

impl MessageDetails {
    fn from_message(message: &StoredMessage) -> Self {
        Self {
            tool_calls: message.tool_calls.clone(),
            tool_call_id: message.tool_call_id.clone(),
            reasoning: message.reasoning.clone(),
            usage: message.usage,
            model: message.model.clone(),
            attachments: message.attachments.clone(),
            images: message.images.clone(),
            ui_resource: message.ui_resource.clone(),
        }
    }
}

struct RawThread {
    thread_id: String,
    title: String,
    active_leaf_json: String,
    settings_json: String,
    created: (i64, i64),
    updated: (i64, i64),
}

impl RawThread {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            thread_id: row.get(0)?,
            title: row.get(1)?,
            active_leaf_json: row.get(2)?,
            settings_json: row.get(3)?,
            created: (row.get(4)?, row.get(5)?),
            updated: (row.get(6)?, row.get(7)?),
        })
    }

    fn decode(self) -> Result<Thread, StoreError> {
        Ok(Thread {
            id: ThreadId::from(self.thread_id),
            title: self.title,
            active_leaf: serde_json::from_str(&self.active_leaf_json)?,
            settings: serde_json::from_str::<ThreadSettings>(&self.settings_json)?,
            created_at: decode_system_time(self.created.0, self.created.1)?,
            updated_at: decode_system_time(self.updated.0, self.updated.1)?,
        })
    }
}

struct RawMessage {
    sequence: i64,
    message_id: String,
    thread_id: String,
    parent_id: Option<String>,
    role: String,
    content: String,
    origin: String,
    details_json: String,
    created: (i64, i64),
}

impl RawMessage {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sequence: row.get(0)?,
            message_id: row.get(1)?,
            thread_id: row.get(2)?,
            parent_id: row.get(3)?,
            role: row.get(4)?,
            content: row.get(5)?,
            origin: row.get(6)?,
            details_json: row.get(7)?,
            created: (row.get(8)?, row.get(9)?),
        })
    }

    fn decode(self) -> Result<StoredMessage, StoreError> {
        let details = serde_json::from_str::<MessageDetails>(&self.details_json)?;
        Ok(StoredMessage {
            id: MessageId::from(self.message_id),
            thread_id: ThreadId::from(self.thread_id),
            parent_id: self.parent_id.map(MessageId::from),
            role: role_from_str(&self.role)?,
            content: self.content,
            tool_calls: details.tool_calls,
            tool_call_id: details.tool_call_id,
            reasoning: details.reasoning,
            usage: details.usage,
            model: details.model,
            attachments: details.attachments,
            images: details.images,
            origin: origin_from_str(&self.origin)?,
            ui_resource: details.ui_resource,
            created_at: decode_system_time(self.created.0, self.created.1)?,
            sequence: self.sequence as u64,
        })
    }
}

fn storage_error(context: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |error| StoreError::storage(format!("{context}: {error}"))
}

fn role_from_str(value: &str) -> Result<Role, StoreError> {
    match value {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(StoreError::storage(format!("unknown stored role '{other}'"))),
    }
}

fn origin_to_str(origin: MessageOrigin) -> &'static str {
    match origin {
        MessageOrigin::User => "user",
        MessageOrigin::Model => "model",
        MessageOrigin::System => "system",
    }
}

fn origin_from_str(value: &str) -> Result<MessageOrigin, StoreError> {
    match value {
        "user" => Ok(MessageOrigin::User),
        "model" => Ok(MessageOrigin::Model),
        "system" => Ok(MessageOrigin::System),
        other => Err(StoreError::storage(format!("unknown stored origin '{other}'"))),
    }
}

fn encode_system_time(value: SystemTime) -> Result<(i64, i64), StoreError> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        StoreError::invalid_request(format!("timestamp predates unix epoch: {error}"))
    })?;
    Ok((
        duration.as_secs() as i64,
        i64::from(duration.subsec_nanos()),
    ))
}

fn decode_system_time(seconds: i64, nanos: i64) -> Result<SystemTime, StoreError> {
    if seconds < 0 {
        return Err(StoreError::storage(format!(
            "timestamp seconds must be non-negative, got {seconds}"
        )));
    }
    if !(0..1_000_000_000).contains(&nanos) {
        return Err(StoreError::storage(format!(
            "timestamp nanos must be in [0, 1_000_000_000), got {nanos}"
        )));
    }
    Ok(UNIX_EPOCH + Duration::new(seconds as u64, nanos as u32))
}

pub(crate) fn default_sqlite_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os("TRELLIS_SQLITE_PATH") {
        return PathBuf::from(explicit);
    }

    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        return PathBuf::from(home).join(".trellis").join("threads.sqlite3");
    }

    PathBuf::from("trellis-threads.sqlite3")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_time_round_trips_through_parts() {
        let value = UNIX_EPOCH + Duration::new(1_700_000_000, 123);
        let (secs, nanos) = encode_system_time(value).expect("encode");
        assert_eq!(decode_system_time(secs, nanos).expect("decode"), value);
        assert!(decode_system_time(-1, 0).is_err());
    }

    #[tokio::test]
    async fn import_conflict_rolls_back_everything() {
        let backend = SqliteTreeBackend::new_in_memory().expect("sqlite");
        let thread = Thread::new("existing", ThreadSettings::default());
        backend.insert_thread(&thread).await.expect("thread");
        let message = crate::NewMessage::user(thread.id.clone(), "hi")
            .into_stored(None, SystemTime::now());
        let message = backend
            .insert_message(message, true)
            .await
            .expect("message");

        let incoming = Thread::new("incoming", ThreadSettings::default());
        let mut clash = message.clone();
        clash.thread_id = incoming.id.clone();
        let backup = TreeBackup {
            version: BACKUP_FORMAT_VERSION,
            exported_at: SystemTime::now(),
            threads: vec![incoming.clone()],
            messages: vec![clash],
        };

        assert!(backend.import_backup(backup).await.is_err());
        assert!(
            backend
                .load_thread(&incoming.id)
                .await
                .expect("lookup")
                .is_none()
        );
    }
}
