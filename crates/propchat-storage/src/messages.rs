//! SQLite-backed chat message store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::Row;
use uuid::Uuid;

use propchat_core::error::PropChatError;
use propchat_core::services::MessageStore;
use propchat_core::types::{Message, MessageMetadata, MessageRole, NewMessage};

use crate::db::Database;

/// Repository for chat messages. Messages are never updated or deleted.
pub struct MessageRepository {
    db: Arc<Database>,
}

impl MessageRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a message and return the stored record.
    pub fn insert(&self, message: NewMessage) -> Result<Message, PropChatError> {
        let stored = Message {
            id: Uuid::new_v4(),
            conversation_id: message.conversation_id,
            user_id: message.user_id,
            role: message.role,
            content: message.content,
            metadata: message.metadata,
            created_at: Utc::now(),
        };

        let metadata_json = stored
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, user_id, role, content, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    stored.id.to_string(),
                    stored.conversation_id,
                    stored.user_id.to_string(),
                    stored.role.as_str(),
                    stored.content,
                    metadata_json,
                    stored.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| PropChatError::Storage(format!("Failed to save message: {}", e)))?;
            Ok(())
        })?;

        Ok(stored)
    }

    /// Messages of a conversation owned by `user_id`, in insertion order.
    pub fn list(&self, conversation_id: &str, user_id: Uuid) -> Result<Vec<Message>, PropChatError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, conversation_id, user_id, role, content, metadata, created_at
                     FROM messages
                     WHERE conversation_id = ?1 AND user_id = ?2
                     ORDER BY rowid ASC",
                )
                .map_err(|e| PropChatError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(
                    rusqlite::params![conversation_id, user_id.to_string()],
                    |row| Ok(row_to_message(row)),
                )
                .map_err(|e| PropChatError::Storage(e.to_string()))?;

            let mut messages = Vec::new();
            for row in rows {
                let message = row.map_err(|e| PropChatError::Storage(e.to_string()))??;
                messages.push(message);
            }
            Ok(messages)
        })
    }

    /// Total stored messages.
    pub fn count(&self) -> Result<u64, PropChatError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
                .map_err(|e| PropChatError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn insert_message(&self, message: NewMessage) -> Result<Message, PropChatError> {
        self.insert(message)
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        user_id: Uuid,
    ) -> Result<Vec<Message>, PropChatError> {
        self.list(conversation_id, user_id)
    }
}

fn row_to_message(row: &Row<'_>) -> Result<Message, PropChatError> {
    let storage = |e: rusqlite::Error| PropChatError::Storage(e.to_string());

    let id: String = row.get(0).map_err(storage)?;
    let user_id: String = row.get(2).map_err(storage)?;
    let role: String = row.get(3).map_err(storage)?;
    let metadata: Option<String> = row.get(5).map_err(storage)?;
    let created_at: i64 = row.get(6).map_err(storage)?;

    let metadata = metadata
        .map(|json| serde_json::from_str::<MessageMetadata>(&json))
        .transpose()?;

    Ok(Message {
        id: Uuid::parse_str(&id).map_err(|e| PropChatError::Storage(e.to_string()))?,
        conversation_id: row.get(1).map_err(storage)?,
        user_id: Uuid::parse_str(&user_id).map_err(|e| PropChatError::Storage(e.to_string()))?,
        role: MessageRole::parse(&role)
            .ok_or_else(|| PropChatError::Storage(format!("Unknown message role: {}", role)))?,
        content: row.get(4).map_err(storage)?,
        metadata,
        created_at: Utc
            .timestamp_millis_opt(created_at)
            .single()
            .unwrap_or_else(Utc::now),
    })
}
