//! Admin discussion board.

use db::{params, Database, Row, Statements};
use serde::Serialize;

use super::{inserted_id, StoreError};

const MAX_MESSAGE_LEN: usize = 800;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminMessage {
    pub id: i64,
    pub admin_id: i64,
    pub author: String,
    pub message: String,
    pub created_at: String,
}

impl AdminMessage {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.try_get("id")?,
            admin_id: row.try_get("admin_id")?,
            author: row.try_get("author")?,
            message: row.try_get("message")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Clone)]
pub struct MessageStore {
    db: Database,
}

impl MessageStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Post a message of 1 to 800 characters (after trimming).
    pub async fn post(&self, admin_id: i64, message: &str) -> Result<i64, StoreError> {
        let message = message.trim();
        let len = message.chars().count();
        if len == 0 || len > MAX_MESSAGE_LEN {
            return Err(StoreError::invalid(
                "message",
                format!("must be 1 to {MAX_MESSAGE_LEN} characters, got {len}"),
            ));
        }

        let result = self
            .db
            .execute(
                "INSERT INTO admin_messages (admin_id, message) VALUES (?, ?) RETURNING id",
                &params![admin_id, message],
            )
            .await?;
        inserted_id(result, "admin_messages")
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<AdminMessage>, StoreError> {
        self.db
            .query_all(
                "SELECT m.id, m.admin_id, a.name AS author, m.message, m.created_at \
                 FROM admin_messages m \
                 JOIN accounts a ON a.id = m.admin_id \
                 ORDER BY m.created_at DESC, m.id DESC \
                 LIMIT ?",
                &params![limit.max(0)],
            )
            .await?
            .iter()
            .map(AdminMessage::from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{account, open_db};
    use crate::store::Role;

    #[tokio::test]
    async fn test_post_and_read_newest_first() {
        let (_dir, db) = open_db().await;
        let store = MessageStore::new(db.clone());
        let root = account(&db, "Root", Role::Admin).await;
        let ops = account(&db, "Ops", Role::Admin).await;

        let first = store.post(root, "Morning shift starts").await.unwrap();
        let second = store.post(ops, "Two flagged overnight").await.unwrap();
        let third = store.post(root, "On it").await.unwrap();

        let messages = store.recent(10).await.unwrap();
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![third, second, first]);
        assert_eq!(messages[1].author, "Ops");

        assert_eq!(store.recent(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_message_length_bounds() {
        let (_dir, db) = open_db().await;
        let store = MessageStore::new(db.clone());
        let root = account(&db, "Root", Role::Admin).await;

        assert!(matches!(
            store.post(root, "   ").await.unwrap_err(),
            StoreError::Invalid { field: "message", .. }
        ));
        assert!(store.post(root, &"x".repeat(MAX_MESSAGE_LEN + 1)).await.is_err());
        assert!(store.post(root, &"x".repeat(MAX_MESSAGE_LEN)).await.is_ok());
    }
}
