//! Outgoing email log.
//!
//! A message is logged as `queued` before delivery is attempted and then
//! marked `sent` or `failed`. Delivery itself happens outside the store.

use std::fmt;

use db::{params, Database, Row, Statements};
use serde::Serialize;

use super::{inserted_id, StoreError};

const MIN_SUBJECT_LEN: usize = 3;
const MIN_BODY_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Queued,
    Sent,
    Failed,
}

impl EmailStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    fn parse(tag: &str) -> Result<Self, StoreError> {
        match tag {
            "queued" => Ok(Self::Queued),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::invalid(
                "status",
                format!("unknown email status '{other}'"),
            )),
        }
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailLog {
    pub id: i64,
    pub questionnaire_id: i64,
    pub admin_id: i64,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub status: EmailStatus,
    pub error: Option<String>,
    pub created_at: String,
}

impl EmailLog {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.try_get("id")?,
            questionnaire_id: row.try_get("questionnaire_id")?,
            admin_id: row.try_get("admin_id")?,
            to_email: row.try_get("to_email")?,
            subject: row.try_get("subject")?,
            body: row.try_get("body")?,
            status: EmailStatus::parse(&row.try_get::<String>("status")?)?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Clone)]
pub struct EmailLogStore {
    db: Database,
}

impl EmailLogStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Log a message to the account that sent `questionnaire_id`.
    ///
    /// Subject and body are trimmed and need at least 3 and 10 characters.
    /// The recipient is resolved in the same statement; an unknown
    /// submission fails with [`StoreError::NotFound`].
    pub async fn queue(
        &self,
        questionnaire_id: i64,
        admin_id: i64,
        subject: &str,
        body: &str,
    ) -> Result<i64, StoreError> {
        let subject = require_len("subject", subject, MIN_SUBJECT_LEN)?;
        let body = require_len("body", body, MIN_BODY_LEN)?;

        let result = self
            .db
            .execute(
                "INSERT INTO email_logs (questionnaire_id, admin_id, to_email, subject, body) \
                 SELECT q.id, ?, a.email, ?, ? \
                 FROM questionnaires q \
                 JOIN accounts a ON a.id = q.account_id \
                 WHERE q.id = ? \
                 RETURNING id",
                &params![admin_id, subject, body, questionnaire_id],
            )
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound {
                entity: "questionnaire",
                id: questionnaire_id,
            });
        }
        inserted_id(result, "email_logs")
    }

    pub async fn mark_sent(&self, id: i64) -> Result<(), StoreError> {
        self.set_status(id, EmailStatus::Sent, None).await
    }

    pub async fn mark_failed(&self, id: i64, error: &str) -> Result<(), StoreError> {
        tracing::warn!(id, error, "Email delivery failed");
        self.set_status(id, EmailStatus::Failed, Some(error)).await
    }

    async fn set_status(
        &self,
        id: i64,
        status: EmailStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = self
            .db
            .execute(
                "UPDATE email_logs SET status = ?, error = ? WHERE id = ?",
                &params![status.as_str(), error, id],
            )
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound {
                entity: "email log",
                id,
            });
        }
        Ok(())
    }

    /// Log entries for one submission, newest first.
    pub async fn list_for(&self, questionnaire_id: i64) -> Result<Vec<EmailLog>, StoreError> {
        self.db
            .query_all(
                "SELECT id, questionnaire_id, admin_id, to_email, subject, body, status, error, \
                        created_at \
                 FROM email_logs \
                 WHERE questionnaire_id = ? \
                 ORDER BY created_at DESC, id DESC",
                &params![questionnaire_id],
            )
            .await?
            .iter()
            .map(EmailLog::from_row)
            .collect()
    }
}

fn require_len<'a>(
    field: &'static str,
    text: &'a str,
    min: usize,
) -> Result<&'a str, StoreError> {
    let text = text.trim();
    let len = text.chars().count();
    if len < min {
        return Err(StoreError::invalid(
            field,
            format!("must be at least {min} characters, got {len}"),
        ));
    }
    Ok(text)
}
