//! Admin follow-up notes on a submission.

use db::{params, Database, Row, Statements};
use serde::Serialize;

use super::{inserted_id, StoreError};

/// Shorter notes are rejected.
const MIN_NOTE_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Followup {
    pub id: i64,
    pub questionnaire_id: i64,
    pub admin_id: i64,
    pub admin_name: String,
    pub note: String,
    pub created_at: String,
}

impl Followup {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.try_get("id")?,
            questionnaire_id: row.try_get("questionnaire_id")?,
            admin_id: row.try_get("admin_id")?,
            admin_name: row.try_get("admin_name")?,
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Clone)]
pub struct FollowupStore {
    db: Database,
}

impl FollowupStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn add(
        &self,
        questionnaire_id: i64,
        admin_id: i64,
        note: &str,
    ) -> Result<i64, StoreError> {
        let note = note.trim();
        if note.chars().count() < MIN_NOTE_LEN {
            return Err(StoreError::invalid(
                "note",
                format!("must be at least {MIN_NOTE_LEN} characters"),
            ));
        }

        let result = self
            .db
            .execute(
                "INSERT INTO followups (questionnaire_id, admin_id, note) \
                 VALUES (?, ?, ?) \
                 RETURNING id",
                &params![questionnaire_id, admin_id, note],
            )
            .await?;
        inserted_id(result, "followups")
    }

    /// Notes for one submission with the author's name, newest first.
    pub async fn list_for(&self, questionnaire_id: i64) -> Result<Vec<Followup>, StoreError> {
        self.db
            .query_all(
                "SELECT f.id, f.questionnaire_id, f.admin_id, a.name AS admin_name, f.note, \
                        f.created_at \
                 FROM followups f \
                 JOIN accounts a ON a.id = f.admin_id \
                 WHERE f.questionnaire_id = ? \
                 ORDER BY f.created_at DESC, f.id DESC",
                &params![questionnaire_id],
            )
            .await?
            .iter()
            .map(Followup::from_row)
            .collect()
    }
}
