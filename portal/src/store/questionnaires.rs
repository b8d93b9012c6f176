//! Questionnaire submissions, triage queries and manual review.

use db::{params, Database, Row, Statements, Value};
use serde::Serialize;

use super::{inserted_id, StoreError};
use crate::risk::{Answers, Assessment, RiskLevel};

/// Upper bound for a manually assigned score.
pub const MAX_MANUAL_SCORE: i64 = 999;

/// Rows returned by [`QuestionnaireStore::search`].
const SEARCH_LIMIT: i64 = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionnaireSummary {
    pub id: i64,
    pub risk_level: RiskLevel,
    pub risk_score: i64,
    pub created_at: String,
}

impl QuestionnaireSummary {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.try_get("id")?,
            risk_level: level_from_row(row)?,
            risk_score: row.try_get("risk_score")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// A submission joined with the account that sent it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionnaireDetail {
    pub id: i64,
    pub account_id: i64,
    pub account_name: String,
    pub account_email: String,
    pub consented: bool,
    pub answers: Answers,
    pub risk_score: i64,
    pub risk_level: RiskLevel,
    pub created_at: String,
}

/// One line of the admin triage list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageEntry {
    pub id: i64,
    pub risk_level: RiskLevel,
    pub risk_score: i64,
    pub created_at: String,
    pub name: String,
    pub email: String,
}

impl TriageEntry {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.try_get("id")?,
            risk_level: level_from_row(row)?,
            risk_score: row.try_get("risk_score")?,
            created_at: row.try_get("created_at")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskStats {
    pub total: i64,
    pub critical: i64,
    pub at_risk: i64,
}

fn level_from_row(row: &Row) -> Result<RiskLevel, StoreError> {
    row.try_get::<String>("risk_level")?
        .parse()
        .map_err(|e: crate::risk::ParseRiskLevelError| {
            StoreError::invalid("risk_level", e.to_string())
        })
}

const TRIAGE_SELECT: &str =
    "SELECT q.id, q.risk_level, q.risk_score, q.created_at, a.name, a.email \
     FROM questionnaires q \
     JOIN accounts a ON a.id = q.account_id";

#[derive(Clone)]
pub struct QuestionnaireStore {
    db: Database,
}

impl QuestionnaireStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store a scored submission. Nothing is written without consent.
    pub async fn submit(
        &self,
        account_id: i64,
        consented: bool,
        answers: &Answers,
        assessment: Assessment,
    ) -> Result<i64, StoreError> {
        if !consented {
            return Err(StoreError::ConsentRequired);
        }
        let answers_json = serde_json::to_string(answers)?;

        let result = self
            .db
            .execute(
                "INSERT INTO questionnaires \
                 (account_id, consented, answers_json, risk_score, risk_level) \
                 VALUES (?, ?, ?, ?, ?) RETURNING id",
                &params![
                    account_id,
                    consented,
                    answers_json,
                    assessment.score,
                    assessment.level.as_str()
                ],
            )
            .await?;
        let id = inserted_id(result, "questionnaires")?;

        tracing::info!(
            id,
            account_id,
            level = %assessment.level,
            score = assessment.score,
            "Stored questionnaire"
        );
        Ok(id)
    }

    pub async fn latest_for_account(
        &self,
        account_id: i64,
    ) -> Result<Option<QuestionnaireSummary>, StoreError> {
        self.db
            .query_one(
                "SELECT id, risk_level, risk_score, created_at FROM questionnaires \
                 WHERE account_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
                &params![account_id],
            )
            .await?
            .as_ref()
            .map(QuestionnaireSummary::from_row)
            .transpose()
    }

    /// A submission only if it belongs to `account_id`.
    pub async fn find_for_account(
        &self,
        id: i64,
        account_id: i64,
    ) -> Result<Option<QuestionnaireSummary>, StoreError> {
        self.db
            .query_one(
                "SELECT id, risk_level, risk_score, created_at FROM questionnaires \
                 WHERE id = ? AND account_id = ?",
                &params![id, account_id],
            )
            .await?
            .as_ref()
            .map(QuestionnaireSummary::from_row)
            .transpose()
    }

    pub async fn history_for_account(
        &self,
        account_id: i64,
    ) -> Result<Vec<QuestionnaireSummary>, StoreError> {
        self.db
            .query_all(
                "SELECT id, risk_level, risk_score, created_at FROM questionnaires \
                 WHERE account_id = ? ORDER BY created_at DESC, id DESC",
                &params![account_id],
            )
            .await?
            .iter()
            .map(QuestionnaireSummary::from_row)
            .collect()
    }

    pub async fn find_detail(&self, id: i64) -> Result<Option<QuestionnaireDetail>, StoreError> {
        let Some(row) = self
            .db
            .query_one(
                "SELECT q.id, q.account_id, q.consented, q.answers_json, q.risk_score, \
                        q.risk_level, q.created_at, a.name, a.email \
                 FROM questionnaires q \
                 JOIN accounts a ON a.id = q.account_id \
                 WHERE q.id = ?",
                &params![id],
            )
            .await?
        else {
            return Ok(None);
        };

        let answers_json: String = row.try_get("answers_json")?;
        Ok(Some(QuestionnaireDetail {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            account_name: row.try_get("name")?,
            account_email: row.try_get("email")?,
            consented: row.try_get("consented")?,
            answers: serde_json::from_str(&answers_json)?,
            risk_score: row.try_get("risk_score")?,
            risk_level: level_from_row(&row)?,
            created_at: row.try_get("created_at")?,
        }))
    }

    /// Dashboard counters.
    pub async fn stats(&self) -> Result<RiskStats, StoreError> {
        Ok(RiskStats {
            total: self.count(None).await?,
            critical: self.count(Some(RiskLevel::Critical)).await?,
            at_risk: self.count(Some(RiskLevel::AtRisk)).await?,
        })
    }

    async fn count(&self, level: Option<RiskLevel>) -> Result<i64, StoreError> {
        let row = match level {
            Some(level) => {
                self.db
                    .query_one(
                        "SELECT COUNT(*) AS c FROM questionnaires WHERE risk_level = ?",
                        &params![level.as_str()],
                    )
                    .await?
            }
            None => {
                self.db
                    .query_one("SELECT COUNT(*) AS c FROM questionnaires", &[])
                    .await?
            }
        };
        match row {
            Some(row) => Ok(row.try_get("c")?),
            None => Ok(0),
        }
    }

    /// Critical submissions first, then at-risk, newest first within each.
    pub async fn flagged(&self, limit: i64) -> Result<Vec<TriageEntry>, StoreError> {
        let sql = format!(
            "{TRIAGE_SELECT} \
             WHERE q.risk_level IN (?, ?) \
             ORDER BY CASE q.risk_level WHEN ? THEN 0 ELSE 1 END, q.created_at DESC, q.id DESC \
             LIMIT ?"
        );
        self.db
            .query_all(
                &sql,
                &params![
                    RiskLevel::Critical.as_str(),
                    RiskLevel::AtRisk.as_str(),
                    RiskLevel::Critical.as_str(),
                    limit.max(0)
                ],
            )
            .await?
            .iter()
            .map(TriageEntry::from_row)
            .collect()
    }

    /// Filter by level and/or a case-insensitive fragment of the account's
    /// name or email. Newest first, at most 200 rows.
    pub async fn search(
        &self,
        level: Option<RiskLevel>,
        text: Option<&str>,
    ) -> Result<Vec<TriageEntry>, StoreError> {
        let mut clauses = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if let Some(level) = level {
            clauses.push("q.risk_level = ?");
            args.push(level.as_str().into());
        }
        if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", text.to_lowercase());
            clauses.push("(LOWER(a.name) LIKE ? OR LOWER(a.email) LIKE ?)");
            args.push(pattern.clone().into());
            args.push(pattern.into());
        }
        args.push(SEARCH_LIMIT.into());

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!("{TRIAGE_SELECT} {filter} ORDER BY q.created_at DESC, q.id DESC LIMIT ?");

        self.db
            .query_all(&sql, &args)
            .await?
            .iter()
            .map(TriageEntry::from_row)
            .collect()
    }

    /// Manually set the level (and optionally the score) of a submission.
    ///
    /// The update and an audit follow-up note are written in one transaction.
    /// Returns `false` when the submission does not exist.
    pub async fn update_status(
        &self,
        id: i64,
        admin_id: i64,
        level: RiskLevel,
        score: Option<i64>,
    ) -> Result<bool, StoreError> {
        if let Some(score) = score {
            if !(0..=MAX_MANUAL_SCORE).contains(&score) {
                return Err(StoreError::invalid(
                    "risk_score",
                    format!("{score} is outside 0..={MAX_MANUAL_SCORE}"),
                ));
            }
        }

        let mut tx = self.db.begin().await?;

        let updated = match score {
            Some(score) => {
                tx.execute(
                    "UPDATE questionnaires SET risk_level = ?, risk_score = ? WHERE id = ?",
                    &params![level.as_str(), score, id],
                )
                .await?
            }
            None => {
                tx.execute(
                    "UPDATE questionnaires SET risk_level = ? WHERE id = ?",
                    &params![level.as_str(), id],
                )
                .await?
            }
        };
        if updated.rows_affected == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO followups (questionnaire_id, admin_id, note) \
             VALUES (?, ?, ?) \
             RETURNING id",
            &params![id, admin_id, status_note(level, score)],
        )
        .await?;
        tx.commit().await?;

        tracing::info!(id, admin_id, level = %level, ?score, "Updated questionnaire status");
        Ok(true)
    }
}

fn status_note(level: RiskLevel, score: Option<i64>) -> String {
    match score {
        Some(score) => format!("Classification updated by admin -> {level} (score: {score})"),
        None => format!("Classification updated by admin -> {level}"),
    }
}
