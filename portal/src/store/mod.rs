//! Portal stores built on the database gateway.
//!
//! Each store holds a clone of the shared [`Database`] handle and writes SQL
//! with `?` placeholders only, so the same statements run on either engine.
//! Inserts append `RETURNING id`.

mod accounts;
mod email_logs;
mod followups;
mod messages;
mod questionnaires;

pub use accounts::{
    hash_password, verify_password, Account, AccountStore, NewAccount, Role, MIN_PASSWORD_LEN,
    PASSWORD_COST,
};
pub use email_logs::{EmailLog, EmailLogStore, EmailStatus};
pub use followups::{Followup, FollowupStore};
pub use messages::{AdminMessage, MessageStore};
pub use questionnaires::{
    QuestionnaireDetail, QuestionnaireStore, QuestionnaireSummary, RiskStats, TriageEntry,
};

use db::{Database, DbError, StatementResult};

/// Errors that can occur in store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("password hashing failed: {0}")]
    Password(#[from] bcrypt::BcryptError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("consent is required before answers can be stored")]
    ConsentRequired,

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("insert into {0} returned no id")]
    MissingId(&'static str),
}

impl StoreError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

fn inserted_id(result: StatementResult, table: &'static str) -> Result<i64, StoreError> {
    result.inserted_id.ok_or(StoreError::MissingId(table))
}

/// All stores over one handle.
#[derive(Clone)]
pub struct Stores {
    pub accounts: AccountStore,
    pub questionnaires: QuestionnaireStore,
    pub followups: FollowupStore,
    pub email_logs: EmailLogStore,
    pub messages: MessageStore,
}

impl Stores {
    pub fn new(db: &Database) -> Self {
        Self {
            accounts: AccountStore::new(db.clone()),
            questionnaires: QuestionnaireStore::new(db.clone()),
            followups: FollowupStore::new(db.clone()),
            email_logs: EmailLogStore::new(db.clone()),
            messages: MessageStore::new(db.clone()),
        }
    }
}
