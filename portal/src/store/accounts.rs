//! Student and admin accounts.

use std::fmt;

use db::{params, Database, Row, Statements};
use serde::Serialize;

use super::{inserted_id, StoreError};

/// bcrypt work factor for stored credentials.
pub const PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Hash a plain password for [`NewAccount::password_hash`].
pub fn hash_password(password: &str) -> Result<String, StoreError> {
    hash_password_with_cost(password, PASSWORD_COST)
}

pub(crate) fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, StoreError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(StoreError::invalid(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters, got {len}"),
        ));
    }
    Ok(bcrypt::hash(password, cost)?)
}

/// Check a plain password against a stored bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, StoreError> {
    Ok(bcrypt::verify(password, hash)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Admin => "admin",
        }
    }

    fn parse(tag: &str) -> Result<Self, StoreError> {
        match tag {
            "student" => Ok(Self::Student),
            "admin" => Ok(Self::Admin),
            other => Err(StoreError::invalid("role", format!("unknown role '{other}'"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    /// Already hashed; plain passwords never reach the store.
    pub password_hash: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub has_credential: bool,
    pub created_at: String,
}

impl Account {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            role: Role::parse(&row.try_get::<String>("role")?)?,
            has_credential: row.try_get::<Option<String>>("password_hash")?.is_some(),
            created_at: row.try_get("created_at")?,
        })
    }
}

const ACCOUNT_COLUMNS: &str = "id, name, email, role, password_hash, created_at";

#[derive(Clone)]
pub struct AccountStore {
    db: Database,
}

impl AccountStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert an account. A duplicate email fails with a unique violation
    /// (see [`db::DbError::is_unique_violation`]).
    pub async fn create(&self, account: &NewAccount) -> Result<i64, StoreError> {
        let email = account.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(StoreError::invalid("email", "must not be empty"));
        }

        let result = self
            .db
            .execute(
                "INSERT INTO accounts (name, email, password_hash, role) \
                 VALUES (?, ?, ?, ?) \
                 RETURNING id",
                &params![
                    account.name.trim(),
                    email,
                    account.password_hash.clone(),
                    account.role.as_str()
                ],
            )
            .await?;
        let id = inserted_id(result, "accounts")?;

        tracing::debug!(id, role = %account.role, "Created account");
        Ok(id)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        self.db
            .query_one(&sql, &params![id])
            .await?
            .as_ref()
            .map(Account::from_row)
            .transpose()
    }

    /// Emails are stored lower-cased; the lookup folds case the same way.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?");
        self.db
            .query_one(&sql, &params![email.trim().to_lowercase()])
            .await?
            .as_ref()
            .map(Account::from_row)
            .transpose()
    }

    /// The account for `email` if `password` matches its credential.
    ///
    /// Accounts without a credential never match.
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?");
        let Some(row) = self
            .db
            .query_one(&sql, &params![email.trim().to_lowercase()])
            .await?
        else {
            return Ok(None);
        };
        let Some(hash) = row.try_get::<Option<String>>("password_hash")? else {
            return Ok(None);
        };
        if !verify_password(password, &hash)? {
            tracing::debug!(email, "Password mismatch");
            return Ok(None);
        }
        Account::from_row(&row).map(Some)
    }

    pub async fn email_taken(&self, email: &str) -> Result<bool, StoreError> {
        let row = self
            .db
            .query_one(
                "SELECT id FROM accounts WHERE email = ?",
                &params![email.trim().to_lowercase()],
            )
            .await?;
        Ok(row.is_some())
    }

    /// Admin accounts, newest first.
    pub async fn list_admins(&self) -> Result<Vec<Account>, StoreError> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE role = ? \
             ORDER BY created_at DESC, id DESC"
        );
        self.db
            .query_all(&sql, &params![Role::Admin.as_str()])
            .await?
            .iter()
            .map(Account::from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::open_db;

    // bcrypt keeps its MIN_COST private; 4 is its minimum accepted cost.
    const MIN_COST: u32 = 4;

    fn new_account(name: &str, email: &str, role: Role) -> NewAccount {
        NewAccount {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: None,
            role,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let (_dir, db) = open_db().await;
        let store = AccountStore::new(db);

        let mut ana = new_account("Ana", "Ana@Portal.Test ", Role::Student);
        ana.password_hash = Some("$2b$12$hash".to_string());
        let id = store.create(&ana).await.unwrap();

        let by_id = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "Ana");
        assert_eq!(by_id.email, "ana@portal.test");
        assert_eq!(by_id.role, Role::Student);
        assert!(by_id.has_credential);

        let by_email = store.find_by_email("ANA@portal.test").await.unwrap();
        assert_eq!(by_email, Some(by_id));
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let (_dir, db) = open_db().await;
        let store = AccountStore::new(db);

        let mut root = new_account("Root", "root@portal.test", Role::Admin);
        root.password_hash = Some(hash_password_with_cost("s3cret!", MIN_COST).unwrap());
        let id = store.create(&root).await.unwrap();
        store
            .create(&new_account("Ana", "ana@portal.test", Role::Student))
            .await
            .unwrap();

        let found = store
            .verify_credentials("Root@Portal.test", "s3cret!")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert!(store
            .verify_credentials("root@portal.test", "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .verify_credentials("ana@portal.test", "anything")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .verify_credentials("nobody@portal.test", "s3cret!")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_hash_password() {
        let hash = hash_password_with_cost("hunter22", MIN_COST).unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());

        let err = hash_password_with_cost("short", MIN_COST).unwrap_err();
        assert!(matches!(err, StoreError::Invalid { field: "password", .. }));
        assert!(verify_password("hunter22", "not a bcrypt hash").is_err());
    }

    #[tokio::test]
    async fn test_missing_account_is_none() {
        let (_dir, db) = open_db().await;
        let store = AccountStore::new(db);

        assert!(store.find_by_id(404).await.unwrap().is_none());
        assert!(store.find_by_email("nobody@portal.test").await.unwrap().is_none());
        assert!(!store.email_taken("nobody@portal.test").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let (_dir, db) = open_db().await;
        let store = AccountStore::new(db);

        store
            .create(&new_account("Ana", "ana@portal.test", Role::Student))
            .await
            .unwrap();
        assert!(store.email_taken("ana@portal.test").await.unwrap());

        let err = store
            .create(&new_account("Ana Two", "ANA@portal.test", Role::Student))
            .await
            .unwrap_err();
        match err {
            StoreError::Db(e) => assert!(e.is_unique_violation(), "{e}"),
            other => panic!("expected Db error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_email_rejected() {
        let (_dir, db) = open_db().await;
        let store = AccountStore::new(db);

        let err = store
            .create(&new_account("Ana", "  ", Role::Student))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid { field: "email", .. }));
    }

    #[tokio::test]
    async fn test_list_admins_only_returns_admins() {
        let (_dir, db) = open_db().await;
        let store = AccountStore::new(db);

        store
            .create(&new_account("Student", "s@portal.test", Role::Student))
            .await
            .unwrap();
        let first = store
            .create(&new_account("First", "a1@portal.test", Role::Admin))
            .await
            .unwrap();
        let second = store
            .create(&new_account("Second", "a2@portal.test", Role::Admin))
            .await
            .unwrap();

        let admins = store.list_admins().await.unwrap();
        let ids: Vec<i64> = admins.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert!(admins.iter().all(|a| a.role == Role::Admin && !a.has_credential));
    }
}
