//! The statement contract shared by both engines.
//!
//! Every method's future is `Send`, so a handle can be driven from
//! `tokio::spawn` tasks. Implementors write plain `async fn`.

use std::future::Future;

use crate::{DbError, Row, Value};

/// Uniform outcome of a mutating statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatementResult {
    pub rows_affected: u64,
    /// Identifier of the single row the statement created, when it could be
    /// obtained without guessing.
    pub inserted_id: Option<i64>,
}

/// Engine-agnostic statement execution.
///
/// `sql` uses `?` for every positional parameter, whatever the active
/// engine. A literal `?` is only allowed inside quoted literals or
/// identifiers.
pub trait Statements: Send + Sync {
    /// Run an INSERT, UPDATE or DELETE.
    ///
    /// Append `RETURNING id` to an INSERT to receive the new row's id on the
    /// networked engine; the embedded engine reports it either way.
    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<StatementResult, DbError>> + Send;

    /// First matching row, or `None` when nothing matches.
    fn query_one(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<Option<Row>, DbError>> + Send;

    /// All matching rows; empty when nothing matches.
    fn query_all(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<Vec<Row>, DbError>> + Send;
}

/// Fail before reaching the driver when markers and parameters disagree.
pub(crate) fn check_arity(sql: &str, params: &[Value]) -> Result<(), DbError> {
    let markers = crate::placeholder::count(sql);
    if markers != params.len() {
        return Err(DbError::query(format!(
            "statement has {} placeholder(s) but {} parameter(s) were bound",
            markers,
            params.len()
        )));
    }
    Ok(())
}

/// Decide `inserted_id` from what the engine reported.
///
/// A returned `id` column wins. Otherwise `fallback_rowid` (only supplied by
/// the embedded engine) is used for a plain INSERT that changed exactly one
/// row. Anything else leaves the id absent.
pub(crate) fn resolve_inserted_id(
    sql: &str,
    rows_affected: u64,
    returned_id: Option<i64>,
    fallback_rowid: Option<i64>,
) -> Option<i64> {
    if rows_affected != 1 {
        return None;
    }
    if returned_id.is_some() {
        return returned_id;
    }
    if is_plain_insert(sql) {
        return fallback_rowid.filter(|id| *id > 0);
    }
    None
}

/// An INSERT whose last-inserted rowid belongs to this statement. Upserts are
/// excluded: when the conflict branch updates, the rowid is stale.
fn is_plain_insert(sql: &str) -> bool {
    let upper = sql.trim_start().to_ascii_uppercase();
    upper.starts_with("INSERT") && !upper.contains("ON CONFLICT") && !upper.contains("OR REPLACE")
}

/// The `id` column of a returned row, if it holds an integer.
pub(crate) fn returned_id(row: &Row) -> Option<i64> {
    row.get("id").and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_mismatch_is_query_failure() {
        let err = check_arity("SELECT * FROM accounts WHERE id = ?", &[]).unwrap_err();
        assert!(matches!(err, DbError::QueryFailed { source: None, .. }));
        assert!(check_arity("SELECT 1", &[]).is_ok());
    }

    #[test]
    fn test_returned_id_wins() {
        let sql = "INSERT INTO accounts (name, email) VALUES (?, ?) RETURNING id";
        assert_eq!(resolve_inserted_id(sql, 1, Some(9), Some(4)), Some(9));
    }

    #[test]
    fn test_plain_insert_uses_rowid() {
        let sql = "  insert into accounts (name, email) values (?, ?)";
        assert_eq!(resolve_inserted_id(sql, 1, None, Some(4)), Some(4));
    }

    #[test]
    fn test_never_guesses() {
        let update = "UPDATE accounts SET name = ? WHERE id = ?";
        assert_eq!(resolve_inserted_id(update, 1, None, Some(4)), None);

        let multi = "INSERT INTO accounts (name, email) SELECT name, email FROM staging";
        assert_eq!(resolve_inserted_id(multi, 3, None, Some(4)), None);

        let ignored = "INSERT OR IGNORE INTO accounts (name, email) VALUES (?, ?)";
        assert_eq!(resolve_inserted_id(ignored, 0, None, Some(4)), None);

        let upsert = "INSERT INTO accounts (name, email) VALUES (?, ?) \
                      ON CONFLICT (email) DO UPDATE SET name = excluded.name";
        assert_eq!(resolve_inserted_id(upsert, 1, None, Some(4)), None);

        let plain = "INSERT INTO accounts (name, email) VALUES (?, ?)";
        assert_eq!(resolve_inserted_id(plain, 1, None, None), None);
    }
}
