//! SQLite engine.
//!
//! [`EmbeddedEngine`] wraps a `sqlx::SqlitePool` capped at one connection
//! that is never reaped, so every statement goes through the same serialized
//! handle to the file. The connection is configured with:
//! - **WAL mode** with `synchronous = NORMAL`.
//! - **Foreign keys enabled**: the schema relies on them for referential
//!   integrity between accounts and everything that references them.

use std::path::Path;
use std::str::FromStr;

use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Column, Either, Executor, Row as _, Sqlite, SqlitePool, TypeInfo, ValueRef};
use tokio_stream::StreamExt;

use crate::schema::SchemaStatement;
use crate::statement::{check_arity, resolve_inserted_id, returned_id};
use crate::{DbError, Row, StatementResult, Statements, Value};

/// Single-connection handle to an SQLite file.
#[derive(Clone)]
pub struct EmbeddedEngine {
    pool: SqlitePool,
}

impl EmbeddedEngine {
    /// Open (or create) the database file at `path`, creating parent
    /// directories as needed.
    pub async fn open(path: &Path) -> Result<Self, DbError> {
        Self::open_with(path, true).await
    }

    /// Like [`open`](Self::open) but with explicit foreign-key enforcement.
    pub(crate) async fn open_with(path: &Path, foreign_keys: bool) -> Result<Self, DbError> {
        if path.as_os_str().is_empty() {
            return Err(DbError::Configuration(
                "embedded database path is empty".to_string(),
            ));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(foreign_keys);

        let engine = Self::connect(options).await?;
        tracing::info!("Opened embedded database at {}", path.display());
        Ok(engine)
    }

    /// Private in-memory database; it lives as long as the handle.
    pub async fn open_in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(DbError::Connection)?
            .foreign_keys(true);

        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(DbError::Connection)?;

        Ok(Self { pool })
    }

    pub(crate) async fn begin(&self) -> Result<sqlx::Transaction<'static, Sqlite>, DbError> {
        Ok(self.pool.begin().await?)
    }

    /// Run the whole schema as one batched script inside a transaction.
    pub(crate) async fn apply_schema(&self, statements: &[SchemaStatement]) -> Result<(), DbError> {
        let mut script = statements
            .iter()
            .map(|s| s.sql.as_str())
            .collect::<Vec<_>>()
            .join(";\n");
        script.push(';');

        let mut tx = self.begin().await?;
        sqlx::raw_sql(&script)
            .execute(&mut *tx)
            .await
            .map_err(|source| DbError::SchemaInitialization {
                object: "schema script".to_string(),
                source,
            })?;
        tx.commit().await?;

        tracing::info!("Applied {} schema statements (embedded)", statements.len());
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Statements for EmbeddedEngine {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult, DbError> {
        execute_on(&self.pool, sql, params).await
    }

    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, DbError> {
        query_one_on(&self.pool, sql, params).await
    }

    async fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        query_all_on(&self.pool, sql, params).await
    }
}

pub(crate) async fn execute_on<'c, E>(
    executor: E,
    sql: &str,
    params: &[Value],
) -> Result<StatementResult, DbError>
where
    E: Executor<'c, Database = Sqlite>,
{
    check_arity(sql, params)?;

    let mut rows_affected = 0;
    let mut last_rowid = None;
    let mut returned = None;

    let mut results = executor.fetch_many(bind(sql, params));
    while let Some(item) = results.next().await {
        match item? {
            Either::Left(done) => {
                rows_affected += done.rows_affected();
                last_rowid = Some(done.last_insert_rowid());
            }
            Either::Right(row) => {
                if returned.is_none() {
                    returned = returned_id(&decode_row(&row)?);
                }
            }
        }
    }

    Ok(StatementResult {
        rows_affected,
        inserted_id: resolve_inserted_id(sql, rows_affected, returned, last_rowid),
    })
}

pub(crate) async fn query_one_on<'c, E>(
    executor: E,
    sql: &str,
    params: &[Value],
) -> Result<Option<Row>, DbError>
where
    E: Executor<'c, Database = Sqlite>,
{
    check_arity(sql, params)?;
    let row = executor.fetch_optional(bind(sql, params)).await?;
    row.as_ref().map(decode_row).transpose()
}

pub(crate) async fn query_all_on<'c, E>(
    executor: E,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Row>, DbError>
where
    E: Executor<'c, Database = Sqlite>,
{
    check_arity(sql, params)?;
    let rows = executor.fetch_all(bind(sql, params)).await?;
    rows.iter().map(decode_row).collect()
}

fn bind<'q>(sql: &'q str, params: &'q [Value]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Bytes(v) => query.bind(v.as_slice()),
        })
}

/// Decode by storage class. Integers in a column declared `BOOLEAN` become
/// [`Value::Bool`].
fn decode_row(row: &SqliteRow) -> Result<Row, DbError> {
    let mut out = Row::with_capacity(row.len());

    for column in row.columns() {
        let i = column.ordinal();
        let name = column.name();
        let raw = row.try_get_raw(i)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            let declared_bool = column.type_info().name() == "BOOLEAN";
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" if declared_bool => {
                    Value::Bool(row.try_get_unchecked::<i64, _>(i)? != 0)
                }
                "INTEGER" | "BOOLEAN" => Value::Int(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => Value::Float(row.try_get_unchecked::<f64, _>(i)?),
                "TEXT" | "DATE" | "TIME" | "DATETIME" => {
                    Value::Text(row.try_get_unchecked::<String, _>(i)?)
                }
                "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
                other => {
                    return Err(DbError::column(
                        name,
                        format!("unsupported SQLite storage class {other}"),
                    ))
                }
            }
        };

        out.push(name, value);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[tokio::test]
    async fn test_open_in_memory() {
        let engine = EmbeddedEngine::open_in_memory().await.unwrap();
        let row = engine.query_one("SELECT 1 AS one", &[]).await.unwrap().unwrap();
        assert_eq!(row.get("one"), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn test_open_file_based_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("app.sqlite");
        let engine = EmbeddedEngine::open(&db_path).await.unwrap();
        engine.query_one("SELECT 1", &[]).await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_open_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let result = EmbeddedEngine::open(&blocker.join("app.sqlite")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_open_empty_path_is_rejected() {
        let err = EmbeddedEngine::open(Path::new("")).await.err().unwrap();
        assert!(matches!(err, DbError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_decodes_storage_classes() {
        let engine = EmbeddedEngine::open_in_memory().await.unwrap();
        engine
            .execute(
                "CREATE TABLE cells (i INTEGER, r REAL, t TEXT, b BLOB, f BOOLEAN, n TEXT)",
                &[],
            )
            .await
            .unwrap();
        engine
            .execute(
                "INSERT INTO cells (i, r, t, b, f, n) VALUES (?, ?, ?, ?, ?, ?)",
                &params![42_i64, 1.5, "hola", vec![1_u8, 2, 3], true, None::<String>],
            )
            .await
            .unwrap();

        let row = engine
            .query_one("SELECT i, r, t, b, f, n FROM cells", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("i"), Some(&Value::Int(42)));
        assert_eq!(row.get("r"), Some(&Value::Float(1.5)));
        assert_eq!(row.get("t"), Some(&Value::Text("hola".to_string())));
        assert_eq!(row.get("b"), Some(&Value::Bytes(vec![1, 2, 3])));
        assert_eq!(row.get("f"), Some(&Value::Bool(true)));
        assert_eq!(row.get("n"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_update_reports_no_inserted_id() {
        let engine = EmbeddedEngine::open_in_memory().await.unwrap();
        engine
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT)", &[])
            .await
            .unwrap();
        let inserted = engine
            .execute("INSERT INTO t (v) VALUES (?)", &params!["a"])
            .await
            .unwrap();
        assert_eq!(inserted.inserted_id, Some(1));

        let updated = engine
            .execute("UPDATE t SET v = ? WHERE id = ?", &params!["b", 1_i64])
            .await
            .unwrap();
        assert_eq!(updated.rows_affected, 1);
        assert_eq!(updated.inserted_id, None);
    }

    #[tokio::test]
    async fn test_returning_id_on_embedded() {
        let engine = EmbeddedEngine::open_in_memory().await.unwrap();
        engine
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT)", &[])
            .await
            .unwrap();
        engine
            .execute("INSERT INTO t (v) VALUES (?)", &params!["a"])
            .await
            .unwrap();
        let result = engine
            .execute("INSERT INTO t (v) VALUES (?) RETURNING id", &params!["b"])
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.inserted_id, Some(2));
    }
}
