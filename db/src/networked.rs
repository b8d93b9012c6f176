//! PostgreSQL engine.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgConnection, PgPoolOptions, PgRow,
    PgTypeInfo,
};
use sqlx::query::Query;
use sqlx::{
    Column, Either, Encode, Executor, PgPool, Postgres, Row as _, Statement as _, Type, TypeInfo,
    ValueRef,
};
use tokio_stream::StreamExt;

use crate::placeholder;
use crate::schema::SchemaStatement;
use crate::statement::{check_arity, resolve_inserted_id, returned_id};
use crate::{DbError, Row, StatementResult, Statements, Value};

/// Text form shared with SQLite's `CURRENT_TIMESTAMP`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Timestamp layouts accepted from text parameters, after RFC 3339.
const TIMESTAMP_INPUT_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Pooled handle to a PostgreSQL server.
///
/// Acquisition waits when every pooled connection is busy.
#[derive(Clone)]
pub struct NetworkedEngine {
    pool: PgPool,
}

impl NetworkedEngine {
    /// Build the pool and establish the first connection.
    ///
    /// Sessions are pinned to UTC so `CURRENT_TIMESTAMP` defaults match the
    /// embedded engine regardless of the server's configured zone.
    pub async fn connect(options: PgConnectOptions, pool_size: u32) -> Result<Self, DbError> {
        let host = options.get_host().to_string();
        let options = with_utc_session(options);
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect_with(options)
            .await
            .map_err(DbError::Connection)?;

        tracing::info!(
            "Connected to networked database at {} (pool size {})",
            host,
            pool_size
        );
        Ok(Self { pool })
    }

    pub(crate) async fn begin(&self) -> Result<sqlx::Transaction<'static, Postgres>, DbError> {
        Ok(self.pool.begin().await?)
    }

    /// Run schema statements one round-trip at a time inside a transaction,
    /// stopping at the first failure.
    pub(crate) async fn apply_schema(&self, statements: &[SchemaStatement]) -> Result<(), DbError> {
        let mut tx = self.begin().await?;
        for statement in statements {
            sqlx::raw_sql(&statement.sql)
                .execute(&mut *tx)
                .await
                .map_err(|source| DbError::SchemaInitialization {
                    object: statement.object.clone(),
                    source,
                })?;
        }
        tx.commit().await?;

        tracing::info!("Applied {} schema statements (networked)", statements.len());
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Statements for NetworkedEngine {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult, DbError> {
        let mut conn = self.pool.acquire().await?;
        execute_on(&mut conn, sql, params).await
    }

    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, DbError> {
        let mut conn = self.pool.acquire().await?;
        query_one_on(&mut conn, sql, params).await
    }

    async fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let mut conn = self.pool.acquire().await?;
        query_all_on(&mut conn, sql, params).await
    }
}

pub(crate) fn with_utc_session(options: PgConnectOptions) -> PgConnectOptions {
    options.options([("timezone", "UTC")])
}

pub(crate) async fn execute_on(
    conn: &mut PgConnection,
    sql: &str,
    params: &[Value],
) -> Result<StatementResult, DbError> {
    check_arity(sql, params)?;
    let numbered = placeholder::to_numbered(sql);
    let query = bind(conn, &numbered, params).await?;

    let mut rows_affected = 0;
    let mut returned = None;

    let mut results = conn.fetch_many(query);
    while let Some(item) = results.next().await {
        match item? {
            Either::Left(done) => rows_affected += done.rows_affected(),
            Either::Right(row) => {
                if returned.is_none() {
                    returned = returned_id(&decode_row(&row)?);
                }
            }
        }
    }

    Ok(StatementResult {
        rows_affected,
        inserted_id: resolve_inserted_id(sql, rows_affected, returned, None),
    })
}

pub(crate) async fn query_one_on(
    conn: &mut PgConnection,
    sql: &str,
    params: &[Value],
) -> Result<Option<Row>, DbError> {
    check_arity(sql, params)?;
    let numbered = placeholder::to_numbered(sql);
    let query = bind(conn, &numbered, params).await?;
    let row = conn.fetch_optional(query).await?;
    row.as_ref().map(decode_row).transpose()
}

pub(crate) async fn query_all_on(
    conn: &mut PgConnection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Row>, DbError> {
    check_arity(sql, params)?;
    let numbered = placeholder::to_numbered(sql);
    let query = bind(conn, &numbered, params).await?;
    let rows = conn.fetch_all(query).await?;
    rows.iter().map(decode_row).collect()
}

/// Prepare `sql` and encode each parameter for the type the server resolved.
///
/// Text and NULL go out undeclared so the server infers them from context,
/// the same way SQLite accepts a text timestamp or a NULL anywhere. Postgres
/// parameters travel in binary form, so the value is then converted to the
/// inferred type. The prepared statement is cached on the connection and
/// reused by the execution that follows.
async fn bind<'q>(
    conn: &mut PgConnection,
    sql: &'q str,
    params: &'q [Value],
) -> Result<Query<'q, Postgres, PgArguments>, DbError> {
    let declared: Vec<PgTypeInfo> = params.iter().map(declared_type).collect();
    let statement = (&mut *conn).prepare_with(sql, &declared).await?;
    let resolved = match statement.parameters() {
        Some(Either::Left(types)) => types.to_vec(),
        _ => return Err(DbError::query("server did not describe statement parameters")),
    };

    params
        .iter()
        .zip(&resolved)
        .enumerate()
        .try_fold(sqlx::query(sql), |query, (i, (value, ty))| {
            bind_as(query, value, ty)
                .map_err(|reason| DbError::query(format!("parameter ${}: {reason}", i + 1)))
        })
}

fn declared_type(value: &Value) -> PgTypeInfo {
    match value {
        Value::Null | Value::Text(_) => PgTypeInfo::with_oid(Oid(0)),
        Value::Bool(_) => <bool as Type<Postgres>>::type_info(),
        Value::Int(_) => <i64 as Type<Postgres>>::type_info(),
        Value::Float(_) => <f64 as Type<Postgres>>::type_info(),
        Value::Bytes(_) => <Vec<u8> as Type<Postgres>>::type_info(),
    }
}

fn bind_as<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
    ty: &PgTypeInfo,
) -> Result<Query<'q, Postgres, PgArguments>, String> {
    let out_of_range = |v: i64| format!("{v} does not fit in {}", ty.name());

    let query = match (ty.name(), value) {
        (_, Value::Null) => query.bind(TypedNull(ty.clone())),
        ("BOOL", Value::Bool(v)) => query.bind(*v),
        ("BOOL", Value::Int(v)) => query.bind(*v != 0),
        ("INT2", Value::Int(v)) => query.bind(i16::try_from(*v).map_err(|_| out_of_range(*v))?),
        ("INT4", Value::Int(v)) => query.bind(i32::try_from(*v).map_err(|_| out_of_range(*v))?),
        ("INT8", Value::Int(v)) => query.bind(*v),
        ("FLOAT4", Value::Float(v)) => query.bind(*v as f32),
        ("FLOAT4", Value::Int(v)) => query.bind(*v as f32),
        ("FLOAT8", Value::Float(v)) => query.bind(*v),
        ("FLOAT8", Value::Int(v)) => query.bind(*v as f64),
        ("TEXT" | "VARCHAR" | "BPCHAR" | "NAME", Value::Text(v)) => query.bind(v.as_str()),
        ("TIMESTAMP", Value::Text(v)) => query.bind(parse_timestamp(v)?),
        ("TIMESTAMPTZ", Value::Text(v)) => query.bind(parse_timestamp(v)?.and_utc()),
        ("DATE", Value::Text(v)) => query.bind(
            NaiveDate::parse_from_str(v.trim(), DATE_FORMAT)
                .map_err(|e| format!("'{v}' is not a date: {e}"))?,
        ),
        ("BYTEA", Value::Bytes(v)) => query.bind(v.as_slice()),
        (name, value) => return Err(format!("cannot send {} as {name}", value.kind())),
    };
    Ok(query)
}

/// Parse a text timestamp; offsets are normalized to UTC, naive values are taken as UTC.
fn parse_timestamp(text: &str) -> Result<NaiveDateTime, String> {
    let text = text.trim();
    if let Ok(zoned) = DateTime::parse_from_rfc3339(text) {
        return Ok(zoned.naive_utc());
    }
    TIMESTAMP_INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .ok_or_else(|| format!("'{text}' is not a timestamp"))
}

/// SQL NULL typed as whatever the server resolved for its parameter.
struct TypedNull(PgTypeInfo);

impl Type<Postgres> for TypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for TypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.0.clone())
    }
}

fn decode_row(row: &PgRow) -> Result<Row, DbError> {
    let mut out = Row::with_capacity(row.len());

    for column in row.columns() {
        let i = column.ordinal();
        let name = column.name();
        let raw = row.try_get_raw(i)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "BOOL" => Value::Bool(row.try_get::<bool, _>(i)?),
                "INT2" => Value::Int(row.try_get::<i16, _>(i)? as i64),
                "INT4" => Value::Int(row.try_get::<i32, _>(i)? as i64),
                "INT8" => Value::Int(row.try_get::<i64, _>(i)?),
                "FLOAT4" => Value::Float(row.try_get::<f32, _>(i)? as f64),
                "FLOAT8" => Value::Float(row.try_get::<f64, _>(i)?),
                "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                    Value::Text(row.try_get::<String, _>(i)?)
                }
                "TIMESTAMP" => Value::Text(
                    row.try_get::<NaiveDateTime, _>(i)?
                        .format(TIMESTAMP_FORMAT)
                        .to_string(),
                ),
                "TIMESTAMPTZ" => Value::Text(
                    row.try_get::<DateTime<Utc>, _>(i)?
                        .format(TIMESTAMP_FORMAT)
                        .to_string(),
                ),
                "DATE" => Value::Text(
                    row.try_get::<NaiveDate, _>(i)?
                        .format(DATE_FORMAT)
                        .to_string(),
                ),
                "JSON" | "JSONB" => {
                    Value::Text(row.try_get::<serde_json::Value, _>(i)?.to_string())
                }
                "BYTEA" => Value::Bytes(row.try_get::<Vec<u8>, _>(i)?),
                other => {
                    return Err(DbError::column(
                        name,
                        format!("unsupported PostgreSQL type {other}"),
                    ))
                }
            }
        };

        out.push(name, value);
    }

    Ok(out)
}
