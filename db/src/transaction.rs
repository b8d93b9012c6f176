//! Scoped transactions over the active engine.

use sqlx::{Postgres, Sqlite};

use crate::{embedded, networked};
use crate::{DbError, Row, StatementResult, Value};

/// A transaction holding one connection until it is committed, rolled back
/// or dropped (which rolls back).
///
/// Statements follow the same placeholder and result rules as
/// [`Statements`](crate::Statements).
pub struct Transaction {
    inner: Inner,
}

enum Inner {
    Embedded(sqlx::Transaction<'static, Sqlite>),
    Networked(sqlx::Transaction<'static, Postgres>),
}

impl Transaction {
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<StatementResult, DbError> {
        match &mut self.inner {
            Inner::Embedded(tx) => embedded::execute_on(&mut **tx, sql, params).await,
            Inner::Networked(tx) => networked::execute_on(&mut **tx, sql, params).await,
        }
    }

    pub async fn query_one(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>, DbError> {
        match &mut self.inner {
            Inner::Embedded(tx) => embedded::query_one_on(&mut **tx, sql, params).await,
            Inner::Networked(tx) => networked::query_one_on(&mut **tx, sql, params).await,
        }
    }

    pub async fn query_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        match &mut self.inner {
            Inner::Embedded(tx) => embedded::query_all_on(&mut **tx, sql, params).await,
            Inner::Networked(tx) => networked::query_all_on(&mut **tx, sql, params).await,
        }
    }

    pub async fn commit(self) -> Result<(), DbError> {
        match self.inner {
            Inner::Embedded(tx) => tx.commit().await?,
            Inner::Networked(tx) => tx.commit().await?,
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), DbError> {
        match self.inner {
            Inner::Embedded(tx) => tx.rollback().await?,
            Inner::Networked(tx) => tx.rollback().await?,
        }
        Ok(())
    }
}

impl From<sqlx::Transaction<'static, Sqlite>> for Transaction {
    fn from(tx: sqlx::Transaction<'static, Sqlite>) -> Self {
        Self {
            inner: Inner::Embedded(tx),
        }
    }
}

impl From<sqlx::Transaction<'static, Postgres>> for Transaction {
    fn from(tx: sqlx::Transaction<'static, Postgres>) -> Self {
        Self {
            inner: Inner::Networked(tx),
        }
    }
}
