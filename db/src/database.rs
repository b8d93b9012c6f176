//! The process-wide database handle.

use crate::embedded::EmbeddedEngine;
use crate::engine::{Backend, EngineKind};
use crate::networked::NetworkedEngine;
use crate::schema::{Schema, SchemaStatement, PORTAL_SCHEMA};
use crate::transaction::Transaction;
use crate::{DbConfig, DbError, Row, StatementResult, Statements, Value};

/// Handle to whichever engine was selected at startup.
///
/// Open it once, [`initialize`](Self::initialize) it once, then clone it
/// into every consumer. Clones share the same pool.
#[derive(Clone)]
pub struct Database {
    engine: Engine,
}

#[derive(Clone)]
enum Engine {
    Embedded(EmbeddedEngine),
    Networked(NetworkedEngine),
}

impl Database {
    /// Select the backend from `config` and connect to it.
    pub async fn open(config: &DbConfig) -> Result<Self, DbError> {
        let backend = Backend::select(config);
        tracing::info!("Using {} database engine", backend.kind());
        Self::connect(backend).await
    }

    /// Connect to an already selected backend.
    pub async fn connect(backend: Backend) -> Result<Self, DbError> {
        match backend {
            Backend::Embedded { path } => EmbeddedEngine::open(&path).await.map(Self::from),
            Backend::Networked { options, pool_size } => {
                NetworkedEngine::connect(options, pool_size)
                    .await
                    .map(Self::from)
            }
        }
    }

    /// Embedded in-memory database, for tests and throwaway tooling.
    pub async fn open_in_memory() -> Result<Self, DbError> {
        EmbeddedEngine::open_in_memory().await.map(Self::from)
    }

    pub fn engine(&self) -> EngineKind {
        match &self.engine {
            Engine::Embedded(_) => EngineKind::Embedded,
            Engine::Networked(_) => EngineKind::Networked,
        }
    }

    /// Create the portal schema. Safe to call on an initialized store.
    pub async fn initialize(&self) -> Result<(), DbError> {
        self.apply_schema(&PORTAL_SCHEMA).await
    }

    /// Render `schema` for the active engine and apply it atomically.
    pub async fn apply_schema(&self, schema: &Schema) -> Result<(), DbError> {
        let statements = schema.render(self.engine())?;
        self.apply_statements(&statements).await
    }

    pub(crate) async fn apply_statements(
        &self,
        statements: &[SchemaStatement],
    ) -> Result<(), DbError> {
        match &self.engine {
            Engine::Embedded(engine) => engine.apply_schema(statements).await,
            Engine::Networked(engine) => engine.apply_schema(statements).await,
        }
    }

    /// Start a scoped transaction on one pooled connection.
    ///
    /// Dropping the transaction without [`Transaction::commit`] rolls it back.
    /// On the embedded engine the single connection is held until then, so
    /// other callers wait.
    pub async fn begin(&self) -> Result<Transaction, DbError> {
        match &self.engine {
            Engine::Embedded(engine) => engine.begin().await.map(Transaction::from),
            Engine::Networked(engine) => engine.begin().await.map(Transaction::from),
        }
    }

    /// Close the pool. Pending statements finish; new ones fail.
    pub async fn close(&self) {
        match &self.engine {
            Engine::Embedded(engine) => engine.close().await,
            Engine::Networked(engine) => engine.close().await,
        }
    }
}

impl From<EmbeddedEngine> for Database {
    fn from(engine: EmbeddedEngine) -> Self {
        Self {
            engine: Engine::Embedded(engine),
        }
    }
}

impl From<NetworkedEngine> for Database {
    fn from(engine: NetworkedEngine) -> Self {
        Self {
            engine: Engine::Networked(engine),
        }
    }
}

impl Statements for Database {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult, DbError> {
        match &self.engine {
            Engine::Embedded(engine) => engine.execute(sql, params).await,
            Engine::Networked(engine) => engine.execute(sql, params).await,
        }
    }

    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, DbError> {
        match &self.engine {
            Engine::Embedded(engine) => engine.query_one(sql, params).await,
            Engine::Networked(engine) => engine.query_one(sql, params).await,
        }
    }

    async fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        match &self.engine {
            Engine::Embedded(engine) => engine.query_all(sql, params).await,
            Engine::Networked(engine) => engine.query_all(sql, params).await,
        }
    }
}
