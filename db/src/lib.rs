//! Dual-backend persistence gateway.
//!
//! One statement API over two engines, chosen once at startup:
//!
//! | Engine | Driver | Placeholders | New row id | Booleans |
//! |--------|--------|--------------|------------|----------|
//! | [`EngineKind::Embedded`] | `sqlx` SQLite, one connection | `?` | `RETURNING id` or last rowid | stored 0/1, read back as [`Value::Bool`] |
//! | [`EngineKind::Networked`] | `sqlx` PostgreSQL pool | `$n` (rewritten from `?`) | `RETURNING id` | native |
//!
//! ## Lifecycle
//!
//! 1. [`DbConfig::from_env`] reads the configuration.
//! 2. [`Database::open`] selects the backend ([`Backend::select`]) and
//!    connects. SQLite files are created on demand with foreign keys enabled.
//! 3. [`Database::initialize`] applies [`schema::PORTAL_SCHEMA`], rendered for
//!    the active engine, inside one transaction.
//! 4. Callers clone the handle and use the [`Statements`] operations
//!    (`execute`, `query_one`, `query_all`) or a scoped [`Transaction`].
//!
//! Failures in steps 2 and 3 are fatal for the process. Statement failures
//! are returned as [`DbError::QueryFailed`] and never retried.

mod config;
mod database;
mod embedded;
mod engine;
mod error;
mod networked;
pub mod placeholder;
pub mod schema;
mod statement;
mod transaction;
mod value;

pub use config::{default_db_path, DbConfig, TlsPolicy};
pub use database::Database;
pub use embedded::EmbeddedEngine;
pub use engine::{Backend, EngineKind};
pub use error::DbError;
pub use networked::NetworkedEngine;
pub use statement::{StatementResult, Statements};
pub use transaction::Transaction;
pub use value::{FromValue, Row, Value};
