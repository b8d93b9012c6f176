//! Backend selection.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::config::{DbConfig, TlsPolicy};

/// Which storage engine is active for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// File-backed SQLite, one serialized connection.
    Embedded,
    /// PostgreSQL behind a bounded connection pool.
    Networked,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Embedded => "embedded",
            EngineKind::Networked => "networked",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved backend together with what is needed to connect to it.
#[derive(Debug, Clone)]
pub enum Backend {
    Embedded {
        path: PathBuf,
    },
    Networked {
        options: PgConnectOptions,
        pool_size: u32,
    },
}

impl Backend {
    /// Decide the backend from configuration.
    ///
    /// Networked when a `postgres://` / `postgresql://` descriptor is present
    /// and parses; embedded otherwise. A malformed descriptor is logged and
    /// ignored rather than producing a half-configured networked backend.
    pub fn select(config: &DbConfig) -> Self {
        let embedded = || Backend::Embedded {
            path: config.db_path.clone(),
        };

        let Some(url) = config.database_url.as_deref() else {
            return embedded();
        };

        if !has_postgres_scheme(url) {
            tracing::warn!("DATABASE_URL is not a postgres:// descriptor; using embedded database");
            return embedded();
        }

        match PgConnectOptions::from_str(url) {
            Ok(options) => Backend::Networked {
                options: apply_tls(options, config.tls),
                pool_size: config.pool_size.max(1),
            },
            Err(e) => {
                tracing::warn!("Malformed DATABASE_URL ({}); using embedded database", e);
                embedded()
            }
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            Backend::Embedded { .. } => EngineKind::Embedded,
            Backend::Networked { .. } => EngineKind::Networked,
        }
    }
}

fn has_postgres_scheme(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("postgres://") || lower.starts_with("postgresql://")
}

fn apply_tls(options: PgConnectOptions, policy: TlsPolicy) -> PgConnectOptions {
    match policy {
        TlsPolicy::FromDescriptor => options,
        TlsPolicy::Verify => options.ssl_mode(PgSslMode::VerifyFull),
        TlsPolicy::Permissive => {
            tracing::warn!(
                "DATABASE_TLS=permissive: connection is encrypted but the server certificate is not validated"
            );
            options.ssl_mode(PgSslMode::Require)
        }
        TlsPolicy::Disable => options.ssl_mode(PgSslMode::Disable),
    }
}
