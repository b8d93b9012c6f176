//! Gateway configuration.
//!
//! Every value has a compile-time default and can be overridden at runtime via
//! a dedicated environment variable. The environment is read once, by
//! [`DbConfig::from_env`]; everything downstream receives the resulting value.

use std::path::PathBuf;

/// Default networked pool size.
const DEFAULT_POOL_SIZE: u32 = 10;

/// Embedded database file, relative to the `db` crate directory.
const DEFAULT_DB_FILE: &str = "data/app.sqlite";

/// Transport security policy for the networked engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    /// Keep whatever `sslmode` the connection descriptor carries.
    #[default]
    FromDescriptor,
    /// Require TLS and validate the certificate chain and host name.
    Verify,
    /// Require TLS but accept any certificate.
    ///
    /// Managed cloud databases often present self-signed or provider-signed
    /// certificates. This is an explicit trust relaxation: traffic is
    /// encrypted but the server is not authenticated.
    Permissive,
    /// Plain TCP.
    Disable,
}

impl TlsPolicy {
    /// Parse a `DATABASE_TLS` value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "verify" | "verify-full" => Some(TlsPolicy::Verify),
            "permissive" | "require" => Some(TlsPolicy::Permissive),
            "disable" | "off" => Some(TlsPolicy::Disable),
            "" | "descriptor" => Some(TlsPolicy::FromDescriptor),
            _ => None,
        }
    }
}

/// Everything the gateway needs to pick and open a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    /// Networked connection descriptor; its presence selects the networked engine.
    pub database_url: Option<String>,
    /// Embedded database file.
    pub db_path: PathBuf,
    /// Upper bound of pooled networked connections.
    pub pool_size: u32,
    pub tls: TlsPolicy,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_path: default_db_path(),
            pool_size: DEFAULT_POOL_SIZE,
            tls: TlsPolicy::default(),
        }
    }
}

impl DbConfig {
    /// Embedded configuration for the file at `path`.
    pub fn embedded(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: path.into(),
            ..Self::default()
        }
    }

    /// Networked configuration for `url`.
    pub fn networked(url: impl Into<String>) -> Self {
        Self {
            database_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Read the configuration from the environment.
    ///
    /// - `DATABASE_URL`: networked descriptor
    /// - `DB_PATH`: embedded file, defaults to `<db crate>/data/app.sqlite`
    /// - `DB_POOL_SIZE`: networked pool size, falls back to 10 when unparsable
    /// - `DATABASE_TLS`: `verify`, `permissive` or `disable`
    ///
    /// Blank values count as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let db_path = var("DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        let pool_size = var("DB_POOL_SIZE")
            .and_then(|v| v.trim().parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_POOL_SIZE);

        let tls = match var("DATABASE_TLS") {
            Some(value) => TlsPolicy::parse(&value).unwrap_or_else(|| {
                tracing::warn!("Ignoring unknown DATABASE_TLS value {:?}", value);
                TlsPolicy::default()
            }),
            None => TlsPolicy::default(),
        };

        Self {
            database_url: var("DATABASE_URL"),
            db_path,
            pool_size,
            tls,
        }
    }
}

/// Default embedded database file, under the `db` crate directory.
pub fn default_db_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_DB_FILE)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_db_path() {
        let path = default_db_path();
        assert!(path.ends_with("db/data/app.sqlite"));
    }

    #[test]
    fn test_tls_policy_parse() {
        assert_eq!(TlsPolicy::parse("verify"), Some(TlsPolicy::Verify));
        assert_eq!(
            TlsPolicy::parse(" Permissive "),
            Some(TlsPolicy::Permissive)
        );
        assert_eq!(TlsPolicy::parse("disable"), Some(TlsPolicy::Disable));
        assert_eq!(TlsPolicy::parse(""), Some(TlsPolicy::FromDescriptor));
        assert_eq!(TlsPolicy::parse("sometimes"), None);
    }

    #[test]
    fn test_constructors() {
        let embedded = DbConfig::embedded("/tmp/x.sqlite");
        assert_eq!(embedded.database_url, None);
        assert_eq!(embedded.db_path, PathBuf::from("/tmp/x.sqlite"));

        let networked = DbConfig::networked("postgres://localhost/portal");
        assert_eq!(
            networked.database_url.as_deref(),
            Some("postgres://localhost/portal")
        );
        assert_eq!(networked.pool_size, DEFAULT_POOL_SIZE);
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        assert_eq!(DbConfig::from_lookup(lookup(&[])), DbConfig::default());
    }

    #[test]
    fn test_from_lookup_reads_every_variable() {
        let config = DbConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db.internal/portal"),
            ("DB_PATH", "/var/lib/portal/app.sqlite"),
            ("DB_POOL_SIZE", " 4 "),
            ("DATABASE_TLS", "verify"),
        ]));
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://db.internal/portal")
        );
        assert_eq!(config.db_path, PathBuf::from("/var/lib/portal/app.sqlite"));
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.tls, TlsPolicy::Verify);
    }

    #[test]
    fn test_from_lookup_blank_values_are_unset() {
        let config = DbConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "  "),
            ("DB_PATH", ""),
            ("DB_POOL_SIZE", ""),
            ("DATABASE_TLS", " "),
        ]));
        assert_eq!(config, DbConfig::default());
        assert_eq!(config.db_path, default_db_path());
    }

    #[test]
    fn test_from_lookup_invalid_values_fall_back() {
        for pool_size in ["0", "-3", "ten"] {
            let config = DbConfig::from_lookup(lookup(&[
                ("DB_POOL_SIZE", pool_size),
                ("DATABASE_TLS", "sometimes"),
            ]));
            assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
            assert_eq!(config.tls, TlsPolicy::FromDescriptor);
        }
    }
}
