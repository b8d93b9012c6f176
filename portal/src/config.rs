//! Runtime configuration for the portal CLI.
//!
//! Database settings live in [`db::DbConfig::from_env`]. The values here
//! only drive `seed-admin`, and each can also be passed as a flag.

/// Default email of the seeded admin account.
const DEFAULT_SEED_ADMIN_EMAIL: &str = "admin@portal.local";

/// Default display name of the seeded admin account.
const DEFAULT_SEED_ADMIN_NAME: &str = "Administrator";

/// Seed admin settings.
///
/// Priority for each value:
/// 1. `SEED_ADMIN_*` env variable if set and not blank
/// 2. the built-in default (`admin@portal.local`, `Administrator`, no credential)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAdminConfig {
    /// `SEED_ADMIN_EMAIL`
    pub email: String,
    /// `SEED_ADMIN_NAME`
    pub name: String,
    /// `SEED_ADMIN_PASSWORD`, hashed before it is stored.
    pub password: Option<String>,
    /// `SEED_ADMIN_PASSWORD_HASH`, stored as is.
    pub password_hash: Option<String>,
}

impl SeedAdminConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            email: var("SEED_ADMIN_EMAIL")
                .unwrap_or_else(|| DEFAULT_SEED_ADMIN_EMAIL.to_string()),
            name: var("SEED_ADMIN_NAME")
                .unwrap_or_else(|| DEFAULT_SEED_ADMIN_NAME.to_string()),
            password: var("SEED_ADMIN_PASSWORD"),
            password_hash: var("SEED_ADMIN_PASSWORD_HASH"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_seed_admin_defaults() {
        let config = SeedAdminConfig::from_lookup(lookup(&[]));
        assert_eq!(config.email, "admin@portal.local");
        assert_eq!(config.name, "Administrator");
        assert_eq!(config.password, None);
        assert_eq!(config.password_hash, None);
    }

    #[test]
    fn test_seed_admin_env_overrides() {
        let config = SeedAdminConfig::from_lookup(lookup(&[
            ("SEED_ADMIN_EMAIL", "ops@school.edu"),
            ("SEED_ADMIN_NAME", "Ops"),
            ("SEED_ADMIN_PASSWORD", "changeme1"),
            ("SEED_ADMIN_PASSWORD_HASH", "$2b$12$abc"),
        ]));
        assert_eq!(config.email, "ops@school.edu");
        assert_eq!(config.name, "Ops");
        assert_eq!(config.password.as_deref(), Some("changeme1"));
        assert_eq!(config.password_hash.as_deref(), Some("$2b$12$abc"));
    }

    #[test]
    fn test_blank_values_fall_back() {
        let config = SeedAdminConfig::from_lookup(lookup(&[
            ("SEED_ADMIN_EMAIL", "  "),
            ("SEED_ADMIN_NAME", ""),
            ("SEED_ADMIN_PASSWORD", " "),
            ("SEED_ADMIN_PASSWORD_HASH", "\t"),
        ]));
        assert_eq!(config, SeedAdminConfig::from_lookup(lookup(&[])));
    }
}
