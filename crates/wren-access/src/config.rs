use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

const ENV_PREFIX: &str = "WREN_ACCESS_";

/// Runtime settings for the access core.
///
/// Every field has a default so an empty environment yields a usable
/// configuration backed by an in-memory SQLite database.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub sqlx_logging: bool,

    /// Absolute lifetime of a login session.
    pub session_ttl_secs: i64,
    /// Lifetime of an organization invitation.
    pub invitation_ttl_secs: i64,

    /// PBKDF2 rounds for newly hashed passwords.
    pub password_iterations: u32,

    /// Number of random-body characters kept in clear after the scope tag.
    pub api_key_prefix_len: usize,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            connect_timeout_secs: 5,
            sqlx_logging: false,
            session_ttl_secs: 7 * 24 * 60 * 60,
            invitation_ttl_secs: 7 * 24 * 60 * 60,
            password_iterations: 600_000,
            api_key_prefix_len: 8,
        }
    }
}

impl AccessConfig {
    /// Load from `WREN_ACCESS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Keys are the full variable names,
    /// e.g. `WREN_ACCESS_DATABASE_URL`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(normalize_env_value)
                .filter(|s| !s.is_empty())
        };

        let mut cfg = Self::default();
        if let Some(v) = get("DATABASE_URL") {
            cfg.database_url = v;
        }
        if let Some(v) = get("MAX_CONNECTIONS") {
            cfg.max_connections = parse_setting("MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = get("CONNECT_TIMEOUT_SECS") {
            cfg.connect_timeout_secs = parse_setting("CONNECT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("SQLX_LOGGING") {
            cfg.sqlx_logging = parse_flag(&v);
        }
        if let Some(v) = get("SESSION_TTL_SECS") {
            cfg.session_ttl_secs = parse_setting("SESSION_TTL_SECS", &v)?;
        }
        if let Some(v) = get("INVITATION_TTL_SECS") {
            cfg.invitation_ttl_secs = parse_setting("INVITATION_TTL_SECS", &v)?;
        }
        if let Some(v) = get("PASSWORD_ITERATIONS") {
            cfg.password_iterations = parse_setting("PASSWORD_ITERATIONS", &v)?;
        }
        if let Some(v) = get("API_KEY_PREFIX_LEN") {
            cfg.api_key_prefix_len = parse_setting("API_KEY_PREFIX_LEN", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_secs <= 0 {
            return Err(Error::Validation("session ttl must be positive".into()));
        }
        if self.invitation_ttl_secs <= 0 {
            return Err(Error::Validation("invitation ttl must be positive".into()));
        }
        if self.password_iterations == 0 {
            return Err(Error::Validation("password iterations must be non-zero".into()));
        }
        // The body is 64 hex characters; the prefix must leave most of it secret.
        if self.api_key_prefix_len == 0 || self.api_key_prefix_len > 16 {
            return Err(Error::Validation(
                "api key prefix length must be between 1 and 16".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Strip surrounding whitespace and one layer of matching quotes.
pub fn normalize_env_value(raw: String) -> String {
    let trimmed = raw.trim();

    if let Some(inner) = trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return inner.trim().to_string();
    }

    trimmed.to_string()
}

fn parse_setting<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Validation(format!("{ENV_PREFIX}{name} has an invalid value")))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn strips_quotes_and_whitespace() {
        assert_eq!(normalize_env_value("  \"abc\" ".into()), "abc");
        assert_eq!(normalize_env_value("'x y'".into()), "x y");
        assert_eq!(normalize_env_value("plain".into()), "plain");
    }

    #[test]
    fn reads_prefixed_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("WREN_ACCESS_DATABASE_URL", "\"sqlite://access.db?mode=rwc\""),
            ("WREN_ACCESS_SESSION_TTL_SECS", "3600"),
            ("WREN_ACCESS_SQLX_LOGGING", "on"),
            ("WREN_ACCESS_API_KEY_PREFIX_LEN", ""),
        ]);
        let cfg = AccessConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.database_url, "sqlite://access.db?mode=rwc");
        assert_eq!(cfg.session_ttl_secs, 3600);
        assert!(cfg.sqlx_logging);
        // Empty values fall back to the default.
        assert_eq!(cfg.api_key_prefix_len, 8);
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = AccessConfig::from_lookup(|k| {
            (k == "WREN_ACCESS_PASSWORD_ITERATIONS").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_oversized_prefix() {
        let cfg = AccessConfig {
            api_key_prefix_len: 40,
            ..AccessConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
