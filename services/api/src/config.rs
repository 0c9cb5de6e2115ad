//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use nutrition_core::credentials::NUMBERED_SLOTS;
use nutrition_core::domain::DEFAULT_DAILY_TOKEN_BUDGET;
use nutrition_core::gateway::DEFAULT_MODEL;
use nutrition_core::EnvCredentials;
use std::net::SocketAddr;
use tracing::Level;
use uuid::Uuid;

/// Gemini's OpenAI-compatible endpoint.
pub const DEFAULT_AI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Owner of the settings document (credentials, budget, caches).
    pub settings_user_id: Uuid,
    pub ai_api_base: String,
    pub default_model: String,
    pub daily_token_budget: u64,
    pub credentials: EnvCredentials,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Load Server and Database Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            var("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let settings_user_id = match var("SETTINGS_USER_ID") {
            Some(raw) => Uuid::parse_str(raw.trim()).map_err(|e| {
                ConfigError::InvalidValue("SETTINGS_USER_ID".to_string(), e.to_string())
            })?,
            None => Uuid::nil(),
        };

        // --- Load AI Backend Settings ---
        let ai_api_base = var("AI_API_BASE").unwrap_or_else(|| DEFAULT_AI_API_BASE.to_string());
        let default_model = var("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let daily_token_budget = match var("DAILY_TOKEN_BUDGET") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("DAILY_TOKEN_BUDGET".to_string(), e.to_string())
            })?,
            None => DEFAULT_DAILY_TOKEN_BUDGET,
        };

        // --- Load API Keys (as optional) ---
        let credentials = EnvCredentials {
            numbered: (1..=NUMBERED_SLOTS)
                .map(|n| var(&format!("GEMINI_API_KEY_{}", n)))
                .collect(),
            combined: var("GEMINI_API_KEYS"),
            single: var("GEMINI_API_KEY"),
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            settings_user_id,
            ai_api_base,
            default_model,
            daily_token_budget,
            credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_database_is_set() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/food")]))
            .unwrap();

        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.settings_user_id, Uuid::nil());
        assert_eq!(config.ai_api_base, DEFAULT_AI_API_BASE);
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.daily_token_budget, DEFAULT_DAILY_TOKEN_BUDGET);
        assert!(config.credentials.resolve().is_empty());
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert_matches!(err, ConfigError::MissingVar(var) if var == "DATABASE_URL");
    }

    #[test]
    fn credential_slots_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/food"),
            ("GEMINI_API_KEY_1", "k1"),
            ("GEMINI_API_KEY_3", "k3"),
            ("GEMINI_API_KEY", "single"),
        ]))
        .unwrap();

        assert_eq!(config.credentials.numbered.len(), NUMBERED_SLOTS);
        let secrets: Vec<String> = config
            .credentials
            .resolve()
            .into_iter()
            .map(|(_, secret)| secret)
            .collect();
        // The legacy single slot is ignored once a numbered slot is set.
        assert_eq!(secrets, vec!["k1", "k3"]);
    }

    #[test]
    fn invalid_budget_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/food"),
            ("DAILY_TOKEN_BUDGET", "lots"),
        ]))
        .unwrap_err();
        assert_matches!(err, ConfigError::InvalidValue(var, _) if var == "DAILY_TOKEN_BUDGET");
    }
}
