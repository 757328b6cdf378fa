use std::env;

use crate::error::StoreError;
use crate::models::ValidationMode;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://playground.db";
pub const DEFAULT_SEED_COUNT: usize = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct StoreConfig {
    pub database_url: String,
    pub validation: ValidationMode,
    pub seed_count: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            validation: ValidationMode::Enforced,
            seed_count: DEFAULT_SEED_COUNT,
        }
    }
}

impl StoreConfig {
    pub fn new_from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL").unwrap_or(defaults.database_url);

        let validation = match lookup("COURSE_VALIDATION") {
            Some(raw) => raw.parse()?,
            None => defaults.validation,
        };

        let seed_count = match lookup("SEED_COUNT") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                StoreError::Config(format!("SEED_COUNT must be a non-negative integer, got `{}`", raw))
            })?,
            None => defaults.seed_count,
        };

        Ok(Self {
            database_url,
            validation,
            seed_count,
        })
    }
}
