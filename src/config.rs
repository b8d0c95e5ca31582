//! Configuration loaded once per cold start from environment variables

use crate::error::{Result, ServiceError};
use std::time::Duration;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 25;
const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_PRODUCTS_COLLECTION: &str = "products";

/// Seconds of work allowed per enrichment invocation, below the 60s platform ceiling
const DEFAULT_TIME_BUDGET_SECS: u64 = 50;

/// Completion API settings
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Bearer key; when absent the context endpoint degrades and enrichment refuses to run
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Firestore REST settings
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub project_id: String,
    pub base_url: String,
    /// OAuth access token; not needed against the emulator
    pub access_token: Option<String>,
    pub collection: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub completion: CompletionConfig,
    /// Only present when `FIRESTORE_PROJECT_ID` is set
    pub store: Option<StoreConfig>,
    pub time_budget: Duration,
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, treating blank values as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let completion = CompletionConfig {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            timeout: Duration::from_secs(parse_secs(
                "COMPLETION_TIMEOUT_SECS",
                get("COMPLETION_TIMEOUT_SECS"),
                DEFAULT_COMPLETION_TIMEOUT_SECS,
            )?),
        };

        let store = get("FIRESTORE_PROJECT_ID").map(|project_id| StoreConfig {
            project_id,
            base_url: get("FIRESTORE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_FIRESTORE_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            access_token: get("FIRESTORE_ACCESS_TOKEN"),
            collection: get("PRODUCTS_COLLECTION")
                .unwrap_or_else(|| DEFAULT_PRODUCTS_COLLECTION.to_string()),
        });

        let time_budget = Duration::from_secs(parse_secs(
            "ENRICH_TIME_BUDGET_SECS",
            get("ENRICH_TIME_BUDGET_SECS"),
            DEFAULT_TIME_BUDGET_SECS,
        )?);

        Ok(Self {
            completion,
            store,
            time_budget,
        })
    }

    /// Store settings, required by the enrichment binary.
    pub fn require_store(&self) -> Result<&StoreConfig> {
        self.store
            .as_ref()
            .ok_or_else(|| ServiceError::Config("FIRESTORE_PROJECT_ID is not set".to_string()))
    }
}

fn parse_secs(key: &str, raw: Option<String>, default: u64) -> Result<u64> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            ServiceError::Config(format!(
                "{} must be a whole number of seconds, got {:?}",
                key, raw
            ))
        }),
    }
}
