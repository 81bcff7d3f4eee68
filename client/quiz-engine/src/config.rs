use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::services::session_service::SessionSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiSettings,
    pub session: SessionConfig,
    pub candidate_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub request_timeout_secs: u64,
    /// Attempts for idempotent GETs. The result POST is always sent once.
    pub fetch_attempts: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub tick_interval_ms: u64,
    pub check_prior_attempt: bool,
    pub shuffle_seed: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml first, then QUIZ__* environment overrides
        let settings = config::Config::builder()
            .set_default("api.base_url", "http://localhost:8080/api")?
            .set_default("api.request_timeout_secs", 10)?
            .set_default("api.fetch_attempts", 3)?
            .set_default("session.tick_interval_ms", 1000)?
            .set_default("session.check_prior_attempt", true)?
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix("QUIZ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;

        if config.api.token.is_none() {
            tracing::warn!("No API token configured, requests will be sent unauthenticated");
        }
        if config.session.tick_interval_ms == 0 {
            return Err(config::ConfigError::Message(
                "session.tick_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            tick_interval: Duration::from_millis(self.session.tick_interval_ms),
            check_prior_attempt: self.session.check_prior_attempt,
            shuffle_seed: self.session.shuffle_seed,
        }
    }
}
