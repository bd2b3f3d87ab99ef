use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Settings shared by every service, read from `configuration.*` and `APP__*`.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    5000
}

fn default_environment() -> String {
    std::env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string())
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "prod"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            environment: "dev".to_string(),
            log_level: default_log_level(),
        }
    }
}
