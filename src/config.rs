use std::time::Duration;

use crate::services::sync_service::SyncPolicy;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_QUOTE_REFRESH_CRON: &str = "0 * * * * *";
pub const DEFAULT_LOCAL_STORE_DIR: &str = ".paperfolio";
pub const DEFAULT_RAPIDAPI_HOST: &str = "yahoo-finance15.p.rapidapi.com";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Absent means the cloud mirror runs in memory.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rapidapi_key: Option<String>,
    pub rapidapi_host: String,
    pub finnhub_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub quote_refresh_cron: String,
    pub local_store_dir: String,
    pub sync_max_attempts: u32,
    pub market_requests_per_minute: u32,
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("{} must be a number, got '{}'", name, raw)),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let jwt_secret = optional("SUPABASE_JWT_SECRET")
            .ok_or_else(|| "SUPABASE_JWT_SECRET must be set".to_string())?;

        let config = Self {
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_url: optional("DATABASE_URL"),
            jwt_secret,
            rapidapi_key: optional("RAPIDAPI_KEY"),
            rapidapi_host: optional("RAPIDAPI_HOST").unwrap_or_else(|| DEFAULT_RAPIDAPI_HOST.to_string()),
            finnhub_api_key: optional("FINNHUB_API_KEY"),
            gemini_api_key: optional("GEMINI_API_KEY"),
            quote_refresh_cron: optional("QUOTE_REFRESH_CRON")
                .unwrap_or_else(|| DEFAULT_QUOTE_REFRESH_CRON.to_string()),
            local_store_dir: optional("LOCAL_STORE_DIR")
                .unwrap_or_else(|| DEFAULT_LOCAL_STORE_DIR.to_string()),
            sync_max_attempts: parse_or("SYNC_MAX_ATTEMPTS", 1)?,
            market_requests_per_minute: parse_or("MARKET_REQUESTS_PER_MINUTE", 30)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sync_max_attempts == 0 {
            return Err("SYNC_MAX_ATTEMPTS must be at least 1".to_string());
        }
        if self.market_requests_per_minute == 0 {
            return Err("MARKET_REQUESTS_PER_MINUTE must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy {
            max_attempts: self.sync_max_attempts,
            initial_backoff: Duration::from_millis(500),
        }
    }
}
