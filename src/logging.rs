use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub type LoggingError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_LOG_LEVEL: &str = "info";

/// Where and how the backend writes its tracing output.
///
/// Console output is always on. When built with the `loki` feature and
/// `LOKI_ENABLED=true`, events are also shipped to Loki labelled with the
/// service name and environment.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub loki_enabled: bool,
    pub loki_url: Option<url::Url>,
    pub service_name: String,
    pub environment: String,
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            loki_enabled: false,
            loki_url: None,
            service_name: "paperfolio".to_string(),
            environment: "development".to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl LoggingConfig {
    /// Reads `LOKI_ENABLED`, `LOKI_URL`, `SERVICE_NAME`, `ENVIRONMENT` and
    /// `RUST_LOG`. A malformed `LOKI_URL` is an error, not a silent fallback.
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let loki_url = match std::env::var("LOKI_URL") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                url::Url::parse(raw.trim())
                    .map_err(|e| format!("LOKI_URL is not a valid URL: {}", e))?,
            ),
            _ => None,
        };

        let config = Self {
            loki_enabled: std::env::var("LOKI_ENABLED")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            loki_url,
            service_name: std::env::var("SERVICE_NAME").unwrap_or(defaults.service_name),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.loki_enabled && self.loki_url.is_none() {
            return Err("LOKI_ENABLED is true but LOKI_URL is not set".to_string());
        }
        Ok(())
    }

    /// Filter built from `log_level`; an unparsable directive falls back to `info`.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.log_level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
    }
}

pub fn init_logging(config: LoggingConfig) -> Result<(), LoggingError> {
    config.validate()?;

    #[cfg(feature = "loki")]
    if let (true, Some(loki_url)) = (config.loki_enabled, config.loki_url.clone()) {
        return init_with_loki(&config, loki_url);
    }

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()?;

    tracing::info!(service = %config.service_name, "📊 Console logging initialized");
    Ok(())
}

#[cfg(feature = "loki")]
fn init_with_loki(config: &LoggingConfig, loki_url: url::Url) -> Result<(), LoggingError> {
    let (loki_layer, task) = tracing_loki::builder()
        .label("service", &config.service_name)?
        .label("environment", &config.environment)?
        .build_url(loki_url.clone())?;

    tokio::spawn(task);

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(loki_layer)
        .try_init()?;

    tracing::info!(service = %config.service_name, "📊 Logging to console and Loki at {}", loki_url);
    Ok(())
}
