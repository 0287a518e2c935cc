use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::{info, warn};

use paperfolio::app;
use paperfolio::config::AppConfig;
use paperfolio::db::{CloudStore, InMemoryCloudStore, PgCloudStore};
use paperfolio::errors::GatewayError;
use paperfolio::external::finnhub::FinnhubProvider;
use paperfolio::external::gemini::GeminiProvider;
use paperfolio::external::market_gateway::{AiCompletion, NewsGateway, QuoteGateway, Unconfigured};
use paperfolio::external::multi_provider::MultiQuoteProvider;
use paperfolio::external::rapidapi::RapidApiProvider;
use paperfolio::logging::{init_logging, LoggingConfig};
use paperfolio::services::failure_cache::FailureCache;
use paperfolio::services::job_scheduler_service::{JobContext, JobSchedulerService};
use paperfolio::services::local_store::LocalStore;
use paperfolio::services::market_service::{MarketGateways, MarketService};
use paperfolio::services::quote_refresh_service::QuoteRefresher;
use paperfolio::services::rate_limiter::RateLimiter;
use paperfolio::services::session_service::SessionVerifier;
use paperfolio::services::sync_service::{SyncOutbox, SyncWorker};
use paperfolio::state::AppState;

const MAX_CONCURRENT_MARKET_REQUESTS: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    let logging = LoggingConfig::from_env().map_err(anyhow::Error::msg)?;
    init_logging(logging).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let config = AppConfig::from_env().map_err(anyhow::Error::msg)?;

    let cloud: Arc<dyn CloudStore> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .context("Failed to connect to DATABASE_URL")?;
            let store = PgCloudStore::new(pool);
            store.migrate().await.context("Failed to run migrations")?;
            info!("☁️ Cloud mirror: Postgres");
            Arc::new(store)
        }
        None => {
            warn!("⚠️ DATABASE_URL not set, cloud mirror kept in memory");
            Arc::new(InMemoryCloudStore::new())
        }
    };

    let (gateways, ai) = build_gateways(&config).context("Failed to create market gateways")?;
    let failure_cache = FailureCache::new();
    let market = MarketService::new(gateways, failure_cache.clone());

    let (outbox, rx) = SyncOutbox::channel();
    SyncWorker::new(cloud.clone(), config.sync_policy()).spawn(rx);

    let local_store = LocalStore::new(PathBuf::from(&config.local_store_dir));
    let snapshot = local_store.load_or_default();

    let state = AppState::new(
        SessionVerifier::new(&config.jwt_secret),
        outbox,
        market.clone(),
        ai,
        cloud,
        Some(local_store),
    );
    state.restore(snapshot);

    let refresher = QuoteRefresher::new(
        state.ledger.clone(),
        state.watchlist.clone(),
        market,
        state.session.clone(),
    );
    let mut scheduler = JobSchedulerService::new(JobContext { refresher, failure_cache }).await?;
    scheduler.start(&config.quote_refresh_cron).await?;

    let app = app::create_app(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🚀 Paperfolio backend running at http://{}/", config.bind_addr);
    axum::serve(listener, app).await?;

    scheduler.stop().await?;
    Ok(())
}

/// Wire up the providers that have keys; anything missing answers
/// `NotConfigured` so the app still boots.
fn build_gateways(config: &AppConfig) -> Result<(MarketGateways, Arc<dyn AiCompletion>), GatewayError> {
    let limiter = Arc::new(RateLimiter::new(
        MAX_CONCURRENT_MARKET_REQUESTS,
        config.market_requests_per_minute,
    ));

    let rapidapi = match &config.rapidapi_key {
        Some(key) => Some(RapidApiProvider::new(key.clone(), config.rapidapi_host.clone(), limiter)?),
        None => {
            warn!("⚠️ RAPIDAPI_KEY not set, market data disabled");
            None
        }
    };
    let finnhub = match &config.finnhub_api_key {
        Some(key) => Some(FinnhubProvider::new(key.clone())?),
        None => {
            warn!("⚠️ FINNHUB_API_KEY not set, real-time quotes and news disabled");
            None
        }
    };

    let batch: Box<dyn QuoteGateway> = match &rapidapi {
        Some(provider) => Box::new(provider.clone()),
        None => Box::new(Unconfigured("RapidAPI")),
    };
    let realtime = finnhub
        .clone()
        .map(|provider| Box::new(provider) as Box<dyn QuoteGateway>);
    info!(
        "📊 Quote providers: real-time={}, batch={}",
        realtime.is_some(),
        rapidapi.is_some()
    );

    let gateways = match rapidapi {
        Some(provider) => {
            let provider = Arc::new(provider);
            MarketGateways {
                quotes: Arc::new(MultiQuoteProvider::new(realtime, batch)),
                history: provider.clone(),
                profiles: provider.clone(),
                news: news_gateway(finnhub),
                search: provider,
            }
        }
        None => {
            let none = Arc::new(Unconfigured("RapidAPI"));
            MarketGateways {
                quotes: Arc::new(MultiQuoteProvider::new(realtime, batch)),
                history: none.clone(),
                profiles: none.clone(),
                news: news_gateway(finnhub),
                search: none,
            }
        }
    };

    let ai: Arc<dyn AiCompletion> = match &config.gemini_api_key {
        Some(key) => Arc::new(GeminiProvider::new(key.clone())?),
        None => {
            warn!("⚠️ GEMINI_API_KEY not set, chat answers with fallback replies");
            Arc::new(Unconfigured("Gemini"))
        }
    };

    Ok((gateways, ai))
}

fn news_gateway(finnhub: Option<FinnhubProvider>) -> Arc<dyn NewsGateway> {
    match finnhub {
        Some(provider) => Arc::new(provider),
        None => Arc::new(Unconfigured("Finnhub")),
    }
}
