use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::GatewayError;
use crate::external::market_gateway::{HistoryGateway, ProfileGateway, QuoteGateway, SearchGateway};
use crate::models::{CompanyProfile, HistoryPoint, Quote, SearchResult};
use crate::services::rate_limiter::RateLimiter;
use crate::utils::parse::{first_present, first_text, parse_number, parse_number_opt};

const MAX_ATTEMPTS: u32 = 2;

/// Yahoo Finance data served through RapidAPI (`x-rapidapi-*` headers).
#[derive(Clone)]
pub struct RapidApiProvider {
    client: reqwest::Client,
    api_key: String,
    host: String,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl RapidApiProvider {
    pub fn new(api_key: String, host: String, limiter: Arc<RateLimiter>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        let base_url = format!("https://{}", host);
        Ok(Self { client, api_key, host, base_url, limiter })
    }

    /// GET with one retry on transport failures. Each attempt waits on the limiter.
    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, GatewayError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let _guard = self.limiter.acquire().await?;
            match self.send_once(path, query).await {
                Err(GatewayError::Network(msg)) if attempt < MAX_ATTEMPTS => {
                    warn!("RapidAPI {} failed (attempt {}/{}): {}. Retrying...", path, attempt, MAX_ATTEMPTS, msg);
                }
                other => return other,
            }
        }
    }

    async fn send_once(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("RapidAPI GET {}", path);

        let resp = self
            .client
            .get(&url)
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", &self.host)
            .query(query)
            .send()
            .await?;

        match resp.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("⚠️ Rate limit exceeded for {}", path);
                Err(GatewayError::RateLimited)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Unauthorized),
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound(path.to_string())),
            status if !status.is_success() => {
                Err(GatewayError::BadResponse(format!("{} returned {}", path, status)))
            }
            _ => Ok(resp.json::<Value>().await?),
        }
    }
}

fn number(item: &Value, keys: &[&str]) -> f64 {
    first_present(item, keys).map(parse_number).unwrap_or(0.0)
}

fn number_opt(item: &Value, keys: &[&str]) -> Option<f64> {
    first_present(item, keys).and_then(parse_number_opt)
}

pub(crate) fn parse_quotes(payload: &Value) -> Vec<Quote> {
    let Some(items) = payload.get("body").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let symbol = first_text(item, &["symbol"])?;
            Some(Quote {
                symbol: symbol.to_uppercase(),
                short_name: first_text(item, &["shortName"]),
                long_name: first_text(item, &["longName", "name"]),
                regular_market_price: number(item, &["regularMarketPrice", "lastsale"]),
                regular_market_change: number(item, &["regularMarketChange", "netchange"]),
                regular_market_change_percent: number(item, &["regularMarketChangePercent", "pctchange"]),
                regular_market_volume: number_opt(item, &["regularMarketVolume", "volume"]),
                market_cap: number_opt(item, &["marketCap"]),
                currency: first_text(item, &["currency"]),
            })
        })
        .collect()
}

pub(crate) fn parse_history(payload: &Value) -> Vec<HistoryPoint> {
    let Some(bars) = payload.get("body").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut out: Vec<HistoryPoint> = bars
        .iter()
        .filter_map(|(key, bar)| {
            let close = bar.get("close").and_then(parse_number_opt)?;
            let timestamp = bar
                .get("date_utc")
                .and_then(Value::as_i64)
                .or_else(|| key.parse::<i64>().ok())?;
            Some(HistoryPoint {
                timestamp,
                open: number(bar, &["open"]),
                high: number(bar, &["high"]),
                low: number(bar, &["low"]),
                close,
                volume: number(bar, &["volume"]),
            })
        })
        .collect();

    out.sort_by_key(|p| p.timestamp);
    out
}

pub(crate) fn parse_profile(payload: &Value) -> Option<CompanyProfile> {
    let body = payload.get("body").filter(|b| b.is_object())?;
    Some(CompanyProfile {
        sector: first_text(body, &["sector", "sectorDisp"]),
        industry: first_text(body, &["industry", "industryDisp"]),
        long_business_summary: first_text(body, &["longBusinessSummary"]),
        website: first_text(body, &["website"]),
        country: first_text(body, &["country"]),
        full_time_employees: number_opt(body, &["fullTimeEmployees"])
            .filter(|n| *n >= 0.0)
            .map(|n| n as u64),
    })
}

pub(crate) fn parse_search(payload: &Value) -> Vec<SearchResult> {
    let items = payload
        .get("quotes")
        .or_else(|| payload.get("body"))
        .and_then(Value::as_array);
    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let symbol = first_text(item, &["symbol"])?;
            Some(SearchResult {
                name: first_text(item, &["name", "longname", "shortname"]).unwrap_or_else(|| symbol.clone()),
                exchange: first_text(item, &["exchDisp", "exch", "exchange"]).unwrap_or_default(),
                kind: first_text(item, &["typeDisp", "type", "quoteType"]).unwrap_or_default(),
                symbol,
            })
        })
        .collect()
}

#[async_trait]
impl QuoteGateway for RapidApiProvider {
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, GatewayError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let tickers = symbols.join(",");
        let payload = self
            .get_json("/api/v1/markets/stock/quotes", &[("ticker", tickers.as_str())])
            .await?;
        Ok(parse_quotes(&payload))
    }
}

#[async_trait]
impl HistoryGateway for RapidApiProvider {
    async fn fetch_history(&self, symbol: &str, interval: &str) -> Result<Vec<HistoryPoint>, GatewayError> {
        let payload = self
            .get_json(
                "/api/v1/markets/stock/history",
                &[("symbol", symbol), ("interval", interval), ("diffandsplits", "false")],
            )
            .await?;
        Ok(parse_history(&payload))
    }
}

#[async_trait]
impl ProfileGateway for RapidApiProvider {
    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, GatewayError> {
        let payload = self
            .get_json(
                "/api/v1/markets/stock/modules",
                &[("ticker", symbol), ("module", "asset-profile")],
            )
            .await?;
        parse_profile(&payload).ok_or_else(|| GatewayError::NotFound(symbol.to_string()))
    }
}

#[async_trait]
impl SearchGateway for RapidApiProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, GatewayError> {
        let payload = self.get_json("/api/v2/search", &[("q", query)]).await?;
        Ok(parse_search(&payload))
    }
}
