use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::GatewayError;
use crate::external::market_gateway::{NewsGateway, QuoteGateway};
use crate::models::{NewsArticle, Quote};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const NEWS_LOOKBACK_DAYS: u64 = 7;

/// Finnhub: real-time US quotes plus company and market news.
#[derive(Clone)]
pub struct FinnhubProvider {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    #[serde(default)]
    c: f64,
    #[serde(default)]
    d: Option<f64>,
    #[serde(default)]
    dp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FinnhubArticle {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    datetime: i64,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    related: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
}

impl From<FinnhubArticle> for NewsArticle {
    fn from(a: FinnhubArticle) -> Self {
        Self {
            id: a.id,
            title: a.headline,
            url: a.url,
            source: a.source,
            published_at: DateTime::from_timestamp(a.datetime, 0).unwrap_or_default(),
            snippet: a.summary,
            image: Some(a.image).filter(|s| !s.is_empty()),
            related: Some(a.related).filter(|s| !s.is_empty()),
        }
    }
}

impl FinnhubProvider {
    pub fn new(api_key: String) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, api_key })
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GatewayError> {
        let resp = self
            .client
            .get(format!("{}{}", BASE_URL, path))
            .query(query)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await?;

        match resp.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(GatewayError::RateLimited),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Unauthorized),
            status if !status.is_success() => {
                Err(GatewayError::BadResponse(format!("finnhub {} returned {}", path, status)))
            }
            _ => Ok(resp.json::<T>().await?),
        }
    }

    /// Single real-time quote; `None` when Finnhub reports a zero price.
    pub async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>, GatewayError> {
        let raw: FinnhubQuote = self.get("/quote", &[("symbol", symbol)]).await?;
        Ok(to_quote(symbol, raw))
    }
}

fn to_quote(symbol: &str, raw: FinnhubQuote) -> Option<Quote> {
    if !raw.c.is_finite() || raw.c == 0.0 {
        return None;
    }
    let mut quote = Quote::new(symbol, raw.c);
    quote.regular_market_change = raw.d.unwrap_or(0.0);
    quote.regular_market_change_percent = raw.dp.unwrap_or(0.0);
    quote.currency = Some("USD".to_string());
    Some(quote)
}

#[async_trait]
impl QuoteGateway for FinnhubProvider {
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, GatewayError> {
        let lookups = symbols.iter().map(|symbol| self.fetch_quote(symbol));
        let results = futures::future::join_all(lookups).await;

        let mut quotes = Vec::with_capacity(symbols.len());
        for (symbol, result) in symbols.iter().zip(results) {
            match result? {
                Some(quote) => quotes.push(quote),
                None => debug!("Finnhub has no price for {}", symbol),
            }
        }
        Ok(quotes)
    }
}

#[async_trait]
impl NewsGateway for FinnhubProvider {
    async fn fetch_news(&self, symbol: Option<&str>) -> Result<Vec<NewsArticle>, GatewayError> {
        let articles: Vec<FinnhubArticle> = match symbol {
            Some(symbol) => {
                let to = Utc::now().date_naive();
                let from = to.checked_sub_days(Days::new(NEWS_LOOKBACK_DAYS)).unwrap_or(to);
                let (from, to) = (from.format("%Y-%m-%d").to_string(), to.format("%Y-%m-%d").to_string());
                self.get(
                    "/company-news",
                    &[("symbol", symbol), ("from", from.as_str()), ("to", to.as_str())],
                )
                .await?
            }
            None => self.get("/news", &[("category", "general")]).await?,
        };

        info!("📰 Finnhub returned {} articles", articles.len());
        Ok(articles.into_iter().map(NewsArticle::from).collect())
    }
}
