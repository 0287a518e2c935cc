use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::errors::GatewayError;
use crate::external::market_gateway::{
    HistoryGateway, NewsGateway, ProfileGateway, QuoteGateway, SearchGateway,
};
use crate::models::{CompanyProfile, HistoryPoint, NewsArticle, Quote, SearchResult, StockContext};
use crate::services::chat_service::format_stock_for_ai;
use crate::services::failure_cache::{FailureCache, FailureType};
use crate::utils::parse::normalize_symbol;

/// The upstream providers behind [`MarketService`].
#[derive(Clone)]
pub struct MarketGateways {
    pub quotes: Arc<dyn QuoteGateway>,
    pub history: Arc<dyn HistoryGateway>,
    pub profiles: Arc<dyn ProfileGateway>,
    pub news: Arc<dyn NewsGateway>,
    pub search: Arc<dyn SearchGateway>,
}

/// Market-data façade that never fails the caller.
///
/// Upstream errors are logged and answered with the last-known quotes, an
/// empty list or `None`. Symbols that recently failed are not re-queried
/// until their failure-cache entry expires.
#[derive(Clone)]
pub struct MarketService {
    gateways: MarketGateways,
    last_quotes: Arc<DashMap<String, Quote>>,
    failures: FailureCache,
}

fn quote_key(symbol: &str) -> String {
    format!("quote:{}", symbol)
}

fn profile_key(symbol: &str) -> String {
    format!("profile:{}", symbol)
}

impl MarketService {
    pub fn new(gateways: MarketGateways, failures: FailureCache) -> Self {
        Self {
            gateways,
            last_quotes: Arc::new(DashMap::new()),
            failures,
        }
    }

    pub fn failure_cache(&self) -> &FailureCache {
        &self.failures
    }

    pub fn last_quote(&self, symbol: &str) -> Option<Quote> {
        self.last_quotes.get(&normalize_symbol(symbol)).map(|q| q.value().clone())
    }

    /// Fetch fresh quotes for every symbol not currently in the failure
    /// cache and remember them. Errors are returned, not masked.
    pub async fn refresh_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, GatewayError> {
        let mut wanted: Vec<String> = Vec::with_capacity(symbols.len());
        for symbol in symbols.iter().map(|s| normalize_symbol(s)) {
            if symbol.is_empty() || wanted.contains(&symbol) {
                continue;
            }
            if self.failures.is_failed(&quote_key(&symbol)).is_some() {
                debug!("Skipping {} (recent failure)", symbol);
                continue;
            }
            wanted.push(symbol);
        }

        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let batch = self.gateways.quotes.fetch_quote_batch(&wanted).await;
        // Misses are only "not found" when the provider answered cleanly.
        let miss_type = batch.error.as_ref().map(FailureType::from).unwrap_or(FailureType::NotFound);

        for quote in &batch.quotes {
            self.failures.clear(&quote_key(&quote.symbol));
            self.last_quotes.insert(quote.symbol.clone(), quote.clone());
        }
        for missing in wanted.iter().filter(|s| !batch.quotes.iter().any(|q| &q.symbol == *s)) {
            self.failures.record_failure(&quote_key(missing), miss_type);
        }

        match batch.error {
            Some(err) if batch.quotes.is_empty() => Err(err),
            _ => Ok(batch.quotes),
        }
    }

    /// Quotes for `symbols` in request order, fresh where possible and the
    /// last-known value otherwise. Symbols never priced are omitted.
    pub async fn quotes(&self, symbols: &[String]) -> Vec<Quote> {
        if let Err(err) = self.refresh_quotes(symbols).await {
            warn!("⚠️ Quote fetch failed, serving cached quotes: {}", err);
        }

        let mut seen = Vec::new();
        symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .filter(|s| {
                if seen.contains(s) {
                    false
                } else {
                    seen.push(s.clone());
                    true
                }
            })
            .filter_map(|s| self.last_quotes.get(&s).map(|q| q.value().clone()))
            .collect()
    }

    pub async fn history(&self, symbol: &str, interval: &str) -> Vec<HistoryPoint> {
        let symbol = normalize_symbol(symbol);
        match self.gateways.history.fetch_history(&symbol, interval).await {
            Ok(points) => points,
            Err(err) => {
                warn!("⚠️ History fetch failed for {} ({}): {}", symbol, interval, err);
                Vec::new()
            }
        }
    }

    pub async fn profile(&self, symbol: &str) -> Option<CompanyProfile> {
        let symbol = normalize_symbol(symbol);
        let key = profile_key(&symbol);
        if self.failures.is_failed(&key).is_some() {
            return None;
        }

        match self.gateways.profiles.fetch_profile(&symbol).await {
            Ok(profile) => Some(profile),
            Err(err) => {
                warn!("⚠️ Profile fetch failed for {}: {}", symbol, err);
                self.failures.record_failure(&key, FailureType::from(&err));
                None
            }
        }
    }

    pub async fn news(&self, symbol: Option<&str>) -> Vec<NewsArticle> {
        let symbol = symbol.map(normalize_symbol).filter(|s| !s.is_empty());
        match self.gateways.news.fetch_news(symbol.as_deref()).await {
            Ok(articles) => articles,
            Err(err) => {
                warn!("⚠️ News fetch failed: {}", err);
                Vec::new()
            }
        }
    }

    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        match self.gateways.search.search(query).await {
            Ok(results) => results,
            Err(err) => {
                warn!("⚠️ Search failed for '{}': {}", query, err);
                Vec::new()
            }
        }
    }

    /// Stock facts for the chat model, assembled from the quote and profile.
    pub async fn stock_context(&self, symbol: &str) -> StockContext {
        let symbol = normalize_symbol(symbol);
        let quotes = self.quotes(std::slice::from_ref(&symbol)).await;
        let quote = quotes
            .first()
            .and_then(|q| serde_json::to_value(q).ok())
            .unwrap_or_else(|| json!({ "symbol": symbol }));
        let profile: Option<Value> = self
            .profile(&symbol)
            .await
            .and_then(|p| serde_json::to_value(p).ok());

        info!("Built stock context for {}", symbol);
        format_stock_for_ai(&quote, profile.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::market_gateway::{QuoteBatch, Unconfigured};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Switchable {
        down: AtomicBool,
    }

    #[async_trait]
    impl QuoteGateway for Switchable {
        async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, GatewayError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(GatewayError::Network("down".into()));
            }
            Ok(symbols
                .iter()
                .filter(|s| s.as_str() != "NOPE")
                .map(|s| Quote::new(s.clone(), 100.0))
                .collect())
        }
    }

    fn service(quotes: Arc<dyn QuoteGateway>) -> MarketService {
        let none = Arc::new(Unconfigured("test"));
        MarketService::new(
            MarketGateways {
                quotes,
                history: none.clone(),
                profiles: none.clone(),
                news: none.clone(),
                search: none,
            },
            FailureCache::new(),
        )
    }

    #[tokio::test]
    async fn test_serves_stale_quotes_when_provider_fails() {
        let gateway = Arc::new(Switchable { down: AtomicBool::new(false) });
        let market = service(gateway.clone());

        let fresh = market.quotes(&["aapl".to_string()]).await;
        assert_eq!(fresh[0].symbol, "AAPL");

        gateway.down.store(true, Ordering::SeqCst);
        market.failure_cache().clear("quote:AAPL");
        let stale = market.quotes(&["AAPL".to_string()]).await;
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].regular_market_price, 100.0);
    }

    #[tokio::test]
    async fn test_unknown_symbol_lands_in_failure_cache() {
        let market = service(Arc::new(Switchable { down: AtomicBool::new(false) }));
        let quotes = market.quotes(&["NOPE".to_string(), "MSFT".to_string()]).await;
        assert_eq!(quotes.len(), 1);
        assert!(market.failure_cache().is_failed("quote:NOPE").is_some());
    }

    struct PartlyLimited;

    #[async_trait]
    impl QuoteGateway for PartlyLimited {
        async fn fetch_quotes(&self, _symbols: &[String]) -> Result<Vec<Quote>, GatewayError> {
            Err(GatewayError::RateLimited)
        }

        async fn fetch_quote_batch(&self, _symbols: &[String]) -> QuoteBatch {
            QuoteBatch {
                quotes: vec![Quote::new("AAPL".to_string(), 190.0)],
                error: Some(GatewayError::RateLimited),
            }
        }
    }

    #[tokio::test]
    async fn test_partial_batch_records_provider_failure_for_misses() {
        let market = service(Arc::new(PartlyLimited));
        let quotes = market
            .refresh_quotes(&["AAPL".to_string(), "TCS.NS".to_string()])
            .await
            .unwrap();
        assert_eq!(quotes.len(), 1);

        let missed = market.failure_cache().is_failed("quote:TCS.NS").unwrap();
        assert_eq!(missed.failure_type, FailureType::RateLimited);
        assert!(market.failure_cache().is_failed("quote:AAPL").is_none());
    }

    #[tokio::test]
    async fn test_degraded_defaults_for_other_endpoints() {
        let market = service(Arc::new(Unconfigured("test")));
        assert!(market.history("AAPL", "1d").await.is_empty());
        assert!(market.profile("AAPL").await.is_none());
        assert!(market.news(None).await.is_empty());
        assert!(market.search("apple").await.is_empty());

        let ctx = market.stock_context("aapl").await;
        assert_eq!(ctx.symbol, "AAPL");
        assert_eq!(ctx.sector, "N/A");
    }
}
