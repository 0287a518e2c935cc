use async_trait::async_trait;

use crate::errors::GatewayError;
use crate::models::{CompanyProfile, HistoryPoint, NewsArticle, Quote, SearchResult};

/// Quotes that came back, plus the error that kept the rest from being
/// priced. Both can be present when a lookup only partly succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteBatch {
    pub quotes: Vec<Quote>,
    pub error: Option<GatewayError>,
}

#[async_trait]
pub trait QuoteGateway: Send + Sync {
    /// Batch quote lookup. Symbols the provider has no data for are omitted.
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, GatewayError>;

    /// Like [`fetch_quotes`](Self::fetch_quotes), but a failure does not
    /// discard quotes that were already priced.
    async fn fetch_quote_batch(&self, symbols: &[String]) -> QuoteBatch {
        match self.fetch_quotes(symbols).await {
            Ok(quotes) => QuoteBatch { quotes, error: None },
            Err(error) => QuoteBatch { quotes: Vec::new(), error: Some(error) },
        }
    }
}

#[async_trait]
pub trait HistoryGateway: Send + Sync {
    async fn fetch_history(&self, symbol: &str, interval: &str) -> Result<Vec<HistoryPoint>, GatewayError>;
}

#[async_trait]
pub trait ProfileGateway: Send + Sync {
    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, GatewayError>;
}

#[async_trait]
pub trait NewsGateway: Send + Sync {
    /// Company news when `symbol` is given, general market news otherwise.
    async fn fetch_news(&self, symbol: Option<&str>) -> Result<Vec<NewsArticle>, GatewayError>;
}

#[async_trait]
pub trait SearchGateway: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, GatewayError>;
}

#[async_trait]
pub trait AiCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError>;
}

/// Stand-in for a provider whose API key is missing.
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured(pub &'static str);

#[async_trait]
impl QuoteGateway for Unconfigured {
    async fn fetch_quotes(&self, _symbols: &[String]) -> Result<Vec<Quote>, GatewayError> {
        Err(GatewayError::NotConfigured(self.0))
    }
}

#[async_trait]
impl HistoryGateway for Unconfigured {
    async fn fetch_history(&self, _symbol: &str, _interval: &str) -> Result<Vec<HistoryPoint>, GatewayError> {
        Err(GatewayError::NotConfigured(self.0))
    }
}

#[async_trait]
impl ProfileGateway for Unconfigured {
    async fn fetch_profile(&self, _symbol: &str) -> Result<CompanyProfile, GatewayError> {
        Err(GatewayError::NotConfigured(self.0))
    }
}

#[async_trait]
impl NewsGateway for Unconfigured {
    async fn fetch_news(&self, _symbol: Option<&str>) -> Result<Vec<NewsArticle>, GatewayError> {
        Err(GatewayError::NotConfigured(self.0))
    }
}

#[async_trait]
impl SearchGateway for Unconfigured {
    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, GatewayError> {
        Err(GatewayError::NotConfigured(self.0))
    }
}

#[async_trait]
impl AiCompletion for Unconfigured {
    async fn complete(&self, _prompt: &str) -> Result<String, GatewayError> {
        Err(GatewayError::NotConfigured(self.0))
    }
}
