use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::GatewayError;
use crate::external::market_gateway::{QuoteBatch, QuoteGateway};
use crate::models::Quote;
use crate::utils::currency::{detect_currency, Currency};

/// Routes quote lookups across providers.
///
/// Strategy:
/// 1. Plain US tickers go to the real-time provider (Finnhub) first
/// 2. Indian listings and anything the real-time provider missed go to the
///    batch provider (RapidAPI)
/// 3. If the real-time provider errors, the whole batch falls back
/// 4. A batch-provider error is reported next to whatever was priced
pub struct MultiQuoteProvider {
    realtime: Option<Box<dyn QuoteGateway>>,
    batch: Box<dyn QuoteGateway>,
}

impl MultiQuoteProvider {
    pub fn new(realtime: Option<Box<dyn QuoteGateway>>, batch: Box<dyn QuoteGateway>) -> Self {
        Self { realtime, batch }
    }

    fn is_us_ticker(symbol: &str) -> bool {
        !symbol.contains('.') && detect_currency(symbol) == Currency::Usd
    }
}

#[async_trait]
impl QuoteGateway for MultiQuoteProvider {
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, GatewayError> {
        match self.fetch_quote_batch(symbols).await {
            QuoteBatch { quotes, error: Some(e) } if quotes.is_empty() => Err(e),
            QuoteBatch { quotes, .. } => Ok(quotes),
        }
    }

    async fn fetch_quote_batch(&self, symbols: &[String]) -> QuoteBatch {
        let mut quotes = Vec::with_capacity(symbols.len());

        if let Some(realtime) = &self.realtime {
            let us: Vec<String> = symbols.iter().filter(|s| Self::is_us_ticker(s)).cloned().collect();
            if !us.is_empty() {
                match realtime.fetch_quotes(&us).await {
                    Ok(found) => {
                        info!("✓ Real-time provider priced {}/{} symbols", found.len(), us.len());
                        quotes.extend(found);
                    }
                    Err(e) => warn!("Real-time provider failed: {}. Falling back to batch provider", e),
                }
            }
        }

        let priced: HashSet<&str> = quotes.iter().map(|q| q.symbol.as_str()).collect();
        let remaining: Vec<String> = symbols
            .iter()
            .filter(|s| !priced.contains(s.as_str()))
            .cloned()
            .collect();

        if remaining.is_empty() {
            return QuoteBatch { quotes, error: None };
        }

        let mut batch = self.batch.fetch_quote_batch(&remaining).await;
        if let Some(e) = &batch.error {
            warn!("Batch provider failed for {} symbols: {}", remaining.len(), e);
        }
        quotes.append(&mut batch.quotes);
        QuoteBatch { quotes, error: batch.error }
    }
}
