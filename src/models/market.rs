use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot quote as returned by the market-data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default)]
    pub regular_market_price: f64,
    #[serde(default)]
    pub regular_market_change: f64,
    #[serde(default)]
    pub regular_market_change_percent: f64,
    #[serde(default)]
    pub regular_market_volume: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            short_name: None,
            long_name: None,
            regular_market_price: price,
            regular_market_change: 0.0,
            regular_market_change_percent: 0.0,
            regular_market_volume: None,
            market_cap: None,
            currency: None,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.long_name
            .as_deref()
            .or(self.short_name.as_deref())
            .filter(|n| !n.trim().is_empty())
    }
}

/// One OHLCV bar; `timestamp` is unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub long_business_summary: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub full_time_employees: Option<u64>,
}

/// A single news article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub snippet: String,
    pub image: Option<String>,
    pub related: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    pub kind: String,
}

/// Chart intervals accepted by the history endpoint.
pub const HISTORY_INTERVALS: [&str; 7] = ["5m", "15m", "30m", "1h", "1d", "1wk", "1mo"];
