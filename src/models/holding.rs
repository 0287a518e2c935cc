use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// An open position in a single symbol, carried at its volume-weighted average cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub id: Uuid,
    pub symbol: String,
    pub company_name: String,
    pub quantity: u32,
    pub buy_price: f64,
    pub buy_date: DateTime<Utc>,
    pub current_price: Option<f64>,
}

impl Holding {
    pub fn new(symbol: String, company_name: String, quantity: u32, price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol,
            company_name,
            quantity,
            buy_price: price,
            buy_date: Utc::now(),
            current_price: Some(price),
        }
    }

    /// Last-known market price, falling back to the average cost when unset or zero.
    pub fn mark_price(&self) -> f64 {
        self.current_price.filter(|p| *p > 0.0).unwrap_or(self.buy_price)
    }

    pub fn cost_basis(&self) -> f64 {
        self.buy_price * self.quantity as f64
    }

    pub fn market_value(&self) -> f64 {
        self.mark_price() * self.quantity as f64
    }

    pub fn profit(&self) -> f64 {
        self.market_value() - self.cost_basis()
    }

    /// Unrealized profit as a percentage of cost basis; zero when nothing was paid.
    pub fn profit_percent(&self) -> f64 {
        let basis = self.cost_basis();
        if basis == 0.0 {
            0.0
        } else {
            self.profit() / basis * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    Buy,
    Sell,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Buy => "BUY",
            TradeType::Sell => "SELL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "BUY" => Some(TradeType::Buy),
            "SELL" => Some(TradeType::Sell),
            _ => None,
        }
    }
}

// Append-only audit entry; never used to recompute ledger state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    pub symbol: String,
    pub quantity: u32,
    pub price: f64,
    pub executed_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn new(trade_type: TradeType, symbol: String, quantity: u32, price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            trade_type,
            symbol,
            quantity,
            price,
            executed_at: Utc::now(),
        }
    }
}
