use serde::{Deserialize, Serialize};

use crate::models::chat::ChatMessage;
use crate::models::holding::{Holding, TradeRecord};

/// Virtual cash granted to a fresh account.
pub const STARTING_CASH: f64 = 100_000.0;

/// Persisted account layout shared by the device-local cache and the cloud mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    #[serde(default)]
    pub holdings: Vec<Holding>,
    pub virtual_cash: f64,
    #[serde(default)]
    pub stocks: Vec<String>,
    /// Oldest first.
    #[serde(default)]
    pub trades: Vec<TradeRecord>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
}

impl Default for AccountSnapshot {
    fn default() -> Self {
        Self {
            holdings: Vec::new(),
            virtual_cash: STARTING_CASH,
            stocks: Vec::new(),
            trades: Vec::new(),
            chat_history: Vec::new(),
        }
    }
}
