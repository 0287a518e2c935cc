use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::errors::GatewayError;
use crate::services::ledger_service::LedgerStore;
use crate::services::market_service::MarketService;
use crate::services::session_service::SessionGate;
use crate::services::watchlist_service::WatchlistStore;

/// Pulls quotes for everything held or watched and marks holdings to market.
#[derive(Clone)]
pub struct QuoteRefresher {
    ledger: Arc<Mutex<LedgerStore>>,
    watchlist: Arc<Mutex<WatchlistStore>>,
    market: MarketService,
    session: SessionGate,
}

impl QuoteRefresher {
    pub fn new(
        ledger: Arc<Mutex<LedgerStore>>,
        watchlist: Arc<Mutex<WatchlistStore>>,
        market: MarketService,
        session: SessionGate,
    ) -> Self {
        Self { ledger, watchlist, market, session }
    }

    fn tracked_symbols(&self) -> Vec<String> {
        let mut symbols = self.ledger.lock().symbols();
        for symbol in self.watchlist.lock().stocks() {
            if !symbols.contains(symbol) {
                symbols.push(symbol.clone());
            }
        }
        symbols
    }

    /// One refresh pass. Returns how many holdings were re-priced.
    ///
    /// The session generation is captured before the fetch; if the account
    /// changed while the request was in flight the result is dropped.
    pub async fn refresh_once(&self) -> Result<usize, GatewayError> {
        let symbols = self.tracked_symbols();
        if symbols.is_empty() {
            return Ok(0);
        }

        let generation = self.session.generation();
        let quotes = self.market.refresh_quotes(&symbols).await?;

        let prices: HashMap<String, f64> = quotes
            .into_iter()
            .map(|q| (q.symbol, q.regular_market_price))
            .collect();

        let mut ledger = self.ledger.lock();
        if self.session.generation() != generation {
            info!("Session changed during quote refresh, discarding {} quotes", prices.len());
            return Ok(0);
        }
        let updated = ledger.update_current_prices(&prices);
        info!("💹 Refreshed {} quotes, re-priced {} holdings", prices.len(), updated);
        Ok(updated)
    }
}
