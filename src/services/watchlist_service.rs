use serde::Serialize;
use tracing::info;

use crate::errors::LedgerError;
use crate::services::session_service::SessionGate;
use crate::services::sync_service::{SyncCommand, SyncOutbox};
use crate::utils::parse::normalize_symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

/// Insertion-ordered set of symbols the user tracks without a position.
#[derive(Debug)]
pub struct WatchlistStore {
    stocks: Vec<String>,
    session: SessionGate,
    outbox: SyncOutbox,
}

impl WatchlistStore {
    pub fn new(session: SessionGate, outbox: SyncOutbox) -> Self {
        Self {
            stocks: Vec::new(),
            session,
            outbox,
        }
    }

    pub fn stocks(&self) -> &[String] {
        &self.stocks
    }

    pub fn is_in_watchlist(&self, symbol: &str) -> bool {
        let symbol = normalize_symbol(symbol);
        self.stocks.iter().any(|s| *s == symbol)
    }

    pub fn add_stock(&mut self, symbol: &str) -> Result<AddOutcome, LedgerError> {
        let user = self.session.require_user()?;
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(LedgerError::InvalidOrder("symbol is required".into()));
        }

        if self.stocks.contains(&symbol) {
            return Ok(AddOutcome::AlreadyPresent);
        }

        self.stocks.push(symbol.clone());
        info!("👀 Added {} to watchlist", symbol);
        self.outbox.send(SyncCommand::AddWatchlistSymbol { user_id: user.id, symbol });
        Ok(AddOutcome::Added)
    }

    /// `Ok(false)` when the symbol was not listed.
    pub fn remove_stock(&mut self, symbol: &str) -> Result<bool, LedgerError> {
        let user = self.session.require_user()?;
        let symbol = normalize_symbol(symbol);

        let Some(idx) = self.stocks.iter().position(|s| *s == symbol) else {
            return Ok(false);
        };

        self.stocks.remove(idx);
        info!("Removed {} from watchlist", symbol);
        self.outbox.send(SyncCommand::RemoveWatchlistSymbol { user_id: user.id, symbol });
        Ok(true)
    }

    /// Replace the list wholesale, dropping duplicates. Not synced.
    pub fn replace(&mut self, stocks: Vec<String>) {
        self.stocks.clear();
        for symbol in stocks {
            let symbol = normalize_symbol(&symbol);
            if !symbol.is_empty() && !self.stocks.contains(&symbol) {
                self.stocks.push(symbol);
            }
        }
    }
}
