use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::LedgerError;
use crate::models::{AccountSnapshot, Holding, TradeRecord, TradeType, STARTING_CASH};
use crate::services::session_service::SessionGate;
use crate::services::sync_service::{SyncCommand, SyncOutbox};
use crate::utils::currency::{detect_currency, format_price, format_signed, Currency};
use crate::utils::parse::normalize_symbol;

/// The paper-trading ledger: open holdings at average cost plus virtual cash.
///
/// Mutations check the session gate, apply locally, then push the matching
/// remote writes onto the sync outbox. A rejected call leaves everything
/// untouched.
#[derive(Debug)]
pub struct LedgerStore {
    holdings: Vec<Holding>,
    virtual_cash: f64,
    trades: Vec<TradeRecord>,
    session: SessionGate,
    outbox: SyncOutbox,
}

impl LedgerStore {
    pub fn new(session: SessionGate, outbox: SyncOutbox) -> Self {
        Self {
            holdings: Vec::new(),
            virtual_cash: STARTING_CASH,
            trades: Vec::new(),
            session,
            outbox,
        }
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn holding(&self, id: Uuid) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.id == id)
    }

    pub fn holding_for_symbol(&self, symbol: &str) -> Option<&Holding> {
        let symbol = normalize_symbol(symbol);
        self.holdings.iter().find(|h| h.symbol == symbol)
    }

    pub fn virtual_cash(&self) -> f64 {
        self.virtual_cash
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn symbols(&self) -> Vec<String> {
        self.holdings.iter().map(|h| h.symbol.clone()).collect()
    }

    /// Buy `quantity` shares at `price`, folding into any existing position
    /// at the volume-weighted average cost.
    pub fn buy(
        &mut self,
        symbol: &str,
        quantity: u32,
        price: f64,
        company_name: Option<&str>,
    ) -> Result<Holding, LedgerError> {
        let user = self.session.require_user()?;

        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(LedgerError::InvalidOrder("symbol is required".into()));
        }
        if quantity == 0 {
            return Err(LedgerError::InvalidOrder("quantity must be positive".into()));
        }
        if !price.is_finite() || price < 0.0 {
            return Err(LedgerError::InvalidOrder(format!("invalid price {}", price)));
        }

        let cost = price * quantity as f64;
        if cost > self.virtual_cash {
            warn!("⚠️ Insufficient virtual cash for {} x{} @ {}", symbol, quantity, price);
            return Err(LedgerError::InsufficientFunds {
                required: cost,
                available: self.virtual_cash,
            });
        }

        let holding = match self.holdings.iter().position(|h| h.symbol == symbol) {
            Some(idx) => {
                let existing = &self.holdings[idx];
                let total_quantity = existing.quantity.checked_add(quantity).ok_or_else(|| {
                    LedgerError::InvalidOrder("position size overflow".into())
                })?;
                let new_avg = (existing.cost_basis() + cost) / total_quantity as f64;

                let existing = &mut self.holdings[idx];
                existing.quantity = total_quantity;
                existing.buy_price = new_avg;
                existing.buy_date = Utc::now();
                existing.clone()
            }
            None => {
                let name = company_name
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| symbol.clone());
                let holding = Holding::new(symbol.clone(), name, quantity, price);
                self.holdings.push(holding.clone());
                holding
            }
        };
        self.virtual_cash -= cost;

        let trade = TradeRecord::new(TradeType::Buy, symbol.clone(), quantity, price);
        self.trades.push(trade.clone());

        info!("✅ Bought {} x{} @ {:.2}", symbol, quantity, price);

        self.outbox.send(SyncCommand::UpsertHolding { user_id: user.id, holding: holding.clone() });
        self.outbox.send(SyncCommand::UpsertCash { user_id: user.id, virtual_cash: self.virtual_cash });
        self.outbox.send(SyncCommand::AppendTrade { user_id: user.id, trade });

        Ok(holding)
    }

    /// Sell part or all of a holding. The average cost of what remains is
    /// unchanged.
    pub fn sell(
        &mut self,
        holding_id: Uuid,
        quantity: u32,
        sell_price: f64,
    ) -> Result<TradeRecord, LedgerError> {
        let user = self.session.require_user()?;

        if quantity == 0 {
            return Err(LedgerError::InvalidOrder("quantity must be positive".into()));
        }
        if !sell_price.is_finite() || sell_price < 0.0 {
            return Err(LedgerError::InvalidOrder(format!("invalid price {}", sell_price)));
        }

        let Some(idx) = self.holdings.iter().position(|h| h.id == holding_id) else {
            warn!("⚠️ Sell rejected, no holding {}", holding_id);
            return Err(LedgerError::InsufficientShares { requested: quantity, held: 0 });
        };

        let held = self.holdings[idx].quantity;
        if held < quantity {
            warn!("⚠️ Insufficient quantity to sell: requested {}, held {}", quantity, held);
            return Err(LedgerError::InsufficientShares { requested: quantity, held });
        }

        let proceeds = sell_price * quantity as f64;
        let remaining = held - quantity;
        let symbol = self.holdings[idx].symbol.clone();

        let holding_command = if remaining == 0 {
            self.holdings.remove(idx);
            SyncCommand::DeleteHolding { user_id: user.id, symbol: symbol.clone() }
        } else {
            let holding = &mut self.holdings[idx];
            holding.quantity = remaining;
            SyncCommand::UpsertHolding { user_id: user.id, holding: holding.clone() }
        };
        self.virtual_cash += proceeds;

        let trade = TradeRecord::new(TradeType::Sell, symbol, quantity, sell_price);
        self.trades.push(trade.clone());

        info!("✅ Sold {} shares for ${:.2}", quantity, proceeds);

        self.outbox.send(holding_command);
        self.outbox.send(SyncCommand::UpsertCash { user_id: user.id, virtual_cash: self.virtual_cash });
        self.outbox.send(SyncCommand::AppendTrade { user_id: user.id, trade: trade.clone() });

        Ok(trade)
    }

    /// Overwrite `current_price` for the listed symbols. Zero, negative and
    /// non-finite prices mean "no data" and are skipped. Not synced.
    pub fn update_current_prices(&mut self, prices: &HashMap<String, f64>) -> usize {
        let mut updated = 0;
        for holding in self.holdings.iter_mut() {
            match prices.get(&holding.symbol) {
                Some(price) if price.is_finite() && *price > 0.0 => {
                    holding.current_price = Some(*price);
                    updated += 1;
                }
                Some(price) => debug!("Ignoring price {} for {}", price, holding.symbol),
                None => {}
            }
        }
        updated
    }

    pub fn cost_basis(&self) -> f64 {
        self.holdings.iter().map(Holding::cost_basis).sum()
    }

    /// Cash plus the marked value of every holding.
    pub fn portfolio_value(&self) -> f64 {
        self.virtual_cash + self.holdings.iter().map(Holding::market_value).sum::<f64>()
    }

    pub fn total_profit(&self) -> f64 {
        self.holdings.iter().map(Holding::profit).sum()
    }

    pub fn clear_portfolio(&mut self) -> Result<(), LedgerError> {
        let user = self.session.require_user()?;

        self.holdings.clear();
        self.virtual_cash = STARTING_CASH;
        info!("🧹 Portfolio reset to ${:.2}", STARTING_CASH);

        self.outbox.send(SyncCommand::ClearHoldings { user_id: user.id });
        self.outbox.send(SyncCommand::UpsertCash { user_id: user.id, virtual_cash: self.virtual_cash });
        Ok(())
    }

    /// Swap in state loaded from the cloud or the local cache. Trades are
    /// kept in execution order. Nothing is synced.
    pub fn replace_state(&mut self, holdings: Vec<Holding>, virtual_cash: f64, mut trades: Vec<TradeRecord>) {
        trades.sort_by_key(|t| t.executed_at);
        self.holdings = holdings;
        self.virtual_cash = virtual_cash;
        self.trades = trades;
    }

    /// Ledger half of an [`AccountSnapshot`]; chat history is left empty.
    pub fn snapshot(&self, stocks: Vec<String>) -> AccountSnapshot {
        AccountSnapshot {
            holdings: self.holdings.clone(),
            virtual_cash: self.virtual_cash,
            stocks,
            trades: self.trades.clone(),
            chat_history: Vec::new(),
        }
    }

    /// Plain-text account summary handed to the chat model.
    pub fn portfolio_summary(&self) -> String {
        if self.holdings.is_empty() {
            return "Portfolio is empty. No holdings to analyze.".to_string();
        }

        let usd = Currency::Usd;
        let mut summary = String::from("📊 Portfolio Analysis\n\n");
        let _ = writeln!(summary, "Total Portfolio Value: {}", format_price(self.portfolio_value(), usd));
        let _ = writeln!(summary, "Cash Available: {}", format_price(self.virtual_cash, usd));
        let _ = writeln!(summary, "Total Profit/Loss: {}\n", format_signed(self.total_profit(), usd));
        let _ = writeln!(summary, "Holdings ({} stocks):\n", self.holdings.len());

        for (index, h) in self.holdings.iter().enumerate() {
            let currency = detect_currency(&h.symbol);
            let _ = writeln!(summary, "{}. {} ({})", index + 1, h.symbol, h.company_name);
            let _ = writeln!(summary, "   - Quantity: {} shares", h.quantity);
            let _ = writeln!(summary, "   - Avg Buy Price: {}", format_price(h.buy_price, currency));
            let _ = writeln!(summary, "   - Current Price: {}", format_price(h.mark_price(), currency));
            let _ = writeln!(summary, "   - Total Value: {}", format_price(h.market_value(), currency));
            let _ = writeln!(
                summary,
                "   - Profit/Loss: {} ({:.2}%)\n",
                format_signed(h.profit(), currency),
                h.profit_percent()
            );
        }

        summary
    }
}
