use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::CloudStore;
use crate::errors::SyncError;
use crate::models::{AccountSnapshot, ChatMessage, ChatRole, Holding, TradeRecord, TradeType};

/// Postgres-backed cloud mirror.
#[derive(Clone)]
pub struct PgCloudStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct HoldingRow {
    id: Uuid,
    symbol: String,
    company_name: String,
    quantity: i64,
    buy_price: f64,
    buy_date: DateTime<Utc>,
    current_price: Option<f64>,
}

impl From<HoldingRow> for Holding {
    fn from(row: HoldingRow) -> Self {
        Self {
            id: row.id,
            symbol: row.symbol,
            company_name: row.company_name,
            quantity: u32::try_from(row.quantity).unwrap_or(0),
            buy_price: row.buy_price,
            buy_date: row.buy_date,
            current_price: row.current_price,
        }
    }
}

#[derive(Debug, FromRow)]
struct TradeRow {
    id: Uuid,
    trade_type: String,
    symbol: String,
    quantity: i64,
    price: f64,
    executed_at: DateTime<Utc>,
}

impl TradeRow {
    fn into_trade(self) -> Option<TradeRecord> {
        Some(TradeRecord {
            id: self.id,
            trade_type: TradeType::parse(&self.trade_type)?,
            symbol: self.symbol,
            quantity: u32::try_from(self.quantity).ok()?,
            price: self.price,
            executed_at: self.executed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChatRow {
    id: Uuid,
    role: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl ChatRow {
    fn into_message(self) -> Option<ChatMessage> {
        Some(ChatMessage {
            id: self.id,
            role: ChatRole::parse(&self.role)?,
            content: self.content,
            timestamp: self.created_at,
        })
    }
}

impl PgCloudStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), SyncError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SyncError::Unavailable(format!("migration failed: {}", e)))
    }
}

#[async_trait]
impl CloudStore for PgCloudStore {
    async fn upsert_holding(&self, user_id: Uuid, holding: &Holding) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO holdings (id, user_id, symbol, company_name, quantity, buy_price, buy_date, current_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, symbol) DO UPDATE SET
                id = EXCLUDED.id,
                company_name = EXCLUDED.company_name,
                quantity = EXCLUDED.quantity,
                buy_price = EXCLUDED.buy_price,
                buy_date = EXCLUDED.buy_date,
                current_price = EXCLUDED.current_price,
                updated_at = NOW()
            "#,
        )
        .bind(holding.id)
        .bind(user_id)
        .bind(&holding.symbol)
        .bind(&holding.company_name)
        .bind(i64::from(holding.quantity))
        .bind(holding.buy_price)
        .bind(holding.buy_date)
        .bind(holding.current_price)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_holding(&self, user_id: Uuid, symbol: &str) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM holdings WHERE user_id = $1 AND symbol = $2")
            .bind(user_id)
            .bind(symbol)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all_holdings(&self, user_id: Uuid) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM holdings WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_cash(&self, user_id: Uuid, virtual_cash: f64) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO user_cash (user_id, virtual_cash)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                virtual_cash = EXCLUDED.virtual_cash,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(virtual_cash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_trade(&self, user_id: Uuid, trade: &TradeRecord) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO trades (id, user_id, trade_type, symbol, quantity, price, executed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(trade.id)
        .bind(user_id)
        .bind(trade.trade_type.as_str())
        .bind(&trade.symbol)
        .bind(i64::from(trade.quantity))
        .bind(trade.price)
        .bind(trade.executed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_watchlist_symbol(&self, user_id: Uuid, symbol: &str) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO watchlist (user_id, symbol) VALUES ($1, $2) ON CONFLICT (user_id, symbol) DO NOTHING",
        )
        .bind(user_id)
        .bind(symbol)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_watchlist_symbol(&self, user_id: Uuid, symbol: &str) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM watchlist WHERE user_id = $1 AND symbol = $2")
            .bind(user_id)
            .bind(symbol)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_chat_message(&self, user_id: Uuid, message: &ChatMessage) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, user_id, role, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(message.id)
        .bind(user_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_chat_history(&self, user_id: Uuid) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM chat_messages WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_account(&self, user_id: Uuid) -> Result<Option<AccountSnapshot>, SyncError> {
        let cash: Option<f64> = sqlx::query_scalar::<_, f64>("SELECT virtual_cash FROM user_cash WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(virtual_cash) = cash else {
            return Ok(None);
        };

        let holdings = sqlx::query_as::<_, HoldingRow>(
            r#"
            SELECT id, symbol, company_name, quantity, buy_price, buy_date, current_price
            FROM holdings
            WHERE user_id = $1 AND quantity > 0
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Holding::from)
        .collect();

        let stocks: Vec<String> = sqlx::query_scalar::<_, String>(
            "SELECT symbol FROM watchlist WHERE user_id = $1 ORDER BY seq ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let trades = sqlx::query_as::<_, TradeRow>(
            r#"
            SELECT id, trade_type, symbol, quantity, price, executed_at
            FROM trades
            WHERE user_id = $1
            ORDER BY executed_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .filter_map(TradeRow::into_trade)
        .collect();

        let chat_history = sqlx::query_as::<_, ChatRow>(
            r#"
            SELECT id, role, content, created_at
            FROM chat_messages
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .filter_map(ChatRow::into_message)
        .collect();

        Ok(Some(AccountSnapshot {
            holdings,
            virtual_cash,
            stocks,
            trades,
            chat_history,
        }))
    }
}
