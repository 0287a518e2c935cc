pub mod chat;
pub mod holding;
pub mod market;
pub mod session;
pub mod snapshot;

pub use chat::{AiResponse, ChatMessage, ChatRequest, ChatRole, StockContext, FINANCIAL_DISCLAIMER};
pub use holding::{Holding, TradeRecord, TradeType};
pub use market::{CompanyProfile, HistoryPoint, NewsArticle, Quote, SearchResult, HISTORY_INTERVALS};
pub use session::{SessionResponse, SignInRequest, User};
pub use snapshot::{AccountSnapshot, STARTING_CASH};
