pub mod chat_service;
pub mod failure_cache;
pub mod job_scheduler_service;
pub mod ledger_service;
pub mod local_store;
pub mod market_service;
pub mod quote_refresh_service;
pub mod rate_limiter;
pub mod session_service;
pub mod sync_service;
pub mod watchlist_service;
