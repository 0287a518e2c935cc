pub mod chat;
pub mod health;
pub mod market;
pub mod news;
pub mod portfolio;
pub mod session;
pub mod watchlist;
