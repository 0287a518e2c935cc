pub mod finnhub;
pub mod gemini;
pub mod market_gateway;
pub mod multi_provider;
pub mod rapidapi;
