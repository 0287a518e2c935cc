use serde::Serialize;

const INDIAN_EXCHANGE_SUFFIXES: [&str; 4] = [".NS", ".BO", ".BSE", ".NSE"];

const INDIAN_STOCKS: [&str; 31] = [
    "IRCTC", "TCS", "INFY", "RELIANCE", "HDFCBANK", "ICICIBANK",
    "SBIN", "BHARTIARTL", "ITC", "HINDUNILVR", "KOTAKBANK",
    "LT", "ASIANPAINT", "AXISBANK", "BAJFINANCE", "WIPRO",
    "MARUTI", "TITAN", "SUNPHARMA", "ULTRACEMCO", "NESTLEIND",
    "TATAMOTORS", "TATASTEEL", "TECHM", "INDUSINDBK", "POWERGRID",
    "NTPC", "ONGC", "COALINDIA", "GRASIM", "DRREDDY",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "INR")]
    Inr,
}

impl Currency {
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Usd => "$",
            Currency::Inr => "₹",
        }
    }
}

/// Infer the quote currency from the ticker: Indian exchange suffixes or
/// well-known NSE names trade in rupees, everything else in dollars.
pub fn detect_currency(symbol: &str) -> Currency {
    let upper = symbol.trim().to_uppercase();
    if upper.is_empty() {
        return Currency::Usd;
    }

    if INDIAN_EXCHANGE_SUFFIXES.iter().any(|s| upper.ends_with(s)) {
        return Currency::Inr;
    }

    let base = upper.split('.').next().unwrap_or_default();
    if INDIAN_STOCKS.contains(&base) {
        return Currency::Inr;
    }

    Currency::Usd
}

pub fn format_price(price: f64, currency: Currency) -> String {
    format!("{}{:.2}", currency.symbol(), price)
}

/// Signed amount, e.g. `+$12.30` or `-$4.00`.
pub fn format_signed(amount: f64, currency: Currency) -> String {
    let sign = if amount >= 0.0 { "+" } else { "-" };
    format!("{}{}{:.2}", sign, currency.symbol(), amount.abs())
}
