use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::GatewayError;
use crate::external::market_gateway::AiCompletion;
use crate::models::{AiResponse, ChatMessage, ChatRole, StockContext, FINANCIAL_DISCLAIMER};
use crate::services::session_service::SessionGate;
use crate::services::sync_service::{SyncCommand, SyncOutbox};
use crate::utils::currency::{detect_currency, format_price};
use crate::utils::parse::{first_present, first_text, parse_number, parse_number_opt};

pub const AI_SYSTEM_PROMPT: &str = "You are an AI stock assistant that provides educational analysis and insights about stocks and financial markets.

Your role is to:
1. Analyze stock data and provide educational insights
2. Explain market trends and movements in simple terms
3. Help users understand financial concepts
4. Provide balanced analysis including both opportunities and risks
5. Always include appropriate disclaimers about financial advice

Key guidelines:
- Always be educational and informative, never give direct buy/sell advice
- Include both positive and negative aspects in your analysis
- Reference specific data points when available (price, volume, market cap, etc.)
- Explain financial terms for beginners
- Be conversational but professional
- Keep responses concise and actionable
- Focus on data-driven insights rather than speculation

Remember: You're an educational tool, not a financial advisor.";

const SUMMARY_CHARS: usize = 300;
const MAX_SUGGESTIONS: usize = 3;

/// Build a [`StockContext`] from loosely-shaped quote and profile payloads.
///
/// Accepts both the screener shape (`lastsale`, `netchange`, `pctchange` as
/// display strings) and the quote shape (`regularMarket*` numbers).
pub fn format_stock_for_ai(quote: &Value, profile: Option<&Value>) -> StockContext {
    let number = |keys: &[&str]| first_present(quote, keys).map(parse_number).unwrap_or(0.0);
    let quote_symbol = first_text(quote, &["symbol"]);
    let from_profile = |keys: &[&str]| profile.and_then(|p| first_text(p, keys));

    let company_name = first_text(quote, &["name", "longName", "shortName"])
        .or_else(|| from_profile(&["longName", "shortName"]))
        .or_else(|| quote_symbol.clone())
        .unwrap_or_else(|| "Unknown Company".to_string());

    let market_cap = first_present(quote, &["marketCap"])
        .or_else(|| profile.and_then(|p| first_present(p, &["marketCap"])))
        .and_then(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            other => parse_number_opt(other).map(compact_number),
        });

    let summary = from_profile(&["longBusinessSummary"])
        .map(|s| format!("{}...", s.chars().take(SUMMARY_CHARS).collect::<String>()));

    StockContext {
        symbol: quote_symbol.unwrap_or_else(|| "UNKNOWN".to_string()),
        current_price: number(&["lastsale", "regularMarketPrice"]),
        change: number(&["netchange", "regularMarketChange"]),
        percent_change: number(&["pctchange", "regularMarketChangePercent"]),
        company_name,
        sector: from_profile(&["sector"]).unwrap_or_else(|| "N/A".to_string()),
        industry: from_profile(&["industry"]).unwrap_or_else(|| "N/A".to_string()),
        volume: first_present(quote, &["volume", "regularMarketVolume"]).and_then(parse_number_opt),
        market_cap,
        summary,
    }
}

fn compact_number(n: f64) -> String {
    let abs = n.abs();
    if abs >= 1e12 {
        format!("{:.2}T", n / 1e12)
    } else if abs >= 1e9 {
        format!("{:.2}B", n / 1e9)
    } else if abs >= 1e6 {
        format!("{:.2}M", n / 1e6)
    } else {
        format!("{:.0}", n)
    }
}

fn group_thousands(n: f64) -> String {
    let digits = format!("{:.0}", n.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0.0 {
        out.insert(0, '-');
    }
    out
}

fn signed(n: f64) -> String {
    if n >= 0.0 {
        format!("+{:.2}", n)
    } else {
        format!("{:.2}", n)
    }
}

fn context_block(ctx: &StockContext) -> String {
    let currency = detect_currency(&ctx.symbol);
    let mut block = String::from("Current Stock Context:\n\n");
    let _ = writeln!(block, "- Symbol: {}", ctx.symbol);
    let _ = writeln!(block, "- Current Price: {}", format_price(ctx.current_price, currency));
    let _ = writeln!(block, "- Change: {} ({}%)", signed(ctx.change), signed(ctx.percent_change));
    let _ = writeln!(block, "- Company: {}", ctx.company_name);
    let _ = writeln!(block, "- Sector: {}", ctx.sector);
    let _ = writeln!(block, "- Industry: {}", ctx.industry);
    let _ = writeln!(block, "- Market Cap: {}", ctx.market_cap.as_deref().unwrap_or("N/A"));
    let _ = writeln!(
        block,
        "- Volume: {}",
        ctx.volume.map(group_thousands).unwrap_or_else(|| "N/A".to_string())
    );
    if let Some(summary) = &ctx.summary {
        let _ = writeln!(block, "- Summary: {}", summary);
    }
    block.push_str("\nPlease analyze this stock data and answer the user's question.\n");
    block
}

/// Assemble the single-turn prompt sent to the completion model.
pub fn build_prompt(
    system_prompt: &str,
    history: &[ChatMessage],
    context: Option<&StockContext>,
    portfolio: Option<&str>,
    user_message: &str,
) -> String {
    let mut prompt = format!("{}\n\n", system_prompt);

    for msg in history {
        let _ = write!(prompt, "{}: {}\n\n", msg.role.label(), msg.content);
    }

    if let Some(ctx) = context {
        prompt.push_str(&context_block(ctx));
        prompt.push('\n');
    }

    if let Some(summary) = portfolio {
        let _ = write!(prompt, "Current Portfolio:\n\n{}\n", summary.trim_end());
        prompt.push_str("Use this portfolio data when the question is about the user's holdings.\n\n");
    }

    let _ = write!(prompt, "User: {}\n\nAssistant:", user_message);
    prompt
}

/// Up to three follow-up prompts for the UI.
pub fn extract_suggestions(reply: &str, context: Option<&StockContext>) -> Vec<String> {
    let mut suggestions = match context {
        Some(ctx) => vec![
            format!("Tell me more about {}", ctx.symbol),
            format!("What's the market sentiment for {}?", ctx.symbol),
            format!("Compare {} with competitors", ctx.symbol),
            format!("Explain the recent price movement for {}", ctx.symbol),
        ],
        None => vec![
            "Analyze my portfolio".to_string(),
            "What are the trending stocks today?".to_string(),
            "Explain market trends".to_string(),
        ],
    };

    let lower = reply.to_lowercase();
    if lower.contains("risk") {
        suggestions.push("What are the risks for this stock?".to_string());
    }
    if lower.contains("technical") {
        suggestions.push("Show me technical analysis".to_string());
    }

    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

/// User-facing text shown instead of a model reply.
pub fn fallback_message(err: &GatewayError) -> String {
    let reason = match err {
        GatewayError::QuotaExceeded | GatewayError::RateLimited => {
            "I've reached the daily limit. Please try again later or upgrade to a paid plan for unlimited access."
        }
        GatewayError::Unauthorized => "There's an authentication error. Please check your API key.",
        GatewayError::NotFound(_) => "AI model temporarily unavailable. Please try again.",
        GatewayError::Overloaded => "All AI models are currently busy. Please try again in a few moments.",
        GatewayError::NotConfigured(_) => "The AI assistant is not configured on this server.",
        _ => "I'm having trouble connecting to the AI service right now. Please try again later.",
    };
    format!(
        "{}\n\nIn the meantime, you can:\n• Browse stock details and charts\n• Check your portfolio\n• Review your watchlist",
        reason
    )
}

fn fallback_suggestions() -> Vec<String> {
    vec![
        "Check stock prices manually".to_string(),
        "Review your watchlist".to_string(),
        "Try again in a few minutes".to_string(),
    ]
}

#[derive(Debug, Default)]
struct ChatLog {
    messages: Vec<ChatMessage>,
    context: Option<StockContext>,
}

/// Conversation with the completion model. Cheap to clone; clones share
/// the same log.
///
/// While a user is signed in, every recorded message and every clear is
/// mirrored to the cloud through the sync outbox. Anonymous chat stays local.
#[derive(Clone)]
pub struct ChatSession {
    log: Arc<Mutex<ChatLog>>,
    ai: Arc<dyn AiCompletion>,
    session: SessionGate,
    outbox: SyncOutbox,
}

impl ChatSession {
    pub fn new(ai: Arc<dyn AiCompletion>) -> Self {
        Self {
            log: Arc::new(Mutex::new(ChatLog::default())),
            ai,
            session: SessionGate::new(),
            outbox: SyncOutbox::disabled(),
        }
    }

    /// Mirror the conversation for whoever is signed in on `session`.
    pub fn with_sync(mut self, session: SessionGate, outbox: SyncOutbox) -> Self {
        self.session = session;
        self.outbox = outbox;
        self
    }

    fn record(&self, log: &mut ChatLog, message: ChatMessage) {
        if let Some(user) = self.session.current_user() {
            self.outbox.send(SyncCommand::AppendChatMessage { user_id: user.id, message: message.clone() });
        }
        log.messages.push(message);
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.log.lock().messages.clone()
    }

    pub fn context(&self) -> Option<StockContext> {
        self.log.lock().context.clone()
    }

    pub fn set_context(&self, context: StockContext) {
        info!("📊 Setting stock context: {}", context.symbol);
        self.log.lock().context = Some(context);
    }

    pub fn clear_context(&self) {
        self.log.lock().context = None;
    }

    pub fn clear_messages(&self) {
        info!("🗑️ Clearing all messages");
        self.log.lock().messages.clear();
        if let Some(user) = self.session.current_user() {
            self.outbox.send(SyncCommand::ClearChatHistory { user_id: user.id });
        }
    }

    /// Swap in history loaded from storage. Nothing is synced.
    pub fn replace_messages(&self, messages: Vec<ChatMessage>) {
        let mut log = self.log.lock();
        log.messages = messages;
        log.context = None;
    }

    /// Record the user's turn, ask the model and record its reply. Gateway
    /// failures become a canned reply flagged `degraded`.
    pub async fn send_message(&self, content: &str, portfolio: Option<String>) -> AiResponse {
        let (history, context) = {
            let mut log = self.log.lock();
            let history = log.messages.clone();
            self.record(&mut log, ChatMessage::new(ChatRole::User, content));
            (history, log.context.clone())
        };

        let prompt = build_prompt(
            AI_SYSTEM_PROMPT,
            &history,
            context.as_ref(),
            portfolio.as_deref(),
            content,
        );

        let response = match self.ai.complete(&prompt).await {
            Ok(reply) => AiResponse {
                suggestions: extract_suggestions(&reply, context.as_ref()),
                message: format!("{}\n\n{}", reply.trim_end(), FINANCIAL_DISCLAIMER),
                related_stocks: context.iter().map(|c| c.symbol.clone()).collect(),
                degraded: false,
            },
            Err(err) => {
                warn!("⚠️ AI completion failed: {}", err);
                AiResponse {
                    message: fallback_message(&err),
                    suggestions: fallback_suggestions(),
                    related_stocks: Vec::new(),
                    degraded: true,
                }
            }
        };

        self.record(
            &mut self.log.lock(),
            ChatMessage::new(ChatRole::Assistant, response.message.clone()),
        );

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl AiCompletion for Echo {
        async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
            Ok(format!("prompt had {} chars; consider the risk", prompt.len()))
        }
    }

    struct Down(GatewayError);

    #[async_trait]
    impl AiCompletion for Down {
        async fn complete(&self, _prompt: &str) -> Result<String, GatewayError> {
            Err(self.0.clone())
        }
    }

    #[test]
    fn test_format_screener_shape() {
        let ctx = format_stock_for_ai(
            &json!({"symbol": "AAPL", "name": "Apple Inc. Common Stock", "lastsale": "$190.50",
                    "netchange": "-1.25", "pctchange": "-0.65%", "marketCap": "2,950,000,000,000"}),
            Some(&json!({"sector": "Technology", "industry": "Consumer Electronics"})),
        );
        assert_eq!(ctx.symbol, "AAPL");
        assert_eq!(ctx.current_price, 190.5);
        assert_eq!(ctx.change, -1.25);
        assert_eq!(ctx.percent_change, -0.65);
        assert_eq!(ctx.company_name, "Apple Inc. Common Stock");
        assert_eq!(ctx.sector, "Technology");
        assert_eq!(ctx.market_cap.as_deref(), Some("2,950,000,000,000"));
    }

    #[test]
    fn test_format_quote_shape_and_defaults() {
        let ctx = format_stock_for_ai(
            &json!({"symbol": "MSFT", "regularMarketPrice": 410.0, "regularMarketVolume": 1200000,
                    "marketCap": 3.05e12}),
            Some(&json!({"longName": "Microsoft Corporation", "longBusinessSummary": "x".repeat(400)})),
        );
        assert_eq!(ctx.company_name, "Microsoft Corporation");
        assert_eq!(ctx.sector, "N/A");
        assert_eq!(ctx.volume, Some(1_200_000.0));
        assert_eq!(ctx.market_cap.as_deref(), Some("3.05T"));
        let summary = ctx.summary.unwrap();
        assert_eq!(summary.len(), 303);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_format_empty_payload() {
        let ctx = format_stock_for_ai(&json!({"lastsale": "N/A"}), None);
        assert_eq!(ctx.symbol, "UNKNOWN");
        assert_eq!(ctx.company_name, "Unknown Company");
        assert_eq!(ctx.current_price, 0.0);
        assert!(ctx.summary.is_none());
    }

    #[test]
    fn test_build_prompt_layout() {
        let history = vec![
            ChatMessage::new(ChatRole::User, "hi"),
            ChatMessage::new(ChatRole::Assistant, "hello"),
        ];
        let ctx = format_stock_for_ai(&json!({"symbol": "AAPL", "regularMarketPrice": 10,
                                              "regularMarketVolume": 1234567}), None);
        let prompt = build_prompt("SYS", &history, Some(&ctx), Some("Portfolio is empty."), "Why?");

        assert!(prompt.starts_with("SYS\n\nUser: hi\n\nAssistant: hello\n\n"));
        assert!(prompt.contains("- Current Price: $10.00\n"));
        assert!(prompt.contains("- Change: +0.00 (+0.00%)\n"));
        assert!(prompt.contains("- Volume: 1,234,567\n"));
        assert!(prompt.contains("Current Portfolio:\n\nPortfolio is empty.\n"));
        assert!(prompt.ends_with("User: Why?\n\nAssistant:"));
    }

    #[test]
    fn test_suggestions_capped_at_three() {
        let ctx = format_stock_for_ai(&json!({"symbol": "TSLA"}), None);
        let with_ctx = extract_suggestions("high risk, technical breakout", Some(&ctx));
        assert_eq!(with_ctx.len(), 3);
        assert_eq!(with_ctx[0], "Tell me more about TSLA");

        let general = extract_suggestions("nothing special", None);
        assert_eq!(general, vec!["Analyze my portfolio", "What are the trending stocks today?", "Explain market trends"]);
    }

    #[test]
    fn test_fallback_messages() {
        assert!(fallback_message(&GatewayError::QuotaExceeded).starts_with("I've reached the daily limit."));
        assert!(fallback_message(&GatewayError::Overloaded).starts_with("All AI models are currently busy."));
        assert!(fallback_message(&GatewayError::Network("x".into())).contains("• Review your watchlist"));
    }

    #[tokio::test]
    async fn test_send_message_appends_disclaimer_and_logs_turns() {
        let chat = ChatSession::new(Arc::new(Echo));
        chat.set_context(format_stock_for_ai(&json!({"symbol": "NVDA"}), None));

        let response = chat.send_message("How is NVDA doing?", None).await;
        assert!(!response.degraded);
        assert!(response.message.ends_with(FINANCIAL_DISCLAIMER));
        assert_eq!(response.related_stocks, vec!["NVDA".to_string()]);

        let messages = chat.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[1].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn test_send_message_degrades_on_gateway_error() {
        let chat = ChatSession::new(Arc::new(Down(GatewayError::QuotaExceeded)));
        let response = chat.send_message("hello", None).await;
        assert!(response.degraded);
        assert!(!response.message.contains(FINANCIAL_DISCLAIMER));
        assert_eq!(response.suggestions.len(), 3);
        assert_eq!(chat.messages().len(), 2);

        chat.clear_messages();
        assert!(chat.messages().is_empty());
    }

    #[tokio::test]
    async fn test_signed_in_chat_is_mirrored() {
        let session = SessionGate::new();
        let (outbox, mut rx) = SyncOutbox::channel();
        let chat = ChatSession::new(Arc::new(Echo)).with_sync(session.clone(), outbox);

        chat.send_message("anonymous question", None).await;
        assert!(rx.try_recv().is_err());

        let user = crate::models::User { id: uuid::Uuid::new_v4(), email: "trader@example.com".into() };
        session.sign_in(user.clone());
        chat.send_message("What is a P/E ratio?", None).await;

        let mut roles = Vec::new();
        while let Ok(SyncCommand::AppendChatMessage { user_id, message }) = rx.try_recv() {
            assert_eq!(user_id, user.id);
            roles.push(message.role);
        }
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant]);

        chat.clear_messages();
        assert_eq!(rx.try_recv().unwrap(), SyncCommand::ClearChatHistory { user_id: user.id });

        chat.replace_messages(vec![ChatMessage::new(ChatRole::User, "restored")]);
        assert_eq!(chat.messages().len(), 1);
        assert!(rx.try_recv().is_err());
    }
}
