//! Chat command table and reply dispatch.

use std::collections::HashMap;

use crate::activity::LogBuffer;
use crate::config::CommandsConfig;
use crate::session::{InboundMessage, SessionHandle};

pub const GREETING_REPLY: &str = "Hello, how I may help you?";
pub const STATUS_REPLY: &str = "🟢 Bot online e funcionando!";

const HELP_REPLY: &str = "🤖 *Comandos disponíveis:*

• Hello - Receber saudação
• /help - Ver esta ajuda
• /status - Status do bot
• /web - Link do painel web";

/// Maps message text to a canned reply.
///
/// Exact entries match the whole body case-sensitively; the rest match
/// after lower-casing the body.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    exact: HashMap<String, String>,
    case_insensitive: HashMap<String, String>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock table: `Hello`, `/help`, `/status`, `/web`.
    pub fn standard(panel_url: &str) -> Self {
        let mut table = Self::new();
        table.insert_exact("Hello", GREETING_REPLY);
        table.insert_command("/help", HELP_REPLY);
        table.insert_command("/status", STATUS_REPLY);
        table.insert_command("/web", format!("🌐 Acesse o painel: {}", panel_url));
        table
    }

    pub fn from_config(config: &CommandsConfig) -> Self {
        let mut table = Self::standard(&config.panel_url);
        for (command, reply) in &config.extra {
            table.insert_command(command, reply.clone());
        }
        table
    }

    pub fn insert_exact(&mut self, text: impl Into<String>, reply: impl Into<String>) {
        self.exact.insert(text.into(), reply.into());
    }

    pub fn insert_command(&mut self, command: &str, reply: impl Into<String>) {
        self.case_insensitive
            .insert(command.to_lowercase(), reply.into());
    }

    pub fn lookup(&self, body: &str) -> Option<&str> {
        if let Some(reply) = self.exact.get(body) {
            return Some(reply);
        }
        self.case_insensitive
            .get(&body.to_lowercase())
            .map(String::as_str)
    }
}

/// Turns inbound messages into at most one reply each.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    table: CommandTable,
}

impl CommandDispatcher {
    pub fn new(table: CommandTable) -> Self {
        Self { table }
    }

    pub fn handle(&self, message: &InboundMessage) -> Option<String> {
        self.table.lookup(&message.body).map(str::to_string)
    }

    /// Log `message`, and send its reply (if any) through `session`.
    ///
    /// One send attempt; failures are logged and otherwise dropped.
    pub async fn dispatch(
        &self,
        message: &InboundMessage,
        session: &dyn SessionHandle,
        log: &LogBuffer,
    ) -> Option<String> {
        log.append(format!("📨 Message from {}: {}", message.from, message.body));

        let reply = self.handle(message)?;
        match session.send_text(&message.from, &reply).await {
            Ok(receipt) => {
                log.append(format!(
                    "✅ Reply sent to {} ({})",
                    message.from, receipt.id
                ));
                Some(receipt.id)
            }
            Err(err) => {
                log.append(format!("❌ Failed to reply to {}: {}", message.from, err));
                None
            }
        }
    }
}
