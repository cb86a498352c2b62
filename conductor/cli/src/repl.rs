//! Terminal REPL pieces
//!
//! Input parsing and feed rendering for the terminal chat. Both are pure so
//! the main loop only moves strings between stdin, the Conductor and stdout.

use std::collections::HashMap;
use std::fmt::Write as _;

use neura_conductor::{
    ConductorMessage, ConversationStore, MessageId, MessageRole, MessageUpdate, MODEL_CATALOG,
};

/// What the user typed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Text to send to the model
    Chat(String),
    /// A slash command
    Command(Command),
    /// Blank line
    Empty,
}

/// Slash commands
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `/regen [id]`: regenerate the given or the last answer
    Regenerate(Option<MessageId>),
    /// `/clear`: start a new conversation
    Clear,
    /// `/model [name]`: show or switch the model
    Model(Option<String>),
    /// `/models`: list the catalog
    Models,
    /// `/history`: print the conversation with message ids
    History,
    /// `/help`
    Help,
    /// `/quit`
    Quit,
    /// Anything else starting with `/`
    Unknown(String),
}

impl Input {
    /// Classify one line of user input
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Chat(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };

        let command = match name {
            "regen" | "regenerate" | "retry" => match arg {
                None => Command::Regenerate(None),
                Some(id) => match id.parse() {
                    Ok(id) => Command::Regenerate(Some(id)),
                    Err(_) => Command::Unknown(line.to_string()),
                },
            },
            "clear" | "new" => Command::Clear,
            "model" => Command::Model(arg.map(str::to_string)),
            "models" => Command::Models,
            "history" => Command::History,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        };
        Self::Command(command)
    }
}

/// Welcome text shown at startup
pub fn banner(model: &str) -> String {
    format!(
        "Hello, I'm Neura\nAsk me anything.\n\nModel: {model}\nType /help for commands.\n\n"
    )
}

/// Command reference
pub fn help() -> String {
    "\
Commands:
  /regen [id]   regenerate the last (or the given) answer
  /clear        start a new conversation
  /model [name] show or switch the model
  /models       list available models
  /history      show the conversation with message ids
  /quit         leave
"
    .to_string()
}

/// Catalog listing with the current model marked
pub fn models(current: &str) -> String {
    let mut out = String::new();
    for model in MODEL_CATALOG {
        let marker = if model.id == current { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "{marker} {:<15} {:<38} {}",
            model.name, model.id, model.description
        );
    }
    out
}

/// Conversation listing with message ids
pub fn history(store: &ConversationStore) -> String {
    let mut out = String::new();
    for msg in store.messages() {
        let who = match msg.role {
            MessageRole::User => "you",
            MessageRole::Assistant => "neura",
        };
        let first_line = msg.content.lines().next().unwrap_or("");
        let _ = writeln!(
            out,
            "[{}] {} {who}: {first_line}",
            msg.id,
            msg.created_at.format("%H:%M:%S")
        );
    }
    if out.is_empty() {
        out.push_str("(empty conversation)\n");
    }
    out
}

/// Turns the Conductor feed into terminal output
///
/// A terminal cannot rewrite what it printed, so for every message only the
/// part beyond what was already shown is printed.
#[derive(Debug, Default)]
pub struct Renderer {
    /// Bytes of content already printed, per message
    shown: HashMap<MessageId, usize>,
}

impl Renderer {
    /// Create a renderer with nothing shown
    pub fn new() -> Self {
        Self::default()
    }

    /// Output for one feed message, if any
    pub fn render(&mut self, msg: &ConductorMessage) -> Option<String> {
        match msg {
            ConductorMessage::Update(update) => self.render_update(update),
            ConductorMessage::Removed { message_id } => match self.shown.remove(message_id) {
                Some(n) if n > 0 => Some("\n[response discarded]\n".to_string()),
                _ => None,
            },
            ConductorMessage::Cleared => {
                self.shown.clear();
                Some("(new conversation)\n".to_string())
            }
            ConductorMessage::State { .. } => None,
        }
    }

    fn render_update(&mut self, update: &MessageUpdate) -> Option<String> {
        // The user's own text is already on screen
        if update.role == MessageRole::User {
            return None;
        }

        let shown = self.shown.entry(update.message_id).or_insert(0);
        let mut out = String::new();
        if *shown == 0 && (!update.content.is_empty() || update.is_final()) {
            out.push_str("neura: ");
        }
        if let Some(suffix) = update.content.get(*shown..) {
            out.push_str(suffix);
            *shown = update.content.len();
        }
        if update.is_final() {
            self.shown.remove(&update.message_id);
            out.push_str("\n\n");
        } else if update.content.is_empty() {
            // Placeholder; remember it without printing
            return None;
        } else if *shown == 0 {
            return None;
        }

        (!out.is_empty()).then_some(out)
    }
}
