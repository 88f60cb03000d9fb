//! Prompt assembly: instruction template + profile + memory replay + the new
//! message, turned into the request handed to the generation service.

use std::path::Path;

use minijinja::{context, Environment};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::memory::Exchange;
use crate::profile::UserProfile;

const TEMPLATE_NAME: &str = "system_prompt";
const BUNDLED_TEMPLATE: &str = include_str!("../prompts/system_prompt.txt");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A role-tagged message as sent to the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Everything the generation service gets for one turn. Built fresh per turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptRequest {
    /// Rendered instruction template.
    pub system: String,
    pub profile: String,
    pub history: Vec<Exchange>,
    pub message: String,
}

impl PromptRequest {
    /// System message, then each replayed exchange, then the new message.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() * 2 + 2);
        messages.push(ChatMessage::new(Role::System, self.system.as_str()));
        for exchange in &self.history {
            messages.push(ChatMessage::new(Role::User, exchange.user.as_str()));
            messages.push(ChatMessage::new(Role::Assistant, exchange.assistant.as_str()));
        }
        messages.push(ChatMessage::new(Role::User, self.message.as_str()));
        messages
    }
}

/// The instruction template, kept as data rather than code.
pub struct PromptTemplate {
    env: Environment<'static>,
}

impl PromptTemplate {
    /// The template shipped with the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_source(BUNDLED_TEMPLATE.to_string())
    }

    /// Load a template from disk, e.g. to try out a revised policy text.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        info!("Loaded instruction template from {}", path.display());
        Self::from_source(source)
    }

    /// Use `path` if given, otherwise the bundled template.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::bundled(),
        }
    }

    /// Parse the template up front so syntax errors surface at start-up.
    pub fn from_source(source: String) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME, source)?;
        Ok(Self { env })
    }

    fn render(&self, profile: &str, chat_history: &str, question: &str) -> Result<String> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        let rendered = template.render(context! {
            context => "",
            profile => profile,
            chat_history => chat_history,
            question => question,
        })?;
        Ok(rendered)
    }
}

/// Assemble the request for one turn. Same inputs, same request.
pub fn build(
    template: &PromptTemplate,
    profile: &UserProfile,
    history: &[Exchange],
    message: &str,
) -> Result<PromptRequest> {
    let profile = profile.snapshot();
    let chat_history = format_history(history);
    let system = template.render(&profile, &chat_history, message)?;

    debug!(pairs = history.len(), "Assembled prompt request");

    Ok(PromptRequest {
        system,
        profile,
        history: history.to_vec(),
        message: message.to_string(),
    })
}

fn format_history(history: &[Exchange]) -> String {
    history
        .iter()
        .map(|e| format!("User: {}\nAssistant: {}", e.user, e.assistant))
        .collect::<Vec<_>>()
        .join("\n")
}
