//! AuraAssist: a supportive chat companion that replies through a hosted
//! LLM and can read its replies aloud.

pub mod constants;
pub mod error;
pub mod llm_interaction;
pub mod memory;
pub mod profile;
pub mod prompt;
pub mod sanitize;
pub mod session;
pub mod speech;
pub mod web_server;

use std::path::PathBuf;
use std::time::Duration;

pub use error::{ChatError, Result};
pub use session::{ChatSession, SessionSnapshot, TurnState};

/// Settings shared by every session a process starts.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: String,
    pub groq_url: String,
    pub tts_url: String,
    pub memory_window: usize,
    /// Instruction template override; the bundled one is used when unset.
    pub prompt_path: Option<PathBuf>,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
    /// How long an untouched web session is kept.
    pub session_ttl: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: constants::MODEL_NAME.clone(),
            groq_url: constants::GROQ_URL.clone(),
            tts_url: constants::TTS_URL.clone(),
            memory_window: constants::MEMORY_WINDOW,
            prompt_path: constants::PROMPT_PATH.clone().map(PathBuf::from),
            templates_dir: PathBuf::from(constants::TEMPLATES_DIR.as_str()),
            static_dir: PathBuf::from(constants::STATIC_DIR.as_str()),
            session_ttl: constants::SESSION_IDLE_TTL,
        }
    }
}
