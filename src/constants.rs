// Runtime constants, overridable from the environment (or a .env file).

use std::env;
use std::time::Duration;

/// Sampling temperature sent with every generation request.
pub const TEMPERATURE: f32 = 0.7;
/// Number of user/assistant exchanges replayed into each prompt.
pub const MEMORY_WINDOW: usize = 6;
/// Hard cap on the characters handed to speech synthesis.
pub const SPEECH_CHAR_LIMIT: usize = 500;
pub const SPEECH_LANGUAGE: &str = "en";
/// The translate TTS endpoint rejects longer `q` values.
pub const SPEECH_CHUNK_CHARS: usize = 100;
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(60);
pub const SPEECH_TIMEOUT: Duration = Duration::from_secs(30);

pub const MIN_AGE: u8 = 10;
pub const MAX_AGE: u8 = 100;
pub const DEFAULT_AGE: u8 = 25;

pub const DEFAULT_PORT: u16 = 8501;
/// Web sessions untouched for this long are dropped along with their audio.
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

lazy_static::lazy_static! {
    pub static ref MODEL_NAME: String = env::var("AURA_MODEL").unwrap_or_else(|_| "openai/gpt-oss-120b".to_string());
    pub static ref GROQ_URL: String = env::var("AURA_GROQ_URL").unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string());
    pub static ref TTS_URL: String = env::var("AURA_TTS_URL").unwrap_or_else(|_| "https://translate.google.com".to_string());
    pub static ref PROMPT_PATH: Option<String> = env::var("AURA_PROMPT_PATH").ok().filter(|p| !p.trim().is_empty());
    pub static ref TEMPLATES_DIR: String = env::var("AURA_TEMPLATES_DIR").unwrap_or_else(|_| "templates".to_string());
    pub static ref STATIC_DIR: String = env::var("AURA_STATIC_DIR").unwrap_or_else(|_| "static".to_string());
}
