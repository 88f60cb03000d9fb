//! Error types shared by the chat core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The profile form was submitted without a Groq API key.
    #[error("API key is required to proceed")]
    MissingCredential,

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("message is empty")]
    EmptyMessage,

    /// A reply or a playback is already in flight for this session.
    #[error("still working on your last request, please try again in a moment")]
    Busy,

    #[error("could not get a reply: {0}")]
    Generation(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("no assistant turn at index {0}")]
    NoSuchTurn(usize),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Whether the user can simply try the same action again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Generation(_))
    }
}
