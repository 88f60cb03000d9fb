//! Turn-taking for one chat session.
//!
//! A session owns everything that used to be ambient page state: the
//! profile, the rolling memory, the transcript and rendered audio. Each
//! operation returns a [`SessionSnapshot`] for the presentation layer to
//! draw.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::{ChatError, Result};
use crate::llm_interaction::{Generator, GroqClient};
use crate::memory::ConversationMemory;
use crate::profile::{ProfileForm, UserProfile};
use crate::prompt::{self, PromptTemplate, Role};
use crate::speech::{GoogleTts, Playback, SpeechRenderer};
use crate::ChatConfig;

/// One transcript entry. Never modified after it is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    role: Role,
    content: String,
    timestamp: String,
}

impl Turn {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Local::now().format("%H:%M:%S").to_string(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TurnState {
    #[default]
    AwaitingInput,
    Generating,
    Rendering,
}

/// What the presentation layer needs to redraw the chat screen.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub state: TurnState,
    pub greeting: String,
    pub transcript: Vec<Turn>,
    pub memory_pairs: usize,
    /// Last non-fatal problem to show the user, if any.
    pub notice: Option<String>,
}

pub struct ChatSession {
    profile: UserProfile,
    template: Arc<PromptTemplate>,
    generator: Arc<dyn Generator>,
    speech: SpeechRenderer,
    memory: ConversationMemory,
    transcript: Vec<Turn>,
    state: TurnState,
    notice: Option<String>,
    audio: HashMap<usize, Playback>,
    published: watch::Sender<SessionSnapshot>,
}

impl ChatSession {
    pub fn new(
        profile: UserProfile,
        template: Arc<PromptTemplate>,
        generator: Arc<dyn Generator>,
        speech: SpeechRenderer,
        memory_window: usize,
    ) -> Self {
        let mut session = Self {
            profile,
            template,
            generator,
            speech,
            memory: ConversationMemory::new(memory_window),
            transcript: Vec::new(),
            state: TurnState::AwaitingInput,
            notice: None,
            audio: HashMap::new(),
            published: watch::channel(SessionSnapshot::default()).0,
        };
        session.publish();
        session
    }

    /// Validate the profile form and wire up the Groq and TTS clients.
    pub fn start(
        form: ProfileForm,
        template: Arc<PromptTemplate>,
        config: &ChatConfig,
    ) -> Result<Self> {
        let (profile, api_key) = form.submit()?;
        let generator =
            GroqClient::with_base_url(api_key, config.model.as_str(), config.groq_url.as_str())?;
        let tts = GoogleTts::with_base_url(config.tts_url.as_str())?;

        info!(model = %config.model, "Starting chat session for {}", profile.display_name());
        Ok(Self::new(
            profile,
            template,
            Arc::new(generator),
            SpeechRenderer::new(Arc::new(tts)),
            config.memory_window,
        ))
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            greeting: format!("Hello, {}!", self.profile.display_name()),
            transcript: self.transcript.clone(),
            memory_pairs: self.memory.len(),
            notice: self.notice.clone(),
        }
    }

    /// Follow the session's snapshots without taking the session lock.
    ///
    /// A new snapshot is published on every state change, so a reader sees
    /// the pending user turn while the reply is still being generated.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.published.subscribe()
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        self.published.send_replace(snapshot);
    }

    fn transition(&mut self, next: TurnState) {
        debug!(from = ?self.state, to = ?next, "Turn state change");
        self.state = next;
        self.publish();
    }

    /// Run one full turn: user text in, assistant reply recorded.
    ///
    /// On a generation failure the transcript and memory are left exactly as
    /// they were, the failure is kept as the session notice, and the error is
    /// returned so the caller can surface it.
    #[instrument(skip(self, text))]
    pub async fn submit_message(&mut self, text: &str) -> Result<SessionSnapshot> {
        if self.state != TurnState::AwaitingInput {
            return Err(ChatError::Busy);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let request = prompt::build(&self.template, &self.profile, &self.memory.replay(), text)?;

        self.notice = None;
        self.transcript.push(Turn::new(Role::User, text));
        self.transition(TurnState::Generating);

        match self.generator.generate(&request).await {
            Ok(reply) => {
                self.transcript.push(Turn::new(Role::Assistant, reply.as_str()));
                self.memory.append(text, reply);
                self.transition(TurnState::Rendering);
                let snapshot = self.snapshot();
                self.transition(TurnState::AwaitingInput);
                Ok(snapshot)
            }
            Err(e) => {
                warn!("Generation failed: {}", e);
                self.transcript.pop();
                self.notice = Some(e.to_string());
                self.transition(TurnState::AwaitingInput);
                Err(e)
            }
        }
    }

    /// Speak the assistant turn at `index`. Rendered once, then reused.
    #[instrument(skip(self))]
    pub async fn request_playback(&mut self, index: usize) -> Result<Playback> {
        let turn = self
            .transcript
            .get(index)
            .filter(|t| t.role == Role::Assistant)
            .ok_or(ChatError::NoSuchTurn(index))?;

        if let Some(Playback::Audio(clip)) = self.audio.get(&index) {
            return Ok(Playback::Audio(clip.clone()));
        }

        let playback = self.speech.render(turn.content()).await;
        if playback.clip().is_some() {
            self.audio.insert(index, playback.clone());
        }
        Ok(playback)
    }

    /// A previously rendered clip, without contacting the speech service.
    pub fn rendered_audio(&self, index: usize) -> Option<&Playback> {
        self.audio.get(&index)
    }

    /// Forget the conversation. The profile stays.
    pub fn reset(&mut self) -> SessionSnapshot {
        info!("Resetting conversation for {}", self.profile.display_name());
        self.memory.clear();
        self.transcript.clear();
        self.audio.clear();
        self.notice = None;
        self.transition(TurnState::AwaitingInput);
        self.snapshot()
    }
}
