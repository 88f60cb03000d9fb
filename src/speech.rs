//! Spoken playback of assistant replies.
//!
//! Synthesis failures never propagate: the caller just gets
//! [`Playback::NoAudio`] and shows no player.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::constants;
use crate::error::{ChatError, Result};
use crate::sanitize::speech_text;

/// The remote text-to-speech service. Returns MP3 bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>>;
}

/// Google Translate's TTS endpoint, fetched chunk by chunk.
pub struct GoogleTts {
    client: Client,
    base_url: String,
}

impl GoogleTts {
    pub fn new() -> Result<Self> {
        Self::with_base_url(constants::TTS_URL.as_str())
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(constants::SPEECH_TIMEOUT)
            .build()
            .map_err(|e| ChatError::Synthesis(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        let url = format!("{}/translate_tts", self.base_url);
        let chunks = split_chunks(text, constants::SPEECH_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(ChatError::Synthesis("no text to speak".to_string()));
        }

        let total = chunks.len().to_string();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("q", chunk.as_str()),
                    ("tl", language),
                    ("client", "tw-ob"),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await
                .map_err(|e| ChatError::Synthesis(format!("request failed: {e}")))?;

            if !response.status().is_success() {
                return Err(ChatError::Synthesis(format!(
                    "TTS service returned status {}",
                    response.status()
                )));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| ChatError::Synthesis(format!("failed to read audio: {e}")))?;
            audio.extend_from_slice(&bytes);
        }

        debug!(chunks = chunks.len(), bytes = audio.len(), "Synthesized speech");
        Ok(audio)
    }
}

/// Split into pieces of at most `max_chars`, preferring word boundaries.
fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        // Words longer than a whole chunk are cut hard.
        while word.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }

        let needed = if current.is_empty() { word.len() } else { word.len() + 1 };
        if current_len + needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// A synthesized reply on disk. The file goes away with the last clone.
#[derive(Debug, Clone)]
pub struct AudioClip {
    path: Arc<TempPath>,
    len: usize,
}

impl AudioClip {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path()).await?)
    }
}

#[derive(Debug, Clone)]
pub enum Playback {
    Audio(AudioClip),
    /// Nothing to play; not an error.
    NoAudio,
}

impl Playback {
    pub fn clip(&self) -> Option<&AudioClip> {
        match self {
            Playback::Audio(clip) => Some(clip),
            Playback::NoAudio => None,
        }
    }
}

/// Sanitizes, caps and synthesizes replies into temporary MP3 files.
#[derive(Clone)]
pub struct SpeechRenderer {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    language: String,
}

impl SpeechRenderer {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            synthesizer,
            language: constants::SPEECH_LANGUAGE.to_string(),
        }
    }

    pub async fn render(&self, reply: &str) -> Playback {
        let text = speech_text(reply);
        if text.is_empty() {
            info!("Nothing speakable in reply, skipping synthesis");
            return Playback::NoAudio;
        }

        let audio = match self.synthesizer.synthesize(&text, &self.language).await {
            Ok(audio) if !audio.is_empty() => audio,
            Ok(_) => {
                warn!("Speech service returned no audio");
                return Playback::NoAudio;
            }
            Err(e) => {
                warn!("Speech synthesis failed: {}", e);
                return Playback::NoAudio;
            }
        };

        // Temp file creation and the write are blocking filesystem calls.
        let stored = tokio::task::spawn_blocking(move || write_clip(&audio))
            .await
            .map_err(|e| ChatError::Io(std::io::Error::other(e)))
            .and_then(|written| written);
        match stored {
            Ok(clip) => {
                info!("Rendered {} chars of speech to {}", text.len(), clip.path().display());
                Playback::Audio(clip)
            }
            Err(e) => {
                warn!("Failed to store synthesized audio: {}", e);
                Playback::NoAudio
            }
        }
    }
}

fn write_clip(audio: &[u8]) -> Result<AudioClip> {
    let mut file = tempfile::Builder::new()
        .prefix("auraassist-")
        .suffix(".mp3")
        .tempfile()?;
    file.write_all(audio)?;
    file.flush()?;
    Ok(AudioClip {
        path: Arc::new(file.into_temp_path()),
        len: audio.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for Recording {
        async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>> {
            self.seen
                .lock()
                .unwrap()
                .push((text.to_string(), language.to_string()));
            if self.fail {
                Err(ChatError::Synthesis("boom".to_string()))
            } else {
                Ok(b"ID3fake".to_vec())
            }
        }
    }

    fn recording(fail: bool) -> Arc<Recording> {
        Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            fail,
        })
    }

    #[test]
    fn test_split_chunks_respects_limit() {
        let text = "the quick brown fox jumps over the lazy dog ".repeat(10);
        let chunks = split_chunks(&text, 100);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
            assert!(!chunk.starts_with(' ') && !chunk.ends_with(' '));
        }
        assert_eq!(chunks.join(" "), text.trim());
    }

    #[test]
    fn test_split_chunks_cuts_long_words() {
        let word = "a".repeat(250);
        let chunks = split_chunks(&format!("hi {word}"), 100);
        assert_eq!(chunks, vec!["hi".to_string(), "a".repeat(100), "a".repeat(100), "a".repeat(50)]);
    }

    #[test]
    fn test_split_chunks_empty() {
        assert!(split_chunks("   ", 100).is_empty());
    }

    #[tokio::test]
    async fn test_render_sanitizes_and_caps() {
        let synth = recording(false);
        let renderer = SpeechRenderer::new(synth.clone());
        let reply = format!("**Hi** there 🙂 {}---\nStress Intensity: 3/10", "x ".repeat(600));

        let playback = renderer.render(&reply).await;
        let clip = playback.clip().expect("audio expected");
        assert!(clip.path().exists());
        assert_eq!(clip.read().await.unwrap(), b"ID3fake");

        let seen = synth.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.starts_with("Hi there x x"));
        assert!(seen[0].0.chars().count() <= constants::SPEECH_CHAR_LIMIT);
        assert_eq!(seen[0].1, "en");
    }

    #[tokio::test]
    async fn test_failure_means_no_audio() {
        let renderer = SpeechRenderer::new(recording(true));
        assert!(matches!(renderer.render("hello").await, Playback::NoAudio));
    }

    #[tokio::test]
    async fn test_unspeakable_reply_skips_service() {
        let synth = recording(false);
        let renderer = SpeechRenderer::new(synth.clone());
        assert!(matches!(renderer.render("⭐⭐☆ 🙂").await, Playback::NoAudio));
        assert!(synth.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clip_removed_when_dropped() {
        let renderer = SpeechRenderer::new(recording(false));
        let playback = renderer.render("hello").await;
        let path = playback.clip().unwrap().path().to_path_buf();
        assert!(path.exists());
        drop(playback);
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_renders_get_their_own_clips() {
        let renderer = Arc::new(SpeechRenderer::new(recording(false)));
        let renders = (0..4).map(|i| {
            let renderer = renderer.clone();
            tokio::spawn(async move { renderer.render(&format!("reply {i}")).await })
        });

        let mut paths = Vec::new();
        for render in renders {
            let playback = render.await.unwrap();
            let clip = playback.clip().unwrap();
            assert_eq!(clip.len(), b"ID3fake".len());
            assert_eq!(clip.read().await.unwrap(), b"ID3fake");
            paths.push(clip.path().to_path_buf());
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 4);
    }
}
