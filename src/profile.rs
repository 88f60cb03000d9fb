//! The user profile captured before chat begins, plus the Groq credential
//! that comes in with the same form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_AGE, MAX_AGE, MIN_AGE};
use crate::error::{ChatError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub age: u8,
    pub occupation: String,
    pub stress_triggers: String,
    pub habits: String,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            age: DEFAULT_AGE,
            occupation: String::new(),
            stress_triggers: String::new(),
            habits: String::new(),
        }
    }
}

impl UserProfile {
    /// Deterministic rendering injected into every prompt.
    pub fn snapshot(&self) -> String {
        // Plain strings and an integer cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn display_name(&self) -> &str {
        match self.name.trim() {
            "" => "Friend",
            name => name,
        }
    }
}

/// Groq API key. Never shown in logs.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(ChatError::MissingCredential);
        }
        Ok(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Fields submitted from the Profile screen.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub api_key: String,
    pub name: String,
    pub age: Option<u8>,
    pub occupation: String,
    pub stress_triggers: String,
    pub habits: String,
}

impl fmt::Debug for ProfileForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileForm")
            .field("name", &self.name)
            .field("age", &self.age)
            .finish_non_exhaustive()
    }
}

impl ProfileForm {
    /// Validate the form. A missing key blocks the move to the chat screen.
    pub fn submit(self) -> Result<(UserProfile, ApiKey)> {
        let api_key = ApiKey::new(self.api_key)?;

        let age = self.age.unwrap_or(DEFAULT_AGE);
        if !(MIN_AGE..=MAX_AGE).contains(&age) {
            return Err(ChatError::InvalidProfile(format!(
                "age must be between {MIN_AGE} and {MAX_AGE}, got {age}"
            )));
        }

        let profile = UserProfile {
            name: self.name.trim().to_string(),
            age,
            occupation: self.occupation.trim().to_string(),
            stress_triggers: self.stress_triggers.trim().to_string(),
            habits: self.habits.trim().to_string(),
        };
        Ok((profile, api_key))
    }
}
