use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Prefix used when the config does not name one.
pub const DEFAULT_SESSION_PREFIX: &str = "mf";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("session prefix must not be empty")]
    EmptyPrefix,

    #[error("session prefix {0:?} contains disallowed characters")]
    InvalidPrefix(String),

    #[error("session name {name:?} does not carry the reserved prefix {prefix:?}")]
    MissingPrefix { name: String, prefix: String },

    #[error("session name {0:?} has an empty suffix")]
    EmptySuffix(String),

    #[error("session name {0:?} contains disallowed characters")]
    InvalidCharacters(String),
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

// ---------------------------------------------------------------------------
// SessionPrefix
// ---------------------------------------------------------------------------

/// The reserved marker identifying tmux sessions cerebro may create, list,
/// attach to and kill.
///
/// Owned names have the shape `<prefix>-<suffix>` where both halves use only
/// `[A-Za-z0-9_-]`. Anything else belongs to someone else on the same tmux
/// server and must never be touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPrefix(String);

impl SessionPrefix {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ValidationError::EmptyPrefix);
        }
        if !raw.chars().all(is_allowed) {
            return Err(ValidationError::InvalidPrefix(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate `raw` against the reserved pattern.
    pub fn parse(&self, raw: &str) -> Result<SessionName, ValidationError> {
        let suffix = raw
            .strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .ok_or_else(|| ValidationError::MissingPrefix {
                name: raw.to_string(),
                prefix: self.0.clone(),
            })?;
        if suffix.is_empty() {
            return Err(ValidationError::EmptySuffix(raw.to_string()));
        }
        if !suffix.chars().all(is_allowed) {
            return Err(ValidationError::InvalidCharacters(raw.to_string()));
        }
        Ok(SessionName(raw.to_string()))
    }

    /// Build an owned name from a suffix, e.g. a task-id fragment.
    pub fn name_for(&self, suffix: &str) -> Result<SessionName, ValidationError> {
        self.parse(&format!("{}-{suffix}", self.0))
    }

    pub fn matches(&self, raw: &str) -> bool {
        self.parse(raw).is_ok()
    }
}

impl Default for SessionPrefix {
    fn default() -> Self {
        Self(DEFAULT_SESSION_PREFIX.to_string())
    }
}

impl fmt::Display for SessionPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionName
// ---------------------------------------------------------------------------

/// A session name that has passed [`SessionPrefix::parse`].
///
/// Only constructible through a prefix, so holding one proves the name is
/// safe to hand to the tmux command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionName(String);

impl SessionName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for SessionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
