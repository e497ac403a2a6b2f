//! Caller identity and ownership-scoped results
//!
//! Identity is established upstream by a trusted auth proxy; the engine only
//! sees the resulting subject and email. Reads for a caller who is missing or
//! does not own the record return [`Scoped::Unauthorized`] rather than an
//! error, so listing endpoints can answer with an empty result.

use serde::{Deserialize, Serialize};

/// Authenticated caller as reported by the auth proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable subject identifier from the identity provider
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
}

impl Identity {
    pub fn new(subject: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Result of an ownership-checked read
#[derive(Debug, Clone, PartialEq)]
pub enum Scoped<T> {
    Authorized(T),
    Unauthorized,
}

impl<T> Scoped<T> {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Scoped::Authorized(_))
    }

    pub fn authorized(self) -> Option<T> {
        match self {
            Scoped::Authorized(v) => Some(v),
            Scoped::Unauthorized => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Scoped<U> {
        match self {
            Scoped::Authorized(v) => Scoped::Authorized(f(v)),
            Scoped::Unauthorized => Scoped::Unauthorized,
        }
    }
}
