use std::fmt;

/// Sensitive string data that never prints its contents.
///
/// `Debug` and `Display` both render `[REDACTED]`. Use `unsecure()` or
/// `auth_header()` at the point the value is actually sent.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Access the raw underlying string
    pub fn unsecure(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value for the given scheme (`Bearer`, `Token`)
    pub fn auth_header(&self, scheme: &str) -> String {
        format!("{} {}", scheme, self.0)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}
