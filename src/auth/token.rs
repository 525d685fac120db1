use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque bearer credential issued by the identity authority.
///
/// Never empty. `Debug` output is redacted so tokens do not end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Token(String);

impl Token {
    /// Returns `None` for empty or whitespace-only input.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Bearer <token>`, the value of the authorization header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Short form for display: first and last four characters.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.masked())
    }
}

impl TryFrom<String> for Token {
    type Error = &'static str;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Token::new(raw).ok_or("token cannot be empty")
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.0
    }
}
