//! Stable user identifiers and server-assigned connection identifiers.

use crate::error::{ChatError, ChatResult};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Maximum length of a user id in bytes.
pub const MAX_USER_ID_LEN: usize = 128;

/// Opaque, stable identifier for a registered account.
///
/// Ids are issued by the account service and never reused; the relay only
/// checks that they are well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a raw id.
    ///
    /// Rejects empty or all-whitespace ids, ids longer than
    /// [`MAX_USER_ID_LEN`] bytes, and ids containing control characters.
    pub fn parse(raw: impl Into<String>) -> ChatResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ChatError::InvalidUserId("empty user id".into()));
        }
        if raw.len() > MAX_USER_ID_LEN {
            return Err(ChatError::InvalidUserId(format!(
                "user id too long: {} bytes (max {MAX_USER_ID_LEN})",
                raw.len()
            )));
        }
        if raw.chars().any(char::is_control) {
            return Err(ChatError::InvalidUserId(
                "user id contains control characters".into(),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for UserId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ChatError;

    fn try_from(value: String) -> ChatResult<Self> {
        UserId::parse(value)
    }
}

impl TryFrom<&str> for UserId {
    type Error = ChatError;

    fn try_from(value: &str) -> ChatResult<Self> {
        UserId::parse(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> String {
        id.0
    }
}

/// Server-assigned identifier of one live network connection.
///
/// Monotonic per server process; a closed connection's id is never handed
/// out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
