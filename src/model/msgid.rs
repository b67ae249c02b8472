//! Message identifiers in their two textual forms.
//!
//! The core form (`abc@example.net`) is the canonical key for the cache and
//! the post source; the full form (`<abc@example.net>`) is what appears on
//! the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NewsError, Result};

/// Longest accepted full message identifier, brackets included.
pub const MAX_MSGID_LEN: usize = 250;

/// Undelimited message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CoreMsgId(String);

/// Message identifier including its angle brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FullMsgId(String);

impl CoreMsgId {
    /// Validate and wrap an undelimited identifier.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_core(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The delimited `<...>` form.
    pub fn to_full(&self) -> FullMsgId {
        FullMsgId(format!("<{}>", self.0))
    }
}

impl FullMsgId {
    /// Parse a delimited identifier such as `<abc@example.net>`.
    ///
    /// Surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .ok_or_else(|| NewsError::InvalidMsgId(trimmed.to_string()))?;
        validate_core(inner)?;
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The undelimited form.
    pub fn core(&self) -> CoreMsgId {
        CoreMsgId(self.0[1..self.0.len() - 1].to_string())
    }
}

fn validate_core(id: &str) -> Result<()> {
    if id.is_empty() || id.len() + 2 > MAX_MSGID_LEN {
        return Err(NewsError::InvalidMsgId(id.to_string()));
    }
    let printable = id
        .bytes()
        .all(|b| (0x21..=0x7e).contains(&b) && b != b'<' && b != b'>');
    if !printable {
        return Err(NewsError::InvalidMsgId(id.to_string()));
    }
    Ok(())
}

/// Accepts either form.
impl FromStr for CoreMsgId {
    type Err = NewsError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.starts_with('<') {
            Ok(FullMsgId::parse(trimmed)?.core())
        } else {
            CoreMsgId::new(trimmed)
        }
    }
}

impl TryFrom<String> for CoreMsgId {
    type Error = NewsError;

    fn try_from(s: String) -> Result<Self> {
        CoreMsgId::new(s)
    }
}

impl From<CoreMsgId> for String {
    fn from(id: CoreMsgId) -> Self {
        id.0
    }
}

impl From<&FullMsgId> for CoreMsgId {
    fn from(id: &FullMsgId) -> Self {
        id.core()
    }
}

impl fmt::Display for CoreMsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FullMsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
