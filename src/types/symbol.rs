use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MarkovError;

const MAX_SYMBOL_LEN: usize = 15;

/// Normalized instrument identifier (trimmed, uppercase).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(input: &str) -> Result<Self, MarkovError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(MarkovError::invalid("symbol cannot be empty"));
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(MarkovError::invalid(format!(
                "symbol length {} exceeds max {}",
                len, MAX_SYMBOL_LEN
            )));
        }

        // Also used in export file names, so keep it path-safe.
        if let Some((index, ch)) = normalized
            .chars()
            .enumerate()
            .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '^' | '=' | '_')))
        {
            return Err(MarkovError::invalid(format!(
                "symbol contains invalid character '{}' at index {}",
                ch, index
            )));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = MarkovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = MarkovError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
