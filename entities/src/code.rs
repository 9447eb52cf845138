use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Human-shareable session code in the canonical `XXXX-XXXX` form.
///
/// Parsing is forgiving about case, surrounding whitespace and a missing
/// dash, but the stored value is always upper-case with the dash, matching
/// `^[A-Z0-9]{4}-[A-Z0-9]{4}$`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransferCode(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transfer code must look like XXXX-XXXX, got '{0}'")]
pub struct InvalidTransferCode(pub String);

impl TransferCode {
    pub const GROUP_LEN: usize = 4;

    pub fn parse(input: &str) -> Result<Self, InvalidTransferCode> {
        let normalized = input.trim().to_ascii_uppercase();
        let canonical = if normalized.is_ascii()
            && normalized.len() == Self::GROUP_LEN * 2
            && !normalized.contains('-')
        {
            format!(
                "{}-{}",
                &normalized[..Self::GROUP_LEN],
                &normalized[Self::GROUP_LEN..]
            )
        } else {
            normalized
        };

        if Self::is_canonical(&canonical) {
            Ok(Self(canonical))
        } else {
            Err(InvalidTransferCode(input.to_string()))
        }
    }

    /// Builds a code from two already generated groups.
    pub fn from_groups(
        first: &str,
        second: &str,
    ) -> Result<Self, InvalidTransferCode> {
        Self::parse(&format!("{first}-{second}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_canonical(code: &str) -> bool {
        let bytes = code.as_bytes();
        bytes.len() == Self::GROUP_LEN * 2 + 1
            && bytes[Self::GROUP_LEN] == b'-'
            && bytes.iter().enumerate().all(|(i, b)| {
                i == Self::GROUP_LEN
                    || b.is_ascii_uppercase()
                    || b.is_ascii_digit()
            })
    }
}

impl fmt::Display for TransferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TransferCode {
    type Error = InvalidTransferCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TransferCode> for String {
    fn from(code: TransferCode) -> Self {
        code.0
    }
}
