//! Record identity encoding.
//!
//! A record's key values are encoded into one delimited string. Inside each
//! value the escape and delimiter characters are prefixed with the escape
//! character, and a NULL key value is written as [`NULL_SENTINEL`]. An escaped
//! value can never produce an unescaped delimiter or the bare sentinel, so the
//! encoding is injective for a fixed number of key columns, which
//! [`RecordIdentity::decode`] demonstrates by inverting it.

use crate::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Separates key fields.
pub const DELIMITER: char = '|';
/// Prefixes escaped characters.
pub const ESCAPE: char = '\\';
/// Stands in for a NULL key value.
pub const NULL_SENTINEL: &str = "\\N";

/// Errors decoding an encoded identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityDecodeError {
    #[error("dangling escape at end of identity")]
    DanglingEscape,

    #[error("invalid escape sequence \\{0}")]
    InvalidEscape(char),

    #[error("null sentinel mixed with other characters in field {0}")]
    MisplacedNull(usize),
}

/// Stable identity of a record across its row versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordIdentity {
    key: Vec<(String, Value)>,
    encoded: String,
}

impl RecordIdentity {
    /// Encode key `(column, value)` pairs in key-column order.
    pub fn encode(key: Vec<(String, Value)>) -> Self {
        let encoded = Self::encode_values(key.iter().map(|(_, v)| v));
        Self { key, encoded }
    }

    /// Encode a sequence of key values.
    pub fn encode_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
        let mut out = String::new();
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                out.push(DELIMITER);
            }
            match value.to_text() {
                None => out.push_str(NULL_SENTINEL),
                Some(text) => {
                    for c in text.chars() {
                        if c == ESCAPE || c == DELIMITER {
                            out.push(ESCAPE);
                        }
                        out.push(c);
                    }
                }
            }
        }
        out
    }

    /// Split an encoded identity back into its fields, NULL as `None`.
    pub fn decode(encoded: &str) -> Result<Vec<Option<String>>, IdentityDecodeError> {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut null = false;
        let mut chars = encoded.chars();

        while let Some(c) = chars.next() {
            match c {
                ESCAPE => match chars.next() {
                    Some(e @ (ESCAPE | DELIMITER)) => {
                        if null {
                            return Err(IdentityDecodeError::MisplacedNull(fields.len()));
                        }
                        current.push(e);
                    }
                    Some('N') if current.is_empty() && !null => null = true,
                    Some('N') => return Err(IdentityDecodeError::MisplacedNull(fields.len())),
                    Some(other) => return Err(IdentityDecodeError::InvalidEscape(other)),
                    None => return Err(IdentityDecodeError::DanglingEscape),
                },
                DELIMITER => {
                    fields.push(if null { None } else { Some(std::mem::take(&mut current)) });
                    null = false;
                }
                _ if null => return Err(IdentityDecodeError::MisplacedNull(fields.len())),
                _ => current.push(c),
            }
        }
        fields.push(if null { None } else { Some(current) });
        Ok(fields)
    }

    /// The encoded identity string.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Key `(column, value)` pairs in key-column order.
    pub fn key(&self) -> &[(String, Value)] {
        &self.key
    }

    /// Key column names in order.
    pub fn key_columns(&self) -> impl Iterator<Item = &str> {
        self.key.iter().map(|(c, _)| c.as_str())
    }

    /// Structured form: a JSON object of key column to value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.key
                .iter()
                .map(|(c, v)| (c.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}
