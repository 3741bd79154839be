//! Mutation kinds.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// The kind of mutation applied to a monitored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Operation {
    /// A new record was inserted.
    Insert,
    /// An existing record was updated.
    Update,
    /// A record was deleted.
    Delete,
}

impl Operation {
    /// Whether the mutation carries a prior row image.
    pub fn has_prior_image(&self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }

    /// Whether the mutation carries a new row image.
    pub fn has_new_image(&self) -> bool {
        matches!(self, Self::Insert | Self::Update)
    }

    /// Single-letter code, as used by compact log formats.
    pub fn code(&self) -> char {
        match self {
            Self::Insert => 'I',
            Self::Update => 'U',
            Self::Delete => 'D',
        }
    }
}
