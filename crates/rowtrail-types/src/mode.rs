//! Audit entry granularity.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Shape of the entries written for a mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditMode {
    /// One entry per changed column with old and new values.
    #[default]
    ColumnGrained,
    /// One entry per mutation with filtered before/after row images.
    RowGrained,
}

impl AuditMode {
    /// Get all modes.
    pub fn all() -> impl Iterator<Item = Self> {
        use strum::IntoEnumIterator;
        Self::iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        assert_eq!("row_grained".parse::<AuditMode>().unwrap(), AuditMode::RowGrained);
        assert_eq!(AuditMode::ColumnGrained.to_string(), "column_grained");
        assert_eq!(AuditMode::all().count(), 2);
    }
}
