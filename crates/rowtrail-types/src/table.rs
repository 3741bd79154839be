//! Table identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Schema namespace assumed when a table name carries no qualifier.
pub const DEFAULT_SCHEMA: &str = "main";

/// A `(schema, table)` pair naming a monitored table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableIdentity {
    /// Schema namespace.
    pub schema: String,
    /// Table name within the schema.
    pub table: String,
}

impl TableIdentity {
    /// Create a table identity.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Table in the default schema.
    pub fn unqualified(table: impl Into<String>) -> Self {
        Self::new(DEFAULT_SCHEMA, table)
    }

    /// Parse `schema.table` or a bare `table`.
    ///
    /// Only the first dot separates the schema, so `a.b.c` names table `b.c`
    /// in schema `a`.
    pub fn parse(qualified: &str) -> Option<Self> {
        let qualified = qualified.trim();
        match qualified.split_once('.') {
            Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
                Some(Self::new(schema, table))
            }
            Some(_) => None,
            None if qualified.is_empty() => None,
            None => Some(Self::unqualified(qualified)),
        }
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

impl FromStr for TableIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid table identity: {:?}", s))
    }
}
