//! Shared `FieldKind` enum for the DocKit type system.
//!
//! This enum represents the logical type of a field for the purpose of:
//! - Value coercion in filter compilation (strings vs numbers vs temporals)
//! - NULL-safety fallback selection (empty string, zero, or epoch)
//! - Link-target resolution for user-permission restrictions

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical field types supported by the query compiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Short free-form text.
    Data,
    /// Long free-form text.
    Text,
    /// Reference to another `DocType` record by name; target in `FieldDef::options`.
    Link,
    /// One value out of a fixed option list.
    Select,
    Date,
    Datetime,
    Time,
    Int,
    Float,
    Currency,
    Percent,
    /// Boolean stored as 0/1.
    Check,
    /// Child-table reference; child `DocType` in `FieldDef::options`.
    Table,
}

impl FieldKind {
    /// Numeric kinds never compare against NULL-coalesced text fallbacks.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Int | Self::Float | Self::Currency | Self::Percent | Self::Check
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Data => "Data",
            Self::Text => "Text",
            Self::Link => "Link",
            Self::Select => "Select",
            Self::Date => "Date",
            Self::Datetime => "Datetime",
            Self::Time => "Time",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Currency => "Currency",
            Self::Percent => "Percent",
            Self::Check => "Check",
            Self::Table => "Table",
        };
        write!(f, "{name}")
    }
}
