//! Table naming and the field scan that feeds the join plan.
//!
//! Secondary tables enter the plan only through [`crate::query::Engine`],
//! which permission-checks every append; this module is the pure parsing
//! side of that contract.

use sea_orm::sea_query::JoinType;

/// Join kind used for secondary (child/related) tables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JoinKind {
    #[default]
    Left,
    Inner,
}

impl From<JoinKind> for JoinType {
    fn from(kind: JoinKind) -> Self {
        match kind {
            JoinKind::Left => Self::LeftJoin,
            JoinKind::Inner => Self::InnerJoin,
        }
    }
}

/// The physical table behind an entity type.
#[must_use]
pub(crate) fn table_for(doctype: &str) -> String {
    format!("tab{doctype}")
}

/// Aggregate/function calls that never name a joinable table and are
/// exempt from primary-table qualification.
pub(crate) fn is_standard_sql_method(field: &str) -> bool {
    let lower = field.trim().to_lowercase();
    ["count(", "avg(", "sum(", "extract(", "dayofyear("]
        .iter()
        .any(|m| lower.starts_with(m))
}

fn strip_backticks(s: &str) -> &str {
    s.trim_matches('`')
}

/// Extract the table a qualified field expression touches, if any.
///
/// Recognizes `tabX.col` and `` `tabX`.`col` `` shapes, unwrapping a
/// leading `GROUP_CONCAT(`/`IFNULL(` call; plain fieldnames and
/// aggregate calls yield `None`.
pub(crate) fn table_qualifier(field: &str) -> Option<String> {
    if !(field.contains("tab") && field.contains('.')) {
        return None;
    }
    let lower = field.to_lowercase();
    if ["locate(", "strpos(", "count(", "avg(", "sum(", "extract(", "dayofyear("]
        .iter()
        .any(|m| lower.contains(m))
    {
        return None;
    }

    let mut table = field.split('.').next().unwrap_or_default().trim();
    for wrapper in ["group_concat(", "ifnull("] {
        if table.to_lowercase().starts_with(wrapper) {
            table = &table[wrapper.len()..];
        }
    }
    let table = strip_backticks(table);
    if table.is_empty() {
        return None;
    }
    Some(table.to_owned())
}

/// Split a qualified column reference into (table, column) identifiers.
pub(crate) fn parse_qualified(field: &str) -> Option<(String, String)> {
    let (table, column) = field.split_once('.')?;
    let table = strip_backticks(table.trim());
    let column = strip_backticks(column.trim());
    if is_table_ident(table) && is_plain_ident(column) {
        Some((table.to_owned(), column.to_owned()))
    } else {
        None
    }
}

/// A bare column identifier: letters, digits, underscores, nothing else.
pub(crate) fn is_plain_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Table identifiers additionally allow spaces (`tabSales Order`).
pub(crate) fn is_table_ident(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_field_yields_table() {
        assert_eq!(
            table_qualifier("`tabSales Order Item`.`item_code`"),
            Some("tabSales Order Item".to_owned())
        );
        assert_eq!(table_qualifier("tabItem.item_name"), Some("tabItem".to_owned()));
    }

    #[test]
    fn wrappers_are_unwrapped() {
        assert_eq!(
            table_qualifier("GROUP_CONCAT(`tabTask`.`subject`)"),
            Some("tabTask".to_owned())
        );
        assert_eq!(
            table_qualifier("ifnull(`tabTask`.`status`, '')"),
            Some("tabTask".to_owned())
        );
    }

    #[test]
    fn aggregates_and_plain_fields_are_skipped() {
        assert_eq!(table_qualifier("count(`tabItem`.`name`)"), None);
        assert_eq!(table_qualifier("item_name"), None);
        assert_eq!(table_qualifier("sum(`tabItem`.`qty`)"), None);
    }

    #[test]
    fn qualified_parse_handles_backticks() {
        assert_eq!(
            parse_qualified("`tabItem`.`item_name`"),
            Some(("tabItem".to_owned(), "item_name".to_owned()))
        );
        assert_eq!(parse_qualified("count(name)"), None);
    }
}
