//! Lexical deny-list over field expressions and order/group clause text.
//!
//! This is deliberately not a SQL parser: ambiguous input is rejected
//! rather than interpreted. Values never pass through here at all; they
//! are carried as typed values inside the query AST and escaped at render
//! time. Only identifier-bearing *expressions* (select-list entries, raw
//! filter fragments, order-by/group-by clauses) are vetted.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::QueryError;

pub(crate) const RESTRICTED: &str = "use of sub-query or function is restricted";
pub(crate) const ILLEGAL: &str = "illegal SQL expression";
pub(crate) const ORDER_SUBQUERY: &str = "cannot use sub-query in order by";
pub(crate) const BAD_FIELDNAME: &str = "invalid field name";

static SUB_QUERY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,();@]").unwrap());
static IS_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(select|delete|update|drop|create)\s").unwrap());
static IS_QUERY_PREDICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*[0-9a-zA-Z]*\s*( from | group by | order by | where | join )").unwrap()
});
static FIELD_QUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-zA-Z]+\s*'").unwrap());
static FIELD_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-zA-Z]+\s*,").unwrap());
static STRICT_UNION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\sunion.*\s").unwrap());
static ORDER_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[^a-z0-9\-_ ,`'"\.\(\)]"#).unwrap());
static FIELDNAME_PUNCT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,'();]").unwrap());

const BLACKLISTED_KEYWORDS: &[&str] = &[
    "select", "create", "insert", "delete", "drop", "update", "case", "show",
];

const BLACKLISTED_FUNCTIONS: &[&str] = &[
    "concat",
    "concat_ws",
    "if",
    "ifnull",
    "nullif",
    "coalesce",
    "connection_id",
    "current_user",
    "database",
    "last_insert_id",
    "session_user",
    "system_user",
    "user",
    "version",
    "global",
];

// Fieldnames additionally may not smuggle boolean connectives.
const FIELDNAME_KEYWORDS: &[&str] = &[
    "select", "create", "insert", "delete", "drop", "update", "case", "and", "or",
];

/// Vet one select-list field expression or raw filter fragment.
///
/// # Errors
/// `QueryError::InjectionRejected` on any deny-pattern hit.
pub(crate) fn sanitize_field(field: &str, strict: bool) -> Result<(), QueryError> {
    let lower = field.to_lowercase();

    // A statement separator has no place in a field expression.
    if field.contains(';') {
        return Err(QueryError::InjectionRejected(RESTRICTED));
    }

    if SUB_QUERY.is_match(field) {
        // Once punctuation is present, any embedded keyword call is a veto.
        for keyword in BLACKLISTED_KEYWORDS {
            if lower.contains(&format!("({keyword}")) {
                return Err(QueryError::InjectionRejected(RESTRICTED));
            }
        }
        for function in BLACKLISTED_FUNCTIONS {
            if lower.contains(&format!("{function}(")) {
                return Err(QueryError::InjectionRejected(RESTRICTED));
            }
        }
        if lower.contains('@') {
            // server variable access
            return Err(QueryError::InjectionRejected(RESTRICTED));
        }
        // ... and so is any bare statement keyword next to that punctuation.
        if lower
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .any(|tok| BLACKLISTED_KEYWORDS.contains(&tok))
        {
            return Err(QueryError::InjectionRejected(RESTRICTED));
        }
    }

    if FIELD_QUOTE.is_match(field) || FIELD_COMMA.is_match(field) {
        return Err(QueryError::InjectionRejected(RESTRICTED));
    }

    if IS_QUERY.is_match(field) || IS_QUERY_PREDICATE.is_match(field) {
        return Err(QueryError::InjectionRejected(RESTRICTED));
    }

    if strict {
        if field.contains("/*") {
            return Err(QueryError::InjectionRejected(ILLEGAL));
        }
        if STRICT_UNION.is_match(field) {
            return Err(QueryError::InjectionRejected(ILLEGAL));
        }
    }

    Ok(())
}

/// Vet a filter fieldname. `ifnull(...)`-wrapped columns are tolerated,
/// everything else may not carry punctuation at all.
///
/// # Errors
/// `QueryError::InjectionRejected` on any deny-pattern hit.
pub(crate) fn sanitize_fieldname(fieldname: &str) -> Result<(), QueryError> {
    if fieldname.to_lowercase().contains("ifnull") {
        if FIELDNAME_PUNCT.is_match(fieldname)
            && fieldname
                .split_whitespace()
                .any(|tok| FIELDNAME_KEYWORDS.iter().any(|kw| tok.eq_ignore_ascii_case(kw)))
        {
            return Err(QueryError::InjectionRejected(BAD_FIELDNAME));
        }
    } else if FIELDNAME_PUNCT.is_match(fieldname) {
        return Err(QueryError::InjectionRejected(BAD_FIELDNAME));
    }
    Ok(())
}

/// Vet order-by / group-by clause text (lexical part; the joined-table
/// check happens after table resolution).
///
/// # Errors
/// `QueryError::InjectionRejected` on any deny-pattern hit.
pub(crate) fn validate_order_group(clause: &str) -> Result<(), QueryError> {
    let lower = clause.to_lowercase();
    if lower.contains("select") && lower.contains("from") {
        return Err(QueryError::InjectionRejected(ORDER_SUBQUERY));
    }
    if ORDER_GROUP.is_match(&lower) {
        return Err(QueryError::InjectionRejected(ILLEGAL));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_drop_payload_is_rejected() {
        let err = sanitize_field("name\"; DROP TABLE tabItem; --", true).unwrap_err();
        assert!(matches!(err, QueryError::InjectionRejected(_)));
    }

    #[test]
    fn embedded_function_call_is_rejected() {
        let err = sanitize_field("`tabDocType`.`issingle`, version()", true).unwrap_err();
        assert!(matches!(err, QueryError::InjectionRejected(RESTRICTED)));
    }

    #[test]
    fn embedded_subselect_is_rejected() {
        let err = sanitize_field("(select user from mysql.user)", true).unwrap_err();
        assert!(matches!(err, QueryError::InjectionRejected(RESTRICTED)));
    }

    #[test]
    fn server_variable_access_is_rejected() {
        let err = sanitize_field("(@@version)", true).unwrap_err();
        assert!(matches!(err, QueryError::InjectionRejected(RESTRICTED)));
    }

    #[test]
    fn leading_dml_verb_is_rejected() {
        let err = sanitize_field("select item_code", true).unwrap_err();
        assert!(matches!(err, QueryError::InjectionRejected(RESTRICTED)));
    }

    #[test]
    fn unquoted_keyword_predicate_is_rejected() {
        let err = sanitize_field("creation from tabUser", true).unwrap_err();
        assert!(matches!(err, QueryError::InjectionRejected(RESTRICTED)));
    }

    #[test]
    fn identifier_followed_by_quote_is_rejected() {
        let err = sanitize_field("name'x", true).unwrap_err();
        assert!(matches!(err, QueryError::InjectionRejected(RESTRICTED)));
    }

    #[test]
    fn strict_mode_rejects_comment_marker() {
        assert!(sanitize_field("name /* probe */", true).is_err());
        assert!(sanitize_field("name /* probe */", false).is_ok());
    }

    #[test]
    fn strict_mode_rejects_union() {
        assert!(sanitize_field("name union select 1 ", true).is_err());
    }

    #[test]
    fn ordinary_expressions_pass() {
        sanitize_field("item_name", true).unwrap();
        sanitize_field("`tabItem`.`item_name`", true).unwrap();
        sanitize_field("count(name) as total", true).unwrap();
        sanitize_field("sum(qty)", true).unwrap();
    }

    #[test]
    fn fieldname_punctuation_is_rejected() {
        assert!(sanitize_fieldname("name, owner").is_err());
        assert!(sanitize_fieldname("name'").is_err());
        sanitize_fieldname("item_name").unwrap();
    }

    #[test]
    fn coalesced_fieldname_is_tolerated() {
        sanitize_fieldname("ifnull(status, '')").unwrap();
        assert!(sanitize_fieldname("ifnull(x,'') or select 1").is_err());
    }

    #[test]
    fn order_group_whitelist() {
        validate_order_group("`tabItem`.`modified` desc").unwrap();
        validate_order_group("creation asc, idx desc").unwrap();
        assert!(validate_order_group("modified; drop table tabItem").is_err());
        assert!(validate_order_group("(select 1 from tabUser)").is_err());
    }
}
