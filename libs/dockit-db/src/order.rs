//! ORDER BY / GROUP BY derivation and validation.

use dockit_meta::{DocType, SortDir};
use sea_orm::sea_query::{Alias, Expr, Order, SelectStatement};

use crate::errors::QueryError;
use crate::sanitize;
use crate::tables;

fn dir_order(dir: SortDir) -> Order {
    match dir {
        SortDir::Asc => Order::Asc,
        SortDir::Desc => Order::Desc,
    }
}

/// Reject clause text that names a table absent from the join set.
/// Lexical vetting must already have happened.
pub(crate) fn validate_joined_tables(clause: &str, joined: &[String]) -> Result<(), QueryError> {
    for part in clause.split(',') {
        let part = part.trim();
        if part.contains('.') && part.starts_with("`tab") {
            let table = part.split('.').next().unwrap_or_default().trim_matches('`');
            if !joined.iter().any(|t| t == table) {
                return Err(QueryError::AmbiguousColumn {
                    table: table.strip_prefix("tab").unwrap_or(table).to_owned(),
                });
            }
        }
    }
    Ok(())
}

/// Apply a caller-supplied order-by clause, one comma part at a time.
/// Each part is `expression [asc|desc]`; recognizable column references
/// become structured refs, anything else is carried as vetted raw text.
fn apply_raw_order(stmt: &mut SelectStatement, clause: &str) {
    for part in clause.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (expr_text, order) = match part.rsplit_once(char::is_whitespace) {
            Some((head, tail)) if tail.eq_ignore_ascii_case("asc") => (head.trim(), Order::Asc),
            Some((head, tail)) if tail.eq_ignore_ascii_case("desc") => (head.trim(), Order::Desc),
            _ => (part, Order::Asc),
        };
        if let Some((table, column)) = tables::parse_qualified(expr_text) {
            stmt.order_by((Alias::new(table), Alias::new(column)), order);
        } else if tables::is_plain_ident(expr_text) {
            stmt.order_by(Alias::new(expr_text), order);
        } else {
            stmt.order_by_expr(Expr::cust(expr_text), order);
        }
    }
}

/// Derive and apply ordering for one query.
///
/// Precedence: distinct queries get no ORDER BY at all (a documented
/// limitation, surfaced as a warning); an explicit clause wins next; then
/// the type's declared sort; then `modified DESC`. Submittable types
/// always sort drafts first. A lone aggregate select without GROUP BY
/// suppresses the default ordering entirely.
pub(crate) fn apply_order(
    stmt: &mut SelectStatement,
    dt: &DocType,
    raw_order_by: Option<&str>,
    field_exprs: &[String],
    group_by: Option<&str>,
    joined: &[String],
    distinct: bool,
) -> Result<(), QueryError> {
    if distinct {
        if raw_order_by.is_some() {
            tracing::warn!(
                doctype = %dt.name,
                "distinct query suppresses order by; results are unordered"
            );
        }
        return Ok(());
    }

    if let Some(clause) = raw_order_by {
        sanitize::validate_order_group(clause)?;
        validate_joined_tables(clause, joined)?;
        apply_raw_order(stmt, clause);
        return Ok(());
    }

    // A single aggregate with no grouping yields one row; ordering it by
    // a non-grouped column would be rejected by the database.
    let lone_group_function = field_exprs.len() == 1
        && group_by.is_none()
        && ["count(", "min(", "max("]
            .iter()
            .any(|m| field_exprs[0].trim().to_lowercase().starts_with(m));
    if lone_group_function {
        return Ok(());
    }

    let table = dt.table_name();
    if dt.is_submittable {
        stmt.order_by(
            (Alias::new(table.clone()), Alias::new("docstatus")),
            Order::Asc,
        );
    }

    match dt.sort_field.as_deref() {
        Some(sort_field) if sort_field.contains(',') => {
            // multi-field declared sort: `idx desc, modified desc`
            for part in sort_field.split(',') {
                let mut toks = part.split_whitespace();
                let Some(fieldname) = toks.next() else {
                    continue;
                };
                let order = toks
                    .next()
                    .map_or(Order::Desc, |d| dir_order(SortDir::parse_lenient(d)));
                stmt.order_by((Alias::new(table.clone()), Alias::new(fieldname)), order);
            }
        }
        Some(sort_field) => {
            let order = dir_order(dt.sort_order.unwrap_or(SortDir::Desc));
            stmt.order_by((Alias::new(table), Alias::new(sort_field)), order);
        }
        None => {
            stmt.order_by((Alias::new(table), Alias::new("modified")), Order::Desc);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use sea_orm::sea_query::{MysqlQueryBuilder, Query};

    use super::*;

    fn base() -> SelectStatement {
        let mut q = Query::select();
        q.expr(Expr::cust("1")).from(Alias::new("tabItem"));
        q.take()
    }

    fn sql(stmt: &SelectStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    #[test]
    fn default_sort_is_modified_desc() {
        let mut stmt = base();
        let dt = DocType::new("Item");
        apply_order(&mut stmt, &dt, None, &["name".to_owned()], None, &[], false).unwrap();
        assert!(sql(&stmt).ends_with("ORDER BY `tabItem`.`modified` DESC"));
    }

    #[test]
    fn submittable_sorts_drafts_first() {
        let mut stmt = base();
        let mut dt = DocType::new("Sales Order");
        dt.is_submittable = true;
        apply_order(&mut stmt, &dt, None, &["name".to_owned()], None, &[], false).unwrap();
        let sql = sql(&stmt);
        assert!(sql.contains("ORDER BY `tabSales Order`.`docstatus` ASC, `tabSales Order`.`modified` DESC"));
    }

    #[test]
    fn declared_multi_field_sort() {
        let mut stmt = base();
        let mut dt = DocType::new("Task");
        dt.sort_field = Some("idx desc, modified desc".to_owned());
        apply_order(&mut stmt, &dt, None, &["name".to_owned()], None, &[], false).unwrap();
        let sql = sql(&stmt);
        assert!(sql.contains("`tabTask`.`idx` DESC, `tabTask`.`modified` DESC"));
    }

    #[test]
    fn distinct_suppresses_order_by() {
        let mut stmt = base();
        let dt = DocType::new("Item");
        apply_order(
            &mut stmt,
            &dt,
            Some("modified desc"),
            &["name".to_owned()],
            None,
            &[],
            true,
        )
        .unwrap();
        assert!(!sql(&stmt).contains("ORDER BY"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn distinct_with_explicit_order_warns() {
        let mut stmt = base();
        let dt = DocType::new("Item");
        apply_order(
            &mut stmt,
            &dt,
            Some("modified desc"),
            &["name".to_owned()],
            None,
            &[],
            true,
        )
        .unwrap();
        assert!(logs_contain("distinct query suppresses order by"));
    }

    #[test]
    fn lone_aggregate_suppresses_default_order() {
        let mut stmt = base();
        let dt = DocType::new("Item");
        apply_order(
            &mut stmt,
            &dt,
            None,
            &["count(name) as total".to_owned()],
            None,
            &[],
            false,
        )
        .unwrap();
        assert!(!sql(&stmt).contains("ORDER BY"));
    }

    #[test]
    fn explicit_order_referencing_unjoined_table_is_ambiguous() {
        let mut stmt = base();
        let dt = DocType::new("Item");
        let err = apply_order(
            &mut stmt,
            &dt,
            Some("`tabBin`.`modified` desc"),
            &["name".to_owned()],
            None,
            &["tabItem".to_owned()],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::AmbiguousColumn { table } if table == "Bin"));
    }

    #[test]
    fn explicit_order_is_applied() {
        let mut stmt = base();
        let dt = DocType::new("Item");
        apply_order(
            &mut stmt,
            &dt,
            Some("`tabItem`.`creation` asc"),
            &["name".to_owned()],
            None,
            &["tabItem".to_owned()],
            false,
        )
        .unwrap();
        assert!(sql(&stmt).ends_with("ORDER BY `tabItem`.`creation` ASC"));
    }
}
