//! Compilation of one [`FilterPredicate`] into a SQL boolean expression.
//!
//! The compiled expression is a `sea_query` AST node; values enter it as
//! typed `Value`s and are escaped by the query builder at render time,
//! never interpolated as text here.
//!
//! NULL-safety: a column holding NULL must not silently satisfy an
//! inequality filter, so by default the column is wrapped in
//! `ifnull(col, fallback)` with a kind-appropriate fallback literal.
//! Equality/LIKE against a concrete value skips the wrap (NULL can never
//! match those anyway), as do numeric columns and callers that opted out.

use dockit_meta::{DocType, FieldKind};
use sea_orm::sea_query::{Alias, BinOper, Expr, Func, Order, Query, SimpleExpr, Value};
use serde_json::Value as JsonValue;

use crate::dates;
use crate::errors::QueryError;
use crate::exec::{Row, SqlExecutor};
use crate::filter::{FilterPredicate, Operator};
use crate::settings::SqlBackend;
use crate::tables;

/// Collaborators the compiler needs per call.
pub(crate) struct PredicateDeps<'a> {
    pub exec: &'a dyn SqlExecutor,
    pub backend: SqlBackend,
    pub ignore_ifnull: bool,
}

/// NULL-coalescing fallback literal, selected by field kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Fallback {
    Empty,
    Zero,
    DateEpoch,
    DatetimeEpoch,
    TimeEpoch,
    Null,
}

impl Fallback {
    fn expr(self) -> SimpleExpr {
        match self {
            Self::Empty => Value::from("").into(),
            Self::Zero => Value::from(0i64).into(),
            Self::DateEpoch => Value::from("0001-01-01").into(),
            Self::DatetimeEpoch => Value::from("0001-01-01 00:00:00").into(),
            Self::TimeEpoch => Value::from("00:00:00").into(),
            Self::Null => Expr::cust("NULL"),
        }
    }
}

/// The compiled right-hand side.
enum Payload {
    Str(String),
    Num(f64),
    Between(String, String),
}

fn json_truthy(v: &JsonValue) -> bool {
    match v {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

fn json_scalar_string(v: &JsonValue) -> String {
    match v {
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => (if *b { "1" } else { "0" }).to_owned(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_flt(v: &JsonValue) -> f64 {
    match v {
        JsonValue::Number(n) => n.as_f64().unwrap_or(0.0),
        JsonValue::String(s) => s.trim().parse().unwrap_or(0.0),
        JsonValue::Bool(true) => 1.0,
        _ => 0.0,
    }
}

fn row_get<'a>(row: &'a Row, key: &str) -> Option<&'a JsonValue> {
    row.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn row_i64(row: &Row, key: &str) -> Option<i64> {
    match row_get(row, key)? {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn row_str(row: &Row, key: &str) -> Option<String> {
    row_get(row, key)?.as_str().map(str::to_owned)
}

/// Look up the nested-set members above/below one node.
///
/// Two auxiliary queries run before the main statement: the node's
/// `lft`/`rgt` bounds, then the names inside (descendants) or around
/// (ancestors) those bounds. A missing node yields the empty set.
async fn tree_members(
    ref_doctype: &str,
    node: &str,
    descending: bool,
    deps: &PredicateDeps<'_>,
) -> Result<Vec<String>, QueryError> {
    if node.is_empty() {
        return Ok(Vec::new());
    }
    let table = tables::table_for(ref_doctype);

    let mut bounds = Query::select();
    bounds
        .column(Alias::new("lft"))
        .column(Alias::new("rgt"))
        .from(Alias::new(table.clone()))
        .and_where(Expr::col(Alias::new("name")).eq(Value::from(node)))
        .limit(1);
    let rows = deps.exec.query(&deps.backend.render(&bounds)).await?;
    let Some(row) = rows.first() else {
        return Ok(Vec::new());
    };
    let (Some(lft), Some(rgt)) = (row_i64(row, "lft"), row_i64(row, "rgt")) else {
        return Ok(Vec::new());
    };

    let mut members = Query::select();
    members.column(Alias::new("name")).from(Alias::new(table));
    if descending {
        members
            .and_where(Expr::col(Alias::new("lft")).gt(Value::from(lft)))
            .and_where(Expr::col(Alias::new("rgt")).lt(Value::from(rgt)))
            .order_by(Alias::new("lft"), Order::Asc);
    } else {
        members
            .and_where(Expr::col(Alias::new("lft")).lt(Value::from(lft)))
            .and_where(Expr::col(Alias::new("rgt")).gt(Value::from(rgt)))
            .order_by(Alias::new("lft"), Order::Desc);
    }
    let rows = deps.exec.query(&deps.backend.render(&members)).await?;
    Ok(rows.iter().filter_map(|r| row_str(r, "name")).collect())
}

/// Compile one predicate against its (already resolved) entity type.
///
/// Deterministic for a fixed (predicate, schema, NULL-safety) triple;
/// tree operators additionally consult the database for the current
/// node bounds.
pub(crate) async fn compile(
    pred: &FilterPredicate,
    dt: &DocType,
    deps: &PredicateDeps<'_>,
) -> Result<SimpleExpr, QueryError> {
    let table = tables::table_for(&pred.doctype);
    let coalesced = pred.fieldname.to_lowercase().contains("ifnull(");
    let col = || -> Expr {
        if coalesced {
            Expr::expr(Expr::cust(pred.fieldname.clone()))
        } else {
            Expr::col((Alias::new(table.clone()), Alias::new(pred.fieldname.clone())))
        }
    };
    let wrapped = |fallback: Fallback| -> Expr { Expr::expr(Func::if_null(col(), fallback.expr())) };

    // Tree operators expand into a plain IN/NOT IN over resolved names.
    if pred.operator.is_tree() {
        let node = pred.value.as_str().unwrap_or_default().trim();
        let ref_doctype = dt
            .get_field(&pred.fieldname)
            .and_then(|f| f.options.clone())
            .unwrap_or_else(|| pred.doctype.clone());
        let descending = matches!(
            pred.operator,
            Operator::DescendantsOf | Operator::NotDescendantsOf
        );
        let names = tree_members(&ref_doctype, node, descending, deps).await?;
        let values: Vec<Value> = if names.is_empty() {
            vec![Value::from("")]
        } else {
            names.into_iter().map(Value::from).collect()
        };
        let lhs = if deps.ignore_ifnull || coalesced {
            col()
        } else {
            wrapped(Fallback::Empty)
        };
        let negated = matches!(
            pred.operator,
            Operator::NotAncestorsOf | Operator::NotDescendantsOf
        );
        return Ok(if negated {
            lhs.is_not_in(values)
        } else {
            lhs.is_in(values)
        });
    }

    // IN/NOT IN: comma-joined strings become lists; an empty list compiles
    // to `IN ('')` so the SQL stays valid and matches nothing.
    if matches!(pred.operator, Operator::In | Operator::NotIn) {
        let items: Vec<String> = match &pred.value {
            JsonValue::String(s) => s.split(',').map(|v| v.trim().to_owned()).collect(),
            JsonValue::Array(a) => a
                .iter()
                .map(|v| json_scalar_string(v).trim().to_owned())
                .collect(),
            JsonValue::Null => Vec::new(),
            other => vec![json_scalar_string(other).trim().to_owned()],
        };
        // `IN` only needs the wrap when empties are in play; `NOT IN` always
        // does, since `NULL NOT IN (...)` is unknown in three-valued logic
        // and the row must still be excluded deterministically.
        let can_be_null = if pred.operator == Operator::In {
            items.is_empty() || items.iter().any(String::is_empty)
        } else {
            true
        };
        let values: Vec<Value> = if items.is_empty() {
            vec![Value::from("")]
        } else {
            items.into_iter().map(Value::from).collect()
        };
        let lhs = if deps.ignore_ifnull || !can_be_null || coalesced {
            col()
        } else {
            wrapped(Fallback::Empty)
        };
        return Ok(if pred.operator == Operator::NotIn {
            lhs.is_not_in(values)
        } else {
            lhs.is_in(values)
        });
    }

    let df = dt.get_field(&pred.fieldname);
    let df_kind = df.map(|f| f.kind);
    let can_be_null = !df_kind.is_some_and(FieldKind::is_numeric);
    let value_truthy = json_truthy(&pred.value);
    let is_default_timestamp = matches!(pred.fieldname.as_str(), "creation" | "modified");

    let mut operator = pred.operator;
    let mut value = pred.value.clone();

    // Period operators resolve to a concrete date range, then compile as
    // BETWEEN with the datetime epoch fallback.
    if operator.is_period() {
        let today = dates::today();
        let keyword = json_scalar_string(&value);
        let range = match operator {
            Operator::Timespan => dates::timespan_range(&keyword, today),
            Operator::Previous => dates::period_range("previous", &keyword, today),
            _ => dates::period_range("next", &keyword, today),
        }
        .ok_or_else(|| QueryError::Malformed(format!("unknown timespan: {keyword}")))?;
        operator = Operator::Between;
        value = JsonValue::Array(vec![
            JsonValue::String(range.0.format("%Y-%m-%d").to_string()),
            JsonValue::String(range.1.format("%Y-%m-%d").to_string()),
        ]);
    }

    // `is set` / `is not set` compare the coalesced column against the
    // empty string; NULL and '' are indistinguishable by design.
    if operator == Operator::Is {
        let lhs = if coalesced { col() } else { wrapped(Fallback::Empty) };
        return match value.as_str() {
            Some("set") => Ok(lhs.ne(Value::from(""))),
            Some("not set") => Ok(lhs.eq(Value::from(""))),
            _ => Err(QueryError::Malformed(
                "`is` filter value must be `set` or `not set`".to_owned(),
            )),
        };
    }

    let (payload, fallback): (Payload, Fallback) = if matches!(
        operator,
        Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte
    ) && is_default_timestamp
    {
        (Payload::Str(json_scalar_string(&value)), Fallback::Null)
    } else if operator == Operator::Between {
        let is_datetime_column = df_kind == Some(FieldKind::Datetime) || is_default_timestamp;
        let date_ish = is_datetime_column || df_kind == Some(FieldKind::Date);
        let (from, to) = dates::between_bounds(
            &value,
            df_kind == Some(FieldKind::Datetime),
            df.is_some() && !is_default_timestamp,
            dates::today(),
        );
        let fallback = if date_ish { Fallback::DatetimeEpoch } else { Fallback::Empty };
        (Payload::Between(from, to), fallback)
    } else if df_kind == Some(FieldKind::Date) {
        (Payload::Str(dates::format_date(&value)), Fallback::DateEpoch)
    } else if df_kind == Some(FieldKind::Datetime) {
        (
            Payload::Str(dates::format_datetime(&value)),
            Fallback::DatetimeEpoch,
        )
    } else if df_kind == Some(FieldKind::Time) {
        (Payload::Str(dates::format_time(&value)), Fallback::TimeEpoch)
    } else if matches!(operator, Operator::Like | Operator::NotLike)
        || (value.is_string() && !df_kind.is_some_and(FieldKind::is_numeric))
    {
        let mut s = json_scalar_string(&value);
        if matches!(operator, Operator::Like | Operator::NotLike) {
            // the engine treats backslash as an escape inside LIKE patterns
            s = s.replace('\\', "\\\\");
        }
        (Payload::Str(s), Fallback::Empty)
    } else if operator == Operator::Eq
        && matches!(df_kind, Some(FieldKind::Link | FieldKind::Data))
    {
        (Payload::Str(json_scalar_string(&value)), Fallback::Empty)
    } else if pred.fieldname == "name" {
        (Payload::Str(json_scalar_string(&value)), Fallback::Empty)
    } else {
        (Payload::Num(json_flt(&value)), Fallback::Zero)
    };

    let skip_wrap = deps.ignore_ifnull
        || !can_be_null
        || (value_truthy && matches!(operator, Operator::Eq | Operator::Like))
        || coalesced;
    let lhs = if skip_wrap { col() } else { wrapped(fallback) };

    let scalar = |p: &Payload| -> Value {
        match p {
            Payload::Str(s) => Value::from(s.clone()),
            Payload::Num(n) => Value::from(*n),
            Payload::Between(..) => Value::from(""),
        }
    };

    Ok(match operator {
        Operator::Eq => lhs.eq(scalar(&payload)),
        Operator::Ne => lhs.ne(scalar(&payload)),
        Operator::Gt => lhs.gt(scalar(&payload)),
        Operator::Lt => lhs.lt(scalar(&payload)),
        Operator::Gte => lhs.gte(scalar(&payload)),
        Operator::Lte => lhs.lte(scalar(&payload)),
        Operator::Like | Operator::NotLike => {
            let Payload::Str(s) = &payload else {
                return Err(QueryError::Malformed("like value must be text".to_owned()));
            };
            if operator == Operator::NotLike {
                lhs.not_like(s.clone())
            } else if deps.backend == SqlBackend::Postgres && skip_wrap {
                // Postgres gets a case-insensitive match, but only on
                // the unwrapped form.
                SimpleExpr::from(lhs).binary(
                    BinOper::Custom("ILIKE"),
                    SimpleExpr::from(Value::from(s.clone())),
                )
            } else {
                lhs.like(s.clone())
            }
        }
        Operator::Between => {
            let Payload::Between(from, to) = payload else {
                return Err(QueryError::Malformed("between needs two bounds".to_owned()));
            };
            lhs.between(Value::from(from), Value::from(to))
        }
        _ => {
            return Err(QueryError::UnknownOperator(operator.to_string()));
        }
    })
}
