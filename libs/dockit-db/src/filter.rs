//! Canonicalization of caller-supplied filter and field representations.
//!
//! Callers hand filters over in several shapes: a mapping of fieldname to
//! value (or `[operator, value]` pair), a list of 3/4-element tuples, a
//! list of raw SQL fragments, or JSON text encoding any of those. All of
//! them normalize into one ordered sequence of [`FilterItem`]s.
//!
//! The fields/filters argument swap is kept as an explicit, tested
//! compatibility shim in [`reconcile_args`]: callers routinely mix the
//! two up, and the shapes are distinct enough to repair the call
//! instead of failing it.

use std::fmt;

use dockit_meta::MetaProvider;
use serde_json::Value as JsonValue;

use crate::errors::QueryError;
use crate::sanitize;

/// Standard columns every entity table carries.
pub(crate) const DEFAULT_FIELDS: &[&str] = &[
    "doctype",
    "name",
    "owner",
    "creation",
    "modified",
    "modified_by",
    "parent",
    "parentfield",
    "parenttype",
    "idx",
    "docstatus",
];

/// Columns that exist only on tables with the matching feature enabled;
/// silently dropped from fields and filters when absent.
pub(crate) const OPTIONAL_FIELDS: &[&str] =
    &["_user_tags", "_comments", "_assign", "_liked_by", "_seen"];

/// The fixed filter operator enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
    NotLike,
    In,
    NotIn,
    Between,
    Is,
    AncestorsOf,
    DescendantsOf,
    NotAncestorsOf,
    NotDescendantsOf,
    Previous,
    Next,
    Timespan,
}

impl Operator {
    /// Parse the operator token of a filter tuple (case-insensitive).
    ///
    /// # Errors
    /// `QueryError::UnknownOperator` for anything outside the enumeration.
    pub fn parse(token: &str) -> Result<Self, QueryError> {
        let t = token.trim().to_lowercase();
        Ok(match t.as_str() {
            "=" => Self::Eq,
            "!=" => Self::Ne,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Gte,
            "<=" => Self::Lte,
            "like" => Self::Like,
            "not like" => Self::NotLike,
            "in" => Self::In,
            "not in" => Self::NotIn,
            "between" => Self::Between,
            "is" => Self::Is,
            "ancestors of" => Self::AncestorsOf,
            "descendants of" => Self::DescendantsOf,
            "not ancestors of" => Self::NotAncestorsOf,
            "not descendants of" => Self::NotDescendantsOf,
            "previous" => Self::Previous,
            "next" => Self::Next,
            "timespan" => Self::Timespan,
            _ => return Err(QueryError::UnknownOperator(token.to_owned())),
        })
    }

    #[must_use]
    pub const fn is_tree(self) -> bool {
        matches!(
            self,
            Self::AncestorsOf | Self::DescendantsOf | Self::NotAncestorsOf | Self::NotDescendantsOf
        )
    }

    #[must_use]
    pub const fn is_period(self) -> bool {
        matches!(self, Self::Previous | Self::Next | Self::Timespan)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Like => "like",
            Self::NotLike => "not like",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Between => "between",
            Self::Is => "is",
            Self::AncestorsOf => "ancestors of",
            Self::DescendantsOf => "descendants of",
            Self::NotAncestorsOf => "not ancestors of",
            Self::NotDescendantsOf => "not descendants of",
            Self::Previous => "previous",
            Self::Next => "next",
            Self::Timespan => "timespan",
        };
        f.write_str(s)
    }
}

/// One canonical filter predicate, resolved against an entity type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterPredicate {
    pub doctype: String,
    pub fieldname: String,
    pub operator: Operator,
    pub value: JsonValue,
}

/// One normalized filter entry: a typed predicate, or a raw SQL fragment
/// carried through verbatim (legacy string filters).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterItem {
    Predicate(FilterPredicate),
    Fragment(String),
}

/// The untrusted filters argument, before normalization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FilterInput {
    #[default]
    Empty,
    /// `fieldname -> value` or `fieldname -> [operator, value]`.
    Map(Vec<(String, JsonValue)>),
    /// Tuples (JSON arrays), single-entry mappings, and/or raw fragments.
    List(Vec<JsonValue>),
    /// JSON text encoding one of the above.
    Json(String),
}

impl FilterInput {
    #[must_use]
    pub fn map<K: Into<String>>(pairs: Vec<(K, JsonValue)>) -> Self {
        Self::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub fn tuples(rows: Vec<JsonValue>) -> Self {
        Self::List(rows)
    }

    #[must_use]
    pub fn fragments(frags: Vec<&str>) -> Self {
        Self::List(frags.into_iter().map(|f| JsonValue::String(f.to_owned())).collect())
    }

    #[must_use]
    pub fn json(text: impl Into<String>) -> Self {
        Self::Json(text.into())
    }
}

/// The untrusted fields argument, before normalization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FieldsInput {
    /// Select the primary table's `name` column (or the plucked column).
    #[default]
    Default,
    List(Vec<String>),
    /// JSON text (an array), or a comma-separated expression list.
    Json(String),
}

impl FieldsInput {
    #[must_use]
    pub fn list(fields: Vec<&str>) -> Self {
        Self::List(fields.into_iter().map(str::to_owned).collect())
    }

    #[must_use]
    pub fn json(text: impl Into<String>) -> Self {
        Self::Json(text.into())
    }
}

/* ---------- JSON decoding ---------- */

fn filters_from_json_value(v: JsonValue) -> Result<FilterInput, QueryError> {
    match v {
        JsonValue::Null => Ok(FilterInput::Empty),
        JsonValue::Object(m) => Ok(FilterInput::Map(m.into_iter().collect())),
        JsonValue::Array(a) => Ok(FilterInput::List(a)),
        other => Err(QueryError::Malformed(format!(
            "filters must decode to a mapping or list, got {other}"
        ))),
    }
}

/// Resolve a `Json` filters argument into a concrete shape.
fn decode_filters(input: FilterInput) -> Result<FilterInput, QueryError> {
    match input {
        FilterInput::Json(text) => {
            let v: JsonValue = serde_json::from_str(&text)
                .map_err(|e| QueryError::Malformed(format!("invalid filters JSON: {e}")))?;
            filters_from_json_value(v)
        }
        other => Ok(other),
    }
}

/// Intermediate shape of the fields argument after JSON decoding.
enum DecodedFields {
    Default,
    List(Vec<String>),
    /// The caller passed filter-shaped data in the fields slot.
    FilterShaped(FilterInput),
}

fn decode_fields(input: FieldsInput) -> Result<DecodedFields, QueryError> {
    match input {
        FieldsInput::Default => Ok(DecodedFields::Default),
        FieldsInput::List(list) => {
            let list: Vec<String> = list.into_iter().filter(|f| !f.is_empty()).collect();
            if list.is_empty() {
                return Ok(DecodedFields::Default);
            }
            Ok(DecodedFields::List(list))
        }
        FieldsInput::Json(text) => {
            if text.trim() == "*" {
                return Ok(DecodedFields::List(vec!["*".to_owned()]));
            }
            match serde_json::from_str::<JsonValue>(&text) {
                Ok(JsonValue::Array(items)) => {
                    if items.iter().all(JsonValue::is_string) {
                        let list = items
                            .into_iter()
                            .filter_map(|v| v.as_str().map(str::to_owned))
                            .filter(|f| !f.is_empty())
                            .collect::<Vec<_>>();
                        if list.is_empty() {
                            Ok(DecodedFields::Default)
                        } else {
                            Ok(DecodedFields::List(list))
                        }
                    } else {
                        // list-of-lists: structurally a filter
                        Ok(DecodedFields::FilterShaped(FilterInput::List(items)))
                    }
                }
                Ok(JsonValue::Object(m)) => Ok(DecodedFields::FilterShaped(FilterInput::Map(
                    m.into_iter().collect(),
                ))),
                Ok(other) => Err(QueryError::Malformed(format!(
                    "fields must decode to a list, got {other}"
                ))),
                // Not JSON at all: treat as a comma-separated expression list.
                Err(_) => {
                    let list: Vec<String> = text
                        .split(',')
                        .map(|f| f.trim().to_owned())
                        .filter(|f| !f.is_empty())
                        .collect();
                    if list.is_empty() {
                        Ok(DecodedFields::Default)
                    } else {
                        Ok(DecodedFields::List(list))
                    }
                }
            }
        }
    }
}

/* ---------- the fields/filters swap shim ---------- */

/// Decode both arguments and repair a swapped call.
///
/// Two shapes are unambiguous: a mapping or list-of-lists in the fields
/// slot is really a filter, and a list of two or more bare strings in the
/// filters slot is really a field list. Both repairs are deliberate,
/// long-standing ergonomics of this API, not accidents.
///
/// # Errors
/// `QueryError::Malformed` when JSON decoding fails or a repaired slot
/// still has an unusable shape.
pub(crate) fn reconcile_args(
    fields: FieldsInput,
    filters: FilterInput,
) -> Result<(Option<Vec<String>>, FilterInput), QueryError> {
    let decoded_fields = decode_fields(fields)?;
    let decoded_filters = decode_filters(filters)?;

    let fields_list = match decoded_fields {
        DecodedFields::FilterShaped(real_filters) => {
            // fields slot carried a filter; salvage a field list from the
            // filters slot if it holds bare strings.
            let fields = match decoded_filters {
                FilterInput::Empty => None,
                FilterInput::List(items) if items.iter().all(JsonValue::is_string) => Some(
                    items
                        .into_iter()
                        .filter_map(|v| v.as_str().map(str::to_owned))
                        .collect(),
                ),
                _ => {
                    return Err(QueryError::Malformed(
                        "both fields and filters arguments look like filters".to_owned(),
                    ))
                }
            };
            return Ok((fields, real_filters));
        }
        DecodedFields::Default => None,
        DecodedFields::List(list) => Some(list),
    };

    // Fields given, and the filters slot holds a bare string list: swapped.
    if let (Some(list), FilterInput::List(items)) = (&fields_list, &decoded_filters) {
        if items.len() > 1 && items.first().is_some_and(JsonValue::is_string) {
            let new_fields: Vec<String> = items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| QueryError::Malformed("mixed field list".to_owned()))
                })
                .collect::<Result<_, _>>()?;
            let new_filters = FilterInput::List(
                list.iter().map(|f| JsonValue::String(f.clone())).collect(),
            );
            return Ok((Some(new_fields), new_filters));
        }
    }

    Ok((fields_list, decoded_filters))
}

/* ---------- normalization ---------- */

fn operator_token(v: &JsonValue) -> Result<&str, QueryError> {
    v.as_str()
        .ok_or_else(|| QueryError::Malformed("filter operator must be a string".to_owned()))
}

fn fieldname_token(v: &JsonValue) -> Result<String, QueryError> {
    v.as_str()
        .map(str::to_owned)
        .ok_or_else(|| QueryError::Malformed("filter fieldname must be a string".to_owned()))
}

/// Build a predicate out of a `fieldname -> value` map entry.
fn predicate_from_map_entry(
    doctype: &str,
    fieldname: String,
    value: JsonValue,
) -> Result<FilterPredicate, QueryError> {
    let (operator, value) = match value {
        JsonValue::Array(mut pair) => {
            if pair.len() < 2 {
                return Err(QueryError::Malformed(
                    "filter value pair must be [operator, value]".to_owned(),
                ));
            }
            let value = pair.remove(1);
            let operator = Operator::parse(operator_token(&pair[0])?)?;
            (operator, value)
        }
        other => (Operator::Eq, other),
    };
    Ok(FilterPredicate {
        doctype: doctype.to_owned(),
        fieldname,
        operator,
        value,
    })
}

/// Build a predicate out of a 3/4-element tuple. Longer tuples are
/// truncated to four elements; shorter ones are malformed.
fn predicate_from_tuple(doctype: &str, tuple: &[JsonValue]) -> Result<FilterPredicate, QueryError> {
    let (dt, fieldname, op, value) = match tuple.len() {
        3 => (
            doctype.to_owned(),
            fieldname_token(&tuple[0])?,
            operator_token(&tuple[1])?,
            tuple[2].clone(),
        ),
        n if n >= 4 => (
            fieldname_token(&tuple[0])?,
            fieldname_token(&tuple[1])?,
            operator_token(&tuple[2])?,
            tuple[3].clone(),
        ),
        _ => {
            return Err(QueryError::Malformed(
                "filter tuple must have 3 or 4 values (doctype, fieldname, operator, value)"
                    .to_owned(),
            ))
        }
    };
    Ok(FilterPredicate {
        doctype: dt,
        fieldname,
        operator: Operator::parse(op)?,
        value,
    })
}

/// `null` values mean "the field is not set"; an equality against NULL
/// would never match in SQL, so rewrite it up front.
fn apply_null_shorthand(mut pred: FilterPredicate) -> FilterPredicate {
    if pred.operator == Operator::Eq && pred.value.is_null() {
        pred.operator = Operator::Is;
        pred.value = JsonValue::String("not set".to_owned());
    }
    pred
}

/// Re-home a predicate onto a child type when the fieldname only exists
/// there; filters on child columns are written without naming the child.
async fn resolve_child_doctype(
    mut pred: FilterPredicate,
    meta: &dyn MetaProvider,
) -> Result<FilterPredicate, QueryError> {
    if DEFAULT_FIELDS.contains(&pred.fieldname.as_str())
        || OPTIONAL_FIELDS.contains(&pred.fieldname.as_str())
    {
        return Ok(pred);
    }
    let Ok(dt) = meta.doctype(&pred.doctype).await else {
        return Ok(pred);
    };
    if dt.has_field(&pred.fieldname) {
        return Ok(pred);
    }
    for table_field in dt.table_fields() {
        let Some(child_name) = table_field.options.as_deref() else {
            continue;
        };
        if let Ok(child) = meta.doctype(child_name).await {
            if child.has_field(&pred.fieldname) {
                pred.doctype = child.name.clone();
                break;
            }
        }
    }
    Ok(pred)
}

/// Normalize one filters argument into the canonical ordered sequence.
///
/// # Errors
/// `QueryError::Malformed` on unusable shapes, `QueryError::UnknownOperator`
/// on operator tokens outside the enumeration, `QueryError::InjectionRejected`
/// on hostile fieldnames.
pub(crate) async fn normalize_filters(
    input: FilterInput,
    doctype: &str,
    meta: &dyn MetaProvider,
) -> Result<Vec<FilterItem>, QueryError> {
    let input = decode_filters(input)?;

    let mut items = Vec::new();
    match input {
        FilterInput::Empty => {}
        FilterInput::Map(pairs) => {
            for (fieldname, value) in pairs {
                items.push(finish_predicate(
                    predicate_from_map_entry(doctype, fieldname, value)?,
                    meta,
                )
                .await?);
            }
        }
        FilterInput::List(raw) => {
            for entry in raw {
                match entry {
                    JsonValue::String(fragment) => items.push(FilterItem::Fragment(fragment)),
                    JsonValue::Array(tuple) => {
                        items.push(
                            finish_predicate(predicate_from_tuple(doctype, &tuple)?, meta).await?,
                        );
                    }
                    JsonValue::Object(map) => {
                        // single-entry mapping inside a list
                        let Some((fieldname, value)) = map.into_iter().next() else {
                            continue;
                        };
                        items.push(
                            finish_predicate(
                                predicate_from_map_entry(doctype, fieldname, value)?,
                                meta,
                            )
                            .await?,
                        );
                    }
                    other => {
                        return Err(QueryError::Malformed(format!(
                            "unsupported filter entry: {other}"
                        )))
                    }
                }
            }
        }
        FilterInput::Json(_) => unreachable!("decoded above"),
    }
    Ok(items)
}

async fn finish_predicate(
    pred: FilterPredicate,
    meta: &dyn MetaProvider,
) -> Result<FilterItem, QueryError> {
    sanitize::sanitize_fieldname(&pred.fieldname)?;
    let pred = apply_null_shorthand(pred);
    let pred = resolve_child_doctype(pred, meta).await?;
    Ok(FilterItem::Predicate(pred))
}

#[cfg(test)]
mod tests {
    use dockit_meta::testing::StaticMetaProvider;
    use dockit_meta::{DocType, FieldDef, FieldKind};
    use serde_json::json;

    use super::*;

    fn meta() -> StaticMetaProvider {
        StaticMetaProvider::new()
            .with_doctype(
                DocType::new("Sales Order")
                    .with_field(FieldDef::new("customer", FieldKind::Link).with_options("Customer"))
                    .with_field(
                        FieldDef::new("items", FieldKind::Table).with_options("Sales Order Item"),
                    ),
                vec!["name", "customer"],
            )
            .with_doctype(
                DocType::new("Sales Order Item")
                    .with_field(FieldDef::new("item_code", FieldKind::Link).with_options("Item")),
                vec!["name", "item_code", "parent"],
            )
    }

    #[tokio::test]
    async fn map_entry_infers_equality() {
        let items = normalize_filters(
            FilterInput::map(vec![("customer", json!("Acme"))]),
            "Sales Order",
            &meta(),
        )
        .await
        .unwrap();
        assert_eq!(
            items,
            vec![FilterItem::Predicate(FilterPredicate {
                doctype: "Sales Order".to_owned(),
                fieldname: "customer".to_owned(),
                operator: Operator::Eq,
                value: json!("Acme"),
            })]
        );
    }

    #[tokio::test]
    async fn map_entry_with_pair_uses_given_operator() {
        let items = normalize_filters(
            FilterInput::map(vec![("customer", json!(["in", ["Acme", "Globex"]]))]),
            "Sales Order",
            &meta(),
        )
        .await
        .unwrap();
        let FilterItem::Predicate(p) = &items[0] else {
            panic!("expected predicate");
        };
        assert_eq!(p.operator, Operator::In);
        assert_eq!(p.value, json!(["Acme", "Globex"]));
    }

    #[tokio::test]
    async fn null_value_becomes_is_not_set() {
        let items = normalize_filters(
            FilterInput::map(vec![("customer", JsonValue::Null)]),
            "Sales Order",
            &meta(),
        )
        .await
        .unwrap();
        let FilterItem::Predicate(p) = &items[0] else {
            panic!("expected predicate");
        };
        assert_eq!(p.operator, Operator::Is);
        assert_eq!(p.value, json!("not set"));
    }

    #[tokio::test]
    async fn json_text_decodes_to_tuples() {
        let items = normalize_filters(
            FilterInput::json(r#"[["Sales Order", "customer", "=", "Acme"]]"#),
            "Sales Order",
            &meta(),
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn invalid_json_is_malformed() {
        let err = normalize_filters(FilterInput::json("{nope"), "Sales Order", &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Malformed(_)));
    }

    #[tokio::test]
    async fn scalar_json_is_malformed() {
        let err = normalize_filters(FilterInput::json("42"), "Sales Order", &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Malformed(_)));
    }

    #[tokio::test]
    async fn unknown_operator_is_rejected() {
        let err = normalize_filters(
            FilterInput::map(vec![("customer", json!(["resembles", "Acme"]))]),
            "Sales Order",
            &meta(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QueryError::UnknownOperator(op) if op == "resembles"));
    }

    #[tokio::test]
    async fn short_tuple_is_malformed() {
        let err = normalize_filters(
            FilterInput::tuples(vec![json!(["customer", "="])]),
            "Sales Order",
            &meta(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QueryError::Malformed(_)));
    }

    #[tokio::test]
    async fn child_field_filter_is_rehomed() {
        let items = normalize_filters(
            FilterInput::map(vec![("item_code", json!("WIDGET"))]),
            "Sales Order",
            &meta(),
        )
        .await
        .unwrap();
        let FilterItem::Predicate(p) = &items[0] else {
            panic!("expected predicate");
        };
        assert_eq!(p.doctype, "Sales Order Item");
    }

    #[test]
    fn swap_shim_moves_map_out_of_fields_slot() {
        let (fields, filters) = reconcile_args(
            FieldsInput::json(r#"{"customer": "Acme"}"#),
            FilterInput::fragments(vec!["name", "title"]),
        )
        .unwrap();
        assert_eq!(fields, Some(vec!["name".to_owned(), "title".to_owned()]));
        assert_eq!(
            filters,
            FilterInput::Map(vec![("customer".to_owned(), json!("Acme"))])
        );
    }

    #[test]
    fn swap_shim_moves_string_list_out_of_filters_slot() {
        let (fields, filters) = reconcile_args(
            FieldsInput::list(vec!["status = 'Open'"]),
            FilterInput::List(vec![json!("name"), json!("title")]),
        )
        .unwrap();
        assert_eq!(fields, Some(vec!["name".to_owned(), "title".to_owned()]));
        assert_eq!(filters, FilterInput::List(vec![json!("status = 'Open'")]));
    }

    #[test]
    fn straight_call_is_untouched() {
        let (fields, filters) = reconcile_args(
            FieldsInput::list(vec!["name", "title"]),
            FilterInput::map(vec![("customer", json!("Acme"))]),
        )
        .unwrap();
        assert_eq!(fields, Some(vec!["name".to_owned(), "title".to_owned()]));
        assert_eq!(
            filters,
            FilterInput::Map(vec![("customer".to_owned(), json!("Acme"))])
        );
    }

    #[test]
    fn comma_string_fields_split() {
        let (fields, _) =
            reconcile_args(FieldsInput::json("name, title"), FilterInput::Empty).unwrap();
        assert_eq!(fields, Some(vec!["name".to_owned(), "title".to_owned()]));
    }
}
