//! Test fixtures: a recording executor and a ready-made metadata set.

use std::sync::{Arc, Mutex};

use dockit_meta::testing::StaticMetaProvider;
use dockit_meta::{DocType, FieldDef, FieldKind};
use serde_json::Value as JsonValue;

use crate::exec::{ExecError, Row, SqlExecutor};

/// An executor that records every statement and replays canned rows.
///
/// Responses are matched by substring against the rendered SQL, so tree
/// lookups and the main statement can be scripted independently.
#[derive(Default)]
pub struct FakeExecutor {
    statements: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, Vec<Row>)>>,
}

impl FakeExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Queue rows for any statement containing `needle`.
    pub fn respond_with(&self, needle: &str, rows: Vec<Row>) {
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((needle.to_owned(), rows));
    }

    /// Every statement seen so far, in execution order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last_statement(&self) -> Option<String> {
        self.statements
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[async_trait::async_trait]
impl SqlExecutor for FakeExecutor {
    async fn query(&self, sql: &str) -> Result<Vec<Row>, ExecError> {
        self.statements
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(sql.to_owned());
        let responses = self
            .responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(responses
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

/// One row from column/value pairs.
#[must_use]
pub fn row(pairs: Vec<(&str, JsonValue)>) -> Row {
    pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
}

/// A small schema exercising links, child tables, trees and submittable
/// types, reused across the crate's tests.
#[must_use]
pub fn fixture_meta() -> StaticMetaProvider {
    StaticMetaProvider::new()
        .with_doctype(
            DocType::new("Item")
                .with_field(FieldDef::new("item_name", FieldKind::Data))
                .with_field(FieldDef::new("item_group", FieldKind::Link).with_options("Item Group"))
                .with_field(FieldDef::new("qty", FieldKind::Float))
                .with_field(FieldDef::new("disabled", FieldKind::Check))
                .with_field(FieldDef::new("release_date", FieldKind::Date))
                .with_field(FieldDef::new("last_seen", FieldKind::Datetime))
                .with_field(FieldDef::new("cutoff", FieldKind::Time)),
            vec![
                "name",
                "owner",
                "modified",
                "item_name",
                "item_group",
                "qty",
                "disabled",
                "release_date",
                "last_seen",
                "cutoff",
            ],
        )
        .with_doctype(
            {
                let mut dt = DocType::new("Item Group")
                    .with_field(FieldDef::new("parent_item_group", FieldKind::Link)
                        .with_options("Item Group"));
                dt.is_tree = true;
                dt
            },
            vec!["name", "lft", "rgt", "parent_item_group"],
        )
        .with_doctype(
            {
                let mut dt = DocType::new("Sales Order")
                    .with_field(
                        FieldDef::new("customer", FieldKind::Link).with_options("Customer"),
                    )
                    .with_field(
                        FieldDef::new("territory", FieldKind::Link).with_options("Territory"),
                    )
                    .with_field(
                        FieldDef::new("company", FieldKind::Link)
                            .with_options("Company")
                            .skip_user_permissions(),
                    )
                    .with_field(FieldDef::new("starts_on", FieldKind::Datetime))
                    .with_field(
                        FieldDef::new("items", FieldKind::Table).with_options("Sales Order Item"),
                    );
                dt.is_submittable = true;
                dt
            },
            vec![
                "name",
                "owner",
                "modified",
                "docstatus",
                "customer",
                "territory",
                "company",
                "starts_on",
            ],
        )
        .with_doctype(
            {
                let mut dt = DocType::new("Sales Order Item")
                    .with_field(FieldDef::new("item_code", FieldKind::Link).with_options("Item"))
                    .with_field(FieldDef::new("qty", FieldKind::Float));
                dt.istable = true;
                dt
            },
            vec!["name", "parent", "item_code", "qty"],
        )
        .with_doctype(DocType::new("Customer"), vec!["name", "owner", "modified"])
        .with_doctype(DocType::new("Company"), vec!["name"])
        .with_doctype(DocType::new("Territory"), vec!["name"])
        .with_tableless_doctype(DocType::new("Phantom Type"))
}
