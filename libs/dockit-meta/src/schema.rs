//! `DocType` and `FieldDef`: the per-entity-type schema records.

use serde::{Deserialize, Serialize};

use crate::kind::FieldKind;

/// Sort direction for a declared default sort.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDir {
    #[serde(rename = "asc")]
    Asc,
    #[default]
    #[serde(rename = "desc")]
    Desc,
}

impl SortDir {
    /// Parse `asc`/`desc` (any case); anything else falls back to descending,
    /// matching how declared sort orders are tolerated in stored metadata.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }
}

/// One field's type and metadata within a `DocType`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDef {
    pub fieldname: String,
    pub kind: FieldKind,
    /// Link target or child `DocType` name, depending on `kind`.
    #[serde(default)]
    pub options: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub permlevel: u8,
    /// Link fields flagged here are skipped by the user-permission evaluator.
    #[serde(default)]
    pub ignore_user_permissions: bool,
    #[serde(default)]
    pub translatable: bool,
}

impl FieldDef {
    #[must_use]
    pub fn new(fieldname: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            fieldname: fieldname.into(),
            kind,
            options: None,
            label: None,
            permlevel: 0,
            ignore_user_permissions: false,
            translatable: false,
        }
    }

    /// Set the link target / child type.
    #[must_use]
    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    #[must_use]
    pub fn skip_user_permissions(mut self) -> Self {
        self.ignore_user_permissions = true;
        self
    }
}

/// One entity type: identifier, ordered field definitions, and the flags
/// the compiler consults (child-table, nested-set tree, submittable).
///
/// Instances are immutable once published into the `MetaCache`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocType {
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Child/table types are queried through their parent and carry a
    /// `parent` reference column.
    #[serde(default)]
    pub istable: bool,
    /// Nested-set tree types carry `lft`/`rgt` bounds per row.
    #[serde(default)]
    pub is_tree: bool,
    /// Submittable types carry a `docstatus` column; drafts sort first.
    #[serde(default)]
    pub is_submittable: bool,
    /// Declared default sort: a single fieldname or a comma-separated
    /// multi-field clause with per-field directions (`idx desc, modified desc`).
    #[serde(default)]
    pub sort_field: Option<String>,
    #[serde(default)]
    pub sort_order: Option<SortDir>,
    /// Callers restricted to `select` permission may not read full rows.
    #[serde(default)]
    pub select_only: bool,
}

impl DocType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            istable: false,
            is_tree: false,
            is_submittable: false,
            sort_field: None,
            sort_order: None,
            select_only: false,
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// The physical table backing this type.
    #[must_use]
    pub fn table_name(&self) -> String {
        format!("tab{}", self.name)
    }

    /// Derive the `DocType` name back out of a `tab`-prefixed table name.
    #[must_use]
    pub fn name_from_table(table: &str) -> &str {
        table.strip_prefix("tab").unwrap_or(table)
    }

    #[must_use]
    pub fn get_field(&self, fieldname: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.fieldname == fieldname)
    }

    #[must_use]
    pub fn has_field(&self, fieldname: &str) -> bool {
        self.get_field(fieldname).is_some()
    }

    /// All Link fields, in declaration order.
    pub fn link_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.kind == FieldKind::Link)
    }

    /// All child-table fields, in declaration order.
    pub fn table_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.kind == FieldKind::Table)
    }
}
