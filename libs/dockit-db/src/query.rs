//! The list query engine: one entry point per compiled statement.
//!
//! Control flow per call: reconcile fields/filters → normalize →
//! sanitize → resolve tables (permission-checked appends) → compile
//! predicates and evaluate permissions independently → assemble one
//! `SelectStatement` → render → execute (or return the SQL in dry-run).
//!
//! Nothing here is cached; every call builds a fresh plan because the
//! permission condition depends on the acting principal.

use std::sync::Arc;

use dockit_meta::{DocType, MetaError, MetaProvider};
use dockit_security::{HookRegistry, PermissionProvider, Principal};
use sea_orm::sea_query::{Alias, Condition, Expr, Query, SelectStatement, SimpleExpr};
use serde_json::Value as JsonValue;

use crate::errors::QueryError;
use crate::exec::{Row, SqlExecutor};
use crate::filter::{self, FieldsInput, FilterInput, FilterItem, OPTIONAL_FIELDS};
use crate::order;
use crate::permission::{self, PermissionDeps};
use crate::predicate::{self, PredicateDeps};
use crate::sanitize;
use crate::settings::EngineConfig;
use crate::tables::{self, JoinKind};

/// One list query request. Build with [`ListRequest::new`] and the
/// fluent setters; unset knobs keep their documented defaults.
#[derive(Clone, Debug)]
pub struct ListRequest {
    pub doctype: String,
    pub principal: Principal,
    pub fields: FieldsInput,
    pub filters: FilterInput,
    pub or_filters: FilterInput,
    pub order_by: Option<String>,
    pub group_by: Option<String>,
    pub limit_start: u64,
    pub limit_page_length: Option<u64>,
    pub join: JoinKind,
    pub distinct: bool,
    pub as_list: bool,
    pub with_childnames: bool,
    pub pluck: Option<String>,
    pub ignore_permissions: bool,
    pub ignore_ifnull: bool,
    /// Sanitizer strictness; `None` inherits the engine default.
    pub strict: Option<bool>,
    /// Tolerate a missing primary table and return an empty result.
    pub ignore_ddl: bool,
    /// Context type for `applicable_for` user-permission matching.
    pub reference_doctype: Option<String>,
    /// Owning parent, required when querying a child (table) type.
    pub parent_doctype: Option<String>,
}

impl ListRequest {
    #[must_use]
    pub fn new(doctype: impl Into<String>, principal: Principal) -> Self {
        Self {
            doctype: doctype.into(),
            principal,
            fields: FieldsInput::Default,
            filters: FilterInput::Empty,
            or_filters: FilterInput::Empty,
            order_by: None,
            group_by: None,
            limit_start: 0,
            limit_page_length: None,
            join: JoinKind::Left,
            distinct: false,
            as_list: false,
            with_childnames: false,
            pluck: None,
            ignore_permissions: false,
            ignore_ifnull: false,
            strict: None,
            ignore_ddl: false,
            reference_doctype: None,
            parent_doctype: None,
        }
    }

    #[must_use]
    pub fn fields(mut self, fields: FieldsInput) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn filters(mut self, filters: FilterInput) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn or_filters(mut self, or_filters: FilterInput) -> Self {
        self.or_filters = or_filters;
        self
    }

    #[must_use]
    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    #[must_use]
    pub fn group_by(mut self, clause: impl Into<String>) -> Self {
        self.group_by = Some(clause.into());
        self
    }

    #[must_use]
    pub fn start(mut self, offset: u64) -> Self {
        self.limit_start = offset;
        self
    }

    #[must_use]
    pub fn page_length(mut self, limit: u64) -> Self {
        self.limit_page_length = Some(limit);
        self
    }

    #[must_use]
    pub fn join(mut self, join: JoinKind) -> Self {
        self.join = join;
        self
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    #[must_use]
    pub fn as_list(mut self) -> Self {
        self.as_list = true;
        self
    }

    #[must_use]
    pub fn with_childnames(mut self) -> Self {
        self.with_childnames = true;
        self
    }

    #[must_use]
    pub fn pluck(mut self, fieldname: impl Into<String>) -> Self {
        self.pluck = Some(fieldname.into());
        self
    }

    #[must_use]
    pub fn ignore_permissions(mut self) -> Self {
        self.ignore_permissions = true;
        self
    }

    #[must_use]
    pub fn ignore_ifnull(mut self) -> Self {
        self.ignore_ifnull = true;
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    #[must_use]
    pub fn ignore_ddl(mut self) -> Self {
        self.ignore_ddl = true;
        self
    }

    #[must_use]
    pub fn reference_doctype(mut self, doctype: impl Into<String>) -> Self {
        self.reference_doctype = Some(doctype.into());
        self
    }

    #[must_use]
    pub fn parent_doctype(mut self, doctype: impl Into<String>) -> Self {
        self.parent_doctype = Some(doctype.into());
        self
    }
}

/// Result rows, shaped per the caller's request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryOutput {
    /// Keyed records (the default).
    Records(Vec<serde_json::Map<String, JsonValue>>),
    /// Positional tuples in select order (`as_list`).
    Tuples(Vec<Vec<JsonValue>>),
    /// One column flattened (`pluck`).
    Values(Vec<JsonValue>),
}

impl QueryOutput {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Records(r) => r.len(),
            Self::Tuples(t) => t.len(),
            Self::Values(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Compiled {
    stmt: SelectStatement,
    /// Output column name per select expression, when derivable.
    output_names: Option<Vec<String>>,
}

/// The permission-aware query compiler.
pub struct Engine {
    meta: Arc<dyn MetaProvider>,
    perms: Arc<dyn PermissionProvider>,
    exec: Arc<dyn SqlExecutor>,
    hooks: HookRegistry,
    config: EngineConfig,
}

impl Engine {
    #[must_use]
    pub fn new(
        meta: Arc<dyn MetaProvider>,
        perms: Arc<dyn PermissionProvider>,
        exec: Arc<dyn SqlExecutor>,
    ) -> Self {
        Self {
            meta,
            perms,
            exec,
            hooks: HookRegistry::new(),
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Compile and run one list query.
    ///
    /// # Errors
    /// Any [`QueryError`]; everything except `Exec` is raised before SQL
    /// reaches the database.
    pub async fn execute(&self, req: &ListRequest) -> Result<QueryOutput, QueryError> {
        let Some(compiled) = self.build(req).await? else {
            return Ok(empty_output(req));
        };
        let sql = self.config.backend.render(&compiled.stmt);
        tracing::debug!(doctype = %req.doctype, sql = %sql, "executing list query");
        let rows = self.exec.query(&sql).await?;
        Ok(shape_rows(rows, req, compiled.output_names.as_deref()))
    }

    /// Compile one list query and return the SQL text without executing
    /// it. `None` only when the primary table is missing and the caller
    /// opted into `ignore_ddl`.
    ///
    /// # Errors
    /// Same taxonomy as [`Engine::execute`], minus executor errors for
    /// the main statement.
    pub async fn compile_sql(&self, req: &ListRequest) -> Result<Option<String>, QueryError> {
        Ok(self
            .build(req)
            .await?
            .map(|c| self.config.backend.render(&c.stmt)))
    }

    /// Standalone permission condition for hand-written queries that
    /// need the same row-level restriction. `None` means unrestricted.
    ///
    /// # Errors
    /// `QueryError::PermissionDenied` when the principal may not query
    /// the type at all.
    pub async fn permission_condition(
        &self,
        doctype: &str,
        principal: &Principal,
        reference_doctype: Option<&str>,
    ) -> Result<Option<String>, QueryError> {
        let deps = PermissionDeps {
            meta: &*self.meta,
            perms: &*self.perms,
            hooks: &self.hooks,
            strict_user_permissions: self.config.apply_strict_user_permissions,
        };
        let cond = permission::evaluate(
            doctype,
            principal,
            reference_doctype.unwrap_or(doctype),
            &deps,
        )
        .await?;
        Ok(cond.map(|c| permission::condition_to_sql(c, self.config.backend)))
    }

    /// Compile one ad-hoc filter into a standalone SQL fragment, for
    /// filter UIs that preview conditions.
    ///
    /// # Errors
    /// Normalization and compilation errors as per [`QueryError`].
    pub async fn compile_predicate(
        &self,
        doctype: &str,
        filter: JsonValue,
    ) -> Result<String, QueryError> {
        let items =
            filter::normalize_filters(FilterInput::List(vec![filter]), doctype, &*self.meta)
                .await?;
        let Some(FilterItem::Predicate(pred)) = items.into_iter().next() else {
            return Err(QueryError::Malformed(
                "expected a filter predicate".to_owned(),
            ));
        };
        let dt = self.meta.doctype(&pred.doctype).await?;
        let deps = PredicateDeps {
            exec: &*self.exec,
            backend: self.config.backend,
            ignore_ifnull: false,
        };
        let expr = predicate::compile(&pred, dt.as_ref(), &deps).await?;
        Ok(permission::condition_to_sql(
            Condition::all().add(expr),
            self.config.backend,
        ))
    }

    /* ---------- compilation pipeline ---------- */

    async fn build(&self, req: &ListRequest) -> Result<Option<Compiled>, QueryError> {
        let dt = self.meta.doctype(&req.doctype).await?;
        let strict = req.strict.unwrap_or(self.config.strict);
        self.permission_gate(req, dt.as_ref()).await?;

        let columns = match self.meta.table_columns(&req.doctype).await {
            Ok(columns) => columns,
            Err(MetaError::TableMissing(name)) => {
                if req.ignore_ddl {
                    return Ok(None);
                }
                return Err(MetaError::TableMissing(name).into());
            }
            Err(e) => return Err(e.into()),
        };

        // Repair a swapped fields/filters call, then normalize both sides.
        let (fields_arg, filters_arg) =
            filter::reconcile_args(req.fields.clone(), req.filters.clone())?;
        let mut fields = match (fields_arg, &req.pluck) {
            (Some(list), _) => list,
            (None, Some(pluck)) => {
                sanitize::sanitize_fieldname(pluck)?;
                vec![format!("`tab{}`.`{}`", req.doctype, pluck)]
            }
            (None, None) => vec![format!("`tab{}`.`name`", req.doctype)],
        };

        let mut filters =
            filter::normalize_filters(filters_arg, &req.doctype, &*self.meta).await?;
        let mut or_filters =
            filter::normalize_filters(req.or_filters.clone(), &req.doctype, &*self.meta).await?;

        for field in &fields {
            sanitize::sanitize_field(field, strict)?;
        }

        // Table plan: the primary table, then permission-checked appends
        // for every table the field list touches.
        let primary = dt.table_name();
        let mut joined: Vec<String> = vec![primary.clone()];
        for field in &fields {
            if let Some(table) = tables::table_qualifier(field) {
                self.append_table(req, &mut joined, table).await?;
            }
        }

        // Drop optional columns the physical table does not carry.
        fields.retain(|f| {
            !OPTIONAL_FIELDS
                .iter()
                .any(|opt| f.contains(opt) && !columns.iter().any(|c| c == opt))
        });
        let absent_optional = |fieldname: &str| {
            OPTIONAL_FIELDS.contains(&fieldname) && !columns.iter().any(|c| c == fieldname)
        };
        filters.retain(|item| match item {
            FilterItem::Predicate(p) => !absent_optional(&p.fieldname),
            FilterItem::Fragment(_) => true,
        });
        or_filters.retain(|item| match item {
            FilterItem::Predicate(p) => !absent_optional(&p.fieldname),
            FilterItem::Fragment(_) => true,
        });

        // Compile filter conditions; a predicate on another type joins
        // that type's table (permission-checked) as a side effect.
        let pred_deps = PredicateDeps {
            exec: &*self.exec,
            backend: self.config.backend,
            ignore_ifnull: req.ignore_ifnull,
        };
        let mut and_conditions: Vec<SimpleExpr> = Vec::new();
        for item in &filters {
            and_conditions.push(
                self.compile_filter_item(item, req, dt.as_ref(), &mut joined, &pred_deps)
                    .await?,
            );
        }
        let mut or_conditions: Vec<SimpleExpr> = Vec::new();
        for item in &or_filters {
            or_conditions.push(
                self.compile_filter_item(item, req, dt.as_ref(), &mut joined, &pred_deps)
                    .await?,
            );
        }

        let permission_cond = if req.ignore_permissions {
            None
        } else {
            let deps = PermissionDeps {
                meta: &*self.meta,
                perms: &*self.perms,
                hooks: &self.hooks,
                strict_user_permissions: self.config.apply_strict_user_permissions,
            };
            permission::evaluate(
                &req.doctype,
                &req.principal,
                req.reference_doctype.as_deref().unwrap_or(&req.doctype),
                &deps,
            )
            .await?
        };

        /* ---------- assembly ---------- */

        let mut stmt = Query::select();
        stmt.from(Alias::new(primary.clone()));
        for child in joined.iter().filter(|t| **t != primary) {
            stmt.join(
                req.join.into(),
                Alias::new(child.clone()),
                Expr::col((Alias::new(child.clone()), Alias::new("parent")))
                    .equals((Alias::new(primary.clone()), Alias::new("name"))),
            );
        }

        let multi_table = joined.len() > 1;
        let mut output_names: Vec<Option<String>> = Vec::new();
        for field in &fields {
            push_select_field(&mut stmt, field, multi_table, &primary, &mut output_names);
        }
        if req.with_childnames {
            for child in joined.iter().filter(|t| **t != primary) {
                let child_doctype = DocType::name_from_table(child);
                let alias = format!("{child_doctype}:name");
                stmt.expr_as(
                    Expr::col((Alias::new(child.clone()), Alias::new("name"))),
                    Alias::new(alias.clone()),
                );
                output_names.push(Some(alias));
            }
        }
        if req.distinct {
            stmt.distinct();
        }

        let mut cond = Condition::all();
        for expr in and_conditions {
            cond = cond.add(expr);
        }
        if !or_conditions.is_empty() {
            let mut any = Condition::any();
            for expr in or_conditions {
                any = any.add(expr);
            }
            cond = cond.add(any);
        }
        if let Some(pc) = permission_cond {
            cond = cond.add(pc);
        }
        stmt.cond_where(cond);

        if let Some(group_by) = req.group_by.as_deref() {
            sanitize::validate_order_group(group_by)?;
            order::validate_joined_tables(group_by, &joined)?;
            stmt.add_group_by([Expr::cust(group_by.to_owned())]);
        }

        order::apply_order(
            &mut stmt,
            dt.as_ref(),
            req.order_by.as_deref(),
            &fields,
            req.group_by.as_deref(),
            &joined,
            req.distinct,
        )?;

        if let Some(limit) = req.limit_page_length {
            stmt.limit(limit).offset(req.limit_start);
        }

        let output_names = output_names.into_iter().collect::<Option<Vec<_>>>();
        Ok(Some(Compiled { stmt, output_names }))
    }

    async fn compile_filter_item(
        &self,
        item: &FilterItem,
        req: &ListRequest,
        primary_dt: &DocType,
        joined: &mut Vec<String>,
        deps: &PredicateDeps<'_>,
    ) -> Result<SimpleExpr, QueryError> {
        match item {
            FilterItem::Fragment(fragment) => Ok(Expr::cust(fragment.clone())),
            FilterItem::Predicate(pred) => {
                let table = tables::table_for(&pred.doctype);
                self.append_table(req, joined, table).await?;
                if pred.doctype == primary_dt.name {
                    predicate::compile(pred, primary_dt, deps).await
                } else {
                    let dt = self.meta.doctype(&pred.doctype).await?;
                    predicate::compile(pred, dt.as_ref(), deps).await
                }
            }
        }
    }

    /// Add a table to the join set, permission-checking it first so a
    /// rejected join never reveals anything about the table's contents.
    async fn append_table(
        &self,
        req: &ListRequest,
        joined: &mut Vec<String>,
        table: String,
    ) -> Result<(), QueryError> {
        if joined.contains(&table) {
            return Ok(());
        }
        let doctype = DocType::name_from_table(&table).to_owned();
        if !req.ignore_permissions && req.principal.name() != "Administrator" {
            let dt = self.meta.doctype(&doctype).await?;
            if !dt.istable {
                let role = self
                    .perms
                    .role_permissions(&doctype, &req.principal)
                    .await?;
                if !role.can_query() {
                    return Err(QueryError::denied(&doctype));
                }
            }
        }
        joined.push(table);
        Ok(())
    }

    /// Doctype-level access gate, evaluated before anything is compiled.
    async fn permission_gate(&self, req: &ListRequest, dt: &DocType) -> Result<(), QueryError> {
        if req.ignore_permissions || req.principal.name() == "Administrator" {
            return Ok(());
        }
        if dt.istable {
            return self.check_parent_permission(req).await;
        }
        let role = self
            .perms
            .role_permissions(&req.doctype, &req.principal)
            .await?;
        if role.can_query() {
            return Ok(());
        }
        let shared = self
            .perms
            .shared_documents(&req.doctype, &req.principal)
            .await?;
        if !shared.is_empty() {
            return Ok(());
        }
        let user_perms = self.perms.user_permissions(&req.principal).await?;
        let reference = req.reference_doctype.as_deref().unwrap_or(&req.doctype);
        if permission::has_applicable_user_permission(&user_perms, &req.doctype, reference) {
            return Ok(());
        }
        Err(QueryError::denied(&req.doctype))
    }

    /// Child (table) types are only reachable through a parent the
    /// principal can read, and only through a parent that actually owns
    /// the child table; a fabricated parent must not open the child.
    async fn check_parent_permission(&self, req: &ListRequest) -> Result<(), QueryError> {
        let Some(parent) = req.parent_doctype.as_deref() else {
            return Err(QueryError::denied(&req.doctype));
        };
        let parent_dt = self.meta.doctype(parent).await?;
        let owns_child = parent_dt
            .table_fields()
            .any(|f| f.options.as_deref() == Some(req.doctype.as_str()));
        if !owns_child {
            return Err(QueryError::denied(&req.doctype));
        }
        let role = self.perms.role_permissions(parent, &req.principal).await?;
        if role.can_query() {
            Ok(())
        } else {
            Err(QueryError::denied(parent))
        }
    }
}

/* ---------- select-list building ---------- */

fn push_select_field(
    stmt: &mut SelectStatement,
    field: &str,
    multi_table: bool,
    primary: &str,
    output_names: &mut Vec<Option<String>>,
) {
    let trimmed = field.trim();

    // `col as alias` (exactly three whitespace tokens)
    let toks: Vec<&str> = trimmed.split_whitespace().collect();
    if toks.len() == 3 && toks[1].eq_ignore_ascii_case("as") && !trimmed.contains('(') {
        let alias = toks[2].trim_matches('`').trim_matches('"').trim_matches('\'');
        let expr = if let Some((table, column)) = tables::parse_qualified(toks[0]) {
            Expr::col((Alias::new(table), Alias::new(column)))
        } else {
            let column = toks[0].trim_matches('`');
            if multi_table {
                Expr::col((Alias::new(primary), Alias::new(column)))
            } else {
                Expr::col(Alias::new(column))
            }
        };
        stmt.expr_as(expr, Alias::new(alias));
        output_names.push(Some(alias.to_owned()));
        return;
    }

    // structured column reference where the shape is recognizable
    if let Some((table, column)) = tables::parse_qualified(trimmed) {
        stmt.column((Alias::new(table), Alias::new(column.clone())));
        output_names.push(Some(column));
        return;
    }
    if tables::is_plain_ident(trimmed) {
        if multi_table && !tables::is_standard_sql_method(trimmed) {
            stmt.column((Alias::new(primary), Alias::new(trimmed)));
        } else {
            stmt.column(Alias::new(trimmed));
        }
        output_names.push(Some(trimmed.to_owned()));
        return;
    }

    // anything else (aggregates, *, quoted expressions) passes through
    // as vetted raw text
    stmt.expr(Expr::cust(trimmed.to_owned()));
    output_names.push(None);
}

/* ---------- row shaping ---------- */

fn empty_output(req: &ListRequest) -> QueryOutput {
    if req.pluck.is_some() {
        QueryOutput::Values(Vec::new())
    } else if req.as_list {
        QueryOutput::Tuples(Vec::new())
    } else {
        QueryOutput::Records(Vec::new())
    }
}

fn shape_rows(rows: Vec<Row>, req: &ListRequest, names: Option<&[String]>) -> QueryOutput {
    if let Some(pluck) = &req.pluck {
        return QueryOutput::Values(
            rows.into_iter()
                .map(|row| {
                    row.into_iter()
                        .find(|(k, _)| k == pluck)
                        .map_or(JsonValue::Null, |(_, v)| v)
                })
                .collect(),
        );
    }
    if req.as_list {
        return QueryOutput::Tuples(
            rows.into_iter()
                .map(|row| match names {
                    Some(names) => names
                        .iter()
                        .map(|n| {
                            row.iter()
                                .find(|(k, _)| k == n)
                                .map_or(JsonValue::Null, |(_, v)| v.clone())
                        })
                        .collect(),
                    None => row.into_iter().map(|(_, v)| v).collect(),
                })
                .collect(),
        );
    }
    QueryOutput::Records(
        rows.into_iter()
            .map(|row| row.into_iter().collect())
            .collect(),
    )
}
