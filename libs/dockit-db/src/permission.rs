//! Row-level permission evaluation.
//!
//! Independent of predicate compilation: given an entity type and a
//! principal, produce one extra SQL condition (or reject the query).
//! Composition rules:
//! - the owner constraint and user-permission restrictions are mutually
//!   exclusive (ownership being the only read path skips the rest)
//! - per-link user-permission conditions AND across target types; several
//!   grants for one target merge into one IN list (OR)
//! - hook fragments AND with everything above
//! - sharing grants OR with the whole of the above: a shared document is
//!   visible even when every other rule would exclude it

use dockit_meta::{DocType, MetaProvider};
use dockit_security::{HookRegistry, PermissionProvider, Principal, UserPermissionsMap};
use sea_orm::sea_query::{Alias, Condition, Expr, Func, Query, SimpleExpr, Value};

use crate::errors::QueryError;
use crate::settings::SqlBackend;

pub(crate) struct PermissionDeps<'a> {
    pub meta: &'a dyn MetaProvider,
    pub perms: &'a dyn PermissionProvider,
    pub hooks: &'a HookRegistry,
    pub strict_user_permissions: bool,
}

fn column(table: &str, field: &str) -> Expr {
    Expr::col((Alias::new(table), Alias::new(field)))
}

fn share_condition(table: &str, shared: &[String]) -> SimpleExpr {
    column(table, "name").is_in(shared.iter().cloned().map(Value::from).collect::<Vec<_>>())
}

/// Does any user-permission grant on this type apply in this context?
pub(crate) fn has_applicable_user_permission(
    user_perms: &UserPermissionsMap,
    doctype: &str,
    reference_doctype: &str,
) -> bool {
    user_perms.get(doctype).is_some_and(|entries| {
        entries.iter().any(|p| {
            p.applicable_for.is_none() || p.applicable_for.as_deref() == Some(reference_doctype)
        })
    })
}

/// Build the AND-of-links user-permission condition, if any grant bites.
fn user_permission_conditions(
    dt: &DocType,
    reference_doctype: &str,
    user_perms: &UserPermissionsMap,
    strict: bool,
) -> Option<Condition> {
    let table = dt.table_name();

    // Every Link field, plus a synthetic self-link through `name` so a
    // grant on the type itself restricts which records are listed.
    let mut links: Vec<(String, String, bool)> = dt
        .link_fields()
        .filter_map(|f| {
            f.options
                .clone()
                .map(|target| (f.fieldname.clone(), target, f.ignore_user_permissions))
        })
        .collect();
    links.push(("name".to_owned(), dt.name.clone(), false));

    let mut per_link = Vec::new();
    for (fieldname, target, ignore) in links {
        if ignore {
            continue;
        }
        let Some(entries) = user_perms.get(&target) else {
            continue;
        };

        let docs: Vec<String> = entries
            .iter()
            .filter(|p| match p.applicable_for.as_deref() {
                None => true,
                Some(applicable) if fieldname == "name" => applicable == reference_doctype,
                Some(applicable) => applicable == dt.name,
            })
            .map(|p| p.doc.clone())
            .collect();
        if docs.is_empty() {
            continue;
        }

        let in_expr = column(&table, &fieldname)
            .is_in(docs.into_iter().map(Value::from).collect::<Vec<_>>());
        let cond = if strict {
            Condition::all().add(in_expr)
        } else {
            // an unset link is not restricted unless strict mode says so
            let empty = Expr::expr(Func::if_null(column(&table, &fieldname), Value::from("")))
                .eq(Value::from(""));
            Condition::any().add(empty).add(in_expr)
        };
        per_link.push(cond);
    }

    if per_link.is_empty() {
        return None;
    }
    let mut all = Condition::all();
    for cond in per_link {
        all = all.add(cond);
    }
    Some(all)
}

/// Evaluate the permission condition for one (entity type, principal)
/// pair. `None` means unrestricted visibility.
///
/// # Errors
/// `QueryError::PermissionDenied` when nothing grants access; the error
/// names only the entity type.
pub(crate) async fn evaluate(
    doctype: &str,
    principal: &Principal,
    reference_doctype: &str,
    deps: &PermissionDeps<'_>,
) -> Result<Option<Condition>, QueryError> {
    if principal.name() == "Administrator" {
        return Ok(None);
    }

    let dt = deps.meta.doctype(doctype).await?;
    let table = dt.table_name();
    let role = deps.perms.role_permissions(doctype, principal).await?;
    let shared = deps.perms.shared_documents(doctype, principal).await?;
    let user_perms = deps.perms.user_permissions(principal).await?;

    // No role permission and no applicable user permission: sharing grants
    // are the only window, and they alone bound visibility.
    if !dt.istable
        && !role.can_query()
        && !has_applicable_user_permission(&user_perms, doctype, reference_doctype)
    {
        if shared.is_empty() {
            return Err(QueryError::denied(doctype));
        }
        tracing::debug!(doctype, principal = %principal, "access restricted to shared documents");
        return Ok(Some(Condition::all().add(share_condition(&table, &shared))));
    }

    let match_condition: Option<Condition> = if role.requires_owner_constraint() {
        Some(
            Condition::all()
                .add(column(&table, "owner").eq(Value::from(principal.name()))),
        )
    } else {
        user_permission_conditions(
            dt.as_ref(),
            reference_doctype,
            &user_perms,
            deps.strict_user_permissions,
        )
    };

    let mut all = Condition::all();
    let mut restricted = false;
    if let Some(cond) = match_condition {
        all = all.add(cond);
        restricted = true;
    }
    for hook in deps.hooks.for_doctype(doctype) {
        if let Some(fragment) = hook.condition(principal) {
            all = all.add(Expr::cust(fragment));
            restricted = true;
        }
    }

    if !restricted {
        return Ok(None);
    }

    // Sharing widens: a shared document stays visible regardless of the
    // role/user-permission restrictions above.
    if !shared.is_empty() {
        return Ok(Some(
            Condition::any()
                .add(all)
                .add(share_condition(&table, &shared)),
        ));
    }
    Ok(Some(all))
}

/// Render a permission condition as a standalone SQL fragment, for reuse
/// in hand-written queries outside the compiler.
pub(crate) fn condition_to_sql(cond: Condition, backend: SqlBackend) -> String {
    let mut probe = Query::select();
    probe.expr(Expr::cust("1")).cond_where(cond);
    let sql = backend.render(&probe);
    sql.split_once(" WHERE ")
        .map(|(_, tail)| tail.to_owned())
        .unwrap_or_default()
}
