//! Error taxonomy of the query compiler.
//!
//! Every variant except `Exec` is raised during compilation, before any
//! SQL reaches the database. Permission and injection errors deliberately
//! carry no more than the entity-type name so rejected input cannot be
//! used to probe schema details.

use dockit_meta::MetaError;
use dockit_security::PermissionDataError;

use crate::exec::ExecError;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Filter/field JSON failed to parse, or the decoded shape is not a
    /// mapping or list.
    #[error("malformed filter or field input: {0}")]
    Malformed(String),

    /// The field/clause sanitizer vetoed the expression.
    #[error("{0}")]
    InjectionRejected(&'static str),

    /// The principal may not query this entity type.
    #[error("insufficient permission for {doctype}")]
    PermissionDenied { doctype: String },

    #[error("unknown filter operator: {0}")]
    UnknownOperator(String),

    /// Order-by/group-by references a table absent from the join set.
    #[error("no column selected from {table} to sort or group by")]
    AmbiguousColumn { table: String },

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error(transparent)]
    PermissionData(#[from] PermissionDataError),

    /// Database-level failure surfaced by the executor; not retried here.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl QueryError {
    pub(crate) fn denied(doctype: &str) -> Self {
        Self::PermissionDenied {
            doctype: doctype.to_owned(),
        }
    }
}
