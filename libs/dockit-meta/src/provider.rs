//! The metadata lookup interface implemented by the host application.

use std::sync::Arc;

use crate::schema::DocType;

/// Errors surfaced by metadata lookups.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error("unknown DocType: {0}")]
    UnknownDocType(String),

    /// The physical table behind a known type is absent (pending DDL).
    #[error("table missing for DocType: {0}")]
    TableMissing(String),

    #[error("metadata source error: {0}")]
    Source(String),
}

/// Supplies per-entity-type schema to the compiler.
///
/// Implementations typically read the schema store; callers should wrap
/// them in a [`crate::MetaCache`] so repeated lookups stay cheap.
#[async_trait::async_trait]
pub trait MetaProvider: Send + Sync {
    /// Resolve a `DocType` by name.
    ///
    /// # Errors
    /// `MetaError::UnknownDocType` when no such type exists.
    async fn doctype(&self, name: &str) -> Result<Arc<DocType>, MetaError>;

    /// Physical column names of the type's table.
    ///
    /// # Errors
    /// `MetaError::TableMissing` when the table has not been created yet.
    async fn table_columns(&self, doctype: &str) -> Result<Vec<String>, MetaError>;

    /// Whether the type's physical table exists.
    ///
    /// # Errors
    /// `MetaError::Source` on lookup failure.
    async fn table_exists(&self, doctype: &str) -> Result<bool, MetaError> {
        match self.table_columns(doctype).await {
            Ok(_) => Ok(true),
            Err(MetaError::TableMissing(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
