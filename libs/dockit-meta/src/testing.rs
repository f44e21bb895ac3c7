//! In-memory fixtures for tests and examples.

use std::collections::HashMap;
use std::sync::Arc;

use crate::provider::{MetaError, MetaProvider};
use crate::schema::DocType;

/// A fixed, hand-assembled metadata set.
#[derive(Default)]
pub struct StaticMetaProvider {
    doctypes: HashMap<String, Arc<DocType>>,
    columns: HashMap<String, Vec<String>>,
}

impl StaticMetaProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type along with its physical column names.
    #[must_use]
    pub fn with_doctype(mut self, doctype: DocType, columns: Vec<&str>) -> Self {
        self.columns.insert(
            doctype.name.clone(),
            columns.into_iter().map(str::to_owned).collect(),
        );
        self.doctypes
            .insert(doctype.name.clone(), Arc::new(doctype));
        self
    }

    /// Register a type whose table has not been created (DDL pending).
    #[must_use]
    pub fn with_tableless_doctype(mut self, doctype: DocType) -> Self {
        self.doctypes
            .insert(doctype.name.clone(), Arc::new(doctype));
        self
    }
}

#[async_trait::async_trait]
impl MetaProvider for StaticMetaProvider {
    async fn doctype(&self, name: &str) -> Result<Arc<DocType>, MetaError> {
        self.doctypes
            .get(name)
            .cloned()
            .ok_or_else(|| MetaError::UnknownDocType(name.to_owned()))
    }

    async fn table_columns(&self, doctype: &str) -> Result<Vec<String>, MetaError> {
        self.columns
            .get(doctype)
            .cloned()
            .ok_or_else(|| MetaError::TableMissing(doctype.to_owned()))
    }
}
