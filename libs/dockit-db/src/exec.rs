//! The raw SQL execution seam.
//!
//! The compiler renders one statement and hands it to an [`SqlExecutor`].
//! Auxiliary statements (nested-set bound lookups) go through the same
//! seam so a test harness sees every query the compiler issues.

use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, JsonValue, Statement};

/// One result row: column/value pairs in select order.
pub type Row = Vec<(String, JsonValue)>;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("database error: {0}")]
    Db(String),
}

/// Runs rendered SQL text and shapes rows.
#[async_trait::async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute a SELECT and return all rows.
    ///
    /// # Errors
    /// `ExecError::Db` on any database failure.
    async fn query(&self, sql: &str) -> Result<Vec<Row>, ExecError>;
}

/// [`SqlExecutor`] over a `SeaORM` connection.
pub struct SeaOrmExecutor {
    conn: DatabaseConnection,
}

impl SeaOrmExecutor {
    #[must_use]
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait::async_trait]
impl SqlExecutor for SeaOrmExecutor {
    async fn query(&self, sql: &str) -> Result<Vec<Row>, ExecError> {
        let backend = self.conn.get_database_backend();
        let results = self
            .conn
            .query_all(Statement::from_string(backend, sql.to_owned()))
            .await
            .map_err(|e| ExecError::Db(e.to_string()))?;

        let mut rows = Vec::with_capacity(results.len());
        for res in &results {
            let value =
                JsonValue::from_query_result(res, "").map_err(|e| ExecError::Db(e.to_string()))?;
            let JsonValue::Object(map) = value else {
                return Err(ExecError::Db("row did not decode to an object".to_owned()));
            };
            rows.push(map.into_iter().collect());
        }
        Ok(rows)
    }
}
