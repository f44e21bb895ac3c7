//! Engine configuration.

use sea_orm::sea_query::{MysqlQueryBuilder, PostgresQueryBuilder, SelectStatement};
use serde::{Deserialize, Serialize};

/// Which SQL dialect assembled statements are rendered in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlBackend {
    #[default]
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "postgres")]
    Postgres,
}

impl SqlBackend {
    /// Render a statement to SQL text. This is the single point where the
    /// structured query AST becomes text; identifier quoting and value
    /// escaping happen here and nowhere else.
    #[must_use]
    pub(crate) fn render(self, stmt: &SelectStatement) -> String {
        match self {
            Self::MySql => stmt.to_string(MysqlQueryBuilder),
            Self::Postgres => stmt.to_string(PostgresQueryBuilder),
        }
    }
}

/// Process-level settings of the query engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: SqlBackend,
    /// When on, a user-permission restriction also excludes rows whose
    /// link column is empty (no empty-value fallback OR).
    pub apply_strict_user_permissions: bool,
    /// Default sanitizer strictness for requests that don't set their own.
    pub strict: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: SqlBackend::default(),
            apply_strict_user_permissions: false,
            strict: true,
        }
    }
}

impl EngineConfig {
    /// Extract the `query_engine` section from a layered figment.
    ///
    /// # Errors
    /// Returns the figment extraction error on shape mismatch.
    pub fn from_figment(figment: &figment::Figment) -> Result<Self, figment::Error> {
        figment.extract_inner("query_engine")
    }
}

#[cfg(test)]
mod tests {
    use figment::providers::Serialized;
    use figment::Figment;

    use super::*;

    #[test]
    fn defaults_are_strict_mysql() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.backend, SqlBackend::MySql);
        assert!(cfg.strict);
        assert!(!cfg.apply_strict_user_permissions);
    }

    #[test]
    fn extracts_from_figment_section() {
        let figment = Figment::new().merge(Serialized::defaults(serde_json::json!({
            "query_engine": {
                "backend": "postgres",
                "apply_strict_user_permissions": true
            }
        })));
        let cfg = EngineConfig::from_figment(&figment).unwrap();
        assert_eq!(cfg.backend, SqlBackend::Postgres);
        assert!(cfg.apply_strict_user_permissions);
        assert!(cfg.strict);
    }
}
