//! The permission-data lookup interface implemented by the host application.

use crate::permission::{RolePermissions, UserPermissionsMap};
use crate::principal::Principal;

#[derive(Debug, thiserror::Error)]
pub enum PermissionDataError {
    #[error("permission source error: {0}")]
    Source(String),
}

/// Supplies role permissions, user permissions and sharing grants.
///
/// Implementations read the authorization store; the evaluator calls each
/// method at most once per compiled query.
#[async_trait::async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Aggregated role permissions for the principal on one entity type.
    ///
    /// # Errors
    /// `PermissionDataError::Source` on lookup failure.
    async fn role_permissions(
        &self,
        doctype: &str,
        principal: &Principal,
    ) -> Result<RolePermissions, PermissionDataError>;

    /// All user-permission grants of the principal, keyed by target type.
    ///
    /// # Errors
    /// `PermissionDataError::Source` on lookup failure.
    async fn user_permissions(
        &self,
        principal: &Principal,
    ) -> Result<UserPermissionsMap, PermissionDataError>;

    /// Names of documents of this type explicitly shared with the principal.
    ///
    /// # Errors
    /// `PermissionDataError::Source` on lookup failure.
    async fn shared_documents(
        &self,
        doctype: &str,
        principal: &Principal,
    ) -> Result<Vec<String>, PermissionDataError>;
}
