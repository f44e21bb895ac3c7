//! In-memory permission fixtures for tests.

use std::collections::HashMap;

use crate::permission::{RolePermissions, UserPermission, UserPermissionsMap};
use crate::principal::Principal;
use crate::provider::{PermissionDataError, PermissionProvider};

/// A fixed permission table: everything keyed by principal name.
#[derive(Default)]
pub struct StaticPermissionProvider {
    roles: HashMap<(String, String), RolePermissions>,
    user_perms: HashMap<String, UserPermissionsMap>,
    shares: HashMap<(String, String), Vec<String>>,
}

impl StaticPermissionProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_role_permissions(
        mut self,
        doctype: &str,
        principal: &Principal,
        perms: RolePermissions,
    ) -> Self {
        self.roles
            .insert((doctype.to_owned(), principal.name().to_owned()), perms);
        self
    }

    #[must_use]
    pub fn with_user_permission(
        mut self,
        principal: &Principal,
        target_doctype: &str,
        perm: UserPermission,
    ) -> Self {
        self.user_perms
            .entry(principal.name().to_owned())
            .or_default()
            .entry(target_doctype.to_owned())
            .or_default()
            .push(perm);
        self
    }

    #[must_use]
    pub fn with_shared(mut self, doctype: &str, principal: &Principal, docs: Vec<&str>) -> Self {
        self.shares.insert(
            (doctype.to_owned(), principal.name().to_owned()),
            docs.into_iter().map(str::to_owned).collect(),
        );
        self
    }
}

#[async_trait::async_trait]
impl PermissionProvider for StaticPermissionProvider {
    async fn role_permissions(
        &self,
        doctype: &str,
        principal: &Principal,
    ) -> Result<RolePermissions, PermissionDataError> {
        Ok(self
            .roles
            .get(&(doctype.to_owned(), principal.name().to_owned()))
            .cloned()
            .unwrap_or_default())
    }

    async fn user_permissions(
        &self,
        principal: &Principal,
    ) -> Result<UserPermissionsMap, PermissionDataError> {
        Ok(self
            .user_perms
            .get(principal.name())
            .cloned()
            .unwrap_or_default())
    }

    async fn shared_documents(
        &self,
        doctype: &str,
        principal: &Principal,
    ) -> Result<Vec<String>, PermissionDataError> {
        Ok(self
            .shares
            .get(&(doctype.to_owned(), principal.name().to_owned()))
            .cloned()
            .unwrap_or_default())
    }
}
