//! Role permission summaries and user-permission restrictions.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// The two permission types a list query can run under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PermissionType {
    #[serde(rename = "read")]
    Read,
    #[serde(rename = "select")]
    Select,
}

/// Aggregated role permissions of one principal on one entity type.
///
/// `if_owner` lists the permission types granted only on records the
/// principal created; `has_if_owner_enabled` is set when any contributing
/// role rule carries the if-owner flag at all.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissions {
    pub read: bool,
    pub select: bool,
    #[serde(default)]
    pub has_if_owner_enabled: bool,
    #[serde(default)]
    pub if_owner: BTreeSet<PermissionType>,
}

impl RolePermissions {
    /// Either permission type suffices to run a list query.
    #[must_use]
    pub fn can_query(&self) -> bool {
        self.read || self.select
    }

    /// True when ownership is the *only* path to read/select: every granted
    /// query permission is if-owner gated, so the compiler must pin
    /// `owner = principal`.
    #[must_use]
    pub fn requires_owner_constraint(&self) -> bool {
        if !self.has_if_owner_enabled || self.if_owner.is_empty() {
            return false;
        }
        // A read or select grant that is not owner-gated lifts the constraint.
        if self.read && !self.if_owner.contains(&PermissionType::Read) {
            return false;
        }
        if self.select && !self.if_owner.contains(&PermissionType::Select) {
            return false;
        }
        true
    }
}

/// One user-permission grant: the principal may see records of the target
/// entity type whose name is `doc`, optionally only when reached through
/// `applicable_for`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermission {
    pub doc: String,
    #[serde(default)]
    pub applicable_for: Option<String>,
}

impl UserPermission {
    #[must_use]
    pub fn allow(doc: impl Into<String>) -> Self {
        Self {
            doc: doc.into(),
            applicable_for: None,
        }
    }

    #[must_use]
    pub fn applicable_for(mut self, doctype: impl Into<String>) -> Self {
        self.applicable_for = Some(doctype.into());
        self
    }
}

/// All of a principal's user-permission grants, keyed by target entity type.
pub type UserPermissionsMap = HashMap<String, Vec<UserPermission>>;
