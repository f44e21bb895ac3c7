//! Pluggable permission-condition hooks.
//!
//! A hook contributes an extra SQL boolean fragment to every list query on
//! its entity type; fragments are AND-joined with the evaluated role and
//! user-permission conditions. Attached authorization scripts register
//! through the same interface.

use std::collections::HashMap;
use std::sync::Arc;

use crate::principal::Principal;

/// One custom permission-condition provider for a single entity type.
pub trait PermissionHook: Send + Sync {
    /// Return a SQL boolean fragment, or `None` to add no restriction for
    /// this principal. Hooks are registered by host code and their
    /// fragments are trusted; untrusted input must never reach one.
    fn condition(&self, principal: &Principal) -> Option<String>;
}

/// Hooks registered per entity type, in registration order.
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: HashMap<String, Vec<Arc<dyn PermissionHook>>>,
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, doctype: impl Into<String>, hook: Arc<dyn PermissionHook>) {
        self.hooks.entry(doctype.into()).or_default().push(hook);
    }

    /// All hooks for one entity type, in registration order.
    pub fn for_doctype(&self, doctype: &str) -> impl Iterator<Item = &Arc<dyn PermissionHook>> {
        self.hooks.get(doctype).into_iter().flatten()
    }
}

/// A hook built from a plain closure; convenient for wiring and tests.
pub struct FnHook<F>(pub F);

impl<F> PermissionHook for FnHook<F>
where
    F: Fn(&Principal) -> Option<String> + Send + Sync,
{
    fn condition(&self, principal: &Principal) -> Option<String> {
        (self.0)(principal)
    }
}
