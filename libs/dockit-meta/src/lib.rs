//! DocKit entity-type metadata.
//!
//! This crate carries the schema surface the query compiler consumes:
//! - `DocType`: one entity type (fields, permissions flags, tree/submittable markers)
//! - `FieldDef` / `FieldKind`: per-field type metadata
//! - `MetaProvider`: the lookup interface implemented by the host application
//! - `MetaCache`: process-wide read-through cache with explicit invalidation
//!
//! Metadata is immutable per cache generation; schema writes must call
//! `MetaCache::invalidate` before the next query is compiled.

pub mod cache;
pub mod kind;
pub mod provider;
pub mod schema;
pub mod testing;

pub use cache::MetaCache;
pub use kind::FieldKind;
pub use provider::{MetaError, MetaProvider};
pub use schema::{DocType, FieldDef, SortDir};
