//! DocKit permission-aware list query compiler.
//!
//! Turns untrusted filter/field specifications into one safe SQL
//! statement, with row-level access control applied before anything
//! reaches the database:
//!
//! 1. [`filter`] normalizes the heterogeneous filter/field inputs
//!    (including the historical fields/filters argument swap)
//! 2. [`sanitize`] lexically vetoes hostile field and clause text
//! 3. the table resolver joins child/related tables, permission-checking
//!    every append
//! 4. the predicate compiler and the permission evaluator independently
//!    produce conditions, merged by the assembler
//! 5. the assembled `sea_query` statement renders to SQL in one place;
//!    value escaping and identifier quoting are enforced by construction
//!
//! The database, metadata store and permission store stay behind the
//! [`SqlExecutor`], [`dockit_meta::MetaProvider`] and
//! [`dockit_security::PermissionProvider`] seams; dry-run compilation
//! ([`Engine::compile_sql`]) needs none of them to actually exist.

mod dates;
pub mod errors;
pub mod exec;
pub mod filter;
mod order;
mod permission;
mod predicate;
mod sanitize;
pub mod settings;
mod tables;
pub mod query;
pub mod testing;


pub use errors::QueryError;
pub use exec::{ExecError, Row, SeaOrmExecutor, SqlExecutor};
pub use filter::{FieldsInput, FilterInput, FilterItem, FilterPredicate, Operator};
pub use query::{Engine, ListRequest, QueryOutput};
pub use settings::{EngineConfig, SqlBackend};
pub use tables::JoinKind;
