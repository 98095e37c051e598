//! Persistence boundary: the `Store` trait and its libSQL backend.

pub mod libsql_backend;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{ProposalUpsert, Store};
