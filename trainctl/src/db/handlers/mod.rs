//! Store implementations for project persistence.
//!
//! - [`Projects`]: PostgreSQL-backed store using conditional `UPDATE ... RETURNING` writes
//! - [`InMemoryProjects`]: process-local store with the same semantics, for tests and dev
//!
//! Both implement [`ProjectStore`], which is what the rest of the application depends on.

pub mod in_memory;
pub mod projects;

pub use in_memory::InMemoryProjects;
pub use projects::{ProjectStore, Projects};
