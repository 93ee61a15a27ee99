//! # taskflow-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the storage port traits defined in `taskflow-app::ports`
//! - Manage the `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//! - Enforce the task idempotency key with a partial unique index, so
//!   the upsert's check-then-act is atomic at the storage layer
//!
//! ## Dependency rule
//! Depends on `taskflow-app` (for port traits) and `taskflow-domain`
//! (for domain types). The `app` and `domain` crates must never
//! reference this adapter.

pub mod entity_repo;
pub mod error;
pub mod pool;
pub mod task_repo;

pub use entity_repo::SqliteEntityGateway;
pub use error::StorageError;
pub use pool::{Config, Database};
pub use task_repo::SqliteTaskRepository;
