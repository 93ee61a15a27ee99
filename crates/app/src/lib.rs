//! # taskflow-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `TaskRepository` — atomic idempotent task upsert and queries
//!   - `EntityGateway` — field write-back into the external entity store
//!   - `ConfigStore` — immutable registry/rule/link snapshots
//!   - `EventPublisher` — audit-trail publication
//! - Provide the engine itself:
//!   - `evaluator` — trigger matching and typed condition evaluation
//!   - `materializer` — idempotent task creation/rescheduling
//!   - `synchronizer` — field↔task synchronization with write-back
//!   - `pipeline` — per-entity serialization, cascade queue, depth guard
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `taskflow-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the
//! reverse.

pub mod evaluator;
pub mod event_bus;
pub mod materializer;
pub mod pipeline;
pub mod ports;
pub mod services;
pub mod synchronizer;
