//! # taskflow-domain
//!
//! Pure domain model for the taskflow business-automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define the **Field Registry** (per-model field schema with typed values)
//! - Define **Entities** (leads, projects, quotes) as opaque field maps
//! - Define **Mutation events** (what changed, with causal origin and depth)
//! - Define **Automation rules** (trigger → conditions → create-task actions)
//! - Define **Field links** (two-way bindings between fields and tasks)
//! - Define **Tasks** (lifecycle, idempotency key, completion invariants)
//! - Provide the due-date calculus (calendar-day arithmetic, anchored dates)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod entity;
pub mod event;
pub mod field;
pub mod link;
pub mod rule;
pub mod schedule;
pub mod task;
