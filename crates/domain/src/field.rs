//! Field schema and typed values.
//!
//! The field registry is the single source of truth for which fields a
//! model exposes and what type each one carries. Rules, links, and the
//! due-date calculus consult it instead of trusting ambient untyped data.

mod registry;
mod value;

pub use registry::{FieldDef, FieldRegistry, FieldRegistryBuilder, FieldType};
pub use value::FieldValue;
