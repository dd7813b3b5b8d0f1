//! Entity model shared by every repository backend.
//!
//! # Responsibility
//! - Define the keyed entity contract and its static schema.
//! - Define the value type and its total order.
//!
//! # Invariants
//! - Every entity is identified by its key and nothing else.
//! - All backends read entity columns through `Entity::field`.

pub mod entity;
pub mod value;
