//! Capability traits of the data-access layer.
//!
//! # Responsibility
//! - Define read, write, set, unit-of-work and SQL executor contracts that
//!   concrete stores compose.
//! - Keep storage details out of application code.
//!
//! # Invariants
//! - Read-only and read-write capabilities are separate traits;
//!   `Repository<E>` is their combination.
//! - Every operation returns `RepoResult`; nothing panics on bad input.

pub mod asynchronous;
pub mod error;
pub mod memory;
pub mod read;
pub mod set;
pub mod sql;
pub mod unit_of_work;
pub mod write;

use crate::model::entity::Entity;
use read::Reader;
use write::Writer;

/// Full read-write repository over `E`.
pub trait Repository<E: Entity>: Reader<E> + Writer<E> {}

impl<E: Entity, T: Reader<E> + Writer<E>> Repository<E> for T {}
