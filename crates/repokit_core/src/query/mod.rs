//! Query composition: filters, specifications, sorting, paging and the
//! fixed-order plan that combines them.

pub mod config;
pub mod filter;
pub mod paging;
pub mod plan;
pub mod sort;
pub mod spec;
