//! Aggregators over a single container record.
//!
//! Each aggregator borrows the container's identity and reads or updates its state file
//! (or, for `data`, the payload directories beside it).

pub mod categories;
pub mod codecs;
pub mod data;
pub mod members;
pub mod payload;
pub mod tags;
pub mod universes;
