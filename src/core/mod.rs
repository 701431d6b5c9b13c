//! Shared primitives: the state document, its file, locking and identity.
//!
//! Everything that touches a container's state file goes through [`statefile::StateFile`].

pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod journal;
pub mod lock;
pub mod schemas;
pub mod statefile;
pub mod time;
