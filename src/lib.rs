//! simstore: a filesystem object store for simulation containers
//!
//! **Every container is a directory holding one JSON state file.** The state file is the
//! single source of truth for the container's identity (uuid, type, name), its tags,
//! categories, member list and universe definitions. Bulk payloads live next to it, one
//! directory per data handle.
//!
//! # Core Principles
//!
//! - **Stateless facades**: a `Container`, `Sim` or `Group` value is only a uuid, a type and
//!   a base directory; every accessor re-reads the state file
//! - **Serialized writes**: all mutations hold the per-container `.lock` file and replace the
//!   state file atomically
//! - **Regeneration**: `create_or_load` on an existing directory yields a facade for the
//!   record already there
//! - **Auditable**: each mutation appends to the container's `.journal.jsonl`
//!
//! # Example
//!
//! ```no_run
//! use simstore::{Group, Sim};
//!
//! # fn main() -> simstore::Result<()> {
//! let sim = Sim::create_or_load("/tmp/project", "run-01")?;
//! sim.tags().add(["equilibrated", "npt"])?;
//! sim.categories().set("temperature", 300)?;
//!
//! let group = Group::create_or_load("/tmp/project", "ensemble")?;
//! group.members().add(simstore::member_args![&sim])?;
//! assert_eq!(group.members().len()?, 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: state documents, locking, atomic writes, identity and configuration
//! - [`plugins`]: aggregators over a container (tags, categories, members, data, universes)
//! - [`containers`]: the `Container`, `Sim` and `Group` facades

pub mod containers;
pub mod core;
pub mod plugins;

pub use containers::{Container, Group, Record, Sim};
pub use core::config::StoreConfig;
pub use core::document::{ContainerType, MemberRecord, StateDocument, UniverseDefinition};
pub use core::error::{Result, StoreError};
pub use core::journal::JournalEvent;
pub use plugins::categories::CategoryValue;
pub use plugins::members::{Member, MemberArg, MemberSelector, MemberTarget};
pub use plugins::payload::{Format, Generic, NdArray, Payload, Table};
pub use plugins::universes::{PathLoader, Trajectory, TrajectoryLoader};
