//! Named trajectory definitions of a Sim, with one persisted default.
//!
//! Loading a definition into something queryable belongs to a [`TrajectoryLoader`]; the
//! store only keeps file paths and which definition is active.

use crate::core::document::UniverseDefinition;
use crate::core::error::{Result, StoreError};
use crate::core::identity::Identity;
use std::fs;
use std::path::{Path, PathBuf};

/// Turns a stored definition into a trajectory handle.
pub trait TrajectoryLoader {
    type Universe;

    fn load(&self, name: &str, definition: &UniverseDefinition) -> Result<Self::Universe>;
}

/// Built-in loader: checks the files exist and hands back their paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathLoader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trajectory {
    name: String,
    topology: PathBuf,
    trajectories: Vec<PathBuf>,
}

impl Trajectory {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Topology file.
    pub fn filename(&self) -> &Path {
        &self.topology
    }

    /// First trajectory file, or the topology when it carries the only frame.
    pub fn trajectory_filename(&self) -> &Path {
        self.trajectories.first().unwrap_or(&self.topology)
    }

    pub fn trajectory_files(&self) -> &[PathBuf] {
        &self.trajectories
    }
}

impl TrajectoryLoader for PathLoader {
    type Universe = Trajectory;

    fn load(&self, name: &str, definition: &UniverseDefinition) -> Result<Trajectory> {
        for path in std::iter::once(&definition.topology).chain(&definition.trajectories) {
            fs::metadata(path).map_err(|e| {
                StoreError::ValidationError(format!(
                    "universe '{}' references {}: {}",
                    name,
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(Trajectory {
            name: name.to_string(),
            topology: definition.topology.clone(),
            trajectories: definition.trajectories.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Universes<'a> {
    record: &'a Identity,
}

impl<'a> Universes<'a> {
    pub fn new(record: &'a Identity) -> Self {
        Self { record }
    }

    /// Define (or redefine) `name`. The first definition of a Sim becomes its default.
    pub fn add<P: AsRef<Path>>(&self, name: &str, topology: P, trajectories: &[P]) -> Result<()> {
        if name.trim().is_empty() {
            return Err(StoreError::ValidationError(
                "universe names cannot be empty".to_string(),
            ));
        }
        let definition = UniverseDefinition {
            topology: absolute(topology.as_ref())?,
            trajectories: trajectories
                .iter()
                .map(|p| absolute(p.as_ref()))
                .collect::<Result<_>>()?,
        };
        self.record.state().update("universes.add", |doc| {
            doc.universes.insert(name.to_string(), definition);
            if doc.active_universe_name.is_none() {
                doc.active_universe_name = Some(name.to_string());
            }
            Ok(())
        })
    }

    /// Delete `name`, deactivating it first if it is the default. Absent names are a no-op.
    pub fn remove(&self, name: &str) -> Result<()> {
        self.record.state().update("universes.remove", |doc| {
            if doc.active_universe_name.as_deref() == Some(name) {
                doc.active_universe_name = None;
            }
            doc.universes.remove(name);
            Ok(())
        })
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.record.read()?.universes.contains_key(name))
    }

    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.record.read()?.universes.into_keys().collect())
    }

    pub fn definition(&self, name: &str) -> Result<UniverseDefinition> {
        self.record
            .read()?
            .universes
            .remove(name)
            .ok_or_else(|| StoreError::UnknownUniverse(name.to_string()))
    }

    /// Name of the active definition.
    pub fn default(&self) -> Result<Option<String>> {
        Ok(self.record.read()?.active_universe_name)
    }

    pub fn set_default(&self, name: &str) -> Result<()> {
        self.record.state().update("universes.default", |doc| {
            if !doc.universes.contains_key(name) {
                return Err(StoreError::UnknownUniverse(name.to_string()));
            }
            doc.active_universe_name = Some(name.to_string());
            Ok(())
        })
    }

    pub fn deactivate(&self) -> Result<()> {
        self.record.state().update("universes.deactivate", |doc| {
            doc.active_universe_name = None;
            Ok(())
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir().map_err(StoreError::IoError)?.join(path))
    }
}
