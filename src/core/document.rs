//! The persisted state document of one container.

use crate::core::error::{Result, StoreError};
use crate::core::schemas;
use crate::core::time;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerType {
    Container,
    Sim,
    Group,
}

impl ContainerType {
    pub const ALL: [ContainerType; 3] = [
        ContainerType::Container,
        ContainerType::Sim,
        ContainerType::Group,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerType::Container => "Container",
            ContainerType::Sim => "Sim",
            ContainerType::Group => "Group",
        }
    }

    /// `<Type>.<uuid>.json`
    pub fn state_file_name(&self, uuid: &str) -> String {
        format!("{}.{}.{}", self.as_str(), uuid, schemas::STATE_FILE_EXT)
    }

    /// Inverse of [`ContainerType::state_file_name`].
    pub fn parse_state_file_name(file_name: &str) -> Option<(ContainerType, String)> {
        let stem = file_name.strip_suffix(&format!(".{}", schemas::STATE_FILE_EXT))?;
        let (ty, uuid) = stem.split_once('.')?;
        let ty = ty.parse::<ContainerType>().ok()?;
        time::is_record_id(uuid).then(|| (ty, uuid.to_string()))
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Container" => Ok(ContainerType::Container),
            "Sim" => Ok(ContainerType::Sim),
            "Group" => Ok(ContainerType::Group),
            other => Err(StoreError::ValidationError(format!(
                "unknown container type '{}'",
                other
            ))),
        }
    }
}

/// One entry of a group's member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub uuid: String,
    pub containertype: ContainerType,
    /// Name at the time the member was added or last resolved.
    pub name: String,
    /// Last known absolute base directory.
    pub abspath: PathBuf,
    /// Base directory relative to the owning group's base directory.
    pub relpath: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseDefinition {
    pub topology: PathBuf,
    #[serde(default)]
    pub trajectories: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    pub schema_version: u32,
    pub uuid: String,
    pub name: String,
    pub containertype: ContainerType,
    pub created: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub categories: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<MemberRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub universes: BTreeMap<String, UniverseDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_universe_name: Option<String>,
}

impl StateDocument {
    pub fn new(name: &str, containertype: ContainerType) -> Self {
        Self {
            schema_version: schemas::STATE_SCHEMA_VERSION,
            uuid: time::new_record_id(),
            name: name.to_string(),
            containertype,
            created: time::now_epoch_z(),
            tags: BTreeSet::new(),
            categories: BTreeMap::new(),
            members: Vec::new(),
            universes: BTreeMap::new(),
            active_universe_name: None,
        }
    }

    pub fn state_file_name(&self) -> String {
        self.containertype.state_file_name(&self.uuid)
    }

    /// Structural invariants. `path` only labels the error.
    pub fn validate(&self, path: &Path) -> Result<()> {
        let corrupt = |reason: String| StoreError::CorruptState {
            path: path.to_path_buf(),
            reason,
        };

        if self.schema_version > schemas::STATE_SCHEMA_VERSION {
            return Err(corrupt(format!(
                "schema_version {} is newer than supported {}",
                self.schema_version,
                schemas::STATE_SCHEMA_VERSION
            )));
        }
        if !time::is_record_id(&self.uuid) {
            return Err(corrupt(format!("invalid uuid '{}'", self.uuid)));
        }
        if self.name.is_empty() {
            return Err(corrupt("empty name".to_string()));
        }

        let mut seen = FxHashSet::default();
        for member in &self.members {
            if member.uuid == self.uuid {
                return Err(corrupt("record lists itself as a member".to_string()));
            }
            if !seen.insert(member.uuid.as_str()) {
                return Err(corrupt(format!("duplicate member {}", member.uuid)));
            }
        }
        if !self.members.is_empty() && self.containertype != ContainerType::Group {
            return Err(corrupt(format!(
                "{} records cannot hold members",
                self.containertype
            )));
        }

        if let Some(active) = &self.active_universe_name {
            if !self.universes.contains_key(active) {
                return Err(corrupt(format!(
                    "active universe '{}' is not defined",
                    active
                )));
            }
        }
        Ok(())
    }
}
