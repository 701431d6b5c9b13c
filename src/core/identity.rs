//! Container identity and find-or-create ("regeneration").

use crate::core::config::StoreConfig;
use crate::core::document::{ContainerType, StateDocument};
use crate::core::error::{Result, StoreError};
use crate::core::lock;
use crate::core::schemas;
use crate::core::statefile::StateFile;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a record lives and how to reach its state. Holds no cached metadata:
/// uuid and type never change, everything else is read from disk on demand.
#[derive(Debug, Clone)]
pub struct Identity {
    uuid: String,
    containertype: ContainerType,
    basedir: PathBuf,
    state: StateFile,
}

impl Identity {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn containertype(&self) -> ContainerType {
        self.containertype
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    /// Parent directory of the base directory.
    pub fn location(&self) -> &Path {
        self.basedir.parent().unwrap_or(&self.basedir)
    }

    pub fn state(&self) -> &StateFile {
        &self.state
    }

    pub fn config(&self) -> &StoreConfig {
        self.state.config()
    }

    pub fn read(&self) -> Result<StateDocument> {
        self.state.read()
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.read()?.name)
    }

    fn from_parts(doc: &StateDocument, basedir: PathBuf, config: &StoreConfig) -> Self {
        let state = StateFile::new(&basedir, &doc.state_file_name(), config);
        Self {
            uuid: doc.uuid.clone(),
            containertype: doc.containertype,
            basedir,
            state,
        }
    }

    /// Rename the base directory and the stored name together.
    pub fn rename(&mut self, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        let new_basedir = self.location().join(new_name);
        self.move_to(new_basedir, "identity.rename", Some(new_name))
    }

    /// Move the base directory under `new_location`, keeping the name.
    pub fn relocate(&mut self, new_location: &Path) -> Result<()> {
        let dir_name = self
            .basedir
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| StoreError::ValidationError("base directory has no name".into()))?;
        fs::create_dir_all(new_location).map_err(StoreError::IoError)?;
        self.move_to(new_location.join(dir_name), "identity.relocate", None)
    }

    fn move_to(&mut self, new_basedir: PathBuf, op: &str, new_name: Option<&str>) -> Result<()> {
        if new_basedir == self.basedir {
            return Ok(());
        }
        if new_basedir.exists() {
            return Err(StoreError::ValidationError(format!(
                "{} already exists",
                new_basedir.display()
            )));
        }

        let mut lease = self.state.lock()?;
        if let Some(name) = new_name {
            self.state.update_locked(op, |doc| {
                doc.name = name.to_string();
                Ok(())
            })?;
        }
        if let Err(e) = fs::rename(&self.basedir, &new_basedir) {
            if new_name.is_some() {
                // Put the old name back so the document keeps matching its directory.
                let old_name = self.basedir.file_name().map(|n| n.to_string_lossy().to_string());
                if let Some(old_name) = old_name {
                    let _ = self.state.update_locked(op, |doc| {
                        doc.name = old_name;
                        Ok(())
                    });
                }
            }
            return Err(StoreError::IoError(e));
        }
        lease.relocate(lock::lock_path(&new_basedir));

        let doc = StateFile::new(&new_basedir, &self.containertype.state_file_name(&self.uuid), self.config())
            .read()?;
        *self = Self::from_parts(&doc, new_basedir, self.config());
        Ok(())
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    if schemas::is_valid_segment(name) {
        Ok(())
    } else {
        Err(StoreError::ValidationError(format!(
            "invalid container name '{}': must be a single path segment not starting with '.'",
            name
        )))
    }
}

/// Locate the state document inside `basedir`, if any.
pub fn find_state_file(basedir: &Path) -> Result<Option<(ContainerType, String, PathBuf)>> {
    let entries = match fs::read_dir(basedir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::IoError(e)),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(StoreError::IoError)?;
        if !entry.file_type().map_err(StoreError::IoError)?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if let Some((ty, uuid)) = ContainerType::parse_state_file_name(&file_name) {
            found.push((ty, uuid, entry.path()));
        }
    }
    found.sort_by(|a, b| a.2.cmp(&b.2));
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        _ => Err(StoreError::CorruptState {
            path: basedir.to_path_buf(),
            reason: format!("{} state documents in one directory", found.len()),
        }),
    }
}

/// Load the record at `<parent>/<name>` or create it.
pub fn create_or_load(
    parent: &Path,
    name: &str,
    containertype: ContainerType,
    config: &StoreConfig,
) -> Result<Identity> {
    validate_name(name)?;
    let basedir = absolute(&parent.join(name))?;
    fs::create_dir_all(&basedir).map_err(StoreError::IoError)?;

    let _lease = lock::acquire(&lock::lock_path(&basedir), config)?;
    if let Some((found_type, _, path)) = find_state_file(&basedir)? {
        if found_type != containertype {
            return Err(StoreError::ValidationError(format!(
                "{} already holds a {} record, not a {}",
                basedir.display(),
                found_type,
                containertype
            )));
        }
        let doc = crate::core::statefile::read_document(&path)?;
        return Ok(Identity::from_parts(&doc, basedir, config));
    }

    let doc = StateDocument::new(name, containertype);
    let identity = Identity::from_parts(&doc, basedir, config);
    let outcome = crate::core::statefile::write_document(identity.state.path(), &doc);
    identity
        .state
        .journal()
        .finish("identity.create", &doc.uuid, outcome)?;
    Ok(identity)
}

/// Load an existing record from its base directory.
pub fn open(basedir: &Path, config: &StoreConfig) -> Result<Identity> {
    let basedir = absolute(basedir)?;
    let Some((_, _, path)) = find_state_file(&basedir)? else {
        return Err(StoreError::MissingMember(format!(
            "no container at {}",
            basedir.display()
        )));
    };
    let doc = crate::core::statefile::read_document(&path)?;
    Ok(Identity::from_parts(&doc, basedir, config))
}

/// Load the record with `uuid` and `containertype` if its state document is in `basedir`.
pub fn open_exact(
    basedir: &Path,
    uuid: &str,
    containertype: ContainerType,
    config: &StoreConfig,
) -> Result<Option<Identity>> {
    let path = basedir.join(containertype.state_file_name(uuid));
    if !path.is_file() {
        return Ok(None);
    }
    let doc = crate::core::statefile::read_document(&path)?;
    Ok(Some(Identity::from_parts(&doc, basedir.to_path_buf(), config)))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir().map_err(StoreError::IoError)?.join(path))
    }
}
