use crate::core::document::ContainerType;
use crate::core::error::{Result, StoreError};
use crate::core::identity::Identity;
use crate::core::schemas;
use crate::core::statefile;
use crate::core::time;
use crate::plugins::codecs::{PayloadCodec, codec_for};
use crate::plugins::payload::{Format, Payload};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Persisted record of how a handle was written. `get` trusts this instead of
/// re-inspecting the payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub format: Format,
    pub file: String,
    pub sha256: String,
    pub bytes: u64,
    pub written: String,
}

/// Named payloads stored under a container's base directory, one directory per handle.
#[derive(Debug, Clone, Copy)]
pub struct Data<'a> {
    record: &'a Identity,
}

impl<'a> Data<'a> {
    pub fn new(record: &'a Identity) -> Self {
        Self { record }
    }

    /// Directory backing `handle`.
    pub fn locate(&self, handle: &str) -> Result<PathBuf> {
        validate_handle(handle)?;
        Ok(handle
            .split('/')
            .fold(self.record.basedir().to_path_buf(), |p, seg| p.join(seg)))
    }

    /// Store `payload` under `handle`, replacing whatever was there (of any format).
    pub fn add(&self, handle: &str, payload: impl Into<Payload>) -> Result<()> {
        let payload = payload.into();
        let dir = self.locate(handle)?;
        payload.validate()?;
        let codec = codec_for(payload.format());

        let _lease = self.record.state().lock()?;
        let outcome = write_handle(&dir, codec, &payload);
        self.record
            .state()
            .journal()
            .finish("data.add", self.record.uuid(), outcome)
    }

    pub fn set(&self, handle: &str, payload: impl Into<Payload>) -> Result<()> {
        self.add(handle, payload)
    }

    /// `Ok(None)` when nothing is stored under `handle`.
    pub fn get(&self, handle: &str) -> Result<Option<Payload>> {
        let dir = self.locate(handle)?;
        let retries = self.record.config().read_retries;
        let mut attempt = 0;
        loop {
            match read_handle(&dir, handle) {
                Err(StoreError::CorruptData { .. }) if attempt < retries => {
                    attempt += 1;
                    std::thread::sleep(self.record.config().lock_retry());
                }
                other => return other,
            }
        }
    }

    pub fn format_of(&self, handle: &str) -> Result<Option<Format>> {
        let dir = self.locate(handle)?;
        match read_manifest(&dir, handle)? {
            Some(manifest) => Ok(Some(manifest.format)),
            None => Ok(discover_format(&dir)),
        }
    }

    pub fn contains(&self, handle: &str) -> Result<bool> {
        Ok(self.format_of(handle)?.is_some())
    }

    /// Delete the handle directory and everything below it. Absent handles are a no-op.
    pub fn remove(&self, handle: &str) -> Result<()> {
        let dir = self.locate(handle)?;
        let _lease = self.record.state().lock()?;
        let outcome = remove_tree(&dir).map(|_| prune_empty_parents(&dir, self.record.basedir()));
        self.record
            .state()
            .journal()
            .finish("data.remove", self.record.uuid(), outcome)
    }

    /// All stored handles, sorted, nested ones joined with `/`.
    pub fn keys(&self) -> Result<Vec<String>> {
        let root = self.record.basedir();
        let mut handles = BTreeSet::new();
        let walker = WalkDir::new(root)
            .min_depth(2)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_string_lossy().as_ref()));
        for entry in walker {
            let entry = entry.map_err(|e| StoreError::IoError(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name != schemas::MANIFEST_FILE_NAME && Format::from_file_name(&name).is_none() {
                continue;
            }
            let Some(parent) = entry.path().parent() else {
                continue;
            };
            if let Ok(rel) = parent.strip_prefix(root) {
                let handle: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect();
                handles.insert(handle.join("/"));
            }
        }
        Ok(handles.into_iter().collect())
    }

    pub fn clear(&self) -> Result<()> {
        for handle in self.keys()? {
            self.remove(&handle)?;
        }
        Ok(())
    }
}

pub fn validate_handle(handle: &str) -> Result<()> {
    if handle.is_empty() || !handle.split('/').all(schemas::is_valid_segment) {
        return Err(StoreError::ValidationError(format!(
            "invalid data handle '{}': use '/'-separated names not starting with '.'",
            handle
        )));
    }
    if let Some(segment) = handle.split('/').find(|seg| is_reserved(seg)) {
        return Err(StoreError::ValidationError(format!(
            "invalid data handle '{}': '{}' is a reserved file name",
            handle, segment
        )));
    }
    Ok(())
}

/// Names the store itself writes inside a container or handle directory.
fn is_reserved(segment: &str) -> bool {
    segment == schemas::MANIFEST_FILE_NAME
        || Format::from_file_name(segment).is_some()
        || ContainerType::parse_state_file_name(segment).is_some()
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let bytes = fs::read(path).map_err(StoreError::IoError)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok((format!("{:x}", hasher.finalize()), bytes.len() as u64))
}

fn write_handle(dir: &Path, codec: &dyn PayloadCodec, payload: &Payload) -> Result<()> {
    let created = !dir.exists();
    fs::create_dir_all(dir).map_err(StoreError::IoError)?;

    let final_path = dir.join(codec.file_name());
    let tmp = dir.join(format!(".{}.{}.tmp", codec.file_name(), time::temp_suffix()));

    let staged = codec.encode(payload, &tmp).and_then(|_| sha256_file(&tmp));
    let (sha256, bytes) = match staged {
        Ok(digest) => digest,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            if created {
                let _ = fs::remove_dir(dir);
            }
            return Err(e);
        }
    };
    fs::rename(&tmp, &final_path).map_err(StoreError::IoError)?;

    let manifest = Manifest {
        format: codec.format(),
        file: codec.file_name().to_string(),
        sha256,
        bytes,
        written: time::now_epoch_z(),
    };
    let body = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| StoreError::ValidationError(format!("manifest encode failed: {}", e)))?;
    statefile::write_atomic(&dir.join(schemas::MANIFEST_FILE_NAME), &body)?;

    for other in Format::ALL.into_iter().filter(|f| *f != codec.format()) {
        let stale = dir.join(other.file_name());
        if stale.exists() {
            fs::remove_file(&stale).map_err(StoreError::IoError)?;
        }
    }
    Ok(())
}

fn read_manifest(dir: &Path, handle: &str) -> Result<Option<Manifest>> {
    let path = dir.join(schemas::MANIFEST_FILE_NAME);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::IoError(e)),
    };
    let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptData {
        handle: handle.to_string(),
        reason: format!("bad manifest: {}", e),
    })?;
    if manifest.file != manifest.format.file_name() {
        return Err(StoreError::CorruptData {
            handle: handle.to_string(),
            reason: format!(
                "manifest names '{}' for {} data",
                manifest.file, manifest.format
            ),
        });
    }
    Ok(Some(manifest))
}

fn discover_format(dir: &Path) -> Option<Format> {
    Format::ALL
        .into_iter()
        .find(|f| dir.join(f.file_name()).is_file())
}

fn read_handle(dir: &Path, handle: &str) -> Result<Option<Payload>> {
    let corrupt = |reason: String| StoreError::CorruptData {
        handle: handle.to_string(),
        reason,
    };

    match read_manifest(dir, handle)? {
        Some(manifest) => {
            let path = dir.join(&manifest.file);
            if !path.is_file() {
                return Err(corrupt(format!("{} is missing", manifest.file)));
            }
            let (sha256, _) = sha256_file(&path)?;
            if sha256 != manifest.sha256 {
                return Err(corrupt(format!("{} does not match its manifest digest", manifest.file)));
            }
            codec_for(manifest.format).decode(&path, handle).map(Some)
        }
        None => match discover_format(dir) {
            Some(format) => codec_for(format)
                .decode(&dir.join(format.file_name()), handle)
                .map(Some),
            None => Ok(None),
        },
    }
}

fn remove_tree(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::IoError(e)),
    }
}

/// Drop directories left empty between a removed nested handle and the base directory.
fn prune_empty_parents(dir: &Path, root: &Path) {
    let mut current = dir.parent();
    while let Some(parent) = current {
        if parent == root || !parent.starts_with(root) {
            break;
        }
        if fs::remove_dir(parent).is_err() {
            break;
        }
        current = parent.parent();
    }
}
