//! Facades: `Container`, `Sim` and `Group`.
//!
//! A facade is a uuid, a type and a base directory. It caches no metadata, so two facades
//! over the same record always agree once each re-reads (which every accessor does).

use crate::core::config::StoreConfig;
use crate::core::document::{ContainerType, StateDocument};
use crate::core::error::{Result, StoreError};
use crate::core::identity::{self, Identity};
use crate::core::journal::Journal;
use crate::plugins::categories::Categories;
use crate::plugins::data::Data;
use crate::plugins::members::Members;
use crate::plugins::tags::Tags;
use crate::plugins::universes::{PathLoader, TrajectoryLoader, Universes};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Anything backed by a container record.
pub trait Record {
    fn identity(&self) -> &Identity;
}

#[derive(Debug, Clone)]
pub struct Container {
    id: Identity,
}

impl Container {
    /// Load `<parent>/<name>` if it exists, otherwise create it ("regeneration").
    pub fn create_or_load(parent: impl AsRef<Path>, name: &str) -> Result<Self> {
        Self::create_or_load_with_config(parent, name, &StoreConfig::default())
    }

    pub fn create_or_load_with_config(
        parent: impl AsRef<Path>,
        name: &str,
        config: &StoreConfig,
    ) -> Result<Self> {
        identity::create_or_load(parent.as_ref(), name, ContainerType::Container, config)
            .map(Self::from_identity)
    }

    /// Open any existing record as a plain container.
    pub fn open(basedir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(basedir, &StoreConfig::default())
    }

    pub fn open_with_config(basedir: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        identity::open(basedir.as_ref(), config).map(Self::from_identity)
    }

    pub(crate) fn from_identity(id: Identity) -> Self {
        Self { id }
    }

    pub fn uuid(&self) -> &str {
        self.id.uuid()
    }

    pub fn name(&self) -> Result<String> {
        self.id.name()
    }

    pub fn containertype(&self) -> ContainerType {
        self.id.containertype()
    }

    pub fn basedir(&self) -> &Path {
        self.id.basedir()
    }

    pub fn location(&self) -> &Path {
        self.id.location()
    }

    /// Snapshot of the full state document.
    pub fn state(&self) -> Result<StateDocument> {
        self.id.read()
    }

    pub fn journal(&self) -> &Journal {
        self.id.state().journal()
    }

    pub fn tags(&self) -> Tags<'_> {
        Tags::new(&self.id)
    }

    pub fn categories(&self) -> Categories<'_> {
        Categories::new(&self.id)
    }

    pub fn data(&self) -> Data<'_> {
        Data::new(&self.id)
    }

    pub fn rename(&mut self, new_name: &str) -> Result<()> {
        self.id.rename(new_name)
    }

    pub fn relocate(&mut self, new_location: impl AsRef<Path>) -> Result<()> {
        self.id.relocate(new_location.as_ref())
    }
}

impl Record for Container {
    fn identity(&self) -> &Identity {
        &self.id
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.uuid() == other.uuid()
    }
}

impl Eq for Container {}

impl PartialOrd for Container {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// By name, then uuid. Unreadable names sort first.
impl Ord for Container {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.uuid() == other.uuid() {
            return Ordering::Equal;
        }
        self.name()
            .ok()
            .cmp(&other.name().ok())
            .then_with(|| self.uuid().cmp(other.uuid()))
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Ok(name) => write!(f, "<{}: '{}'>", self.containertype(), name),
            Err(_) => write!(f, "<{}: {}>", self.containertype(), self.uuid()),
        }
    }
}

fn expect_type(id: Identity, expected: ContainerType) -> Result<Identity> {
    if id.containertype() == expected {
        Ok(id)
    } else {
        Err(StoreError::ValidationError(format!(
            "{} holds a {}, not a {}",
            id.basedir().display(),
            id.containertype(),
            expected
        )))
    }
}

macro_rules! container_facade {
    ($ty:ident $(<$param:ident: $bound:path>)?) => {
        impl$(<$param: $bound>)? Deref for $ty$(<$param>)? {
            type Target = Container;

            fn deref(&self) -> &Container {
                &self.container
            }
        }

        impl$(<$param: $bound>)? DerefMut for $ty$(<$param>)? {
            fn deref_mut(&mut self) -> &mut Container {
                &mut self.container
            }
        }

        impl$(<$param: $bound>)? Record for $ty$(<$param>)? {
            fn identity(&self) -> &Identity {
                &self.container.id
            }
        }

        impl$(<$param: $bound>)? PartialEq for $ty$(<$param>)? {
            fn eq(&self, other: &Self) -> bool {
                self.container == other.container
            }
        }

        impl$(<$param: $bound>)? Eq for $ty$(<$param>)? {}

        impl$(<$param: $bound>)? PartialOrd for $ty$(<$param>)? {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl$(<$param: $bound>)? Ord for $ty$(<$param>)? {
            fn cmp(&self, other: &Self) -> Ordering {
                self.container.cmp(&other.container)
            }
        }

        impl$(<$param: $bound>)? fmt::Display for $ty$(<$param>)? {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.container, f)
            }
        }
    };
}

/// Container with a trajectory (universe) registry.
pub struct Sim<L: TrajectoryLoader = PathLoader> {
    container: Container,
    loader: L,
    active: Mutex<Option<ActiveUniverse<L::Universe>>>,
}

struct ActiveUniverse<U> {
    name: String,
    definition: crate::core::document::UniverseDefinition,
    universe: Arc<U>,
}

impl Sim<PathLoader> {
    pub fn create_or_load(parent: impl AsRef<Path>, name: &str) -> Result<Self> {
        Self::create_or_load_with_config(parent, name, &StoreConfig::default())
    }

    pub fn create_or_load_with_config(
        parent: impl AsRef<Path>,
        name: &str,
        config: &StoreConfig,
    ) -> Result<Self> {
        Self::with_loader(parent, name, config, PathLoader)
    }

    pub fn open(basedir: impl AsRef<Path>) -> Result<Self> {
        let id = identity::open(basedir.as_ref(), &StoreConfig::default())?;
        Ok(Self::from_identity(expect_type(id, ContainerType::Sim)?))
    }

    pub(crate) fn from_identity(id: Identity) -> Self {
        Self::from_parts(Container::from_identity(id), PathLoader)
    }
}

impl<L: TrajectoryLoader> Sim<L> {
    pub fn with_loader(
        parent: impl AsRef<Path>,
        name: &str,
        config: &StoreConfig,
        loader: L,
    ) -> Result<Self> {
        let id = identity::create_or_load(parent.as_ref(), name, ContainerType::Sim, config)?;
        Ok(Self::from_parts(Container::from_identity(id), loader))
    }

    fn from_parts(container: Container, loader: L) -> Self {
        Self {
            container,
            loader,
            active: Mutex::new(None),
        }
    }

    pub fn universes(&self) -> Universes<'_> {
        Universes::new(&self.container.id)
    }

    /// The active universe, loaded on first use and reloaded whenever the persisted
    /// default (or its definition) changes.
    pub fn universe(&self) -> Result<Option<Arc<L::Universe>>> {
        let doc = self.container.state()?;
        let mut active = self.cached();
        let Some(name) = doc.active_universe_name else {
            *active = None;
            return Ok(None);
        };
        let definition = doc
            .universes
            .get(&name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownUniverse(name.clone()))?;

        if let Some(current) = active.as_ref() {
            if current.name == name && current.definition == definition {
                return Ok(Some(Arc::clone(&current.universe)));
            }
        }

        let universe = Arc::new(self.loader.load(&name, &definition)?);
        *active = Some(ActiveUniverse {
            name,
            definition,
            universe: Arc::clone(&universe),
        });
        Ok(Some(universe))
    }

    // A panic inside a loader leaves at worst a stale handle, which the next call replaces.
    fn cached(&self) -> MutexGuard<'_, Option<ActiveUniverse<L::Universe>>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load a specific definition without changing the default.
    pub fn load_universe(&self, name: &str) -> Result<L::Universe> {
        let definition = self.universes().definition(name)?;
        self.loader.load(name, &definition)
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}

impl<L: TrajectoryLoader + Clone> Clone for Sim<L> {
    fn clone(&self) -> Self {
        Self::from_parts(self.container.clone(), self.loader.clone())
    }
}

impl<L: TrajectoryLoader> fmt::Debug for Sim<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sim")
            .field("container", &self.container)
            .field(
                "active",
                &self.cached().as_ref().map(|a| a.name.clone()),
            )
            .finish()
    }
}

container_facade!(Sim<L: TrajectoryLoader>);

/// Container with an ordered member list.
#[derive(Debug, Clone)]
pub struct Group {
    container: Container,
}

impl Group {
    pub fn create_or_load(parent: impl AsRef<Path>, name: &str) -> Result<Self> {
        Self::create_or_load_with_config(parent, name, &StoreConfig::default())
    }

    pub fn create_or_load_with_config(
        parent: impl AsRef<Path>,
        name: &str,
        config: &StoreConfig,
    ) -> Result<Self> {
        identity::create_or_load(parent.as_ref(), name, ContainerType::Group, config)
            .map(Self::from_identity)
    }

    pub fn open(basedir: impl AsRef<Path>) -> Result<Self> {
        let id = identity::open(basedir.as_ref(), &StoreConfig::default())?;
        Ok(Self::from_identity(expect_type(id, ContainerType::Group)?))
    }

    pub(crate) fn from_identity(id: Identity) -> Self {
        Self {
            container: Container::from_identity(id),
        }
    }

    pub fn members(&self) -> Members<'_> {
        Members::new(&self.container.id)
    }
}

container_facade!(Group);
