//! Ordered, duplicate-free references from a group to other containers.
//!
//! Members are stored by uuid and type, so they can live anywhere on disk. Each entry also
//! caches the member's name and two locations (absolute, and relative to the group) that
//! are tried in turn when the member is resolved back into a facade. A member that cannot
//! be found under either location comes back as [`Member::Missing`].

use crate::containers::{Container, Group, Record, Sim};
use crate::core::config::StoreConfig;
use crate::core::document::{ContainerType, MemberRecord};
use crate::core::error::{Result, StoreError};
use crate::core::identity::{self, Identity};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::fs;
use std::ops::{Bound, RangeBounds};
use std::path::{Component, Path, PathBuf};

/// Where to find a prospective member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberTarget {
    pub uuid: String,
    pub containertype: ContainerType,
    pub basedir: PathBuf,
}

/// One argument to [`Members::add`]: a single reference or an arbitrarily nested list.
#[derive(Debug, Clone)]
pub enum MemberArg {
    One(MemberTarget),
    Many(Vec<MemberArg>),
}

impl<T: Record> From<&T> for MemberArg {
    fn from(record: &T) -> Self {
        let id = record.identity();
        MemberArg::One(MemberTarget {
            uuid: id.uuid().to_string(),
            containertype: id.containertype(),
            basedir: id.basedir().to_path_buf(),
        })
    }
}

impl From<MemberTarget> for MemberArg {
    fn from(target: MemberTarget) -> Self {
        MemberArg::One(target)
    }
}

impl From<&Member> for MemberArg {
    fn from(member: &Member) -> Self {
        match member {
            Member::Container(c) => c.into(),
            Member::Sim(s) => s.into(),
            Member::Group(g) => g.into(),
            Member::Missing(rec) => MemberArg::One(MemberTarget {
                uuid: rec.uuid.clone(),
                containertype: rec.containertype,
                basedir: rec.abspath.clone(),
            }),
        }
    }
}

impl<T: Into<MemberArg>> From<Vec<T>> for MemberArg {
    fn from(items: Vec<T>) -> Self {
        MemberArg::Many(items.into_iter().map(Into::into).collect())
    }
}

/// Build a `Vec<MemberArg>` from references and bracketed nested lists:
/// `member_args![&a, [&b, [&c]]]`.
#[macro_export]
macro_rules! member_args {
    (@push $v:ident;) => {};
    (@push $v:ident; [$($inner:tt)*] $(, $($rest:tt)*)?) => {
        $v.push($crate::plugins::members::MemberArg::Many($crate::member_args!($($inner)*)));
        $( $crate::member_args!(@push $v; $($rest)*); )?
    };
    (@push $v:ident; $e:expr $(, $($rest:tt)*)?) => {
        $v.push($crate::plugins::members::MemberArg::from($e));
        $( $crate::member_args!(@push $v; $($rest)*); )?
    };
    () => {
        ::std::vec::Vec::<$crate::plugins::members::MemberArg>::new()
    };
    ($($tokens:tt)+) => {{
        let mut args = ::std::vec::Vec::<$crate::plugins::members::MemberArg>::new();
        $crate::member_args!(@push args; $($tokens)+);
        args
    }};
}

/// Depth-first, left-to-right flattening without recursion.
pub fn flatten<I>(args: I) -> Vec<MemberTarget>
where
    I: IntoIterator<Item = MemberArg>,
{
    let mut out = Vec::new();
    let mut stack = vec![args.into_iter().collect::<Vec<_>>().into_iter()];
    loop {
        let next = match stack.last_mut() {
            Some(level) => level.next(),
            None => break,
        };
        match next {
            Some(MemberArg::One(target)) => out.push(target),
            Some(MemberArg::Many(items)) => stack.push(items.into_iter()),
            None => {
                stack.pop();
            }
        }
    }
    out
}

/// A resolved member.
#[derive(Debug, Clone)]
pub enum Member {
    Container(Container),
    Sim(Sim),
    Group(Group),
    /// Tombstone: the stored reference no longer resolves.
    Missing(MemberRecord),
}

impl Member {
    fn from_identity(id: Identity) -> Self {
        match id.containertype() {
            ContainerType::Container => Member::Container(Container::from_identity(id)),
            ContainerType::Sim => Member::Sim(Sim::from_identity(id)),
            ContainerType::Group => Member::Group(Group::from_identity(id)),
        }
    }

    pub fn uuid(&self) -> &str {
        match self {
            Member::Missing(rec) => &rec.uuid,
            other => other.identity_opt().map(Identity::uuid).unwrap_or_default(),
        }
    }

    pub fn containertype(&self) -> ContainerType {
        match self {
            Member::Container(_) => ContainerType::Container,
            Member::Sim(_) => ContainerType::Sim,
            Member::Group(_) => ContainerType::Group,
            Member::Missing(rec) => rec.containertype,
        }
    }

    /// Current name, or the cached one for a tombstone.
    pub fn name(&self) -> Result<String> {
        match self {
            Member::Missing(rec) => Ok(rec.name.clone()),
            other => match other.identity_opt() {
                Some(id) => id.name(),
                None => Err(StoreError::MissingMember(other.uuid().to_string())),
            },
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Member::Missing(_))
    }

    fn identity_opt(&self) -> Option<&Identity> {
        match self {
            Member::Container(c) => Some(c.identity()),
            Member::Sim(s) => Some(s.identity()),
            Member::Group(g) => Some(g.identity()),
            Member::Missing(_) => None,
        }
    }

    pub fn basedir(&self) -> Option<&Path> {
        self.identity_opt().map(Identity::basedir)
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Member::Container(c) => Some(c),
            Member::Sim(s) => Some(&**s),
            Member::Group(g) => Some(&**g),
            Member::Missing(_) => None,
        }
    }

    pub fn into_sim(self) -> Option<Sim> {
        match self {
            Member::Sim(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_group(self) -> Option<Group> {
        match self {
            Member::Group(g) => Some(g),
            _ => None,
        }
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.uuid() == other.uuid()
    }
}

impl<T: Record> PartialEq<T> for Member {
    fn eq(&self, other: &T) -> bool {
        self.uuid() == other.identity().uuid()
    }
}

/// Which entries [`Members::remove_selected`] drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberSelector {
    /// Position; negative values count from the end.
    Index(isize),
    Range(Bound<usize>, Bound<usize>),
    Uuid(String),
}

/// The member list of one group.
#[derive(Debug, Clone, Copy)]
pub struct Members<'a> {
    record: &'a Identity,
}

impl<'a> Members<'a> {
    pub fn new(record: &'a Identity) -> Self {
        Self { record }
    }

    fn config(&self) -> &StoreConfig {
        self.record.config()
    }

    fn records(&self) -> Result<Vec<MemberRecord>> {
        Ok(self.record.read()?.members)
    }

    /// Append every reference in `args`, flattening nested lists in order.
    /// References already present (or repeated within `args`) keep their first position.
    /// Nothing is written unless every new reference resolves and none would form a cycle.
    pub fn add<I>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = MemberArg>,
    {
        let owner = self.record.uuid().to_string();
        let mut seen = FxHashSet::default();
        let mut incoming = Vec::new();

        for target in flatten(args) {
            if target.uuid == owner {
                return Err(StoreError::MembershipCycle(format!(
                    "group {} cannot contain itself",
                    owner
                )));
            }
            if !seen.insert(target.uuid.clone()) {
                continue;
            }
            let id = identity::open_exact(
                &target.basedir,
                &target.uuid,
                target.containertype,
                self.config(),
            )?
            .ok_or_else(|| {
                StoreError::MissingMember(format!(
                    "{} {} not found at {}",
                    target.containertype,
                    target.uuid,
                    target.basedir.display()
                ))
            })?;
            if id.containertype() == ContainerType::Group && reaches(&id, &owner, self.config())? {
                return Err(StoreError::MembershipCycle(format!(
                    "group {} already contains {} through its members",
                    id.uuid(),
                    owner
                )));
            }
            incoming.push(MemberRecord {
                uuid: id.uuid().to_string(),
                containertype: id.containertype(),
                name: id.name()?,
                abspath: id.basedir().to_path_buf(),
                relpath: relative_path(self.record.basedir(), id.basedir()),
            });
        }

        if incoming.is_empty() {
            return Ok(());
        }
        self.record.state().update("members.add", |doc| {
            for rec in incoming {
                if !doc.members.iter().any(|m| m.uuid == rec.uuid) {
                    doc.members.push(rec);
                }
            }
            Ok(())
        })
    }

    /// Returns how many entries were dropped.
    pub fn remove_selected(&self, selector: MemberSelector) -> Result<usize> {
        self.record.state().update("members.remove", |doc| {
            let len = doc.members.len();
            let removed = match &selector {
                MemberSelector::Index(i) => match normalize_index(*i, len) {
                    Some(i) => {
                        doc.members.remove(i);
                        1
                    }
                    None => 0,
                },
                MemberSelector::Range(start, end) => {
                    let range = clamp_range(len, *start, *end);
                    doc.members.drain(range).count()
                }
                MemberSelector::Uuid(uuid) => {
                    doc.members.retain(|m| &m.uuid != uuid);
                    len - doc.members.len()
                }
            };
            Ok(removed)
        })
    }

    pub fn remove<T: Record>(&self, record: &T) -> Result<usize> {
        self.remove_selected(MemberSelector::Uuid(record.identity().uuid().to_string()))
    }

    pub fn remove_index(&self, index: isize) -> Result<usize> {
        self.remove_selected(MemberSelector::Index(index))
    }

    pub fn remove_range<R: RangeBounds<usize>>(&self, range: R) -> Result<usize> {
        self.remove_selected(MemberSelector::Range(
            range.start_bound().cloned(),
            range.end_bound().cloned(),
        ))
    }

    pub fn clear(&self) -> Result<()> {
        self.record.state().update("members.clear", |doc| {
            doc.members.clear();
            Ok(())
        })
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.records()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains<T: Record>(&self, record: &T) -> Result<bool> {
        let uuid = record.identity().uuid();
        Ok(self.records()?.iter().any(|m| m.uuid == uuid))
    }

    /// Member at `index`; negative indices count from the end.
    pub fn get(&self, index: isize) -> Result<Option<Member>> {
        let records = self.records()?;
        match normalize_index(index, records.len()) {
            Some(i) => self.resolve(&records[i]).map(Some),
            None => Ok(None),
        }
    }

    /// Members in `range`, clamped to the list like a slice in a dynamic language.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Result<Vec<Member>> {
        let records = self.records()?;
        let range = clamp_range(
            records.len(),
            range.start_bound().cloned(),
            range.end_bound().cloned(),
        );
        records[range].iter().map(|r| self.resolve(r)).collect()
    }

    pub fn all(&self) -> Result<Vec<Member>> {
        self.slice(..)
    }

    pub fn uuids(&self) -> Result<Vec<String>> {
        Ok(self.records()?.into_iter().map(|m| m.uuid).collect())
    }

    pub fn containertypes(&self) -> Result<Vec<ContainerType>> {
        Ok(self.records()?.into_iter().map(|m| m.containertype).collect())
    }

    /// Current names; tombstones report the name cached when they were last seen.
    pub fn names(&self) -> Result<Vec<String>> {
        self.all()?.iter().map(Member::name).collect()
    }

    /// Rewrite cached names and locations from the members' current state.
    /// Returns the number of members that could not be resolved.
    pub fn refresh(&self) -> Result<usize> {
        let owner_dir = self.record.basedir().to_path_buf();
        let config = self.config().clone();
        self.record.state().update("members.refresh", |doc| {
            let mut missing = 0;
            for rec in doc.members.iter_mut() {
                match resolve_identity(&owner_dir, rec, &config)? {
                    Some(id) => {
                        rec.name = id.name()?;
                        rec.abspath = id.basedir().to_path_buf();
                        rec.relpath = relative_path(&owner_dir, id.basedir());
                    }
                    None => missing += 1,
                }
            }
            Ok(missing)
        })
    }

    fn resolve(&self, rec: &MemberRecord) -> Result<Member> {
        Ok(
            match resolve_identity(self.record.basedir(), rec, self.config())? {
                Some(id) => Member::from_identity(id),
                None => Member::Missing(rec.clone()),
            },
        )
    }
}

/// Look the member up at its absolute path, then relative to the owning group, then among
/// the siblings of either location (a renamed member stays in the same parent directory).
pub fn resolve_identity(
    owner_dir: &Path,
    rec: &MemberRecord,
    config: &StoreConfig,
) -> Result<Option<Identity>> {
    let relative = normalize_lexically(&owner_dir.join(&rec.relpath));
    for candidate in [&rec.abspath, &relative] {
        if let Some(id) = identity::open_exact(candidate, &rec.uuid, rec.containertype, config)? {
            return Ok(Some(id));
        }
    }
    for candidate in [&rec.abspath, &relative] {
        let Some(parent) = candidate.parent() else {
            continue;
        };
        let Ok(entries) = fs::read_dir(parent) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(id) = identity::open_exact(&path, &rec.uuid, rec.containertype, config)? {
                return Ok(Some(id));
            }
        }
    }
    Ok(None)
}

/// Whether `target` is reachable from `group` through nested group membership.
fn reaches(group: &Identity, target: &str, config: &StoreConfig) -> Result<bool> {
    let mut visited = FxHashSet::default();
    let mut queue = VecDeque::from([group.clone()]);
    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.uuid().to_string()) {
            continue;
        }
        for rec in current.read()?.members {
            if rec.uuid == target {
                return Ok(true);
            }
            if rec.containertype != ContainerType::Group || visited.contains(&rec.uuid) {
                continue;
            }
            if let Some(next) = resolve_identity(current.basedir(), &rec, config)? {
                queue.push_back(next);
            }
        }
    }
    Ok(false)
}

fn normalize_index(index: isize, len: usize) -> Option<usize> {
    let resolved = if index < 0 {
        len.checked_sub(index.unsigned_abs())?
    } else {
        index as usize
    };
    (resolved < len).then_some(resolved)
}

fn clamp_range(len: usize, start: Bound<usize>, end: Bound<usize>) -> std::ops::Range<usize> {
    let start = match start {
        Bound::Included(s) => s,
        Bound::Excluded(s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    }
    .min(len);
    let end = match end {
        Bound::Included(e) => e.saturating_add(1),
        Bound::Excluded(e) => e,
        Bound::Unbounded => len,
    }
    .min(len);
    start..end.max(start)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Path of `to` as seen from directory `from`. Both are expected to be absolute.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from = normalize_lexically(from);
    let to = normalize_lexically(to);
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for comp in &to[common..] {
        out.push(comp.as_os_str());
    }
    out
}
