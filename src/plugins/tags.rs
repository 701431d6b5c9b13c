use crate::core::error::{Result, StoreError};
use crate::core::identity::Identity;
use std::collections::BTreeSet;

/// Set-of-strings view over a container's `tags`.
///
/// Every call is a fresh read (or a locked read-modify-write) of the state document;
/// nothing is cached between calls.
#[derive(Debug, Clone, Copy)]
pub struct Tags<'a> {
    record: &'a Identity,
}

impl<'a> Tags<'a> {
    pub fn new(record: &'a Identity) -> Self {
        Self { record }
    }

    /// Insert every tag. Already present tags are left alone.
    pub fn add<I, S>(&self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let incoming = normalize(tags)?;
        if incoming.is_empty() {
            return Ok(());
        }
        self.record.state().update("tags.add", |doc| {
            doc.tags.extend(incoming);
            Ok(())
        })
    }

    /// Remove every listed tag that is present; absent tags are ignored.
    pub fn remove<I, S>(&self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let outgoing: Vec<String> = tags.into_iter().map(|t| t.as_ref().to_string()).collect();
        if outgoing.is_empty() {
            return Ok(());
        }
        self.record.state().update("tags.remove", |doc| {
            for tag in &outgoing {
                doc.tags.remove(tag);
            }
            Ok(())
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.record.state().update("tags.clear", |doc| {
            doc.tags.clear();
            Ok(())
        })
    }

    pub fn contains(&self, tag: &str) -> Result<bool> {
        Ok(self.record.read()?.tags.contains(tag))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.record.read()?.tags.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Sorted snapshot.
    pub fn list(&self) -> Result<BTreeSet<String>> {
        Ok(self.record.read()?.tags)
    }
}

fn normalize<I, S>(tags: I) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = BTreeSet::new();
    for tag in tags {
        let tag = tag.as_ref();
        if tag.trim().is_empty() {
            return Err(StoreError::ValidationError(
                "tags cannot be empty".to_string(),
            ));
        }
        out.insert(tag.to_string());
    }
    Ok(out)
}
