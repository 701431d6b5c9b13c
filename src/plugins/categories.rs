use crate::core::error::{Result, StoreError};
use crate::core::identity::Identity;
use std::collections::BTreeMap;
use std::fmt;

/// A category value, already coerced to its stored string form.
///
/// Strings are kept verbatim, integers are written in decimal, booleans as
/// `true`/`false`, and floats use the shortest representation that parses back to the
/// same `f64` (always with a fractional part or exponent, so `42.0` stays `"42.0"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryValue(String);

impl CategoryValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CategoryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryValue {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

impl From<String> for CategoryValue {
    fn from(v: String) -> Self {
        Self(v)
    }
}

impl From<&String> for CategoryValue {
    fn from(v: &String) -> Self {
        Self(v.clone())
    }
}

impl From<bool> for CategoryValue {
    fn from(v: bool) -> Self {
        Self(v.to_string())
    }
}

impl From<f64> for CategoryValue {
    fn from(v: f64) -> Self {
        Self(format!("{:?}", v))
    }
}

impl From<f32> for CategoryValue {
    fn from(v: f32) -> Self {
        Self(format!("{:?}", v))
    }
}

macro_rules! category_value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for CategoryValue {
            fn from(v: $t) -> Self {
                Self(v.to_string())
            }
        })*
    };
}

category_value_from_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

/// String-keyed mapping view over a container's `categories`.
#[derive(Debug, Clone, Copy)]
pub struct Categories<'a> {
    record: &'a Identity,
}

impl<'a> Categories<'a> {
    pub fn new(record: &'a Identity) -> Self {
        Self { record }
    }

    /// Merge entries; existing keys are overwritten.
    pub fn add<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CategoryValue>,
    {
        let mut incoming = Vec::new();
        for (key, value) in entries {
            let key = key.into();
            validate_key(&key)?;
            incoming.push((key, value.into().into_string()));
        }
        if incoming.is_empty() {
            return Ok(());
        }
        self.record.state().update("categories.add", |doc| {
            doc.categories.extend(incoming);
            Ok(())
        })
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<CategoryValue>) -> Result<()> {
        self.add([(key.into(), value.into())])
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.record.read()?.categories.get(key).cloned())
    }

    /// Remove one key, returning its previous value.
    pub fn delete(&self, key: &str) -> Result<Option<String>> {
        self.record
            .state()
            .update("categories.delete", |doc| Ok(doc.categories.remove(key)))
    }

    /// Remove every listed key; absent keys are ignored.
    pub fn remove<I, S>(&self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        if keys.is_empty() {
            return Ok(());
        }
        self.record.state().update("categories.remove", |doc| {
            for key in &keys {
                doc.categories.remove(key);
            }
            Ok(())
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.record.state().update("categories.clear", |doc| {
            doc.categories.clear();
            Ok(())
        })
    }

    /// Tests key presence, not values.
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.record.read()?.categories.contains_key(key))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.record.read()?.categories.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.record.read()?.categories.into_keys().collect())
    }

    pub fn to_map(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.record.read()?.categories)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(StoreError::ValidationError(
            "category keys cannot be empty".to_string(),
        ));
    }
    Ok(())
}
