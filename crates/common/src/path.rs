//! Absolute, normalized paths into a hierarchical store
//!
//! Every object in the store is addressed by a slash separated path from the
//! root group, e.g. `/measurements/run1/table`. The root is `/`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Separator between path components
pub const SEPARATOR: char = '/';

/// A normalized store path: leading slash, no trailing slash, no empty
/// components. The root path is `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StorePath(String);

impl<'de> Deserialize<'de> for StorePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}

impl StorePath {
    /// The root path `/`
    pub fn root() -> Self {
        Self(SEPARATOR.to_string())
    }

    /// Parse and normalize a path
    ///
    /// Relative paths are treated as relative to the root, duplicate and
    /// trailing separators are dropped.
    pub fn new(path: &str) -> Self {
        let mut normalized = String::with_capacity(path.len() + 1);
        for component in path.trim().split(SEPARATOR).filter(|c| !c.is_empty()) {
            normalized.push(SEPARATOR);
            normalized.push_str(component);
        }
        if normalized.is_empty() {
            return Self::root();
        }
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Append a single component
    pub fn join(&self, name: &str) -> Self {
        if self.is_root() {
            Self(format!("{}{}", SEPARATOR, name))
        } else {
            Self(format!("{}{}{}", self.0, SEPARATOR, name))
        }
    }

    /// The parent path, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(SEPARATOR) {
            Some(0) => Some(Self::root()),
            Some(pos) => Some(Self(self.0[..pos].to_string())),
            None => Some(Self::root()),
        }
    }

    /// The last component, empty for the root
    pub fn name(&self) -> &str {
        match self.0.rfind(SEPARATOR) {
            Some(pos) => &self.0[pos + 1..],
            None => &self.0,
        }
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|c| !c.is_empty())
    }

    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// True if `self` is `other` or one of its ancestors
    pub fn contains(&self, other: &StorePath) -> bool {
        if self.is_root() {
            return true;
        }
        other.0 == self.0
            || (other.0.starts_with(&self.0)
                && other.0.as_bytes().get(self.0.len()) == Some(&(SEPARATOR as u8)))
    }

    /// Rewrite the `from` prefix of this path to `to`
    pub fn rebase(&self, from: &StorePath, to: &StorePath) -> Option<StorePath> {
        if !from.contains(self) {
            return None;
        }
        let rest = if from.is_root() {
            &self.0[..]
        } else {
            &self.0[from.0.len()..]
        };
        Some(StorePath::new(&format!("{}{}", to.0, rest)))
    }
}

impl Default for StorePath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StorePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Check a single object name for use as a path component
///
/// Returns a short reason when the name is not usable.
pub fn check_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    if name.contains(SEPARATOR) {
        return Err("name contains the path separator");
    }
    if name == "." || name == ".." {
        return Err("name is a relative path marker");
    }
    if name.trim() != name {
        return Err("name has leading or trailing whitespace");
    }
    Ok(())
}
