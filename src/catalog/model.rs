use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Release -> kernel versions, in the order the source lists them.
///
/// Both the release order and the version order inside a release are kept:
/// the first version of a release is its pool kernel, and lookups return the
/// first release that contains a version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseCatalog {
    releases: Vec<(String, Vec<String>)>,
}

impl ReleaseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh, empty bucket for `release`. A repeated release keeps
    /// its original position but loses the versions collected so far.
    pub fn open_release(&mut self, release: &str) {
        match self.releases.iter_mut().find(|(name, _)| name == release) {
            Some((_, versions)) => versions.clear(),
            None => self.releases.push((release.to_string(), Vec::new())),
        }
    }

    /// Append `version` to an already opened release. Returns `false` when the
    /// release has not been opened.
    pub fn push_version(&mut self, release: &str, version: &str) -> bool {
        match self.releases.iter_mut().find(|(name, _)| name == release) {
            Some((_, versions)) => {
                versions.push(version.to_string());
                true
            }
            None => false,
        }
    }

    /// Borrowing iterator over `(release, versions)` pairs.
    pub fn releases(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.releases
            .iter()
            .map(|(name, versions)| (name.as_str(), versions.as_slice()))
    }

    #[allow(unused)]
    pub fn versions(&self, release: &str) -> Option<&[String]> {
        self.releases()
            .find(|(name, _)| *name == release)
            .map(|(_, versions)| versions)
    }

    /// First release whose list contains `kernel` (exact match).
    pub fn find_release(&self, kernel: &str) -> Option<(&str, &[String])> {
        self.releases()
            .find(|(_, versions)| versions.iter().any(|v| v == kernel))
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    #[allow(unused)]
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }
}

impl Serialize for ReleaseCatalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.releases.iter().map(|(name, versions)| (name, versions)))
    }
}

struct CatalogVisitor;

impl<'de> Visitor<'de> for CatalogVisitor {
    type Value = ReleaseCatalog;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of release names to lists of kernel versions")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut catalog = ReleaseCatalog::new();
        while let Some((release, versions)) = map.next_entry::<String, Vec<String>>()? {
            catalog.open_release(&release);
            for version in &versions {
                catalog.push_version(&release, version);
            }
        }
        Ok(catalog)
    }
}

impl<'de> Deserialize<'de> for ReleaseCatalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(CatalogVisitor)
    }
}
