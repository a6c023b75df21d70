// ─── Catalog Model ───
// Version → OS family → OS variant hierarchy. Builders collect children while
// parsing; `seal()` turns them into immutable, query-only values.

use crate::core::error::{ProvisionError, ProvisionResult};

/// Substring that marks a release candidate in a version name.
const RELEASE_CANDIDATE_MARKER: &str = "-rc";

/// A single downloadable artifact for one OS family.
///
/// Equality is keyed on the display name only.
#[derive(Debug, Clone, Eq)]
pub struct OsVariant {
    name: String,
    url: String,
}

impl OsVariant {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Display name, e.g. `Ubuntu 18.04 64-bit (.deb)`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PartialEq for OsVariant {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Mutable collector for the variants of one OS family.
#[derive(Debug, Clone)]
pub struct OsFamilyBuilder {
    name: String,
    variants: Vec<OsVariant>,
}

impl OsFamilyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    /// Append a variant. A variant whose display name is already present is ignored.
    pub fn add_variant(&mut self, variant: OsVariant) -> &mut Self {
        if !self.variants.contains(&variant) {
            self.variants.push(variant);
        }
        self
    }

    /// Freeze the family. Variants end up sorted descending by display name.
    pub fn seal(mut self) -> OsFamily {
        self.variants.sort_by(|a, b| b.name.cmp(&a.name));
        OsFamily {
            name: self.name,
            variants: self.variants,
        }
    }
}

/// Sealed OS family (e.g. "Linux") with its variants in descending name order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsFamily {
    name: String,
    variants: Vec<OsVariant>,
}

impl OsFamily {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[OsVariant] {
        &self.variants
    }

    /// Exact match on the variant display name.
    pub fn find_variant(&self, name: &str) -> Option<&OsVariant> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Pick the "latest" variant by textual seal order, not by semantic version.
    ///
    /// With a qualifier, the first variant in seal order whose display name
    /// contains it wins ("Ubuntu" → "Ubuntu 18.04 …"). Without one, the last
    /// variant in seal order wins, i.e. the lexically smallest display name
    /// ("Linux 64-bit …" sorts after every "Ubuntu …" entry).
    pub fn find_latest_variant(&self, qualifier: Option<&str>) -> ProvisionResult<&OsVariant> {
        let found = match qualifier {
            Some(q) => self.variants.iter().find(|v| v.name.contains(q)),
            None => self.variants.last(),
        };
        found.ok_or_else(|| ProvisionError::NoMatch {
            family: self.name.clone(),
            qualifier: qualifier.map(str::to_string),
        })
    }
}

/// Mutable collector for one catalog version.
#[derive(Debug, Clone)]
pub struct VersionBuilder {
    name: String,
    families: Vec<OsFamilyBuilder>,
}

impl VersionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            families: Vec::new(),
        }
    }

    /// Append a family. A family whose name is already present is ignored.
    pub fn add_family(&mut self, family: OsFamilyBuilder) -> &mut Self {
        if !self.families.iter().any(|f| f.name == family.name) {
            self.families.push(family);
        }
        self
    }

    /// Freeze the version, sealing every family it owns.
    pub fn seal(self) -> Version {
        Version {
            name: self.name,
            families: self.families.into_iter().map(OsFamilyBuilder::seal).collect(),
        }
    }
}

/// Sealed release version (e.g. "4.1.1-hotfix1").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    name: String,
    families: Vec<OsFamily>,
}

impl Version {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn families(&self) -> &[OsFamily] {
        &self.families
    }

    /// `false` for release candidates such as `5.0.0-rc1`.
    pub fn is_release(&self) -> bool {
        !self
            .name
            .to_ascii_lowercase()
            .contains(RELEASE_CANDIDATE_MARKER)
    }

    pub fn find_family(&self, name: &str) -> Option<&OsFamily> {
        self.families.iter().find(|f| f.name == name)
    }
}

/// All versions of a catalog in source order. No sorting is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    versions: Vec<Version>,
}

impl Catalog {
    pub fn new(versions: Vec<Version>) -> Self {
        Self { versions }
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Find a specific version by exact name (e.g. "4.1.1").
    pub fn find_version(&self, name: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.name == name)
    }

    /// First version in source order that is a release, or any version when
    /// prereleases are allowed.
    pub fn find_latest(&self, include_prereleases: bool) -> Option<&Version> {
        self.versions
            .iter()
            .find(|v| include_prereleases || v.is_release())
    }
}
