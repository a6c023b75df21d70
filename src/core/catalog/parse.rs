// ─── Catalog Parsing ───
// Turns the downloads JSON (version → family → [{name, url}]) into a sealed
// `Catalog`, keeping only archive downloads.

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::core::archive::{archive_file_name, ArchiveKind};
use crate::core::error::{ProvisionError, ProvisionResult};

use super::model::{Catalog, OsFamilyBuilder, OsVariant, VersionBuilder};

/// Raw document shape. `IndexMap` keeps the source order of both levels.
type RawCatalog = IndexMap<String, IndexMap<String, Vec<RawVariant>>>;

#[derive(Debug, Deserialize)]
struct RawVariant {
    name: String,
    url: String,
}

impl Catalog {
    /// Parse a catalog document.
    ///
    /// Entries whose URL is not a `.zip` or `.tar.gz` archive (installers,
    /// `.deb` packages, …) are skipped silently.
    pub fn parse(raw_json: &str) -> ProvisionResult<Self> {
        let raw: RawCatalog =
            serde_json::from_str(raw_json).map_err(|e| ProvisionError::MalformedCatalog {
                reason: e.to_string(),
            })?;

        let mut versions = Vec::with_capacity(raw.len());
        for (version_name, families) in raw {
            let mut version = VersionBuilder::new(version_name.as_str());
            for (family_name, variants) in families {
                let mut family = OsFamilyBuilder::new(family_name);
                for variant in variants {
                    if is_archive_url(&variant.url) {
                        family.add_variant(OsVariant::new(variant.name, variant.url));
                    } else {
                        debug!("Skipping non-archive download {} ({})", variant.name, variant.url);
                    }
                }
                version.add_family(family);
            }
            versions.push(version.seal());
        }

        debug!("Parsed {} catalog versions", versions.len());
        Ok(Catalog::new(versions))
    }
}

/// `true` for URLs the archive installer can unpack.
pub fn is_archive_url(url: &str) -> bool {
    archive_file_name(url)
        .and_then(|name| ArchiveKind::from_name(&name))
        .is_some()
}
