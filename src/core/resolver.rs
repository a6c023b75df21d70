// ─── Artifact Resolver ───
// Picks one download URL out of a sealed catalog for the host operating system.

use std::fmt;

use tracing::{debug, info};

use crate::core::catalog::{Catalog, OsVariant, Version};
use crate::core::error::{ProvisionError, ProvisionResult};

/// OS families used as keys in the downloads catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFamily {
    Windows,
    Mac,
    Linux,
}

impl HostFamily {
    /// Classify an OS name as reported by `std::env::consts::OS`.
    pub fn classify(os: &str) -> Option<Self> {
        match os {
            "windows" => Some(Self::Windows),
            "macos" | "ios" => Some(Self::Mac),
            "linux" | "android" | "freebsd" | "netbsd" | "openbsd" | "dragonfly" | "solaris"
            | "illumos" => Some(Self::Linux),
            _ => None,
        }
    }

    /// Family name as written in the catalog.
    pub fn catalog_name(self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::Mac => "Mac",
            Self::Linux => "Linux",
        }
    }

    /// Qualifier applied when the caller does not pick a variant.
    pub fn default_qualifier(self) -> Option<&'static str> {
        match self {
            Self::Linux => Some("Ubuntu"),
            Self::Windows | Self::Mac => None,
        }
    }
}

impl fmt::Display for HostFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.catalog_name())
    }
}

/// Which catalog version to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector<'a> {
    /// First entry in catalog order, skipping prereleases unless allowed.
    Latest { include_prereleases: bool },
    /// Exact version name.
    Pinned(&'a str),
}

/// A resolved download together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub version: String,
    pub family: HostFamily,
    pub variant: String,
    pub url: String,
}

/// Resolve the download URL of the latest matching artifact.
pub fn resolve(
    catalog: &Catalog,
    host_os: &str,
    qualifier: Option<&str>,
    include_prereleases: bool,
) -> ProvisionResult<String> {
    resolve_artifact(
        catalog,
        host_os,
        qualifier,
        VersionSelector::Latest {
            include_prereleases,
        },
    )
    .map(|artifact| artifact.url)
}

/// Resolve a download, returning the version/family/variant it was taken from.
pub fn resolve_artifact(
    catalog: &Catalog,
    host_os: &str,
    qualifier: Option<&str>,
    selector: VersionSelector<'_>,
) -> ProvisionResult<ResolvedArtifact> {
    let version = select_version(catalog, selector)?;
    debug!("Selected catalog version {}", version.name());

    let family = HostFamily::classify(host_os)
        .ok_or_else(|| ProvisionError::UnsupportedOs(host_os.to_string()))?;

    let os_family =
        version
            .find_family(family.catalog_name())
            .ok_or_else(|| ProvisionError::FamilyNotFound {
                version: version.name().to_string(),
                family: family.catalog_name().to_string(),
            })?;

    let qualifier = qualifier.or(family.default_qualifier());
    let variant: &OsVariant = os_family.find_latest_variant(qualifier).map_err(|_| {
        ProvisionError::VariantNotFound {
            version: version.name().to_string(),
            family: family.catalog_name().to_string(),
            qualifier: qualifier.map(str::to_string),
        }
    })?;

    info!(
        "Resolved {} / {} / {} -> {}",
        version.name(),
        family,
        variant.name(),
        variant.url()
    );

    Ok(ResolvedArtifact {
        version: version.name().to_string(),
        family,
        variant: variant.name().to_string(),
        url: variant.url().to_string(),
    })
}

fn select_version<'c>(
    catalog: &'c Catalog,
    selector: VersionSelector<'_>,
) -> ProvisionResult<&'c Version> {
    match selector {
        VersionSelector::Latest {
            include_prereleases,
        } => catalog
            .find_latest(include_prereleases)
            .ok_or(ProvisionError::NoVersionFound {
                include_prereleases,
            }),
        VersionSelector::Pinned(name) => catalog
            .find_version(name)
            .ok_or_else(|| ProvisionError::VersionNotFound(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOWNLOADS: &str = r#"{
        "5.0.0-rc1": {
            "Linux": [
                { "name": "Ubuntu 18.04 64-bit", "url": "https://x/EventStore-OSS-Ubuntu-18.04-v5.0.0-rc1.tar.gz" }
            ],
            "Windows": [
                { "name": "Windows", "url": "https://x/EventStore-OSS-Win-v5.0.0-rc1.zip" }
            ]
        },
        "4.1.1-hotfix1": {
            "Linux": [
                { "name": "Ubuntu 14.04", "url": "https://x/EventStore-OSS-Ubuntu-14.04-v4.1.1-hotfix1.tar.gz" },
                { "name": "Ubuntu 16.04", "url": "https://x/EventStore-OSS-Ubuntu-16.04-v4.1.1-hotfix1.tar.gz" },
                { "name": "CentOS 7", "url": "https://x/EventStore-OSS-CentOS-7-v4.1.1-hotfix1.tar.gz" }
            ],
            "Windows": [
                { "name": "Windows", "url": "https://x/EventStore-OSS-Win-v4.1.1-hotfix1.zip" }
            ]
        }
    }"#;

    fn catalog() -> Catalog {
        Catalog::parse(DOWNLOADS).unwrap()
    }

    #[test]
    fn classify_host_os() {
        assert_eq!(HostFamily::classify("windows"), Some(HostFamily::Windows));
        assert_eq!(HostFamily::classify("macos"), Some(HostFamily::Mac));
        assert_eq!(HostFamily::classify("linux"), Some(HostFamily::Linux));
        assert_eq!(HostFamily::classify("freebsd"), Some(HostFamily::Linux));
        assert_eq!(HostFamily::classify("haiku"), None);
    }

    #[test]
    fn releases_only_skips_release_candidates() {
        let url = resolve(&catalog(), "windows", None, false).unwrap();
        assert_eq!(url, "https://x/EventStore-OSS-Win-v4.1.1-hotfix1.zip");
    }

    #[test]
    fn prereleases_take_first_version() {
        let url = resolve(&catalog(), "windows", None, true).unwrap();
        assert_eq!(url, "https://x/EventStore-OSS-Win-v5.0.0-rc1.zip");
    }

    #[test]
    fn linux_defaults_to_latest_ubuntu() {
        let artifact = resolve_artifact(
            &catalog(),
            "linux",
            None,
            VersionSelector::Latest {
                include_prereleases: false,
            },
        )
        .unwrap();
        assert_eq!(artifact.version, "4.1.1-hotfix1");
        assert_eq!(artifact.family, HostFamily::Linux);
        assert_eq!(artifact.variant, "Ubuntu 16.04");
    }

    #[test]
    fn explicit_qualifier_overrides_default() {
        let url = resolve(&catalog(), "linux", Some("CentOS"), false).unwrap();
        assert_eq!(url, "https://x/EventStore-OSS-CentOS-7-v4.1.1-hotfix1.tar.gz");
    }

    #[test]
    fn pinned_version() {
        let artifact = resolve_artifact(
            &catalog(),
            "linux",
            Some("Ubuntu 18"),
            VersionSelector::Pinned("5.0.0-rc1"),
        )
        .unwrap();
        assert_eq!(artifact.url, "https://x/EventStore-OSS-Ubuntu-18.04-v5.0.0-rc1.tar.gz");

        let err = resolve_artifact(&catalog(), "linux", None, VersionSelector::Pinned("3.9.4"))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::VersionNotFound(ref v) if v == "3.9.4"));
    }

    #[test]
    fn empty_catalog_has_no_version() {
        let err = resolve(&Catalog::default(), "linux", None, true).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::NoVersionFound {
                include_prereleases: true
            }
        ));
    }

    #[test]
    fn only_prereleases_without_flag_has_no_version() {
        let catalog = Catalog::parse(
            r#"{ "5.0.0-rc1": { "Linux": [ { "name": "Ubuntu", "url": "https://x/a.tar.gz" } ] } }"#,
        )
        .unwrap();
        assert!(matches!(
            resolve(&catalog, "linux", None, false),
            Err(ProvisionError::NoVersionFound {
                include_prereleases: false
            })
        ));
    }

    #[test]
    fn unknown_host_os_is_unsupported() {
        let err = resolve(&catalog(), "haiku", None, false).unwrap_err();
        assert!(matches!(err, ProvisionError::UnsupportedOs(ref os) if os == "haiku"));
    }

    #[test]
    fn missing_family() {
        let err = resolve(&catalog(), "macos", None, false).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::FamilyNotFound { ref version, ref family }
                if version == "4.1.1-hotfix1" && family == "Mac"
        ));
    }

    #[test]
    fn unmatched_qualifier_is_variant_not_found() {
        let err = resolve(&catalog(), "linux", Some("Debian"), false).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::VariantNotFound { qualifier: Some(ref q), .. } if q == "Debian"
        ));
    }
}
