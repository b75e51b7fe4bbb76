//! Version catalog and version resolution
//!
//! The catalog is fetched fresh for every resolution and then queried as a
//! plain value, so there is no process-wide cache to go stale.

use crate::error::{Error, Operation, Result};
use crate::spec::DEFAULT_CHANNEL_GROUP;
use crate::store::VersionSource;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

/// Page size used when listing versions.
pub const PAGE_SIZE: u32 = 100;

/// An installable release version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Listed id, e.g. `openshift-v4.12.3` or `openshift-v4.13.0-fast`
    pub id: String,
    /// Raw semantic version, e.g. `4.12.3`
    pub raw_id: String,
    /// Channel group; absent means the default group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_group: Option<String>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Whether the control plane picks this version when none is requested
    #[serde(default)]
    pub default: bool,
}

fn enabled_default() -> bool {
    true
}

impl VersionEntry {
    pub fn new(id: impl Into<String>, raw_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw_id: raw_id.into(),
            channel_group: None,
            enabled: true,
            default: false,
        }
    }

    pub fn with_channel_group(mut self, group: impl Into<String>) -> Self {
        self.channel_group = Some(group.into());
        self
    }

    pub fn with_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// Channel group, with absence mapped to the default group.
    pub fn effective_channel_group(&self) -> &str {
        match self.channel_group.as_deref() {
            Some(group) if !group.is_empty() => group,
            _ => DEFAULT_CHANNEL_GROUP,
        }
    }

    /// Id built from the raw version and channel group.
    ///
    /// `openshift-v<raw_id>` in the default group, `openshift-v<raw_id>-<group>`
    /// elsewhere. Resolution and create payloads use this rather than `id`,
    /// which the listing does not guarantee to be consistent with `raw_id`.
    pub fn canonical_id(&self) -> String {
        let group = self.effective_channel_group();
        if group == DEFAULT_CHANNEL_GROUP {
            format!("openshift-v{}", self.raw_id)
        } else {
            format!("openshift-v{}-{group}", self.raw_id)
        }
    }

    /// Parsed semantic version, if the raw id is well formed.
    pub fn semver(&self) -> Option<OpenShiftVersion> {
        OpenShiftVersion::parse(&self.raw_id)
    }
}

/// One page of a version listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPage {
    pub page: u32,
    pub size: u32,
    pub total: u32,
    #[serde(default)]
    pub items: Vec<VersionEntry>,
}

/// The full listing of installable versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionCatalog {
    entries: Vec<VersionEntry>,
}

impl VersionCatalog {
    /// Build a catalog from an already-fetched listing.
    pub fn new(entries: Vec<VersionEntry>) -> Self {
        Self { entries }
    }

    /// Fetch every page from `source`.
    ///
    /// Pages are requested in order until the reported total is reached or
    /// the source returns an empty page.
    pub fn fetch<V: VersionSource + ?Sized>(source: &V) -> Result<Self> {
        let mut entries: Vec<VersionEntry> = Vec::new();
        let mut page = 1;

        loop {
            let listing = source
                .list_versions(page, PAGE_SIZE)
                .map_err(|e| Error::from_store(Operation::ListVersions, e))?;
            debug!(
                "version page {} returned {} items (total {})",
                listing.page,
                listing.items.len(),
                listing.total
            );

            let received = listing.items.len();
            entries.extend(listing.items);

            if received == 0 || entries.len() >= listing.total as usize {
                break;
            }
            page += 1;
        }

        Ok(Self { entries })
    }

    /// All entries in listing order.
    pub fn entries(&self) -> &[VersionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a requested version within a channel group.
    ///
    /// Entries are keyed by [`VersionEntry::canonical_id`]. For the default
    /// group that key must equal the requested version and the entry must
    /// carry no other group. For any other group the requested version gets a
    /// `-<group>` suffix and the entry group must match.
    pub fn resolve(&self, requested_version: &str, requested_channel_group: &str) -> Result<&VersionEntry> {
        let group = if requested_channel_group.is_empty() {
            DEFAULT_CHANNEL_GROUP
        } else {
            requested_channel_group
        };

        let key = if group == DEFAULT_CHANNEL_GROUP {
            requested_version.to_string()
        } else {
            format!("{requested_version}-{group}")
        };

        self.entries
            .iter()
            .find(|entry| entry.effective_channel_group() == group && entry.canonical_id() == key)
            .ok_or_else(|| Error::VersionNotFound {
                version: requested_version.to_string(),
                channel_group: group.to_string(),
            })
    }

    /// Entry flagged as default within a channel group.
    pub fn default_entry(&self, channel_group: &str) -> Option<&VersionEntry> {
        self.entries
            .iter()
            .find(|e| e.default && e.enabled && e.effective_channel_group() == channel_group)
    }

    /// Enabled entries in a channel group, newest first.
    pub fn available(&self, channel_group: &str) -> Vec<&VersionEntry> {
        let mut found: Vec<&VersionEntry> = self
            .entries
            .iter()
            .filter(|e| e.enabled && e.effective_channel_group() == channel_group)
            .collect();
        found.sort_by(|a, b| match (a.semver(), b.semver()) {
            (Some(va), Some(vb)) => vb.cmp(&va),
            _ => b.raw_id.cmp(&a.raw_id),
        });
        found
    }
}

// ============================================================================
// Version parsing
// ============================================================================

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:openshift-)?v?(\d+)\.(\d+)(?:\.(\d+))?").expect("valid version regex")
});

/// Major/minor/patch triple of an OpenShift release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpenShiftVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl OpenShiftVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `4.12`, `4.12.3`, `openshift-v4.12.3` or `openshift-v4.12.3-fast`.
    ///
    /// A missing patch component is treated as zero.
    pub fn parse(input: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(input.trim())?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        let patch = match caps.get(3) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        Some(Self::new(major, minor, patch))
    }

    /// Check if this version is at least `other`.
    pub fn at_least(&self, other: &Self) -> bool {
        self.cmp(other) != Ordering::Less
    }
}

impl fmt::Display for OpenShiftVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn page1() -> Vec<VersionEntry> {
        vec![
            VersionEntry::new("openshift-v4.10.1", "4.10.1"),
            VersionEntry::new("openshift-v4.11.1", "4.11.1").with_default(),
        ]
    }

    fn with_fast() -> VersionCatalog {
        let mut entries = page1();
        entries.push(VersionEntry::new("openshift-v4.50.0-fast", "4.50.0").with_channel_group("fast"));
        VersionCatalog::new(entries)
    }

    #[test]
    fn test_resolve_default_group_not_rewritten() {
        let catalog = with_fast();
        let entry = catalog.resolve("openshift-v4.11.1", "").unwrap();
        assert_eq!(entry.id, "openshift-v4.11.1");

        let entry = catalog.resolve("openshift-v4.11.1", "stable").unwrap();
        assert_eq!(entry.id, "openshift-v4.11.1");
    }

    #[test]
    fn test_resolve_non_default_group_appends_suffix() {
        let catalog = with_fast();
        let entry = catalog.resolve("openshift-v4.50.0", "fast").unwrap();
        assert_eq!(entry.id, "openshift-v4.50.0-fast");
        assert_eq!(entry.channel_group.as_deref(), Some("fast"));
    }

    #[test]
    fn test_resolve_missing_version_in_group() {
        let catalog = with_fast();
        let err = catalog.resolve("openshift-v4.99.99", "fast").unwrap_err();
        match err {
            Error::VersionNotFound {
                version,
                channel_group,
            } => {
                assert_eq!(version, "openshift-v4.99.99");
                assert_eq!(channel_group, "fast");
            }
            other => panic!("Expected VersionNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_missing_group() {
        let catalog = with_fast();
        assert!(catalog.resolve("openshift-v4.50.0", "candidate").is_err());
    }

    #[test]
    fn test_default_group_never_matches_other_groups() {
        // Same raw version in two groups, and an id that collides without suffix.
        let catalog = VersionCatalog::new(vec![
            VersionEntry::new("openshift-v4.50.0", "4.50.0").with_channel_group("fast"),
            VersionEntry::new("openshift-v4.50.0-fast", "4.50.0").with_channel_group("fast"),
        ]);
        assert!(catalog.resolve("openshift-v4.50.0", "").is_err());
        assert!(catalog.resolve("openshift-v4.50.0-fast", "stable").is_err());
    }

    #[test]
    fn test_explicit_stable_entry_matches_default_group() {
        let catalog = VersionCatalog::new(vec![
            VersionEntry::new("openshift-v4.12.0", "4.12.0").with_channel_group("stable"),
        ]);
        assert!(catalog.resolve("openshift-v4.12.0", "").is_ok());
    }

    #[test]
    fn test_resolve_keys_on_raw_id() {
        // Both entries list the same id; only the raw version tells them apart.
        let catalog = VersionCatalog::new(vec![
            VersionEntry::new("openshift-v4.10.1", "4.10.1"),
            VersionEntry::new("openshift-v4.10.1", "4.11.1"),
        ]);
        let entry = catalog.resolve("openshift-v4.11.1", "").unwrap();
        assert_eq!(entry.raw_id, "4.11.1");
        assert_eq!(entry.canonical_id(), "openshift-v4.11.1");

        let entry = catalog.resolve("openshift-v4.10.1", "").unwrap();
        assert_eq!(entry.raw_id, "4.10.1");
    }

    #[test]
    fn test_canonical_id() {
        assert_eq!(VersionEntry::new("x", "4.12.3").canonical_id(), "openshift-v4.12.3");
        assert_eq!(
            VersionEntry::new("x", "4.12.3").with_channel_group("stable").canonical_id(),
            "openshift-v4.12.3"
        );
        assert_eq!(
            VersionEntry::new("x", "4.50.0").with_channel_group("fast").canonical_id(),
            "openshift-v4.50.0-fast"
        );
    }

    #[test]
    fn test_fetch_accumulates_pages() {
        let store = MemoryStore::new();
        for minor in 0..250 {
            store.add_version(VersionEntry::new(
                format!("openshift-v4.{minor}.0"),
                format!("4.{minor}.0"),
            ));
        }

        let catalog = VersionCatalog::fetch(&store).unwrap();
        assert_eq!(catalog.len(), 250);
        assert_eq!(store.version_pages_served(), 3);
        assert!(catalog.resolve("openshift-v4.249.0", "").is_ok());
    }

    #[test]
    fn test_fetch_empty_listing() {
        let store = MemoryStore::new();
        let catalog = VersionCatalog::fetch(&store).unwrap();
        assert!(catalog.is_empty());
        assert_eq!(store.version_pages_served(), 1);
    }

    #[test]
    fn test_default_entry_and_available() {
        let catalog = with_fast();
        assert_eq!(catalog.default_entry("stable").unwrap().id, "openshift-v4.11.1");
        assert!(catalog.default_entry("fast").is_none());

        let stable = catalog.available("stable");
        assert_eq!(stable.len(), 2);
        assert_eq!(stable[0].raw_id, "4.11.1");
        assert_eq!(catalog.available("fast").len(), 1);
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(OpenShiftVersion::parse("4.12"), Some(OpenShiftVersion::new(4, 12, 0)));
        assert_eq!(
            OpenShiftVersion::parse("openshift-v4.10.1"),
            Some(OpenShiftVersion::new(4, 10, 1))
        );
        assert_eq!(
            OpenShiftVersion::parse("openshift-v4.50.0-fast"),
            Some(OpenShiftVersion::new(4, 50, 0))
        );
        assert_eq!(OpenShiftVersion::parse("latest"), None);
    }

    #[test]
    fn test_version_ordering() {
        let min = OpenShiftVersion::new(4, 11, 0);
        assert!(OpenShiftVersion::new(4, 12, 0).at_least(&min));
        assert!(OpenShiftVersion::new(4, 11, 0).at_least(&min));
        assert!(!OpenShiftVersion::new(4, 10, 9).at_least(&min));
    }
}
