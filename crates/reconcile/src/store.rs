//! Store traits for the remote control plane
//!
//! The core never talks HTTP itself. It drives a [`ClusterStore`] and reads
//! versions from a [`VersionSource`]; `ocmkit` provides the HTTP
//! implementation and [`MemoryStore`] an in-process one.
//!
//! # Testing
//!
//! ```
//! use reconcile::store::{ClusterStore, MemoryStore};
//! use reconcile::ClusterDocument;
//!
//! let store = MemoryStore::new();
//! let created = store
//!     .create(&ClusterDocument {
//!         name: Some("my-cluster".into()),
//!         ..Default::default()
//!     })
//!     .unwrap();
//! let id = created.id.clone().unwrap();
//! assert!(store.fetch(&id).unwrap().is_some());
//! ```

use crate::changeset::{merge_patch, ChangeSet};
use crate::document::{ClusterDocument, ClusterState};
use crate::error::{Operation, StoreError};
use crate::version::{VersionEntry, VersionPage};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Create, fetch, patch and delete operations on cluster documents.
///
/// Implementations only guarantee meaningful results for a single writer
/// per cluster id.
pub trait ClusterStore: Send + Sync {
    /// Create a cluster and return the document as stored.
    fn create(&self, document: &ClusterDocument) -> Result<ClusterDocument, StoreError>;

    /// Fetch a cluster by id.
    ///
    /// Returns `Ok(None)` when the control plane reports the cluster as not found.
    fn fetch(&self, id: &str) -> Result<Option<ClusterDocument>, StoreError>;

    /// Apply a change set and return the updated document.
    ///
    /// The patch is atomic from the caller's point of view.
    fn patch(&self, id: &str, changes: &ChangeSet) -> Result<ClusterDocument, StoreError>;

    /// Request deletion. Removal completes asynchronously.
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Paginated listing of installable versions.
pub trait VersionSource: Send + Sync {
    /// Fetch one page (1-based) of at most `size` entries.
    fn list_versions(&self, page: u32, size: u32) -> Result<VersionPage, StoreError>;
}

/// A call recorded by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListVersions { page: u32 },
    Create { name: Option<String> },
    Fetch { id: String },
    Patch { id: String, edits: usize },
    Delete { id: String },
}

/// In-memory store for tests and dry runs.
///
/// Deleted clusters linger for a configurable number of fetches in the
/// `uninstalling` state before disappearing, mimicking asynchronous removal.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    clusters: BTreeMap<String, Value>,
    versions: Vec<VersionEntry>,
    next_id: u64,
    calls: Vec<Call>,
    pending_removal: HashMap<String, u32>,
    deletion_fetches: u32,
    rejections: HashMap<&'static str, StoreError>,
    version_pages_served: u32,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-call; keep going.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Add an installable version.
    pub fn add_version(&self, entry: VersionEntry) {
        self.lock().versions.push(entry);
    }

    /// Insert a document as-is; it must carry an id.
    pub fn insert(&self, document: &ClusterDocument) -> Result<(), StoreError> {
        let id = document
            .id
            .clone()
            .ok_or_else(|| StoreError::InvalidResponse("document has no id".into()))?;
        let value = serde_json::to_value(document).map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        self.lock().clusters.insert(id, value);
        Ok(())
    }

    /// Number of fetches a deleted cluster stays visible for.
    ///
    /// `0` means it is gone on the first fetch after delete; `u32::MAX`
    /// keeps it around forever.
    pub fn set_deletion_fetches(&self, fetches: u32) {
        self.lock().deletion_fetches = fetches;
    }

    /// Make the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, error: StoreError) {
        self.lock().rejections.insert(operation_key(operation), error);
    }

    /// Recorded calls, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of recorded calls matching a predicate.
    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Number of version pages served so far.
    pub fn version_pages_served(&self) -> u32 {
        self.lock().version_pages_served
    }

    /// Raw stored JSON for a cluster.
    pub fn raw(&self, id: &str) -> Option<Value> {
        self.lock().clusters.get(id).cloned()
    }
}

fn operation_key(operation: Operation) -> &'static str {
    match operation {
        Operation::ListVersions => "list_versions",
        Operation::Create => "create",
        Operation::Fetch => "fetch",
        Operation::Patch => "patch",
        Operation::Delete => "delete",
    }
}

fn decode(value: &Value) -> Result<ClusterDocument, StoreError> {
    serde_json::from_value(value.clone()).map_err(|e| StoreError::InvalidResponse(e.to_string()))
}

impl Inner {
    fn take_rejection(&mut self, operation: Operation) -> Result<(), StoreError> {
        match self.rejections.remove(operation_key(operation)) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn not_found(id: &str) -> StoreError {
        StoreError::rejected(format!("Cluster '{id}' not found"), Some(404))
    }
}

impl ClusterStore for MemoryStore {
    fn create(&self, document: &ClusterDocument) -> Result<ClusterDocument, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Create {
            name: document.name.clone(),
        });
        inner.take_rejection(Operation::Create)?;

        if let Some(name) = &document.name {
            let duplicate = inner
                .clusters
                .values()
                .any(|c| c.get("name").and_then(Value::as_str) == Some(name.as_str()));
            if duplicate {
                return Err(StoreError::rejected(
                    format!("Cluster name '{name}' already exists"),
                    Some(400),
                ));
            }
        }

        inner.next_id += 1;
        let id = format!("{:032x}", inner.next_id);

        let mut stored = document.clone();
        stored.id = Some(id.clone());
        stored.href = Some(format!("/api/clusters_mgmt/v1/clusters/{id}"));
        stored.state = Some(ClusterState::Installing);

        let value = serde_json::to_value(&stored).map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        inner.clusters.insert(id, value);
        Ok(stored)
    }

    fn fetch(&self, id: &str) -> Result<Option<ClusterDocument>, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Fetch { id: id.to_string() });
        inner.take_rejection(Operation::Fetch)?;

        let gone = match inner.pending_removal.get_mut(id) {
            Some(0) => true,
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        };
        if gone {
            inner.pending_removal.remove(id);
            inner.clusters.remove(id);
            return Ok(None);
        }

        inner.clusters.get(id).map(decode).transpose()
    }

    fn patch(&self, id: &str, changes: &ChangeSet) -> Result<ClusterDocument, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Patch {
            id: id.to_string(),
            edits: changes.len(),
        });
        inner.take_rejection(Operation::Patch)?;

        let current = inner.clusters.get(id).ok_or_else(|| Inner::not_found(id))?;

        // Check the edits on a copy, then store what the merge-patch body yields.
        changes
            .apply_to(&mut current.clone())
            .map_err(|e| StoreError::rejected(e.to_string(), Some(400)))?;
        let mut updated = current.clone();
        merge_patch(&mut updated, &changes.to_merge_patch());
        let document = decode(&updated)?;
        inner.clusters.insert(id.to_string(), updated);
        Ok(document)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Delete { id: id.to_string() });
        inner.take_rejection(Operation::Delete)?;

        let deletion_fetches = inner.deletion_fetches;
        let cluster = inner.clusters.get_mut(id).ok_or_else(|| Inner::not_found(id))?;
        if let Some(obj) = cluster.as_object_mut() {
            obj.insert("state".into(), Value::String(ClusterState::Uninstalling.to_string()));
        }
        inner.pending_removal.insert(id.to_string(), deletion_fetches);
        Ok(())
    }
}

impl VersionSource for MemoryStore {
    fn list_versions(&self, page: u32, size: u32) -> Result<VersionPage, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(Call::ListVersions { page });
        inner.take_rejection(Operation::ListVersions)?;
        inner.version_pages_served += 1;

        let start = (page.saturating_sub(1) as usize).saturating_mul(size as usize);
        let items: Vec<VersionEntry> = inner
            .versions
            .iter()
            .skip(start)
            .take(size as usize)
            .cloned()
            .collect();

        Ok(VersionPage {
            page,
            size: items.len() as u32,
            total: inner.versions.len() as u32,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::Edit;
    use serde_json::json;

    fn named(name: &str) -> ClusterDocument {
        ClusterDocument {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_assigns_identity() {
        let store = MemoryStore::new();
        let doc = store.create(&named("a")).unwrap();
        assert!(doc.id.is_some());
        assert_eq!(doc.state, Some(ClusterState::Installing));
        assert!(doc.href.unwrap().ends_with(doc.id.as_deref().unwrap()));
    }

    #[test]
    fn test_create_rejects_duplicate_name() {
        let store = MemoryStore::new();
        store.create(&named("a")).unwrap();
        let err = store.create(&named("a")).unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: Some(400), .. }));
    }

    #[test]
    fn test_patch_applies_edits() {
        let store = MemoryStore::new();
        let id = store.create(&named("a")).unwrap().id.unwrap();

        let mut changes = ChangeSet::new();
        changes.push(Edit::add("/disable_user_workload_monitoring", json!(true)));
        let doc = store.patch(&id, &changes).unwrap();
        assert_eq!(doc.disable_user_workload_monitoring, Some(true));
        assert_eq!(store.raw(&id).unwrap()["disable_user_workload_monitoring"], json!(true));
    }

    #[test]
    fn test_failed_patch_leaves_document_intact() {
        let store = MemoryStore::new();
        let id = store.create(&named("a")).unwrap().id.unwrap();
        let before = store.raw(&id).unwrap();

        let mut changes = ChangeSet::new();
        changes.push(Edit::add("/additional_trust_bundle", json!("abc")));
        changes.push(Edit::remove("/proxy"));
        assert!(store.patch(&id, &changes).is_err());
        assert_eq!(store.raw(&id).unwrap(), before);
    }

    #[test]
    fn test_delete_lingers_for_configured_fetches() {
        let store = MemoryStore::new();
        store.set_deletion_fetches(2);
        let id = store.create(&named("a")).unwrap().id.unwrap();
        store.delete(&id).unwrap();

        let first = store.fetch(&id).unwrap().unwrap();
        assert_eq!(first.state, Some(ClusterState::Uninstalling));
        assert!(store.fetch(&id).unwrap().is_some());
        assert!(store.fetch(&id).unwrap().is_none());
        assert!(store.fetch(&id).unwrap().is_none());
    }

    #[test]
    fn test_fail_next_is_one_shot() {
        let store = MemoryStore::new();
        store.fail_next(Operation::Create, StoreError::rejected("quota exceeded", Some(403)));
        assert!(store.create(&named("a")).is_err());
        assert!(store.create(&named("a")).is_ok());
    }

    #[test]
    fn test_version_pages() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store.add_version(VersionEntry::new(format!("openshift-v4.{i}.0"), format!("4.{i}.0")));
        }
        let page = store.list_versions(2, 2).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].raw_id, "4.2.0");
    }

    #[test]
    fn test_calls_are_recorded() {
        let store = MemoryStore::new();
        let id = store.create(&named("a")).unwrap().id.unwrap();
        store.fetch(&id).unwrap();
        assert_eq!(
            store.calls(),
            vec![
                Call::Create {
                    name: Some("a".into())
                },
                Call::Fetch { id: id.clone() },
            ]
        );
        assert_eq!(store.count_calls(|c| matches!(c, Call::Fetch { .. })), 1);
    }
}
