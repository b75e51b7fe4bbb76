//! Create, read, update and destroy of a single managed cluster
//!
//! [`LifecycleController`] sequences version resolution, validation, diffing
//! and store calls. Every step gates the next one: nothing is sent to the
//! control plane until the version resolves and the spec validates.
//!
//! ```text
//!   Uncreated ──create──▶ Created ──update──▶ Created
//!                            │
//!                            └──destroy──▶ Deleting ──▶ (gone | unconfirmed)
//! ```

use crate::changeset::{diff, ChangeSet};
use crate::document::ClusterDocument;
use crate::error::{Error, Operation, Result};
use crate::payload::{create_document, BuildStamp};
use crate::spec::{non_empty, ClusterSpec};
use crate::store::{ClusterStore, VersionSource};
use crate::validate::Validator;
use crate::version::{VersionCatalog, VersionEntry};
use crate::wait::{wait_until_gone, CancelToken, Clock, DestroyWaitPolicy, WaitResult, DEFAULT_POLL_INTERVAL};
use log::{debug, info};
use std::time::Duration;

/// Result of [`LifecycleController::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Nothing differed; no write was issued.
    Unchanged(ClusterDocument),
    /// The change set was applied.
    Patched {
        document: ClusterDocument,
        changes: ChangeSet,
    },
}

impl UpdateOutcome {
    pub fn document(&self) -> &ClusterDocument {
        match self {
            Self::Unchanged(document) | Self::Patched { document, .. } => document,
        }
    }
}

/// Result of [`LifecycleController::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Created(ClusterDocument),
    Updated(UpdateOutcome),
}

impl ApplyOutcome {
    pub fn document(&self) -> &ClusterDocument {
        match self {
            Self::Created(document) => document,
            Self::Updated(outcome) => outcome.document(),
        }
    }
}

/// Result of [`LifecycleController::destroy`].
///
/// Only `Confirmed` observed the cluster disappear. The other variants are
/// warnings: the delete itself was accepted in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    Confirmed { waited: Duration },
    Unconfirmed { waited: Duration },
    WaitDisabled,
    Cancelled { waited: Duration },
}

impl DestroyOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    /// Warning to show the user, if the removal was not observed.
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Confirmed { .. } => None,
            Self::Unconfirmed { waited } => Some(format!(
                "Cluster deletion was accepted but removal was not confirmed within {} minutes",
                waited.as_secs().div_ceil(60)
            )),
            Self::WaitDisabled => Some(
                "Waiting for cluster deletion is disabled; removal was not confirmed".to_string(),
            ),
            Self::Cancelled { .. } => Some(
                "Stopped waiting for cluster deletion; the delete request was still accepted".to_string(),
            ),
        }
    }
}

/// Preview of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub current: ClusterDocument,
    pub changes: ChangeSet,
}

impl Plan {
    /// The current document with the change set applied locally.
    pub fn preview(&self) -> Result<ClusterDocument> {
        let mut value = self.current.to_value()?;
        self.changes
            .apply_to(&mut value)
            .map_err(|e| Error::InvalidDocument(e.to_string()))?;
        ClusterDocument::from_value(value)
    }
}

/// Drives one cluster through its lifecycle.
///
/// Concurrent reconciliation of the same cluster id is not supported. The
/// controller adds no locking of its own; the store only guarantees
/// meaningful results under a single writer per cluster.
pub struct LifecycleController<'a, S, V, C>
where
    S: ClusterStore + ?Sized,
    V: VersionSource + ?Sized,
    C: Clock + ?Sized,
{
    store: &'a S,
    versions: &'a V,
    clock: &'a C,
    validator: Validator,
    stamp: BuildStamp,
    poll_interval: Duration,
}

impl<'a, S, V, C> LifecycleController<'a, S, V, C>
where
    S: ClusterStore + ?Sized,
    V: VersionSource + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(store: &'a S, versions: &'a V, clock: &'a C, stamp: BuildStamp) -> Self {
        Self {
            store,
            versions,
            clock,
            validator: Validator::new(),
            stamp,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Resolve the requested version against a fresh catalog.
    ///
    /// Without a requested version the catalog default of the channel group
    /// is used, or `None` when the catalog flags no default.
    pub fn resolve_version(&self, spec: &ClusterSpec) -> Result<Option<VersionEntry>> {
        let catalog = VersionCatalog::fetch(self.versions)?;
        let group = spec.effective_channel_group();

        match non_empty(&spec.version) {
            Some(requested) => {
                let entry = catalog.resolve(requested, group)?;
                debug!("Resolved version {requested} ({group}) to {}", entry.canonical_id());
                Ok(Some(entry.clone()))
            }
            None => {
                let entry = catalog.default_entry(group).cloned();
                match &entry {
                    Some(e) => debug!("No version requested; using default {} of {group}", e.canonical_id()),
                    None => debug!("No version requested and no default in {group}"),
                }
                Ok(entry)
            }
        }
    }

    /// Resolve and validate, returning the document `create` would send.
    pub fn prepare_create(&self, spec: &ClusterSpec) -> Result<ClusterDocument> {
        let version = self.resolve_version(spec)?;
        self.validator.validate(spec)?;
        Ok(create_document(spec, version.as_ref(), &self.stamp))
    }

    /// Create the cluster.
    ///
    /// Rejections are surfaced with the control plane's message verbatim.
    pub fn create(&self, spec: &ClusterSpec) -> Result<ClusterDocument> {
        let document = self.prepare_create(spec)?;
        info!("Creating cluster {}", spec.name);

        let created = self
            .store
            .create(&document)
            .map_err(|e| Error::from_store(Operation::Create, e))?;
        info!(
            "Created cluster {} ({})",
            spec.name,
            created.id.as_deref().unwrap_or("no id")
        );
        Ok(created)
    }

    /// Current remote document, or `None` if the cluster is gone.
    pub fn read(&self, id: &str) -> Result<Option<ClusterDocument>> {
        self.store
            .fetch(id)
            .map_err(|e| Error::from_store(Operation::Fetch, e))
    }

    /// Validate, fetch and diff without writing anything.
    pub fn plan(&self, id: &str, spec: &ClusterSpec) -> Result<Plan> {
        self.validator.validate(spec)?;
        let current = self.read(id)?.ok_or_else(|| Error::NotFound { id: id.to_string() })?;
        let changes = diff(&current, spec, &self.stamp);
        Ok(Plan { current, changes })
    }

    /// Bring an existing cluster in line with `spec`.
    ///
    /// An empty change set issues no write.
    pub fn update(&self, id: &str, spec: &ClusterSpec) -> Result<UpdateOutcome> {
        let plan = self.plan(id, spec)?;
        self.patch(id, plan)
    }

    fn patch(&self, id: &str, plan: Plan) -> Result<UpdateOutcome> {
        if plan.changes.is_empty() {
            debug!("Cluster {id} is up to date");
            return Ok(UpdateOutcome::Unchanged(plan.current));
        }

        info!("Updating cluster {id} ({} changes)", plan.changes.len());
        for edit in &plan.changes {
            debug!("  {edit}");
        }
        let document = self
            .store
            .patch(id, &plan.changes)
            .map_err(|e| Error::from_store(Operation::Patch, e))?;
        Ok(UpdateOutcome::Patched {
            document,
            changes: plan.changes,
        })
    }

    /// Create or update depending on what `binding` points at.
    ///
    /// A binding whose cluster has disappeared is treated as uncreated.
    pub fn apply(&self, binding: Option<&str>, spec: &ClusterSpec) -> Result<ApplyOutcome> {
        let Some(id) = binding else {
            return self.create(spec).map(ApplyOutcome::Created);
        };

        self.validator.validate(spec)?;
        match self.read(id)? {
            Some(current) => {
                let changes = diff(&current, spec, &self.stamp);
                self.patch(id, Plan { current, changes }).map(ApplyOutcome::Updated)
            }
            None => {
                info!("Cluster {id} no longer exists; creating it again");
                self.create(spec).map(ApplyOutcome::Created)
            }
        }
    }

    /// Delete the cluster and optionally wait for its removal.
    ///
    /// Only the delete call itself can fail. Timeouts and cancellation are
    /// reported through [`DestroyOutcome`].
    pub fn destroy(&self, id: &str, policy: &DestroyWaitPolicy, cancel: &CancelToken) -> Result<DestroyOutcome> {
        info!("Deleting cluster {id}");
        self.store
            .delete(id)
            .map_err(|e| Error::from_store(Operation::Delete, e))?;

        if policy.disabled {
            debug!("Not waiting for removal of cluster {id}");
            return Ok(DestroyOutcome::WaitDisabled);
        }

        let timeout = policy.effective_timeout();
        info!("Waiting up to {} minutes for cluster {id} to be removed", timeout.as_secs() / 60);

        let outcome = match wait_until_gone(self.store, id, timeout, self.poll_interval, self.clock, cancel) {
            WaitResult::Gone { waited } => DestroyOutcome::Confirmed { waited },
            WaitResult::TimedOut { waited } => DestroyOutcome::Unconfirmed { waited },
            WaitResult::Cancelled { waited } => DestroyOutcome::Cancelled { waited },
        };
        if outcome.is_confirmed() {
            info!("Cluster {id} removed");
        }
        Ok(outcome)
    }
}
