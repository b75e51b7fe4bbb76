//! # Reconcile
//!
//! Reconciliation core for managed OpenShift clusters.
//!
//! Given a desired [`ClusterSpec`], the core resolves the requested release
//! against the version catalog, checks cross-field invariants locally,
//! computes the minimal [`ChangeSet`] between the remote document and the
//! spec, and drives create, update and destroy calls against a
//! [`ClusterStore`].
//!
//! ## Core Concepts
//!
//! - **VersionCatalog**: paginated listing of installable versions, resolved per channel group
//! - **Validator**: independent rules over a spec, all evaluated in one pass
//! - **ChangeSet**: ordered add/replace/remove edits at JSON-pointer paths
//! - **LifecycleController**: the create / update / destroy state machine
//!
//! ## Example
//!
//! ```
//! use reconcile::{
//!     BuildStamp, CancelToken, ClusterSpec, DestroyWaitPolicy, LifecycleController,
//!     ManualClock, MemoryStore, UpdateOutcome, VersionEntry,
//! };
//!
//! let store = MemoryStore::new();
//! store.add_version(VersionEntry::new("openshift-v4.12.0", "4.12.0").with_default());
//! let clock = ManualClock::new();
//! let controller = LifecycleController::new(&store, &store, &clock, BuildStamp::new("0.1.0", "dev"));
//!
//! let spec = ClusterSpec {
//!     name: "demo".into(),
//!     cloud_region: "us-east-1".into(),
//!     aws_account_id: "123456789012".into(),
//!     replicas: Some(3),
//!     ..Default::default()
//! };
//!
//! let created = controller.create(&spec)?;
//! let id = created.require_id()?;
//! assert!(matches!(controller.update(id, &spec)?, UpdateOutcome::Unchanged(_)));
//!
//! let outcome = controller.destroy(id, &DestroyWaitPolicy::default(), &CancelToken::new())?;
//! assert!(outcome.is_confirmed());
//! # Ok::<(), reconcile::Error>(())
//! ```
//!
//! ## Store Traits
//!
//! The core never talks to the network directly:
//!
//! - [`ClusterStore`]: create, fetch, patch and delete cluster documents
//! - [`VersionSource`]: paginated version listing
//! - [`Clock`]: time source for the destroy wait loop
//!
//! [`MemoryStore`] and [`ManualClock`] implement them in-process for tests.

pub mod changeset;
pub mod document;
pub mod error;
pub mod lifecycle;
pub mod payload;
pub mod spec;
pub mod store;
pub mod validate;
pub mod version;
pub mod wait;

pub use changeset::{diff, merge_patch, ChangeSet, Edit, PatchError};
pub use document::{ClusterDocument, ClusterState};
pub use error::{Error, ErrorCategory, Operation, Result, StoreError};
pub use lifecycle::{ApplyOutcome, DestroyOutcome, LifecycleController, Plan, UpdateOutcome};
pub use payload::{create_document, BuildStamp};
pub use spec::{AutoscalingSpec, ClusterSpec, ComputeMode, ProxySpec, StsSpec, DEFAULT_CHANNEL_GROUP};
pub use store::{ClusterStore, MemoryStore, VersionSource};
pub use validate::{Rule, ValidationError, ValidationErrors, Validator};
pub use version::{OpenShiftVersion, VersionCatalog, VersionEntry, VersionPage};
pub use wait::{CancelToken, Clock, DestroyWaitPolicy, ManualClock, SystemClock};
