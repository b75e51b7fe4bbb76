//! Change sets: minimal field-level edits between remote and desired state
//!
//! [`diff`] compares only the fields that may change after creation. Each
//! field uses its own equality: plain equality for scalars, set equality for
//! subnet ids, deep equality for proxy settings, labels and properties.
//!
//! A [`ChangeSet`] renders as an RFC 6902 JSON Patch or as the equivalent
//! JSON merge-patch body, and can be applied to a JSON tree directly.

use crate::document::{AutoscaleCompute, ClusterDocument, Nodes, Proxy};
use crate::payload::BuildStamp;
use crate::spec::{non_empty, ClusterSpec, ComputeMode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single edit at a JSON-pointer path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Edit {
    /// Set a field the current document does not have
    Add { path: String, value: Value },
    /// Overwrite a field the current document has
    Replace { path: String, value: Value },
    /// Drop a field the current document has
    Remove { path: String },
}

impl Edit {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self::Add {
            path: path.into(),
            value,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self::Replace {
            path: path.into(),
            value,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::Remove { path: path.into() }
    }

    /// `replace` if the field is already present, `add` otherwise.
    pub fn set(path: impl Into<String>, present: bool, value: Value) -> Self {
        if present {
            Self::replace(path, value)
        } else {
            Self::add(path, value)
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. } | Self::Replace { path, .. } | Self::Remove { path } => path,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Add { value, .. } | Self::Replace { value, .. } => Some(value),
            Self::Remove { .. } => None,
        }
    }

    /// Short operation name as used in JSON Patch.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Replace { .. } => "replace",
            Self::Remove { .. } => "remove",
        }
    }
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { path, value } => write!(f, "+ {path} = {value}"),
            Self::Replace { path, value } => write!(f, "~ {path} = {value}"),
            Self::Remove { path } => write!(f, "- {path}"),
        }
    }
}

/// Errors raised while applying a change set to a JSON tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path not found: {0}")]
    PathNotFound(String),
}

/// Ordered sequence of edits. Empty means nothing to do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet {
    edits: Vec<Edit>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn iter(&self) -> impl Iterator<Item = &Edit> {
        self.edits.iter()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Edit targeting exactly `path`, if any.
    pub fn find(&self, path: &str) -> Option<&Edit> {
        self.edits.iter().find(|e| e.path() == path)
    }

    /// Check if any edit targets `path` or something below it.
    pub fn touches(&self, path: &str) -> bool {
        self.edits.iter().any(|e| {
            let p = e.path();
            p == path || p.strip_prefix(path).is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// RFC 6902 JSON Patch document.
    pub fn to_json_patch(&self) -> Value {
        Value::Array(
            self.edits
                .iter()
                .map(|e| serde_json::to_value(e).unwrap_or_default())
                .collect(),
        )
    }

    /// JSON merge-patch body with the same effect.
    ///
    /// Removals become explicit `null` members. An object value is merged
    /// into the remote one rather than swapped for it, which is why [`diff`]
    /// removes dropped keys one by one.
    pub fn to_merge_patch(&self) -> Value {
        let mut root = Value::Object(Map::new());
        for edit in &self.edits {
            let Ok(tokens) = parse_pointer(edit.path()) else {
                continue;
            };
            let Some((last, parents)) = tokens.split_last() else {
                continue;
            };

            let mut cursor = &mut root;
            for token in parents {
                cursor = ensure_object(cursor)
                    .entry(token.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            let value = edit.value().cloned().unwrap_or(Value::Null);
            ensure_object(cursor).insert(last.clone(), value);
        }
        root
    }

    /// Apply every edit to `target`, in order.
    ///
    /// Missing parent objects are created for `add`. `replace` and `remove`
    /// require the target to exist. On error `target` may be partially
    /// modified; apply to a copy when that matters.
    pub fn apply_to(&self, target: &mut Value) -> Result<(), PatchError> {
        for edit in &self.edits {
            apply_edit(target, edit)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Edit;
    type IntoIter = std::slice::Iter<'a, Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.iter()
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.edits.is_empty() {
            return write!(f, "(no changes)");
        }
        for (i, edit) in self.edits.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{edit}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Diff
// ============================================================================

/// Compute the edits that move `current` toward `desired`.
///
/// Immutable fields (name, region, cloud provider, account, STS roles,
/// network CIDRs, private link, machine type, zones, version) are never
/// compared. Fields the spec leaves unset are not managed and produce no
/// edit.
pub fn diff(current: &ClusterDocument, desired: &ClusterSpec, stamp: &BuildStamp) -> ChangeSet {
    let mut changes = ChangeSet::new();
    diff_properties(current, desired, stamp, &mut changes);
    diff_workload_monitoring(current, desired, &mut changes);
    diff_proxy(current, desired, &mut changes);
    diff_subnets(current, desired, &mut changes);
    diff_nodes(current, desired, &mut changes);
    changes
}

fn diff_properties(current: &ClusterDocument, desired: &ClusterSpec, stamp: &BuildStamp, changes: &mut ChangeSet) {
    let wanted = stamp.stamped(&desired.properties);
    diff_string_map("/properties", current.properties.as_ref(), &wanted, changes);
}

/// Key-by-key edits for a string map, so dropped keys become explicit removals.
///
/// A missing map is added whole and an empty desired map removes it.
fn diff_string_map(
    path: &str,
    existing: Option<&BTreeMap<String, String>>,
    wanted: &BTreeMap<String, String>,
    changes: &mut ChangeSet,
) {
    let Some(existing) = existing else {
        if !wanted.is_empty() {
            changes.push(Edit::add(path, to_json(wanted)));
        }
        return;
    };
    if existing == wanted {
        return;
    }
    if wanted.is_empty() {
        changes.push(Edit::remove(path));
        return;
    }

    for key in existing.keys().filter(|k| !wanted.contains_key(*k)) {
        changes.push(Edit::remove(format!("{path}/{}", escape_token(key))));
    }
    for (key, value) in wanted {
        let old = existing.get(key);
        if old != Some(value) {
            changes.push(Edit::set(
                format!("{path}/{}", escape_token(key)),
                old.is_some(),
                Value::String(value.clone()),
            ));
        }
    }
}

fn diff_workload_monitoring(current: &ClusterDocument, desired: &ClusterSpec, changes: &mut ChangeSet) {
    let Some(wanted) = desired.disable_workload_monitoring else {
        return;
    };
    let existing = current.disable_user_workload_monitoring;
    if existing.unwrap_or(false) != wanted {
        changes.push(Edit::set(
            "/disable_user_workload_monitoring",
            existing.is_some(),
            Value::Bool(wanted),
        ));
    }
}

fn diff_proxy(current: &ClusterDocument, desired: &ClusterSpec, changes: &mut ChangeSet) {
    let Some(proxy) = &desired.proxy else {
        return;
    };

    let wanted = Proxy {
        http_proxy: non_empty(&proxy.http_proxy).map(str::to_string),
        https_proxy: non_empty(&proxy.https_proxy).map(str::to_string),
        no_proxy: non_empty(&proxy.no_proxy).map(str::to_string),
    };
    match &current.proxy {
        None => {
            if wanted != Proxy::default() {
                changes.push(Edit::add("/proxy", to_json(&wanted)));
            }
        }
        Some(existing) if normalize_proxy(existing) == wanted => {}
        Some(_) if wanted == Proxy::default() => changes.push(Edit::remove("/proxy")),
        Some(existing) => {
            let fields = [
                ("http_proxy", &existing.http_proxy, &wanted.http_proxy),
                ("https_proxy", &existing.https_proxy, &wanted.https_proxy),
                ("no_proxy", &existing.no_proxy, &wanted.no_proxy),
            ];
            for (name, old, new) in fields {
                if non_empty(old) == new.as_deref() {
                    continue;
                }
                let path = format!("/proxy/{name}");
                match new {
                    Some(value) => changes.push(Edit::set(path, old.is_some(), Value::String(value.clone()))),
                    None => changes.push(Edit::remove(path)),
                }
            }
        }
    }

    let wanted_bundle = non_empty(&proxy.additional_trust_bundle);
    let existing_bundle = non_empty(&current.additional_trust_bundle);
    match (existing_bundle, wanted_bundle) {
        (Some(_), None) => changes.push(Edit::remove("/additional_trust_bundle")),
        (existing, Some(bundle)) if existing != Some(bundle) => changes.push(Edit::set(
            "/additional_trust_bundle",
            current.additional_trust_bundle.is_some(),
            Value::String(bundle.to_string()),
        )),
        _ => {}
    }
}

fn normalize_proxy(proxy: &Proxy) -> Proxy {
    Proxy {
        http_proxy: non_empty(&proxy.http_proxy).map(str::to_string),
        https_proxy: non_empty(&proxy.https_proxy).map(str::to_string),
        no_proxy: non_empty(&proxy.no_proxy).map(str::to_string),
    }
}

fn diff_subnets(current: &ClusterDocument, desired: &ClusterSpec, changes: &mut ChangeSet) {
    let Some(wanted) = &desired.aws_subnet_ids else {
        return;
    };
    let existing = current.aws.as_ref().and_then(|aws| aws.subnet_ids.as_ref());

    let wanted_set: BTreeSet<&str> = wanted.iter().map(String::as_str).collect();
    let existing_set: BTreeSet<&str> = existing
        .map(|ids| ids.iter().map(String::as_str).collect())
        .unwrap_or_default();
    if wanted_set == existing_set {
        return;
    }

    if wanted.is_empty() {
        changes.push(Edit::remove("/aws/subnet_ids"));
    } else {
        changes.push(Edit::set("/aws/subnet_ids", existing.is_some(), to_json(wanted)));
    }
}

fn current_mode(nodes: &Nodes) -> Option<ComputeMode> {
    match (&nodes.autoscale_compute, nodes.compute) {
        (Some(a), _) => Some(ComputeMode::Autoscaling(crate::spec::AutoscalingSpec {
            min_replicas: a.min_replicas,
            max_replicas: a.max_replicas,
        })),
        (None, Some(n)) => Some(ComputeMode::Fixed(n)),
        (None, None) => None,
    }
}

fn diff_nodes(current: &ClusterDocument, desired: &ClusterSpec, changes: &mut ChangeSet) {
    let existing = current.nodes.clone().unwrap_or_default();
    let wanted_mode = desired.compute_mode();

    let switching = matches!(
        (wanted_mode, current_mode(&existing)),
        (Some(ComputeMode::Fixed(_)), Some(ComputeMode::Autoscaling(_)))
            | (Some(ComputeMode::Autoscaling(_)), Some(ComputeMode::Fixed(_)))
    );

    if switching {
        // Drop the old shape before adding the new one so no field of it survives.
        match wanted_mode {
            Some(ComputeMode::Fixed(n)) => {
                changes.push(Edit::remove("/nodes/autoscale_compute"));
                changes.push(Edit::set("/nodes/compute", existing.compute.is_some(), Value::from(n)));
            }
            Some(ComputeMode::Autoscaling(b)) => {
                if existing.compute.is_some() {
                    changes.push(Edit::remove("/nodes/compute"));
                }
                changes.push(Edit::add(
                    "/nodes/autoscale_compute",
                    to_json(&AutoscaleCompute::new(b.min_replicas, b.max_replicas)),
                ));
            }
            None => {}
        }
    } else {
        diff_compute(&existing, wanted_mode, changes);
    }

    if let Some(wanted) = &desired.compute_labels {
        diff_string_map("/nodes/compute_labels", existing.compute_labels.as_ref(), wanted, changes);
    }
}

fn diff_compute(existing: &Nodes, wanted_mode: Option<ComputeMode>, changes: &mut ChangeSet) {
    match wanted_mode {
        Some(ComputeMode::Fixed(n)) if existing.compute != Some(n) => {
            changes.push(Edit::set("/nodes/compute", existing.compute.is_some(), Value::from(n)));
        }
        Some(ComputeMode::Autoscaling(b)) => {
            let bounds = existing
                .autoscale_compute
                .as_ref()
                .map(|a| (a.min_replicas, a.max_replicas));
            if bounds != Some((b.min_replicas, b.max_replicas)) {
                changes.push(Edit::set(
                    "/nodes/autoscale_compute",
                    existing.autoscale_compute.is_some(),
                    to_json(&AutoscaleCompute::new(b.min_replicas, b.max_replicas)),
                ));
            }
        }
        _ => {}
    }
}

/// Apply an RFC 7386 merge-patch body to `target`.
///
/// `null` members delete keys, objects merge recursively, anything else
/// overwrites.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(members) = patch else {
        *target = patch.clone();
        return;
    };
    let map = ensure_object(target);
    for (key, value) in members {
        if value.is_null() {
            map.remove(key);
        } else {
            merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
        }
    }
}

/// Serialize plain data with string keys; this cannot fail.
fn to_json<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

// ============================================================================
// JSON pointer application
// ============================================================================

/// Escape a map key for use as a JSON-pointer token.
fn escape_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn parse_pointer(path: &str) -> Result<Vec<String>, PatchError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(PatchError::InvalidPath(path.to_string()));
    };
    Ok(rest
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just made an object"),
    }
}

fn apply_edit(target: &mut Value, edit: &Edit) -> Result<(), PatchError> {
    let path = edit.path();
    let tokens = parse_pointer(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        // Whole-document edits replace the root.
        match edit.value() {
            Some(value) => *target = value.clone(),
            None => return Err(PatchError::InvalidPath(path.to_string())),
        }
        return Ok(());
    };

    let mut cursor = target;
    for token in parents {
        cursor = match cursor {
            Value::Object(map) => {
                if matches!(edit, Edit::Add { .. }) {
                    map.entry(token.clone()).or_insert_with(|| Value::Object(Map::new()))
                } else {
                    map.get_mut(token)
                        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?
                }
            }
            Value::Array(items) => {
                let index: usize = token
                    .parse()
                    .map_err(|_| PatchError::InvalidPath(path.to_string()))?;
                items
                    .get_mut(index)
                    .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?
            }
            _ => return Err(PatchError::PathNotFound(path.to_string())),
        };
    }

    match (cursor, edit) {
        (Value::Object(map), Edit::Add { value, .. }) => {
            map.insert(last.clone(), value.clone());
        }
        (Value::Object(map), Edit::Replace { value, .. }) => {
            let slot = map
                .get_mut(last)
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
            *slot = value.clone();
        }
        (Value::Object(map), Edit::Remove { .. }) => {
            map.remove(last)
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
        }
        (Value::Array(items), Edit::Add { value, .. }) if last == "-" => {
            items.push(value.clone());
        }
        (Value::Array(items), edit) => {
            let index: usize = last
                .parse()
                .map_err(|_| PatchError::InvalidPath(path.to_string()))?;
            match edit {
                Edit::Add { value, .. } if index <= items.len() => items.insert(index, value.clone()),
                Edit::Replace { value, .. } if index < items.len() => items[index] = value.clone(),
                Edit::Remove { .. } if index < items.len() => {
                    items.remove(index);
                }
                _ => return Err(PatchError::PathNotFound(path.to_string())),
            }
        }
        _ => return Err(PatchError::PathNotFound(path.to_string())),
    }
    Ok(())
}
