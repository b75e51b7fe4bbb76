//! Typed view of the remote cluster resource
//!
//! The control plane owns these documents. The core only reads them or
//! patches them field by field, so every field is optional and unknown
//! fields are ignored.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cluster resource document as returned by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ClusterState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_az: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<Aws>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Nodes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Proxy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_trust_bundle: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_bool"
    )]
    pub disable_user_workload_monitoring: Option<bool>,
}

/// Lifecycle state reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    Waiting,
    Pending,
    Validating,
    Installing,
    Ready,
    Error,
    Uninstalling,
    Hibernating,
    Resuming,
    Powering,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Installing => "installing",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Uninstalling => "uninstalling",
            Self::Hibernating => "hibernating",
            Self::Resuming => "resuming",
            Self::Powering => "powering",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Reference to another resource by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: String,
}

impl IdRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listening: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_prefix: Option<u32>,
}

impl Network {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_group: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aws {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_link: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ec2_metadata_http_tokens: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sts: Option<Sts>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_iam_roles: Option<InstanceIamRoles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_role_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_config: Option<IdRef>,
    /// Populated by the control plane once provisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_endpoint_url: Option<String>,
    /// Populated by the control plane once provisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbprint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceIamRoles {
    #[serde(default)]
    pub master_role_arn: String,
    #[serde(default)]
    pub worker_role_arn: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nodes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscale_compute: Option<AutoscaleCompute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_machine_type: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zones: Option<Vec<String>>,
}

/// Kind tag the control plane expects on autoscaling blocks.
pub const AUTOSCALING_KIND: &str = "MachinePoolAutoscaling";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscaleCompute {
    #[serde(default = "autoscaling_kind")]
    pub kind: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
}

fn autoscaling_kind() -> String {
    AUTOSCALING_KIND.to_string()
}

impl AutoscaleCompute {
    pub fn new(min_replicas: u32, max_replicas: u32) -> Self {
        Self {
            kind: autoscaling_kind(),
            min_replicas,
            max_replicas,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
}

impl ClusterDocument {
    /// Server-assigned id, or an error if the document has none.
    pub fn require_id(&self) -> crate::Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| crate::Error::InvalidDocument("document has no id".into()))
    }

    /// Convert to a JSON tree.
    pub fn to_value(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse from a JSON tree.
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Accept `true`, `"true"` and friends.
///
/// The control plane has been observed returning this flag as a string.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    match Option::<BoolOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(BoolOrString::Bool(b)) => Ok(Some(b)),
        Some(BoolOrString::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" | "" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean, got '{other}'"
            ))),
        },
    }
}
