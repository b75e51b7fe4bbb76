//! Desired state of a managed cluster
//!
//! A [`ClusterSpec`] is owned by the caller for the duration of one
//! reconciliation pass. Optional fields left unset are unmanaged: they are
//! omitted on create and never compared on update.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Channel group used when none is requested.
pub const DEFAULT_CHANNEL_GROUP: &str = "stable";

/// Desired specification of a managed cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterSpec {
    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------
    pub name: String,
    pub cloud_region: String,
    #[serde(default)]
    pub multi_az: bool,

    // ------------------------------------------------------------------
    // Trust
    // ------------------------------------------------------------------
    pub aws_account_id: String,
    #[serde(default)]
    pub sts: Option<StsSpec>,

    // ------------------------------------------------------------------
    // Network
    // ------------------------------------------------------------------
    #[serde(default)]
    pub machine_cidr: Option<String>,
    #[serde(default)]
    pub service_cidr: Option<String>,
    #[serde(default)]
    pub pod_cidr: Option<String>,
    #[serde(default)]
    pub host_prefix: Option<u32>,
    #[serde(default)]
    pub aws_private_link: bool,
    #[serde(default)]
    pub aws_subnet_ids: Option<Vec<String>>,
    #[serde(default)]
    pub availability_zones: Option<Vec<String>>,
    #[serde(default)]
    pub proxy: Option<ProxySpec>,

    // ------------------------------------------------------------------
    // Compute
    // ------------------------------------------------------------------
    #[serde(default)]
    pub replicas: Option<u32>,
    #[serde(default)]
    pub autoscaling: Option<AutoscalingSpec>,
    #[serde(default)]
    pub compute_machine_type: Option<String>,
    #[serde(default)]
    pub compute_labels: Option<BTreeMap<String, String>>,

    // ------------------------------------------------------------------
    // Version selection
    // ------------------------------------------------------------------
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub channel_group: Option<String>,

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------
    #[serde(default)]
    pub disable_workload_monitoring: Option<bool>,
    #[serde(default)]
    pub ec2_metadata_http_tokens: Option<String>,
    #[serde(default)]
    pub disable_waiting_in_destroy: bool,
    /// Minutes to wait for delete confirmation; zero or negative means default
    #[serde(default)]
    pub destroy_timeout: Option<i64>,

    /// Free-form properties attached to the cluster
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// STS trust configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StsSpec {
    #[serde(default)]
    pub role_arn: String,
    #[serde(default)]
    pub support_role_arn: String,
    #[serde(default)]
    pub instance_iam_roles: InstanceIamRoles,
    pub operator_role_prefix: String,
    #[serde(default)]
    pub oidc_config_id: Option<String>,
}

/// Instance roles for control-plane and worker nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceIamRoles {
    #[serde(default)]
    pub master_role_arn: String,
    #[serde(default)]
    pub worker_role_arn: String,
}

/// Cluster-wide proxy settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySpec {
    #[serde(default)]
    pub http_proxy: Option<String>,
    #[serde(default)]
    pub https_proxy: Option<String>,
    #[serde(default)]
    pub no_proxy: Option<String>,
    #[serde(default)]
    pub additional_trust_bundle: Option<String>,
}

/// Autoscaling bounds for the default compute pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoscalingSpec {
    pub min_replicas: u32,
    pub max_replicas: u32,
}

/// How the default compute pool is sized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeMode {
    /// Fixed replica count
    Fixed(u32),
    /// Autoscaling between bounds
    Autoscaling(AutoscalingSpec),
}

impl ClusterSpec {
    /// Channel group to resolve versions in, falling back to the default.
    pub fn effective_channel_group(&self) -> &str {
        match self.channel_group.as_deref() {
            Some(group) if !group.is_empty() => group,
            _ => DEFAULT_CHANNEL_GROUP,
        }
    }

    /// Requested compute sizing, if any.
    ///
    /// Autoscaling wins when both are set; validation rejects that case
    /// before the value is ever used for a remote call.
    pub fn compute_mode(&self) -> Option<ComputeMode> {
        match (self.autoscaling, self.replicas) {
            (Some(bounds), _) => Some(ComputeMode::Autoscaling(bounds)),
            (None, Some(replicas)) => Some(ComputeMode::Fixed(replicas)),
            (None, None) => None,
        }
    }
}

impl ProxySpec {
    /// Check if none of the proxy endpoints or the trust bundle is set.
    pub fn is_empty(&self) -> bool {
        [&self.http_proxy, &self.https_proxy, &self.additional_trust_bundle]
            .iter()
            .all(|v| non_empty(v).is_none())
    }
}

/// Treat empty strings the same as absent values.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
