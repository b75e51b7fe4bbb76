//! Create payload construction
//!
//! Translates a validated [`ClusterSpec`] and its resolved version into the
//! document sent on create. Unset optional fields are left out so the control
//! plane applies its own defaults.

use crate::document::{
    Aws, AutoscaleCompute, ClusterDocument, Endpoint, IdRef, InstanceIamRoles, Network, Nodes, Proxy, Sts,
    VersionRef,
};
use crate::spec::{non_empty, ClusterSpec, ComputeMode, StsSpec, DEFAULT_CHANNEL_GROUP};
use crate::version::VersionEntry;
use std::collections::BTreeMap;

/// Property key carrying the version of the tool that last wrote the cluster.
pub const VERSION_PROPERTY: &str = "rosaform_version";

/// Property key carrying the commit of the tool that last wrote the cluster.
pub const COMMIT_PROPERTY: &str = "rosaform_commit";

/// Property keys owned by the controller; specs may not set them.
pub const RESERVED_PROPERTIES: [&str; 2] = [VERSION_PROPERTY, COMMIT_PROPERTY];

pub const CLOUD_PROVIDER: &str = "aws";
pub const PRODUCT: &str = "rosa";
const LISTENING_INTERNAL: &str = "internal";

/// Version and commit of the running binary, recorded on every cluster it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStamp {
    pub version: String,
    pub commit: String,
}

impl BuildStamp {
    pub fn new(version: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            commit: commit.into(),
        }
    }

    /// User properties with the stamp merged in.
    pub fn stamped(&self, properties: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged = properties.clone();
        merged.insert(VERSION_PROPERTY.to_string(), self.version.clone());
        merged.insert(COMMIT_PROPERTY.to_string(), self.commit.clone());
        merged
    }
}

/// Build the document to send on create.
///
/// `version` is the resolved catalog entry, or `None` to let the control
/// plane pick its default.
pub fn create_document(spec: &ClusterSpec, version: Option<&VersionEntry>, stamp: &BuildStamp) -> ClusterDocument {
    let network = Network {
        machine_cidr: spec.machine_cidr.clone(),
        service_cidr: spec.service_cidr.clone(),
        pod_cidr: spec.pod_cidr.clone(),
        host_prefix: spec.host_prefix,
    };

    let proxy = spec.proxy.as_ref().map(|p| Proxy {
        http_proxy: non_empty(&p.http_proxy).map(str::to_string),
        https_proxy: non_empty(&p.https_proxy).map(str::to_string),
        no_proxy: non_empty(&p.no_proxy).map(str::to_string),
    });

    ClusterDocument {
        name: Some(spec.name.clone()),
        cloud_provider: Some(IdRef::new(CLOUD_PROVIDER)),
        product: Some(IdRef::new(PRODUCT)),
        region: Some(IdRef::new(&spec.cloud_region)),
        multi_az: Some(spec.multi_az),
        api: spec.aws_private_link.then(|| Endpoint {
            url: None,
            listening: Some(LISTENING_INTERNAL.to_string()),
        }),
        properties: Some(stamp.stamped(&spec.properties)),
        network: (!network.is_empty()).then_some(network),
        version: version.map(version_ref),
        aws: Some(aws(spec)),
        nodes: nodes(spec),
        proxy: proxy.filter(|p| *p != Proxy::default()),
        additional_trust_bundle: spec
            .proxy
            .as_ref()
            .and_then(|p| non_empty(&p.additional_trust_bundle))
            .map(str::to_string),
        disable_user_workload_monitoring: spec.disable_workload_monitoring,
        ..Default::default()
    }
}

fn version_ref(entry: &VersionEntry) -> VersionRef {
    let group = entry.effective_channel_group();
    VersionRef {
        id: entry.canonical_id(),
        channel_group: (group != DEFAULT_CHANNEL_GROUP).then(|| group.to_string()),
    }
}

fn aws(spec: &ClusterSpec) -> Aws {
    Aws {
        account_id: Some(spec.aws_account_id.clone()),
        private_link: Some(spec.aws_private_link),
        subnet_ids: spec.aws_subnet_ids.clone().filter(|ids| !ids.is_empty()),
        ec2_metadata_http_tokens: non_empty(&spec.ec2_metadata_http_tokens).map(str::to_string),
        sts: spec.sts.as_ref().map(sts),
    }
}

/// Role ARNs are sent even when empty; the control plane decides whether
/// an empty ARN is acceptable for the account.
fn sts(spec: &StsSpec) -> Sts {
    let roles = &spec.instance_iam_roles;
    Sts {
        role_arn: Some(spec.role_arn.clone()),
        support_role_arn: Some(spec.support_role_arn.clone()),
        instance_iam_roles: Some(InstanceIamRoles {
            master_role_arn: roles.master_role_arn.clone(),
            worker_role_arn: roles.worker_role_arn.clone(),
        }),
        operator_role_prefix: Some(spec.operator_role_prefix.clone()).filter(|s| !s.is_empty()),
        oidc_config: non_empty(&spec.oidc_config_id).map(IdRef::new),
        oidc_endpoint_url: None,
        thumbprint: None,
    }
}

fn nodes(spec: &ClusterSpec) -> Option<Nodes> {
    let mut nodes = Nodes {
        compute_machine_type: non_empty(&spec.compute_machine_type).map(IdRef::new),
        compute_labels: spec.compute_labels.clone().filter(|l| !l.is_empty()),
        availability_zones: spec.availability_zones.clone().filter(|z| !z.is_empty()),
        ..Default::default()
    };
    match spec.compute_mode() {
        Some(ComputeMode::Fixed(replicas)) => nodes.compute = Some(replicas),
        Some(ComputeMode::Autoscaling(bounds)) => {
            nodes.autoscale_compute = Some(AutoscaleCompute::new(bounds.min_replicas, bounds.max_replicas));
        }
        None => {}
    }
    (nodes != Nodes::default()).then_some(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{AutoscalingSpec, ProxySpec};
    use serde_json::json;

    fn spec() -> ClusterSpec {
        ClusterSpec {
            name: "my-cluster".into(),
            cloud_region: "us-west-1".into(),
            aws_account_id: "123".into(),
            sts: Some(StsSpec {
                operator_role_prefix: "test".into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn stamp() -> BuildStamp {
        BuildStamp::new("1.2.3", "abcdef")
    }

    #[test]
    fn test_minimal_payload() {
        let doc = create_document(&spec(), None, &stamp()).to_value().unwrap();
        assert_eq!(doc["cloud_provider"]["id"], json!("aws"));
        assert_eq!(doc["product"]["id"], json!("rosa"));
        assert_eq!(doc["region"]["id"], json!("us-west-1"));
        assert_eq!(doc["aws"]["account_id"], json!("123"));
        assert_eq!(
            doc["aws"]["sts"],
            json!({
                "role_arn": "",
                "support_role_arn": "",
                "instance_iam_roles": { "master_role_arn": "", "worker_role_arn": "" },
                "operator_role_prefix": "test"
            })
        );
        assert_eq!(doc["properties"]["rosaform_version"], json!("1.2.3"));
        assert!(doc.get("version").is_none());
        assert!(doc.get("api").is_none());
        assert!(doc.get("nodes").is_none());
        assert!(doc.get("network").is_none());
        assert!(doc.get("proxy").is_none());
    }

    #[test]
    fn test_sts_roles_passed_through() {
        let mut spec = spec();
        spec.sts = Some(StsSpec {
            role_arn: "arn:aws:iam::123:role/installer".into(),
            instance_iam_roles: crate::spec::InstanceIamRoles {
                master_role_arn: "arn:aws:iam::123:role/master".into(),
                worker_role_arn: String::new(),
            },
            ..Default::default()
        });
        let doc = create_document(&spec, None, &stamp()).to_value().unwrap();
        let sts = &doc["aws"]["sts"];
        assert_eq!(sts["role_arn"], json!("arn:aws:iam::123:role/installer"));
        assert_eq!(sts["support_role_arn"], json!(""));
        assert_eq!(sts["instance_iam_roles"]["master_role_arn"], json!("arn:aws:iam::123:role/master"));
        assert_eq!(sts["instance_iam_roles"]["worker_role_arn"], json!(""));
        assert!(sts.get("operator_role_prefix").is_none());
        assert!(sts.get("oidc_config").is_none());
    }

    #[test]
    fn test_version_default_group() {
        let entry = VersionEntry::new("openshift-v4.11.1", "4.11.1");
        let doc = create_document(&spec(), Some(&entry), &stamp());
        assert_eq!(
            doc.version,
            Some(VersionRef {
                id: "openshift-v4.11.1".into(),
                channel_group: None,
            })
        );
    }

    #[test]
    fn test_version_other_group() {
        let entry = VersionEntry::new("openshift-v4.50.0-fast", "4.50.0").with_channel_group("fast");
        let doc = create_document(&spec(), Some(&entry), &stamp()).to_value().unwrap();
        assert_eq!(
            doc["version"],
            json!({ "id": "openshift-v4.50.0-fast", "channel_group": "fast" })
        );
    }

    #[test]
    fn test_version_id_from_raw_id() {
        let entry = VersionEntry::new("openshift-v4.10.1", "4.11.1");
        let doc = create_document(&spec(), Some(&entry), &stamp()).to_value().unwrap();
        assert_eq!(doc["version"], json!({ "id": "openshift-v4.11.1" }));
    }

    #[test]
    fn test_private_link_listens_internally() {
        let mut spec = spec();
        spec.aws_private_link = true;
        spec.aws_subnet_ids = Some(vec!["id1".into(), "id2".into(), "id3".into()]);
        let doc = create_document(&spec, None, &stamp()).to_value().unwrap();
        assert_eq!(doc["api"]["listening"], json!("internal"));
        assert_eq!(doc["aws"]["private_link"], json!(true));
        assert_eq!(doc["aws"]["subnet_ids"], json!(["id1", "id2", "id3"]));
    }

    #[test]
    fn test_autoscaling_nodes() {
        let mut spec = spec();
        spec.autoscaling = Some(AutoscalingSpec {
            min_replicas: 2,
            max_replicas: 4,
        });
        spec.compute_labels = Some(BTreeMap::from([("label_key1".into(), "label_value1".into())]));
        let doc = create_document(&spec, None, &stamp()).to_value().unwrap();
        assert_eq!(
            doc["nodes"],
            json!({
                "autoscale_compute": {
                    "kind": "MachinePoolAutoscaling",
                    "min_replicas": 2,
                    "max_replicas": 4
                },
                "compute_labels": { "label_key1": "label_value1" }
            })
        );
    }

    #[test]
    fn test_proxy_and_trust_bundle_split() {
        let mut spec = spec();
        spec.proxy = Some(ProxySpec {
            http_proxy: Some("http://proxy.com".into()),
            https_proxy: Some(String::new()),
            no_proxy: None,
            additional_trust_bundle: Some("123".into()),
        });
        let doc = create_document(&spec, None, &stamp()).to_value().unwrap();
        assert_eq!(doc["proxy"], json!({ "http_proxy": "http://proxy.com" }));
        assert_eq!(doc["additional_trust_bundle"], json!("123"));
    }

    #[test]
    fn test_trust_bundle_without_proxy_endpoints() {
        let mut spec = spec();
        spec.proxy = Some(ProxySpec {
            additional_trust_bundle: Some("123".into()),
            ..Default::default()
        });
        let doc = create_document(&spec, None, &stamp());
        assert!(doc.proxy.is_none());
        assert_eq!(doc.additional_trust_bundle.as_deref(), Some("123"));
    }

    #[test]
    fn test_stamp_overrides_nothing_else() {
        let mut props = BTreeMap::new();
        props.insert("my_prop_key".to_string(), "my_prop_val".to_string());
        let merged = stamp().stamped(&props);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["my_prop_key"], "my_prop_val");
        assert_eq!(merged[COMMIT_PROPERTY], "abcdef");
    }
}
