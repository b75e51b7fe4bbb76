//! Cluster spec files.

use anyhow::{Context, Result, bail};
use reconcile::ClusterSpec;
use std::fs;
use std::path::Path;

/// Load a [`ClusterSpec`] from a TOML file
pub fn load(path: &Path) -> Result<ClusterSpec> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read spec file {}", path.display()))?;
    parse(&content).with_context(|| format!("Invalid spec file: {}", path.display()))
}

/// Parse a [`ClusterSpec`] from TOML text
pub fn parse(content: &str) -> Result<ClusterSpec> {
    let spec: ClusterSpec = toml::from_str(content)?;

    if spec.name.trim().is_empty() {
        bail!("`name` must not be empty");
    }
    if spec.cloud_region.trim().is_empty() {
        bail!("`cloud_region` must not be empty");
    }
    if spec.aws_account_id.trim().is_empty() {
        bail!("`aws_account_id` must not be empty");
    }

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
name = "demo"
cloud_region = "us-east-1"
aws_account_id = "123456789012"
replicas = 3
"#;

    #[test]
    fn test_parse_minimal() {
        let spec = parse(MINIMAL).unwrap();
        assert_eq!(spec.name, "demo");
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.effective_channel_group(), "stable");
        assert!(spec.version.is_none());
    }

    #[test]
    fn test_parse_nested_tables() {
        let spec = parse(
            r#"
name = "demo"
cloud_region = "us-east-1"
aws_account_id = "123456789012"
version = "openshift-v4.12.0"
ec2_metadata_http_tokens = "required"
destroy_timeout = 30

[autoscaling]
min_replicas = 2
max_replicas = 6

[proxy]
http_proxy = "http://proxy.internal:3128"
no_proxy = "localhost"

[properties]
team = "platform"
"#,
        )
        .unwrap();

        let autoscaling = spec.autoscaling.as_ref().unwrap();
        assert_eq!((autoscaling.min_replicas, autoscaling.max_replicas), (2, 6));
        assert_eq!(
            spec.proxy.as_ref().unwrap().http_proxy.as_deref(),
            Some("http://proxy.internal:3128")
        );
        assert_eq!(spec.properties["team"], "platform");
        assert_eq!(spec.destroy_timeout, Some(30));
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let err = parse(&format!("{MINIMAL}\nreplica = 2\n")).unwrap_err();
        assert!(err.to_string().contains("replica"));
    }

    #[test]
    fn test_empty_name_is_an_error() {
        let err = parse("name = \"\"\ncloud_region = \"us-east-1\"\naws_account_id = \"1\"\n").unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Could not read spec file"));
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cluster.toml");
        fs::write(&path, MINIMAL).unwrap();
        assert_eq!(load(&path).unwrap().cloud_region, "us-east-1");
    }
}
