//! Pre-flight validation of a cluster spec
//!
//! Every rule is an independent [`Rule`] returning at most one violation.
//! [`Validator::validate`] runs all of them and reports every violation at
//! once, so a single run tells the user everything that needs fixing.
//!
//! ```
//! use reconcile::validate::Validator;
//! use reconcile::ClusterSpec;
//!
//! let mut spec = ClusterSpec::default();
//! spec.properties.insert("rosaform_version".into(), "0.0.1".into());
//!
//! let errors = Validator::new().validate(&spec).unwrap_err();
//! assert_eq!(errors.rules(), vec!["reserved-properties"]);
//! ```

use crate::payload::RESERVED_PROPERTIES;
use crate::spec::{non_empty, ClusterSpec};
use crate::version::OpenShiftVersion;
use std::fmt;

/// Accepted values for the instance metadata token requirement.
pub const METADATA_TOKEN_VALUES: [&str; 2] = ["optional", "required"];

/// Oldest version that supports choosing the instance metadata token requirement.
pub const METADATA_TOKEN_MIN_VERSION: OpenShiftVersion = OpenShiftVersion::new(4, 11, 0);

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Name of the rule that failed
    pub rule: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule, self.message)
    }
}

/// All violations found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of the failed rules, in evaluation order.
    pub fn rules(&self) -> Vec<&'static str> {
        self.0.iter().map(|e| e.rule).collect()
    }
}

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "no validation errors"),
            [single] => write!(f, "{single}"),
            all => {
                write!(f, "{} validation errors:", all.len())?;
                for error in all {
                    write!(f, "\n  - {error}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationErrors {}

/// A cross-field invariant over [`ClusterSpec`].
pub trait Rule: Send + Sync {
    /// Stable rule name, used in messages.
    fn name(&self) -> &'static str;

    /// Check the spec, returning the violation if there is one.
    fn check(&self, spec: &ClusterSpec) -> Option<ValidationError>;
}

/// Runs a set of rules over a spec.
pub struct Validator {
    rules: Vec<Box<dyn Rule>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rules.iter().map(|r| r.name())).finish()
    }
}

impl Validator {
    /// Validator with every built-in rule.
    pub fn new() -> Self {
        Self::empty()
            .with_rule(ReservedProperties)
            .with_rule(ProxyRule)
            .with_rule(MetadataToken)
            .with_rule(Autoscaling)
            .with_rule(PrivateLink)
            .with_rule(AvailabilityZones)
    }

    /// Validator with no rules.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Names of the configured rules.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every rule; never stops at the first failure.
    pub fn check(&self, spec: &ClusterSpec) -> ValidationErrors {
        ValidationErrors(self.rules.iter().filter_map(|rule| rule.check(spec)).collect())
    }

    /// Like [`check`](Self::check), as a `Result`.
    pub fn validate(&self, spec: &ClusterSpec) -> Result<(), ValidationErrors> {
        let errors = self.check(spec);
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

// ============================================================================
// Built-in rules
// ============================================================================

/// Controller-owned property keys may not be set by the user.
pub struct ReservedProperties;

impl Rule for ReservedProperties {
    fn name(&self) -> &'static str {
        "reserved-properties"
    }

    fn check(&self, spec: &ClusterSpec) -> Option<ValidationError> {
        let offending: Vec<&str> = RESERVED_PROPERTIES
            .iter()
            .copied()
            .filter(|key| spec.properties.contains_key(*key))
            .collect();
        if offending.is_empty() {
            return None;
        }
        Some(ValidationError::new(
            self.name(),
            format!("properties may not contain reserved keys: {}", offending.join(", ")),
        ))
    }
}

/// A proxy block must set at least one endpoint or a trust bundle.
pub struct ProxyRule;

impl Rule for ProxyRule {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn check(&self, spec: &ClusterSpec) -> Option<ValidationError> {
        let proxy = spec.proxy.as_ref()?;
        proxy.is_empty().then(|| {
            ValidationError::new(
                self.name(),
                "expected at least one of http_proxy, https_proxy or additional_trust_bundle",
            )
        })
    }
}

/// The metadata token requirement needs a known value and a recent enough version.
pub struct MetadataToken;

impl Rule for MetadataToken {
    fn name(&self) -> &'static str {
        "metadata-token"
    }

    fn check(&self, spec: &ClusterSpec) -> Option<ValidationError> {
        let tokens = non_empty(&spec.ec2_metadata_http_tokens)?;
        if !METADATA_TOKEN_VALUES.contains(&tokens) {
            return Some(ValidationError::new(
                self.name(),
                format!(
                    "ec2_metadata_http_tokens must be one of {}, got '{tokens}'",
                    METADATA_TOKEN_VALUES.join(", ")
                ),
            ));
        }

        // Without an explicit version the control plane default is used, which is always newer.
        let requested = non_empty(&spec.version)?;
        match OpenShiftVersion::parse(requested) {
            Some(version) if version.at_least(&METADATA_TOKEN_MIN_VERSION) => None,
            Some(version) => Some(ValidationError::new(
                self.name(),
                format!(
                    "ec2_metadata_http_tokens requires version {METADATA_TOKEN_MIN_VERSION} or later, got {version}"
                ),
            )),
            None => Some(ValidationError::new(
                self.name(),
                format!("cannot check ec2_metadata_http_tokens against unparsable version '{requested}'"),
            )),
        }
    }
}

/// Fixed replicas and autoscaling are exclusive, and bounds must be ordered.
pub struct Autoscaling;

impl Rule for Autoscaling {
    fn name(&self) -> &'static str {
        "autoscaling"
    }

    fn check(&self, spec: &ClusterSpec) -> Option<ValidationError> {
        let bounds = spec.autoscaling?;
        if spec.replicas.is_some() {
            return Some(ValidationError::new(
                self.name(),
                "replicas and autoscaling cannot be set together",
            ));
        }
        (bounds.min_replicas > bounds.max_replicas).then(|| {
            ValidationError::new(
                self.name(),
                format!(
                    "min_replicas ({}) must not exceed max_replicas ({})",
                    bounds.min_replicas, bounds.max_replicas
                ),
            )
        })
    }
}

/// Private link clusters are installed into existing subnets.
pub struct PrivateLink;

impl Rule for PrivateLink {
    fn name(&self) -> &'static str {
        "private-link"
    }

    fn check(&self, spec: &ClusterSpec) -> Option<ValidationError> {
        let has_subnets = spec.aws_subnet_ids.as_ref().is_some_and(|ids| !ids.is_empty());
        (spec.aws_private_link && !has_subnets)
            .then(|| ValidationError::new(self.name(), "aws_private_link requires aws_subnet_ids"))
    }
}

/// Listed zones must match the availability mode.
pub struct AvailabilityZones;

impl Rule for AvailabilityZones {
    fn name(&self) -> &'static str {
        "availability-zones"
    }

    fn check(&self, spec: &ClusterSpec) -> Option<ValidationError> {
        let zones = spec.availability_zones.as_ref().filter(|z| !z.is_empty())?;
        let expected = if spec.multi_az { 3 } else { 1 };
        (zones.len() != expected).then(|| {
            let mode = if spec.multi_az { "multi-AZ" } else { "single-AZ" };
            ValidationError::new(
                self.name(),
                format!(
                    "{mode} clusters need exactly {expected} availability zone(s), got {}",
                    zones.len()
                ),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{AutoscalingSpec, ProxySpec};

    fn spec() -> ClusterSpec {
        ClusterSpec {
            name: "my-cluster".into(),
            cloud_region: "us-west-1".into(),
            aws_account_id: "123".into(),
            ..Default::default()
        }
    }

    fn rules_failed(spec: &ClusterSpec) -> Vec<&'static str> {
        Validator::new().check(spec).rules()
    }

    #[test]
    fn test_valid_spec_passes() {
        assert!(Validator::new().validate(&spec()).is_ok());
    }

    #[test]
    fn test_reserved_property_rejected() {
        let mut spec = spec();
        spec.properties.insert("rosaform_version".into(), "bad".into());
        spec.properties.insert("rosaform_commit".into(), "bad".into());
        spec.properties.insert("mine".into(), "ok".into());

        let errors = Validator::new().check(&spec);
        assert_eq!(errors.rules(), vec!["reserved-properties"]);
        let message = &errors.iter().next().unwrap().message;
        assert!(message.contains("rosaform_version"));
        assert!(message.contains("rosaform_commit"));
        assert!(!message.contains("mine"));
    }

    #[test]
    fn test_empty_proxy_rejected() {
        let mut spec = spec();
        spec.proxy = Some(ProxySpec {
            no_proxy: Some("test1, test2".into()),
            ..Default::default()
        });
        assert_eq!(rules_failed(&spec), vec!["proxy"]);
    }

    #[test]
    fn test_proxy_with_one_field_accepted() {
        for proxy in [
            ProxySpec {
                http_proxy: Some("http://proxy.com".into()),
                ..Default::default()
            },
            ProxySpec {
                https_proxy: Some("https://proxy.com".into()),
                ..Default::default()
            },
            ProxySpec {
                additional_trust_bundle: Some("123".into()),
                ..Default::default()
            },
        ] {
            let mut spec = spec();
            spec.proxy = Some(proxy);
            assert!(Validator::new().validate(&spec).is_ok());
        }
    }

    #[test]
    fn test_metadata_token_version_threshold() {
        let mut spec = spec();
        spec.ec2_metadata_http_tokens = Some("required".into());

        spec.version = Some("openshift-v4.10.1".into());
        assert_eq!(rules_failed(&spec), vec!["metadata-token"]);

        spec.version = Some("openshift-v4.11.0".into());
        assert!(rules_failed(&spec).is_empty());

        spec.version = Some("openshift-v4.12.3".into());
        assert!(rules_failed(&spec).is_empty());

        spec.version = None;
        assert!(rules_failed(&spec).is_empty());
    }

    #[test]
    fn test_metadata_token_unknown_value() {
        let mut spec = spec();
        spec.ec2_metadata_http_tokens = Some("sometimes".into());
        spec.version = Some("openshift-v4.12.0".into());
        assert_eq!(rules_failed(&spec), vec!["metadata-token"]);

        spec.version = None;
        assert_eq!(rules_failed(&spec), vec!["metadata-token"]);
    }

    #[test]
    fn test_metadata_token_unparsable_version() {
        let mut spec = spec();
        spec.ec2_metadata_http_tokens = Some("optional".into());
        spec.version = Some("latest".into());
        assert_eq!(rules_failed(&spec), vec!["metadata-token"]);
    }

    #[test]
    fn test_autoscaling_rules() {
        let mut spec = spec();
        spec.autoscaling = Some(AutoscalingSpec {
            min_replicas: 4,
            max_replicas: 2,
        });
        assert_eq!(rules_failed(&spec), vec!["autoscaling"]);

        spec.autoscaling = Some(AutoscalingSpec {
            min_replicas: 2,
            max_replicas: 4,
        });
        assert!(rules_failed(&spec).is_empty());

        spec.replicas = Some(3);
        assert_eq!(rules_failed(&spec), vec!["autoscaling"]);
    }

    #[test]
    fn test_private_link_needs_subnets() {
        let mut spec = spec();
        spec.aws_private_link = true;
        assert_eq!(rules_failed(&spec), vec!["private-link"]);

        spec.aws_subnet_ids = Some(vec!["id1".into()]);
        assert!(rules_failed(&spec).is_empty());
    }

    #[test]
    fn test_availability_zone_count() {
        let mut spec = spec();
        spec.availability_zones = Some(vec!["us-west-1a".into(), "us-west-1b".into()]);
        assert_eq!(rules_failed(&spec), vec!["availability-zones"]);

        spec.multi_az = true;
        assert_eq!(rules_failed(&spec), vec!["availability-zones"]);

        spec.availability_zones.as_mut().unwrap().push("us-west-1c".into());
        assert!(rules_failed(&spec).is_empty());
    }

    #[test]
    fn test_all_violations_reported() {
        let mut spec = spec();
        spec.properties.insert("rosaform_commit".into(), "x".into());
        spec.proxy = Some(ProxySpec::default());
        spec.ec2_metadata_http_tokens = Some("required".into());
        spec.version = Some("openshift-v4.10.1".into());
        spec.replicas = Some(3);
        spec.autoscaling = Some(AutoscalingSpec {
            min_replicas: 1,
            max_replicas: 2,
        });

        let errors = Validator::new().validate(&spec).unwrap_err();
        assert_eq!(
            errors.rules(),
            vec!["reserved-properties", "proxy", "metadata-token", "autoscaling"]
        );
        assert!(errors.to_string().starts_with("4 validation errors:"));
    }

    #[test]
    fn test_custom_rule() {
        struct NameLength;
        impl Rule for NameLength {
            fn name(&self) -> &'static str {
                "name-length"
            }
            fn check(&self, spec: &ClusterSpec) -> Option<ValidationError> {
                (spec.name.len() > 15).then(|| ValidationError::new(self.name(), "name too long"))
            }
        }

        let validator = Validator::empty().with_rule(NameLength);
        let mut spec = spec();
        assert!(validator.validate(&spec).is_ok());
        spec.name = "a-very-long-cluster-name".into();
        assert_eq!(validator.check(&spec).rules(), vec!["name-length"]);
    }
}
