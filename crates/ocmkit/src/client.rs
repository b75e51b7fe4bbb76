//! HTTP client for the `clusters_mgmt/v1` API.
//!
//! [`OcmClient`] implements [`ClusterStore`] and [`VersionSource`] so the
//! reconciliation core can drive a real control plane.
//!
//! # Example
//!
//! ```no_run
//! use ocmkit::OcmClient;
//! use reconcile::VersionCatalog;
//!
//! let client = OcmClient::new("https://api.openshift.com", "my-access-token");
//! let catalog = VersionCatalog::fetch(&client).unwrap();
//! println!("Found {} versions", catalog.len());
//! ```

use crate::error::{Error, Result};
use log::debug;
use reconcile::{ChangeSet, ClusterDocument, ClusterStore, StoreError, VersionPage, VersionSource};
use serde::de::DeserializeOwned;
use std::time::Duration;
use ureq::Body;
use ureq::http::Response;

/// Default control plane URL.
pub const DEFAULT_API_URL: &str = "https://api.openshift.com";

/// Default timeout for a single request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const CLUSTERS_PATH: &str = "/api/clusters_mgmt/v1/clusters";
const VERSIONS_PATH: &str = "/api/clusters_mgmt/v1/versions";
const ENABLED_VERSIONS: &str = "enabled = 't'";
const USER_AGENT: &str = concat!("ocmkit/", env!("CARGO_PKG_VERSION"));

/// Blocking client for the cluster management API.
pub struct OcmClient {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// API base URL without trailing slash.
    api_base: String,
    /// Bearer access token.
    token: String,
}

impl OcmClient {
    /// Create a client with the default timeout.
    #[must_use]
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_timeout(api_base, token, DEFAULT_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`.
    #[must_use]
    pub fn with_timeout(api_base: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        let api_base: String = api_base.into();
        Self {
            agent: config.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Get the current API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// URL of the cluster collection.
    fn clusters_url(&self) -> String {
        format!("{}{CLUSTERS_PATH}", self.api_base)
    }

    /// URL of a single cluster.
    fn cluster_url(&self, id: &str) -> String {
        format!("{}{CLUSTERS_PATH}/{id}", self.api_base)
    }

    /// URL of the version collection.
    fn versions_url(&self) -> String {
        format!("{}{VERSIONS_PATH}", self.api_base)
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// List one page of enabled versions.
    pub fn versions(&self, page: u32, size: u32) -> Result<VersionPage> {
        let url = self.versions_url();
        debug!("GET {url} page={page} size={size}");
        let response = self
            .agent
            .get(&url)
            .header("Authorization", self.authorization())
            .header("User-Agent", USER_AGENT)
            .query("page", page.to_string())
            .query("size", size.to_string())
            .query("search", ENABLED_VERSIONS)
            .call()?;
        read_json(success(response)?)
    }

    /// Create a cluster.
    pub fn create_cluster(&self, document: &ClusterDocument) -> Result<ClusterDocument> {
        let url = self.clusters_url();
        debug!("POST {url}");
        let response = self
            .agent
            .post(&url)
            .header("Authorization", self.authorization())
            .header("User-Agent", USER_AGENT)
            .send_json(document)?;
        read_json(success(response)?)
    }

    /// Fetch a cluster, or `None` when the API reports it as not found.
    pub fn get_cluster(&self, id: &str) -> Result<Option<ClusterDocument>> {
        let url = self.cluster_url(id);
        debug!("GET {url}");
        let response = self
            .agent
            .get(&url)
            .header("Authorization", self.authorization())
            .header("User-Agent", USER_AGENT)
            .call()?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        read_json(success(response)?).map(Some)
    }

    /// Patch a cluster with the merge-patch rendering of `changes`.
    pub fn patch_cluster(&self, id: &str, changes: &ChangeSet) -> Result<ClusterDocument> {
        let url = self.cluster_url(id);
        debug!("PATCH {url} ({} edits)", changes.len());
        let response = self
            .agent
            .patch(&url)
            .header("Authorization", self.authorization())
            .header("User-Agent", USER_AGENT)
            .send_json(changes.to_merge_patch())?;
        let response = success(response)?;

        // Some deployments answer a patch with 204 and no body.
        if response.status().as_u16() == 204 {
            return self
                .get_cluster(id)?
                .ok_or_else(|| Error::InvalidResponse(format!("cluster {id} vanished after patch")));
        }
        read_json(response)
    }

    /// Request deletion of a cluster.
    pub fn delete_cluster(&self, id: &str) -> Result<()> {
        let url = self.cluster_url(id);
        debug!("DELETE {url}");
        let response = self
            .agent
            .delete(&url)
            .header("Authorization", self.authorization())
            .header("User-Agent", USER_AGENT)
            .call()?;
        success(response).map(drop)
    }
}

/// Pass success responses through; turn anything else into an [`Error`].
fn success(mut response: Response<Body>) -> Result<Response<Body>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.body_mut().read_to_string().unwrap_or_default();
    debug!("HTTP {} response: {body}", status.as_u16());
    Err(Error::from_response(status.as_u16(), &body))
}

fn read_json<T: DeserializeOwned>(mut response: Response<Body>) -> Result<T> {
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|e| Error::Transport(e.to_string()))?;
    Ok(serde_json::from_str(&text)?)
}

impl ClusterStore for OcmClient {
    fn create(&self, document: &ClusterDocument) -> std::result::Result<ClusterDocument, StoreError> {
        Ok(self.create_cluster(document)?)
    }

    fn fetch(&self, id: &str) -> std::result::Result<Option<ClusterDocument>, StoreError> {
        Ok(self.get_cluster(id)?)
    }

    fn patch(&self, id: &str, changes: &ChangeSet) -> std::result::Result<ClusterDocument, StoreError> {
        Ok(self.patch_cluster(id, changes)?)
    }

    fn delete(&self, id: &str) -> std::result::Result<(), StoreError> {
        Ok(self.delete_cluster(id)?)
    }
}

impl VersionSource for OcmClient {
    fn list_versions(&self, page: u32, size: u32) -> std::result::Result<VersionPage, StoreError> {
        Ok(self.versions(page, size)?)
    }
}
