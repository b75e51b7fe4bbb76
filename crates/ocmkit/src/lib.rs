//! # ocmkit
//!
//! Blocking client for the OpenShift Cluster Manager `clusters_mgmt/v1` API.
//!
//! The client implements the [`reconcile`] store traits, so it plugs straight
//! into a [`reconcile::LifecycleController`]:
//!
//! ```no_run
//! use ocmkit::OcmClient;
//! use reconcile::{BuildStamp, LifecycleController, SystemClock};
//!
//! let client = OcmClient::new(ocmkit::DEFAULT_API_URL, "my-access-token");
//! let controller = LifecycleController::new(&client, &client, &SystemClock, BuildStamp::new("0.1.0", "dev"));
//! let current = controller.read("1234567890abcdef").unwrap();
//! ```
//!
//! ## Error Mapping
//!
//! | Response                         | Result                         |
//! |----------------------------------|--------------------------------|
//! | 2xx                              | decoded document               |
//! | 404 on a single-cluster `GET`    | `Ok(None)`                     |
//! | 4xx with an error document       | [`Error::Api`] with `reason`   |
//! | 5xx or no answer                 | transport error                |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;

pub use client::{OcmClient, DEFAULT_API_URL, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
