//! Tanka environment extraction and prune reconciliation.
//!
//! Jsonnet is evaluated by an external binary ([`eval`]), the result is
//! classified into environments ([`extract`]) and turned into Kubernetes
//! manifests ([`load`]). [`prune`] deletes what a cluster still holds for an
//! environment but the environment no longer declares.

pub mod commands;
pub mod config;
pub mod error;
pub mod eval;
pub mod extract;
pub mod jpath;
pub mod k8s;
pub mod load;
pub mod prompt;
pub mod prune;
pub mod spec;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod version;

pub use error::{Error, ErrorKind};
