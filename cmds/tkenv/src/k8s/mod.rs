//! Kubernetes cluster access for prune.
//!
//! The prune workflow only talks to a cluster through [`Connector`] and
//! [`Cluster`]; [`client`] implements both on top of kube-rs.

pub mod client;
pub mod diff;
pub mod discovery;
pub mod output;

use std::{
	io,
	ops::{Deref, DerefMut},
};

use thiserror::Error;
use tk_manifest::{List, Manifest};

pub use self::{client::ConnectionError, diff::DiffError};
use crate::spec::Spec;

/// Kubernetes API resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
	/// Resource is namespaced (e.g., Deployment, ConfigMap).
	Namespaced,

	/// Resource is cluster-wide (e.g., Namespace, ClusterRole).
	ClusterWide,
}

#[derive(Debug, Error)]
pub enum ClusterError {
	#[error(transparent)]
	Connection(#[from] ConnectionError),

	#[error("discovering API resources")]
	Discovery(#[source] kube::Error),

	#[error("deleting {kind}/{name}")]
	Delete {
		kind: String,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("unknown resource type: {api_version}/{kind}")]
	UnknownResource { api_version: String, kind: String },

	#[error(transparent)]
	Diff(#[from] DiffError),

	#[error(transparent)]
	Io(#[from] io::Error),
}

/// Options for deleting resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOpts {
	/// Skip graceful deletion.
	pub force: bool,
}

/// A connected cluster.
#[allow(async_fn_in_trait)]
pub trait Cluster {
	/// Human readable description of where this cluster is, for prompts.
	fn info(&self) -> String;

	/// Every live object carrying the label selector, across all resource kinds.
	async fn list_labeled(&self, selector: &str) -> Result<List, ClusterError>;

	/// Diff showing the removal of `manifests`.
	fn diff_deleted(&self, manifests: &[Manifest]) -> Result<String, ClusterError> {
		Ok(diff::static_diff(manifests)?)
	}

	async fn delete(&self, manifests: &[Manifest], opts: DeleteOpts) -> Result<(), ClusterError>;

	/// Release the connection. Called exactly once, by [`Connection`].
	fn close(&mut self);
}

/// Opens connections to the cluster an environment points at.
#[allow(async_fn_in_trait)]
pub trait Connector {
	type Cluster: Cluster;

	async fn connect(&self, spec: &Spec) -> Result<Self::Cluster, ClusterError>;
}

/// Closes the cluster when dropped.
#[derive(Debug)]
pub struct Connection<C: Cluster> {
	cluster: C,
}

impl<C: Cluster> Connection<C> {
	pub fn new(cluster: C) -> Self {
		Self { cluster }
	}
}

impl<C: Cluster> Deref for Connection<C> {
	type Target = C;

	fn deref(&self) -> &C {
		&self.cluster
	}
}

impl<C: Cluster> DerefMut for Connection<C> {
	fn deref_mut(&mut self) -> &mut C {
		&mut self.cluster
	}
}

impl<C: Cluster> Drop for Connection<C> {
	fn drop(&mut self) {
		self.cluster.close();
	}
}
