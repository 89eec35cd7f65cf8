//! Kubernetes API resource discovery and caching.
//!
//! The cluster's discovery API is queried once per connection; lookups by
//! apiVersion and kind are served from the cache afterwards.

use std::collections::{HashMap, HashSet};

use kube::{
	core::GroupVersionKind,
	discovery::{verbs, ApiCapabilities, ApiResource, Scope},
	Client, Discovery,
};
use tracing::instrument;

use super::ResourceScope;

/// Create a GroupVersionKind from an apiVersion string and kind.
pub fn gvk_from_api_version(api_version: &str, kind: &str) -> GroupVersionKind {
	let (group, version) = match api_version.split_once('/') {
		Some((g, v)) => (g, v),
		None => ("", api_version),
	};
	GroupVersionKind::gvk(group, version, kind)
}

fn gvk_from_api_resource(ar: &ApiResource) -> GroupVersionKind {
	GroupVersionKind::gvk(&ar.group, &ar.version, &ar.kind)
}

/// Discovered API resource with scope and capabilities.
#[derive(Debug, Clone)]
pub struct DiscoveredResource {
	/// The kube ApiResource for making API calls.
	pub api_resource: ApiResource,
	/// Whether this resource is namespaced or cluster-wide.
	pub scope: ResourceScope,
	/// API capabilities (verbs, subresources, etc.)
	pub capabilities: ApiCapabilities,
	/// Served at the group's preferred version.
	pub recommended: bool,
}

impl DiscoveredResource {
	pub fn supports(&self, verb: &str) -> bool {
		self.capabilities.supports_operation(verb)
	}
}

/// Cached API resource discovery results.
#[derive(Debug, Clone, Default)]
pub struct ApiResourceCache {
	resources: HashMap<GroupVersionKind, DiscoveredResource>,
}

impl ApiResourceCache {
	/// Build the cache by querying the cluster's discovery API.
	///
	/// Uses the Aggregated Discovery API (K8s 1.26+) and falls back to full
	/// discovery on older clusters.
	#[instrument(skip_all)]
	pub async fn build(client: &Client) -> Result<Self, kube::Error> {
		match Discovery::new(client.clone()).run_aggregated().await {
			Ok(discovery) => {
				tracing::debug!("using aggregated discovery");
				Ok(Self::from_discovery(&discovery))
			}
			Err(e) => {
				tracing::debug!(error = %e, "aggregated discovery not available, using full discovery");
				let discovery = Discovery::new(client.clone()).run().await?;
				Ok(Self::from_discovery(&discovery))
			}
		}
	}

	fn from_discovery(discovery: &Discovery) -> Self {
		let mut cache = Self::default();

		for group in discovery.groups() {
			let versions = group
				.versions()
				.map(|ver| (ver.to_string(), group.versioned_resources(ver)))
				.collect();
			cache.insert_group(group.preferred_version_or_latest(), versions);
		}

		cache
	}

	/// Add every version of one API group, in the group's priority order.
	///
	/// Every version is kept so manifests on older API versions resolve. Each
	/// kind is recommended once: at `preferred` when served there, otherwise at
	/// the first version serving it, as `ApiGroup::recommended_resources` picks.
	fn insert_group(&mut self, preferred: &str, versions: Vec<(String, Vec<(ApiResource, ApiCapabilities)>)>) {
		let (preferred, rest): (Vec<_>, Vec<_>) = versions.into_iter().partition(|(ver, _)| ver == preferred);

		let mut seen = HashSet::new();
		for (_, resources) in preferred.into_iter().chain(rest) {
			for (ar, caps) in resources {
				let recommended = seen.insert(ar.kind.clone());
				self.insert(ar, caps, recommended);
			}
		}
	}

	fn insert(&mut self, api_resource: ApiResource, capabilities: ApiCapabilities, recommended: bool) {
		let scope = match capabilities.scope {
			Scope::Namespaced => ResourceScope::Namespaced,
			Scope::Cluster => ResourceScope::ClusterWide,
		};
		self.resources.insert(
			gvk_from_api_resource(&api_resource),
			DiscoveredResource {
				api_resource,
				scope,
				capabilities,
				recommended,
			},
		);
	}

	/// Look up a resource by its GroupVersionKind.
	pub fn lookup(&self, gvk: &GroupVersionKind) -> Option<&DiscoveredResource> {
		self.resources.get(gvk)
	}

	/// Resources to search for live objects: one version per kind, and only
	/// kinds that can be listed. Sorted by group, version and kind.
	pub fn listable(&self) -> Vec<&DiscoveredResource> {
		let mut listable: Vec<_> = self
			.resources
			.values()
			.filter(|r| r.recommended && r.supports(verbs::LIST))
			.collect();
		listable.sort_by(|a, b| {
			let (a, b) = (&a.api_resource, &b.api_resource);
			(&a.group, &a.version, &a.kind).cmp(&(&b.group, &b.version, &b.kind))
		});
		listable
	}
}
