//! Kubernetes cluster connection management.

use std::{fmt, time::Duration};

use kube::{
	api::{Api, DeleteParams, DynamicObject, ListParams, PropagationPolicy},
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	core::TypeMeta,
	Client, Config,
};
use thiserror::Error;
use tk_manifest::{List, Manifest};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use super::{
	discovery::{gvk_from_api_version, ApiResourceCache, DiscoveredResource},
	Cluster, ClusterError, Connector, DeleteOpts, ResourceScope,
};
use crate::spec::Spec;

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

const ANNOTATION_LAST_APPLIED: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Field managers whose objects were created by hand rather than by a controller.
const DIRECT_MANAGERS: &[&str] = &["tanka", "kubectl-client-side-apply", "kustomize-controller"];

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("no Kubernetes cluster endpoint specified, set spec.apiServer or spec.contextNames")]
	NoEndpoint,

	#[error("contextNames is empty")]
	EmptyContextNames,

	#[error("no cluster that matches the apiServer `{0}` was found. Please check your $KUBECONFIG")]
	ClusterNotFound(String),

	#[error("no context using cluster `{0}` was found. Please check your $KUBECONFIG")]
	ContextNotFoundForCluster(String),

	#[error("no context named `{0:?}` was found. Please check your $KUBECONFIG")]
	ContextNotFound(Vec<String>),

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// The kubeconfig entry an environment resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
	pub context: String,
	pub cluster: String,
	pub server: String,
}

impl Target {
	pub fn describe(&self) -> String {
		format!(
			"cluster '{}' at '{}', using context '{}'",
			self.cluster, self.server, self.context
		)
	}
}

/// Find the kubeconfig context for an environment.
///
/// `spec.apiServer` wins over `spec.contextNames`:
/// - `spec.apiServer`: a cluster with that server URL, then a context using it
/// - `spec.contextNames`: the first name that exists in kubeconfig
pub fn resolve_target(kubeconfig: &Kubeconfig, spec: &Spec) -> Result<Target, ConnectionError> {
	let context = match (&spec.api_server, &spec.context_names) {
		(Some(api_server), _) if !api_server.is_empty() => {
			let context = find_context_for_api_server(kubeconfig, api_server)?;
			debug!(context = %context, api_server = %api_server, "found context for apiServer");
			context
		}
		(_, Some(names)) if names.is_empty() => return Err(ConnectionError::EmptyContextNames),
		(_, Some(names)) => {
			let context = find_first_matching_context(kubeconfig, names)?;
			debug!(context = %context, "using context from contextNames");
			context
		}
		_ => return Err(ConnectionError::NoEndpoint),
	};

	let cluster = kubeconfig
		.contexts
		.iter()
		.find(|c| c.name == context)
		.and_then(|c| c.context.as_ref())
		.map(|c| c.cluster.clone())
		.unwrap_or_default();
	let server = kubeconfig
		.clusters
		.iter()
		.find(|c| c.name == cluster)
		.and_then(|c| c.cluster.as_ref())
		.and_then(|c| c.server.clone())
		.unwrap_or_default();

	Ok(Target {
		context,
		cluster,
		server,
	})
}

/// Find a kubeconfig context that uses a cluster with the given API server URL.
fn find_context_for_api_server(kubeconfig: &Kubeconfig, api_server: &str) -> Result<String, ConnectionError> {
	let matching_cluster = kubeconfig
		.clusters
		.iter()
		.find(|c| {
			c.cluster
				.as_ref()
				.is_some_and(|cluster| cluster.server.as_deref() == Some(api_server))
		})
		.ok_or_else(|| ConnectionError::ClusterNotFound(api_server.to_string()))?;

	let cluster_name = &matching_cluster.name;

	let matching_context = kubeconfig
		.contexts
		.iter()
		.find(|c| {
			c.context
				.as_ref()
				.is_some_and(|ctx| ctx.cluster.as_str() == cluster_name)
		})
		.ok_or_else(|| ConnectionError::ContextNotFoundForCluster(cluster_name.clone()))?;

	Ok(matching_context.name.clone())
}

/// Find the first context from the list that exists in kubeconfig.
fn find_first_matching_context(kubeconfig: &Kubeconfig, context_names: &[String]) -> Result<String, ConnectionError> {
	context_names
		.iter()
		.find(|name| kubeconfig.contexts.iter().any(|c| &c.name == *name))
		.cloned()
		.ok_or_else(|| ConnectionError::ContextNotFound(context_names.to_vec()))
}

/// Connects through the user's kubeconfig.
#[derive(Debug, Clone, Default)]
pub struct KubeConnector {
	/// Read from the default locations at connect time when unset.
	kubeconfig: Option<Kubeconfig>,
}

impl KubeConnector {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_kubeconfig(kubeconfig: Kubeconfig) -> Self {
		Self {
			kubeconfig: Some(kubeconfig),
		}
	}

	async fn connect_kube(&self, spec: &Spec) -> Result<KubeCluster, ConnectionError> {
		let kubeconfig = match &self.kubeconfig {
			Some(kubeconfig) => kubeconfig.clone(),
			None => Kubeconfig::read()?,
		};
		let target = resolve_target(&kubeconfig, spec)?;

		let mut config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: Some(target.context.clone()),
				..Default::default()
			},
		)
		.await?;
		config.read_timeout = Some(DEFAULT_API_TIMEOUT);
		let client = Client::try_from(config)?;

		Ok(KubeCluster {
			client,
			target,
			api_cache: OnceCell::new(),
		})
	}
}

impl Connector for KubeConnector {
	type Cluster = KubeCluster;

	#[instrument(skip_all)]
	async fn connect(&self, spec: &Spec) -> Result<KubeCluster, ClusterError> {
		Ok(self.connect_kube(spec).await?)
	}
}

/// A cluster reached through kube-rs.
pub struct KubeCluster {
	client: Client,
	target: Target,
	api_cache: OnceCell<ApiResourceCache>,
}

impl fmt::Debug for KubeCluster {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("KubeCluster")
			.field("target", &self.target)
			.finish_non_exhaustive()
	}
}

impl KubeCluster {
	async fn api_cache(&self) -> Result<&ApiResourceCache, ClusterError> {
		self.api_cache
			.get_or_try_init(|| ApiResourceCache::build(&self.client))
			.await
			.map_err(ClusterError::Discovery)
	}

	#[instrument(skip_all, fields(kind = %discovered.api_resource.kind))]
	async fn list_type(&self, discovered: &DiscoveredResource, params: &ListParams) -> List {
		let ar = &discovered.api_resource;
		let api: Api<DynamicObject> = Api::all_with(self.client.clone(), ar);

		let objects = match api.list(params).await {
			Ok(list) => list,
			Err(e) => {
				skip_kind(&ar.kind, &e);
				return List::new();
			}
		};

		let mut live = List::new();
		for mut object in objects {
			if !is_directly_created(&object) {
				debug!(
					name = object.metadata.name.as_deref().unwrap_or_default(),
					"skipping resource not created by tanka or kubectl"
				);
				continue;
			}
			// list responses leave out the type of their items
			object.types = Some(TypeMeta {
				api_version: ar.api_version.clone(),
				kind: ar.kind.clone(),
			});
			let name = format!(
				"{}/{}",
				ar.kind,
				object.metadata.name.as_deref().unwrap_or_default()
			);
			match serde_json::to_value(&object)
				.ok()
				.and_then(|value| Manifest::new(value, name).ok())
			{
				Some(manifest) => live.push(manifest),
				None => debug!("skipping unreadable object"),
			}
		}
		live
	}
}

/// Kinds that fail to list are left out of the live set, loudly enough that an
/// unreachable API server doesn't pass for an empty one.
fn skip_kind(kind: &str, error: &dyn fmt::Display) {
	warn!(kind, error = %error, "skipping resource type that could not be listed");
}

/// Whether a live object was created by Tanka or kubectl, rather than by a
/// controller from another object.
fn is_directly_created(resource: &DynamicObject) -> bool {
	if resource
		.metadata
		.annotations
		.as_ref()
		.is_some_and(|a| a.contains_key(ANNOTATION_LAST_APPLIED))
	{
		return true;
	}

	resource.metadata.managed_fields.as_ref().is_some_and(|fields| {
		fields.iter().any(|f| {
			f.manager
				.as_ref()
				.is_some_and(|m| DIRECT_MANAGERS.contains(&m.as_str()))
		})
	})
}

impl Cluster for KubeCluster {
	fn info(&self) -> String {
		self.target.describe()
	}

	#[instrument(skip(self))]
	async fn list_labeled(&self, selector: &str) -> Result<List, ClusterError> {
		let cache = self.api_cache().await?;
		let params = ListParams::default().labels(selector);

		let mut live = List::new();
		for discovered in cache.listable() {
			live.extend(self.list_type(discovered, &params).await);
		}
		debug!(count = live.len(), "listed live objects");
		Ok(live)
	}

	#[instrument(skip_all, fields(count = manifests.len(), force = opts.force))]
	async fn delete(&self, manifests: &[Manifest], opts: DeleteOpts) -> Result<(), ClusterError> {
		let cache = self.api_cache().await?;
		let params = DeleteParams {
			grace_period_seconds: opts.force.then_some(0),
			propagation_policy: Some(PropagationPolicy::Background),
			..DeleteParams::default()
		};

		for manifest in manifests {
			let gvk = gvk_from_api_version(manifest.api_version(), manifest.kind());
			let discovered = cache.lookup(&gvk).ok_or_else(|| ClusterError::UnknownResource {
				api_version: manifest.api_version().to_string(),
				kind: manifest.kind().to_string(),
			})?;

			let api: Api<DynamicObject> = match (discovered.scope, manifest.namespace()) {
				(ResourceScope::Namespaced, Some(ns)) => {
					Api::namespaced_with(self.client.clone(), ns, &discovered.api_resource)
				}
				(ResourceScope::Namespaced, None) => {
					Api::default_namespaced_with(self.client.clone(), &discovered.api_resource)
				}
				(ResourceScope::ClusterWide, _) => Api::all_with(self.client.clone(), &discovered.api_resource),
			};

			api.delete(manifest.name(), &params)
				.await
				.map_err(|e| ClusterError::Delete {
					kind: manifest.kind().to_string(),
					name: manifest.name().to_string(),
					source: Box::new(e),
				})?;
			debug!(kind = manifest.kind(), name = manifest.name(), "deleted");
		}
		Ok(())
	}

	fn close(&mut self) {
		debug!(cluster = %self.target.cluster, "closing cluster connection");
	}
}

#[cfg(test)]
mod tests {
	use std::{
		io::{self, Write},
		sync::{Arc, Mutex},
	};

	use assert_matches::assert_matches;
	use indoc::indoc;
	use tracing_subscriber::fmt::MakeWriter;

	use super::*;

	#[derive(Clone, Default)]
	struct Captured(Arc<Mutex<Vec<u8>>>);

	impl Write for Captured {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			self.0.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	impl<'a> MakeWriter<'a> for Captured {
		type Writer = Self;

		fn make_writer(&'a self) -> Self {
			self.clone()
		}
	}

	#[test]
	fn test_unlistable_kind_is_a_warning() {
		let captured = Captured::default();
		let subscriber = tracing_subscriber::fmt()
			.with_writer(captured.clone())
			.with_ansi(false)
			.with_max_level(tracing::Level::WARN)
			.finish();

		tracing::subscriber::with_default(subscriber, || {
			skip_kind("Secret", &"secrets is forbidden: User \"ci\" cannot list resource");
		});

		let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
		assert!(logged.contains("WARN"), "{logged}");
		assert!(logged.contains("kind=\"Secret\""), "{logged}");
		assert!(logged.contains("secrets is forbidden"), "{logged}");
	}

	fn kubeconfig() -> Kubeconfig {
		Kubeconfig::from_yaml(indoc! {"
			apiVersion: v1
			kind: Config
			clusters:
			  - name: dev-cluster
			    cluster:
			      server: https://dev.example.com:6443
			  - name: prod-cluster
			    cluster:
			      server: https://prod.example.com:6443
			contexts:
			  - name: dev
			    context:
			      cluster: dev-cluster
			      user: admin
			  - name: prod
			    context:
			      cluster: prod-cluster
			      user: admin
			users:
			  - name: admin
			    user:
			      token: secret
		"})
		.unwrap()
	}

	#[test]
	fn test_resolve_by_api_server() {
		let spec = Spec {
			api_server: Some("https://prod.example.com:6443".to_string()),
			..Spec::default()
		};
		let target = resolve_target(&kubeconfig(), &spec).unwrap();
		assert_eq!(
			target,
			Target {
				context: "prod".to_string(),
				cluster: "prod-cluster".to_string(),
				server: "https://prod.example.com:6443".to_string(),
			}
		);
		assert_eq!(
			target.describe(),
			"cluster 'prod-cluster' at 'https://prod.example.com:6443', using context 'prod'"
		);
	}

	#[test]
	fn test_resolve_by_context_names_takes_first_existing() {
		let spec = Spec {
			context_names: Some(vec!["staging".to_string(), "dev".to_string(), "prod".to_string()]),
			..Spec::default()
		};
		let target = resolve_target(&kubeconfig(), &spec).unwrap();
		assert_eq!(target.context, "dev");
		assert_eq!(target.server, "https://dev.example.com:6443");
	}

	#[test]
	fn test_resolve_no_endpoint() {
		assert_matches!(
			resolve_target(&kubeconfig(), &Spec::default()),
			Err(ConnectionError::NoEndpoint)
		);
	}

	#[test]
	fn test_resolve_empty_context_names() {
		let spec = Spec {
			context_names: Some(vec![]),
			..Spec::default()
		};
		assert_matches!(
			resolve_target(&kubeconfig(), &spec),
			Err(ConnectionError::EmptyContextNames)
		);
	}

	#[test]
	fn test_resolve_context_not_found() {
		let spec = Spec {
			context_names: Some(vec!["nonexistent".to_string()]),
			..Spec::default()
		};
		assert_matches!(
			resolve_target(&kubeconfig(), &spec),
			Err(ConnectionError::ContextNotFound(contexts)) if contexts == vec!["nonexistent"]
		);
	}

	#[test]
	fn test_resolve_api_server_not_found() {
		let spec = Spec {
			api_server: Some("https://unknown:6443".to_string()),
			..Spec::default()
		};
		assert_matches!(
			resolve_target(&kubeconfig(), &spec),
			Err(ConnectionError::ClusterNotFound(server)) if server == "https://unknown:6443"
		);
	}

	#[tokio::test]
	async fn test_connect_without_endpoint_fails() {
		let connector = KubeConnector::with_kubeconfig(Kubeconfig::default());
		let result = connector.connect(&Spec::default()).await;
		assert_matches!(result, Err(ClusterError::Connection(ConnectionError::NoEndpoint)));
	}

	#[test]
	fn test_is_directly_created() {
		let applied: DynamicObject = serde_json::from_value(serde_json::json!({
			"apiVersion": "v1",
			"kind": "ConfigMap",
			"metadata": {
				"name": "a",
				"annotations": { "kubectl.kubernetes.io/last-applied-configuration": "{}" },
			},
		}))
		.unwrap();
		let server_side: DynamicObject = serde_json::from_value(serde_json::json!({
			"apiVersion": "v1",
			"kind": "ConfigMap",
			"metadata": { "name": "b", "managedFields": [{ "manager": "tanka" }] },
		}))
		.unwrap();
		let controlled: DynamicObject = serde_json::from_value(serde_json::json!({
			"apiVersion": "v1",
			"kind": "Pod",
			"metadata": { "name": "c", "managedFields": [{ "manager": "kube-controller-manager" }] },
		}))
		.unwrap();

		assert!(is_directly_created(&applied));
		assert!(is_directly_created(&server_side));
		assert!(!is_directly_created(&controlled));
	}
}
