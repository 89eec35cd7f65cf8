//! Environment configuration (`tanka.dev/v1alpha1`) and `spec.json` loading.

use std::{collections::BTreeMap, fmt, fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::jpath::Jpath;

/// API group of environment objects, also used to namespace injected values.
pub const API_GROUP: &str = "tanka.dev";

/// Label stamped on every managed resource, and used to find them again.
pub const LABEL_ENVIRONMENT: &str = "tanka.dev/environment";

/// Annotation that, when `"false"`, keeps the default namespace off a resource.
pub const ANNOTATION_NAMESPACED: &str = "tanka.dev/namespaced";

const SPEC_FILE: &str = "spec.json";

#[derive(Debug, Error)]
pub enum SpecError {
	#[error("reading {}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("parsing {}", .path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
}

/// Environment represents a Tanka environment (tanka.dev/v1alpha1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Environment {
	pub api_version: String,
	pub kind: String,
	pub metadata: Metadata,
	pub spec: Spec,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metadata {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
	pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Spec {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub api_server: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub context_names: Option<Vec<String>>,
	pub namespace: String,
	#[serde(skip_serializing_if = "std::ops::Not::not")]
	pub inject_labels: bool,
	pub resource_defaults: ResourceDefaults,
	pub expect_versions: ExpectVersions,
	/// Fields tkenv doesn't interpret, kept so evaluated code still sees them.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// Metadata applied to every resource of the environment that lacks it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceDefaults {
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub annotations: BTreeMap<String, String>,
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectVersions {
	/// Semantic version constraint on the running tool.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tanka: Option<String>,
}

fn default_namespace() -> String {
	"default".to_string()
}

impl Default for Spec {
	fn default() -> Self {
		Self {
			api_server: None,
			context_names: None,
			namespace: default_namespace(),
			inject_labels: false,
			resource_defaults: ResourceDefaults::default(),
			expect_versions: ExpectVersions::default(),
			extra: Map::new(),
		}
	}
}

impl Environment {
	/// Create a new default environment
	pub fn new() -> Self {
		Self {
			api_version: format!("{API_GROUP}/v1alpha1"),
			kind: "Environment".to_string(),
			metadata: Metadata::default(),
			spec: Spec::default(),
			data: None,
		}
	}

	pub fn name(&self) -> &str {
		self.metadata.name.as_deref().unwrap_or_default()
	}
}

impl Default for Environment {
	fn default() -> Self {
		Self::new()
	}
}

/// Value of the [`LABEL_ENVIRONMENT`] label for this environment.
///
/// The first 48 hex characters of `sha256("<name>:<namespace>")` over the
/// environment metadata, matching Tanka.
pub fn environment_label(env: &Environment) -> String {
	let name = env.metadata.name.as_deref().unwrap_or("");
	let namespace = env.metadata.namespace.as_deref().unwrap_or("");

	let digest = Sha256::digest(format!("{name}:{namespace}").as_bytes());
	let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
	hex[..48].to_string()
}

/// A deprecated `spec.json` field that was still honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deprecation {
	pub old: &'static str,
	pub new: &'static str,
}

impl fmt::Display for Deprecation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "`{}` is deprecated, use `{}` instead", self.old, self.new)
	}
}

/// Result of looking for `spec.json`.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecLookup {
	Found(Environment),
	/// There is no `spec.json`; the environment holds defaults only.
	Missing(Environment),
}

impl SpecLookup {
	pub fn found(self) -> Option<Environment> {
		match self {
			Self::Found(env) => Some(env),
			Self::Missing(_) => None,
		}
	}
}

/// Parse a `spec.json` document.
///
/// Deprecated top-level fields are applied to their replacements and
/// reported back.
pub fn parse(data: &[u8]) -> Result<(Environment, Vec<Deprecation>), serde_json::Error> {
	let mut env: Environment = serde_json::from_slice(data)?;
	let raw: Map<String, Value> = serde_json::from_slice(data)?;

	let mut deprecations = Vec::new();
	if let Some(server) = raw.get("server").and_then(Value::as_str) {
		deprecations.push(Deprecation {
			old: "server",
			new: "spec.apiServer",
		});
		env.spec.api_server = Some(server.to_string());
	}
	if let Some(team) = raw.get("team").and_then(Value::as_str) {
		deprecations.push(Deprecation {
			old: "team",
			new: "metadata.labels.team",
		});
		env.metadata.labels.insert("team".to_string(), team.to_string());
	}

	if let Some(server) = env.spec.api_server.as_mut() {
		if !server.is_empty() && !server.contains("://") {
			*server = format!("https://{server}");
		}
	}

	Ok((env, deprecations))
}

/// Load `spec.json` from the environment base directory.
///
/// The environment is named after the base directory relative to the project
/// root, and namespaced by the entrypoint relative to the root, whatever the
/// file says.
pub fn parse_dir(jpath: &Jpath) -> Result<SpecLookup, SpecError> {
	let path = jpath.base.join(SPEC_FILE);

	let (mut env, found) = match fs::read(&path) {
		Ok(data) => {
			let (env, deprecations) =
				parse(&data).map_err(|source| SpecError::Parse { path, source })?;
			for deprecation in deprecations {
				warn!("{deprecation}");
			}
			(env, true)
		}
		Err(e) if e.kind() == io::ErrorKind::NotFound => (Environment::new(), false),
		Err(source) => return Err(SpecError::Read { path, source }),
	};

	env.metadata.name = Some(jpath.name());
	env.metadata.namespace = Some(jpath.relative_entrypoint());

	Ok(if found {
		SpecLookup::Found(env)
	} else {
		SpecLookup::Missing(env)
	})
}
