//! Diff of resources about to be deleted.
//!
//! Every manifest is rendered as YAML and diffed against nothing, producing
//! the same `a/<name>` vs `/dev/null` unified diff `kubectl diff` shows for
//! deletions.

use serde_json::{Map, Value};
use similar::TextDiff;
use thiserror::Error;
use tk_manifest::Manifest;

use super::discovery::gvk_from_api_version;

#[derive(Debug, Error)]
pub enum DiffError {
	#[error("converting {kind}/{name} to YAML")]
	Yaml {
		kind: String,
		name: String,
		#[source]
		source: serde_yaml::Error,
	},
}

/// Fields left out of diffs, matching `kubectl diff --show-managed-fields=false`.
const STRIP_FIELDS: &[&str] = &["managedFields"];

/// Name of a resource in diff headers: `group.version.kind.namespace.name`,
/// the group omitted when empty and the namespace always present.
pub fn display_name(manifest: &Manifest) -> String {
	let gvk = gvk_from_api_version(manifest.api_version(), manifest.kind());
	let group_prefix = if gvk.group.is_empty() {
		String::new()
	} else {
		format!("{}.", gvk.group)
	};
	format!(
		"{}{}.{}.{}.{}",
		group_prefix,
		gvk.version,
		gvk.kind,
		manifest.namespace().unwrap_or(""),
		manifest.name()
	)
}

/// Unified diff removing every manifest, in order.
pub fn static_diff(manifests: &[Manifest]) -> Result<String, DiffError> {
	let mut out = String::new();
	for manifest in manifests {
		out.push_str(&deletion_diff(manifest)?);
	}
	Ok(out)
}

fn deletion_diff(manifest: &Manifest) -> Result<String, DiffError> {
	let current = serde_yaml::to_string(&strip_fields(manifest.as_map())).map_err(|source| DiffError::Yaml {
		kind: manifest.kind().to_string(),
		name: manifest.name().to_string(),
		source,
	})?;

	Ok(TextDiff::from_lines(current.as_str(), "")
		.unified_diff()
		.context_radius(3)
		.header(&format!("a/{}", display_name(manifest)), "/dev/null")
		.to_string())
}

/// Drop [`STRIP_FIELDS`] and empty `metadata.annotations`.
fn strip_fields(object: &Map<String, Value>) -> Value {
	let mut cleaned = Map::new();
	for (key, value) in object {
		if STRIP_FIELDS.contains(&key.as_str()) {
			continue;
		}
		let value = match (key.as_str(), value) {
			("metadata", Value::Object(metadata)) => {
				let mut metadata = metadata.clone();
				metadata.retain(|k, v| {
					!STRIP_FIELDS.contains(&k.as_str())
						&& !(k == "annotations" && v.as_object().is_some_and(Map::is_empty))
				});
				Value::Object(metadata)
			}
			_ => value.clone(),
		};
		cleaned.insert(key.clone(), value);
	}
	Value::Object(cleaned)
}
