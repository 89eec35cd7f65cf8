use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered list of manifests, in the order they were found.
pub type List = Vec<Manifest>;

/// A single Kubernetes object.
///
/// Construction verifies the fields Kubernetes needs to address the object:
/// string `apiVersion` and `kind`, and for anything that is not a `*List`,
/// `metadata.name` (or `metadata.generateName`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Map<String, Value>);

/// Identity of a manifest within a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManifestKey {
	pub api_version: String,
	pub kind: String,
	/// `None` for objects without a namespace (cluster-scoped or not yet defaulted).
	pub namespace: Option<String>,
	pub name: String,
}

impl ManifestKey {
	/// Same key with the namespace dropped.
	pub fn without_namespace(&self) -> Self {
		Self {
			namespace: None,
			..self.clone()
		}
	}
}

impl fmt::Display for ManifestKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}.{}.{}.{}",
			self.namespace.as_deref().unwrap_or(""),
			self.api_version,
			self.kind,
			self.name
		)
	}
}

/// A value looked like a Kubernetes object but lacks required fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Kubernetes resource `{name}` has missing or invalid fields:{}", bullet_list(.fields))]
pub struct SchemaError {
	/// Where the object was found, e.g. `.deployment` or `.list.items[0]`.
	pub name: String,
	pub fields: Vec<&'static str>,
}

fn bullet_list(fields: &[&str]) -> String {
	fields.iter().map(|f| format!("\n  - `{f}`")).collect()
}

impl Manifest {
	/// Verify and wrap a JSON value.
	pub fn new(value: Value, name: impl Into<String>) -> Result<Self, SchemaError> {
		let Value::Object(obj) = value else {
			return Err(SchemaError {
				name: name.into(),
				fields: vec!["apiVersion", "kind", "metadata"],
			});
		};

		let fields = missing_fields(&obj);
		if fields.is_empty() {
			Ok(Self(obj))
		} else {
			Err(SchemaError {
				name: name.into(),
				fields,
			})
		}
	}

	pub fn api_version(&self) -> &str {
		self.str_field("apiVersion").unwrap_or_default()
	}

	pub fn kind(&self) -> &str {
		self.str_field("kind").unwrap_or_default()
	}

	/// `metadata.name`, falling back to `metadata.generateName`.
	pub fn name(&self) -> &str {
		self.metadata()
			.and_then(|m| {
				m.get("name")
					.and_then(Value::as_str)
					.or_else(|| m.get("generateName").and_then(Value::as_str))
			})
			.unwrap_or_default()
	}

	/// `metadata.namespace`, if set and non-empty.
	pub fn namespace(&self) -> Option<&str> {
		self.metadata()
			.and_then(|m| m.get("namespace"))
			.and_then(Value::as_str)
			.filter(|ns| !ns.is_empty())
	}

	pub fn set_namespace(&mut self, namespace: &str) {
		self.metadata_mut().insert(
			"namespace".to_string(),
			Value::String(namespace.to_string()),
		);
	}

	pub fn label(&self, key: &str) -> Option<&str> {
		self.metadata_str_map("labels", key)
	}

	pub fn annotation(&self, key: &str) -> Option<&str> {
		self.metadata_str_map("annotations", key)
	}

	/// `metadata.labels`, created when missing or not an object.
	pub fn labels_mut(&mut self) -> &mut Map<String, Value> {
		self.metadata_child_mut("labels")
	}

	/// `metadata.annotations`, created when missing or not an object.
	pub fn annotations_mut(&mut self) -> &mut Map<String, Value> {
		self.metadata_child_mut("annotations")
	}

	/// `<kind>/<name>`, the string target expressions are matched against.
	pub fn kind_name(&self) -> String {
		format!("{}/{}", self.kind(), self.name())
	}

	pub fn key(&self) -> ManifestKey {
		ManifestKey {
			api_version: self.api_version().to_string(),
			kind: self.kind().to_string(),
			namespace: self.namespace().map(str::to_string),
			name: self.name().to_string(),
		}
	}

	/// Whether this is a container like `ConfigMapList` holding `items`.
	pub fn is_list(&self) -> bool {
		is_list(&self.0)
	}

	/// Members of a `*List`, if this is one.
	pub fn items(&self) -> Option<&[Value]> {
		if !self.is_list() {
			return None;
		}
		self.0
			.get("items")
			.and_then(Value::as_array)
			.map(Vec::as_slice)
	}

	pub fn as_map(&self) -> &Map<String, Value> {
		&self.0
	}

	pub fn into_value(self) -> Value {
		Value::Object(self.0)
	}

	fn str_field(&self, key: &str) -> Option<&str> {
		self.0.get(key).and_then(Value::as_str)
	}

	fn metadata(&self) -> Option<&Map<String, Value>> {
		self.0.get("metadata").and_then(Value::as_object)
	}

	fn metadata_str_map(&self, map: &str, key: &str) -> Option<&str> {
		self.metadata()
			.and_then(|m| m.get(map))
			.and_then(Value::as_object)
			.and_then(|m| m.get(key))
			.and_then(Value::as_str)
	}

	fn metadata_mut(&mut self) -> &mut Map<String, Value> {
		object_entry(&mut self.0, "metadata")
	}

	fn metadata_child_mut(&mut self, key: &str) -> &mut Map<String, Value> {
		object_entry(self.metadata_mut(), key)
	}
}

fn object_entry<'a>(parent: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
	let entry = parent
		.entry(key.to_string())
		.or_insert_with(|| Value::Object(Map::new()));
	if !entry.is_object() {
		*entry = Value::Object(Map::new());
	}
	match entry {
		Value::Object(map) => map,
		_ => unreachable!("non-objects are replaced above"),
	}
}

fn is_list(obj: &Map<String, Value>) -> bool {
	obj.get("kind")
		.and_then(Value::as_str)
		.is_some_and(|kind| kind.ends_with("List"))
		&& obj.get("items").is_some_and(Value::is_array)
}

fn missing_fields(obj: &Map<String, Value>) -> Vec<&'static str> {
	let mut fields = Vec::new();
	if !obj.get("apiVersion").is_some_and(Value::is_string) {
		fields.push("apiVersion");
	}
	if !obj.get("kind").is_some_and(Value::is_string) {
		fields.push("kind");
	}

	// Lists don't carry metadata
	if is_list(obj) {
		return fields;
	}

	match obj.get("metadata") {
		Some(Value::Object(metadata)) => {
			let named = metadata.get("name").is_some_and(Value::is_string)
				|| metadata.get("generateName").is_some_and(Value::is_string);
			if !named {
				fields.push("metadata.name");
			}
		}
		_ => {
			fields.push("metadata");
			fields.push("metadata.name");
		}
	}
	fields
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use rstest::rstest;
	use serde_json::json;

	use super::*;

	fn configmap() -> Manifest {
		Manifest::new(
			json!({
				"apiVersion": "v1",
				"kind": "ConfigMap",
				"metadata": { "name": "config", "namespace": "apps" }
			}),
			".cm",
		)
		.unwrap()
	}

	#[test]
	fn test_accessors() {
		let m = configmap();
		assert_eq!(m.api_version(), "v1");
		assert_eq!(m.kind(), "ConfigMap");
		assert_eq!(m.name(), "config");
		assert_eq!(m.namespace(), Some("apps"));
		assert_eq!(m.kind_name(), "ConfigMap/config");
		assert_eq!(
			m.key(),
			ManifestKey {
				api_version: "v1".to_string(),
				kind: "ConfigMap".to_string(),
				namespace: Some("apps".to_string()),
				name: "config".to_string(),
			}
		);
	}

	#[test]
	fn test_generate_name_counts_as_name() {
		let m = Manifest::new(
			json!({
				"apiVersion": "batch/v1",
				"kind": "Job",
				"metadata": { "generateName": "migrate-" }
			}),
			".job",
		)
		.unwrap();
		assert_eq!(m.name(), "migrate-");
	}

	#[rstest]
	#[case::no_name(json!({"apiVersion": "v1", "kind": "Service", "metadata": {}}), vec!["metadata.name"])]
	#[case::no_metadata(json!({"apiVersion": "v1", "kind": "Service"}), vec!["metadata", "metadata.name"])]
	#[case::numeric_kind(json!({"apiVersion": "v1", "kind": 3, "metadata": {"name": "x"}}), vec!["kind"])]
	#[case::not_an_object(json!("v1"), vec!["apiVersion", "kind", "metadata"])]
	fn test_schema_errors(#[case] value: Value, #[case] expected: Vec<&'static str>) {
		let err = Manifest::new(value, ".svc").unwrap_err();
		assert_eq!(err.fields, expected);
		assert_eq!(err.name, ".svc");
	}

	#[test]
	fn test_list_needs_no_metadata() {
		let m = Manifest::new(
			json!({ "apiVersion": "v1", "kind": "List", "items": [] }),
			".list",
		);
		assert_matches!(m, Ok(ref list) if list.is_list() && list.items() == Some(&[][..]));
	}

	#[test]
	fn test_labels_mut_creates_metadata_maps() {
		let mut m = configmap();
		m.labels_mut()
			.insert("team".to_string(), Value::String("infra".to_string()));
		m.annotations_mut()
			.insert("note".to_string(), Value::String("x".to_string()));

		assert_eq!(m.label("team"), Some("infra"));
		assert_eq!(m.annotation("note"), Some("x"));
	}

	#[test]
	fn test_empty_namespace_is_none() {
		let mut m = configmap();
		m.set_namespace("");
		assert_eq!(m.namespace(), None);
		assert_eq!(m.key().namespace, None);
	}

	#[test]
	fn test_schema_error_message() {
		let err = SchemaError {
			name: ".svc".to_string(),
			fields: vec!["kind", "metadata.name"],
		};
		assert_eq!(
			err.to_string(),
			"Kubernetes resource `.svc` has missing or invalid fields:\n  - `kind`\n  - `metadata.name`"
		);
	}
}
