use serde_json::{Map, Value};

use crate::{Manifest, SchemaError};

/// Manifests keyed by the path they were found at, in traversal order.
pub type Extracted = Vec<(String, Manifest)>;

/// The walk ended on a scalar instead of an object.
///
/// Jsonnet output that is not (a tree of) Kubernetes objects produces this,
/// so callers may treat it as "plain data" rather than a hard failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("recursion did not resolve in a valid Kubernetes object. In path `{path}` found key `{key}` of type `{kind}` instead.")]
pub struct PrimitiveReached {
	/// Path of the parent value.
	pub path: String,
	/// Field name or `[index]` holding the scalar.
	pub key: String,
	/// JSON type of the scalar.
	pub kind: &'static str,
	root: bool,
}

impl PrimitiveReached {
	/// Whether the whole evaluated value is a scalar.
	pub fn is_root(&self) -> bool {
		self.root
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
	#[error(transparent)]
	PrimitiveReached(#[from] PrimitiveReached),
	#[error(transparent)]
	Schema(#[from] SchemaError),
	#[error("`{path}` is a {kind} but its `items` are not objects")]
	ListItem { path: String, kind: String },
}

/// Collect everything that looks like a Kubernetes object.
///
/// An object having both `apiVersion` and `kind` is taken as a manifest and
/// not descended into. Other objects and arrays are walked; `null` fields are
/// skipped.
pub fn extract(data: &Value) -> Result<Extracted, ExtractError> {
	let mut out = Vec::new();
	walk(data, &mut Vec::new(), &mut out)?;
	Ok(out)
}

/// Replace every `*List` entry with its items, recursively.
///
/// Items are named `<list path>.items[<index>]` and take the list's place.
pub fn unwrap(extracted: &mut Extracted) -> Result<(), ExtractError> {
	let mut out = Vec::with_capacity(extracted.len());
	for (path, manifest) in extracted.drain(..) {
		unwrap_into(path, manifest, &mut out)?;
	}
	*extracted = out;
	Ok(())
}

fn unwrap_into(path: String, manifest: Manifest, out: &mut Extracted) -> Result<(), ExtractError> {
	let Some(items) = manifest.items() else {
		out.push((path, manifest));
		return Ok(());
	};
	for (index, item) in items.iter().enumerate() {
		if !item.is_object() {
			return Err(ExtractError::ListItem {
				path,
				kind: manifest.kind().to_string(),
			});
		}
		let name = format!("{path}.items[{index}]");
		let item = Manifest::new(item.clone(), name.clone())?;
		unwrap_into(name, item, out)?;
	}
	Ok(())
}

fn walk(value: &Value, trace: &mut Vec<String>, out: &mut Extracted) -> Result<(), ExtractError> {
	match value {
		Value::Object(obj) => walk_object(obj, trace, out),
		Value::Array(list) => {
			for (index, item) in list.iter().enumerate() {
				trace.push(format!("[{index}]"));
				walk(item, trace, out)?;
				trace.pop();
			}
			Ok(())
		}
		primitive => Err(PrimitiveReached {
			path: base(trace),
			key: trace.last().cloned().unwrap_or_default(),
			kind: type_name(primitive),
			root: trace.is_empty(),
		}
		.into()),
	}
}

fn walk_object(
	obj: &Map<String, Value>,
	trace: &mut Vec<String>,
	out: &mut Extracted,
) -> Result<(), ExtractError> {
	if obj.contains_key("apiVersion") && obj.contains_key("kind") {
		let path = full(trace);
		let manifest = Manifest::new(Value::Object(obj.clone()), path.clone())?;
		out.push((path, manifest));
		return Ok(());
	}

	for (key, value) in obj {
		if value.is_null() {
			continue;
		}
		trace.push(key.clone());
		walk(value, trace, out)?;
		trace.pop();
	}
	Ok(())
}

fn full(trace: &[String]) -> String {
	format!(".{}", trace.join("."))
}

fn base(trace: &[String]) -> String {
	match trace.split_last() {
		Some((_, parent)) => full(parent),
		None => ".".to_string(),
	}
}

fn type_name(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "bool",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}
