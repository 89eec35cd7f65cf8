//! Classification of evaluated Jsonnet into Tanka environments.

use serde_json::Value;
use tk_manifest::{ExtractError, Matchers, PrimitiveReached};
use tracing::debug;

use crate::{error::Error, spec::Environment};

/// Expression selecting inline environment objects.
const ENVIRONMENT_EXPR: &str = "Environment/.*";

/// What an evaluated tree turned out to contain.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
	/// Not environment shaped. `reason` is set when the walk stopped at a scalar.
	PlainData { reason: Option<PrimitiveReached> },
	/// Exactly one inline environment.
	Single(Environment),
	/// Several inline environments, in traversal order.
	Multi(Vec<Environment>),
	/// No inline environment; the `spec.json` environment carrying the whole tree.
	SpecFallback(Environment),
}

impl Extraction {
	/// Every environment found, empty for plain data.
	pub fn into_environments(self) -> Vec<Environment> {
		match self {
			Self::PlainData { .. } => Vec::new(),
			Self::Single(env) | Self::SpecFallback(env) => vec![env],
			Self::Multi(envs) => envs,
		}
	}
}

/// Find the environments in `data`.
///
/// `spec` is the environment read from `spec.json`, if there is one.
pub fn extract_environments(data: &Value, spec: Option<Environment>) -> Result<Extraction, Error> {
	let records = match find_records(data) {
		Ok(records) => records,
		Err(ExtractError::PrimitiveReached(reached)) => match &spec {
			None => {
				debug!(%reached, "evaluated data is not environment shaped");
				return Ok(Extraction::PlainData {
					reason: Some(reached),
				});
			}
			Some(_) if reached.is_root() => return Err(Error::PrimitiveReached(reached)),
			Some(_) => Vec::new(),
		},
		Err(e) => return Err(Error::Manifest(e)),
	};

	let mut envs = records
		.into_iter()
		.map(|(path, value)| {
			serde_json::from_value::<Environment>(value)
				.map_err(|source| Error::DecodeEnvironment { path, source })
		})
		.collect::<Result<Vec<_>, _>>()?;

	match (envs.len(), spec) {
		(0, Some(mut env)) => {
			env.data = Some(data.clone());
			Ok(Extraction::SpecFallback(env))
		}
		(0, None) => Err(Error::NoEnvironments),
		(1, _) => Ok(Extraction::Single(envs.remove(0))),
		_ => Ok(Extraction::Multi(envs)),
	}
}

fn find_records(data: &Value) -> Result<Vec<(String, Value)>, ExtractError> {
	let mut extracted = tk_manifest::extract(data)?;
	tk_manifest::unwrap(&mut extracted)?;

	let matchers = match Matchers::new(&[ENVIRONMENT_EXPR]) {
		Ok(matchers) => matchers,
		Err(e) => unreachable!("static expression is valid: {e}"),
	};
	Ok(extracted
		.into_iter()
		.filter(|(_, manifest)| matchers.matches(manifest))
		.map(|(path, manifest)| (path, manifest.into_value()))
		.collect())
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use serde_json::json;

	use super::*;
	use crate::error::ErrorKind;

	fn spec_env() -> Environment {
		let mut env = Environment::new();
		env.metadata.name = Some("environments/default".to_string());
		env.spec.api_server = Some("https://localhost:6443".to_string());
		env
	}

	fn inline(name: &str) -> Value {
		json!({
			"apiVersion": "tanka.dev/v1alpha1",
			"kind": "Environment",
			"metadata": { "name": name },
			"spec": { "namespace": "apps" },
			"data": { "cm": { "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "x" } } },
		})
	}

	#[test]
	fn test_single_inline() {
		let extraction = extract_environments(&json!({ "env": inline("one") }), None).unwrap();
		assert_matches!(extraction, Extraction::Single(env) => {
			assert_eq!(env.name(), "one");
			assert_eq!(env.spec.namespace, "apps");
			assert!(env.data.is_some());
		});
	}

	#[test]
	fn test_multi_inline_keeps_traversal_order() {
		let data = json!({ "b": inline("zeta"), "a": [inline("alpha"), inline("beta")] });
		let extraction = extract_environments(&data, Some(spec_env())).unwrap();
		assert_matches!(extraction, Extraction::Multi(envs) => {
			let names: Vec<_> = envs.iter().map(Environment::name).collect();
			assert_eq!(names, vec!["zeta", "alpha", "beta"]);
		});
	}

	#[test]
	fn test_inline_inside_list() {
		let data = json!({
			"apiVersion": "v1",
			"kind": "List",
			"items": [inline("listed")],
		});
		let extraction = extract_environments(&data, None).unwrap();
		assert_matches!(extraction, Extraction::Single(env) if env.name() == "listed");
	}

	#[test]
	fn test_spec_fallback_carries_data() {
		let data = json!({ "cm": { "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "x" } } });
		let extraction = extract_environments(&data, Some(spec_env())).unwrap();
		assert_matches!(extraction, Extraction::SpecFallback(env) => {
			assert_eq!(env.name(), "environments/default");
			assert_eq!(env.data, Some(data));
		});
	}

	#[test]
	fn test_no_environments() {
		let data = json!({ "cm": { "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "x" } } });
		let err = extract_environments(&data, None).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NoEnvironments);
	}

	#[test]
	fn test_primitive_without_spec_is_plain_data() {
		let data = json!({ "a": { "b": 42 } });
		let extraction = extract_environments(&data, None).unwrap();
		assert_matches!(extraction, Extraction::PlainData { reason: Some(reached) } => {
			assert_eq!(reached.path, ".a");
			assert_eq!(reached.key, "b");
			assert_eq!(reached.kind, "number");
		});
	}

	#[test]
	fn test_primitive_root_with_spec_is_fatal() {
		let err = extract_environments(&json!("hello"), Some(spec_env())).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::PrimitiveReached);
	}

	#[test]
	fn test_primitive_below_root_with_spec_falls_back() {
		let data = json!({ "replicas": 3 });
		let extraction = extract_environments(&data, Some(spec_env())).unwrap();
		assert_matches!(extraction, Extraction::SpecFallback(env) if env.data == Some(data));
	}

	#[test]
	fn test_nested_lists_are_kept_as_is() {
		let data = json!([
			[{ "testCase": "a" }, { "testCase": "b" }],
			[{ "testCase": "c" }],
		]);

		let extraction = extract_environments(&data, Some(spec_env())).unwrap();
		assert_matches!(extraction, Extraction::SpecFallback(env) => {
			assert_eq!(env.name(), "environments/default");
			assert_eq!(env.data, Some(data.clone()));
		});

		let extraction = extract_environments(&data, None).unwrap();
		assert_matches!(extraction, Extraction::PlainData { reason: Some(reached) } => {
			assert_eq!(reached.path, ".[0].[0]");
			assert_eq!(reached.key, "testCase");
			assert_eq!(reached.kind, "string");
		});
	}

	#[test]
	fn test_schema_error_is_fatal() {
		let data = json!({ "broken": { "apiVersion": "v1", "kind": "ConfigMap" } });
		let err = extract_environments(&data, Some(spec_env())).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Manifest);
	}

	#[test]
	fn test_undecodable_environment() {
		let mut env = inline("bad");
		env["spec"]["namespace"] = json!(["not", "a", "string"]);
		let err = extract_environments(&json!({ "env": env }), None).unwrap_err();
		assert_matches!(err, Error::DecodeEnvironment { path, .. } if path == ".env");
	}

	#[test]
	fn test_into_environments() {
		assert!(Extraction::PlainData { reason: None }.into_environments().is_empty());
		assert_eq!(Extraction::SpecFallback(spec_env()).into_environments().len(), 1);
	}
}
