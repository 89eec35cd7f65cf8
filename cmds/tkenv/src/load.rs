//! Turning an environment's `data` into the manifests that get applied.

use std::collections::HashSet;

use serde_json::Value;
use tk_manifest::{List, Matchers};
use tracing::{debug, instrument};

use crate::{
	error::Error,
	spec::{environment_label, Environment, ANNOTATION_NAMESPACED, LABEL_ENVIRONMENT},
	version::{check_version, BuildInfo},
};

/// An environment together with its resolved manifests.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
	pub env: Environment,
	pub resources: List,
}

/// Resolve the manifests of `env`.
///
/// Only manifests selected by `targets` (`<kind>/<name>` expressions, see
/// [`Matchers`]) are kept.
#[instrument(skip_all, fields(env = env.name()))]
pub fn load<S: AsRef<str>>(env: Environment, targets: &[S], build: &BuildInfo) -> Result<Loaded, Error> {
	if let Some(constraint) = &env.spec.expect_versions.tanka {
		check_version(constraint, build)?;
	}

	let matchers = Matchers::new(targets).map_err(Error::Target)?;

	let resources = match &env.data {
		Some(data) => process(&env, data)?,
		None => List::new(),
	};
	let resources = tk_manifest::filter(resources, &matchers);
	check_duplicates(&resources)?;

	debug!(count = resources.len(), "loaded manifests");
	Ok(Loaded { env, resources })
}

fn process(env: &Environment, data: &Value) -> Result<List, Error> {
	let mut extracted = tk_manifest::extract(data).map_err(Error::Manifest)?;
	tk_manifest::unwrap(&mut extracted).map_err(Error::Manifest)?;

	let label = env.spec.inject_labels.then(|| environment_label(env));
	let defaults = &env.spec.resource_defaults;

	let mut list = List::with_capacity(extracted.len());
	for (_, mut manifest) in extracted {
		if manifest.namespace().is_none() && manifest.annotation(ANNOTATION_NAMESPACED) != Some("false") {
			manifest.set_namespace(&env.spec.namespace);
		}

		if let Some(label) = &label {
			manifest
				.labels_mut()
				.insert(LABEL_ENVIRONMENT.to_string(), Value::String(label.clone()));
		}

		if !defaults.annotations.is_empty() {
			let annotations = manifest.annotations_mut();
			for (key, value) in &defaults.annotations {
				annotations
					.entry(key.clone())
					.or_insert_with(|| Value::String(value.clone()));
			}
		}
		if !defaults.labels.is_empty() {
			let labels = manifest.labels_mut();
			for (key, value) in &defaults.labels {
				labels
					.entry(key.clone())
					.or_insert_with(|| Value::String(value.clone()));
			}
		}

		list.push(manifest);
	}
	Ok(list)
}

fn check_duplicates(list: &List) -> Result<(), Error> {
	let mut seen = HashSet::with_capacity(list.len());
	for manifest in list {
		let key = manifest.key();
		if !seen.insert(key.clone()) {
			return Err(Error::DuplicateResource(key));
		}
	}
	Ok(())
}
