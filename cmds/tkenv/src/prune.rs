//! Deleting resources that are no longer part of an environment.
//!
//! [`prune`] evaluates and loads one environment, lists what the cluster holds
//! under the environment's label and deletes everything that is no longer
//! declared, after showing a diff and asking for confirmation.

use std::{collections::HashSet, fmt, io::Write, path::Path};

use tk_manifest::{List, Manifest, ManifestKey};
use tracing::{debug, instrument};

use crate::{
	error::Error,
	eval::{self, EvalOpts, Evaluator},
	extract::Extraction,
	k8s::{output::ColorMode, Cluster, Connection, Connector, DeleteOpts},
	load::{load, Loaded},
	prompt::Confirm,
	spec::{environment_label, Environment, Spec, LABEL_ENVIRONMENT},
	version::BuildInfo,
};

const MISSING_ENDPOINT: &str = "  * spec.apiServer|spec.contextNames: No Kubernetes cluster endpoint specified";
const MISSING_NAMESPACE: &str = "  * spec.namespace: Default namespace missing";

#[derive(Debug, Clone, Default)]
pub struct PruneOpts {
	pub eval: EvalOpts,
	/// `<kind>/<name>` expressions limiting which manifests count as declared.
	pub targets: Vec<String>,
	/// Selects one of several inline environments.
	pub name: Option<String>,
	/// Skip the confirmation prompt.
	pub auto_approve: bool,
	pub force: bool,
	pub color: ColorMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
	NothingToPrune,
	/// The user declined.
	Aborted,
	Pruned { deleted: Vec<ManifestKey> },
}

impl fmt::Display for PruneOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NothingToPrune => write!(f, "Nothing to prune."),
			Self::Aborted => write!(f, "Aborted."),
			Self::Pruned { deleted } => write!(f, "Pruned {} resource(s).", deleted.len()),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PruneStage {
	Evaluated,
	Loaded,
	Connected,
	OrphansComputed,
	NoOp,
	Previewed,
	Confirmed,
	Deleted,
}

impl fmt::Display for PruneStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Evaluated => "evaluated",
			Self::Loaded => "loaded",
			Self::Connected => "connected",
			Self::OrphansComputed => "orphans-computed",
			Self::NoOp => "no-op",
			Self::Previewed => "previewed",
			Self::Confirmed => "confirmed",
			Self::Deleted => "deleted",
		};
		f.write_str(name)
	}
}

/// Pick the environment to work on.
///
/// With `name`, an exact `metadata.name` match wins, otherwise the name must
/// be a substring of exactly one environment's name.
pub fn select_environment(envs: Vec<Environment>, name: Option<&str>, path: &str) -> Result<Environment, Error> {
	let mut candidates = match name {
		Some(name) => {
			let (exact, rest): (Vec<_>, Vec<_>) = envs.into_iter().partition(|e| e.name() == name);
			if exact.len() == 1 {
				exact
			} else {
				let matching: Vec<_> = exact
					.into_iter()
					.chain(rest)
					.filter(|e| e.name().contains(name))
					.collect();
				if matching.is_empty() {
					return Err(Error::UnknownEnvironment(name.to_string()));
				}
				matching
			}
		}
		None => envs,
	};

	match candidates.len() {
		0 => Err(Error::NoEnvironment),
		1 => Ok(candidates.remove(0)),
		_ => Err(Error::AmbiguousEnvironment {
			path: path.to_string(),
			names: candidates
				.iter()
				.map(Environment::name)
				.collect::<Vec<_>>()
				.join(", "),
		}),
	}
}

/// Evaluate `path` and load the single environment it selects.
pub fn load_environment<E: Evaluator>(
	path: &Path,
	evaluator: &E,
	build: &BuildInfo,
	opts: &PruneOpts,
) -> Result<Loaded, Error> {
	let evaluation = eval::eval(path, evaluator, &opts.eval)?;
	let envs = match evaluation.extraction {
		Extraction::PlainData { .. } => return Err(Error::NoEnvironment),
		extraction => extraction.into_environments(),
	};
	let env = select_environment(envs, opts.name.as_deref(), &path.display().to_string())?;
	debug!(stage = %PruneStage::Evaluated, env = env.name());

	let loaded = load(env, &opts.targets, build)?;
	debug!(stage = %PruneStage::Loaded, resources = loaded.resources.len());
	Ok(loaded)
}

/// Fields prune needs to find the cluster, as lines of [`Error::IncompleteSpec`].
fn missing_fields(spec: &Spec) -> Vec<&'static str> {
	let has_server = spec.api_server.as_deref().is_some_and(|s| !s.is_empty());
	let has_contexts = spec.context_names.as_ref().is_some_and(|c| !c.is_empty());

	let mut missing = Vec::new();
	if !has_server && !has_contexts {
		missing.push(MISSING_ENDPOINT);
	}
	if spec.namespace.is_empty() {
		missing.push(MISSING_NAMESPACE);
	}
	missing
}

/// How an object is matched between the environment and the cluster.
///
/// The API version is left out, as the cluster serves objects at its
/// preferred version.
#[derive(Debug, PartialEq, Eq, Hash)]
struct Identity<'a> {
	group: &'a str,
	kind: &'a str,
	namespace: Option<&'a str>,
	name: &'a str,
}

impl<'a> Identity<'a> {
	fn of(manifest: &'a Manifest) -> Self {
		Self {
			group: manifest
				.api_version()
				.split_once('/')
				.map_or("", |(group, _)| group),
			kind: manifest.kind(),
			namespace: manifest.namespace(),
			name: manifest.name(),
		}
	}

	fn without_namespace(&self) -> Self {
		Self {
			namespace: None,
			..*self
		}
	}
}

/// Live objects not in `desired`, in the order the cluster returned them.
///
/// A live object without a namespace is cluster scoped and matches a desired
/// object of any namespace.
fn orphaned(live: List, desired: &List) -> List {
	let exact: HashSet<_> = desired.iter().map(Identity::of).collect();
	let any_namespace: HashSet<_> = exact.iter().map(Identity::without_namespace).collect();

	live.into_iter()
		.filter(|manifest| {
			let id = Identity::of(manifest);
			let declared = if id.namespace.is_some() {
				exact.contains(&id)
			} else {
				any_namespace.contains(&id)
			};
			!declared
		})
		.collect()
}

/// Delete what the cluster holds for the environment at `path` but the
/// environment no longer declares.
///
/// Nothing is deleted unless `prompt` confirms or `opts.auto_approve` is set.
/// The diff of what is deleted goes to `writer`. The cluster connection is
/// closed on every path out of here once it was opened.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn prune<E, C, P, W>(
	path: &Path,
	evaluator: &E,
	connector: &C,
	prompt: &mut P,
	build: &BuildInfo,
	opts: &PruneOpts,
	mut writer: W,
) -> Result<PruneOutcome, Error>
where
	E: Evaluator,
	C: Connector,
	P: Confirm,
	W: Write,
{
	let Loaded { env, resources } = load_environment(path, evaluator, build, opts)?;

	let missing = missing_fields(&env.spec);
	if !missing.is_empty() {
		return Err(Error::IncompleteSpec { missing });
	}
	let connection = Connection::new(connector.connect(&env.spec).await.map_err(Error::Connect)?);
	debug!(stage = %PruneStage::Connected, cluster = %connection.info());

	if !env.spec.inject_labels {
		return Err(Error::InjectLabelsDisabled);
	}
	let selector = format!("{LABEL_ENVIRONMENT}={}", environment_label(&env));
	let live = match connection.list_labeled(&selector).await {
		Ok(live) => live,
		Err(source) => return Err(Error::ListLive { selector, source }),
	};
	let orphans = orphaned(live, &resources);
	debug!(stage = %PruneStage::OrphansComputed, orphans = orphans.len());

	if orphans.is_empty() {
		debug!(stage = %PruneStage::NoOp);
		return Ok(PruneOutcome::NothingToPrune);
	}

	let diff = connection.diff_deleted(&orphans).map_err(Error::Diff)?;
	writer
		.write_all(crate::k8s::output::colordiff(&diff, opts.color.should_colorize()).as_bytes())
		.and_then(|()| writer.flush())
		.map_err(Error::Output)?;
	debug!(stage = %PruneStage::Previewed);

	if !opts.auto_approve {
		let confirmed = prompt
			.confirm("Pruning from", &env.spec.namespace, &connection.info())
			.map_err(Error::Confirm)?;
		if !confirmed {
			return Ok(PruneOutcome::Aborted);
		}
	}
	debug!(stage = %PruneStage::Confirmed);

	connection
		.delete(&orphans, DeleteOpts { force: opts.force })
		.await
		.map_err(Error::Delete)?;
	debug!(stage = %PruneStage::Deleted, count = orphans.len());

	Ok(PruneOutcome::Pruned {
		deleted: orphans.iter().map(Manifest::key).collect(),
	})
}
