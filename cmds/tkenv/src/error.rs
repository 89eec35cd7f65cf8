//! Errors of the evaluation, loading and prune pipeline.
//!
//! Every fatal condition is one [`Error`] variant whose message names the stage
//! it happened in, with the underlying cause kept as the error source. Callers
//! that need to branch on the condition use [`Error::kind`].

use thiserror::Error;
use tk_manifest::{BadExpression, ExtractError, ManifestKey, PrimitiveReached};

use crate::{eval::EvalError, jpath::JpathError, k8s::ClusterError, spec::SpecError, version::VersionError};

#[derive(Debug, Error)]
pub enum Error {
	#[error("resolving jpath")]
	Jpath(#[source] JpathError),

	#[error("reading spec.json")]
	Spec(#[source] SpecError),

	#[error("marshalling environment config")]
	MarshalSpec(#[source] serde_json::Error),

	#[error("evaluating jsonnet")]
	Evaluate(#[source] EvalError),

	#[error("unmarshalling data")]
	Unmarshal(#[source] serde_json::Error),

	#[error("extracting environments")]
	PrimitiveReached(#[source] PrimitiveReached),

	#[error("no environments found")]
	NoEnvironments,

	#[error("decoding environment at `{path}`")]
	DecodeEnvironment {
		path: String,
		#[source]
		source: serde_json::Error,
	},

	#[error("got an error while extracting env `data`")]
	Manifest(#[source] ExtractError),

	#[error("parsing target expressions")]
	Target(#[source] BadExpression),

	#[error("found duplicate resource `{0}`")]
	DuplicateResource(ManifestKey),

	#[error(transparent)]
	Version(#[from] VersionError),

	#[error("no Tanka environment found")]
	NoEnvironment,

	#[error("found multiple Environments in `{path}`. Use `--name` to select a single one: {names}")]
	AmbiguousEnvironment { path: String, names: String },

	#[error("no environment found matching name `{0}`")]
	UnknownEnvironment(String),

	#[error(
		"Your Environment's spec.json seems incomplete:\n{}\n\nPlease see https://tanka.dev/config for reference",
		.missing.join("\n")
	)]
	IncompleteSpec { missing: Vec<&'static str> },

	#[error("connecting to Kubernetes")]
	Connect(#[source] ClusterError),

	#[error(
		"spec.injectLabels is set to false in your spec.json. Tanka needs to add \
		 a label to your resources to reliably detect which were removed from Jsonnet. \
		 See https://tanka.dev/garbage-collection for more details"
	)]
	InjectLabelsDisabled,

	#[error("listing resources labeled `{selector}`")]
	ListLive {
		selector: String,
		#[source]
		source: ClusterError,
	},

	#[error("computing the diff of resources to prune")]
	Diff(#[source] ClusterError),

	#[error("asking for confirmation")]
	Confirm(#[source] std::io::Error),

	#[error("writing output")]
	Output(#[source] std::io::Error),

	#[error(transparent)]
	Delete(ClusterError),
}

/// Closed discriminator over [`Error`], for callers that script around failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	Resolve,
	Spec,
	Evaluate,
	PrimitiveReached,
	NoEnvironments,
	Manifest,
	BadConstraint,
	BrokenBuild,
	VersionUnsatisfied,
	NoEnvironment,
	AmbiguousEnvironment,
	UnknownEnvironment,
	IncompleteSpec,
	Connect,
	InjectLabelsDisabled,
	ListLive,
	Diff,
	Confirm,
	Output,
	Delete,
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Jpath(_) => ErrorKind::Resolve,
			Self::Spec(_) | Self::MarshalSpec(_) => ErrorKind::Spec,
			Self::Evaluate(_) | Self::Unmarshal(_) => ErrorKind::Evaluate,
			Self::PrimitiveReached(_) => ErrorKind::PrimitiveReached,
			Self::NoEnvironments => ErrorKind::NoEnvironments,
			Self::DecodeEnvironment { .. }
			| Self::Manifest(_)
			| Self::Target(_)
			| Self::DuplicateResource(_) => ErrorKind::Manifest,
			Self::Version(VersionError::BadConstraint { .. }) => ErrorKind::BadConstraint,
			Self::Version(VersionError::BrokenBuild { .. }) => ErrorKind::BrokenBuild,
			Self::Version(VersionError::Unsatisfied { .. }) => ErrorKind::VersionUnsatisfied,
			Self::NoEnvironment => ErrorKind::NoEnvironment,
			Self::AmbiguousEnvironment { .. } => ErrorKind::AmbiguousEnvironment,
			Self::UnknownEnvironment(_) => ErrorKind::UnknownEnvironment,
			Self::IncompleteSpec { .. } => ErrorKind::IncompleteSpec,
			Self::Connect(_) => ErrorKind::Connect,
			Self::InjectLabelsDisabled => ErrorKind::InjectLabelsDisabled,
			Self::ListLive { .. } => ErrorKind::ListLive,
			Self::Diff(_) => ErrorKind::Diff,
			Self::Confirm(_) => ErrorKind::Confirm,
			Self::Output(_) => ErrorKind::Output,
			Self::Delete(_) => ErrorKind::Delete,
		}
	}
}
