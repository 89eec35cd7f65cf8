//! eval - Jsonnet evaluation for Tanka environments
//!
//! Jsonnet itself is evaluated by an [`Evaluator`]; this module resolves the
//! environment, injects its `spec.json` as an external variable and hands the
//! result to [`crate::extract`].

use std::{
	collections::BTreeMap,
	io,
	path::{Path, PathBuf},
	process::{Command, ExitStatus, Stdio},
	str::FromStr,
};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
	error::Error,
	extract::{extract_environments, Extraction},
	jpath::{self, Jpath},
	spec::{self, API_GROUP},
};

/// Options for evaluation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EvalOpts {
	/// External variables (string values)
	pub ext_str: BTreeMap<String, String>,
	/// External variables (code values)
	pub ext_code: BTreeMap<String, String>,
	/// Top-level arguments (string values)
	pub tla_str: BTreeMap<String, String>,
	/// Top-level arguments (code values)
	pub tla_code: BTreeMap<String, String>,
	/// Maximum stack depth
	pub max_stack: Option<usize>,
	/// Expression evaluated on the entrypoint instead of the whole program,
	/// e.g. `data.deployment`
	pub eval_pattern: Option<String>,
}

/// One evaluation the [`Evaluator`] has to run.
#[derive(Debug, Clone, Copy)]
pub struct EvalRequest<'a> {
	pub entrypoint: &'a Path,
	/// Evaluate this snippet instead of the entrypoint file.
	pub snippet: Option<&'a str>,
	/// From lowest to highest precedence.
	pub import_paths: &'a [PathBuf],
	pub opts: &'a EvalOpts,
}

#[derive(Debug, Error)]
pub enum EvalError {
	#[error("starting `{}`", .binary.display())]
	Spawn {
		binary: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("`{}` exited with {status}:\n{stderr}", .binary.display())]
	Failed {
		binary: PathBuf,
		status: ExitStatus,
		stderr: String,
	},

	#[error("unknown jsonnet implementation `{0}`, expected `go` or `binary:<path>`")]
	UnknownImplementation(String),

	#[error(transparent)]
	Io(#[from] io::Error),
}

/// Evaluates Jsonnet to its JSON text.
pub trait Evaluator {
	fn evaluate(&self, request: &EvalRequest<'_>) -> Result<String, EvalError>;
}

/// Delegates evaluation to a binary with the command line interface of `jsonnet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonnetBinary {
	pub binary: PathBuf,
}

impl JsonnetBinary {
	pub fn new(binary: impl Into<PathBuf>) -> Self {
		Self {
			binary: binary.into(),
		}
	}

	/// Arguments for one evaluation, without the binary itself.
	pub fn args(request: &EvalRequest<'_>) -> Vec<String> {
		let mut args = Vec::new();
		for path in request.import_paths {
			args.push("-J".to_string());
			args.push(path.to_string_lossy().into_owned());
		}

		let opts = request.opts;
		for (flag, values) in [
			("--ext-str", &opts.ext_str),
			("--ext-code", &opts.ext_code),
			("--tla-str", &opts.tla_str),
			("--tla-code", &opts.tla_code),
		] {
			for (key, value) in values {
				args.push(flag.to_string());
				args.push(format!("{key}={value}"));
			}
		}

		if let Some(max_stack) = opts.max_stack {
			args.push("--max-stack".to_string());
			args.push(max_stack.to_string());
		}

		match request.snippet {
			Some(snippet) => {
				args.push("-e".to_string());
				args.push(snippet.to_string());
			}
			None => args.push(request.entrypoint.to_string_lossy().into_owned()),
		}
		args
	}
}

impl Default for JsonnetBinary {
	fn default() -> Self {
		Self::new("jsonnet")
	}
}

/// Parses `--jsonnet-implementation` values: `binary:<path>`, or `go` for the
/// go-jsonnet `jsonnet` binary on `PATH`.
impl FromStr for JsonnetBinary {
	type Err = EvalError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.strip_prefix("binary:") {
			Some(path) if !path.is_empty() => Ok(Self::new(path)),
			None if s == "go" => Ok(Self::default()),
			_ => Err(EvalError::UnknownImplementation(s.to_string())),
		}
	}
}

impl Evaluator for JsonnetBinary {
	#[instrument(skip_all, fields(binary = %self.binary.display(), entrypoint = %request.entrypoint.display()))]
	fn evaluate(&self, request: &EvalRequest<'_>) -> Result<String, EvalError> {
		let mut cmd = Command::new(&self.binary);
		cmd.args(Self::args(request));
		cmd.stdin(Stdio::null());

		let output = cmd.output().map_err(|source| EvalError::Spawn {
			binary: self.binary.clone(),
			source,
		})?;

		if !output.status.success() {
			return Err(EvalError::Failed {
				binary: self.binary.clone(),
				status: output.status,
				stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
			});
		}

		String::from_utf8(output.stdout)
			.map_err(|e| EvalError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
	}
}

/// External variable the environment is injected as.
pub fn environment_ext_code_key() -> String {
	format!("{API_GROUP}/environment")
}

/// Evaluated data and what it turned out to contain.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
	pub data: Value,
	pub extraction: Extraction,
}

/// Evaluate the environment at `path` without classifying the result.
///
/// When the environment has a `spec.json`, it is serialized and passed as the
/// `tanka.dev/environment` ext code. Returns the data and the environment
/// from `spec.json`, if any.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn evaluate<E: Evaluator>(
	path: &Path,
	evaluator: &E,
	opts: &EvalOpts,
) -> Result<(Value, Option<spec::Environment>), Error> {
	let jpath = jpath::resolve(path).map_err(Error::Jpath)?;
	let spec_env = spec::parse_dir(&jpath).map_err(Error::Spec)?.found();

	let mut opts = opts.clone();
	if let Some(env) = &spec_env {
		let json = serde_json::to_string(env).map_err(Error::MarshalSpec)?;
		opts.ext_code.insert(environment_ext_code_key(), json);
	}

	let raw = run(evaluator, &jpath, &opts)?;
	let data = serde_json::from_str(&raw).map_err(Error::Unmarshal)?;
	Ok((data, spec_env))
}

fn run<E: Evaluator>(evaluator: &E, jpath: &Jpath, opts: &EvalOpts) -> Result<String, Error> {
	let snippet = opts
		.eval_pattern
		.as_deref()
		.map(|pattern| pattern_snippet(&jpath.entrypoint, pattern));

	debug!(snippet = snippet.as_deref(), "evaluating jsonnet");
	evaluator
		.evaluate(&EvalRequest {
			entrypoint: &jpath.entrypoint,
			snippet: snippet.as_deref(),
			import_paths: &jpath.import_paths,
			opts,
		})
		.map_err(Error::Evaluate)
}

/// Snippet selecting `pattern` from the entrypoint's output.
pub fn pattern_snippet(entrypoint: &Path, pattern: &str) -> String {
	format!("(import '{}').{}", entrypoint.display(), pattern)
}

/// Evaluate the environment at `path` and classify the result.
///
/// With an eval pattern the output has no affinity to any environment, so it
/// is returned as plain data without extraction.
pub fn eval<E: Evaluator>(path: &Path, evaluator: &E, opts: &EvalOpts) -> Result<Evaluation, Error> {
	let (data, spec_env) = evaluate(path, evaluator, opts)?;

	let extraction = if opts.eval_pattern.is_some() {
		Extraction::PlainData { reason: None }
	} else {
		extract_environments(&data, spec_env)?
	};

	Ok(Evaluation { data, extraction })
}
