//! Show command handler.

use std::{
	io::Write,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Args;

use super::util::JsonnetArgs;
use crate::{
	error::Error,
	eval::{self, EvalOpts, Evaluator},
	extract::Extraction,
	load::load,
	prune::select_environment,
	version::BuildInfo,
};

#[derive(Args)]
pub struct ShowArgs {
	/// Path to show
	pub path: PathBuf,

	#[command(flatten)]
	pub jsonnet: JsonnetArgs,

	/// String that only a single inline environment contains in its name
	#[arg(long)]
	pub name: Option<String>,

	/// Regex filter on '<kind>/<name>'. See https://tanka.dev/output-filtering
	#[arg(short = 't', long)]
	pub target: Vec<String>,
}

/// Run the show command.
pub fn run<W: Write>(args: ShowArgs, writer: W) -> Result<()> {
	let (opts, evaluator) = args.jsonnet.resolve(&args.path)?;
	run_with(
		&args.path,
		&evaluator,
		&opts,
		&args.target,
		args.name.as_deref(),
		&BuildInfo::current(),
		writer,
	)
}

/// Print the manifests of every environment at `path` as a YAML stream.
pub fn run_with<E: Evaluator, W: Write>(
	path: &Path,
	evaluator: &E,
	opts: &EvalOpts,
	targets: &[String],
	name: Option<&str>,
	build: &BuildInfo,
	mut writer: W,
) -> Result<()> {
	let evaluation = eval::eval(path, evaluator, opts)?;
	let envs = match evaluation.extraction {
		Extraction::PlainData { .. } => return Err(Error::NoEnvironment.into()),
		extraction => extraction.into_environments(),
	};
	let envs = match name {
		Some(_) => vec![select_environment(envs, name, &path.display().to_string())?],
		None => envs,
	};

	for env in envs {
		let loaded = load(env, targets, build)?;
		for manifest in &loaded.resources {
			let yaml = serde_yaml::to_string(manifest)
				.with_context(|| format!("converting {} to YAML", manifest.kind_name()))?;
			write!(writer, "---\n{yaml}")?;
		}
	}
	writer.flush()?;
	Ok(())
}
