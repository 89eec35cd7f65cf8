//! Prune command handler.
//!
//! Removes Kubernetes resources that exist in the cluster but are no longer
//! defined in the Tanka environment manifests.

use std::{io::Write, path::PathBuf};

use anyhow::Result;
use clap::Args;
use tracing::instrument;

use super::util::{create_tokio_runtime, JsonnetArgs};
use crate::{
	k8s::{client::KubeConnector, output::ColorMode},
	prompt::Prompt,
	prune::{prune, PruneOpts},
	version::BuildInfo,
};

#[derive(Args)]
pub struct PruneArgs {
	/// Path to prune
	pub path: PathBuf,

	#[command(flatten)]
	pub jsonnet: JsonnetArgs,

	/// Skip interactive approval. Only for automation!
	#[arg(long)]
	pub auto_approve: bool,

	/// Controls color in diff output, must be "auto", "always", or "never"
	#[arg(long, default_value = "auto", value_enum)]
	pub color: ColorMode,

	/// Delete without waiting for graceful termination
	#[arg(long)]
	pub force: bool,

	/// String that only a single inline environment contains in its name
	#[arg(long)]
	pub name: Option<String>,

	/// Regex filter on '<kind>/<name>'. See https://tanka.dev/output-filtering
	#[arg(short = 't', long)]
	pub target: Vec<String>,
}

/// Run the prune command.
pub fn run<W: Write>(args: PruneArgs, writer: W) -> Result<()> {
	let runtime = create_tokio_runtime()?;
	runtime.block_on(run_async(args, writer))
}

#[instrument(skip_all, fields(path = %args.path.display()))]
async fn run_async<W: Write>(args: PruneArgs, writer: W) -> Result<()> {
	let (eval, evaluator) = args.jsonnet.resolve(&args.path)?;
	let opts = PruneOpts {
		eval,
		targets: args.target,
		name: args.name,
		auto_approve: args.auto_approve,
		force: args.force,
		color: args.color,
	};

	let outcome = prune(
		&args.path,
		&evaluator,
		&KubeConnector::new(),
		&mut Prompt::stdio(),
		&BuildInfo::current(),
		&opts,
		writer,
	)
	.await?;

	eprintln!("{outcome}");
	Ok(())
}
