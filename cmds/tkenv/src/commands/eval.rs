//! Eval command handler.

use std::{
	io::Write,
	path::{Path, PathBuf},
};

use anyhow::Result;
use clap::Args;

use super::util::JsonnetArgs;
use crate::eval::{self, Evaluator};

#[derive(Args)]
pub struct EvalArgs {
	/// Path to evaluate
	pub path: PathBuf,

	#[command(flatten)]
	pub jsonnet: JsonnetArgs,
}

/// Run the eval command.
pub fn run<W: Write>(args: EvalArgs, writer: W) -> Result<()> {
	let (opts, evaluator) = args.jsonnet.resolve(&args.path)?;
	run_with(&args.path, &evaluator, &opts, writer)
}

/// Print the evaluated JSON, whatever its shape.
pub fn run_with<E: Evaluator, W: Write>(
	path: &Path,
	evaluator: &E,
	opts: &eval::EvalOpts,
	mut writer: W,
) -> Result<()> {
	let (data, _) = eval::evaluate(path, evaluator, opts)?;
	writeln!(writer, "{}", serde_json::to_string_pretty(&data)?)?;
	Ok(())
}
