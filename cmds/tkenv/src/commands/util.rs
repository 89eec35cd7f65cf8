//! Shared command line handling.

use std::{
	collections::BTreeMap,
	io::{self, ErrorKind, Write},
	path::Path,
};

use anyhow::{Context, Result};
use clap::Args;

use crate::{
	config::TkenvConfig,
	eval::{EvalOpts, JsonnetBinary},
};

/// Jsonnet evaluation flags shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct JsonnetArgs {
	/// Evaluate expression on output of jsonnet
	#[arg(short = 'e', long = "eval")]
	pub eval_pattern: Option<String>,

	/// Set code value of extVar (Format: key=<code>)
	#[arg(long, value_parser = parse_key_value)]
	pub ext_code: Vec<(String, String)>,

	/// Set string value of extVar (Format: key=value)
	#[arg(short = 'V', long, value_parser = parse_key_value)]
	pub ext_str: Vec<(String, String)>,

	/// Set code value of top level function (Format: key=<code>)
	#[arg(long, value_parser = parse_key_value)]
	pub tla_code: Vec<(String, String)>,

	/// Set string value of top level function (Format: key=value)
	#[arg(short = 'A', long, value_parser = parse_key_value)]
	pub tla_str: Vec<(String, String)>,

	/// Jsonnet VM max stack. Increase this if you get: max stack frames exceeded
	#[arg(long)]
	pub max_stack: Option<usize>,

	/// `go` (the default) runs the `jsonnet` binary found on PATH, `binary:<path>` runs any binary with the same command line. Evaluation always happens out of process
	#[arg(long)]
	pub jsonnet_implementation: Option<String>,
}

/// Parse a `key=value` flag. The value may itself contain `=`.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
	match s.split_once('=') {
		Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
		_ => Err(format!("`{s}` is not of the form key=value")),
	}
}

fn to_map(pairs: &[(String, String)]) -> BTreeMap<String, String> {
	pairs.iter().cloned().collect()
}

impl JsonnetArgs {
	/// Evaluation options, falling back to `config` for unset flags.
	pub fn eval_opts(&self, config: &TkenvConfig) -> EvalOpts {
		EvalOpts {
			ext_str: to_map(&self.ext_str),
			ext_code: to_map(&self.ext_code),
			tla_str: to_map(&self.tla_str),
			tla_code: to_map(&self.tla_code),
			max_stack: self.max_stack.or(config.max_stack),
			eval_pattern: self.eval_pattern.clone(),
		}
	}

	/// The evaluator to run, falling back to `config` for an unset flag.
	pub fn evaluator(&self, config: &TkenvConfig) -> Result<JsonnetBinary> {
		match self
			.jsonnet_implementation
			.as_deref()
			.or(config.jsonnet_implementation.as_deref())
		{
			Some(implementation) => implementation
				.parse()
				.context("parsing --jsonnet-implementation"),
			None => Ok(JsonnetBinary::default()),
		}
	}

	/// Options and evaluator for the environment at `path`, with `.tkenv.yaml`
	/// looked up from there.
	pub fn resolve(&self, path: &Path) -> Result<(EvalOpts, JsonnetBinary)> {
		let config = TkenvConfig::load_from_directory(path)?.unwrap_or_default();
		Ok((self.eval_opts(&config), self.evaluator(&config)?))
	}
}

pub fn create_tokio_runtime() -> Result<tokio::runtime::Runtime> {
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")
}

/// A writer wrapper that silently handles broken pipe errors.
///
/// When the underlying writer returns a broken pipe error (EPIPE), this wrapper
/// converts it to a successful write. This allows commands to exit cleanly when
/// output is piped to a process that closes early (e.g., `tkenv show . | head -1`).
pub struct BrokenPipeGuard<W> {
	inner: W,
}

impl<W> BrokenPipeGuard<W> {
	pub fn new(inner: W) -> Self {
		Self { inner }
	}
}

impl<W: Write> Write for BrokenPipeGuard<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.inner.write(buf) {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(buf.len()),
			other => other,
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.inner.flush() {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
			other => other,
		}
	}
}
