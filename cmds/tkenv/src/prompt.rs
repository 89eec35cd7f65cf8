//! Interactive confirmation before destructive actions.

use std::io::{self, BufRead, Write};

/// Asks the user whether to go ahead.
pub trait Confirm {
	/// `action` is phrased like "Pruning from"; `info` describes the cluster.
	fn confirm(&mut self, action: &str, namespace: &str, info: &str) -> io::Result<bool>;
}

/// Prompts on a writer and reads the answer from a reader.
///
/// Only the exact answer `yes` confirms.
#[derive(Debug)]
pub struct Prompt<R, W> {
	input: R,
	output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
	pub fn new(input: R, output: W) -> Self {
		Self { input, output }
	}
}

impl Prompt<io::StdinLock<'static>, io::Stderr> {
	pub fn stdio() -> Self {
		Self::new(io::stdin().lock(), io::stderr())
	}
}

impl<R: BufRead, W: Write> Confirm for Prompt<R, W> {
	fn confirm(&mut self, action: &str, namespace: &str, info: &str) -> io::Result<bool> {
		write!(
			self.output,
			"{action} namespace '{namespace}' of {info}.\nPlease type 'yes' to confirm: "
		)?;
		self.output.flush()?;

		let mut answer = String::new();
		self.input.read_line(&mut answer)?;
		Ok(answer.trim_end_matches(['\r', '\n']) == "yes")
	}
}
