//! Diff colouring.

use std::io::IsTerminal;

use clap::ValueEnum;
use nu_ansi_term::{Color, Style};

/// When to colour diff output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
	/// Colour when stdout is a terminal
	#[default]
	Auto,
	Always,
	Never,
}

impl ColorMode {
	pub fn should_colorize(self) -> bool {
		match self {
			Self::Auto => std::io::stdout().is_terminal(),
			Self::Always => true,
			Self::Never => false,
		}
	}
}

fn line_style(line: &str) -> Option<Style> {
	if line.starts_with("---") || line.starts_with("+++") {
		Some(Style::new().bold())
	} else if line.starts_with('-') {
		Some(Color::Red.normal())
	} else if line.starts_with('+') {
		Some(Color::Green.normal())
	} else if line.starts_with("@@") {
		Some(Color::Cyan.normal())
	} else {
		None
	}
}

/// Colour a unified diff line by line. Returns it unchanged when `colored` is false.
pub fn colordiff(diff: &str, colored: bool) -> String {
	if !colored {
		return diff.to_string();
	}

	let mut out = String::with_capacity(diff.len());
	for line in diff.split_inclusive('\n') {
		let (content, newline) = match line.strip_suffix('\n') {
			Some(content) => (content, "\n"),
			None => (line, ""),
		};
		match line_style(content) {
			Some(style) => out.push_str(&style.paint(content).to_string()),
			None => out.push_str(content),
		}
		out.push_str(newline);
	}
	out
}
