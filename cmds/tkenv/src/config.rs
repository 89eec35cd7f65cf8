//! Configuration file support for tkenv
//!
//! Supports `.tkenv.yaml` files that can be placed anywhere in the directory
//! hierarchy. tkenv searches from the environment directory upward to the
//! filesystem root. Command line flags override values from the file.

use std::{
	fs, io,
	path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// The name of the config file tkenv looks for
pub const CONFIG_FILE_NAME: &str = ".tkenv.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config file: {}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("failed to parse config file: {}", .path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},
}

/// Root configuration structure for `.tkenv.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct TkenvConfig {
	/// `go` or `binary:<path>`, as `--jsonnet-implementation`.
	pub jsonnet_implementation: Option<String>,
	/// As `--max-stack`.
	pub max_stack: Option<usize>,
}

impl TkenvConfig {
	/// Load config by searching from the given directory upward
	pub fn load_from_directory(start_dir: &Path) -> Result<Option<Self>, ConfigError> {
		match find_config_file(start_dir) {
			Some(path) => {
				debug!(path = %path.display(), "loading config file");
				Self::load_from_file(&path).map(Some)
			}
			None => Ok(None),
		}
	}

	/// Load config from a specific file path
	pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		if content.trim().is_empty() {
			return Ok(Self::default());
		}
		serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}
}

/// Search for a config file starting from `start_dir` and walking up to the filesystem root
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
	let start = start_dir
		.canonicalize()
		.unwrap_or_else(|_| start_dir.to_path_buf());
	// a path to the entrypoint file starts the search in its directory
	let start = if start.is_file() {
		start.parent().map(Path::to_path_buf).unwrap_or(start)
	} else {
		start
	};

	start
		.ancestors()
		.map(|dir| dir.join(CONFIG_FILE_NAME))
		.find(|path| path.is_file())
}
