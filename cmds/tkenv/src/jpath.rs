//! jpath - Jsonnet import path resolution for Tanka environments
//!
//! This module handles finding the project root, environment base directory,
//! and constructing the import paths needed by the jsonnet evaluator.

use std::{
	io,
	path::{Path, PathBuf},
};

use thiserror::Error;

/// Default entrypoint filename for environments
pub const DEFAULT_ENTRYPOINT: &str = "main.jsonnet";

/// Files that indicate a project root (in order of precedence)
const ROOT_MARKERS: &[&str] = &["tkrc.yaml", "jsonnetfile.json"];

#[derive(Debug, Error)]
pub enum JpathError {
	#[error("determining current directory")]
	CurrentDir(#[source] io::Error),

	#[error("could not find project root (no {} found in parent directories of {})", ROOT_MARKERS.join(" or "), .path.display())]
	NoRoot { path: PathBuf },

	#[error("could not find environment base (no {filename} found between {} and {})", .start.display(), .root.display())]
	NoBase {
		filename: String,
		start: PathBuf,
		root: PathBuf,
	},

	#[error("invalid path: {}", .0.display())]
	InvalidPath(PathBuf),
}

/// Directories an environment is evaluated against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jpath {
	/// The project root directory (contains tkrc.yaml or jsonnetfile.json)
	pub root: PathBuf,
	/// The environment base directory (contains the entrypoint)
	pub base: PathBuf,
	/// The entrypoint file path (absolute)
	pub entrypoint: PathBuf,
	/// Import paths from lowest to highest precedence:
	/// `root/vendor`, `base/vendor`, `root/lib`, `base`
	pub import_paths: Vec<PathBuf>,
}

impl Jpath {
	/// Environment name: the base directory relative to the project root.
	pub fn name(&self) -> String {
		relative(&self.base, &self.root)
	}

	/// The entrypoint relative to the project root.
	pub fn relative_entrypoint(&self) -> String {
		relative(&self.entrypoint, &self.root)
	}
}

fn relative(path: &Path, root: &Path) -> String {
	path.strip_prefix(root)
		.unwrap_or(path)
		.to_string_lossy()
		.into_owned()
}

/// Resolve jpath for the given path (file or directory)
pub fn resolve(path: &Path) -> Result<Jpath, JpathError> {
	let abs_path = absolute(path)?;

	let root = find_root(&abs_path)?;
	let base = find_base(&abs_path, &root)?;

	let filename = get_filename(&abs_path)?;
	let entrypoint = base.join(&filename);

	// The jsonnet CLI gives the right-most -J priority
	let import_paths = vec![
		root.join("vendor"),
		base.join("vendor"),
		root.join("lib"),
		base.clone(),
	];

	Ok(Jpath {
		root,
		base,
		entrypoint,
		import_paths,
	})
}

fn absolute(path: &Path) -> Result<PathBuf, JpathError> {
	if path.is_absolute() {
		Ok(path.to_path_buf())
	} else {
		Ok(std::env::current_dir()
			.map_err(JpathError::CurrentDir)?
			.join(path))
	}
}

/// Find the project root directory by looking for marker files
pub fn find_root(start: &Path) -> Result<PathBuf, JpathError> {
	let start_dir = fs_dir(start)?;

	ROOT_MARKERS
		.iter()
		.find_map(|marker| find_parent_with_file(&start_dir, marker))
		.ok_or_else(|| JpathError::NoRoot {
			path: start.to_path_buf(),
		})
}

/// Find the environment base directory (contains the entrypoint file)
fn find_base(path: &Path, root: &Path) -> Result<PathBuf, JpathError> {
	let start_dir = fs_dir(path)?;
	let filename = get_filename(path)?;

	find_parent_with_file_bounded(&start_dir, &filename, root).ok_or_else(|| JpathError::NoBase {
		filename,
		start: start_dir.clone(),
		root: root.to_path_buf(),
	})
}

fn get_filename(path: &Path) -> Result<String, JpathError> {
	if path.is_dir() {
		return Ok(DEFAULT_ENTRYPOINT.to_string());
	}

	path.file_name()
		.and_then(|n| n.to_str())
		.map(str::to_string)
		.ok_or_else(|| JpathError::InvalidPath(path.to_path_buf()))
}

/// Directory of a path: the path itself for directories, the parent for files
fn fs_dir(path: &Path) -> Result<PathBuf, JpathError> {
	let abs = absolute(path)?;

	// Paths that don't exist yet are taken as files when they have an extension
	let is_file = if abs.exists() {
		!abs.is_dir()
	} else {
		abs.extension().is_some()
	};

	if is_file {
		abs.parent()
			.map(Path::to_path_buf)
			.ok_or(JpathError::InvalidPath(abs))
	} else {
		Ok(abs)
	}
}

fn find_parent_with_file(start: &Path, filename: &str) -> Option<PathBuf> {
	start
		.ancestors()
		.find(|dir| dir.join(filename).exists())
		.map(Path::to_path_buf)
}

fn find_parent_with_file_bounded(start: &Path, filename: &str, root: &Path) -> Option<PathBuf> {
	let mut current = start.to_path_buf();
	loop {
		if current.join(filename).exists() {
			return Some(current);
		}
		if current == root || !current.pop() {
			return None;
		}
	}
}
