//! Version constraint checks (`spec.expectVersions.tanka`).

use std::borrow::Cow;

use semver::{Version, VersionReq};
use thiserror::Error;

/// Version of builds that weren't cut from a release tag.
pub const DEV_VERSION: &str = "dev";

#[derive(Debug, Error)]
pub enum VersionError {
	#[error("parsing version constraint `{constraint}`. Please check 'spec.expectVersions.tanka'")]
	BadConstraint {
		constraint: String,
		#[source]
		source: semver::Error,
	},

	#[error(
		"`{version}` is not a valid semantic version.\n\
		 This likely means your build of tkenv is broken, as this is a compile-time value. \
		 When in doubt, please raise an issue"
	)]
	BrokenBuild {
		version: String,
		#[source]
		source: semver::Error,
	},

	#[error(
		"current version `{current}` does not satisfy the version required by the environment: \
		 `{constraint}`. You likely need to use another version of tkenv"
	)]
	Unsatisfied { current: String, constraint: String },
}

/// Facts about the running binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
	pub version: String,
}

impl BuildInfo {
	pub fn new(version: impl Into<String>) -> Self {
		Self {
			version: version.into(),
		}
	}

	/// Version stamped in at compile time.
	pub fn current() -> Self {
		Self::new(env!("TKENV_VERSION"))
	}

	pub fn is_dev(&self) -> bool {
		self.version == DEV_VERSION
	}
}

impl Default for BuildInfo {
	fn default() -> Self {
		Self::new(DEV_VERSION)
	}
}

/// Check the running version against a constraint.
///
/// Constraints are comma separated comparators (`>= 0.20, < 1`) or an
/// inclusive hyphen range (`1.2 - 1.4`), optionally combined with `||`. Empty
/// constraints and development builds always pass.
pub fn check_version(constraint: &str, build: &BuildInfo) -> Result<(), VersionError> {
	let constraint = constraint.trim();
	if constraint.is_empty() || build.is_dev() {
		return Ok(());
	}

	let alternatives = constraint
		.split("||")
		.map(|alt| VersionReq::parse(&comparators(alt.trim())))
		.collect::<Result<Vec<_>, _>>()
		.map_err(|source| VersionError::BadConstraint {
			constraint: constraint.to_string(),
			source,
		})?;

	let raw = build.version.strip_prefix('v').unwrap_or(&build.version);
	let current = Version::parse(raw).map_err(|source| VersionError::BrokenBuild {
		version: build.version.clone(),
		source,
	})?;

	if alternatives.iter().any(|req| req.matches(&current)) {
		Ok(())
	} else {
		Err(VersionError::Unsatisfied {
			current: build.version.clone(),
			constraint: constraint.to_string(),
		})
	}
}

/// Rewrite a hyphen range `a - b` into `>=a, <=b`. Anything else is returned
/// as is.
fn comparators(alternative: &str) -> Cow<'_, str> {
	match alternative.split_once(" - ") {
		Some((low, high)) => Cow::Owned(format!(">={}, <={}", low.trim(), high.trim())),
		None => Cow::Borrowed(alternative),
	}
}
