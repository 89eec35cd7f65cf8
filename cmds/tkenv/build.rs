use std::process::Command;

fn main() {
	println!("cargo:rerun-if-changed=.git/HEAD");
	println!("cargo:rerun-if-changed=.git/refs/");
	println!("cargo:rerun-if-env-changed=TKENV_VERSION");

	let version = get_version();
	println!("cargo:rustc-env=TKENV_VERSION={}", version);
}

fn get_version() -> String {
	// Release pipelines pin the version explicitly
	if let Ok(version) = std::env::var("TKENV_VERSION") {
		if !version.is_empty() {
			return version;
		}
	}

	// Only tagged builds carry a real version (v0.3.1 -> 0.3.1), everything
	// else is a development build and skips version constraints
	match get_git_tag() {
		Some(tag) => tag.strip_prefix('v').unwrap_or(&tag).to_string(),
		None => "dev".to_string(),
	}
}

fn get_git_tag() -> Option<String> {
	let output = Command::new("git")
		.args(["describe", "--tags", "--exact-match", "HEAD"])
		.output()
		.ok()?;

	if output.status.success() {
		let tag = String::from_utf8(output.stdout).ok()?;
		Some(tag.trim().to_string())
	} else {
		None
	}
}
