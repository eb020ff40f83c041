#![allow(dead_code)]

use std::{
	fs,
	path::{Path, PathBuf},
	process::Command,
};

pub fn create_file(path: impl AsRef<Path>, content: &str) {
	let path = path.as_ref();
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(path, content).unwrap();
}

pub fn create_link(path: impl AsRef<Path>, target: impl AsRef<Path>) {
	let path = path.as_ref();
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	std::os::unix::fs::symlink(target, path).unwrap();
}

pub fn read_file(path: impl AsRef<Path>) -> String {
	fs::read_to_string(path).unwrap()
}

/// Every entry below `root`, relative to it and sorted.
pub fn tree(root: impl AsRef<Path>) -> Vec<String> {
	fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
		for entry in fs::read_dir(dir).unwrap() {
			let entry = entry.unwrap();
			let path = entry.path();
			out.push(
				path.strip_prefix(root)
					.unwrap()
					.to_str()
					.unwrap()
					.to_string(),
			);
			if entry.file_type().unwrap().is_dir() {
				walk(root, &path, out);
			}
		}
	}

	let root = root.as_ref();
	let mut out = vec![];
	walk(root, root, &mut out);
	out.sort();
	out
}

pub fn git_available() -> bool {
	Command::new("git")
		.arg("--version")
		.output()
		.is_ok_and(|output| output.status.success())
}

/// Run git in `dir` with a throwaway identity, returning trimmed stdout.
pub fn git(dir: impl AsRef<Path>, args: &[&str]) -> String {
	let output = Command::new("git")
		.args([
			"-c",
			"user.name=Trace Test",
			"-c",
			"user.email=trace@example.com",
			"-c",
			"commit.gpgsign=false",
			"-c",
			"init.defaultBranch=main",
		])
		.args(args)
		.current_dir(dir)
		.env("GIT_CONFIG_NOSYSTEM", "1")
		.env_remove("GIT_DIR")
		.env_remove("GIT_WORK_TREE")
		.output()
		.unwrap();

	assert!(
		output.status.success(),
		"git {args:?} failed: {}",
		String::from_utf8_lossy(&output.stderr)
	);

	String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// Commit everything in `dir` as a fresh repository.
pub fn init_repo(dir: impl AsRef<Path>) -> String {
	let dir = dir.as_ref();
	git(dir, &["init", "-q"]);
	git(dir, &["add", "-A"]);
	git(dir, &["commit", "-q", "-m", "initial commit"]);
	git(dir, &["rev-parse", "HEAD"])
}

/// Turn the repository at `base/name` into a bare `base/name.git` and clone it
/// back to `base/name`, so the checkout has a remote its HEAD is on.
///
/// Returns the bare repository path and the HEAD commit.
pub fn publish_repo(base: impl AsRef<Path>, name: &str) -> (PathBuf, String) {
	let base = base.as_ref();
	let head = git(base.join(name), &["rev-parse", "HEAD"]);
	let bare = base.join(format!("{name}.git"));

	git(
		base,
		&["clone", "-q", "--bare", name, bare.to_str().unwrap()],
	);
	fs::remove_dir_all(base.join(name)).unwrap();
	git(base, &["clone", "-q", bare.to_str().unwrap(), name]);

	(bare, head)
}
