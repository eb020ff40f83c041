//! Git working tree introspection through the `git` executable.
//!
//! A git command exiting with a failure status is an expected outcome here (no
//! remote, not a repository, HEAD on no remote branch) and shows up as `None`.
//! Only a `git` that cannot be run at all is an error.

use crate::error::TraceError;

use std::{collections::HashSet, path::Path, process::Command};

use tracing::debug;

const REMOTES_PREFIX: &str = "refs/remotes";

/// Where a directory of a git working tree comes from upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOrigin {
	/// `git+<remote url>@<HEAD commit>`
	pub download_location: String,
	/// Position of the directory inside the repository, without slashes
	/// around it; empty at the repository root
	pub prefix: String,
}

fn run(dir: &Path, args: &[&str]) -> Result<Option<String>, TraceError> {
	let to_owned_args = || args.iter().map(ToString::to_string).collect::<Vec<_>>();

	let output = Command::new("git")
		.args(args)
		.current_dir(dir)
		.output()
		.map_err(|source| TraceError::GitSpawn {
			args: to_owned_args(),
			source,
		})?;

	if !output.status.success() {
		debug!(
			dir = %dir.display(),
			?args,
			stderr = %String::from_utf8_lossy(&output.stderr).trim(),
			"git command failed",
		);
		return Ok(None);
	}

	String::from_utf8(output.stdout)
		.map(Some)
		.map_err(|_| TraceError::GitOutput {
			args: to_owned_args(),
		})
}

/// Whether `dir` holds a `.git` entry: a directory, or the gitlink file of a
/// submodule or `--separate-git-dir` checkout.
#[must_use]
pub fn has_git_metadata(dir: &Path) -> bool {
	dir.join(".git").symlink_metadata().is_ok()
}

/// Whether `dir` is inside a git working tree.
pub fn is_work_tree(dir: &Path) -> Result<bool, TraceError> {
	Ok(run(dir, &["rev-parse", "--is-inside-work-tree"])?
		.is_some_and(|out| out.trim() == "true"))
}

/// Whether `dir` is the root of its own git working tree.
pub fn is_work_tree_root(dir: &Path) -> Result<bool, TraceError> {
	if has_git_metadata(dir) {
		is_work_tree(dir)
	} else {
		Ok(false)
	}
}

/// Resolve the upstream origin of `dir` from the first remote tracking branch
/// that contains HEAD.
///
/// Branches of `manifest_remote` are skipped: repo-tool checkouts create that
/// remote and it doesn't point anywhere real.
pub fn remote_origin(dir: &Path, manifest_remote: &str) -> Result<Option<GitOrigin>, TraceError> {
	let Some(branches) = run(
		dir,
		&["branch", "-qr", "--format=%(refname)", "--contains", "HEAD"],
	)?
	else {
		return Ok(None);
	};

	let mut branches = branches.lines().map(str::trim).collect::<Vec<_>>();
	branches.sort_unstable();

	let manifest_prefix = format!("{REMOTES_PREFIX}/{manifest_remote}/");

	let Some(remote) = branches
		.into_iter()
		.filter(|branch| {
			branch.starts_with(REMOTES_PREFIX) && !branch.starts_with(&manifest_prefix)
		})
		.find_map(|branch| branch.split('/').nth(2))
	else {
		debug!(dir = %dir.display(), "HEAD is not on any remote branch");
		return Ok(None);
	};

	let Some(url) = run(dir, &["remote", "get-url", remote])? else {
		return Ok(None);
	};

	let Some(head) = run(dir, &["rev-parse", "HEAD"])? else {
		return Ok(None);
	};

	let Some(prefix) = run(dir, &["rev-parse", "--show-prefix"])? else {
		return Ok(None);
	};

	Ok(Some(GitOrigin {
		download_location: format!("git+{}@{}", url.trim(), head.trim()),
		prefix: prefix.trim().trim_matches('/').to_string(),
	}))
}

/// Paths, relative to the repository root, of every untracked, modified or
/// staged but uncommitted file in the working tree of `dir`.
pub fn dirty_files(dir: &Path) -> Result<HashSet<String>, TraceError> {
	if !is_work_tree(dir)? {
		return Err(TraceError::NotAGitRepo(dir.into()));
	}

	let status = run(
		dir,
		&["status", "--porcelain", "-z", "--untracked-files=all"],
	)?
	.ok_or_else(|| TraceError::NotAGitRepo(dir.into()))?;

	let mut dirty = HashSet::new();
	let mut entries = status.split('\0').filter(|entry| !entry.is_empty());

	while let Some(entry) = entries.next() {
		let (code, path) = (entry.get(..2).unwrap_or_default(), entry.get(3..));
		if let Some(path) = path {
			dirty.insert(path.to_string());
		}

		// Renames and copies carry their original path as the next entry
		if code.contains(['R', 'C']) {
			entries.next();
		}
	}

	Ok(dirty)
}
