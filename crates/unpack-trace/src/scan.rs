use crate::{
	error::{FileIOError, TraceError},
	git,
};

use std::{
	io,
	path::{Path, PathBuf},
};

use walkdir::WalkDir;

/// Files and symlinks found under a directory, each list sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanResult {
	pub files: Vec<PathBuf>,
	pub links: Vec<PathBuf>,
}

/// Recursively collect every file and symlink under `root`.
///
/// Entries named in `exclude` are pruned together with everything below them.
/// With `skip_vcs_subtrees`, subdirectories that are git working trees of their
/// own are pruned too, as they get traced as separate modules. Symlinks are
/// reported and never followed.
pub fn scan(
	root: impl AsRef<Path>,
	exclude: &[impl AsRef<str>],
	skip_vcs_subtrees: bool,
) -> Result<ScanResult, TraceError> {
	let root = root.as_ref();
	let exclude = exclude.iter().map(AsRef::as_ref).collect::<Vec<_>>();

	let mut result = ScanResult::default();

	// Name ordering per directory keeps both lists sorted by path
	let mut entries = WalkDir::new(root)
		.min_depth(1)
		.follow_links(false)
		.sort_by_file_name()
		.into_iter()
		.filter_entry(|entry| {
			!exclude
				.iter()
				.any(|&name| entry.file_name().to_str() == Some(name))
		});

	while let Some(entry) = entries.next() {
		let entry = entry.map_err(|e| walk_error(root, e))?;
		let file_type = entry.file_type();

		if file_type.is_symlink() {
			result.links.push(entry.into_path());
		} else if file_type.is_file() {
			result.files.push(entry.into_path());
		} else if file_type.is_dir()
			&& skip_vcs_subtrees
			&& git::is_work_tree_root(entry.path())?
		{
			entries.skip_current_dir();
		}
	}

	Ok(result)
}

fn walk_error(root: &Path, e: walkdir::Error) -> TraceError {
	let path = e.path().unwrap_or(root).to_path_buf();
	let source = e
		.into_io_error()
		.unwrap_or_else(|| io::Error::other("filesystem loop"));

	FileIOError::from((path, source, "Failed to scan directory")).into()
}
