//! Rename based move of an unpack scratch area into the working directory.
//!
//! Conflicts between same named entries are settled as follows:
//! - a file or symlink overwrites a file or symlink, or an empty directory;
//! - a file or symlink over a populated directory is an error;
//! - a directory replaces a file, a symlink or an empty directory;
//! - a directory that is a git working tree replaces a populated directory,
//!   the same way a fresh clone wipes whatever was at its destination;
//! - any other directory is merged recursively into a populated directory.

use crate::{
	error::{FileIOError, TraceError},
	git,
};

use std::{
	fs::{self, FileType},
	io,
	path::Path,
};

use tracing::trace;

/// Move every entry of `src` into `dst`, leaving `src` empty.
///
/// Both must be real directories on the same filesystem, as every move is a
/// plain rename.
pub fn merge(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<(), TraceError> {
	let (src, dst) = (src.as_ref(), dst.as_ref());

	check_real_dir(src, "source")?;
	check_real_dir(dst, "destination")?;
	check_same_volume(src, dst)?;

	merge_entries(src, dst)
}

fn check_real_dir(path: &Path, role: &'static str) -> Result<(), TraceError> {
	match fs::symlink_metadata(path) {
		Ok(metadata) if metadata.is_dir() => Ok(()),
		Ok(_) => Err(TraceError::NotADirectory {
			role,
			path: path.into(),
		}),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TraceError::NotADirectory {
			role,
			path: path.into(),
		}),
		Err(e) => Err(FileIOError::from((path, e)).into()),
	}
}

#[cfg(unix)]
fn check_same_volume(src: &Path, dst: &Path) -> Result<(), TraceError> {
	use std::os::unix::fs::MetadataExt;

	let device = |path: &Path| {
		fs::symlink_metadata(path)
			.map(|metadata| metadata.dev())
			.map_err(|e| FileIOError::from((path, e)))
	};

	if device(src)? == device(dst)? {
		Ok(())
	} else {
		Err(TraceError::CrossVolume {
			src: src.into(),
			dst: dst.into(),
		})
	}
}

#[cfg(not(unix))]
fn check_same_volume(_src: &Path, _dst: &Path) -> Result<(), TraceError> {
	// Renames across volumes fail on their own here
	Ok(())
}

fn is_empty_dir(path: &Path) -> Result<bool, TraceError> {
	Ok(fs::read_dir(path)
		.map_err(|e| FileIOError::from((path, e)))?
		.next()
		.is_none())
}

fn rename(from: &Path, to: &Path) -> Result<(), TraceError> {
	fs::rename(from, to)
		.map_err(|e| FileIOError::from((from, e, "Failed to move entry into destination")).into())
}

fn merge_entries(src: &Path, dst: &Path) -> Result<(), TraceError> {
	let mut entries = fs::read_dir(src)
		.map_err(|e| FileIOError::from((src, e)))?
		.map(|entry| -> Result<_, TraceError> {
			let entry = entry.map_err(|e| FileIOError::from((src, e)))?;
			let file_type = entry
				.file_type()
				.map_err(|e| FileIOError::from((entry.path(), e)))?;
			Ok((entry.file_name(), file_type))
		})
		.collect::<Result<Vec<_>, TraceError>>()?;

	// Keep the move order stable, failures then always hit the same entry
	entries.sort_by(|(a, _), (b, _)| a.cmp(b));

	for (name, src_type) in entries {
		let (src_path, dst_path) = (src.join(&name), dst.join(&name));

		let dst_type = match fs::symlink_metadata(&dst_path) {
			Ok(metadata) => Some(metadata.file_type()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => None,
			Err(e) => return Err(FileIOError::from((&dst_path, e)).into()),
		};

		move_entry(&src_path, src_type, &dst_path, dst_type)?;
	}

	Ok(())
}

fn move_entry(
	src: &Path,
	src_type: FileType,
	dst: &Path,
	dst_type: Option<FileType>,
) -> Result<(), TraceError> {
	// DirEntry and symlink_metadata file types never follow symlinks, so
	// `is_dir` here means a real directory
	match (src_type.is_dir(), dst_type.map(|t| t.is_dir())) {
		(_, None) => trace!(src = %src.display(), "moving new entry"),

		(true, Some(true)) => {
			if is_empty_dir(dst)? {
				trace!(dst = %dst.display(), "replacing empty directory");
			} else if git::is_work_tree_root(src)? {
				trace!(dst = %dst.display(), "git working tree replaces directory");
				fs::remove_dir_all(dst).map_err(|e| FileIOError::from((dst, e)))?;
			} else {
				trace!(src = %src.display(), dst = %dst.display(), "merging directories");
				merge_entries(src, dst)?;
				return fs::remove_dir(src)
					.map_err(|e| FileIOError::from((src, e, "Failed to remove merged directory")).into());
			}
		}

		(true, Some(false)) => {
			trace!(dst = %dst.display(), "directory replaces file");
			fs::remove_file(dst).map_err(|e| FileIOError::from((dst, e)))?;
		}

		(false, Some(true)) => {
			if !is_empty_dir(dst)? {
				return Err(TraceError::FileOverPopulatedDir {
					src: src.into(),
					dst: dst.into(),
				});
			}
			trace!(dst = %dst.display(), "file replaces empty directory");
			fs::remove_dir(dst).map_err(|e| FileIOError::from((dst, e)))?;
		}

		(false, Some(false)) => trace!(dst = %dst.display(), "overwriting file"),
	}

	rename(src, dst)
}
