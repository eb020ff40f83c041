use crate::{
	error::{NonUtf8PathError, TraceError},
	git,
	report::OriginId,
	uri::LOCAL_PATH_PLACEHOLDER,
};

use std::path::Path;

use tracing::warn;

use super::{canonicalize, OriginResolver, PathCacheEntry};

impl OriginResolver<'_> {
	/// Resolve a local file or directory to the upstream repository it was
	/// committed to.
	///
	/// Files that are untracked, modified or staged but not committed have no
	/// upstream, neither do directories outside of any git working tree with a
	/// remote.
	pub fn resolve_local_path(&mut self, path: &Path) -> Result<PathCacheEntry, TraceError> {
		let real_path = canonicalize(path)?;

		if let Some(cached) = self.local_paths.get(&real_path) {
			return Ok(cached.clone());
		}

		let resolved = if real_path.is_dir() {
			let origin = git::remote_origin(&real_path, &self.config.manifest_remote)?;
			PathCacheEntry {
				layer: self.layer_of(&real_path).map(|(name, _)| name.clone()),
				relpath: origin.as_ref().map(|origin| origin.prefix.clone()),
				download_location: origin.map(|origin| origin.download_location),
			}
		} else {
			self.resolve_local_file(&real_path)?
		};

		self.local_paths.insert(real_path, resolved.clone());

		Ok(resolved)
	}

	fn resolve_local_file(&mut self, real_path: &Path) -> Result<PathCacheEntry, TraceError> {
		let (Some(dir), Some(name)) = (real_path.parent(), real_path.file_name()) else {
			return Ok(PathCacheEntry::default());
		};
		let name = name
			.to_str()
			.ok_or_else(|| NonUtf8PathError(real_path.into()))?;

		let PathCacheEntry {
			download_location,
			relpath,
			layer,
		} = self.resolve_local_path(dir)?;

		let (Some(download_location), Some(dir_relpath)) = (download_location, relpath) else {
			return Ok(PathCacheEntry {
				layer,
				..Default::default()
			});
		};

		let relpath = if dir_relpath.is_empty() {
			name.to_string()
		} else {
			format!("{dir_relpath}/{name}")
		};

		if !real_path.ends_with(&relpath) {
			return Err(TraceError::RelativePathMismatch {
				relpath,
				path: real_path.into(),
			});
		}

		let Some(repo_root) = real_path.ancestors().nth(Path::new(&relpath).components().count())
		else {
			return Err(TraceError::RelativePathMismatch {
				relpath,
				path: real_path.into(),
			});
		};

		if self.is_dirty(repo_root, &relpath)? {
			return Ok(PathCacheEntry {
				layer,
				..Default::default()
			});
		}

		Ok(PathCacheEntry {
			download_location: Some(download_location),
			relpath: Some(relpath),
			layer,
		})
	}

	fn is_dirty(&mut self, repo_root: &Path, relpath: &str) -> Result<bool, TraceError> {
		if !self.dirty_files.contains_key(repo_root) {
			let dirty = git::dirty_files(repo_root)?;
			self.dirty_files.insert(repo_root.to_path_buf(), dirty);
		}

		Ok(self
			.dirty_files
			.get(repo_root)
			.is_some_and(|dirty| dirty.contains(relpath)))
	}

	/// Origin of a local file source.
	///
	/// When no upstream can be found, a stable stand-in location is used: one
	/// under the source layer holding the path, or the bare local path.
	pub fn resolve_local(&mut self, src_uri: &str, path: &Path) -> Result<OriginId, TraceError> {
		let PathCacheEntry {
			download_location,
			relpath,
			layer,
		} = self.resolve_local_path(path)?;

		let download_location = if let (Some(download_location), Some(relpath)) =
			(download_location, relpath)
		{
			format!("{download_location}#{relpath}")
		} else {
			let real_path = canonicalize(path)?;

			let fallback = match self.layer_of(&real_path) {
				Some((name, root)) => {
					let in_layer = real_path
						.strip_prefix(root)
						.unwrap_or(&real_path)
						.to_str()
						.ok_or_else(|| NonUtf8PathError(real_path.as_path().into()))?;
					format!("file://{LOCAL_PATH_PLACEHOLDER}/{name}/{in_layer}")
				}
				None => format!("file://{}", real_path.display()),
			};

			warn!(
				"Can't find upstream source for {}, using {fallback} as download location",
				path.display()
			);

			fallback
		};

		Ok(self.intern(download_location, src_uri, None, layer))
	}
}
