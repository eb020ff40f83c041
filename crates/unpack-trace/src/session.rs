use crate::{
	collector::Collector,
	config::TraceConfig,
	error::{FileIOError, TraceError},
	merge::merge,
	report::{self, OriginId, Report},
	source::{Fetcher, MetadataStore, SourceDescriptor},
};

use std::{
	fs,
	path::{Path, PathBuf},
};

use tempfile::TempDir;
use tracing::{debug, info};

pub const REPORT_SUFFIX: &str = "unpack.trace.json.zst";

/// Tracing of one recipe's unpack.
///
/// Sources get unpacked into [`scratch_dir`](Self::scratch_dir) one at a time,
/// each [`commit`](Self::commit)ted right after. Once every source went
/// through, [`move_to_root`](Self::move_to_root) merges the scratch area into
/// the root, [`write_report`](Self::write_report) persists the report and
/// [`close`](Self::close) checks the scratch area was fully moved.
///
/// The scratch area is removed when the session is dropped, `close` reached or
/// not.
pub struct TraceSession<'env> {
	root: PathBuf,
	config: &'env TraceConfig,
	store: &'env dyn MetadataStore,
	collector: Collector<'env>,
	scratch: TempDir,
}

impl<'env> TraceSession<'env> {
	/// Start a session, creating `root` if needed and a fresh scratch area
	/// inside it, so both live on the same filesystem.
	pub fn new(
		root: impl Into<PathBuf>,
		config: &'env TraceConfig,
		store: &'env dyn MetadataStore,
		fetcher: &'env dyn Fetcher,
	) -> Result<Self, TraceError> {
		let root = root.into();

		fs::create_dir_all(&root).map_err(|e| FileIOError::from((&root, e)))?;

		let scratch = tempfile::Builder::new()
			.prefix(".unpack-trace-")
			.tempdir_in(&root)
			.map_err(|e| FileIOError::from((&root, e, "Failed to create scratch area")))?;

		debug!(scratch = %scratch.path().display(), "tracing session started");

		Ok(Self {
			collector: Collector::new(config, scratch.path(), store, fetcher),
			root,
			config,
			store,
			scratch,
		})
	}

	#[must_use]
	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Where sources must be unpacked before being committed.
	#[must_use]
	pub fn scratch_dir(&self) -> &Path {
		self.scratch.path()
	}

	#[must_use]
	pub const fn collector(&self) -> &Collector<'env> {
		&self.collector
	}

	pub fn commit(
		&mut self,
		src_uri: &str,
		descriptor: &dyn SourceDescriptor,
		subdir: Option<&Path>,
		revision: Option<&str>,
	) -> Result<OriginId, TraceError> {
		self.collector.commit(src_uri, descriptor, subdir, revision)
	}

	pub fn commit_all(
		&mut self,
		src_uri: &str,
		descriptor: &dyn SourceDescriptor,
	) -> Result<Vec<OriginId>, TraceError> {
		self.collector.commit_all(src_uri, descriptor)
	}

	/// Merge everything unpacked so far into the root.
	pub fn move_to_root(&self) -> Result<(), TraceError> {
		merge(self.scratch.path(), &self.root)
	}

	#[must_use]
	pub fn report(&self) -> Report {
		self.collector.report()
	}

	/// Where the report of this recipe goes, if the recipe identity is known.
	#[must_use]
	pub fn report_path(&self) -> Option<PathBuf> {
		self.store.identity().map(|identity| {
			self.root.join("temp").join(format!(
				"{}-{}.{REPORT_SUFFIX}",
				identity.name, identity.version
			))
		})
	}

	/// Write the report, returning its path. Without a recipe identity there is
	/// nothing to persist and nothing gets written.
	pub fn write_report(&self) -> Result<Option<PathBuf>, TraceError> {
		let Some(path) = self.report_path() else {
			debug!("no recipe identity, skipping trace report");
			return Ok(None);
		};

		report::write(&path, &self.report(), self.config.compression_level)?;

		info!(path = %path.display(), "unpack trace report written");

		Ok(Some(path))
	}

	/// End the session, removing the scratch area; fails if anything was left
	/// in it.
	pub fn close(self) -> Result<(), TraceError> {
		let scratch = self.scratch.path();

		let is_empty = fs::read_dir(scratch)
			.map_err(|e| FileIOError::from((scratch, e)))?
			.next()
			.is_none();

		if !is_empty {
			return Err(TraceError::ScratchNotEmpty(scratch.into()));
		}

		let scratch = scratch.to_path_buf();
		self.scratch
			.close()
			.map_err(|e| FileIOError::from((scratch, e, "Failed to remove scratch area")).into())
	}
}

/// Read a report written by [`TraceSession::write_report`].
pub fn read_report(path: impl AsRef<Path>) -> Result<Report, TraceError> {
	report::read(path)
}
