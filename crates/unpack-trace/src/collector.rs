use crate::{
	config::{SourceKind, TraceConfig},
	deptree,
	error::{FileIOError, NonUtf8PathError, TraceError},
	origin::OriginResolver,
	report::{compact, FileContent, OriginId, ProvenanceRecord, Report},
	scan::scan,
	source::{Fetcher, MetadataStore, ModuleRecord, SourceDescriptor},
};

use std::{
	collections::BTreeMap,
	fs::{self, File},
	io,
	path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

/// How a committed uri relates to the descriptor it was unpacked from.
#[derive(Debug, Clone, Copy)]
enum Element<'d> {
	/// A local file or directory
	PlainFile,
	/// The uri the descriptor was built from: a main repository, a lockfile or
	/// any single-origin source
	TopLevel,
	/// A module unpacked on behalf of the descriptor. Only its direct parent is
	/// linked, deeper ancestry is not walked.
	Nested(Option<&'d ModuleRecord>),
}

/// Accumulates provenance records for everything unpacked in a scratch area.
pub struct Collector<'env> {
	config: &'env TraceConfig,
	scratch: PathBuf,
	resolver: OriginResolver<'env>,
	records: BTreeMap<String, Vec<ProvenanceRecord>>,
}

impl<'env> Collector<'env> {
	pub fn new(
		config: &'env TraceConfig,
		scratch: impl Into<PathBuf>,
		store: &'env dyn MetadataStore,
		fetcher: &'env dyn Fetcher,
	) -> Self {
		Self {
			config,
			scratch: scratch.into(),
			resolver: OriginResolver::new(config, store, fetcher),
			records: BTreeMap::new(),
		}
	}

	#[must_use]
	pub const fn resolver(&self) -> &OriginResolver<'env> {
		&self.resolver
	}

	/// Record every file and symlink `src_uri` unpacked under the descriptor's
	/// destination (or its `subdir`), along with their origin.
	///
	/// `src_uri` differs from the descriptor's url for modules unpacked on its
	/// behalf; `revision` pins such a module.
	#[instrument(skip(self, descriptor), fields(kind = descriptor.kind()), err)]
	pub fn commit(
		&mut self,
		src_uri: &str,
		descriptor: &dyn SourceDescriptor,
		subdir: Option<&Path>,
		revision: Option<&str>,
	) -> Result<OriginId, TraceError> {
		let destdir = subdir.map_or_else(
			|| descriptor.destdir().to_path_buf(),
			|subdir| descriptor.destdir().join(subdir),
		);
		let kind = self.config.classify(descriptor.kind());

		let scanned = scan(
			&destdir,
			self.config.scan_excludes(descriptor.kind()).as_slice(),
			kind == SourceKind::Submodules,
		)?;

		let element = if kind == SourceKind::File {
			Element::PlainFile
		} else if src_uri == descriptor.url() {
			Element::TopLevel
		} else {
			Element::Nested(descriptor.modules().iter().find(|module| {
				module.url == src_uri && subdir.map_or(true, |subdir| module.destdir == subdir)
			}))
		};

		let origin = self.resolve(src_uri, descriptor, kind, element, revision)?;

		for file in &scanned.files {
			let content = FileContent::Hash(sha256_file(file)?);
			let path_in_upstream = path_in_upstream(file, src_uri, descriptor, kind, &destdir)?;
			self.record(file, content, path_in_upstream, origin)?;
		}

		for link in &scanned.links {
			let target = fs::read_link(link).map_err(|e| FileIOError::from((link, e)))?;
			let content = FileContent::Symlink(path_to_string(&target)?);
			let path_in_upstream = path_in_upstream(link, src_uri, descriptor, kind, &destdir)?;
			self.record(link, content, path_in_upstream, origin)?;
		}

		debug!(
			files = scanned.files.len(),
			links = scanned.links.len(),
			download_location = %self.resolver.entry(origin).download_location,
			"committed unpacked source",
		);

		Ok(origin)
	}

	/// Commit the descriptor's own uri, then every module unpacked for it.
	pub fn commit_all(
		&mut self,
		src_uri: &str,
		descriptor: &dyn SourceDescriptor,
	) -> Result<Vec<OriginId>, TraceError> {
		let mut origins = vec![self.commit(src_uri, descriptor, None, None)?];

		for module in descriptor.modules() {
			origins.push(self.commit(
				&module.url,
				descriptor,
				Some(&module.destdir),
				module.revision.as_deref(),
			)?);
		}

		Ok(origins)
	}

	fn resolve(
		&mut self,
		src_uri: &str,
		descriptor: &dyn SourceDescriptor,
		kind: SourceKind,
		element: Element<'_>,
		revision: Option<&str>,
	) -> Result<OriginId, TraceError> {
		match (element, kind) {
			(Element::PlainFile, _) => {
				let local_path = descriptor
					.local_path()
					.ok_or_else(|| missing(descriptor, "local file source has no local path"))?;
				self.resolver.resolve_local(src_uri, local_path)
			}

			(Element::TopLevel, SourceKind::Lockfile) => self.resolve_lockfile(src_uri, descriptor),

			(Element::TopLevel, _) => {
				self.resolver
					.resolve_remote(src_uri, Some(descriptor), revision, None)
			}

			(Element::Nested(module), SourceKind::Lockfile) => {
				let id = self.resolve_module(src_uri, revision)?;

				let described_by = self
					.resolver
					.lockfile_origin(descriptor.url())
					.map(ToString::to_string);
				if described_by.is_none() {
					debug!(lockfile = descriptor.url(), "package committed before its lockfile");
				}

				let parent = match module.and_then(|module| parent_module(descriptor, module)) {
					Some(parent) => Some(self.resolve_module(&parent.url, parent.revision.as_deref())?),
					None => None,
				};
				let parent = parent.map(|parent| self.resolver.entry(parent).download_location.clone());

				let entry = self.resolver.entry_mut(id);
				if described_by.is_some() {
					entry.described_by = described_by;
				}
				if let Some(parent) = parent {
					if !entry.dependency_of.contains(&parent) {
						entry.dependency_of.push(parent);
					}
				}

				Ok(id)
			}

			(Element::Nested(module), _) => {
				let id = self.resolver.resolve_remote(
					src_uri,
					Some(descriptor),
					revision,
					Some(descriptor.url()),
				)?;

				let parent = match module.and_then(|module| parent_module(descriptor, module)) {
					Some(parent) => self.resolver.resolve_remote(
						&parent.url,
						None,
						parent.revision.as_deref(),
						Some(descriptor.url()),
					)?,
					None => self
						.resolver
						.resolve_remote(descriptor.url(), Some(descriptor), None, None)?,
				};

				let parent = self.resolver.entry(parent).download_location.clone();
				self.resolver.entry_mut(id).submodule_of = Some(parent);

				Ok(id)
			}
		}
	}

	fn resolve_lockfile(
		&mut self,
		src_uri: &str,
		descriptor: &dyn SourceDescriptor,
	) -> Result<OriginId, TraceError> {
		let lockfile = descriptor
			.lockfile()
			.ok_or_else(|| missing(descriptor, "lockfile driven source has no lockfile"))?;

		let id = self.resolver.resolve_local(src_uri, lockfile)?;

		let deptree = deptree::build(descriptor.dependencies(), |dependency| {
			let package = self.resolve_module(&dependency.url, None)?;
			let entry = self.resolver.entry(package);
			Ok((entry.download_location.clone(), entry.checksums.clone()))
		})?;

		let entry = self.resolver.entry_mut(id);
		entry.deptree = deptree;
		let download_location = entry.download_location.clone();
		self.resolver
			.remember_lockfile(descriptor.url(), &download_location);

		Ok(id)
	}

	/// Origin of a module uri, local or remote depending on its own kind.
	fn resolve_module(&mut self, uri: &str, revision: Option<&str>) -> Result<OriginId, TraceError> {
		let module = self.resolver.fetcher().descriptor(uri, revision)?;

		if self.config.classify(module.kind()) == SourceKind::File {
			let local_path = module
				.local_path()
				.ok_or_else(|| missing(module.as_ref(), "local file source has no local path"))?;
			self.resolver.resolve_local(uri, local_path)
		} else {
			self.resolver
				.resolve_remote(uri, Some(module.as_ref()), revision, None)
		}
	}

	fn record(
		&mut self,
		path: &Path,
		content: FileContent,
		path_in_upstream: String,
		origin: OriginId,
	) -> Result<(), TraceError> {
		let relative = path
			.strip_prefix(&self.scratch)
			.map_err(|_| TraceError::RelativePathMismatch {
				relpath: self.scratch.display().to_string(),
				path: path.into(),
			})?;
		let path_in_workdir = path_to_string(relative)?;

		self.records
			.entry(path_in_workdir)
			.or_default()
			.push(ProvenanceRecord {
				content,
				path_in_upstream,
				origin,
			});

		Ok(())
	}

	/// Report of everything committed so far.
	#[must_use]
	pub fn report(&self) -> Report {
		compact(self.records.clone(), self.resolver.entries().to_vec())
	}
}

/// Direct parent of a module, by destination. `None` stands for the main
/// element of the descriptor.
fn parent_module<'d>(
	descriptor: &'d dyn SourceDescriptor,
	module: &ModuleRecord,
) -> Option<&'d ModuleRecord> {
	if module.parent_destdir.as_os_str().is_empty() {
		return None;
	}

	descriptor
		.modules()
		.iter()
		.find(|candidate| candidate.destdir == module.parent_destdir)
}

/// Path of an unpacked file relative to its download location.
fn path_in_upstream(
	path: &Path,
	src_uri: &str,
	descriptor: &dyn SourceDescriptor,
	kind: SourceKind,
	destdir: &Path,
) -> Result<String, TraceError> {
	let relpath = path
		.strip_prefix(destdir)
		.map_err(|_| TraceError::RelativePathMismatch {
			relpath: destdir.display().to_string(),
			path: path.into(),
		})?;

	let relpath = match kind {
		SourceKind::File if descriptor.is_unpacked_archive() => relpath,

		SourceKind::File if descriptor.local_path().is_some_and(Path::is_dir) => {
			// Local directories are copied under their declared path
			let declared = Path::new(descriptor.path().trim_start_matches('/'));
			relpath
				.strip_prefix(declared)
				.or_else(|_| relpath.strip_prefix(declared.file_name().unwrap_or_default()))
				.unwrap_or(relpath)
		}

		// The download location already names the exact file
		SourceKind::File => return Ok(String::new()),

		SourceKind::Lockfile if src_uri == descriptor.url() => return Ok(String::new()),

		_ => relpath,
	};

	Ok(path_to_string(relpath)?)
}

fn path_to_string(path: &Path) -> Result<String, NonUtf8PathError> {
	path.to_str()
		.map(ToString::to_string)
		.ok_or_else(|| NonUtf8PathError(path.into()))
}

fn sha256_file(path: &Path) -> Result<String, TraceError> {
	let mut file = File::open(path).map_err(|e| FileIOError::from((path, e)))?;
	let mut hasher = Sha256::new();

	io::copy(&mut file, &mut hasher)
		.map_err(|e| FileIOError::from((path, e, "Failed to hash file")))?;

	Ok(hex::encode(hasher.finalize()))
}

fn missing(descriptor: &dyn SourceDescriptor, reason: &str) -> TraceError {
	TraceError::Fetcher {
		uri: descriptor.url().to_string(),
		reason: reason.to_string(),
	}
}
