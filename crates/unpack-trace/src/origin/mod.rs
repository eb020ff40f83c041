//! Download location resolution.
//!
//! Local files are resolved from the git working tree holding them (see
//! [`local`]), every other source from its descriptor (see [`descriptor`]).
//! Every lookup is memoized for the whole session, and each download location
//! gets exactly one [`DownloadLocationEntry`].

use crate::{
	config::TraceConfig,
	error::{FileIOError, TraceError},
	report::{DownloadLocationEntry, OriginId},
	source::{Fetcher, MetadataStore, SourceDescriptor},
	uri,
};

use std::{
	collections::{BTreeMap, HashMap, HashSet},
	fs,
	path::{Path, PathBuf},
};

use tracing::debug;

mod descriptor;
mod local;

/// Memoized resolution of a real local path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathCacheEntry {
	/// `git+<remote>@<commit>` of the enclosing working tree, if the path is
	/// committed and HEAD is on a remote branch
	pub download_location: Option<String>,
	/// Path inside the repository, set along with `download_location`
	pub relpath: Option<String>,
	/// Source layer holding the path
	pub layer: Option<String>,
}

pub struct OriginResolver<'env> {
	config: &'env TraceConfig,
	store: &'env dyn MetadataStore,
	fetcher: &'env dyn Fetcher,
	// Canonical roots, longest first
	layers: Vec<(String, PathBuf)>,

	local_paths: HashMap<PathBuf, PathCacheEntry>,
	uris: HashMap<String, (String, String)>,
	dirty_files: HashMap<PathBuf, HashSet<String>>,
	lockfiles: HashMap<String, String>,
	checksums: Option<(String, BTreeMap<String, String>)>,

	entries: Vec<DownloadLocationEntry>,
	index: HashMap<String, OriginId>,
}

impl<'env> OriginResolver<'env> {
	pub fn new(
		config: &'env TraceConfig,
		store: &'env dyn MetadataStore,
		fetcher: &'env dyn Fetcher,
	) -> Self {
		let mut layers = store
			.source_layers()
			.into_iter()
			.map(|(name, root)| {
				let root = fs::canonicalize(&root).unwrap_or(root);
				(name, root)
			})
			.collect::<Vec<_>>();
		layers.sort_by_key(|(_, root)| std::cmp::Reverse(root.components().count()));

		Self {
			config,
			store,
			fetcher,
			layers,
			local_paths: HashMap::new(),
			uris: HashMap::new(),
			dirty_files: HashMap::new(),
			lockfiles: HashMap::new(),
			checksums: None,
			entries: vec![],
			index: HashMap::new(),
		}
	}

	#[must_use]
	pub fn entry(&self, id: OriginId) -> &DownloadLocationEntry {
		&self.entries[id.0]
	}

	pub(crate) fn entry_mut(&mut self, id: OriginId) -> &mut DownloadLocationEntry {
		&mut self.entries[id.0]
	}

	#[must_use]
	pub fn find(&self, download_location: &str) -> Option<OriginId> {
		self.index.get(download_location).copied()
	}

	/// Origin table in [`OriginId`] order.
	#[must_use]
	pub fn entries(&self) -> &[DownloadLocationEntry] {
		&self.entries
	}

	#[must_use]
	pub fn fetcher(&self) -> &'env dyn Fetcher {
		self.fetcher
	}

	/// Download location of a lockfile already committed for `url`.
	#[must_use]
	pub fn lockfile_origin(&self, url: &str) -> Option<&str> {
		self.lockfiles.get(url).map(String::as_str)
	}

	pub(crate) fn remember_lockfile(&mut self, url: &str, download_location: &str) {
		self.lockfiles
			.insert(url.to_string(), download_location.to_string());
	}

	/// Source layer holding a real path; the deepest root wins when layers nest.
	#[must_use]
	pub fn layer_of(&self, real_path: &Path) -> Option<&(String, PathBuf)> {
		self.layers
			.iter()
			.find(|(_, root)| real_path.starts_with(root))
	}

	/// Raw declaration and redacted form of a source uri.
	pub fn unexpanded_and_clean_uri(&mut self, src_uri: &str) -> (String, String) {
		if let Some(cached) = self.uris.get(src_uri) {
			return cached.clone();
		}

		let unexpanded =
			uri::unexpanded_source_uri(src_uri, self.store, &self.config.source_uri_var)
				.unwrap_or_else(|e| {
					debug!(%src_uri, %e, "no raw declaration for source uri");
					src_uri.to_string()
				});
		let clean = uri::redact(src_uri).into_owned();

		self.uris
			.insert(src_uri.to_string(), (unexpanded.clone(), clean.clone()));

		(unexpanded, clean)
	}

	/// Checksums are kept for one source only: the first checksum capable
	/// descriptor claims the slot and every other one gets none.
	fn package_checksums(&mut self, descriptor: &dyn SourceDescriptor) -> BTreeMap<String, String> {
		if !descriptor.supports_checksum() {
			return BTreeMap::new();
		}

		let (url, checksums) = self.checksums.get_or_insert_with(|| {
			let checksums = self
				.config
				.checksum_algorithms
				.iter()
				.filter_map(|algorithm| {
					descriptor
						.expected_checksum(algorithm)
						.map(|digest| (algorithm.clone(), digest.to_string()))
				})
				.collect();
			(descriptor.url().to_string(), checksums)
		});

		if url == descriptor.url() {
			checksums.clone()
		} else {
			BTreeMap::new()
		}
	}

	/// Get the entry for `download_location`, creating it on first reference.
	fn intern(
		&mut self,
		download_location: String,
		src_uri: &str,
		checksum_source: Option<&dyn SourceDescriptor>,
		layer: Option<String>,
	) -> OriginId {
		if let Some(id) = self.find(&download_location) {
			return id;
		}

		let (unexpanded, clean) = self.unexpanded_and_clean_uri(src_uri);
		let checksums = checksum_source
			.map(|descriptor| self.package_checksums(descriptor))
			.unwrap_or_default();

		let id = OriginId(self.entries.len());
		self.index.insert(download_location.clone(), id);
		self.entries.push(DownloadLocationEntry {
			download_location,
			unexpanded_src_uri: (unexpanded != clean).then_some(unexpanded),
			src_uri: clean,
			checksums,
			layer,
			..Default::default()
		});

		id
	}
}

fn canonicalize(path: &Path) -> Result<PathBuf, TraceError> {
	fs::canonicalize(path)
		.map_err(|e| FileIOError::from((path, e, "Failed to resolve real path")).into())
}
