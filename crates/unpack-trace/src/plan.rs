//! Collaborators backed by plain data, for tracing sources that were fetched
//! ahead of time and described in a JSON plan.

use crate::{
	error::{FileIOError, TraceError},
	source::{DependencyRecord, Fetcher, MetadataStore, ModuleRecord, SourceDescriptor},
	uri::{self, SourceUri},
};

use std::{
	collections::{BTreeMap, HashMap},
	fs,
	path::{Path, PathBuf},
	sync::LazyLock,
};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static VARIABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\$\{([A-Za-z0-9_+.:\-]+)\}").expect("valid variable reference regex")
});

const MAX_EXPANSION_DEPTH: usize = 16;

/// Descriptor with every property known upfront.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticDescriptor {
	pub url: String,
	pub kind: String,
	pub host: String,
	pub path: String,
	pub protocol: Option<String>,
	pub fetch_url: Option<String>,
	pub params: BTreeMap<String, String>,
	pub revision_names: Vec<String>,
	pub revisions: BTreeMap<String, String>,
	pub destdir: PathBuf,
	pub local_path: Option<PathBuf>,
	pub unpacked_archive: bool,
	pub supports_checksum: bool,
	pub checksums: BTreeMap<String, String>,
	pub supports_srcrev: bool,
	pub modules: Vec<ModuleRecord>,
	pub dependencies: Vec<DependencyRecord>,
	pub lockfile: Option<PathBuf>,
}

impl StaticDescriptor {
	/// Descriptor decoded from the uri alone. A `rev` parameter pins the
	/// revision slot named by the `name` parameter, and `crate` uris get the
	/// registry download url of their `<name>/<version>` path.
	pub fn from_uri(uri: &str) -> Result<Self, TraceError> {
		let SourceUri {
			kind,
			host,
			path,
			params,
		} = SourceUri::parse(uri).ok_or_else(|| TraceError::Fetcher {
			uri: uri.to_string(),
			reason: "not a source uri".to_string(),
		})?;

		let mut descriptor = Self {
			url: uri.to_string(),
			protocol: params.get("protocol").cloned(),
			local_path: (kind == "file").then(|| PathBuf::from(&path)),
			kind,
			host,
			path,
			..Default::default()
		};

		if let Some(revision) = uri::param(uri, "rev") {
			let name = uri::param(uri, "name").unwrap_or("default").to_string();
			descriptor
				.revisions
				.insert(name.clone(), revision.to_string());
			descriptor.revision_names.push(name);
			descriptor.supports_srcrev = true;
		}

		if descriptor.kind == "crate" {
			descriptor.fetch_url = crate_download_url(&descriptor.host, &descriptor.path);
		}

		descriptor.params = params;

		Ok(descriptor)
	}
}

fn crate_download_url(host: &str, path: &str) -> Option<String> {
	let (name, version) = path.trim_matches('/').split_once('/')?;
	(!name.is_empty() && !version.is_empty() && !version.contains('/'))
		.then(|| format!("https://{host}/api/v1/crates/{name}/{version}/download"))
}

impl SourceDescriptor for StaticDescriptor {
	fn url(&self) -> &str {
		&self.url
	}

	fn kind(&self) -> &str {
		&self.kind
	}

	fn host(&self) -> &str {
		&self.host
	}

	fn path(&self) -> &str {
		&self.path
	}

	fn protocol(&self) -> Option<&str> {
		self.protocol.as_deref()
	}

	fn fetch_url(&self) -> Option<&str> {
		self.fetch_url.as_deref()
	}

	fn params(&self) -> &BTreeMap<String, String> {
		&self.params
	}

	fn revision_names(&self) -> &[String] {
		&self.revision_names
	}

	fn revision(&self, name: &str) -> Option<&str> {
		self.revisions.get(name).map(String::as_str)
	}

	fn destdir(&self) -> &Path {
		&self.destdir
	}

	fn local_path(&self) -> Option<&Path> {
		self.local_path.as_deref()
	}

	fn is_unpacked_archive(&self) -> bool {
		self.unpacked_archive
	}

	fn supports_checksum(&self) -> bool {
		self.supports_checksum
	}

	fn expected_checksum(&self, algorithm: &str) -> Option<&str> {
		self.checksums.get(algorithm).map(String::as_str)
	}

	fn supports_srcrev(&self) -> bool {
		self.supports_srcrev
	}

	fn modules(&self) -> &[ModuleRecord] {
		&self.modules
	}

	fn dependencies(&self) -> &[DependencyRecord] {
		&self.dependencies
	}

	fn lockfile(&self) -> Option<&Path> {
		self.lockfile.as_deref()
	}
}

/// Hands out known descriptors by url, decoding unknown uris on the fly.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
	descriptors: HashMap<String, StaticDescriptor>,
}

impl StaticFetcher {
	pub fn new(descriptors: impl IntoIterator<Item = StaticDescriptor>) -> Self {
		Self {
			descriptors: descriptors
				.into_iter()
				.map(|descriptor| (descriptor.url.clone(), descriptor))
				.collect(),
		}
	}

	pub fn insert(&mut self, descriptor: StaticDescriptor) {
		self.descriptors.insert(descriptor.url.clone(), descriptor);
	}
}

impl Fetcher for StaticFetcher {
	fn descriptor(
		&self,
		uri: &str,
		_revision: Option<&str>,
	) -> Result<Box<dyn SourceDescriptor>, TraceError> {
		let descriptor = match self.descriptors.get(uri) {
			Some(descriptor) => descriptor.clone(),
			None => StaticDescriptor::from_uri(uri)?,
		};

		Ok(Box::new(descriptor))
	}
}

/// Variable store over raw `${NAME}` referencing values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticMetadata {
	pub vars: BTreeMap<String, String>,
	pub layers: BTreeMap<String, PathBuf>,
}

impl StaticMetadata {
	fn expand_with_depth(&self, value: &str, depth: usize) -> String {
		if depth >= MAX_EXPANSION_DEPTH {
			return value.to_string();
		}

		VARIABLE_REFERENCE
			.replace_all(value, |captures: &Captures<'_>| {
				self.vars.get(&captures[1]).map_or_else(
					|| captures[0].to_string(),
					|raw| self.expand_with_depth(raw, depth + 1),
				)
			})
			.into_owned()
	}
}

impl MetadataStore for StaticMetadata {
	fn var(&self, name: &str) -> Option<String> {
		self.vars.get(name).map(|raw| self.expand(raw))
	}

	fn var_unexpanded(&self, name: &str) -> Option<String> {
		self.vars.get(name).cloned()
	}

	fn expand(&self, value: &str) -> String {
		self.expand_with_depth(value, 0)
	}

	fn source_layers(&self) -> BTreeMap<String, PathBuf> {
		self.layers.clone()
	}
}

/// Copy of a local path into a source's destination, standing in for the
/// fetcher's own unpack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpackStep {
	pub from: PathBuf,
	/// Relative to the source's destination
	#[serde(default)]
	pub to: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSource {
	/// Its `destdir` is relative to the scratch area
	pub descriptor: StaticDescriptor,
	#[serde(default)]
	pub unpack: Vec<UnpackStep>,
}

/// A recipe's sources, in unpack order, with the metadata needed to trace them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
	pub metadata: StaticMetadata,
	pub sources: Vec<PlannedSource>,
	/// Descriptors of module and dependency uris
	pub descriptors: Vec<StaticDescriptor>,
}

impl Plan {
	pub fn load(path: impl AsRef<Path>) -> Result<Self, TraceError> {
		let path = path.as_ref();

		let json = fs::read_to_string(path)
			.map_err(|e| FileIOError::from((path, e, "Failed to read trace plan")))?;

		Ok(serde_json::from_str(&json)?)
	}

	/// Fetcher knowing every descriptor of the plan.
	#[must_use]
	pub fn fetcher(&self) -> StaticFetcher {
		StaticFetcher::new(
			self.sources
				.iter()
				.map(|source| source.descriptor.clone())
				.chain(self.descriptors.iter().cloned()),
		)
	}
}
