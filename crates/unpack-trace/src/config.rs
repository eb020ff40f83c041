//! Tracing session configuration.
//!
//! Every field carries a default, so an empty JSON object (or a missing file)
//! yields the stock behavior.

use crate::error::{FileIOError, TraceError};

use std::{collections::BTreeMap, fs, io, path::Path};

use serde::{Deserialize, Serialize};

/// How a source type is traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
	/// Local files and directories, resolved from their path on disk
	File,
	/// Any single-origin remote source (archives, plain VCS clones, ...)
	Plain,
	/// Language registry sources, normalized to the URL they download from
	Registry,
	/// VCS sources with recursively unpacked submodules
	Submodules,
	/// Lockfile driven package sources carrying a dependency tree
	Lockfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
	pub vcs_dirs: Vec<String>,
	pub module_dirs: Vec<String>,
	pub source_uri_var: String,
	pub manifest_remote: String,
	pub checksum_algorithms: Vec<String>,
	pub kind_aliases: BTreeMap<String, String>,
	pub registry_kinds: Vec<String>,
	pub submodule_kinds: Vec<String>,
	pub lockfile_kinds: Vec<String>,
	pub package_kinds: Vec<String>,
	pub compression_level: i32,
}

impl Default for TraceConfig {
	fn default() -> Self {
		fn strings(items: &[&str]) -> Vec<String> {
			items.iter().map(ToString::to_string).collect()
		}

		Self {
			vcs_dirs: strings(&[".git", ".hg", ".svn"]),
			module_dirs: strings(&["node_modules"]),
			source_uri_var: "SRC_URI".to_string(),
			manifest_remote: "m".to_string(),
			checksum_algorithms: strings(&["md5", "sha256", "sha1", "sha384", "sha512"]),
			kind_aliases: BTreeMap::from([("gitsm".to_string(), "git".to_string())]),
			registry_kinds: strings(&["crate"]),
			submodule_kinds: strings(&["gitsm"]),
			lockfile_kinds: strings(&["npmsw"]),
			package_kinds: strings(&["npm", "npmsw"]),
			compression_level: 3,
		}
	}
}

impl TraceConfig {
	/// Load a configuration from a JSON file, falling back to defaults when the
	/// file does not exist.
	pub fn load_from(path: impl AsRef<Path>) -> Result<Self, TraceError> {
		let path = path.as_ref();

		let json = match fs::read_to_string(path) {
			Ok(json) => json,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
			Err(e) => {
				return Err(FileIOError::from((path, e, "Failed to read trace config")).into())
			}
		};

		serde_json::from_str(&json).map_err(|e| TraceError::Config {
			path: path.into(),
			reason: e.to_string(),
		})
	}

	#[must_use]
	pub fn classify(&self, kind: &str) -> SourceKind {
		let contains = |kinds: &[String]| kinds.iter().any(|k| k == kind);

		if kind == "file" {
			SourceKind::File
		} else if contains(&self.lockfile_kinds) {
			SourceKind::Lockfile
		} else if contains(&self.submodule_kinds) {
			SourceKind::Submodules
		} else if contains(&self.registry_kinds) {
			SourceKind::Registry
		} else {
			SourceKind::Plain
		}
	}

	/// Type name as it appears in a download location.
	#[must_use]
	pub fn location_kind<'a>(&'a self, kind: &'a str) -> &'a str {
		self.kind_aliases.get(kind).map_or(kind, String::as_str)
	}

	/// Names pruned by the scanner for a given source type.
	#[must_use]
	pub fn scan_excludes(&self, kind: &str) -> Vec<String> {
		let mut excludes = self.vcs_dirs.clone();
		if self.package_kinds.iter().any(|k| k == kind) {
			excludes.extend(self.module_dirs.iter().cloned());
		}
		excludes
	}
}
