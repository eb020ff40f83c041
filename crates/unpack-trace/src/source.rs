//! Interfaces into the systems surrounding a tracing session: the fetcher that
//! downloads and unpacks sources, and the recipe metadata store.

use crate::error::TraceError;

use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// One nested module unpacked from a composite source, like a git submodule or
/// a package installed from a lockfile.
///
/// Both directories are relative to the destination of the main descriptor;
/// an empty `parent_destdir` names the main element itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
	pub url: String,
	pub destdir: PathBuf,
	#[serde(default)]
	pub parent_destdir: PathBuf,
	#[serde(default)]
	pub revision: Option<String>,
}

/// A package of a lockfile driven source, tagged with its position in the
/// dependency tree (`[a]`, `[a, b]`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
	pub url: String,
	pub version: String,
	pub deptree: Vec<String>,
}

/// Read-only view over a source uri after it has been fetched.
pub trait SourceDescriptor {
	/// The expanded source uri this descriptor was built from
	fn url(&self) -> &str;

	/// Type name, like `https`, `git`, `gitsm`, `npmsw` or `file`
	fn kind(&self) -> &str;

	fn host(&self) -> &str;

	fn path(&self) -> &str;

	/// Transport protocol, for types that support more than one
	fn protocol(&self) -> Option<&str> {
		None
	}

	/// Plain HTTP(S) url a registry source actually downloads from
	fn fetch_url(&self) -> Option<&str> {
		None
	}

	fn params(&self) -> &BTreeMap<String, String>;

	/// Ordered revision slots of a multi-ref source
	fn revision_names(&self) -> &[String] {
		&[]
	}

	fn revision(&self, name: &str) -> Option<&str>;

	/// Where the fetcher unpacks this source
	fn destdir(&self) -> &Path;

	/// Local file or directory backing a `file` source
	fn local_path(&self) -> Option<&Path> {
		None
	}

	/// Whether a `file` source was an archive extracted at unpack time
	fn is_unpacked_archive(&self) -> bool {
		false
	}

	fn supports_checksum(&self) -> bool {
		false
	}

	fn expected_checksum(&self, algorithm: &str) -> Option<&str>;

	/// Whether the source type pins a revision
	fn supports_srcrev(&self) -> bool {
		false
	}

	fn modules(&self) -> &[ModuleRecord] {
		&[]
	}

	fn dependencies(&self) -> &[DependencyRecord] {
		&[]
	}

	/// Local copy of the lockfile of a lockfile driven source
	fn lockfile(&self) -> Option<&Path> {
		None
	}

	/// Revision held by the first revision slot.
	fn pinned_revision(&self) -> Option<&str> {
		self.revision_names()
			.first()
			.and_then(|name| self.revision(name))
	}
}

/// Builds descriptors for uris the session discovers on its own, like nested
/// modules and dependency tree nodes.
pub trait Fetcher {
	fn descriptor(
		&self,
		uri: &str,
		revision: Option<&str>,
	) -> Result<Box<dyn SourceDescriptor>, TraceError>;
}

/// Name and version of the recipe being traced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeIdentity {
	pub name: String,
	pub version: String,
}

/// Recipe variable store.
pub trait MetadataStore {
	/// Expanded value of a variable
	fn var(&self, name: &str) -> Option<String>;

	/// Raw value of a variable, before any expansion
	fn var_unexpanded(&self, name: &str) -> Option<String>;

	fn expand(&self, value: &str) -> String;

	/// Named local source layer roots
	fn source_layers(&self) -> BTreeMap<String, PathBuf>;

	fn identity(&self) -> Option<RecipeIdentity> {
		let non_empty = |name: &str| self.var(name).filter(|value| !value.is_empty());

		Some(RecipeIdentity {
			name: non_empty("PN")?,
			version: non_empty("PV")?,
		})
	}
}
