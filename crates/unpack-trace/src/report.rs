//! Report data model, compaction of per path provenance records, and the
//! compressed JSON file format.
//!
//! ```json
//! {
//!   "<download location>": {
//!     "download_location": "<download location>",
//!     "src_uri": "<redacted source uri>",
//!     "unexpanded_src_uri": "<raw source uri>",
//!     "checksums": { "sha256": "<digest>" },
//!     "files": {
//!       "<path in upstream>": {
//!         "sha256": "<file digest>",
//!         "paths_in_workdir": ["<path in workdir>"]
//!       }
//!     }
//!   }
//! }
//! ```

use crate::{
	deptree::Deptree,
	error::{FileIOError, TraceError},
};

use std::{
	collections::BTreeMap,
	fs::{self, File},
	io::{BufReader, BufWriter, Write},
	path::Path,
};

use serde::{Deserialize, Serialize};

/// Traced sources keyed by download location.
pub type Report = BTreeMap<String, DownloadLocationEntry>;

/// Index of a [`DownloadLocationEntry`] in the session's origin table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginId(pub(crate) usize);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLocationEntry {
	pub download_location: String,
	pub src_uri: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unexpanded_src_uri: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub checksums: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub layer: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub deptree: Deptree,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub described_by: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub submodule_of: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub dependency_of: Vec<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub files: BTreeMap<String, FileEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sha256: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub symlink_to: Option<String>,
	pub paths_in_workdir: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
	Hash(String),
	Symlink(String),
}

/// What one unpack left at one working directory path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceRecord {
	pub content: FileContent,
	pub path_in_upstream: String,
	pub origin: OriginId,
}

/// Group the last record of every working directory path by origin.
///
/// `origins` is the session's origin table, in [`OriginId`] order. Every origin
/// ends up in the report, even the ones no file points to.
#[must_use]
pub fn compact(
	records: BTreeMap<String, Vec<ProvenanceRecord>>,
	mut origins: Vec<DownloadLocationEntry>,
) -> Report {
	for (path_in_workdir, mut history) in records {
		// Later unpacks overwrote earlier ones
		let Some(record) = history.pop() else {
			continue;
		};
		let Some(origin) = origins.get_mut(record.origin.0) else {
			continue;
		};

		origin
			.files
			.entry(record.path_in_upstream)
			.or_insert_with(|| {
				let (sha256, symlink_to) = match record.content {
					FileContent::Hash(hash) => (Some(hash), None),
					FileContent::Symlink(target) => (None, Some(target)),
				};
				FileEntry {
					sha256,
					symlink_to,
					paths_in_workdir: vec![],
				}
			})
			.paths_in_workdir
			.push(path_in_workdir);
	}

	origins
		.into_iter()
		.map(|entry| (entry.download_location.clone(), entry))
		.collect()
}

/// Write `report` as zstd compressed JSON, through a temporary sibling file
/// renamed into place.
pub fn write(path: impl AsRef<Path>, report: &Report, level: i32) -> Result<(), TraceError> {
	let path = path.as_ref();
	let tmp_path = path.with_extension("tmp");

	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).map_err(|e| FileIOError::from((parent, e)))?;
	}

	let file = File::create(&tmp_path)
		.map_err(|e| FileIOError::from((&tmp_path, e, "Failed to create report file")))?;

	let mut encoder = zstd::Encoder::new(file, level)
		.map_err(|e| FileIOError::from((&tmp_path, e, "Failed to create zstd encoder")))?;

	{
		let mut writer = BufWriter::new(&mut encoder);
		serde_json::to_writer(&mut writer, report)?;
		writer
			.flush()
			.map_err(|e| FileIOError::from((&tmp_path, e)))?;
	}

	encoder
		.finish()
		.map_err(|e| FileIOError::from((&tmp_path, e, "Failed to finish zstd stream")))?;

	fs::rename(&tmp_path, path)
		.map_err(|e| FileIOError::from((path, e, "Failed to move report into place")).into())
}

/// Read back a report written by [`write`].
pub fn read(path: impl AsRef<Path>) -> Result<Report, TraceError> {
	let path = path.as_ref();

	let file = File::open(path).map_err(|e| FileIOError::from((path, e)))?;
	let decoder = zstd::Decoder::new(file)
		.map_err(|e| FileIOError::from((path, e, "Failed to create zstd decoder")))?;

	Ok(serde_json::from_reader(BufReader::new(decoder))?)
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	fn origin(download_location: &str) -> DownloadLocationEntry {
		DownloadLocationEntry {
			download_location: download_location.to_string(),
			src_uri: download_location.to_string(),
			..Default::default()
		}
	}

	fn record(hash: &str, path_in_upstream: &str, origin: usize) -> ProvenanceRecord {
		ProvenanceRecord {
			content: FileContent::Hash(hash.to_string()),
			path_in_upstream: path_in_upstream.to_string(),
			origin: OriginId(origin),
		}
	}

	#[test]
	fn last_record_wins() {
		let origins = vec![origin("https://a"), origin("https://b"), origin("https://c")];
		let records = BTreeMap::from([(
			"src/config.h".to_string(),
			vec![
				record("aaa", "config.h", 0),
				record("bbb", "include/config.h", 1),
				record("ccc", "config.h", 2),
			],
		)]);

		let report = compact(records, origins);

		assert!(report["https://a"].files.is_empty());
		assert!(report["https://b"].files.is_empty());
		assert_eq!(
			report["https://c"].files,
			BTreeMap::from([(
				"config.h".to_string(),
				FileEntry {
					sha256: Some("ccc".to_string()),
					symlink_to: None,
					paths_in_workdir: vec!["src/config.h".to_string()],
				}
			)])
		);
	}

	#[test]
	fn same_upstream_file_in_many_places_is_one_entry() {
		let origins = vec![origin("https://registry.example.com/dep/-/dep-1.0.0.tgz")];
		let records = BTreeMap::from([
			(
				"node_modules/a/node_modules/dep/index.js".to_string(),
				vec![record("abc", "index.js", 0)],
			),
			(
				"node_modules/dep/index.js".to_string(),
				vec![record("abc", "index.js", 0)],
			),
			(
				"node_modules/dep/lib".to_string(),
				vec![ProvenanceRecord {
					content: FileContent::Symlink("../lib".to_string()),
					path_in_upstream: "lib".to_string(),
					origin: OriginId(0),
				}],
			),
		]);

		let report = compact(records, origins);
		let files = &report["https://registry.example.com/dep/-/dep-1.0.0.tgz"].files;

		assert_eq!(files.len(), 2);
		assert_eq!(
			files["index.js"].paths_in_workdir,
			vec![
				"node_modules/a/node_modules/dep/index.js".to_string(),
				"node_modules/dep/index.js".to_string(),
			]
		);
		assert_eq!(files["lib"].symlink_to.as_deref(), Some("../lib"));
		assert_eq!(files["lib"].sha256, None);
	}

	#[test]
	fn written_report_reads_back() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("temp/foo-1.0.unpack.trace.json.zst");

		let mut entry = origin("https://example.com/foo-1.0.tar.gz");
		entry
			.checksums
			.insert("sha256".to_string(), "0123abcd".to_string());
		let report = compact(
			BTreeMap::from([("foo-1.0/README".to_string(), vec![record("f00d", "README", 0)])]),
			vec![entry],
		);

		write(&path, &report, 3).unwrap();

		assert_eq!(read(&path).unwrap(), report);
		assert!(!path.with_extension("tmp").exists());
	}

	#[test]
	fn optional_fields_are_omitted() {
		let json = serde_json::to_value(origin("https://a")).unwrap();

		assert_eq!(
			json,
			serde_json::json!({ "download_location": "https://a", "src_uri": "https://a" })
		);
	}
}
