use crate::{error::TraceError, source::DependencyRecord};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Packages keyed by name, each with its own dependencies.
pub type Deptree = BTreeMap<String, DeptreeNode>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeptreeNode {
	pub version: String,
	pub download_location: String,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub checksums: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub deps: Deptree,
}

/// Download location and checksums of one package.
pub type ResolvedPackage = (String, BTreeMap<String, String>);

/// Nest a flat list of dependency records by their path in the tree.
///
/// Node identity is the whole path, so one package name showing up at several
/// depths, possibly with different versions, gives distinct nodes.
pub fn build(
	records: &[DependencyRecord],
	mut resolve: impl FnMut(&DependencyRecord) -> Result<ResolvedPackage, TraceError>,
) -> Result<Deptree, TraceError> {
	// Sorted paths put parents right before their children
	let indexed = records
		.iter()
		.filter(|record| !record.deptree.is_empty())
		.map(|record| (record.deptree.as_slice(), record))
		.collect::<BTreeMap<_, _>>();

	let mut tree = Deptree::new();

	for (path, record) in indexed {
		let Some((name, ancestors)) = path.split_last() else {
			continue;
		};

		let Some(siblings) = ancestors
			.iter()
			.try_fold(&mut tree, |level, ancestor| {
				level.get_mut(ancestor).map(|node| &mut node.deps)
			})
		else {
			warn!(package = %name, ?path, "dependency has no recorded parent, skipping it");
			continue;
		};

		let (download_location, checksums) = resolve(record)?;

		siblings.insert(
			name.clone(),
			DeptreeNode {
				version: record.version.clone(),
				download_location,
				checksums,
				deps: Deptree::new(),
			},
		);
	}

	Ok(tree)
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	fn record(url: &str, version: &str, path: &[&str]) -> DependencyRecord {
		DependencyRecord {
			url: url.to_string(),
			version: version.to_string(),
			deptree: path.iter().map(ToString::to_string).collect(),
		}
	}

	#[test]
	fn nests_records_by_path() {
		let records = [
			record("npm://r/foo;version=1.0.0", "1.0.0", &["foo", "bar"]),
			record("npm://r/baz;version=2.0.0", "2.0.0", &["baz"]),
			record("npm://r/foo;version=0.1.0", "0.1.0", &["foo"]),
			record("npm://r/baz;version=1.1.0", "1.1.0", &["foo", "bar", "baz"]),
		];
		let mut resolved = vec![];

		let tree = build(&records, |record| {
			resolved.push(record.url.clone());
			let checksums = if record.version == "2.0.0" {
				BTreeMap::from([("sha512".to_string(), "beef".to_string())])
			} else {
				BTreeMap::new()
			};
			Ok((format!("https://{}", record.version), checksums))
		})
		.unwrap();

		assert_eq!(resolved.len(), 4);
		assert_eq!(tree.len(), 2);
		assert_eq!(tree["baz"].version, "2.0.0");
		assert_eq!(tree["baz"].checksums["sha512"], "beef");
		assert!(tree["baz"].deps.is_empty());

		let bar = &tree["foo"].deps["bar"];
		assert_eq!(bar.download_location, "https://1.0.0");
		assert_eq!(bar.deps["baz"].version, "1.1.0");

		let json = serde_json::to_value(&tree["baz"]).unwrap();
		assert_eq!(
			json,
			serde_json::json!({
				"version": "2.0.0",
				"download_location": "https://2.0.0",
				"checksums": { "sha512": "beef" },
			})
		);
	}

	#[test]
	fn orphans_are_skipped() {
		let records = [record("npm://r/x", "1.0.0", &["missing", "x"])];

		let tree = build(&records, |_| Ok((String::new(), BTreeMap::new()))).unwrap();

		assert!(tree.is_empty());
	}
}
