//! Source uri string handling: decoding, parameter lookup, redaction of local
//! paths and mapping back to the raw recipe declaration.

use crate::{error::TraceError, source::MetadataStore};

use std::{borrow::Cow, collections::BTreeMap, sync::LazyLock};

use regex::Regex;

/// Stands in for every local absolute path found in a source uri.
pub const LOCAL_PATH_PLACEHOLDER: &str = "<local-path>";

// An absolute path right after the scheme separator or a `key=`, up to the
// next parameter or the end of the uri.
static ABSOLUTE_PATH: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(://|=)/[^;]+").expect("valid absolute path regex"));

/// A source uri split into its parts, `kind://host/path;key=value;...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUri {
	pub kind: String,
	pub host: String,
	pub path: String,
	pub params: BTreeMap<String, String>,
}

impl SourceUri {
	#[must_use]
	pub fn parse(uri: &str) -> Option<Self> {
		let (kind, rest) = uri.split_once("://")?;
		if kind.is_empty() {
			return None;
		}

		let mut parts = rest.split(';');
		let location = parts.next().unwrap_or_default();

		// Local sources have no host, the whole location is a path
		let (host, path) = if kind == "file" {
			("", location)
		} else {
			location
				.find('/')
				.map_or((location, ""), |idx| location.split_at(idx))
		};

		let params = parts
			.filter(|part| !part.is_empty())
			.map(|part| {
				part.split_once('=').map_or_else(
					|| (part.to_string(), String::new()),
					|(key, value)| (key.to_string(), value.to_string()),
				)
			})
			.collect();

		Some(Self {
			kind: kind.to_string(),
			host: host.to_string(),
			path: path.to_string(),
			params,
		})
	}
}

/// Value of a `;key=value` parameter of a source uri.
#[must_use]
pub fn param<'uri>(uri: &'uri str, key: &str) -> Option<&'uri str> {
	uri.split(';').skip(1).find_map(|part| {
		part.split_once('=')
			.filter(|(name, _)| *name == key)
			.map(|(_, value)| value)
	})
}

/// Replace local absolute paths in `uri` with [`LOCAL_PATH_PLACEHOLDER`], so the
/// same recipe traced from different build directories yields the same string.
#[must_use]
pub fn redact(uri: &str) -> Cow<'_, str> {
	ABSOLUTE_PATH.replace_all(uri, format!("${{1}}{LOCAL_PATH_PLACEHOLDER}"))
}

/// Split a raw variable value on whitespace, keeping `${...}` expressions
/// (which may contain spaces) in one piece.
#[must_use]
pub fn split_var_value(value: &str) -> Vec<String> {
	let mut items = vec![];
	let mut buf = String::new();
	let mut depth = 0_usize;
	let mut last = None;

	for c in value.chars() {
		match c {
			'{' if last == Some('$') => depth += 1,
			'}' => depth = depth.saturating_sub(1),
			c if c.is_whitespace() && depth == 0 => {
				if !buf.is_empty() {
					items.push(std::mem::take(&mut buf));
				}
				last = None;
				continue;
			}
			_ => {}
		}

		buf.push(c);
		last = Some(c);
	}

	if !buf.is_empty() {
		items.push(buf);
	}

	items
}

/// Find the raw element of the `var` declaration that expands to `uri`.
///
/// Falls back to `uri` itself when no raw element matches, which happens when
/// the uri was added by an inline expression or an anonymous function.
pub fn unexpanded_source_uri(
	uri: &str,
	store: &dyn MetadataStore,
	var: &str,
) -> Result<String, TraceError> {
	let expanded = store
		.var(var)
		.ok_or_else(|| TraceError::UndeclaredVariable(var.to_string()))?;

	if !expanded.split_whitespace().any(|item| item == uri) {
		return Err(TraceError::UnknownSourceUri {
			uri: uri.to_string(),
			var: var.to_string(),
		});
	}

	let raw = store.var_unexpanded(var).unwrap_or_default();

	// One raw element may expand to several uris
	Ok(split_var_value(&raw)
		.into_iter()
		.find(|item| store.expand(item).split_whitespace().any(|u| u == uri))
		.unwrap_or_else(|| uri.to_string()))
}
