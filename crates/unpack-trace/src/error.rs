use std::{fmt::Display, io, path::Path};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
	// Invocation errors
	#[error("{role} path is not a directory: <path='{}'>", .path.display())]
	NotADirectory { role: &'static str, path: Box<Path> },
	#[error(
		"source and destination must be on the same filesystem: <src='{}', dst='{}'>",
		.src.display(),
		.dst.display()
	)]
	CrossVolume { src: Box<Path>, dst: Box<Path> },
	#[error(
		"cannot move '{}' to '{}': source is a file or a symlink, \
		while destination is a non-empty directory",
		.src.display(),
		.dst.display()
	)]
	FileOverPopulatedDir { src: Box<Path>, dst: Box<Path> },
	#[error("scratch area is not empty at close: <path='{}'>", .0.display())]
	ScratchNotEmpty(Box<Path>),
	#[error("not a git working tree: <path='{}'>", .0.display())]
	NotAGitRepo(Box<Path>),
	#[error("relative path '{relpath}' is not in '{}'", .path.display())]
	RelativePathMismatch { relpath: String, path: Box<Path> },
	#[error("variable is not declared: {0}")]
	UndeclaredVariable(String),
	#[error("source uri '{uri}' does not exist in the expanded {var}")]
	UnknownSourceUri { uri: String, var: String },

	// External tools and collaborators
	#[error("failed to run git {args:?}: {source}")]
	GitSpawn {
		args: Vec<String>,
		#[source]
		source: io::Error,
	},
	#[error("git {args:?} produced non UTF-8 output")]
	GitOutput { args: Vec<String> },
	#[error("fetcher could not describe '{uri}': {reason}")]
	Fetcher { uri: String, reason: String },

	// Internal errors
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error(transparent)]
	NonUtf8Path(#[from] NonUtf8PathError),
	#[error("report (de)serialization error: {0}")]
	Serde(#[from] serde_json::Error),
	#[error("failed to load configuration from '{}': {reason}", .path.display())]
	Config { path: Box<Path>, reason: String },
}

/// File I/O error that includes the path that caused the error
#[derive(Error, Debug)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub maybe_context: Option<String>,
}

impl Display for FileIOError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"file I/O error{}: {}; path: '{}'",
			self.maybe_context
				.as_ref()
				.map(|ctx| format!(" ({ctx})"))
				.unwrap_or_default(),
			self.source,
			self.path.display()
		)
	}
}

impl<P: AsRef<Path>> From<(P, io::Error)> for FileIOError {
	fn from((path, source): (P, io::Error)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: None,
		}
	}
}

impl<P: AsRef<Path>> From<(P, io::Error, &'static str)> for FileIOError {
	fn from((path, source, context): (P, io::Error, &'static str)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(context.into()),
		}
	}
}

/// Error for paths that contain non-UTF8 characters
#[derive(Error, Debug)]
#[error("Received a non UTF-8 path: <path='{0:?}'>")]
pub struct NonUtf8PathError(pub Box<Path>);
