//! Upstream source tracing for unpacked build sources.
//!
//! Every source uri of a recipe is unpacked into a private scratch area, where
//! its files get attributed to a download location (a tarball url, a git remote
//! at a commit, a package registry url, ...). The scratch area is then merged
//! into the working directory and, at the end, a report maps each download
//! location to the files it put in the working directory.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod collector;
pub mod config;
pub mod deptree;
pub mod error;
pub mod git;
pub mod merge;
pub mod origin;
pub mod plan;
pub mod report;
pub mod scan;
pub mod session;
pub mod source;
pub mod uri;

pub use collector::Collector;
pub use config::{SourceKind, TraceConfig};
pub use error::{FileIOError, NonUtf8PathError, TraceError};
pub use merge::merge;
pub use origin::{OriginResolver, PathCacheEntry};
pub use report::{compact, DownloadLocationEntry, FileEntry, Report};
pub use scan::{scan, ScanResult};
pub use session::{read_report, TraceSession};
pub use source::{
	DependencyRecord, Fetcher, MetadataStore, ModuleRecord, RecipeIdentity, SourceDescriptor,
};
