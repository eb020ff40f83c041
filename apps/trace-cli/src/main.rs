use sd_unpack_trace::{
	plan::{Plan, StaticFetcher, StaticMetadata},
	read_report, scan, OriginResolver, TraceConfig, TraceSession,
};

use std::{
	fs,
	path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "sd-trace")]
#[command(about = "Trace unpacked build sources back to their download location", long_about = None)]
struct Cli {
	/// JSON tracing configuration, stock defaults when missing
	#[arg(long, env = "SD_TRACE_CONFIG", global = true)]
	config: Option<PathBuf>,

	/// Log filter, in `RUST_LOG` syntax
	#[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
	log_level: String,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// List the files and symlinks the tracer would attribute under a directory
	Scan {
		dir: PathBuf,
		/// Extra entry names to prune, on top of the configured VCS directories
		#[arg(long)]
		exclude: Vec<String>,
		/// Also prune nested git working trees
		#[arg(long, default_value_t = false)]
		skip_vcs_subtrees: bool,
	},
	/// Resolve the upstream origin of a local file or directory
	Resolve {
		path: PathBuf,
		/// Named source layer root, as `NAME=PATH`
		#[arg(long = "layer", value_parser = parse_layer)]
		layers: Vec<(String, PathBuf)>,
	},
	/// Print a written trace report
	Inspect {
		report: PathBuf,
		/// Dump the whole report as JSON
		#[arg(long, default_value_t = false)]
		json: bool,
	},
	/// Unpack and trace every source of a plan into a working directory
	Run {
		plan: PathBuf,
		/// Working directory the sources end up in
		#[arg(short, long)]
		workdir: PathBuf,
	},
}

fn parse_layer(arg: &str) -> Result<(String, PathBuf), String> {
	match arg.split_once('=') {
		Some((name, path)) if !name.is_empty() && !path.is_empty() => {
			Ok((name.to_string(), PathBuf::from(path)))
		}
		_ => Err(format!("expected NAME=PATH, got `{arg}`")),
	}
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(EnvFilter::try_new(&cli.log_level).context("invalid log filter")?)
		.init();

	let config = match &cli.config {
		Some(path) => TraceConfig::load_from(path)?,
		None => TraceConfig::default(),
	};

	match cli.command {
		Commands::Scan {
			dir,
			mut exclude,
			skip_vcs_subtrees,
		} => {
			exclude.extend(config.vcs_dirs.iter().cloned());
			let scanned = scan(&dir, &exclude, skip_vcs_subtrees)?;

			for file in &scanned.files {
				println!("{}", file.display());
			}
			for link in &scanned.links {
				println!("{} -> {}", link.display(), fs::read_link(link)?.display());
			}
		}

		Commands::Resolve { path, layers } => {
			let store = StaticMetadata {
				layers: layers.into_iter().collect(),
				..Default::default()
			};
			let fetcher = StaticFetcher::default();
			let mut resolver = OriginResolver::new(&config, &store, &fetcher);

			let resolved = resolver.resolve_local_path(&path)?;
			match (resolved.download_location, resolved.relpath) {
				(Some(download_location), Some(relpath)) if !relpath.is_empty() => {
					println!("{download_location}#{relpath}");
				}
				(Some(download_location), _) => println!("{download_location}"),
				(None, _) => println!("no upstream found"),
			}
			if let Some(layer) = resolved.layer {
				println!("layer: {layer}");
			}
		}

		Commands::Inspect { report, json } => {
			let report = read_report(&report)?;

			if json {
				println!("{}", serde_json::to_string_pretty(&report)?);
			} else {
				for (download_location, entry) in &report {
					println!("{download_location}");
					println!("  src_uri: {}", entry.src_uri);
					if let Some(parent) = &entry.submodule_of {
						println!("  submodule of: {parent}");
					}
					if let Some(lockfile) = &entry.described_by {
						println!("  described by: {lockfile}");
					}
					println!("  files: {}", entry.files.len());
				}
			}
		}

		Commands::Run { plan, workdir } => run(&config, &plan, &workdir)?,
	}

	Ok(())
}

fn run(config: &TraceConfig, plan_path: &Path, workdir: &Path) -> Result<()> {
	let plan = Plan::load(plan_path)?;
	let fetcher = plan.fetcher();

	let mut session = TraceSession::new(workdir, config, &plan.metadata, &fetcher)?;
	let scratch = session.scratch_dir().to_path_buf();

	for source in &plan.sources {
		let mut descriptor = source.descriptor.clone();
		descriptor.destdir = scratch.join(&descriptor.destdir);

		for step in &source.unpack {
			let to = descriptor.destdir.join(&step.to);
			debug!(from = %step.from.display(), to = %to.display(), "unpacking");
			copy_recursive(&step.from, &to)?;
		}

		session
			.commit_all(&descriptor.url, &descriptor)
			.with_context(|| format!("tracing {}", descriptor.url))?;
		session.move_to_root()?;
	}

	let report = session.report();
	match session.write_report()? {
		Some(path) => info!(
			origins = report.len(),
			path = %path.display(),
			"traced {} sources",
			plan.sources.len()
		),
		None => info!(origins = report.len(), "no recipe identity, report not written"),
	}

	session.close()?;

	Ok(())
}

/// Copy `from` to `to`, descending into directories and recreating symlinks
/// as they are.
fn copy_recursive(from: &Path, to: &Path) -> Result<()> {
	if let Some(parent) = to.parent() {
		fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
	}

	for entry in WalkDir::new(from).follow_links(false).follow_root_links(false) {
		let entry = entry.with_context(|| format!("reading {}", from.display()))?;
		let relative = entry.path().strip_prefix(from)?;
		let target = if relative.as_os_str().is_empty() {
			to.to_path_buf()
		} else {
			to.join(relative)
		};
		let file_type = entry.file_type();

		if file_type.is_symlink() {
			let link = fs::read_link(entry.path())?;
			symlink(&link, &target).with_context(|| format!("linking {}", target.display()))?;
		} else if file_type.is_dir() {
			fs::create_dir_all(&target)
				.with_context(|| format!("creating {}", target.display()))?;
		} else if file_type.is_file() {
			fs::copy(entry.path(), &target).with_context(|| {
				format!(
					"copying {} to {}",
					entry.path().display(),
					target.display()
				)
			})?;
		} else {
			bail!("unsupported file type at {}", entry.path().display());
		}
	}

	Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
	std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
	std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_layers() {
		assert_eq!(
			parse_layer("meta=/srv/layers/meta").unwrap(),
			("meta".to_string(), PathBuf::from("/srv/layers/meta"))
		);
		assert!(parse_layer("meta").is_err());
		assert!(parse_layer("=/srv").is_err());
	}

	#[cfg(unix)]
	#[test]
	fn copies_trees_and_keeps_links() {
		let dir = tempfile::tempdir().unwrap();
		let from = dir.path().join("from");
		fs::create_dir_all(from.join("src")).unwrap();
		fs::write(from.join("src/main.c"), "int main;").unwrap();
		symlink(Path::new("src/main.c"), &from.join("main.c")).unwrap();

		let to = dir.path().join("unpacked/foo-1.0");
		copy_recursive(&from, &to).unwrap();

		assert_eq!(fs::read_to_string(to.join("src/main.c")).unwrap(), "int main;");
		assert_eq!(fs::read_link(to.join("main.c")).unwrap(), Path::new("src/main.c"));

		let single = dir.path().join("single/main.c");
		copy_recursive(&from.join("src/main.c"), &single).unwrap();
		assert_eq!(fs::read_to_string(single).unwrap(), "int main;");
	}

	#[test]
	fn cli_definition_is_valid() {
		use clap::CommandFactory;
		Cli::command().debug_assert();
	}
}
