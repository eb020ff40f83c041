use sd_unpack_trace::scan;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

mod common;

use common::{create_file, create_link, git, git_available};

#[test]
fn finds_files_and_links() {
	let dir = tempdir().unwrap();
	let root = dir.path();

	for (path, content) in [
		("foo/example/example.txt", "ciao"),
		("foo/foo.txt", "foo"),
		("foo/foo2.txt", "foo2"),
		("README", "hello"),
		// ignored
		(".git", "fake"),
		("foo/.git/dummy", "dummy"),
	] {
		create_file(root.join(path), content);
	}
	create_link(root.join("example"), "foo/example");
	create_link(root.join("example.txt"), "foo/example/example.txt");

	let result = scan(root, &[".git"], false).unwrap();

	assert_eq!(
		result.files,
		vec![
			root.join("README"),
			root.join("foo/example/example.txt"),
			root.join("foo/foo.txt"),
			root.join("foo/foo2.txt"),
		]
	);
	// Links to directories are reported, not followed
	assert_eq!(
		result.links,
		vec![root.join("example"), root.join("example.txt")]
	);

	assert_eq!(scan(root, &[".git"], false).unwrap(), result);
}

#[test]
fn skips_nested_working_trees() {
	if !git_available() {
		return;
	}

	let dir = tempdir().unwrap();
	let root = dir.path();
	create_file(root.join("main.c"), "int main;");
	create_file(root.join("third_party/lib/lib.c"), "int lib;");
	create_file(root.join("third_party/notes.txt"), "notes");
	git(root.join("third_party/lib"), &["init", "-q"]);

	let all = scan(root, &[".git"], false).unwrap();
	assert_eq!(all.files.len(), 3);

	let without_modules = scan(root, &[".git"], true).unwrap();
	assert_eq!(
		without_modules.files,
		vec![root.join("main.c"), root.join("third_party/notes.txt")]
	);
}

#[test]
fn skips_working_trees_with_a_gitlink() {
	if !git_available() {
		return;
	}

	let dir = tempdir().unwrap();
	let root = dir.path().join("src");
	create_file(root.join("main.c"), "int main;");
	create_file(root.join("sub/new.c"), "int new;");
	let git_dir = dir.path().join("sub.git");
	git(
		root.join("sub"),
		&["init", "-q", "--separate-git-dir", git_dir.to_str().unwrap()],
	);
	assert!(root.join("sub/.git").is_file());

	let result = scan(&root, &[".git"], true).unwrap();
	assert_eq!(result.files, vec![root.join("main.c")]);
}
