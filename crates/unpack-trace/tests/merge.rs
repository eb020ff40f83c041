use sd_unpack_trace::{merge, TraceError};

use std::{fs, path::PathBuf};

use pretty_assertions::assert_eq;
use tempfile::{tempdir, TempDir};

mod common;

use common::{create_file, create_link, git_available, read_file, tree};

fn src_dst() -> (TempDir, PathBuf, PathBuf) {
	let dir = tempdir().unwrap();
	let (src, dst) = (dir.path().join("src"), dir.path().join("dst"));
	fs::create_dir(&src).unwrap();
	fs::create_dir(&dst).unwrap();
	(dir, src, dst)
}

#[test]
fn merges_directories_and_overwrites_files() {
	let (_dir, src, dst) = src_dst();
	create_file(src.join("dir/subdir/file.txt"), "new");
	create_file(dst.join("dir/subdir/file.txt"), "old");
	create_file(dst.join("dir/subdir/file1.txt"), "old");

	merge(&src, &dst).unwrap();

	assert!(tree(&src).is_empty());
	assert_eq!(
		tree(&dst),
		vec![
			"dir",
			"dir/subdir",
			"dir/subdir/file.txt",
			"dir/subdir/file1.txt"
		]
	);
	assert_eq!(read_file(dst.join("dir/subdir/file.txt")), "new");
	assert_eq!(read_file(dst.join("dir/subdir/file1.txt")), "old");
}

#[test]
fn files_and_symlinks_overwrite_each_other() {
	let (_dir, src, dst) = src_dst();
	create_file(src.join("dir/subdir/fileA.txt"), "new");
	create_file(src.join("dir/fileB.txt"), "new");
	create_link(src.join("file.txt"), "dir/subdir/fileA.txt");

	create_file(dst.join("dir/subdir/fileA.txt"), "old");
	create_link(dst.join("dir/fileB.txt"), "subdir/fileA.txt");
	create_file(dst.join("file.txt"), "old");

	merge(&src, &dst).unwrap();

	assert!(tree(&src).is_empty());
	assert!(dst.join("file.txt").is_symlink());
	assert_eq!(
		fs::read_link(dst.join("file.txt")).unwrap(),
		PathBuf::from("dir/subdir/fileA.txt")
	);
	assert!(!dst.join("dir/fileB.txt").is_symlink());
	assert_eq!(read_file(dst.join("dir/fileB.txt")), "new");
}

#[test]
fn directory_replaces_file() {
	let (_dir, src, dst) = src_dst();
	create_file(src.join("items/item0/content.txt"), "hello");
	create_file(dst.join("items/item0"), "there");

	merge(&src, &dst).unwrap();

	assert!(tree(&src).is_empty());
	assert!(dst.join("items/item0").is_dir());
	assert_eq!(read_file(dst.join("items/item0/content.txt")), "hello");
}

#[test]
fn directory_replaces_symlink() {
	let (_dir, src, dst) = src_dst();
	create_file(src.join("items/item0/content.txt"), "hello");
	create_file(dst.join("items/item1/content.txt"), "there");
	create_link(dst.join("items/item0"), "item1");

	merge(&src, &dst).unwrap();

	assert!(tree(&src).is_empty());
	assert!(!dst.join("items/item0").is_symlink());
	assert_eq!(read_file(dst.join("items/item0/content.txt")), "hello");
	assert_eq!(read_file(dst.join("items/item1/content.txt")), "there");
}

#[test]
fn symlink_replaces_empty_directory() {
	let (_dir, src, dst) = src_dst();
	create_file(src.join("items/item1/content.txt"), "there");
	create_link(src.join("items/item0"), "item1");
	fs::create_dir_all(dst.join("items/item0")).unwrap();

	merge(&src, &dst).unwrap();

	assert!(tree(&src).is_empty());
	assert!(dst.join("items/item0").is_symlink());
	assert_eq!(read_file(dst.join("items/item0/content.txt")), "there");
}

#[test]
fn symlink_over_populated_directory_fails() {
	let (_dir, src, dst) = src_dst();
	create_file(src.join("items/item1/content.txt"), "there");
	create_link(src.join("items/item0"), "item1");
	create_file(dst.join("items/item0/content.txt"), "hello");

	assert!(matches!(
		merge(&src, &dst),
		Err(TraceError::FileOverPopulatedDir { .. })
	));

	// The conflicting entry stays where it was
	assert!(src.join("items/item0").is_symlink());
	assert_eq!(read_file(dst.join("items/item0/content.txt")), "hello");
}

#[test]
fn file_replaces_empty_directory() {
	let (_dir, src, dst) = src_dst();
	create_file(src.join("items/item0"), "test");
	fs::create_dir_all(dst.join("items/item0")).unwrap();

	merge(&src, &dst).unwrap();

	assert!(tree(&src).is_empty());
	assert!(dst.join("items/item0").is_file());
}

#[test]
fn file_over_populated_directory_fails() {
	let (_dir, src, dst) = src_dst();
	create_file(src.join("items/item0"), "test");
	create_file(dst.join("items/item0/content.txt"), "test");

	assert!(matches!(
		merge(&src, &dst),
		Err(TraceError::FileOverPopulatedDir { .. })
	));
	assert!(src.join("items/item0").is_file());
}

#[test]
fn git_working_tree_replaces_directory() {
	if !git_available() {
		return;
	}

	let (_dir, src, dst) = src_dst();
	let repo = src.join("src/my_git_repo");
	create_file(repo.join("foo.txt"), "hello");
	common::git(&repo, &["init", "-q"]);
	create_file(dst.join("src/my_git_repo/content.txt"), "there");

	merge(&src, &dst).unwrap();

	assert!(tree(&src).is_empty());
	assert!(!dst.join("src/my_git_repo/content.txt").exists());
	assert_eq!(read_file(dst.join("src/my_git_repo/foo.txt")), "hello");
	assert!(dst.join("src/my_git_repo/.git").is_dir());
}

#[test]
fn gitlink_working_tree_replaces_directory() {
	if !git_available() {
		return;
	}

	let (dir, src, dst) = src_dst();
	let repo = src.join("sub");
	create_file(repo.join("new.c"), "int new;");
	let git_dir = dir.path().join("sub.git");
	common::git(
		&repo,
		&["init", "-q", "--separate-git-dir", git_dir.to_str().unwrap()],
	);
	create_file(dst.join("sub/stale.c"), "int stale;");

	merge(&src, &dst).unwrap();

	assert!(tree(&src).is_empty());
	assert!(!dst.join("sub/stale.c").exists());
	assert_eq!(read_file(dst.join("sub/new.c")), "int new;");
	assert!(dst.join("sub/.git").is_file());
}

#[test]
fn rejects_non_directories() {
	let (dir, src, dst) = src_dst();
	let file = dir.path().join("file");
	create_file(&file, "");
	let link = dir.path().join("link");
	create_link(&link, &dst);

	assert!(matches!(
		merge(&file, &dst),
		Err(TraceError::NotADirectory { role: "source", .. })
	));
	assert!(matches!(
		merge(&src, &link),
		Err(TraceError::NotADirectory {
			role: "destination",
			..
		})
	));
	assert!(matches!(
		merge(dir.path().join("missing"), &dst),
		Err(TraceError::NotADirectory { role: "source", .. })
	));
}
