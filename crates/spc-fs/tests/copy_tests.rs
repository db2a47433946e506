use assert_fs::prelude::*;
use predicates::prelude::*;
use spc_fs::copy;

#[test]
fn test_copy_dir_mirrors_nested_tree() {
    let src = assert_fs::TempDir::new().unwrap();
    let dst = assert_fs::TempDir::new().unwrap();
    src.child("ext/standard/config.m4").write_str("dnl").unwrap();
    src.child("configure").write_str("#!/bin/sh").unwrap();
    src.child(".git/HEAD").write_str("ref: refs/heads/master").unwrap();

    copy::copy_dir(src.path(), dst.path(), &[".git"]).unwrap();

    dst.child("ext/standard/config.m4").assert("dnl");
    dst.child("configure").assert(predicate::path::is_file());
    dst.child(".git").assert(predicate::path::missing());
}

#[test]
fn test_copy_path_creates_parents_for_files() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("include/zlib.h").write_str("#define Z").unwrap();
    let target = temp.child("buildroot/include/zlib.h");

    copy::copy_path(&temp.path().join("include/zlib.h"), target.path()).unwrap();

    target.assert("#define Z");
}

#[test]
fn test_remove_path_handles_files_and_trees() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("single.txt").touch().unwrap();
    temp.child("tree/a/b.txt").touch().unwrap();

    copy::remove_path(temp.child("single.txt").path()).unwrap();
    copy::remove_path(temp.child("tree").path()).unwrap();

    temp.child("single.txt").assert(predicate::path::missing());
    temp.child("tree").assert(predicate::path::missing());
}

#[cfg(unix)]
#[test]
fn test_remove_path_unlinks_symlink_without_touching_target() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("checkout/config.m4").write_str("dnl").unwrap();
    let link = temp.child("source/ext");
    std::fs::create_dir_all(temp.child("source").path()).unwrap();
    std::os::unix::fs::symlink(temp.child("checkout").path(), link.path()).unwrap();

    copy::remove_path(link.path()).unwrap();

    link.assert(predicate::path::missing());
    temp.child("checkout/config.m4").assert("dnl");
}
