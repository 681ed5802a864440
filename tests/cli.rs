//! Drives the `ustar_light` binary through the create / list / extract /
//! append cycle.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use pretty_assertions::assert_eq;

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ustar_light"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run ustar_light")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn create_list_extract_append() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("x.txt"), "abc").unwrap();

    let out = run(dir.path(), &["-cf", "a.tar", "x.txt"]);
    assert!(out.status.success(), "{out:?}");

    let out = run(dir.path(), &["-tf", "a.tar"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "x.txt\n");

    fs::create_dir(dir.path().join("out")).unwrap();
    let out = run(dir.path(), &["-xf", "a.tar", "-C", "out"]);
    assert!(out.status.success(), "{out:?}");
    let extracted = dir.path().join("out/x.txt");
    assert_eq!(fs::read(&extracted).unwrap(), b"abc");
    assert_eq!(fs::metadata(&extracted).unwrap().len(), 3);

    fs::write(dir.path().join("y.txt"), "Z").unwrap();
    let out = run(dir.path(), &["-rf", "a.tar", "y.txt"]);
    assert!(out.status.success(), "{out:?}");
    let out = run(dir.path(), &["-tf", "a.tar"]);
    assert_eq!(stdout(&out), "y.txt\nx.txt\n");
    assert!(!dir.path().join("a.tar.tmp").exists());
}

#[test]
fn failures_exit_non_zero_and_name_the_path() {
    let dir = tempfile::tempdir().unwrap();

    let out = run(dir.path(), &["-cf", "a.tar", "missing.txt"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("missing.txt"), "{stderr}");

    let out = run(dir.path(), &["-tf", "nope.tar"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("nope.tar"));

    let out = run(dir.path(), &["-uf", "a.tar", "x.txt"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("not supported"));
}

#[test]
fn truncated_append_keeps_archive() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("big.bin"), vec![7u8; 3000]).unwrap();
    fs::write(dir.path().join("y.txt"), "Z").unwrap();

    let out = run(dir.path(), &["-cf", "a.tar", "big.bin"]);
    assert!(out.status.success());
    let archive = dir.path().join("a.tar");
    let mut data = fs::read(&archive).unwrap();
    data.truncate(512 + 1000);
    fs::write(&archive, &data).unwrap();

    let out = run(dir.path(), &["-rf", "a.tar", "y.txt"]);
    assert!(!out.status.success());
    assert_eq!(fs::read(&archive).unwrap(), data);
    assert!(!dir.path().join("a.tar.tmp").exists());
}

#[test]
fn verbose_listing() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("x.txt"), "abc").unwrap();
    assert!(run(dir.path(), &["-cf", "a.tar", "x.txt"]).status.success());

    let out = run(dir.path(), &["-tvf", "a.tar"]);
    let line = stdout(&out);
    assert!(line.starts_with('-'), "{line}");
    assert!(line.trim_end().ends_with(" x.txt"), "{line}");
}
