//! `generate::from_dir` against real directory trees.

use assert_fs::prelude::*;
use manisync_core::{diff, generate};
use predicates::prelude::predicate;

#[test]
fn generated_manifest_survives_wire_roundtrip_and_diffs_clean() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("index.html").write_str("<html></html>").unwrap();
    root.child("js/app.js").write_str("console.log(1);").unwrap();

    let manifest = generate::from_dir(root.path()).expect("generate");
    let json = manifest.to_json_pretty().expect("serialize");
    let back = manisync_core::Manifest::from_json(&json).expect("reparse");

    assert_eq!(back, manifest);
    assert!(diff(&back, Some(&manifest)).expect("diff").is_empty());
}

#[test]
fn editing_a_file_changes_only_its_descriptor() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("a.txt").write_str("one").unwrap();
    root.child("b.txt").write_str("two").unwrap();
    let before = generate::from_dir(root.path()).expect("generate");

    root.child("b.txt").write_str("two, edited").unwrap();
    root.child("c.txt").write_str("three").unwrap();
    let after = generate::from_dir(root.path()).expect("generate");

    let changed = diff(&after, Some(&before)).expect("diff");
    let paths: Vec<&str> = changed.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, ["b.txt", "c.txt"]);
}

#[test]
fn written_manifest_file_uses_wire_field_names() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("a.txt").write_str("one").unwrap();
    let manifest = generate::from_dir(root.path()).expect("generate");

    let out = root.child("manifest.json");
    out.write_str(&manifest.to_json_pretty().unwrap()).unwrap();
    out.assert(predicate::str::contains("\"md5\""));
    out.assert(predicate::str::contains("\"time\""));
    out.assert(predicate::str::contains("\"js\""));
}
