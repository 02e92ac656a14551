use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn fwbuild(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fwbuild"))
        .arg("--root-dir")
        .arg(root)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to run fwbuild {args:?}: {e}"))
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn write_template(root: &Path, revs: &[&str], documented: &[&str]) {
    let revs = revs
        .iter()
        .map(|r| format!("\"{r}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let documented = documented
        .iter()
        .map(|id| format!("{{\"id\": \"{id}\", \"displayName\": \"{id}\"}}"))
        .collect::<Vec<_>>()
        .join(", ");
    fs::write(
        root.join("index-template.json"),
        format!(
            r#"{{
    "targets": [{{"targetId": "a", "vendorId": "b", "configuration": {{
        "kconfigFilenameTemplate": "{{targetId}}_{{vendorId}}_{{rev}}.kconfig",
        "firmwareFilenameTemplate": "{{targetId}}_{{vendorId}}_{{rev}}.bin",
        "permutations": {{"rev": [{revs}]}}}}}}],
    "configurations": [{{"permutations": [{documented}]}}],
    "builds": []
}}"#
        ),
    )
    .expect("template");
}

#[test]
fn check_configurations_reports_missing_display_names() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_template(tmp.path(), &["1", "2", "3"], &["1"]);

    let out = fwbuild(tmp.path(), &["check-configurations"]);
    assert!(!out.status.success());
    assert_eq!(
        stdout(&out),
        "Missing 2 configuration displayNames:\n  - 2\n  - 3\n"
    );
    assert!(tmp.path().join("index.json").is_file(), "catalog should be seeded");

    write_template(tmp.path(), &["1"], &["1"]);
    fs::remove_file(tmp.path().join("index.json")).expect("reset");
    let out = fwbuild(tmp.path(), &["check-configurations"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "✓ All 1 permutation values have displayNames\n");
}

#[test]
fn validate_lists_missing_kconfigs() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_template(tmp.path(), &["1", "2"], &["1", "2"]);
    fs::create_dir_all(tmp.path().join("kconfigs")).expect("kconfigs");
    fs::write(tmp.path().join("kconfigs/a_b_1.kconfig"), "").expect("kconfig");

    let out = fwbuild(tmp.path(), &["validate"]);
    assert!(!out.status.success());
    assert_eq!(
        stdout(&out),
        "Missing 1/2 kconfig files (50% complete):\n  - a_b_2.kconfig\n"
    );

    fs::write(tmp.path().join("kconfigs/a_b_2.kconfig"), "").expect("kconfig");
    let out = fwbuild(tmp.path(), &["validate"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "✓ All 2 kconfig files present\n");
}

#[test]
fn dry_run_build_then_rebuild_index() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_template(tmp.path(), &["1", "2"], &["1", "2"]);
    fs::create_dir_all(tmp.path().join("kconfigs")).expect("kconfigs");
    fs::write(tmp.path().join("kconfigs/a_b_1.kconfig"), "").expect("kconfig");

    let out = fwbuild(
        tmp.path(),
        &["build", "v1", "--source-dir", "does-not-exist", "--dry-run"],
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let text = stdout(&out);
    assert!(text.contains("\n[a]\n"));
    assert!(text.contains("  [DRY RUN] a_b_1.bin\n"));
    assert!(text.contains("  ⚠ a_b_2.kconfig - not found\n"));
    assert!(text.ends_with("\nBuild: 1/2 successful → builds/v1\n"), "stdout: {text}");
    assert!(tmp.path().join("builds/v1/metadata.json").is_file());

    let index = fs::read_to_string(tmp.path().join("index.json")).expect("index");
    assert!(index.contains("\"builds\": []"), "dry runs must not record builds");

    let out = fwbuild(tmp.path(), &["rebuild-index"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "✓ Rebuilt index with 1 builds\n");
    let index = fs::read_to_string(tmp.path().join("index.json")).expect("index");
    assert!(index.contains("\"version\": \"v1\""));
}

#[test]
fn real_build_requires_source_dir() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_template(tmp.path(), &["1"], &["1"]);
    let out = fwbuild(tmp.path(), &["build", "v1", "--source-dir", "/nonexistent/src"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("source directory not found"), "stderr: {stderr}");
}

#[test]
fn rebuild_index_without_builds_dir_fails() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_template(tmp.path(), &["1"], &["1"]);
    let out = fwbuild(tmp.path(), &["rebuild-index"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("builds directory not found"));
}
