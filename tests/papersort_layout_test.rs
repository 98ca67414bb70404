use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const LAYOUT: &str = "\
---LAYOUT STARTS HERE---
Financial: money matters
  Banking: statements
    By company: one folder per bank
Taxes
  Federal
Unsortable & Other
";

fn papersort(root: &Path) -> assert_cmd::Command {
    let store = root.join("store");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("papersort");
    cmd.current_dir(root)
        .env("PAPERSORT_HOME", root.join("home"))
        .env("DOCSTORE", format!("local:{}", store.display()))
        .env("PAPERSORT_LLM_PROVIDER", "offline")
        .env_remove("PAPERSORT_CONFIG_PATH");
    cmd
}

fn seed_store(root: &Path, layout: &str) {
    let store = root.join("store");
    fs::create_dir_all(&store).expect("mkdir store");
    fs::write(store.join("layout.txt"), layout).expect("write layout");
}

#[test]
fn show_layout_lists_folders_and_company_locations() {
    let tmp = tempdir().expect("tempdir");
    seed_store(tmp.path(), LAYOUT);

    papersort(tmp.path())
        .arg("show-layout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Banking"))
        .stdout(predicate::str::contains("Financial/Banking"));
}

#[test]
fn check_path_accepts_layout_paths() {
    let tmp = tempdir().expect("tempdir");
    seed_store(tmp.path(), LAYOUT);

    papersort(tmp.path())
        .args(["check-path", "Taxes/Federal/2024"])
        .assert()
        .failure();
    papersort(tmp.path())
        .args(["check-path", "Taxes/Federal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("exists in layout"));
    papersort(tmp.path())
        .args(["check-path", "Financial/Banking/Chase"])
        .assert()
        .success();
}

#[test]
fn check_path_rejects_unknown_folders() {
    let tmp = tempdir().expect("tempdir");
    seed_store(tmp.path(), LAYOUT);

    papersort(tmp.path())
        .args(["check-path", "Medical/Dental"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("does not exist in layout"));
}

#[test]
fn missing_layout_marker_is_an_error() {
    let tmp = tempdir().expect("tempdir");
    seed_store(tmp.path(), "Financial\n  Banking\n");

    papersort(tmp.path())
        .arg("show-layout")
        .assert()
        .failure()
        .stderr(predicate::str::contains("LAYOUT STARTS HERE"));
}

#[test]
fn status_reports_paths_as_json() {
    let tmp = tempdir().expect("tempdir");
    seed_store(tmp.path(), LAYOUT);

    let output = papersort(tmp.path())
        .args(["status", "--json"])
        .output()
        .expect("run status");
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["command"], "status");
    assert_eq!(report["ok"], true);
    let details = report["details"].as_array().expect("details");
    assert!(details.iter().any(|d| d
        .as_str()
        .is_some_and(|s| s.starts_with("llm_provider=offline"))));
}

#[test]
fn dedupe_without_duplicates_merges_nothing() {
    let tmp = tempdir().expect("tempdir");
    seed_store(tmp.path(), LAYOUT);
    let banks = tmp.path().join("store/Financial/Banking");
    fs::create_dir_all(banks.join("Chase")).expect("mkdir");
    fs::write(banks.join("Chase/a.pdf"), b"%PDF a").expect("write");

    papersort(tmp.path())
        .args(["dedupe", "--yes"])
        .assert()
        .success();
    assert!(banks.join("Chase/a.pdf").is_file());
}
