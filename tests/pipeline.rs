#[path = "common/mod.rs"]
mod common;

use common::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use tabkit::{should_skip, CacheStore, CancellationToken, DatasetStatus};

fn stores_source(root: &Path) -> std::path::PathBuf {
    write_source(
        root,
        "stores.json",
        &json!({
            "localfile": "stores.csv",
            "format": {"type": "csv"},
            "schema": {"name": "STORE", "city": "CITY"}
        }),
    )
}

#[test]
fn skip_rule_requires_all_three_conditions() {
    assert!(should_skip(false, Some("aa"), true, "aa"));
    assert!(!should_skip(true, Some("aa"), true, "aa"));
    assert!(!should_skip(false, None, true, "aa"));
    assert!(!should_skip(false, Some("aa"), false, "aa"));
    assert!(!should_skip(false, Some("aa"), true, "bb"));
}

#[test]
fn second_run_skips_until_input_output_or_source_changes() {
    let tmp = make_root();
    let root = tmp.path();
    write_input(root, "stores.csv", STORES_CSV);
    let src = stores_source(root);
    let pipeline = test_pipeline(root);

    let first = pipeline.run(vec![load(root, &src)]);
    assert_eq!(first.status_of("stores.csv"), Some(&DatasetStatus::Success));
    assert_eq!(first.datasets[0].stats.map(|s| s.written), Some(3));
    let cache = CacheStore::load(root.join(".cache").join("data.cache")).unwrap();
    assert!(cache.lookup("stores.csv").is_some());

    let second = pipeline.run(vec![load(root, &src)]);
    assert_eq!(second.status_of("stores.csv"), Some(&DatasetStatus::Skipped));

    // output removed
    fs::remove_file(output_path(root, "stores")).unwrap();
    let third = pipeline.run(vec![load(root, &src)]);
    assert_eq!(third.status_of("stores.csv"), Some(&DatasetStatus::Success));

    // input changed by one byte
    write_input(root, "stores.csv", STORES_CSV.replace("tokyo", "tokyO"));
    let fourth = pipeline.run(vec![load(root, &src)]);
    assert_eq!(fourth.status_of("stores.csv"), Some(&DatasetStatus::Success));
    assert_eq!(pipeline.run(vec![load(root, &src)]).skipped(), ["stores.csv"]);

    // source file changed
    write_source(
        root,
        "stores.json",
        &json!({
            "localfile": "stores.csv",
            "format": {"type": "csv"},
            "schema": {"name": "STORE"}
        }),
    );
    let fifth = pipeline.run(vec![load(root, &src)]);
    assert_eq!(fifth.status_of("stores.csv"), Some(&DatasetStatus::Success));
    assert_eq!(read_csv(&output_path(root, "stores"))[0], vec!["name"]);

    // ignore-cache override
    let forced = test_pipeline(root).ignore_cache(true).run(vec![load(root, &src)]);
    assert_eq!(forced.succeeded(), ["stores.csv"]);
}

#[test]
fn failing_dataset_does_not_affect_siblings_or_their_cache_entries() {
    let tmp = make_root();
    let root = tmp.path();
    write_input(root, "good.csv", "A\n1\n2\n");
    write_input(root, "bad.csv", "A,B\n1,2\n3\n");
    let mk = |name: &str| {
        write_source(
            root,
            &format!("{name}.json"),
            &json!({"localfile": format!("{name}.csv"), "format": {"type": "csv"}, "schema": {"a": "A"}}),
        )
    };
    let (good, bad) = (mk("good"), mk("bad"));

    let report = test_pipeline(root).workers(2).run(vec![load(root, &bad), load(root, &good)]);
    assert_eq!(report.datasets[0].id, "bad.csv");
    assert!(matches!(&report.datasets[0].status, DatasetStatus::Error(e) if e.contains("expected 2 fields")));
    assert_eq!(report.datasets[1].status, DatasetStatus::Success);
    assert_eq!(report.process_exit_code(), 1);
    assert_eq!(report.datasets[0].status.exit_code(), Some(1));

    let cache = CacheStore::load(root.join(".cache").join("data.cache")).unwrap();
    assert!(cache.lookup("good.csv").is_some());
    assert!(cache.lookup("bad.csv").is_none());
    // partial output of the failed dataset stays on disk
    assert_eq!(read_csv(&output_path(root, "bad")), vec![vec!["a"], vec!["1"]]);
}

#[test]
fn missing_input_is_reported_without_running() {
    let tmp = make_root();
    let root = tmp.path();
    let src = write_source(
        root,
        "ghost.json",
        &json!({"localfile": "ghost.csv", "format": {"type": "csv"}, "schema": {"a": "A"}}),
    );
    let report = test_pipeline(root).run(vec![load(root, &src)]);
    assert_eq!(report.errored().len(), 1);
    assert!(!output_path(root, "ghost").exists());
}

#[test]
fn pre_cancelled_run_reports_interrupted_and_caches_nothing() {
    let tmp = make_root();
    let root = tmp.path();
    write_input(root, "stores.csv", STORES_CSV);
    let src = stores_source(root);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = test_pipeline(root).cancel_token(cancel).run(vec![load(root, &src)]);
    assert_eq!(report.interrupted(), ["stores.csv"]);
    assert_eq!(report.datasets[0].status.exit_code(), None);
    assert_eq!(report.process_exit_code(), 130);
    let cache = CacheStore::load(root.join(".cache").join("data.cache")).unwrap();
    assert!(cache.is_empty());
}

#[test]
fn unreadable_cache_is_reported_and_run_continues() {
    let tmp = make_root();
    let root = tmp.path();
    write_input(root, "stores.csv", STORES_CSV);
    let src = stores_source(root);
    fs::create_dir_all(root.join(".cache")).unwrap();
    fs::write(root.join(".cache").join("data.cache"), "garbage\n").unwrap();

    let report = test_pipeline(root).run(vec![load(root, &src)]);
    assert_eq!(report.succeeded(), ["stores.csv"]);
    assert_eq!(report.cache_errors.len(), 1);
    // the rewritten cache is well formed again
    assert!(CacheStore::load(root.join(".cache").join("data.cache")).unwrap().lookup("stores.csv").is_some());
}

#[test]
fn clear_cache_forces_reprocessing() {
    let tmp = make_root();
    let root = tmp.path();
    write_input(root, "stores.csv", STORES_CSV);
    let src = stores_source(root);
    let pipeline = test_pipeline(root);
    pipeline.run(vec![load(root, &src)]);
    assert_eq!(pipeline.run(vec![load(root, &src)]).skipped(), ["stores.csv"]);

    pipeline.clear_cache().unwrap();
    assert!(CacheStore::load(root.join(".cache").join("data.cache")).unwrap().is_empty());
    assert_eq!(pipeline.run(vec![load(root, &src)]).succeeded(), ["stores.csv"]);
}

#[test]
fn duplicate_identifiers_and_outputs_are_not_queued_twice() {
    let tmp = make_root();
    let root = tmp.path();
    write_input(root, "stores.csv", STORES_CSV);
    write_input(root, "stores.json", "[]");
    let first = stores_source(root);
    let again = write_source(
        root,
        "stores-copy.json",
        &json!({"localfile": "stores.csv", "format": {"type": "csv"}, "schema": {"city": "CITY"}}),
    );
    // different identifier, same output stem
    let same_output = write_source(
        root,
        "stores-json.json",
        &json!({"localfile": "stores.json", "format": {"type": "json"}, "schema": {"city": "city"}}),
    );

    let report = test_pipeline(root)
        .workers(3)
        .run(vec![load(root, &first), load(root, &again), load(root, &same_output)]);
    assert_eq!(report.datasets[0].status, DatasetStatus::Success);
    assert!(matches!(&report.datasets[1].status, DatasetStatus::Error(e) if e.contains("duplicate dataset identifier")));
    assert!(matches!(&report.datasets[2].status, DatasetStatus::Error(e) if e.contains("already written")));
    assert_eq!(report.process_exit_code(), 1);
    assert_eq!(read_csv(&output_path(root, "stores"))[0], vec!["name", "city"]);
}

#[test]
fn fixture_roots_are_removed_with_their_guard() {
    let path = {
        let tmp = make_root();
        tmp.path().to_path_buf()
    };
    assert!(!path.exists());
}
