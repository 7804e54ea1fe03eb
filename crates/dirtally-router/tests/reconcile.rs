mod common;

use std::fs;
use std::time::Duration;

use common::Fixture;
use dirtally_core::Counters;
use dirtally_router::{ReconcileReport, ShutdownSignal, MISMATCH_LIMIT};
use dirtally_watch::EventKind;

fn pass(fx: &Fixture) -> ReconcileReport {
    fx.router
        .reconcile_once(&ShutdownSignal::never(), Duration::ZERO)
        .unwrap()
}

#[test]
fn consistent_tree_reports_no_mismatch() {
    let fx = Fixture::new();
    fx.write("a/one", 1);
    fx.write("b/two", 2);
    fx.write("three", 3);
    fx.build(&[fx.watch_root(2)]);

    let report = pass(&fx);
    assert_eq!(report.checked, 3);
    assert_eq!(report.mismatched, 0);
    assert_eq!(report.corrected, 0);
}

#[test]
fn drift_is_corrected_after_repeated_mismatches() {
    let fx = Fixture::new();
    fx.write("sub/known", 10);
    fx.build(&[fx.watch_root(2)]);

    // Written behind the watcher's back.
    fx.write("sub/missed", 5);

    for _ in 0..MISMATCH_LIMIT {
        let report = pass(&fx);
        // Only `sub` disagrees; the root still sums its children.
        assert_eq!(report.mismatched, 1);
        assert_eq!(report.corrected, 0);
        assert_eq!(fx.aggregate("sub"), Counters::new(1, 10));
    }

    let report = pass(&fx);
    assert_eq!(report.corrected, 1);
    assert_eq!(fx.aggregate("sub"), Counters::new(2, 15));
    assert_eq!(fx.aggregate(""), Counters::new(2, 15));

    assert_eq!(pass(&fx).mismatched, 0);
}

#[test]
fn files_removed_without_events_are_subtracted() {
    let fx = Fixture::new();
    fx.write("gone", 7);
    fx.write("stays", 1);
    fx.build(&[fx.watch_root(1)]);

    fs::remove_file(fx.path("gone")).unwrap();
    for _ in 0..=MISMATCH_LIMIT {
        pass(&fx);
    }
    assert_eq!(fx.aggregate(""), Counters::new(1, 1));
    assert!(!fx.store.contains(&fx.path("gone")));
    assert!(!fx.router.cache().is_resident(&fx.path("gone")));
}

#[test]
fn recreated_file_counts_after_recount() {
    let fx = Fixture::new();
    fx.write("gone", 7);
    fx.write("stays", 1);
    fx.build(&[fx.watch_root(1)]);

    fs::remove_file(fx.path("gone")).unwrap();
    for _ in 0..=MISMATCH_LIMIT {
        pass(&fx);
    }
    assert_eq!(fx.aggregate(""), Counters::new(1, 1));

    let gone = fx.write("gone", 7);
    fx.send_and_settle(&gone, EventKind::Create, false);
    assert_eq!(fx.aggregate(""), Counters::new(2, 8));
    assert_eq!(pass(&fx).mismatched, 0);
}

#[test]
fn vanished_directories_are_pruned() {
    let fx = Fixture::new();
    fx.mkdir("ephemeral");
    fx.build(&[fx.watch_root(2)]);

    fs::remove_dir(fx.path("ephemeral")).unwrap();
    let report = pass(&fx);

    assert_eq!(report.pruned, 1);
    assert!(!fx.is_tracked("ephemeral"));
    assert!(fx.router.pending_deletions().contains(&fx.path("ephemeral")));
    assert!(fx.watcher.unwatch_calls().contains(&fx.path("ephemeral")));
}

#[test]
fn rescan_forces_an_immediate_recount() {
    let fx = Fixture::new();
    fx.build(&[fx.watch_root(1)]);

    fx.write("overflowed-1", 4);
    fx.write("overflowed-2", 4);
    fx.router.handle_message(Ok(dirtally_watch::WatchEvent::Rescan));
    fx.router.settle();

    assert_eq!(fx.aggregate(""), Counters::new(2, 8));
}

#[test]
fn triggered_shutdown_stops_the_pass() {
    let fx = Fixture::new();
    fx.mkdir("a");
    fx.mkdir("b");
    fx.build(&[fx.watch_root(2)]);

    let (trigger, signal) = dirtally_router::shutdown_channel();
    trigger.trigger();
    let report = fx
        .router
        .reconcile_once(&signal, Duration::from_secs(60))
        .unwrap();
    assert_eq!(report.checked, 0);
}

#[test]
fn reload_picks_up_new_roots() {
    let fx = Fixture::new();
    fx.write("x/data", 11);
    fx.write("top", 1);
    fx.build(&[]);
    assert!(fx.router.table().is_empty());

    let roots_file = fx.tmp.path().join("roots.json");
    let roots = serde_json::json!([{ "path": fx.root, "level": 2 }]);
    fs::write(&roots_file, roots.to_string()).unwrap();

    let added = fx.router.reload_roots(&roots_file).unwrap();
    assert_eq!(added, 2);
    fx.router.settle();
    assert_eq!(fx.aggregate(""), Counters::new(2, 12));
    assert_eq!(fx.aggregate("x"), Counters::new(1, 11));

    assert_eq!(fx.router.reload_roots(&roots_file).unwrap(), 0);
    fx.router.settle();
    assert_eq!(fx.aggregate(""), Counters::new(2, 12));
}
