use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};

use dirtally_core::Counters;
use dirtally_monitor::{MonitorTable, PendingDeletions};

#[test]
fn propagation_reaches_tracked_ancestors_only() {
    let table = MonitorTable::new();
    table.add(Path::new("/a"), Some(3), None);
    table.add(Path::new("/a/b"), None, None);
    table.add(Path::new("/a/d"), None, None);

    let updated = table.propagate_to_ancestors(Path::new("/a/b/c/file.txt"), Counters::file(10));
    assert_eq!(updated, 2);
    assert_eq!(table.find(Path::new("/a")).unwrap().aggregate, Counters::file(10));
    assert_eq!(table.find(Path::new("/a/b")).unwrap().aggregate, Counters::file(10));
    assert_eq!(table.find(Path::new("/a/d")).unwrap().aggregate, Counters::ZERO);
}

#[test]
fn conservation_of_file_counts() {
    let table = MonitorTable::new();
    let dir = Path::new("/w");
    table.add(dir, Some(1), Some(true));

    table.propagate_to_ancestors(&dir.join("A"), Counters::file(100));
    table.propagate_to_ancestors(&dir.join("B"), Counters::file(50));
    assert_eq!(table.find(dir).unwrap().aggregate, Counters::new(2, 150));

    table.propagate_to_ancestors(&dir.join("A"), -Counters::file(100));
    assert_eq!(table.find(dir).unwrap().aggregate, Counters::new(1, 50));
}

#[test]
fn zero_delta_is_not_propagated() {
    let table = MonitorTable::new();
    table.add(Path::new("/w"), Some(1), None);
    assert_eq!(table.propagate_to_ancestors(Path::new("/w/f"), Counters::ZERO), 0);
}

#[test]
fn concurrent_deltas_on_distinct_files_sum_up() {
    let table = Arc::new(MonitorTable::new());
    table.add(Path::new("/root"), Some(2), None);
    table.add(Path::new("/root/a"), None, None);
    table.add(Path::new("/root/b"), None, None);

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|thread| {
            let table = table.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let dir = if thread % 2 == 0 { "/root/a" } else { "/root/b" };
                for idx in 0..500 {
                    let file = PathBuf::from(format!("{dir}/{thread}-{idx}"));
                    table.propagate_to_ancestors(&file, Counters::file(2));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.find(Path::new("/root")).unwrap().aggregate, Counters::new(2000, 4000));
    assert_eq!(table.find(Path::new("/root/a")).unwrap().aggregate, Counters::new(1000, 2000));
}

#[test]
fn level_two_root_decomposes_one_level() {
    let table = MonitorTable::new();
    table.add(Path::new("/r"), Some(2), None);
    assert!(table.add(Path::new("/r/x"), None, None).inserted());
    assert!(!table.add(Path::new("/r/x/y"), None, None).inserted());
    assert_eq!(table.tracked_children(Path::new("/r")).len(), 1);
}

#[test]
fn pending_deletions_drain_once() {
    let pending = PendingDeletions::new();
    pending.record(Path::new("/b"));
    pending.record(Path::new("/a"));
    pending.record(Path::new("/a"));
    assert!(pending.remove(Path::new("/b")));
    pending.record(Path::new("/c"));

    assert_eq!(pending.drain(), vec![PathBuf::from("/a"), PathBuf::from("/c")]);
    assert!(pending.is_empty());
}
