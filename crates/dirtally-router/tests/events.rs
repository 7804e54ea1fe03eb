mod common;

use std::fs;

use common::Fixture;
use dirtally_core::Counters;
use dirtally_watch::EventKind;

#[test]
fn initial_build_counts_existing_files() {
    let fx = Fixture::new();
    fx.write("a.txt", 10);
    fx.write("b.txt", 5);
    fx.write("sub/c.txt", 7);
    fx.write("sub/deeper/d.txt", 3);

    assert!(!fx.router.is_build_complete());
    fx.build(&[fx.watch_root(2)]);

    assert!(fx.router.is_build_complete());
    assert_eq!(fx.aggregate(""), Counters::new(4, 25));
    assert_eq!(fx.aggregate("sub"), Counters::new(2, 10));
    assert!(!fx.is_tracked("sub/deeper"));
    assert!(fx.watcher.is_watched(&fx.root));
    assert!(fx.watcher.is_watched(&fx.path("sub")));
    assert!(!fx.watcher.is_watched(&fx.path("sub/deeper")));
}

#[test]
fn file_create_and_delete_reach_every_tracked_ancestor() {
    let fx = Fixture::new();
    fx.mkdir("sub");
    fx.build(&[fx.watch_root(2)]);

    let file = fx.write("sub/new.bin", 100);
    fx.send_and_settle(&file, EventKind::Create, false);
    assert_eq!(fx.aggregate(""), Counters::new(1, 100));
    assert_eq!(fx.aggregate("sub"), Counters::new(1, 100));

    fs::remove_file(&file).unwrap();
    fx.send_and_settle(&file, EventKind::Delete, false);
    assert_eq!(fx.aggregate(""), Counters::ZERO);
    assert_eq!(fx.aggregate("sub"), Counters::ZERO);
    assert_eq!(fx.router.cache().get(&file).unwrap(), None);
}

#[test]
fn duplicate_create_is_counted_once() {
    let fx = Fixture::new();
    fx.build(&[fx.watch_root(1)]);

    let file = fx.write("once.txt", 42);
    fx.send(&file, EventKind::Create, false);
    fx.send(&file, EventKind::Create, false);
    fx.send(&file, EventKind::CloseWrite, false);
    fx.router.settle();

    assert_eq!(fx.aggregate(""), Counters::new(1, 42));
}

#[test]
fn close_write_applies_the_size_difference() {
    let fx = Fixture::new();
    fx.build(&[fx.watch_root(1)]);

    let file = fx.write("grow.log", 10);
    fx.send_and_settle(&file, EventKind::Create, false);
    fs::write(&file, vec![b'y'; 30]).unwrap();
    fx.send_and_settle(&file, EventKind::CloseWrite, false);
    assert_eq!(fx.aggregate(""), Counters::new(1, 30));

    fs::write(&file, b"").unwrap();
    fx.send_and_settle(&file, EventKind::CloseWrite, false);
    assert_eq!(fx.aggregate(""), Counters::new(1, 0));
    assert_eq!(fx.router.cache().get(&file).unwrap(), Some(Counters::new(1, 0)));
}

#[test]
fn counter_only_roots_ignore_sizes() {
    let fx = Fixture::new();
    fx.write("pre.txt", 500);
    let mut root = fx.watch_root(1);
    root.counts_size = false;
    fx.build(&[root]);
    assert_eq!(fx.aggregate(""), Counters::new(1, 0));

    let file = fx.write("post.txt", 10);
    fx.send_and_settle(&file, EventKind::Create, false);
    fs::write(&file, vec![b'z'; 99]).unwrap();
    fx.send_and_settle(&file, EventKind::CloseWrite, false);
    assert_eq!(fx.aggregate(""), Counters::new(2, 0));

    fs::remove_file(&file).unwrap();
    fx.send_and_settle(&file, EventKind::Delete, false);
    assert_eq!(fx.aggregate(""), Counters::new(1, 0));
}

#[test]
fn dot_files_are_ignored() {
    let fx = Fixture::new();
    fx.write(".hidden", 10);
    fx.build(&[fx.watch_root(1)]);
    assert_eq!(fx.aggregate(""), Counters::ZERO);

    let swap = fx.write(".notes.swp", 4096);
    fx.send_and_settle(&swap, EventKind::Create, false);
    assert_eq!(fx.aggregate(""), Counters::ZERO);
}

#[test]
fn vanished_file_insert_is_dropped() {
    let fx = Fixture::new();
    fx.build(&[fx.watch_root(1)]);

    fx.send_and_settle(&fx.path("ghost.txt"), EventKind::Create, false);
    assert_eq!(fx.aggregate(""), Counters::ZERO);

    fx.send_and_settle(&fx.path("ghost.txt"), EventKind::Delete, false);
    assert_eq!(fx.aggregate(""), Counters::ZERO);
}

#[test]
fn file_rename_keeps_totals_and_rekeys_the_record() {
    let fx = Fixture::new();
    fx.mkdir("left");
    fx.mkdir("right");
    let from = fx.write("left/doc.txt", 12);
    fx.build(&[fx.watch_root(2)]);
    assert_eq!(fx.aggregate("left"), Counters::new(1, 12));

    let to = fx.path("right/doc.txt");
    fs::rename(&from, &to).unwrap();
    fx.send(&from, EventKind::MovedFrom, false);
    fx.send(&to, EventKind::MovedTo, false);
    fx.router.settle();

    assert_eq!(fx.aggregate(""), Counters::new(1, 12));
    assert_eq!(fx.aggregate("left"), Counters::ZERO);
    assert_eq!(fx.aggregate("right"), Counters::new(1, 12));
    assert_eq!(fx.router.cache().get(&from).unwrap(), None);
    assert_eq!(fx.router.cache().get(&to).unwrap(), Some(Counters::new(1, 12)));
}

#[test]
fn file_moved_out_is_subtracted() {
    let fx = Fixture::new();
    let file = fx.write("leaving.txt", 8);
    fx.build(&[fx.watch_root(1)]);

    let outside = fx.tmp.path().join("leaving.txt");
    fs::rename(&file, &outside).unwrap();
    fx.send_and_settle(&file, EventKind::MovedFrom, false);

    assert_eq!(fx.aggregate(""), Counters::ZERO);
}

#[test]
fn watcher_errors_are_not_fatal() {
    let fx = Fixture::new();
    fx.build(&[fx.watch_root(1)]);

    fx.router.handle_message(Err(std::io::Error::other("inotify hiccup")));
    let file = fx.write("after.txt", 3);
    fx.router
        .handle_message(Ok(dirtally_watch::RawEvent::file(&file, EventKind::Create).into()));
    fx.router.settle();

    assert_eq!(fx.aggregate(""), Counters::new(1, 3));
}
