use std::path::{Path, PathBuf};
use std::sync::Arc;

use dirtally_core::Counters;
use dirtally_store::{DurableStore, MemoryStore, RedbStore};

fn exercise(store: &dyn DurableStore) {
    let key = Path::new("/data/projects/a.txt");
    assert_eq!(store.get(key).unwrap(), None);

    store.put(key, Counters::file(100)).unwrap();
    assert_eq!(store.get(key).unwrap(), Some(Counters::file(100)));

    store.put(key, Counters::file(120)).unwrap();
    assert_eq!(store.get(key).unwrap(), Some(Counters::file(120)));

    assert!(store.delete(key).unwrap());
    assert!(!store.delete(key).unwrap());
    assert_eq!(store.get(key).unwrap(), None);

    let batch: Vec<(PathBuf, Counters)> = (0..10)
        .map(|idx| (PathBuf::from(format!("/data/b/{idx}")), Counters::file(idx)))
        .collect();
    store.put_many(&batch).unwrap();
    for (key, value) in &batch {
        assert_eq!(store.get(key).unwrap(), Some(*value));
    }

    store.put(Path::new("/data/b/5/nested"), Counters::file(1)).unwrap();
    store.put(Path::new("/data/bb"), Counters::file(1)).unwrap();
    let mut children = store.children(Path::new("/data/b")).unwrap();
    children.sort();
    let mut expected: Vec<PathBuf> = batch.iter().map(|(key, _)| key.clone()).collect();
    expected.sort();
    assert_eq!(children, expected);
    assert!(store.children(Path::new("/elsewhere")).unwrap().is_empty());

    store.sync().unwrap();
}

#[test]
fn memory_store_contract() {
    exercise(&MemoryStore::new());
}

#[test]
fn redb_store_contract() {
    let tmp = tempfile::tempdir().unwrap();
    let store = RedbStore::open(tmp.path().join("nested/objects.redb")).unwrap();
    exercise(&store);
}

#[test]
fn redb_store_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("objects.redb");
    {
        let store = RedbStore::open(&path).unwrap();
        store.put(Path::new("/x/y"), Counters::new(1, 42)).unwrap();
        store.sync().unwrap();
    }
    let store = RedbStore::open(&path).unwrap();
    assert_eq!(store.get(Path::new("/x/y")).unwrap(), Some(Counters::new(1, 42)));
}

#[test]
fn redb_store_concurrent_writers() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(RedbStore::open(tmp.path().join("objects.redb")).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|thread| {
            let store = store.clone();
            std::thread::spawn(move || {
                for idx in 0..25 {
                    let key = PathBuf::from(format!("/t{thread}/f{idx}"));
                    store.put(&key, Counters::file(idx)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for thread in 0..4 {
        for idx in 0..25 {
            let key = PathBuf::from(format!("/t{thread}/f{idx}"));
            assert_eq!(store.get(&key).unwrap(), Some(Counters::file(idx)));
        }
    }
}
