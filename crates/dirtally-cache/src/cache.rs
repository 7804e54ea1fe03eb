use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dirtally_core::{path_bytes, string_hash, Counters};
use dirtally_memory::{MemoryBudget, MemoryTracker};
use dirtally_store::{DurableStore, Result};
use parking_lot::Mutex;
use rand::Rng;

/// Number of hash buckets guarded by a single lock.
pub const BUCKETS_PER_LOCK: usize = 10;

/// Random bucket probes attempted before a swap falls back to a linear scan.
pub const SWAP_RANDOM_PROBES: usize = 5;

const ENTRY_OVERHEAD: u64 = std::mem::size_of::<CacheEntry>() as u64;

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub buckets: usize,
    pub budget: MemoryBudget,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            buckets: 1_024_000,
            budget: MemoryBudget::from_mb(1024),
        }
    }
}

/// Outcome of one or more bucket evictions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapReport {
    pub buckets: usize,
    pub entries: usize,
    pub bytes_freed: u64,
}

impl SwapReport {
    fn absorb(&mut self, other: SwapReport) {
        self.buckets += other.buckets;
        self.entries += other.entries;
        self.bytes_freed += other.bytes_freed;
    }
}

#[derive(Debug)]
struct CacheEntry {
    key: PathBuf,
    counters: Counters,
}

impl CacheEntry {
    fn charge(&self) -> u64 {
        charge_for(&self.key)
    }
}

fn charge_for(key: &Path) -> u64 {
    path_bytes(key).len() as u64 + ENTRY_OVERHEAD
}

#[derive(Debug, Default)]
struct Stripe {
    buckets: Vec<Vec<CacheEntry>>,
}

pub struct ObjectCache {
    stripes: Vec<Mutex<Stripe>>,
    bucket_count: usize,
    store: Arc<dyn DurableStore>,
    memory: MemoryTracker,
    budget: MemoryBudget,
    resident: AtomicUsize,
    /// Serializes swaps; holds the last evicted bucket.
    swap_cursor: Mutex<usize>,
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("buckets", &self.bucket_count)
            .field("resident", &self.len())
            .field("memory_bytes", &self.memory_bytes())
            .finish()
    }
}

impl ObjectCache {
    pub fn new(config: CacheConfig, store: Arc<dyn DurableStore>) -> Self {
        let bucket_count = config.buckets.max(1);
        let stripe_count = bucket_count.div_ceil(BUCKETS_PER_LOCK);
        let stripes = (0..stripe_count)
            .map(|idx| {
                let first = idx * BUCKETS_PER_LOCK;
                let len = BUCKETS_PER_LOCK.min(bucket_count - first);
                Mutex::new(Stripe {
                    buckets: (0..len).map(|_| Vec::new()).collect(),
                })
            })
            .collect();

        Self {
            stripes,
            bucket_count,
            store,
            memory: MemoryTracker::new(),
            budget: config.budget,
            resident: AtomicUsize::new(0),
            swap_cursor: Mutex::new(0),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn budget(&self) -> MemoryBudget {
        self.budget
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    /// Number of records held in memory.
    pub fn len(&self) -> usize {
        self.resident.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked memory usage, in bytes (quantized).
    pub fn memory_bytes(&self) -> u64 {
        self.memory.bytes()
    }

    pub fn needs_swap(&self) -> bool {
        self.budget.needs_swap(self.memory.bytes())
    }

    fn bucket_of(&self, key: &Path) -> usize {
        string_hash(path_bytes(key)) as usize % self.bucket_count
    }

    fn locate(bucket: usize) -> (usize, usize) {
        (bucket / BUCKETS_PER_LOCK, bucket % BUCKETS_PER_LOCK)
    }

    /// Whether `key` is currently resident in memory.
    pub fn is_resident(&self, key: &Path) -> bool {
        let (stripe, slot) = Self::locate(self.bucket_of(key));
        self.stripes[stripe].lock().buckets[slot]
            .iter()
            .any(|entry| entry.key == key)
    }

    /// Looks `key` up in memory, then in the durable store.
    pub fn get(&self, key: &Path) -> Result<Option<Counters>> {
        let (stripe, slot) = Self::locate(self.bucket_of(key));
        {
            let guard = self.stripes[stripe].lock();
            if let Some(entry) = guard.buckets[slot].iter().find(|entry| entry.key == key) {
                return Ok(Some(entry.counters));
            }
        }
        self.store.get(key)
    }

    /// Records `counters` for `key`.
    ///
    /// Resident records are updated in place. New records go to memory while
    /// the budget allows it and straight to the durable store otherwise.
    pub fn put(&self, key: &Path, counters: Counters) -> Result<()> {
        let (stripe, slot) = Self::locate(self.bucket_of(key));
        {
            let mut guard = self.stripes[stripe].lock();
            let bucket = &mut guard.buckets[slot];
            if let Some(entry) = bucket.iter_mut().find(|entry| entry.key == key) {
                entry.counters = counters;
                return Ok(());
            }
            if !self.budget.is_exhausted(self.memory.bytes()) {
                let entry = CacheEntry {
                    key: key.to_path_buf(),
                    counters,
                };
                self.memory.add_bytes(entry.charge());
                bucket.push(entry);
                self.resident.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }
        self.store.put(key, counters)
    }

    /// Removes `key` from memory and from the durable store.
    ///
    /// The store is always cleared as well: it may hold an older generation
    /// of a record that was evicted and later re-cached.
    pub fn delete(&self, key: &Path) -> Result<bool> {
        let (stripe, slot) = Self::locate(self.bucket_of(key));
        let removed = {
            let mut guard = self.stripes[stripe].lock();
            let bucket = &mut guard.buckets[slot];
            match bucket.iter().position(|entry| entry.key == key) {
                Some(idx) => {
                    let entry = bucket.swap_remove(idx);
                    self.memory.sub_bytes(entry.charge());
                    self.resident.fetch_sub(1, Ordering::Relaxed);
                    true
                }
                None => false,
            }
        };
        let stored = self.store.delete(key)?;
        Ok(removed || stored)
    }

    /// Every record whose parent is `dir`, resident or stored.
    ///
    /// Scans all resident buckets; meant for occasional repair work.
    pub fn children(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut keys = self.store.children(dir)?;
        for stripe in &self.stripes {
            let guard = stripe.lock();
            for entry in guard.buckets.iter().flatten() {
                if entry.key.parent() == Some(dir) {
                    keys.push(entry.key.clone());
                }
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Evicts one non-empty bucket to the durable store.
    ///
    /// Probes [`SWAP_RANDOM_PROBES`] random buckets, then scans linearly from
    /// the last evicted bucket. Returns `None` when nothing is resident.
    pub fn swap_one(&self) -> Result<Option<SwapReport>> {
        let mut cursor = self.swap_cursor.lock();
        if self.is_empty() {
            return Ok(None);
        }

        let mut rng = rand::thread_rng();
        for _ in 0..SWAP_RANDOM_PROBES {
            let bucket = rng.gen_range(0..self.bucket_count);
            if let Some(report) = self.evict_bucket(bucket)? {
                *cursor = bucket;
                return Ok(Some(report));
            }
        }

        for step in 1..=self.bucket_count {
            let bucket = (*cursor + step) % self.bucket_count;
            if let Some(report) = self.evict_bucket(bucket)? {
                *cursor = bucket;
                return Ok(Some(report));
            }
        }
        Ok(None)
    }

    /// Swaps buckets until usage drops below the swap watermark or nothing
    /// is left in memory.
    pub fn swap_until_below_watermark(&self) -> Result<SwapReport> {
        let mut total = SwapReport::default();
        while self.needs_swap() {
            match self.swap_one()? {
                Some(report) => total.absorb(report),
                None => break,
            }
        }
        if total.buckets > 0 {
            tracing::info!(
                target = "dirtally.cache",
                buckets = total.buckets,
                entries = total.entries,
                bytes_freed = total.bytes_freed,
                memory_bytes = self.memory_bytes(),
                "swapped cache buckets to store"
            );
        }
        Ok(total)
    }

    /// Writes every resident record to the durable store and empties memory.
    pub fn flush_all(&self) -> Result<SwapReport> {
        let _cursor = self.swap_cursor.lock();
        let mut total = SwapReport::default();
        for bucket in 0..self.bucket_count {
            if let Some(report) = self.evict_bucket(bucket)? {
                total.absorb(report);
            }
        }
        self.store.sync()?;
        Ok(total)
    }

    fn evict_bucket(&self, bucket: usize) -> Result<Option<SwapReport>> {
        let (stripe, slot) = Self::locate(bucket);
        let mut guard = self.stripes[stripe].lock();
        if guard.buckets[slot].is_empty() {
            return Ok(None);
        }

        let detached = std::mem::take(&mut guard.buckets[slot]);
        let batch: Vec<(PathBuf, Counters)> = detached
            .iter()
            .map(|entry| (entry.key.clone(), entry.counters))
            .collect();
        if let Err(err) = self.store.put_many(&batch) {
            guard.buckets[slot] = detached;
            tracing::warn!(target = "dirtally.cache", bucket, error = %err, "failed to swap bucket");
            return Err(err);
        }

        let mut report = SwapReport {
            buckets: 1,
            entries: detached.len(),
            bytes_freed: 0,
        };
        for entry in &detached {
            let charge = entry.charge();
            report.bytes_freed += charge;
            self.memory.sub_bytes(charge);
        }
        self.resident.fetch_sub(detached.len(), Ordering::Relaxed);
        drop(guard);

        tracing::debug!(
            target = "dirtally.cache",
            bucket,
            entries = report.entries,
            "evicted bucket"
        );
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirtally_store::MemoryStore;

    fn cache_with(buckets: usize, max_bytes: u64) -> (ObjectCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = ObjectCache::new(
            CacheConfig {
                buckets,
                budget: MemoryBudget::new(max_bytes),
            },
            store.clone(),
        );
        (cache, store)
    }

    #[test]
    fn stripes_cover_every_bucket() {
        let (cache, _) = cache_with(23, 1 << 20);
        assert_eq!(cache.stripes.len(), 3);
        assert_eq!(cache.stripes[2].lock().buckets.len(), 3);
    }

    #[test]
    fn put_updates_resident_record_in_place() {
        let (cache, store) = cache_with(16, 1 << 20);
        let key = Path::new("/a/b");
        cache.put(key, Counters::file(1)).unwrap();
        let after_first = cache.memory_bytes();
        cache.put(key, Counters::file(2)).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_bytes(), after_first);
        assert_eq!(cache.get(key).unwrap(), Some(Counters::file(2)));
        assert!(store.is_empty());
    }

    #[test]
    fn delete_releases_memory() {
        let (cache, _) = cache_with(16, 1 << 20);
        cache.put(Path::new("/a/b"), Counters::file(1)).unwrap();
        assert!(cache.memory_bytes() > 0);
        assert!(cache.delete(Path::new("/a/b")).unwrap());
        assert_eq!(cache.memory_bytes(), 0);
        assert!(cache.is_empty());
        assert!(!cache.delete(Path::new("/a/b")).unwrap());
    }

    #[test]
    fn children_merges_resident_and_stored_records() {
        let (cache, store) = cache_with(8, 1 << 20);
        store.put(Path::new("/a/swapped"), Counters::file(1)).unwrap();
        cache.put(Path::new("/a/resident"), Counters::file(2)).unwrap();
        cache.put(Path::new("/a/sub/deeper"), Counters::file(3)).unwrap();

        assert_eq!(
            cache.children(Path::new("/a")).unwrap(),
            vec![PathBuf::from("/a/resident"), PathBuf::from("/a/swapped")]
        );
    }

    #[test]
    fn swap_of_empty_cache_is_none() {
        let (cache, _) = cache_with(16, 1 << 20);
        assert_eq!(cache.swap_one().unwrap(), None);
    }
}
