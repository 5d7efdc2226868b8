use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::shared::constants::{DEFAULT_CACHE_GIGABYTES, GIGABYTE};
use crate::shared::image::Image;

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Identifies whoever inserted a group of frames, usually one open clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerKey(u64);

impl OwnerKey {
    pub fn next() -> Self {
        Self(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Shared read-only access to a cached frame. The entry stays pinned until
/// every handle to it is dropped.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    owner: OwnerKey,
    frame: i64,
    image: Arc<Image>,
}

impl CacheHandle {
    pub fn owner(&self) -> OwnerKey {
        self.owner
    }

    pub fn frame(&self) -> i64 {
        self.frame
    }

    pub fn image(&self) -> &Image {
        &self.image
    }
}

struct Entry {
    image: Arc<Image>,
    bytes: u64,
    last_access: u64,
}

impl Entry {
    /// Handles held outside the cache.
    fn references(&self) -> usize {
        Arc::strong_count(&self.image) - 1
    }
}

type Key = (OwnerKey, i64);

struct CacheState {
    entries: HashMap<Key, Entry>,
    /// Keys ordered by `last_access`, oldest first. Ticks are unique.
    recency: BTreeMap<u64, Key>,
    byte_count: u64,
    max_bytes: u64,
    clock: u64,
    enabled: bool,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn insert(&mut self, key: Key, image: Arc<Image>) {
        let last_access = self.tick();
        let bytes = image.byte_count() as u64;
        self.byte_count += bytes;
        self.recency.insert(last_access, key);
        self.entries.insert(
            key,
            Entry {
                image,
                bytes,
                last_access,
            },
        );
    }

    /// Moves a hit to the most recently used position.
    fn touch(&mut self, key: &Key) -> Option<Arc<Image>> {
        let tick = self.tick();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.last_access);
        entry.last_access = tick;
        self.recency.insert(tick, *key);
        Some(Arc::clone(&entry.image))
    }

    fn remove(&mut self, key: &Key) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_access);
        self.byte_count -= entry.bytes;
        Some(entry)
    }

    /// Drops unreferenced entries matching `filter`. Referenced ones are
    /// detached and live on only through their handles.
    fn invalidate(&mut self, filter: impl Fn(&Key) -> bool) -> usize {
        let keys: Vec<Key> = self.entries.keys().filter(|k| filter(k)).copied().collect();
        for key in &keys {
            if let Some(entry) = self.remove(key) {
                if entry.references() > 0 {
                    log::debug!("orphaned frame {} with {} live handles", key.1, entry.references());
                }
            }
        }
        keys.len()
    }

    fn purge(&mut self) -> usize {
        if self.byte_count <= self.max_bytes {
            return 0;
        }
        let excess = self.byte_count - self.max_bytes;
        let mut freed = 0;
        let mut victims = Vec::new();
        for key in self.recency.values() {
            if freed >= excess {
                break;
            }
            let Some(entry) = self.entries.get(key) else {
                continue;
            };
            if entry.references() == 0 {
                freed += entry.bytes;
                victims.push(*key);
            }
        }

        for key in &victims {
            self.remove(key);
        }
        let evicted = victims.len();
        if self.byte_count > self.max_bytes {
            log::debug!(
                "cache over budget after purge: {} of {} bytes, remaining entries pinned",
                self.byte_count,
                self.max_bytes
            );
        } else if evicted > 0 {
            log::debug!("purged {evicted} frames, {} bytes cached", self.byte_count);
        }
        evicted
    }
}

/// Budgeted LRU cache of decoded frames keyed by `(owner, frame)`.
///
/// Recency is by access: `get` hits move an entry to the most recently
/// used position. Entries with live handles are never evicted, so the cache
/// may sit above its budget until handles are dropped.
pub struct FrameCache {
    state: Mutex<CacheState>,
}

impl FrameCache {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                byte_count: 0,
                max_bytes,
                clock: 0,
                enabled: true,
            }),
        }
    }

    pub fn with_gigabytes(gigabytes: f64) -> Self {
        Self::new(gigabytes_to_bytes(gigabytes))
    }

    /// Inserts `image` as the most recently used entry and purges. An
    /// existing entry for the same key is replaced; if it still has handles
    /// it is orphaned rather than freed.
    pub fn add(&self, owner: OwnerKey, frame: i64, image: Image) -> CacheHandle {
        let handle = CacheHandle {
            owner,
            frame,
            image: Arc::new(image),
        };
        let mut state = self.state.lock().unwrap();
        if !state.enabled {
            return handle;
        }
        let key = (owner, frame);
        state.invalidate(|k| *k == key);
        state.insert(key, Arc::clone(&handle.image));
        state.purge();
        handle
    }

    /// A miss leaves the cache untouched.
    pub fn get(&self, owner: OwnerKey, frame: i64) -> Option<CacheHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.entries.contains_key(&(owner, frame)) {
            return None;
        }
        let image = state.touch(&(owner, frame))?;
        Some(CacheHandle { owner, frame, image })
    }

    pub fn contains(&self, owner: OwnerKey, frame: i64) -> bool {
        self.state.lock().unwrap().entries.contains_key(&(owner, frame))
    }

    /// Live handles to an entry, `None` when it is not cached.
    pub fn references(&self, owner: OwnerKey, frame: i64) -> Option<usize> {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(&(owner, frame))
            .map(Entry::references)
    }

    pub fn invalidate(&self, owner: OwnerKey) -> usize {
        self.state.lock().unwrap().invalidate(|k| k.0 == owner)
    }

    pub fn invalidate_frame(&self, owner: OwnerKey, frame: i64) -> usize {
        self.state.lock().unwrap().invalidate(|k| *k == (owner, frame))
    }

    /// Evicts least recently used unreferenced entries until within budget.
    /// Returns the number evicted.
    pub fn purge(&self) -> usize {
        self.state.lock().unwrap().purge()
    }

    pub fn set_max_bytes(&self, max_bytes: u64) {
        let mut state = self.state.lock().unwrap();
        state.max_bytes = max_bytes;
        state.purge();
    }

    pub fn set_max_gigabytes(&self, gigabytes: f64) {
        self.set_max_bytes(gigabytes_to_bytes(gigabytes));
    }

    pub fn max_bytes(&self) -> u64 {
        self.state.lock().unwrap().max_bytes
    }

    pub fn byte_count(&self) -> u64 {
        self.state.lock().unwrap().byte_count
    }

    pub fn byte_count_for(&self, owner: OwnerKey) -> u64 {
        let state = self.state.lock().unwrap();
        state
            .entries
            .iter()
            .filter(|(k, _)| k.0 == owner)
            .map(|(_, e)| e.bytes)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached frames of `owner`, sorted.
    pub fn frames(&self, owner: OwnerKey) -> Vec<i64> {
        let state = self.state.lock().unwrap();
        let mut frames: Vec<i64> = state.entries.keys().filter(|k| k.0 == owner).map(|k| k.1).collect();
        frames.sort_unstable();
        frames
    }

    /// Drops every entry; ones still referenced are orphaned.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        let count = state.invalidate(|_| true);
        log::debug!("cleared {count} cached frames");
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    /// A disabled cache is emptied and `add` stops storing frames.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock().unwrap();
        state.enabled = enabled;
        if !enabled {
            state.invalidate(|_| true);
        }
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::with_gigabytes(DEFAULT_CACHE_GIGABYTES)
    }
}

pub fn gigabytes_to_bytes(gigabytes: f64) -> u64 {
    (gigabytes.max(0.0) * GIGABYTE as f64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::image::ImageInfo;
    use crate::shared::pixel::PixelType;
    use rstest::rstest;

    /// 100-byte frame.
    fn frame_image(value: u8) -> Image {
        Image::new(ImageInfo::new(10, 10, PixelType::L_U8), vec![value; 100]).unwrap()
    }

    #[test]
    fn test_byte_accounting_uses_decoded_size() {
        let cache = FrameCache::new(1 << 20);
        let owner = OwnerKey::next();
        let image = Image::zeroed(ImageInfo::new(4, 3, PixelType::RGBA_F16));
        cache.add(owner, 1, image);
        assert_eq!(cache.byte_count(), 4 * 3 * 4 * 2);
        assert_eq!(cache.byte_count_for(owner), 96);
        assert_eq!(cache.byte_count_for(OwnerKey::next()), 0);
    }

    #[test]
    fn test_eviction_converges_under_budget() {
        let cache = FrameCache::new(350);
        let owner = OwnerKey::next();
        for frame in 0..10 {
            cache.add(owner, frame, frame_image(frame as u8));
        }
        assert!(cache.byte_count() <= cache.max_bytes());
        assert_eq!(cache.frames(owner), vec![7, 8, 9]);
    }

    #[test]
    fn test_pinned_entries_survive_purge() {
        let cache = FrameCache::new(1000);
        let owner = OwnerKey::next();
        let pinned: Vec<CacheHandle> = (0..5).map(|f| cache.add(owner, f, frame_image(f as u8))).collect();

        cache.set_max_bytes(100);
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.byte_count(), 500);
        assert_eq!(cache.references(owner, 0), Some(1));

        drop(pinned);
        assert_eq!(cache.references(owner, 0), Some(0));
        assert_eq!(cache.purge(), 4);
        assert_eq!(cache.byte_count(), 100);
        assert_eq!(cache.frames(owner), vec![4]);
    }

    #[test]
    fn test_get_miss_does_not_mutate() {
        let cache = FrameCache::new(250);
        let owner = OwnerKey::next();
        cache.add(owner, 1, frame_image(1));
        cache.add(owner, 2, frame_image(2));

        assert!(cache.get(owner, 99).is_none());
        assert!(cache.get(OwnerKey::next(), 1).is_none());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.byte_count(), 200);

        // Oldest still goes first.
        cache.add(owner, 3, frame_image(3));
        assert_eq!(cache.frames(owner), vec![2, 3]);
    }

    #[test]
    fn test_get_hit_changes_eviction_order() {
        let cache = FrameCache::new(250);
        let owner = OwnerKey::next();
        cache.add(owner, 1, frame_image(1));
        cache.add(owner, 2, frame_image(2));

        let hit = cache.get(owner, 1).unwrap();
        assert_eq!(hit.image().data()[0], 1);
        assert_eq!(hit.frame(), 1);
        drop(hit);

        cache.add(owner, 3, frame_image(3));
        assert_eq!(cache.frames(owner), vec![1, 3]);
    }

    #[test]
    fn test_purge_follows_access_order_past_pinned() {
        let cache = FrameCache::new(1000);
        let owner = OwnerKey::next();
        let pinned = cache.add(owner, 0, frame_image(0));
        for frame in 1..6 {
            cache.add(owner, frame, frame_image(frame as u8));
        }
        // Recency, oldest first: 0 (pinned), 2, 4, 5, 1, 3.
        drop(cache.get(owner, 1));
        drop(cache.get(owner, 3));

        cache.set_max_bytes(400);
        assert_eq!(cache.frames(owner), vec![0, 1, 3, 5]);
        cache.set_max_bytes(200);
        assert_eq!(cache.frames(owner), vec![0, 3]);

        drop(pinned);
        cache.invalidate_frame(owner, 3);
        cache.add(owner, 6, frame_image(6));
        cache.add(owner, 7, frame_image(7));
        assert_eq!(cache.frames(owner), vec![6, 7]);
        assert_eq!(cache.byte_count(), 200);
    }

    #[test]
    fn test_invalidate_orphans_referenced_entries() {
        let cache = FrameCache::new(1000);
        let clip = OwnerKey::next();
        let other = OwnerKey::next();
        let held = cache.add(clip, 1, frame_image(1));
        cache.add(clip, 2, frame_image(2));
        cache.add(other, 1, frame_image(9));

        assert_eq!(cache.invalidate(clip), 2);
        assert!(cache.get(clip, 1).is_none());
        assert!(!cache.contains(clip, 2));
        assert_eq!(cache.frames(other), vec![1]);
        assert_eq!(cache.byte_count(), 100);
        // The orphan is still readable through its handle.
        assert_eq!(held.image().data()[0], 1);
    }

    #[test]
    fn test_invalidate_single_frame() {
        let cache = FrameCache::new(1000);
        let owner = OwnerKey::next();
        cache.add(owner, 1, frame_image(1));
        cache.add(owner, 2, frame_image(2));
        assert_eq!(cache.invalidate_frame(owner, 1), 1);
        assert_eq!(cache.invalidate_frame(owner, 1), 0);
        assert_eq!(cache.frames(owner), vec![2]);
    }

    #[test]
    fn test_add_replaces_referenced_key() {
        let cache = FrameCache::new(1000);
        let owner = OwnerKey::next();
        let old = cache.add(owner, 1, frame_image(1));
        cache.add(owner, 1, frame_image(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.byte_count(), 100);
        assert_eq!(cache.get(owner, 1).unwrap().image().data()[0], 2);
        assert_eq!(old.image().data()[0], 1);
    }

    #[test]
    fn test_disabled_cache_passes_through() {
        let cache = FrameCache::new(1000);
        let owner = OwnerKey::next();
        cache.add(owner, 1, frame_image(1));
        cache.set_enabled(false);
        assert!(cache.is_empty());

        let handle = cache.add(owner, 2, frame_image(2));
        assert_eq!(handle.image().data()[0], 2);
        assert!(!cache.contains(owner, 2));
        assert_eq!(cache.byte_count(), 0);
    }

    #[test]
    fn test_clear_keeps_budget() {
        let cache = FrameCache::new(1000);
        let owner = OwnerKey::next();
        cache.add(owner, 1, frame_image(1));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.byte_count(), 0);
        assert_eq!(cache.max_bytes(), 1000);
    }

    #[rstest]
    #[case::one(1.0, 1 << 30)]
    #[case::half(0.5, 1 << 29)]
    #[case::zero(0.0, 0)]
    #[case::negative(-2.0, 0)]
    fn test_gigabyte_budget(#[case] gigabytes: f64, #[case] expected: u64) {
        let cache = FrameCache::new(0);
        cache.set_max_gigabytes(gigabytes);
        assert_eq!(cache.max_bytes(), expected);
    }

    #[test]
    fn test_owner_keys_are_unique() {
        assert_ne!(OwnerKey::next(), OwnerKey::next());
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(FrameCache::new(1 << 20));
        let owner = OwnerKey::next();
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for f in 0..25 {
                        cache.add(owner, t * 25 + f, frame_image(f as u8));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.byte_count(), 10_000);
    }
}
