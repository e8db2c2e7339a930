//! Thread-safe map from local cache path to the set of byte ranges currently
//! populated on disk for that path.
//!
//! One mutex covers the whole map; every operation here is brief (no I/O),
//! so it sits at the bottom of the lock-ordering chain in the spec's
//! concurrency model (acquired briefly, never held across disk or network
//! calls).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::interval::{Interval, Intervals};

#[derive(Default)]
pub struct CacheTracker {
    inner: Mutex<HashMap<PathBuf, Intervals>>,
}

impl CacheTracker {
    pub fn new() -> Self {
        CacheTracker {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Records `iv` as now present on disk for `path`.
    pub fn cached(&self, path: &Path, iv: Interval) {
        let mut map = self.inner.lock().unwrap();
        map.entry(path.to_path_buf()).or_default().merge(iv);
    }

    /// Returns the sub-intervals of `iv` not yet recorded as present for `path`.
    pub fn uncached(&self, path: &Path, iv: Interval) -> Vec<Interval> {
        let map = self.inner.lock().unwrap();
        match map.get(path) {
            Some(intervals) => intervals.difference(iv),
            None => {
                if iv.is_empty() {
                    Vec::new()
                } else {
                    vec![iv]
                }
            }
        }
    }

    /// Drops or clips every recorded interval for `path` past `off`.
    pub fn cache_truncate(&self, path: &Path, off: i64) {
        let mut map = self.inner.lock().unwrap();
        if let Some(intervals) = map.get_mut(path) {
            intervals.truncate(off);
        }
    }

    /// Replaces the recorded set for `path` with exactly `iv`.
    pub fn cache_override(&self, path: &Path, iv: Interval) {
        let mut map = self.inner.lock().unwrap();
        map.entry(path.to_path_buf()).or_default().override_with(iv);
    }

    /// Atomically moves the interval set from `old` to `new`.
    pub fn cache_rename(&self, old: &Path, new: &Path) {
        let mut map = self.inner.lock().unwrap();
        if let Some(intervals) = map.remove(old) {
            map.insert(new.to_path_buf(), intervals);
        } else {
            map.remove(new);
        }
    }

    /// Drops the recorded set for `path` entirely.
    pub fn cache_delete(&self, path: &Path) {
        let mut map = self.inner.lock().unwrap();
        map.remove(path);
    }

    /// Drops every recorded set (called at unmount).
    pub fn cache_wipe(&self) {
        let mut map = self.inner.lock().unwrap();
        map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncached_on_unknown_path_is_the_whole_probe() {
        let tracker = CacheTracker::new();
        let path = Path::new("/cache/a");
        assert_eq!(
            tracker.uncached(path, Interval::new(0, 100)),
            vec![Interval::new(0, 100)]
        );
    }

    #[test]
    fn cached_then_uncached_reports_only_gaps() {
        let tracker = CacheTracker::new();
        let path = Path::new("/cache/a");
        tracker.cached(path, Interval::new(512, 1536));
        assert_eq!(
            tracker.uncached(path, Interval::new(0, 2048)),
            vec![Interval::new(0, 512), Interval::new(1536, 2048)]
        );
        tracker.cached(path, Interval::new(0, 512));
        tracker.cached(path, Interval::new(1536, 2048));
        assert!(tracker.uncached(path, Interval::new(0, 2048)).is_empty());
    }

    #[test]
    fn rename_moves_the_set_and_delete_drops_it() {
        let tracker = CacheTracker::new();
        let old = Path::new("/cache/old");
        let new = Path::new("/cache/new");
        tracker.cached(old, Interval::new(0, 10));
        tracker.cache_rename(old, new);
        assert!(tracker.uncached(old, Interval::new(0, 10)) == vec![Interval::new(0, 10)]);
        assert!(tracker.uncached(new, Interval::new(0, 10)).is_empty());

        tracker.cache_delete(new);
        assert_eq!(
            tracker.uncached(new, Interval::new(0, 10)),
            vec![Interval::new(0, 10)]
        );
    }

    #[test]
    fn truncate_bounds_future_uncached_queries() {
        let tracker = CacheTracker::new();
        let path = Path::new("/cache/a");
        tracker.cached(path, Interval::new(0, 100));
        tracker.cache_truncate(path, 50);
        assert_eq!(
            tracker.uncached(path, Interval::new(0, 100)),
            vec![Interval::new(50, 100)]
        );
    }

    #[test]
    fn wipe_clears_every_path() {
        let tracker = CacheTracker::new();
        tracker.cached(Path::new("/a"), Interval::new(0, 10));
        tracker.cached(Path::new("/b"), Interval::new(0, 10));
        tracker.cache_wipe();
        assert_eq!(
            tracker.uncached(Path::new("/a"), Interval::new(0, 10)),
            vec![Interval::new(0, 10)]
        );
    }
}
