//! Time-bounded caches for loaded data.
//!
//! [`TtlCache`] keeps values in memory for the lifetime of an [`crate::Epidyn`] handle.
//! [`DiskCache`] keeps raw downloads between short lived processes. Both are invalidated purely by
//! age: an entry is served until its time to live has elapsed and is then refetched.

use std::{
    collections::HashMap,
    hash::Hash,
    path::{Path, PathBuf},
    time::{Duration, Instant, SystemTime},
};

use log::{debug, warn};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// In-memory cache with a fixed time to live per entry.
///
/// Callers pass the current instant so that expiry can be tested without waiting on the clock.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, Entry<V>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns the cached value for `key` if it has not yet expired at `now`.
    pub fn get(&self, key: &K, now: Instant) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&mut self, key: K, value: V, now: Instant) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Drops every entry that has expired at `now`.
    pub fn evict_expired(&mut self, now: Instant) {
        self.entries.retain(|_, entry| now < entry.expires_at);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache of raw downloaded bytes in a directory, one file per source.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
}

impl DiskCache {
    pub fn new<P: AsRef<Path>>(dir: P, ttl: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ttl,
        }
    }

    /// File name derived from the source. Bytes other than ASCII letters, digits, `.` and `-` are
    /// escaped as `_xx`, so distinct sources never share a file.
    fn path_for(&self, source: &str) -> PathBuf {
        let mut file_name = String::with_capacity(source.len());
        for byte in source.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'-' {
                file_name.push(byte as char);
            } else {
                file_name.push_str(&format!("_{byte:02x}"));
            }
        }
        self.dir.join(file_name)
    }

    /// Reads cached bytes for `source` if the file is younger than the time to live. Any failure
    /// to read is treated as a miss.
    pub async fn read(&self, source: &str, now: SystemTime) -> Option<Vec<u8>> {
        let path = self.path_for(source);
        let modified = tokio::fs::metadata(&path).await.ok()?.modified().ok()?;
        let age = now.duration_since(modified).unwrap_or_default();
        if age >= self.ttl {
            debug!("Cache file {path:?} is stale ({age:?} old)");
            return None;
        }
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("Serving {source} from cache file {path:?}");
                Some(bytes)
            }
            Err(e) => {
                warn!("Failed to read cache file {path:?}: {e}");
                None
            }
        }
    }

    /// Writes bytes for `source`. Failing to write the cache is not fatal to the caller.
    pub async fn write(&self, source: &str, bytes: &[u8]) {
        let path = self.path_for(source);
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!("Failed to create cache directory {:?}: {e}", self.dir);
            return;
        }
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            warn!("Failed to write cache file {path:?}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_should_be_served_until_ttl_elapses() {
        let start = Instant::now();
        let mut cache = TtlCache::new(Duration::from_secs(3600));
        assert_eq!(cache.get(&"us-counties", start), None);

        cache.insert("us-counties", 1, start);
        assert_eq!(cache.get(&"us-counties", start), Some(1));
        assert_eq!(
            cache.get(&"us-counties", start + Duration::from_secs(3599)),
            Some(1)
        );
        assert_eq!(
            cache.get(&"us-counties", start + Duration::from_secs(3600)),
            None,
            "entry should expire once the ttl has elapsed"
        );
    }

    #[test]
    fn reinsert_should_restart_the_ttl() {
        let start = Instant::now();
        let later = start + Duration::from_secs(50);
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("key", "old", start);
        cache.insert("key", "new", later);
        assert_eq!(
            cache.get(&"key", start + Duration::from_secs(100)),
            Some("new")
        );
    }

    #[test]
    fn evict_should_drop_expired_entries_only() {
        let start = Instant::now();
        let mut cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("a", 1, start);
        cache.insert("b", 2, start + Duration::from_secs(5));
        cache.evict_expired(start + Duration::from_secs(12));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"b", start + Duration::from_secs(12)), Some(2));
    }

    #[test]
    fn distinct_sources_should_not_share_a_cache_file() {
        let disk_cache = DiskCache::new("/tmp/epidyn", Duration::from_secs(3600));
        assert_ne!(
            disk_cache.path_for("https://example.com/a/b.csv"),
            disk_cache.path_for("https://example.com/a_b.csv")
        );
        assert_ne!(
            disk_cache.path_for("https://example.com/a_2fb.csv"),
            disk_cache.path_for("https://example.com/a/b.csv")
        );
        assert_eq!(
            disk_cache.path_for("http://x.org/us-states.csv"),
            PathBuf::from("/tmp/epidyn/http_3a_2f_2fx.org_2fus-states.csv")
        );
    }

    #[tokio::test]
    async fn disk_cache_should_respect_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60));
        let source = "https://example.com/us-states.csv";
        assert!(cache.read(source, SystemTime::now()).await.is_none());

        cache.write(source, b"date,state\n").await;
        assert_eq!(
            cache.read(source, SystemTime::now()).await.as_deref(),
            Some(&b"date,state\n"[..])
        );
        let later = SystemTime::now() + Duration::from_secs(120);
        assert!(
            cache.read(source, later).await.is_none(),
            "stale files should be ignored"
        );
    }
}
