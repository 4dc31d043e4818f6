//! Bounded LRU of parsed source units (`spec.md` §3 "LRU cache key", §4.4).
//!
//! One instance lives per compilation process — the main process and each
//! worker own theirs. Not safe for concurrent mutation; a worker's event
//! loop is the only thing ever touching its cache.

use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;
use std::num::NonZeroUsize;

/// Enumerates the language levels a source unit may be parsed against.
/// `Latest` is the fallback for any enumerant the transpiler doesn't
/// explicitly recognize — see `spec.md` §9's second Open Question and
/// `SPEC_FULL.md` §K.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageVersion {
    Es2020,
    Es2022,
    EsNext,
    Latest,
}

/// A parsed source unit, shared (not cloned) between cache and consumers.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub content: Arc<str>,
    pub language_version: LanguageVersion,
}

pub type CacheKey = (PathBuf, LanguageVersion);

/// Bounded LRU keyed by `(absolute_path, language_version)` so that parsing
/// the same path under two different language versions never collides
/// (`spec.md` §3).
#[derive(Debug)]
pub struct SourceFileCache {
    inner: LruCache<CacheKey, Arc<SourceUnit>>,
    hits: u64,
    misses: u64,
}

impl SourceFileCache {
    pub fn new(max_size: usize) -> Self {
        let cap = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self { inner: LruCache::new(cap), hits: 0, misses: 0 }
    }

    /// Looks up `key`, promoting it to most-recently-used on a hit.
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<SourceUnit>> {
        match self.inner.get(key) {
            Some(v) => {
                self.hits += 1;
                Some(v.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts `unit`, evicting the least-recently-used entry first if the
    /// cache is at capacity and `key` is new.
    pub fn set(&mut self, key: CacheKey, unit: Arc<SourceUnit>) {
        self.inner.put(key, unit);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(path: &str, content: &str) -> Arc<SourceUnit> {
        Arc::new(SourceUnit {
            path: PathBuf::from(path),
            content: Arc::from(content),
            language_version: LanguageVersion::EsNext,
        })
    }

    #[test]
    fn evicts_least_recently_used_at_capacity() {
        let mut cache = SourceFileCache::new(2);
        let key_a = (PathBuf::from("a.ts"), LanguageVersion::EsNext);
        let key_b = (PathBuf::from("b.ts"), LanguageVersion::EsNext);
        let key_c = (PathBuf::from("c.ts"), LanguageVersion::EsNext);

        cache.set(key_a.clone(), unit("a.ts", "a"));
        cache.set(key_b.clone(), unit("b.ts", "b"));
        // touch `a` so `b` becomes LRU
        assert!(cache.get(&key_a).is_some());
        cache.set(key_c.clone(), unit("c.ts", "c"));

        assert!(cache.get(&key_b).is_none(), "b should have been evicted");
        assert!(cache.get(&key_a).is_some());
        assert!(cache.get(&key_c).is_some());
    }

    #[test]
    fn same_path_different_language_version_does_not_collide() {
        let mut cache = SourceFileCache::new(4);
        let es2020 = (PathBuf::from("a.ts"), LanguageVersion::Es2020);
        let esnext = (PathBuf::from("a.ts"), LanguageVersion::EsNext);

        cache.set(es2020.clone(), unit("a.ts", "es2020-parse"));
        cache.set(esnext.clone(), unit("a.ts", "esnext-parse"));

        assert_eq!(cache.get(&es2020).unwrap().content.as_ref(), "es2020-parse");
        assert_eq!(cache.get(&esnext).unwrap().content.as_ref(), "esnext-parse");
    }

    #[test]
    fn tracks_hit_and_miss_counts() {
        let mut cache = SourceFileCache::new(2);
        let key = (PathBuf::from("a.ts"), LanguageVersion::EsNext);
        assert!(cache.get(&key).is_none());
        cache.set(key.clone(), unit("a.ts", "a"));
        assert!(cache.get(&key).is_some());
        assert_eq!(cache.stats(), (1, 1));
    }
}
