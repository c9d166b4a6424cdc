//! Session-scoped review cache
//!
//! Keyed by (file path, content fingerprint). A changed file simply gets a
//! new fingerprint; stale entries are never matched and die with the session.

use crate::review::CanonicalReview;
use crate::util::{hash_str, lock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: PathBuf,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(path: &Path, content: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            fingerprint: hash_str(content),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReviewCache {
    entries: Mutex<HashMap<CacheKey, CanonicalReview>>,
}

impl ReviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Never held across an await
    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, CanonicalReview>> {
        lock(&self.entries)
    }

    pub fn get(&self, key: &CacheKey) -> Option<CanonicalReview> {
        self.entries().get(key).cloned()
    }

    /// Store a review unless one is already there; returns the entry that
    /// ends up cached, so two pipelines racing on one key agree on it.
    pub fn store(&self, key: CacheKey, review: CanonicalReview) -> CanonicalReview {
        self.entries().entry(key).or_insert(review).clone()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(score: u8) -> CanonicalReview {
        let mut review = CanonicalReview::minimal("{}");
        review.score = score;
        review
    }

    #[test]
    fn test_key_tracks_content() {
        let path = Path::new("src/lib.rs");
        assert_eq!(CacheKey::new(path, "fn a() {}"), CacheKey::new(path, "fn a() {}"));
        assert_ne!(CacheKey::new(path, "fn a() {}"), CacheKey::new(path, "fn b() {}"));
        assert_ne!(
            CacheKey::new(path, "fn a() {}"),
            CacheKey::new(Path::new("src/other.rs"), "fn a() {}")
        );
    }

    #[test]
    fn test_first_store_wins() {
        let cache = ReviewCache::new();
        let key = CacheKey::new(Path::new("a.rs"), "x");
        assert!(cache.get(&key).is_none());

        assert_eq!(cache.store(key.clone(), review(7)).score, 7);
        assert_eq!(cache.store(key.clone(), review(2)).score, 7);
        assert_eq!(cache.get(&key).map(|r| r.score), Some(7));
        assert_eq!(cache.len(), 1);
    }
}
