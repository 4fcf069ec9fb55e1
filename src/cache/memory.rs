//! Memory Stash Module
//!
//! Process-local backend over an expiring moka cache. No pool, no network.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use moka::future::Cache;
use tracing::debug;

use crate::cache::{CacheProvider, ExpiryPolicy};
use crate::error::{CacheError, Result};

// == Memory Stash ==
/// In-memory cache whose entries live for the configured expiry policy.
///
/// Entries written with `store`, `update` and `retrieve_or_set` all get
/// the same time-to-live, counted from their last write.
#[derive(Clone)]
pub struct MemoryStash<K, T> {
    cache: Cache<K, T>,
    expiry: ExpiryPolicy,
}

impl<K, T> fmt::Debug for MemoryStash<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStash")
            .field("entry_count", &self.cache.entry_count())
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl<K, T> MemoryStash<K, T>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    pub fn new(expiry: ExpiryPolicy) -> Self {
        let ttl = expiry.bounded_duration();
        let cache = Cache::builder().time_to_live(ttl).build();
        debug!(ttl_secs = ttl.as_secs(), "Memory stash created");
        Self { cache, expiry }
    }

    pub fn expiry(&self) -> ExpiryPolicy {
        self.expiry
    }
}

impl<K, T> CacheProvider<K, T> for MemoryStash<K, T>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    async fn retrieve(&self, key: &K) -> Result<Option<T>> {
        Ok(self.cache.get(key).await)
    }

    async fn retrieve_or_set(&self, key: &K, value: T) -> Result<T> {
        let entry = self.cache.entry(key.clone()).or_insert(value).await;
        Ok(entry.into_value())
    }

    async fn retrieve_all(&self) -> Result<HashMap<K, T>> {
        Ok(self
            .cache
            .iter()
            .map(|(key, value)| ((*key).clone(), value))
            .collect())
    }

    async fn store(&self, key: &K, value: T) -> Result<T> {
        self.cache.insert(key.clone(), value.clone()).await;
        Ok(value)
    }

    async fn update(&self, key: &K, value: T) -> Result<T> {
        if !self.cache.contains_key(key) {
            return Err(CacheError::MissingKey(format!("{:?}", key)));
        }

        self.cache.insert(key.clone(), value.clone()).await;
        Ok(value)
    }

    async fn evict(&self, key: &K) -> Result<bool> {
        Ok(self.cache.remove(key).await.is_some())
    }

    async fn evict_value(&self, key: &K, expected: &T) -> Result<bool>
    where
        T: PartialEq,
    {
        match self.cache.get(key).await {
            Some(current) if current == *expected => Ok(self.cache.remove(key).await.is_some()),
            _ => Ok(false),
        }
    }

    async fn evict_if<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&K, &T) -> bool + Send,
    {
        let matched: Vec<K> = self
            .cache
            .iter()
            .filter(|(key, value)| predicate(&**key, value))
            .map(|(key, _)| (*key).clone())
            .collect();

        let mut removed = 0;
        for key in matched {
            if self.cache.remove(&key).await.is_some() {
                removed += 1;
            }
        }

        debug!(removed, "Memory stash evicted matching entries");
        Ok(removed)
    }

    async fn contains(&self, key: &K) -> Result<bool> {
        Ok(self.cache.contains_key(key))
    }

    fn close(&self) {
        self.cache.invalidate_all();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TimeUnit;
    use std::time::Duration;

    fn stash() -> MemoryStash<String, i64> {
        MemoryStash::new(ExpiryPolicy::of(300, TimeUnit::Seconds))
    }

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let stash = stash();

        stash.store(&"a".to_string(), 1).await.unwrap();
        assert_eq!(stash.retrieve(&"a".to_string()).await.unwrap(), Some(1));
        assert_eq!(stash.retrieve(&"b".to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_retrieve_or_else() {
        let stash = stash();

        assert_eq!(stash.retrieve_or_else(&"a".to_string(), 7).await.unwrap(), 7);
        stash.store(&"a".to_string(), 1).await.unwrap();
        assert_eq!(stash.retrieve_or_else(&"a".to_string(), 7).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_or_set_keeps_first_value() {
        let stash = stash();
        let key = "a".to_string();

        assert_eq!(stash.retrieve_or_set(&key, 1).await.unwrap(), 1);
        assert_eq!(stash.retrieve_or_set(&key, 2).await.unwrap(), 1);
        assert_eq!(stash.retrieve(&key).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_update_missing_key_fails() {
        let stash = stash();
        let key = "a".to_string();

        let result = stash.update(&key, 1).await;
        assert!(matches!(result, Err(CacheError::MissingKey(_))));
        assert!(!stash.contains(&key).await.unwrap());

        stash.store(&key, 1).await.unwrap();
        assert_eq!(stash.update(&key, 2).await.unwrap(), 2);
        assert_eq!(stash.retrieve(&key).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_evict() {
        let stash = stash();
        let key = "a".to_string();

        assert!(!stash.evict(&key).await.unwrap());
        stash.store(&key, 1).await.unwrap();
        assert!(stash.evict(&key).await.unwrap());
        assert!(!stash.contains(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_evict_value_requires_match() {
        let stash = stash();
        let key = "a".to_string();
        stash.store(&key, 1).await.unwrap();

        assert!(!stash.evict_value(&key, &2).await.unwrap());
        assert!(stash.contains(&key).await.unwrap());

        assert!(stash.evict_value(&key, &1).await.unwrap());
        assert!(!stash.contains(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_evict_if_removes_only_matches() {
        let stash = stash();
        for (key, value) in [("a", 1), ("b", 2), ("c", 3)] {
            stash.store(&key.to_string(), value).await.unwrap();
        }

        let removed = stash.evict_if(|_, value| value % 2 == 0).await.unwrap();

        assert_eq!(removed, 1);
        assert!(stash.contains(&"a".to_string()).await.unwrap());
        assert!(!stash.contains(&"b".to_string()).await.unwrap());
        assert!(stash.contains(&"c".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn test_evict_all_and_retrieve_all() {
        let stash = stash();
        for (key, value) in [("a", 1), ("b", 2)] {
            stash.store(&key.to_string(), value).await.unwrap();
        }

        let all = stash.retrieve_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("b"), Some(&2));

        assert_eq!(stash.evict_all().await.unwrap(), 2);
        assert!(stash.retrieve_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let stash: MemoryStash<String, i64> =
            MemoryStash::new(ExpiryPolicy::of(200, TimeUnit::Milliseconds));
        let key = "a".to_string();

        stash.store(&key, 1).await.unwrap();
        assert_eq!(stash.retrieve(&key).await.unwrap(), Some(1));

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(stash.retrieve(&key).await.unwrap(), None);
        assert!(!stash.contains(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_huge_expiry_is_accepted() {
        let stash: MemoryStash<String, i64> =
            MemoryStash::new(ExpiryPolicy::of(u64::MAX, TimeUnit::Days));
        let key = "a".to_string();

        stash.store(&key, 1).await.unwrap();
        assert_eq!(stash.retrieve(&key).await.unwrap(), Some(1));
    }
}
