//! Cache Provider Contract
//!
//! The operations every stash backend offers to application code.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use crate::error::Result;

/// Typed key-value cache operations shared by all backends.
///
/// All operations are async. Not-found conditions are reported through
/// `None`/`false`, connectivity and capacity problems through `Err`.
pub trait CacheProvider<K, T>: Send + Sync
where
    K: Eq + Hash + Send + Sync,
    T: Send + Sync,
{
    /// Returns the element stored under `key`, if any.
    fn retrieve(&self, key: &K) -> impl Future<Output = Result<Option<T>>> + Send;

    /// Returns the element stored under `key`, or `fallback` if there is none.
    fn retrieve_or_else(&self, key: &K, fallback: T) -> impl Future<Output = Result<T>> + Send {
        async move { Ok(self.retrieve(key).await?.unwrap_or(fallback)) }
    }

    /// Returns the element stored under `key`; if there is none, stores
    /// `value` under the key and returns it.
    fn retrieve_or_set(&self, key: &K, value: T) -> impl Future<Output = Result<T>> + Send;

    /// Returns every element currently held by this cache.
    fn retrieve_all(&self) -> impl Future<Output = Result<HashMap<K, T>>> + Send;

    /// Stores (or replaces) the element under `key` and returns it.
    fn store(&self, key: &K, value: T) -> impl Future<Output = Result<T>> + Send;

    /// Replaces the element under `key`.
    ///
    /// Fails with [`crate::CacheError::MissingKey`] when no element exists,
    /// in which case nothing is written.
    fn update(&self, key: &K, value: T) -> impl Future<Output = Result<T>> + Send;

    /// Removes the element under `key`. Returns whether one was removed.
    fn evict(&self, key: &K) -> impl Future<Output = Result<bool>> + Send;

    /// Removes the element under `key` only if it equals `expected`.
    fn evict_value(&self, key: &K, expected: &T) -> impl Future<Output = Result<bool>> + Send
    where
        T: PartialEq;

    /// Removes every element matching `predicate`. Returns the number removed.
    ///
    /// The predicate runs over a snapshot; elements written concurrently
    /// with the snapshot may or may not be considered.
    fn evict_if<F>(&self, predicate: F) -> impl Future<Output = Result<usize>> + Send
    where
        F: Fn(&K, &T) -> bool + Send;

    /// Removes every element. Returns the number removed.
    fn evict_all(&self) -> impl Future<Output = Result<usize>> + Send {
        self.evict_if(|_, _| true)
    }

    /// Returns whether an element is stored under `key`.
    fn contains(&self, key: &K) -> impl Future<Output = Result<bool>> + Send;

    /// Releases the resources held by this provider.
    fn close(&self);
}
