//! Keyspace Module
//!
//! Maps typed application keys onto namespaced Redis keys and back.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::error::{CacheError, Result};

// == Keyspace ==
/// Namespace for one cache in a shared Redis database.
///
/// A remote key is `prefix + delimiter + encode(key)`. The encoder and
/// decoder must round-trip: `decode(&encode(k)) == k` for every key.
pub struct Keyspace<K> {
    prefix: String,
    delimiter: String,
    encode: Arc<dyn Fn(&K) -> String + Send + Sync>,
    decode: Arc<dyn Fn(&str) -> Result<K> + Send + Sync>,
}

impl<K> Keyspace<K> {
    // == Constructors ==
    /// Creates a keyspace under `prefix`, using the connection's delimiter.
    pub fn new<E, D>(prefix: impl Into<String>, connection: &ConnectionConfig, encode: E, decode: D) -> Self
    where
        E: Fn(&K) -> String + Send + Sync + 'static,
        D: Fn(&str) -> Result<K> + Send + Sync + 'static,
    {
        Self {
            prefix: prefix.into(),
            delimiter: connection.delimiter.clone(),
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    /// Creates a keyspace whose keys are written with `Display` and read with `FromStr`.
    pub fn display(prefix: impl Into<String>, connection: &ConnectionConfig) -> Self
    where
        K: fmt::Display + FromStr,
        K::Err: fmt::Display,
    {
        Self::new(
            prefix,
            connection,
            |key: &K| key.to_string(),
            |text: &str| {
                text.parse()
                    .map_err(|e: K::Err| CacheError::Serialization(e.to_string()))
            },
        )
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    // == Key Codec ==
    pub fn encode_key(&self, key: &K) -> String {
        (self.encode)(key)
    }

    pub fn decode_key(&self, encoded: &str) -> Result<K> {
        (self.decode)(encoded)
    }

    // == Construct ==
    /// Returns the remote key for `key`.
    pub fn construct(&self, key: &K) -> String {
        format!("{}{}{}", self.prefix, self.delimiter, self.encode_key(key))
    }

    // == From Remote ==
    /// Recovers the application key from a remote key built by [`construct`](Self::construct).
    ///
    /// Fails with `ForeignKey` when `remote` does not start with this
    /// keyspace's `prefix + delimiter`.
    pub fn from_remote(&self, remote: &str) -> Result<K> {
        let encoded = remote
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(self.delimiter.as_str()))
            .ok_or_else(|| CacheError::ForeignKey(remote.to_string()))?;

        self.decode_key(encoded)
    }

    // == Select All ==
    /// Glob pattern matching every key of this keyspace.
    ///
    /// Glob metacharacters in the prefix or delimiter are escaped.
    pub fn select_all(&self) -> String {
        format!(
            "{}{}*",
            escape_glob(&self.prefix),
            escape_glob(&self.delimiter)
        )
    }
}

impl<K> Clone for Keyspace<K> {
    fn clone(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            delimiter: self.delimiter.clone(),
            encode: self.encode.clone(),
            decode: self.decode.clone(),
        }
    }
}

impl<K> fmt::Debug for Keyspace<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyspace")
            .field("prefix", &self.prefix)
            .field("delimiter", &self.delimiter)
            .finish_non_exhaustive()
    }
}

fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
