//! Type Adapter Module
//!
//! Pure conversions between stored strings and application values.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};

/// Decodes a stored string into a value.
pub type ResultAdapter<T> = TypeAdapter<str, T>;
/// Encodes a value into a storable string.
pub type ValueAdapter<T> = TypeAdapter<T, String>;

// == Type Adapter ==
/// A one-directional, stateless conversion from `P` to `R`.
///
/// Cloning is cheap; clones share the same function.
pub struct TypeAdapter<P: ?Sized, R> {
    converter: Arc<dyn Fn(&P) -> Result<R> + Send + Sync>,
}

impl<P: ?Sized, R> TypeAdapter<P, R> {
    // == Constructors ==
    pub fn new<F>(converter: F) -> Self
    where
        F: Fn(&P) -> Result<R> + Send + Sync + 'static,
    {
        Self {
            converter: Arc::new(converter),
        }
    }

    /// Wraps a conversion that cannot fail.
    pub fn infallible<F>(converter: F) -> Self
    where
        F: Fn(&P) -> R + Send + Sync + 'static,
    {
        Self::new(move |provided| Ok(converter(provided)))
    }

    // == Adapt ==
    pub fn adapt(&self, provided: &P) -> Result<R> {
        (self.converter)(provided)
    }
}

impl<P: ?Sized, R> Clone for TypeAdapter<P, R> {
    fn clone(&self) -> Self {
        Self {
            converter: self.converter.clone(),
        }
    }
}

impl<P: ?Sized, R> fmt::Debug for TypeAdapter<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeAdapter").finish_non_exhaustive()
    }
}

impl<T> TypeAdapter<str, T> {
    /// Decodes JSON text with serde.
    pub fn json_decoder() -> Self
    where
        T: DeserializeOwned,
    {
        Self::new(|json| Ok(serde_json::from_str(json)?))
    }

    /// Decodes with the value's `FromStr` implementation.
    pub fn parsed() -> Self
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Self::new(|text: &str| {
            text.parse()
                .map_err(|e: T::Err| CacheError::Serialization(e.to_string()))
        })
    }
}

impl<T> TypeAdapter<T, String> {
    /// Encodes as JSON text with serde.
    pub fn json_encoder() -> Self
    where
        T: Serialize,
    {
        Self::new(|value| Ok(serde_json::to_string(value)?))
    }

    /// Encodes with the value's `Display` implementation.
    pub fn displayed() -> Self
    where
        T: fmt::Display,
    {
        Self::infallible(|value: &T| value.to_string())
    }
}
