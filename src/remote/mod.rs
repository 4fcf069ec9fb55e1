//! Redis Backend Module
//!
//! Keyspace and serialization layer plus the Redis-backed cache provider.

mod adapter;
mod connection;
mod keyspace;
mod stash;

pub use adapter::{ResultAdapter, TypeAdapter, ValueAdapter};
pub use connection::{connect, RedisConnection, RedisPool};
pub use keyspace::Keyspace;
pub use stash::RedisStash;
