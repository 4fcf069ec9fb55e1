//! Cache Module
//!
//! The provider contract, the expiry policy, and the in-memory backend.

mod expiry;
mod memory;
mod provider;


pub use expiry::{ExpiryPolicy, TimeUnit};
pub use memory::MemoryStash;
pub use provider::CacheProvider;
