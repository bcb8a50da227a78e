pub mod client;
pub mod memory;
pub mod scope_cache;
pub mod valkey;

pub use client::{CacheClient, CacheError, CacheResult};
pub use memory::MemoryCacheClient;
pub use scope_cache::{CachedScopes, ScopeCache};
pub use valkey::ValkeyClient;
