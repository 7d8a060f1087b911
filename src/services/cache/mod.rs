pub mod client;
pub mod keys;
pub mod memory;
pub mod region;
pub mod valkey;

pub use client::{CacheClient, CacheError};
pub use keys::InvalidationSet;
pub use memory::MemoryClient;
pub use region::{CacheRegion, CacheRegistry, RegionConfig};
pub use valkey::ValkeyClient;
