//! Similarity-aware response cache.
//!
//! Lookups try the exact key first (SHA-256 over the normalized prompt,
//! model and sampling parameters), then fall back to a token-set Jaccard
//! scan over live entries for the same model. Entries expire by TTL and the
//! store is size-bounded by a ranked eviction pass.
//!
//! The fuzzy lookup is a linear scan per call. That is fine at the intended
//! size (~1000 entries, pre-filtered by model); growing past that would call
//! for bucketing by a coarse prompt hash.

mod key;
mod store;
mod types;

pub use key::{cache_key, jaccard, normalize, token_set};
pub use store::ResponseCache;
pub use types::{CacheConfig, CacheEntry, CacheStats, CachedResponse, Complexity};

#[cfg(test)]
mod tests;
