//! Concurrent containers used by the jitter buffer

pub mod multimap;

pub use multimap::{ConcurrentMultiMap, ValueList, ValueListGuard};
