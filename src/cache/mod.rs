//! Cache module for upstream price data
//!
//! [`CacheStore`] keeps the last good record list per source in memory, and
//! [`FallbackPolicy`] decides per request between cached, live, stale and
//! sample data. Stale entries are never expired to empty: when every refresh
//! fails, the last good data keeps being served with `source = "stale_cache"`.

mod policy;
mod store;

pub use policy::{FallbackPolicy, Provenance, Resolution};
pub use store::{CacheEntry, CacheStatus, CacheStore};

#[cfg(test)]
pub(crate) use policy::tests::{FakeFetcher, Script};
