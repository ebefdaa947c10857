//! Disabled cache: every read misses, every write is dropped

use super::{CacheEntry, CacheStore};
use crate::error::Result;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct NullCacheStore;

impl CacheStore for NullCacheStore {
    fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _entry: CacheEntry, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    fn invalidate(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn invalidate_all(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "disabled"
    }
}
