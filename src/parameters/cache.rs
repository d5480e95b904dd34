//! Bounded per-year cache in front of a parameter provider
//!
//! Parameter lookups can be expensive (file reads, an external rules engine)
//! but never change within a process, so each year is fetched once and kept
//! until it becomes the least recently used entry of a full cache.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use log::{debug, warn};
use serde::Serialize;

use super::{TaxParameterProvider, TaxParameters};
use crate::error::Result;

/// Default number of years kept in memory
pub const DEFAULT_CACHE_CAPACITY: usize = 10;

/// Counters reported by [`CachedParameters::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<i32, TaxParameters>,
    /// Years from least to most recently used
    order: VecDeque<i32>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn touch(&mut self, year: i32) {
        if let Some(pos) = self.order.iter().position(|&y| y == year) {
            self.order.remove(pos);
        }
        self.order.push_back(year);
    }
}

/// LRU cache keyed by tax year
///
/// Failed lookups are passed through and never cached.
#[derive(Debug)]
pub struct CachedParameters<P> {
    inner: P,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl<P: TaxParameterProvider> CachedParameters<P> {
    /// Cache with the default capacity
    pub fn new(inner: P) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    /// Cache holding at most `capacity` years (minimum 1)
    pub fn with_capacity(inner: P, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Wrapped provider
    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        // The state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    /// Drop all cached years and reset counters
    pub fn clear(&self) {
        let mut state = self.lock();
        *state = CacheState::default();
    }
}

impl<P: TaxParameterProvider> TaxParameterProvider for CachedParameters<P> {
    fn get(&self, year: i32) -> Result<TaxParameters> {
        {
            let mut state = self.lock();
            if let Some(params) = state.entries.get(&year).cloned() {
                state.hits += 1;
                state.touch(year);
                return Ok(params);
            }
            state.misses += 1;
        }

        // Fetch without holding the lock
        debug!("parameter cache miss for {}", year);
        let params = self.inner.get(year)?;

        let mut state = self.lock();
        if !state.entries.contains_key(&year) && state.entries.len() >= self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
                state.evictions += 1;
                warn!("parameter cache full ({} years), evicted {}", self.capacity, oldest);
            }
        }
        state.entries.insert(year, params.clone());
        state.touch(year);

        Ok(params)
    }
}
