//! A bounded, time-limited memo of extraction results.
//!
//! Entries are keyed by a cheap hash of the image identity (see [`cache_key`]).
//! They expire a fixed time after insertion, which is checked lazily when an entry is read,
//! and the oldest inserted entry is evicted once the cache is over capacity.
//! Reading an entry does not extend its lifetime (FIFO, not LRU).
//!
//! The cache does not coalesce concurrent computations for the same key:
//! two callers missing on the same key both compute, and the last one to finish wins.
//! Results of requests that were superseded by a newer request from the same caller
//! (see [`ResultCache::get_or_compute_for`]) are discarded instead of being inserted.

use crate::{CancellationToken, ExtractionError, ExtractionResult, Result};
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

/// The default maximum number of entries.
pub const DEFAULT_CAPACITY: usize = 50;

/// The default time after which an entry expires.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Derives a cache key from an image identity, such as its source URI.
///
/// This is a 32-bit, order sensitive `hash * 31 + unit` rolling hash over the UTF-16 code units
/// of `identity`, written in base 36. Different identities may collide and then share a cache slot.
#[must_use]
pub fn cache_key(identity: &str) -> String {
    let hash = identity
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)));

    let mut value = hash.unsigned_abs();
    let mut digits = Vec::new();
    loop {
        digits.push(char::from_digit(value % 36, 36).unwrap_or('0'));
        value /= 36;
        if value == 0 {
            break;
        }
    }

    digits.into_iter().rev().collect()
}

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// The system's monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A builder struct to specify the bounds of a [`ResultCache`].
///
/// # Examples
/// ```
/// # use prismatic::CacheOptions;
/// # use std::time::Duration;
/// let options = CacheOptions::new()
///     .capacity(100)
///     .ttl(Duration::from_secs(10 * 60));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// The maximum number of entries.
    capacity: usize,
    /// The time after insertion at which an entry expires.
    ttl: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheOptions {
    /// Creates a new [`CacheOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self { capacity: DEFAULT_CAPACITY, ttl: DEFAULT_TTL }
    }

    /// Sets the maximum number of entries.
    ///
    /// The default capacity is `50`. A capacity of `0` disables caching.
    #[must_use]
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the time after insertion at which an entry expires.
    ///
    /// The default is one hour.
    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A cached result and its insertion time.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// The cached result. It is never modified after insertion.
    result: ExtractionResult,
    /// When the entry was inserted.
    created_at: Instant,
}

/// The cache contents.
#[derive(Debug, Default)]
struct Entries {
    /// The entries by key.
    map: HashMap<String, CacheEntry>,
    /// The keys in insertion order, oldest first.
    order: VecDeque<String>,
}

impl Entries {
    /// Removes the entry for `key`, if any.
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.map.remove(key)?;
        if let Some(i) = self.order.iter().position(|k| k == key) {
            self.order.remove(i);
        }
        Some(entry)
    }
}

/// A thread safe cache of [`ExtractionResult`]s.
///
/// Reads take a shared lock, and computations always run outside of any lock,
/// so a slow extraction never blocks readers of other keys.
#[derive(Debug)]
pub struct ResultCache<C = SystemClock> {
    /// The cached entries.
    entries: RwLock<Entries>,
    /// The token of the newest request of each logical caller.
    callers: Mutex<HashMap<String, CancellationToken>>,
    /// The size and time bounds.
    options: CacheOptions,
    /// The time source for expiry.
    clock: C,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheOptions::new())
    }
}

impl ResultCache {
    /// Creates a new, empty [`ResultCache`] using the system clock.
    #[must_use]
    pub fn new(options: CacheOptions) -> Self {
        Self::with_clock(options, SystemClock)
    }
}

impl<C: Clock> ResultCache<C> {
    /// Creates a new, empty [`ResultCache`] using the given clock.
    #[must_use]
    pub fn with_clock(options: CacheOptions, clock: C) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            callers: Mutex::new(HashMap::new()),
            options,
            clock,
        }
    }

    /// The bounds of this cache.
    #[must_use]
    pub fn options(&self) -> CacheOptions {
        self.options
    }

    /// Whether an entry created at `created_at` is older than the TTL.
    fn is_expired(&self, created_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(created_at) > self.options.ttl
    }

    /// Returns the cached result for `key`, or `None` if it is absent or expired.
    ///
    /// An expired entry is removed.
    pub fn get(&self, key: &str) -> Option<ExtractionResult> {
        let now = self.clock.now();

        {
            let entries = self.entries.read();
            let entry = entries.map.get(key)?;
            if !self.is_expired(entry.created_at, now) {
                debug!("cache hit for {key}");
                return Some(entry.result.clone());
            }
        }

        let mut entries = self.entries.write();
        // the entry may have been replaced since the read lock was released
        if entries
            .map
            .get(key)
            .is_some_and(|entry| self.is_expired(entry.created_at, now))
        {
            debug!("cache entry for {key} expired");
            entries.remove(key);
        }

        None
    }

    /// Inserts a result, replacing any previous entry for `key`.
    ///
    /// A replaced entry counts as newly inserted. If the cache is over capacity afterwards,
    /// the oldest inserted entries are evicted.
    pub fn insert(&self, key: impl Into<String>, result: ExtractionResult) {
        let key = key.into();
        let created_at = self.clock.now();

        let mut entries = self.entries.write();
        entries.remove(&key);
        entries.order.push_back(key.clone());
        entries.map.insert(key, CacheEntry { result, created_at });

        while entries.map.len() > self.options.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            debug!("evicting cache entry {oldest}");
            entries.map.remove(&oldest);
        }
    }

    /// Returns the cached result for `key`, or runs `compute` and caches its result.
    pub fn get_or_compute(
        &self,
        key: &str,
        compute: impl FnOnce() -> ExtractionResult,
    ) -> ExtractionResult {
        if let Some(result) = self.get(key) {
            return result;
        }

        debug!("cache miss for {key}");
        let result = compute();
        self.insert(key, result.clone());
        result
    }

    /// Returns the cached result for `key`, or runs the fallible `compute` and caches a successful result.
    ///
    /// # Errors
    /// Returns the error from `compute`. Errors are not cached.
    pub fn try_get_or_compute(
        &self,
        key: &str,
        compute: impl FnOnce() -> Result<ExtractionResult>,
    ) -> Result<ExtractionResult> {
        if let Some(result) = self.get(key) {
            return Ok(result);
        }

        debug!("cache miss for {key}");
        let result = compute()?;
        self.insert(key, result.clone());
        Ok(result)
    }

    /// Registers a new request for `caller`, cancelling the caller's previous request (if any).
    ///
    /// The returned token is cancelled when a newer request for the same caller begins.
    pub fn begin(&self, caller: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self.callers.lock().insert(caller.to_owned(), token.clone());
        if let Some(previous) = previous {
            debug!("superseding previous request of {caller}");
            previous.cancel();
        }
        token
    }

    /// Unregisters the request with `token` for `caller`, unless a newer request has replaced it.
    fn end(&self, caller: &str, token: &CancellationToken) {
        let mut callers = self.callers.lock();
        if callers.get(caller).is_some_and(|current| current.same_as(token)) {
            callers.remove(caller);
        }
    }

    /// Like [`ResultCache::try_get_or_compute`], but with only one authoritative request per `caller`.
    ///
    /// Starting this call cancels the token of the caller's previous in-flight request.
    /// `compute` receives this request's token and should poll it
    /// (e.g., via [`extract_cancellable`](crate::extract_cancellable)).
    /// A result computed after the token was cancelled is discarded rather than cached.
    ///
    /// # Errors
    /// Returns [`ExtractionError::Cancelled`] if a newer request for `caller` superseded this one,
    /// or the error from `compute`.
    pub fn get_or_compute_for(
        &self,
        caller: &str,
        key: &str,
        compute: impl FnOnce(&CancellationToken) -> Result<ExtractionResult>,
    ) -> Result<ExtractionResult> {
        let token = self.begin(caller);

        if let Some(result) = self.get(key) {
            self.end(caller, &token);
            return Ok(result);
        }

        debug!("cache miss for {key}");
        let result = compute(&token);
        self.end(caller, &token);
        let result = result?;

        if token.is_cancelled() {
            debug!("discarding superseded result for {key}");
            return Err(ExtractionError::Cancelled);
        }

        self.insert(key, result.clone());
        Ok(result)
    }

    /// Removes the entry for `key`.
    pub fn invalidate(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.map.clear();
        entries.order.clear();
    }

    /// The number of entries, including expired entries that have not been read yet.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map.len()
    }

    /// Whether the cache has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
