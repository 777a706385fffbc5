//! In-memory cache for stats queries.
//!
//! Rollups scan the contacts table, and the dashboard polls them. A short
//! TTL keeps them cheap while a crawl is running.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::repository::{CountryStateCount, DashboardStats, HourlyCount, LabelCount};

/// Default TTL for cached stats.
const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// A cached value with expiration time.
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn get(&self) -> Option<T> {
        if Instant::now() >= self.expires_at {
            None
        } else {
            Some(self.value.clone())
        }
    }
}

type Slot<T> = RwLock<Option<CacheEntry<T>>>;

fn read_slot<T: Clone>(slot: &Slot<T>) -> Option<T> {
    slot.read()
        .ok()
        .and_then(|guard| guard.as_ref().and_then(|e| e.get()))
}

fn write_slot<T: Clone>(slot: &Slot<T>, value: T, ttl: Duration) {
    if let Ok(mut guard) = slot.write() {
        *guard = Some(CacheEntry::new(value, ttl));
    }
}

pub struct StatsCache {
    dashboard: Slot<DashboardStats>,
    states: Slot<Vec<LabelCount>>,
    countries: Slot<Vec<CountryStateCount>>,
    /// Keyed by window length in hours.
    hourly: RwLock<HashMap<u32, CacheEntry<Vec<HourlyCount>>>>,
    ttl: Duration,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            dashboard: RwLock::new(None),
            states: RwLock::new(None),
            countries: RwLock::new(None),
            hourly: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get_dashboard(&self) -> Option<DashboardStats> {
        read_slot(&self.dashboard)
    }

    pub fn set_dashboard(&self, stats: DashboardStats) {
        write_slot(&self.dashboard, stats, self.ttl);
    }

    pub fn get_states(&self) -> Option<Vec<LabelCount>> {
        read_slot(&self.states)
    }

    pub fn set_states(&self, counts: Vec<LabelCount>) {
        write_slot(&self.states, counts, self.ttl);
    }

    pub fn get_countries(&self) -> Option<Vec<CountryStateCount>> {
        read_slot(&self.countries)
    }

    pub fn set_countries(&self, counts: Vec<CountryStateCount>) {
        write_slot(&self.countries, counts, self.ttl);
    }

    pub fn get_hourly(&self, hours: u32) -> Option<Vec<HourlyCount>> {
        self.hourly
            .read()
            .ok()
            .and_then(|guard| guard.get(&hours).and_then(|e| e.get()))
    }

    pub fn set_hourly(&self, hours: u32, counts: Vec<HourlyCount>) {
        if let Ok(mut guard) = self.hourly.write() {
            guard.insert(hours, CacheEntry::new(counts, self.ttl));
        }
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new()
    }
}
