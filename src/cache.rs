// Fallback caches for the purchase flow
//
// FlightCache keeps the last good quote per (flight, day).
// QuotationCache keeps a bounded window of recent exchange rates.

use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::model::FlightQuote;

pub const DEFAULT_QUOTATION_WINDOW: usize = 10;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub store_count: usize,
}

// Length prefix keeps ("AB12", "3") and ("AB1", "23") apart
pub fn create_cache_key(flight_code: &str, day: &str) -> String {
    format!("{}:{}|{}", flight_code.len(), flight_code, day)
}

#[derive(Default)]
pub struct FlightCache {
    store: DashMap<String, FlightQuote>,
    cache_stats: RwLock<CacheStats>,
}

impl FlightCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, flight_code: &str, day: &str) -> Option<FlightQuote> {
        let key = create_cache_key(flight_code, day);

        // clone out so the shard guard is released before the stats lock
        let found = self.store.get(&key).map(|entry| entry.value().clone());

        let mut stats = self.cache_stats.write();
        if found.is_some() {
            stats.hit_count += 1;
        } else {
            stats.miss_count += 1;
        }

        found
    }

    pub fn put(&self, flight_code: &str, day: &str, quote: FlightQuote) {
        let key = create_cache_key(flight_code, day);
        let is_new = self.store.insert(key, quote).is_none();

        let mut stats = self.cache_stats.write();
        stats.store_count += 1;
        if is_new {
            stats.items_count += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache_stats.read().clone()
    }
}

pub struct QuotationCache {
    window: usize,
    rates: Mutex<VecDeque<f64>>,
}

impl Default for QuotationCache {
    fn default() -> Self {
        Self::with_window(DEFAULT_QUOTATION_WINDOW)
    }
}

impl QuotationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            rates: Mutex::new(VecDeque::with_capacity(window)),
        }
    }

    // Only finite positive rates are kept; returns whether the rate was recorded
    pub fn record(&self, rate: f64) -> bool {
        if !rate.is_finite() || rate <= 0.0 {
            return false;
        }

        // append and trim under one lock so concurrent writers can't overshoot
        let mut rates = self.rates.lock();
        rates.push_back(rate);
        while rates.len() > self.window {
            rates.pop_front();
        }

        true
    }

    // Mean of the retained rates, None when there is nothing to fall back on
    pub fn average(&self) -> Option<f64> {
        let rates = self.rates.lock();
        if rates.is_empty() {
            return None;
        }

        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.rates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.lock().is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn snapshot(&self) -> Vec<f64> {
        self.rates.lock().iter().copied().collect()
    }
}
