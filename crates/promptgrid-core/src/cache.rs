use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

use crate::providers::ProviderResponse;

/// Response cache shared by the providers of one evaluation run.
///
/// Only successful responses are stored. Once disabled, lookups miss and
/// inserts are dropped.
#[derive(Debug)]
pub struct ResponseCache {
    enabled: AtomicBool,
    entries: DashMap<String, ProviderResponse>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            entries: DashMap::new(),
        }
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.entries.clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<ProviderResponse> {
        if !self.is_enabled() {
            return None;
        }
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, key: String, response: &ProviderResponse) {
        if self.is_enabled() && !response.is_error() {
            self.entries.insert(key, response.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
