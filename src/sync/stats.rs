//! Run counters for the sync status endpoint.
//!
//! Sustained failures only show up as staleness, so the last successful sync per
//! resource kind is kept alongside the counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ResourceKind;

#[derive(Debug, Default)]
pub struct SyncStats {
    slow_ticks: AtomicU64,
    fast_ticks: AtomicU64,
    synced: AtomicU64,
    unchanged: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    skipped: AtomicU64,
    last_success: Mutex<HashMap<ResourceKind, DateTime<Utc>>>,
}

/// Point-in-time copy of [`SyncStats`].
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub slow_ticks: u64,
    pub fast_ticks: u64,
    pub synced: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub skipped: u64,
    pub last_success: HashMap<ResourceKind, DateTime<Utc>>,
}

impl SyncStats {
    pub fn record_slow_tick(&self) {
        self.slow_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fast_tick(&self) {
        self.fast_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// A fetched snapshot was fully persisted.
    pub fn record_synced(&self, kind: ResourceKind) {
        self.synced.fetch_add(1, Ordering::Relaxed);
        self.touch(kind);
    }

    /// Upstream confirmed the stored copy is current, so it counts as fresh too.
    pub fn record_unchanged(&self, kind: ResourceKind) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
        self.touch(kind);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn touch(&self, kind: ResourceKind) {
        self.last_success
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(kind, Utc::now());
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            slow_ticks: self.slow_ticks.load(Ordering::Relaxed),
            fast_ticks: self.fast_ticks.load(Ordering::Relaxed),
            synced: self.synced.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            last_success: self
                .last_success
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
        }
    }
}
