//! Cycle-scoped status cache.
//!
//! Every frame task asks whether its parent footage is ready before doing
//! any work; answering that from discovery results instead of the store
//! turns O(frames) parent lookups per cycle into O(unique parents) at most.
//! Entries are value copies rebuilt each cycle; the cache never holds a
//! handle into the scheduler's state.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::debug;

use mlog_models::{Footage, FootageStatus, Frame, FrameStatus};

/// Cached footage status.
#[derive(Debug, Clone)]
pub struct FootageEntry {
    pub status: FootageStatus,
    pub record_key: String,
    pub fields: Map<String, Value>,
    pub loaded_at: Instant,
}

/// Cached frame status.
#[derive(Debug, Clone)]
pub struct FrameEntry {
    pub status: FrameStatus,
    pub record_key: String,
    pub parent_id: Option<String>,
    pub loaded_at: Instant,
}

/// Answer of a parent-readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentCheck {
    /// No fresh entry; the caller defers and the miss is batched later.
    Miss,
    /// Parent finished the whole workflow: stop processing the frame.
    TerminalSuccess(FootageStatus),
    /// Parent is in the ready set; the frame may advance.
    Ready(FootageStatus),
    /// Parent has not progressed far enough yet.
    NotReady(FootageStatus),
}

/// Cache performance counters, reported in cycle and session summaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub api_calls_saved: u64,
    pub footage_cached: usize,
    pub frames_cached: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Inner {
    footage: HashMap<String, FootageEntry>,
    frames: HashMap<String, FrameEntry>,
    /// parent footage id -> child frame ids, built during frame inserts
    children: HashMap<String, HashSet<String>>,
    hits: u64,
    misses: u64,
    api_calls_saved: u64,
}

/// Thread-safe status cache. Mutation is infrequent and cycle-scoped, so a
/// single coarse lock is enough; no method holds it across an await point.
pub struct StatusCache {
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Seed footage entries from discovery (or batch-check) results.
    pub fn bulk_insert_footage(&self, records: &[Footage]) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        for footage in records {
            inner.footage.insert(
                footage.id.clone(),
                FootageEntry {
                    status: footage.status,
                    record_key: footage.record_key.clone(),
                    fields: footage.extras.clone(),
                    loaded_at: now,
                },
            );
        }
        if !records.is_empty() {
            debug!(count = records.len(), "Status cache: added footage records");
        }
    }

    /// Seed frame entries and maintain the parent-child index.
    pub fn bulk_insert_frames(&self, records: &[Frame]) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        for frame in records {
            if let Some(parent_id) = &frame.parent_id {
                inner
                    .children
                    .entry(parent_id.clone())
                    .or_default()
                    .insert(frame.id.clone());
            }
            inner.frames.insert(
                frame.id.clone(),
                FrameEntry {
                    status: frame.status,
                    record_key: frame.record_key.clone(),
                    parent_id: frame.parent_id.clone(),
                    loaded_at: now,
                },
            );
        }
        if !records.is_empty() {
            debug!(count = records.len(), "Status cache: added frame records");
        }
    }

    /// Fresh footage entry, or `None` (counted as a miss) when absent or
    /// older than the TTL.
    pub fn get_footage_status(&self, footage_id: &str) -> Option<FootageEntry> {
        let mut inner = self.inner.lock().unwrap();
        let fresh = match inner.footage.get(footage_id) {
            Some(entry) if entry.loaded_at.elapsed() <= self.ttl => Some(entry.clone()),
            _ => None,
        };
        match fresh {
            Some(entry) => {
                inner.hits += 1;
                Some(entry)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Parent-readiness probe for frame gating.
    pub fn parent_check(&self, parent_id: &str) -> ParentCheck {
        match self.get_footage_status(parent_id) {
            None => ParentCheck::Miss,
            Some(entry) if entry.status.frames_are_done() => {
                ParentCheck::TerminalSuccess(entry.status)
            }
            Some(entry) if entry.status.frames_may_advance() => ParentCheck::Ready(entry.status),
            Some(entry) => ParentCheck::NotReady(entry.status),
        }
    }

    /// Parent ids referenced by cached frames whose footage entry is absent
    /// or stale. These misses are resolved with one OR find, not one call
    /// per frame.
    pub fn unique_parents_needing_check(&self) -> BTreeSet<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .frames
            .values()
            .filter_map(|frame| frame.parent_id.as_deref())
            .filter(|parent_id| match inner.footage.get(*parent_id) {
                Some(entry) => entry.loaded_at.elapsed() > self.ttl,
                None => true,
            })
            .map(str::to_owned)
            .collect()
    }

    /// Record store calls avoided by batching (`|ids| - 1` per batch).
    pub fn add_api_calls_saved(&self, saved: u64) {
        self.inner.lock().unwrap().api_calls_saved += saved;
    }

    /// Drop entries older than the TTL. Called at the top of each cycle.
    pub fn clear_expired(&self) {
        let ttl = self.ttl;
        let mut inner = self.inner.lock().unwrap();
        inner.footage.retain(|_, entry| entry.loaded_at.elapsed() <= ttl);

        let mut expired_frames: Vec<(String, Option<String>)> = Vec::new();
        inner.frames.retain(|id, entry| {
            let keep = entry.loaded_at.elapsed() <= ttl;
            if !keep {
                expired_frames.push((id.clone(), entry.parent_id.clone()));
            }
            keep
        });
        for (frame_id, parent_id) in expired_frames {
            if let Some(parent_id) = parent_id {
                if let Some(children) = inner.children.get_mut(&parent_id) {
                    children.remove(&frame_id);
                    if children.is_empty() {
                        inner.children.remove(&parent_id);
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            api_calls_saved: inner.api_calls_saved,
            footage_cached: inner.footage.len(),
            frames_cached: inner.frames.len(),
        }
    }
}
