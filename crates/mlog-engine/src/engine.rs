//! The polling engine: discovery, dispatch, reconciliation, quiescence.
//!
//! One cycle queries the store for every processing status, seeds the
//! status cache, materializes a task per non-terminal record and hands the
//! tasks to a small worker pool. Each task advances its record through as
//! many consecutive steps as the chain cap allows. Uncompleted records are
//! not queued anywhere; they simply reappear on the next cycle, which is
//! the whole backpressure story.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::{Map, Value};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mlog_models::{fields, Footage, FootageStatus, Frame, FrameStatus};
use mlog_store::StoreClient;

use crate::batch::BatchStatusChecker;
use crate::cache::{ParentCheck, StatusCache};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::quality::{CombinedLengthQuality, MetadataQuality};
use crate::registry::{FootageStep, FrameStep, StepRegistry, FOOTAGE_CHAIN_CAP, FRAME_CHAIN_CAP};
use crate::step::{ProcessStepRunner, StepInvoker};

const FOOTAGE_PAGE_SIZE: u64 = 500;
const FRAME_PAGE_SIZE: u64 = 1000;
const FOOTAGE_PAGE_CAP: u64 = 10_000;
const FRAME_PAGE_CAP: u64 = 50_000;

/// Frame statuses that keep the fleet awake. `4 - Audio Transcribed` is
/// polled for cache seeding but is terminal here.
const FRAME_NON_TERMINAL: [FrameStatus; 4] = [
    FrameStatus::PendingThumbnail,
    FrameStatus::ThumbnailComplete,
    FrameStatus::CaptionGenerated,
    FrameStatus::ForceResume,
];

/// Session-wide counters reported at shutdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    pub successful: u64,
    pub deferred: u64,
    pub failed: u64,
    pub poll_cycles: u64,
    pub api_calls_saved: u64,
}

#[derive(Default)]
struct Counters {
    successful: AtomicU64,
    deferred: AtomicU64,
    failed: AtomicU64,
    poll_cycles: AtomicU64,
}

enum Task {
    Footage(Footage),
    Frame(Frame),
}

/// How a task ended. Holds are routine backpressure, not failures: a record
/// waiting on its children or on a parent-status backfill simply reappears
/// next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    /// At least one step executed or the status advanced
    Advanced,
    /// Waiting on a dependency, a cache backfill, or user input
    Deferred,
    /// A step failed or a store write was rejected
    Failed,
}

enum FrameReadiness {
    NoFrames,
    Ready { total: usize },
    Waiting { ready: usize, total: usize },
}

/// The polling engine. Always handled behind an `Arc`; tasks hold clones
/// while they run, so a cycle's soft timeout can leave stragglers running
/// in the background without dangling state.
pub struct PollingEngine {
    config: EngineConfig,
    store: Arc<StoreClient>,
    registry: StepRegistry,
    invoker: Arc<dyn StepInvoker>,
    quality: Arc<dyn MetadataQuality>,
    cache: StatusCache,
    batch: BatchStatusChecker,
    counters: Counters,
    /// Per-cycle dedup of "waiting" log lines, cleared at cycle start.
    waiting_logged: Mutex<HashSet<String>>,
    shutdown: watch::Sender<bool>,
    engine_id: String,
}

impl PollingEngine {
    /// Production wiring: process-spawning step invoker sharing the store's
    /// session token, default metadata-quality heuristic.
    pub fn new(config: EngineConfig, store: Arc<StoreClient>) -> Arc<Self> {
        let invoker = Arc::new(ProcessStepRunner::new(store.token_cache()));
        Self::with_parts(
            config,
            store,
            invoker,
            Arc::new(CombinedLengthQuality::default()),
        )
    }

    /// Full wiring, used by tests to stub the step boundary and the quality
    /// predicate.
    pub fn with_parts(
        config: EngineConfig,
        store: Arc<StoreClient>,
        invoker: Arc<dyn StepInvoker>,
        quality: Arc<dyn MetadataQuality>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            registry: StepRegistry::from_config(&config),
            cache: StatusCache::new(config.status_cache_ttl),
            batch: BatchStatusChecker::new(Arc::clone(&store)),
            counters: Counters::default(),
            waiting_logged: Mutex::new(HashSet::new()),
            shutdown,
            engine_id: format!("engine-{}", Uuid::new_v4()),
            config,
            store,
            invoker,
            quality,
        })
    }

    /// Signal the loop to stop after the in-flight cycle.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            successful: self.counters.successful.load(Ordering::SeqCst),
            deferred: self.counters.deferred.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            poll_cycles: self.counters.poll_cycles.load(Ordering::SeqCst),
            api_calls_saved: self.cache.stats().api_calls_saved,
        }
    }

    /// Run the polling loop until the fleet is quiescent, the wall-clock
    /// budget expires, or shutdown is signalled.
    pub async fn run(self: Arc<Self>) -> EngineResult<SessionStats> {
        info!(
            engine_id = %self.engine_id,
            pool_size = self.config.worker_pool_size,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Starting polling engine"
        );
        self.registry.preflight();

        // An already-terminal fleet needs no polling at all.
        match self.fleet_is_quiescent().await {
            Ok(true) => {
                info!("All records already terminal, no polling needed");
                return Ok(self.stats());
            }
            Ok(false) => {}
            Err(e) => warn!("Initial completion check failed: {}", e),
        }

        let started = Instant::now();
        let mut shutdown_rx = self.shutdown.subscribe();

        while started.elapsed() < self.config.poll_duration {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping engine");
                break;
            }

            let cycle = self.counters.poll_cycles.fetch_add(1, Ordering::SeqCst) + 1;
            Arc::clone(&self).run_cycle(cycle).await;

            match self.fleet_is_quiescent().await {
                Ok(true) => {
                    info!("All records terminal, stopping before the next sleep");
                    break;
                }
                Ok(false) => {}
                Err(e) => warn!("Completion check failed: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping engine");
                        break;
                    }
                }
            }
        }

        let stats = self.stats();
        let cache = self.cache.stats();
        info!(
            finished_at = %chrono::Utc::now().to_rfc3339(),
            total_secs = started.elapsed().as_secs(),
            poll_cycles = stats.poll_cycles,
            successful = stats.successful,
            deferred = stats.deferred,
            failed = stats.failed,
            api_calls_saved = cache.api_calls_saved,
            cache_hits = cache.hits,
            cache_misses = cache.misses,
            cache_hit_rate = format!("{:.1}%", cache.hit_rate() * 100.0),
            "Polling session complete"
        );
        Ok(stats)
    }

    async fn run_cycle(self: Arc<Self>, cycle: u64) {
        let cycle_start = Instant::now();
        self.cache.clear_expired();
        self.waiting_logged.lock().unwrap().clear();

        let (footage, frames) = self.discover().await;
        self.cache.bulk_insert_footage(&footage);
        self.cache.bulk_insert_frames(&frames);

        let parent_statuses: HashMap<String, FootageStatus> = footage
            .iter()
            .map(|f| (f.id.clone(), f.status))
            .collect();

        let mut tasks: Vec<Task> = Vec::new();
        for item in footage {
            if !item.status.is_terminal() {
                tasks.push(Task::Footage(item));
            }
        }
        for frame in frames {
            // A parent that finished the whole workflow makes its frames
            // terminal regardless of their own status.
            if let Some(parent_id) = &frame.parent_id {
                if parent_statuses
                    .get(parent_id)
                    .is_some_and(|s| s.frames_are_done())
                {
                    continue;
                }
            }
            if !frame.status.is_terminal() {
                tasks.push(Task::Frame(frame));
            }
        }

        let footage_tasks = tasks.iter().filter(|t| matches!(t, Task::Footage(_))).count();
        let frame_tasks = tasks.len() - footage_tasks;
        info!(cycle, footage = footage_tasks, frames = frame_tasks, "Processing records");

        let forced_footage = tasks
            .iter()
            .filter(|t| matches!(t, Task::Footage(f) if f.status == FootageStatus::ForceResume))
            .count();
        let forced_frames = tasks
            .iter()
            .filter(|t| matches!(t, Task::Frame(f) if f.status == FrameStatus::ForceResume))
            .count();
        if forced_footage > 0 {
            info!(count = forced_footage, "Force Resume footage records");
        }
        if forced_frames > 0 {
            info!(count = forced_frames, "Force Resume frame records");
        }

        let before_ok = self.counters.successful.load(Ordering::SeqCst);
        let before_deferred = self.counters.deferred.load(Ordering::SeqCst);
        let before_failed = self.counters.failed.load(Ordering::SeqCst);

        if !tasks.is_empty() {
            let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_size));
            let mut handles = Vec::with_capacity(tasks.len());

            for task in tasks {
                let engine = Arc::clone(&self);
                let semaphore = Arc::clone(&semaphore);
                handles.push(tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };
                    let outcome = match task {
                        Task::Footage(footage) => engine.process_footage_task(footage).await,
                        Task::Frame(frame) => engine.process_frame_task(frame).await,
                    };
                    match outcome {
                        TaskOutcome::Advanced => {
                            engine.counters.successful.fetch_add(1, Ordering::SeqCst);
                        }
                        TaskOutcome::Deferred => {
                            engine.counters.deferred.fetch_add(1, Ordering::SeqCst);
                        }
                        TaskOutcome::Failed => {
                            engine.counters.failed.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }));
            }

            // Dropping the remaining handles detaches the tasks; they keep
            // their engine clones and finish on their own.
            let wait_all = async {
                for handle in handles {
                    let _ = handle.await;
                }
            };
            if tokio::time::timeout(self.config.cycle_soft_timeout, wait_all)
                .await
                .is_err()
            {
                info!(cycle, "Cycle soft timeout reached, remaining tasks continue in the background");
            }
        }

        // Resolve parent-status cache misses with one batched lookup. Tasks
        // that deferred this cycle succeed on the next one.
        let parents = self.cache.unique_parents_needing_check();
        if !parents.is_empty() {
            match self.batch.batch_check(&parents).await {
                Ok(found) => {
                    self.cache.bulk_insert_footage(&found);
                    self.cache.add_api_calls_saved(parents.len() as u64 - 1);
                }
                Err(e) => warn!("Batch parent-status check failed: {}", e),
            }
        }

        let cache = self.cache.stats();
        info!(
            cycle,
            completed = self.counters.successful.load(Ordering::SeqCst) - before_ok,
            deferred = self.counters.deferred.load(Ordering::SeqCst) - before_deferred,
            failed = self.counters.failed.load(Ordering::SeqCst) - before_failed,
            cache_hit_rate = format!("{:.1}%", cache.hit_rate() * 100.0),
            duration_ms = cycle_start.elapsed().as_millis() as u64,
            "Cycle complete"
        );
    }

    /// Page through every processing status of both layouts. A failing
    /// status class is logged and skipped; the cycle continues with the
    /// records gathered from the others.
    async fn discover(&self) -> (Vec<Footage>, Vec<Frame>) {
        let mut all_footage = Vec::new();
        for status in FootageStatus::PROCESSING {
            match self
                .store
                .find_by_field(
                    fields::FOOTAGE_LAYOUT,
                    fields::footage::STATUS,
                    status.as_str(),
                    FOOTAGE_PAGE_SIZE,
                    FOOTAGE_PAGE_CAP,
                )
                .await
            {
                Ok(records) => {
                    let mut count = 0usize;
                    for record in &records {
                        match Footage::from_fields(&record.record_key, &record.fields) {
                            Some(footage) => {
                                all_footage.push(footage);
                                count += 1;
                            }
                            None => debug!(
                                record_key = %record.record_key,
                                "Skipping footage record with missing id or unknown status"
                            ),
                        }
                    }
                    if count > 0 {
                        info!(status = %status, count, "Discovered footage records");
                    }
                }
                Err(e) => warn!(status = %status, "Footage discovery failed: {}", e),
            }
        }

        let mut all_frames = Vec::new();
        for status in FrameStatus::PROCESSING {
            match self
                .store
                .find_by_field(
                    fields::FRAMES_LAYOUT,
                    fields::frame::STATUS,
                    status.as_str(),
                    FRAME_PAGE_SIZE,
                    FRAME_PAGE_CAP,
                )
                .await
            {
                Ok(records) => {
                    let mut count = 0usize;
                    for record in &records {
                        match Frame::from_fields(&record.record_key, &record.fields) {
                            Some(frame) => {
                                all_frames.push(frame);
                                count += 1;
                            }
                            None => debug!(
                                record_key = %record.record_key,
                                "Skipping frame record with missing id or unknown status"
                            ),
                        }
                    }
                    if count > 0 {
                        info!(status = %status, count, "Discovered frame records");
                    }
                }
                Err(e) => warn!(status = %status, "Frame discovery failed: {}", e),
            }
        }

        (all_footage, all_frames)
    }

    /// Advance one footage record through consecutive steps, chaining up to
    /// the cap. Status-only transitions (URL skip, step entry markers) do
    /// not count against the cap; only process executions do.
    async fn process_footage_task(&self, footage: Footage) -> TaskOutcome {
        let mut current = footage.status;
        let mut steps_completed = 0usize;
        let mut advanced = false;
        let mut failed = false;

        loop {
            if steps_completed >= FOOTAGE_CHAIN_CAP {
                debug!(footage = %footage.id, "Chain cap reached, continuing next cycle");
                break;
            }

            match current {
                FootageStatus::ProcessingFrameInfo | FootageStatus::GeneratingDescription => {
                    match self.child_frame_readiness(&footage.id).await {
                        Ok(FrameReadiness::NoFrames) => {
                            debug!(footage = %footage.id, "No child frames yet, skipping cycle");
                            break;
                        }
                        Ok(FrameReadiness::Waiting { ready, total }) => {
                            self.log_waiting_once(format!("footage:{}", footage.id), || {
                                info!(
                                    footage = %footage.id,
                                    "Waiting for frames {}/{} ready",
                                    ready,
                                    total
                                );
                            });
                            break;
                        }
                        Ok(FrameReadiness::Ready { total }) => {
                            info!(
                                footage = %footage.id,
                                frames = total,
                                "All frames ready, generating description"
                            );
                            let step = self.registry.description_step().clone();
                            if self.run_footage_step(&footage, &step, current).await {
                                steps_completed += 1;
                                advanced = true;
                            } else {
                                failed = true;
                            }
                            // Final step of the chain either way; frames
                            // keep their statuses for the downstream
                            // systems.
                            break;
                        }
                        Err(e) => {
                            warn!(footage = %footage.id, "Frame readiness check failed: {}", e);
                            failed = true;
                            break;
                        }
                    }
                }
                FootageStatus::ScrapingUrl => {
                    if footage.is_library() {
                        info!(footage = %footage.id, "Library footage requires manual processing");
                        if self.park_for_user_input(&footage).await {
                            advanced = true;
                        } else {
                            failed = true;
                        }
                        break;
                    }
                    if !footage.has_url() {
                        // Idempotent skip: no process is spawned for a
                        // record without a URL.
                        debug!(footage = %footage.id, "No URL to scrape, advancing");
                        if !self
                            .patch_footage_status(&footage, FootageStatus::ProcessingFrameInfo)
                            .await
                        {
                            failed = true;
                            break;
                        }
                        current = FootageStatus::ProcessingFrameInfo;
                        advanced = true;
                        continue;
                    }

                    let url_step = self.registry.url_step().clone();
                    if !self.run_footage_step(&footage, &url_step, current).await {
                        failed = true;
                        break;
                    }
                    steps_completed += 1;
                    advanced = true;

                    // Single re-read so the quality gate sees the fields the
                    // step process wrote.
                    let fresh = match self
                        .store
                        .get_one(fields::FOOTAGE_LAYOUT, &footage.record_key)
                        .await
                    {
                        Ok(record) => Footage::from_fields(&record.record_key, &record.fields)
                            .unwrap_or_else(|| footage.clone()),
                        Err(e) => {
                            warn!(footage = %footage.id, "Re-read after scrape failed: {}", e);
                            footage.clone()
                        }
                    };

                    if self.quality.quality_ok(&fresh) {
                        info!(footage = %footage.id, "Metadata quality passed, processing frames");
                        let step = self.registry.frame_processing_step().clone();
                        if !self.run_footage_step(&footage, &step, current).await {
                            failed = true;
                            break;
                        }
                        steps_completed += 1;
                        current = FootageStatus::ProcessingFrameInfo;
                        continue;
                    }

                    warn!(footage = %footage.id, "Metadata quality insufficient, awaiting user input");
                    if self.park_for_user_input(&footage).await {
                        advanced = true;
                    } else {
                        failed = true;
                    }
                    break;
                }
                FootageStatus::CreatingFrames => {
                    if footage.is_library() {
                        info!(footage = %footage.id, "Library footage requires manual processing");
                        if self.park_for_user_input(&footage).await {
                            advanced = true;
                        } else {
                            failed = true;
                        }
                        break;
                    }
                    // Mark the URL step in progress; the branch above gates
                    // and executes it.
                    if !self
                        .patch_footage_status(&footage, FootageStatus::ScrapingUrl)
                        .await
                    {
                        failed = true;
                        break;
                    }
                    current = FootageStatus::ScrapingUrl;
                    advanced = true;
                    continue;
                }
                FootageStatus::AwaitingUserInput => {
                    debug!(footage = %footage.id, "Awaiting user input, no automatic progression");
                    break;
                }
                FootageStatus::ForceResume => {
                    info!(footage = %footage.id, "Force resume, processing frames directly");
                    let step = self
                        .registry
                        .footage_step(FootageStatus::ForceResume)
                        .expect("registry declares the force-resume step")
                        .clone();
                    if !self.run_footage_step(&footage, &step, current).await {
                        failed = true;
                        break;
                    }
                    steps_completed += 1;
                    advanced = true;
                    current = FootageStatus::ProcessingFrameInfo;
                    continue;
                }
                status if status.is_terminal() => break,
                status => {
                    // Standard progression: probe, thumbnails, frame creation.
                    let Some(step) = self.registry.footage_step(status).cloned() else {
                        break;
                    };
                    if !self.run_footage_step(&footage, &step, current).await {
                        failed = true;
                        break;
                    }
                    steps_completed += 1;
                    advanced = true;
                    current = step.final_status.unwrap_or(step.next);
                }
            }
        }

        if steps_completed > 1 {
            info!(footage = %footage.id, steps = steps_completed, "Completed multiple steps this cycle");
        }
        if failed {
            TaskOutcome::Failed
        } else if advanced {
            TaskOutcome::Advanced
        } else {
            TaskOutcome::Deferred
        }
    }

    /// Advance one frame record, gated on its parent's cached status.
    async fn process_frame_task(&self, frame: Frame) -> TaskOutcome {
        let original = frame.status;

        if original == FrameStatus::ForceResume {
            info!(frame = %frame.id, "Force resume, regenerating caption and audio");
        } else if let Some(parent_id) = frame.parent_id.as_deref() {
            match self.cache.parent_check(parent_id) {
                ParentCheck::Miss => {
                    debug!(
                        frame = %frame.id,
                        parent = parent_id,
                        "Parent status not cached, deferring to batch check"
                    );
                    return TaskOutcome::Deferred;
                }
                ParentCheck::TerminalSuccess(status) => {
                    self.log_waiting_once(format!("frame-done:{}", frame.id), || {
                        info!(
                            frame = %frame.id,
                            parent = parent_id,
                            parent_status = %status,
                            "Parent finished the workflow, frame processing complete"
                        );
                    });
                    return TaskOutcome::Advanced;
                }
                ParentCheck::NotReady(status) => {
                    self.log_waiting_once(
                        format!("frame-wait:{}:{}:{}", frame.id, parent_id, status),
                        || {
                            info!(
                                frame = %frame.id,
                                parent = parent_id,
                                parent_status = %status,
                                "Parent not ready, waiting"
                            );
                        },
                    );
                    return TaskOutcome::Deferred;
                }
                ParentCheck::Ready(_) => {}
            }
        }

        let mut current = frame.status;
        let mut steps_completed = 0usize;
        let mut failed = false;
        while steps_completed < FRAME_CHAIN_CAP {
            let Some(step) = self.registry.frame_step(current).cloned() else {
                break;
            };
            if !self.run_frame_step(&frame, &step, current).await {
                failed = true;
                break;
            }
            steps_completed += 1;
            current = step.next;
            if current == FrameStatus::AudioTranscribed {
                // Terminal for this controller; downstream systems own the rest.
                break;
            }
        }

        // A Force Resume chain that reached the terminal status gets one
        // explicit repatch so the record cannot be re-picked next cycle.
        if original == FrameStatus::ForceResume
            && steps_completed > 0
            && current == FrameStatus::AudioTranscribed
            && self.patch_frame_status(&frame, FrameStatus::AudioTranscribed).await
        {
            info!(frame = %frame.id, "Force resume completed, status finalized");
        }

        if steps_completed > 1 {
            debug!(frame = %frame.id, steps = steps_completed, "Completed multiple steps this cycle");
        }
        if failed {
            TaskOutcome::Failed
        } else if steps_completed > 0 {
            TaskOutcome::Advanced
        } else {
            TaskOutcome::Deferred
        }
    }

    /// Execute one footage step: mark in progress, invoke, apply the final
    /// status when the entry declares one.
    async fn run_footage_step(
        &self,
        footage: &Footage,
        step: &FootageStep,
        current: FootageStatus,
    ) -> bool {
        if current != step.next && !self.patch_footage_status(footage, step.next).await {
            return false;
        }

        match self.invoker.invoke(&step.spec, &footage.id).await {
            Ok(report) if report.ok => {
                if let Some(final_status) = step.final_status {
                    // Only the footage moves; child frame statuses are left
                    // for the downstream systems.
                    if !self.patch_footage_status(footage, final_status).await {
                        return false;
                    }
                }
                info!(
                    footage = %footage.id,
                    step = step.spec.name,
                    duration_ms = report.duration.as_millis() as u64,
                    "Step completed"
                );
                true
            }
            Ok(report) => {
                // The record stays at its in-progress marker and retries on
                // a future cycle.
                warn!(
                    footage = %footage.id,
                    step = step.spec.name,
                    timed_out = report.timed_out,
                    "Step failed: {}",
                    report.error.as_deref().unwrap_or("unknown")
                );
                false
            }
            Err(e) => {
                error!(footage = %footage.id, step = step.spec.name, "Fatal step error: {}", e);
                false
            }
        }
    }

    async fn run_frame_step(&self, frame: &Frame, step: &FrameStep, current: FrameStatus) -> bool {
        if current != step.next && !self.patch_frame_status(frame, step.next).await {
            return false;
        }

        match self.invoker.invoke(&step.spec, &frame.id).await {
            Ok(report) if report.ok => {
                debug!(
                    frame = %frame.id,
                    step = step.spec.name,
                    duration_ms = report.duration.as_millis() as u64,
                    "Step completed"
                );
                true
            }
            Ok(report) => {
                warn!(
                    frame = %frame.id,
                    step = step.spec.name,
                    timed_out = report.timed_out,
                    "Step failed: {}",
                    report.error.as_deref().unwrap_or("unknown")
                );
                false
            }
            Err(e) => {
                error!(frame = %frame.id, step = step.spec.name, "Fatal step error: {}", e);
                false
            }
        }
    }

    async fn patch_footage_status(&self, footage: &Footage, status: FootageStatus) -> bool {
        let mut field_data = Map::new();
        field_data.insert(
            fields::footage::STATUS.to_string(),
            Value::String(status.as_str().to_string()),
        );
        match self
            .store
            .patch_fields(fields::FOOTAGE_LAYOUT, &footage.record_key, field_data)
            .await
        {
            Ok(()) => {
                info!(footage = %footage.id, status = %status, "Status updated");
                true
            }
            Err(e) => {
                warn!(footage = %footage.id, status = %status, "Status update failed: {}", e);
                false
            }
        }
    }

    async fn patch_frame_status(&self, frame: &Frame, status: FrameStatus) -> bool {
        let mut field_data = Map::new();
        field_data.insert(
            fields::frame::STATUS.to_string(),
            Value::String(status.as_str().to_string()),
        );
        match self
            .store
            .patch_fields(fields::FRAMES_LAYOUT, &frame.record_key, field_data)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(frame = %frame.id, status = %status, "Status update failed: {}", e);
                false
            }
        }
    }

    /// Send the footage and every child frame to `Awaiting User Input` in
    /// one logical action. Returns whether the footage transition was
    /// applied. The child updates are best-effort: partial failure is
    /// reported, the footage transition stands, and the next cycle
    /// re-attempts any frame still off the target status.
    async fn park_for_user_input(&self, footage: &Footage) -> bool {
        if !self
            .patch_footage_status(footage, FootageStatus::AwaitingUserInput)
            .await
        {
            return false;
        }

        let children = match self.store.get_children_of(&footage.id, FRAME_PAGE_SIZE).await {
            Ok(records) => records,
            Err(e) => {
                warn!(footage = %footage.id, "Failed to list child frames: {}", e);
                return true;
            }
        };
        if children.is_empty() {
            debug!(footage = %footage.id, "No child frames to park");
            return true;
        }

        let mut updated = 0usize;
        let mut failed = 0usize;
        for child in &children {
            let mut field_data = Map::new();
            field_data.insert(
                fields::frame::STATUS.to_string(),
                Value::String(FrameStatus::AwaitingUserInput.as_str().to_string()),
            );
            match self
                .store
                .patch_fields(fields::FRAMES_LAYOUT, &child.record_key, field_data)
                .await
            {
                Ok(()) => updated += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        footage = %footage.id,
                        frame_key = %child.record_key,
                        "Frame status update failed: {}",
                        e
                    );
                }
            }
        }

        info!(footage = %footage.id, updated, failed, "Parked footage and frames for user input");
        if failed > 0 {
            warn!(
                footage = %footage.id,
                failed,
                "Some frame updates failed, next cycle re-attempts"
            );
        }
        true
    }

    /// All child frames must be ready before the description step runs:
    /// transcribed with caption content, or already advanced by downstream
    /// systems.
    async fn child_frame_readiness(&self, footage_id: &str) -> EngineResult<FrameReadiness> {
        let records = self.store.get_children_of(footage_id, FRAME_PAGE_SIZE).await?;
        let frames: Vec<Frame> = records
            .iter()
            .filter_map(|record| Frame::from_fields(&record.record_key, &record.fields))
            .collect();

        if frames.is_empty() {
            return Ok(FrameReadiness::NoFrames);
        }

        let total = frames.len();
        let ready = frames.iter().filter(|f| f.is_ready()).count();
        Ok(if ready == total {
            FrameReadiness::Ready { total }
        } else {
            FrameReadiness::Waiting { ready, total }
        })
    }

    fn log_waiting_once(&self, key: String, log: impl FnOnce()) {
        let mut logged = self.waiting_logged.lock().unwrap();
        if logged.insert(key) {
            log();
        }
    }

    /// True when no record in either layout sits at a non-terminal status.
    /// Footage is probed with limit-1 finds; frames additionally get the
    /// parent exemption (a parent at the end of the workflow makes its
    /// frames terminal), and orphaned frames are ignored.
    async fn fleet_is_quiescent(&self) -> EngineResult<bool> {
        for status in FootageStatus::PROCESSING {
            if self
                .store
                .any_by_field(fields::FOOTAGE_LAYOUT, fields::footage::STATUS, status.as_str())
                .await?
            {
                debug!(status = %status, "Footage records still processing");
                return Ok(false);
            }
        }

        let mut lingering: Vec<Frame> = Vec::new();
        for status in FRAME_NON_TERMINAL {
            let records = self
                .store
                .find_by_field(
                    fields::FRAMES_LAYOUT,
                    fields::frame::STATUS,
                    status.as_str(),
                    FRAME_PAGE_SIZE,
                    FRAME_PAGE_CAP,
                )
                .await?;
            lingering.extend(
                records
                    .iter()
                    .filter_map(|record| Frame::from_fields(&record.record_key, &record.fields)),
            );
        }

        if !lingering.is_empty() {
            let parent_ids: BTreeSet<String> =
                lingering.iter().filter_map(|f| f.parent_id.clone()).collect();
            let parents = self.batch.batch_check(&parent_ids).await?;
            let done: HashSet<&str> = parents
                .iter()
                .filter(|p| p.status.frames_are_done())
                .map(|p| p.id.as_str())
                .collect();
            let known: HashSet<&str> = parents.iter().map(|p| p.id.as_str()).collect();

            let remaining = lingering
                .iter()
                .filter(|frame| match frame.parent_id.as_deref() {
                    Some(parent_id) => known.contains(parent_id) && !done.contains(parent_id),
                    None => true,
                })
                .count();

            if remaining > 0 {
                debug!(remaining, "Frame records still processing");
                return Ok(false);
            }
        }

        info!("Completion check: all records terminal");
        Ok(true)
    }
}
