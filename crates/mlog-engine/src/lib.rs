//! Status-driven polling engine for the MediaLog pipeline controller.
//!
//! The engine drives footage and frame records through their step graphs
//! until the whole fleet is terminal:
//! - `engine` - outer polling loop: discovery, dispatch, quiescence
//! - `cache` - cycle-scoped status cache for parent-readiness checks
//! - `batch` - batched parent-status lookups on cache misses
//! - `registry` - the two step graphs and their gates
//! - `step` - external step process invocation with timeout
//! - `quality` - injected metadata-quality predicate
//! - `config` - environment-driven configuration

pub mod batch;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod quality;
pub mod registry;
pub mod step;

pub use batch::BatchStatusChecker;
pub use cache::{CacheStats, ParentCheck, StatusCache};
pub use config::EngineConfig;
pub use engine::{PollingEngine, SessionStats};
pub use error::{EngineError, EngineResult};
pub use quality::{CombinedLengthQuality, MetadataQuality};
pub use registry::{
    FootageGate, FootageStep, FrameStep, StepRegistry, StepSpec, FOOTAGE_CHAIN_CAP, FRAME_CHAIN_CAP,
};
pub use step::{ProcessStepRunner, StepInvoker, StepReport};
