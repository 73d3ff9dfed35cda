//! Static description of the footage and frame step graphs.
//!
//! Each entry maps a source status to the executable that advances it and
//! the status written around the execution: `next` doubles as the
//! in-progress marker (patched before the process runs), `final_status` is
//! written only on the last step of a chain.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use mlog_models::{FootageStatus, FrameStatus};

use crate::config::EngineConfig;

/// Chain cap per footage task per cycle.
pub const FOOTAGE_CHAIN_CAP: usize = 5;
/// Chain cap per frame task per cycle.
pub const FRAME_CHAIN_CAP: usize = 4;

/// One external step executable.
#[derive(Debug, Clone)]
pub struct StepSpec {
    /// Stable step name, also the executable's file name
    pub name: &'static str,
    /// Resolved path of the executable
    pub script: PathBuf,
    pub timeout: Duration,
}

/// Gates evaluated before a footage step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootageGate {
    /// Skip the step entirely when no URL is present; park library footage
    /// (and its frames) for manual input.
    UrlGated,
    /// Every child frame must be ready before the step runs.
    RequiresFrameCompletion,
    /// Child frames merely need to exist; zero children skips the cycle.
    FrameDependencyOnly,
}

#[derive(Debug, Clone)]
pub struct FootageStep {
    pub source: FootageStatus,
    pub spec: StepSpec,
    pub next: FootageStatus,
    pub final_status: Option<FootageStatus>,
    pub gate: Option<FootageGate>,
}

#[derive(Debug, Clone)]
pub struct FrameStep {
    pub source: FrameStatus,
    pub spec: StepSpec,
    pub next: FrameStatus,
}

/// The two step graphs, built once from configuration.
pub struct StepRegistry {
    footage: Vec<FootageStep>,
    frames: Vec<FrameStep>,
}

impl StepRegistry {
    pub fn from_config(config: &EngineConfig) -> Self {
        let spec = |name: &'static str, timeout: Duration| StepSpec {
            name,
            script: config.scripts_dir.join(name),
            timeout,
        };
        let step = |name: &'static str| spec(name, config.step_timeout);

        let footage = vec![
            FootageStep {
                source: FootageStatus::PendingFileInfo,
                spec: step("footage_probe_file"),
                next: FootageStatus::FileInfoComplete,
                final_status: None,
                gate: None,
            },
            FootageStep {
                source: FootageStatus::FileInfoComplete,
                spec: step("footage_generate_thumbnails"),
                next: FootageStatus::ThumbnailsComplete,
                final_status: None,
                gate: None,
            },
            FootageStep {
                source: FootageStatus::ThumbnailsComplete,
                spec: step("footage_create_frames"),
                next: FootageStatus::CreatingFrames,
                final_status: None,
                gate: None,
            },
            FootageStep {
                source: FootageStatus::CreatingFrames,
                spec: step("footage_scrape_url"),
                next: FootageStatus::ScrapingUrl,
                final_status: None,
                gate: Some(FootageGate::UrlGated),
            },
            FootageStep {
                source: FootageStatus::ScrapingUrl,
                spec: spec("footage_process_frames", config.frame_processing_timeout),
                next: FootageStatus::ProcessingFrameInfo,
                final_status: None,
                gate: Some(FootageGate::FrameDependencyOnly),
            },
            FootageStep {
                source: FootageStatus::ProcessingFrameInfo,
                spec: step("footage_generate_description"),
                next: FootageStatus::GeneratingDescription,
                final_status: Some(FootageStatus::GeneratingEmbeddings),
                gate: Some(FootageGate::RequiresFrameCompletion),
            },
            // Retry entry: a failed description step leaves the record at
            // its in-progress marker and is picked up from there.
            FootageStep {
                source: FootageStatus::GeneratingDescription,
                spec: step("footage_generate_description"),
                next: FootageStatus::GeneratingDescription,
                final_status: Some(FootageStatus::GeneratingEmbeddings),
                gate: Some(FootageGate::RequiresFrameCompletion),
            },
            FootageStep {
                source: FootageStatus::ForceResume,
                spec: spec("footage_process_frames", config.frame_processing_timeout),
                next: FootageStatus::ProcessingFrameInfo,
                final_status: None,
                gate: None,
            },
        ];

        let frames = vec![
            FrameStep {
                source: FrameStatus::PendingThumbnail,
                spec: step("frame_generate_thumbnail"),
                next: FrameStatus::ThumbnailComplete,
            },
            FrameStep {
                source: FrameStatus::ThumbnailComplete,
                spec: step("frame_generate_caption"),
                next: FrameStatus::CaptionGenerated,
            },
            FrameStep {
                source: FrameStatus::CaptionGenerated,
                spec: step("frame_transcribe_audio"),
                next: FrameStatus::AudioTranscribed,
            },
            // Force Resume regenerates the caption and then chains into
            // transcription.
            FrameStep {
                source: FrameStatus::ForceResume,
                spec: step("frame_generate_caption"),
                next: FrameStatus::CaptionGenerated,
            },
        ];

        Self { footage, frames }
    }

    pub fn footage_step(&self, source: FootageStatus) -> Option<&FootageStep> {
        self.footage.iter().find(|step| step.source == source)
    }

    pub fn frame_step(&self, source: FrameStatus) -> Option<&FrameStep> {
        self.frames.iter().find(|step| step.source == source)
    }

    /// The URL scrape step (executed while the record sits at its
    /// in-progress marker).
    pub fn url_step(&self) -> &FootageStep {
        self.footage_step(FootageStatus::CreatingFrames)
            .expect("registry always declares the URL step")
    }

    /// The frame-processing step.
    pub fn frame_processing_step(&self) -> &FootageStep {
        self.footage_step(FootageStatus::ScrapingUrl)
            .expect("registry always declares the frame-processing step")
    }

    /// The description step (pre-status marker + final status).
    pub fn description_step(&self) -> &FootageStep {
        self.footage_step(FootageStatus::ProcessingFrameInfo)
            .expect("registry always declares the description step")
    }

    /// Warn for every configured executable that does not resolve on disk.
    /// A task reaching a missing step fails with a fatal error, so surfacing
    /// the gaps at startup saves a polling cycle of confusion.
    pub fn preflight(&self) {
        let specs = self
            .footage
            .iter()
            .map(|s| &s.spec)
            .chain(self.frames.iter().map(|s| &s.spec));
        for spec in specs {
            if which::which(&spec.script).is_err() {
                warn!(step = spec.name, script = %spec.script.display(), "Step executable not found");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StepRegistry {
        StepRegistry::from_config(&EngineConfig::default())
    }

    #[test]
    fn footage_graph_covers_every_processing_status() {
        let registry = registry();
        for status in FootageStatus::PROCESSING {
            assert!(
                registry.footage_step(status).is_some(),
                "no step registered for {status}"
            );
        }
    }

    #[test]
    fn footage_graph_shape() {
        let registry = registry();

        let probe = registry.footage_step(FootageStatus::PendingFileInfo).unwrap();
        assert_eq!(probe.next, FootageStatus::FileInfoComplete);
        assert!(probe.final_status.is_none());

        let url = registry.url_step();
        assert_eq!(url.gate, Some(FootageGate::UrlGated));
        assert_eq!(url.next, FootageStatus::ScrapingUrl);

        let describe = registry.description_step();
        assert_eq!(describe.next, FootageStatus::GeneratingDescription);
        assert_eq!(describe.final_status, Some(FootageStatus::GeneratingEmbeddings));
        assert_eq!(describe.gate, Some(FootageGate::RequiresFrameCompletion));
    }

    #[test]
    fn frame_processing_step_uses_long_timeout() {
        let registry = registry();
        let step = registry.frame_processing_step();
        assert_eq!(step.spec.timeout, Duration::from_secs(1800));
        assert_eq!(step.gate, Some(FootageGate::FrameDependencyOnly));
    }

    #[test]
    fn frame_graph_shape() {
        let registry = registry();
        assert_eq!(
            registry.frame_step(FrameStatus::PendingThumbnail).unwrap().next,
            FrameStatus::ThumbnailComplete
        );
        assert_eq!(
            registry.frame_step(FrameStatus::ForceResume).unwrap().next,
            FrameStatus::CaptionGenerated
        );
        // Terminal for this controller: nothing advances a transcribed frame.
        assert!(registry.frame_step(FrameStatus::AudioTranscribed).is_none());
    }

    #[test]
    fn description_retry_runs_from_its_in_progress_marker() {
        let registry = registry();
        let retry = registry
            .footage_step(FootageStatus::GeneratingDescription)
            .unwrap();
        assert_eq!(retry.next, FootageStatus::GeneratingDescription);
        assert_eq!(retry.final_status, Some(FootageStatus::GeneratingEmbeddings));
    }
}
