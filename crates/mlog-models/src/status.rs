//! Workflow status enumerations.
//!
//! The wire strings are the public contract with the record store and the
//! step processes; `as_str`/`parse` are the single projection between them
//! and the typed world. Both enumerations carry the user-injected side
//! states (`Awaiting User Input`, `Force Resume`) alongside the happy path.

use serde::{Deserialize, Serialize};

/// Footage workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FootageStatus {
    /// Step 1 (file probe) has not run yet
    #[serde(rename = "0 - Pending File Info")]
    PendingFileInfo,
    /// File specs extracted, ready for thumbnails
    #[serde(rename = "1 - File Info Complete")]
    FileInfoComplete,
    /// Thumbnails written, ready for frame creation
    #[serde(rename = "2 - Thumbnails Complete")]
    ThumbnailsComplete,
    /// Frame records created (in-progress marker of step 3)
    #[serde(rename = "3 - Creating Frames")]
    CreatingFrames,
    /// URL scrape in progress (or skipped when no URL is present)
    #[serde(rename = "4 - Scraping URL")]
    ScrapingUrl,
    /// Frame-level processing underway; gates step 6 on child readiness
    #[serde(rename = "5 - Processing Frame Info")]
    ProcessingFrameInfo,
    /// Description generation in progress (in-progress marker of step 6)
    #[serde(rename = "6 - Generating Description")]
    GeneratingDescription,
    /// Terminal for this controller; downstream systems take over
    #[serde(rename = "7 - Generating Embeddings")]
    GeneratingEmbeddings,
    /// Downstream state, terminal here
    #[serde(rename = "8 - Applying Tags")]
    ApplyingTags,
    /// Downstream state, terminal here
    #[serde(rename = "9 - Complete")]
    Complete,
    /// Manual-review gate; only a user transition leaves this state
    #[serde(rename = "Awaiting User Input")]
    AwaitingUserInput,
    /// User-injected re-entry at frame processing
    #[serde(rename = "Force Resume")]
    ForceResume,
}

impl FootageStatus {
    /// Statuses the engine polls for footage work.
    pub const PROCESSING: [FootageStatus; 8] = [
        FootageStatus::PendingFileInfo,
        FootageStatus::FileInfoComplete,
        FootageStatus::ThumbnailsComplete,
        FootageStatus::CreatingFrames,
        FootageStatus::ScrapingUrl,
        FootageStatus::ProcessingFrameInfo,
        FootageStatus::GeneratingDescription,
        FootageStatus::ForceResume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FootageStatus::PendingFileInfo => "0 - Pending File Info",
            FootageStatus::FileInfoComplete => "1 - File Info Complete",
            FootageStatus::ThumbnailsComplete => "2 - Thumbnails Complete",
            FootageStatus::CreatingFrames => "3 - Creating Frames",
            FootageStatus::ScrapingUrl => "4 - Scraping URL",
            FootageStatus::ProcessingFrameInfo => "5 - Processing Frame Info",
            FootageStatus::GeneratingDescription => "6 - Generating Description",
            FootageStatus::GeneratingEmbeddings => "7 - Generating Embeddings",
            FootageStatus::ApplyingTags => "8 - Applying Tags",
            FootageStatus::Complete => "9 - Complete",
            FootageStatus::AwaitingUserInput => "Awaiting User Input",
            FootageStatus::ForceResume => "Force Resume",
        }
    }

    /// Parse an exact wire string. Unknown strings yield `None`; discovery
    /// skips such records rather than failing the cycle.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "0 - Pending File Info" => FootageStatus::PendingFileInfo,
            "1 - File Info Complete" => FootageStatus::FileInfoComplete,
            "2 - Thumbnails Complete" => FootageStatus::ThumbnailsComplete,
            "3 - Creating Frames" => FootageStatus::CreatingFrames,
            "4 - Scraping URL" => FootageStatus::ScrapingUrl,
            "5 - Processing Frame Info" => FootageStatus::ProcessingFrameInfo,
            "6 - Generating Description" => FootageStatus::GeneratingDescription,
            "7 - Generating Embeddings" => FootageStatus::GeneratingEmbeddings,
            "8 - Applying Tags" => FootageStatus::ApplyingTags,
            "9 - Complete" => FootageStatus::Complete,
            "Awaiting User Input" => FootageStatus::AwaitingUserInput,
            "Force Resume" => FootageStatus::ForceResume,
            _ => return None,
        })
    }

    /// Terminal for this controller: no task is constructed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FootageStatus::GeneratingEmbeddings
                | FootageStatus::ApplyingTags
                | FootageStatus::Complete
                | FootageStatus::AwaitingUserInput
        )
    }

    /// Parent statuses under which child frames may advance.
    pub fn frames_may_advance(&self) -> bool {
        matches!(
            self,
            FootageStatus::ScrapingUrl
                | FootageStatus::ProcessingFrameInfo
                | FootageStatus::GeneratingDescription
                | FootageStatus::GeneratingEmbeddings
                | FootageStatus::ForceResume
        )
    }

    /// Parent statuses that make all child frames terminal regardless of
    /// their own status.
    pub fn frames_are_done(&self) -> bool {
        matches!(self, FootageStatus::ApplyingTags | FootageStatus::Complete)
    }
}

impl std::fmt::Display for FootageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Frame workflow status.
///
/// The controller only ever writes statuses up to `4 - Audio Transcribed`;
/// the later variants are produced by downstream systems and are modeled
/// here because parent-readiness and quiescence checks must read them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameStatus {
    #[serde(rename = "1 - Pending Thumbnail")]
    PendingThumbnail,
    #[serde(rename = "2 - Thumbnail Complete")]
    ThumbnailComplete,
    #[serde(rename = "3 - Caption Generated")]
    CaptionGenerated,
    /// Terminal for this controller
    #[serde(rename = "4 - Audio Transcribed")]
    AudioTranscribed,
    /// Downstream only
    #[serde(rename = "5 - Generating Embeddings")]
    GeneratingEmbeddings,
    /// Downstream only
    #[serde(rename = "6 - Embeddings Complete")]
    EmbeddingsComplete,
    /// Downstream only
    #[serde(rename = "6 - Complete")]
    FrameComplete,
    #[serde(rename = "Awaiting User Input")]
    AwaitingUserInput,
    /// User-injected re-entry at caption generation
    #[serde(rename = "Force Resume")]
    ForceResume,
}

impl FrameStatus {
    /// Statuses the engine polls for frame work. `4 - Audio Transcribed` is
    /// discovered for cache seeding but never yields a task.
    pub const PROCESSING: [FrameStatus; 5] = [
        FrameStatus::PendingThumbnail,
        FrameStatus::ThumbnailComplete,
        FrameStatus::CaptionGenerated,
        FrameStatus::AudioTranscribed,
        FrameStatus::ForceResume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameStatus::PendingThumbnail => "1 - Pending Thumbnail",
            FrameStatus::ThumbnailComplete => "2 - Thumbnail Complete",
            FrameStatus::CaptionGenerated => "3 - Caption Generated",
            FrameStatus::AudioTranscribed => "4 - Audio Transcribed",
            FrameStatus::GeneratingEmbeddings => "5 - Generating Embeddings",
            FrameStatus::EmbeddingsComplete => "6 - Embeddings Complete",
            FrameStatus::FrameComplete => "6 - Complete",
            FrameStatus::AwaitingUserInput => "Awaiting User Input",
            FrameStatus::ForceResume => "Force Resume",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "1 - Pending Thumbnail" => FrameStatus::PendingThumbnail,
            "2 - Thumbnail Complete" => FrameStatus::ThumbnailComplete,
            "3 - Caption Generated" => FrameStatus::CaptionGenerated,
            "4 - Audio Transcribed" => FrameStatus::AudioTranscribed,
            "5 - Generating Embeddings" => FrameStatus::GeneratingEmbeddings,
            "6 - Embeddings Complete" => FrameStatus::EmbeddingsComplete,
            "6 - Complete" => FrameStatus::FrameComplete,
            "Awaiting User Input" => FrameStatus::AwaitingUserInput,
            "Force Resume" => FrameStatus::ForceResume,
            _ => return None,
        })
    }

    /// Terminal for this controller: the frame takes no further steps here.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FrameStatus::AudioTranscribed
                | FrameStatus::GeneratingEmbeddings
                | FrameStatus::EmbeddingsComplete
                | FrameStatus::FrameComplete
                | FrameStatus::AwaitingUserInput
        )
    }

    /// True for statuses past `4 - Audio Transcribed`, written by downstream
    /// systems. A frame in one of these is ready for description generation
    /// without a caption check.
    pub fn is_past_transcription(&self) -> bool {
        matches!(
            self,
            FrameStatus::GeneratingEmbeddings
                | FrameStatus::EmbeddingsComplete
                | FrameStatus::FrameComplete
        )
    }
}

impl std::fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footage_status_round_trip() {
        for status in [
            FootageStatus::PendingFileInfo,
            FootageStatus::CreatingFrames,
            FootageStatus::ScrapingUrl,
            FootageStatus::GeneratingEmbeddings,
            FootageStatus::AwaitingUserInput,
            FootageStatus::ForceResume,
        ] {
            assert_eq!(FootageStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn footage_wire_strings_are_exact() {
        assert_eq!(
            FootageStatus::ProcessingFrameInfo.as_str(),
            "5 - Processing Frame Info"
        );
        assert_eq!(FootageStatus::ScrapingUrl.as_str(), "4 - Scraping URL");
        assert_eq!(FootageStatus::parse("4 - scraping url"), None);
        assert_eq!(FootageStatus::parse(""), None);
    }

    #[test]
    fn footage_terminal_set() {
        assert!(FootageStatus::GeneratingEmbeddings.is_terminal());
        assert!(FootageStatus::ApplyingTags.is_terminal());
        assert!(FootageStatus::Complete.is_terminal());
        assert!(FootageStatus::AwaitingUserInput.is_terminal());
        assert!(!FootageStatus::GeneratingDescription.is_terminal());
        assert!(!FootageStatus::ForceResume.is_terminal());
    }

    #[test]
    fn processing_set_excludes_terminal() {
        for status in FootageStatus::PROCESSING {
            assert!(!status.is_terminal(), "{status} must not be terminal");
        }
    }

    #[test]
    fn parent_readiness_sets() {
        assert!(FootageStatus::ScrapingUrl.frames_may_advance());
        assert!(FootageStatus::ForceResume.frames_may_advance());
        assert!(!FootageStatus::CreatingFrames.frames_may_advance());
        assert!(FootageStatus::ApplyingTags.frames_are_done());
        assert!(FootageStatus::Complete.frames_are_done());
        assert!(!FootageStatus::GeneratingEmbeddings.frames_are_done());
    }

    #[test]
    fn serde_uses_the_wire_strings() {
        assert_eq!(
            serde_json::to_value(FootageStatus::PendingFileInfo).unwrap(),
            serde_json::json!("0 - Pending File Info")
        );
        assert_eq!(
            serde_json::from_value::<FrameStatus>(serde_json::json!("6 - Complete")).unwrap(),
            FrameStatus::FrameComplete
        );
    }

    #[test]
    fn frame_status_round_trip() {
        for status in [
            FrameStatus::PendingThumbnail,
            FrameStatus::AudioTranscribed,
            FrameStatus::EmbeddingsComplete,
            FrameStatus::FrameComplete,
            FrameStatus::ForceResume,
        ] {
            assert_eq!(FrameStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn frame_complete_variants_are_distinct() {
        assert_eq!(
            FrameStatus::parse("6 - Embeddings Complete"),
            Some(FrameStatus::EmbeddingsComplete)
        );
        assert_eq!(FrameStatus::parse("6 - Complete"), Some(FrameStatus::FrameComplete));
    }

    #[test]
    fn frame_terminal_set() {
        assert!(FrameStatus::AudioTranscribed.is_terminal());
        assert!(FrameStatus::FrameComplete.is_terminal());
        assert!(FrameStatus::AwaitingUserInput.is_terminal());
        assert!(!FrameStatus::CaptionGenerated.is_terminal());
        assert!(!FrameStatus::ForceResume.is_terminal());
    }
}
