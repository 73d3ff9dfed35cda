//! Typed view over a frame record.

use serde_json::{Map, Value};

use crate::fields;
use crate::status::FrameStatus;

/// A frame (sampled still) record, owned by exactly one footage.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Format `<footage_id>_NNN`, 1-based.
    pub id: String,
    pub parent_id: Option<String>,
    /// Opaque store handle used for patch operations.
    pub record_key: String,
    pub status: FrameStatus,
    /// Read-only to the controller; used as a readiness signal.
    pub caption: String,
    /// Read-only to the controller.
    pub transcript: String,
    pub extras: Map<String, Value>,
}

impl Frame {
    /// Project a typed frame view out of a store field bag. Returns `None`
    /// when the id is missing or the status is unknown.
    pub fn from_fields(record_key: &str, field_data: &Map<String, Value>) -> Option<Self> {
        let id = field_data
            .get(fields::frame::ID)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())?;
        let status = FrameStatus::parse(
            field_data.get(fields::frame::STATUS).and_then(Value::as_str)?,
        )?;

        let mut extras = field_data.clone();
        extras.remove(fields::frame::ID);
        extras.remove(fields::frame::STATUS);
        let parent_id = extras
            .remove(fields::frame::PARENT_ID)
            .and_then(|v| v.as_str().map(str::to_owned))
            .filter(|s| !s.is_empty());
        let caption = extras
            .remove(fields::frame::CAPTION)
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        let transcript = extras
            .remove(fields::frame::TRANSCRIPT)
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();

        Some(Self {
            id: id.to_owned(),
            parent_id,
            record_key: record_key.to_owned(),
            status,
            caption,
            transcript,
            extras,
        })
    }

    /// Readiness for the parent's description step: transcribed with caption
    /// content, or already advanced past transcription by downstream systems.
    pub fn is_ready(&self) -> bool {
        (self.status == FrameStatus::AudioTranscribed && !self.caption.trim().is_empty())
            || self.status.is_past_transcription()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(entries: &[(&str, &str)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn projects_core_fields() {
        let fields = bag(&[
            (fields::frame::ID, "AF0042_003"),
            (fields::frame::PARENT_ID, "AF0042"),
            (fields::frame::STATUS, "2 - Thumbnail Complete"),
            (fields::frame::CAPTION, "a person at a desk"),
        ]);
        let frame = Frame::from_fields("55", &fields).unwrap();
        assert_eq!(frame.id, "AF0042_003");
        assert_eq!(frame.parent_id.as_deref(), Some("AF0042"));
        assert_eq!(frame.status, FrameStatus::ThumbnailComplete);
        assert_eq!(frame.caption, "a person at a desk");
    }

    #[test]
    fn transcribed_frame_without_caption_is_not_ready() {
        let fields = bag(&[
            (fields::frame::ID, "AF0042_001"),
            (fields::frame::STATUS, "4 - Audio Transcribed"),
            (fields::frame::CAPTION, "  "),
        ]);
        assert!(!Frame::from_fields("1", &fields).unwrap().is_ready());
    }

    #[test]
    fn transcribed_frame_with_caption_is_ready() {
        let fields = bag(&[
            (fields::frame::ID, "AF0042_001"),
            (fields::frame::STATUS, "4 - Audio Transcribed"),
            (fields::frame::CAPTION, "two boats"),
        ]);
        assert!(Frame::from_fields("1", &fields).unwrap().is_ready());
    }

    #[test]
    fn downstream_status_is_ready_without_caption() {
        let fields = bag(&[
            (fields::frame::ID, "AF0042_002"),
            (fields::frame::STATUS, "5 - Generating Embeddings"),
        ]);
        assert!(Frame::from_fields("2", &fields).unwrap().is_ready());
    }

    #[test]
    fn orphan_frame_still_parses() {
        let fields = bag(&[
            (fields::frame::ID, "AF9999_001"),
            (fields::frame::STATUS, "1 - Pending Thumbnail"),
        ]);
        let frame = Frame::from_fields("3", &fields).unwrap();
        assert!(frame.parent_id.is_none());
    }
}
