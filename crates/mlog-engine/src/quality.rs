//! Metadata-quality gate applied after the URL scrape step.
//!
//! The scoring rules live outside the controller; the engine only requires
//! a deterministic verdict over the record's current field snapshot. The
//! verdict decides between continuing to frame processing and parking the
//! footage (and its frames) for manual input.

use mlog_models::{fields, Footage};

/// Injected metadata-quality predicate. Must be deterministic given the
/// record's field snapshot.
pub trait MetadataQuality: Send + Sync {
    fn quality_ok(&self, footage: &Footage) -> bool;
}

/// Conservative default: enough combined descriptive text across the
/// metadata-bearing fields.
pub struct CombinedLengthQuality {
    pub min_chars: usize,
}

impl Default for CombinedLengthQuality {
    fn default() -> Self {
        Self { min_chars: 30 }
    }
}

impl MetadataQuality for CombinedLengthQuality {
    fn quality_ok(&self, footage: &Footage) -> bool {
        let combined: usize = [
            fields::footage::METADATA,
            fields::footage::DESCRIPTION,
            fields::footage::SOURCE,
            fields::footage::ARCHIVAL_ID,
        ]
        .iter()
        .map(|key| footage.extra_str(key).trim().len())
        .sum();

        combined > self.min_chars
    }
}
