//! Typed view over a footage record.

use serde_json::{Map, Value};

use crate::fields;
use crate::status::FootageStatus;

/// Prefix marking library footage, which always requires manual review.
pub const LIBRARY_PREFIX: &str = "LF";

/// A footage (video clip) record.
///
/// Typed core plus an opaque `extras` bag: the store carries many more
/// fields than the controller interprets, and the step processes read them
/// directly from the store. The controller only ever writes `status`.
#[derive(Debug, Clone)]
pub struct Footage {
    pub id: String,
    /// Opaque store handle used for patch operations.
    pub record_key: String,
    pub status: FootageStatus,
    pub url: Option<String>,
    pub file_path: Option<String>,
    /// Remaining fields, untouched by the controller.
    pub extras: Map<String, Value>,
}

impl Footage {
    /// Project a typed footage view out of a store field bag.
    ///
    /// Returns `None` when the id is missing or the status string is not
    /// one the controller knows; such records are skipped by discovery.
    pub fn from_fields(record_key: &str, field_data: &Map<String, Value>) -> Option<Self> {
        let id = non_empty_str(field_data, fields::footage::ID)?;
        let status = FootageStatus::parse(str_field(field_data, fields::footage::STATUS)?)?;

        let mut extras = field_data.clone();
        extras.remove(fields::footage::ID);
        extras.remove(fields::footage::STATUS);
        let url = extras
            .remove(fields::footage::URL)
            .and_then(|v| v.as_str().map(str::to_owned));
        let file_path = extras
            .remove(fields::footage::FILE_PATH)
            .and_then(|v| v.as_str().map(str::to_owned));

        Some(Self {
            id: id.to_owned(),
            record_key: record_key.to_owned(),
            status,
            url,
            file_path,
            extras,
        })
    }

    /// Library footage (`LF` prefix) never auto-advances past frame
    /// creation; it is parked at `Awaiting User Input` instead.
    pub fn is_library(&self) -> bool {
        self.id.starts_with(LIBRARY_PREFIX)
    }

    /// True when the record carries a usable URL for the scrape step.
    pub fn has_url(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    /// Read an extra field as a string, empty when absent or non-textual.
    pub fn extra_str(&self, key: &str) -> &str {
        self.extras.get(key).and_then(Value::as_str).unwrap_or("")
    }
}

fn str_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

fn non_empty_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    str_field(fields, key).filter(|s| !s.is_empty())
}
