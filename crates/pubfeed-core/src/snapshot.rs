//! JSON snapshot of one run's publication list.

use std::path::Path;
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use serde::Serialize;
use thiserror::Error;

use crate::persist::{to_pretty_json, write_atomic};
use crate::{EntryType, PublicationRecord};

/// `last_updated` with time of day.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `last_updated` as a bare date.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Which optional fields the snapshot carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub include_total_count: bool,
    pub include_venue_abbr: bool,
    /// `chrono` format string for `last_updated`.
    pub timestamp_format: String,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            include_total_count: true,
            include_venue_abbr: true,
            timestamp_format: DATETIME_FORMAT.to_string(),
        }
    }
}

impl SnapshotOptions {
    /// Date stamp, `venue_abbr` kept, no `total_count`.
    pub fn enriched() -> Self {
        Self {
            include_total_count: false,
            include_venue_abbr: true,
            timestamp_format: DATE_FORMAT.to_string(),
        }
    }

    /// Date-time stamp, `total_count`, no `venue_abbr`.
    pub fn plain() -> Self {
        Self {
            include_total_count: true,
            include_venue_abbr: false,
            timestamp_format: DATETIME_FORMAT.to_string(),
        }
    }
}

/// Named presets for [`SnapshotOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotLayout {
    /// Both optional fields, date-time stamp.
    #[default]
    Full,
    Enriched,
    Plain,
}

impl SnapshotLayout {
    pub fn options(self) -> SnapshotOptions {
        match self {
            SnapshotLayout::Full => SnapshotOptions::default(),
            SnapshotLayout::Enriched => SnapshotOptions::enriched(),
            SnapshotLayout::Plain => SnapshotOptions::plain(),
        }
    }
}

impl FromStr for SnapshotLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(SnapshotLayout::Full),
            "enriched" => Ok(SnapshotLayout::Enriched),
            "plain" => Ok(SnapshotLayout::Plain),
            other => Err(format!(
                "unknown snapshot layout '{other}' (expected full, enriched or plain)"
            )),
        }
    }
}

#[derive(Serialize)]
struct SnapshotDocument<'a> {
    last_updated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_count: Option<usize>,
    publications: Vec<RecordView<'a>>,
}

#[derive(Serialize)]
struct RecordView<'a> {
    id: &'a str,
    title: &'a str,
    authors: &'a [String],
    venue: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    venue_abbr: Option<&'a str>,
    year: &'a str,
    link: &'a str,
    #[serde(rename = "type")]
    entry_type: EntryType,
}

/// Render the snapshot document without touching the filesystem.
pub fn render_snapshot(
    records: &[PublicationRecord],
    options: &SnapshotOptions,
) -> Result<Vec<u8>, SnapshotError> {
    let document = SnapshotDocument {
        last_updated: timestamp(&options.timestamp_format),
        total_count: options.include_total_count.then_some(records.len()),
        publications: records
            .iter()
            .map(|r| RecordView {
                id: &r.id,
                title: &r.title,
                authors: &r.authors,
                venue: &r.venue,
                venue_abbr: options
                    .include_venue_abbr
                    .then_some(r.venue_abbr.as_str()),
                year: &r.year,
                link: &r.link,
                entry_type: r.entry_type,
            })
            .collect(),
    };
    Ok(to_pretty_json(&document)?)
}

/// Current local time in `format`, or in [`DATETIME_FORMAT`] if `format` is
/// not a valid strftime string.
fn timestamp(format: &str) -> String {
    let valid = StrftimeItems::new(format).all(|item| !matches!(item, Item::Error));
    let format = if valid {
        format
    } else {
        tracing::warn!(format, "invalid timestamp format, using default");
        DATETIME_FORMAT
    };
    chrono::Local::now().format(format).to_string()
}

/// Write the snapshot to `path`, replacing whatever was there.
pub fn write_snapshot(
    records: &[PublicationRecord],
    path: &Path,
    options: &SnapshotOptions,
) -> Result<(), SnapshotError> {
    let bytes = render_snapshot(records, options)?;
    write_atomic(path, &bytes)?;
    tracing::info!(path = %path.display(), count = records.len(), "saved snapshot");
    Ok(())
}
