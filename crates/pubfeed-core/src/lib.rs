use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config_file;
pub mod entry;
pub mod fetch;
pub mod persist;
pub mod pipeline;
pub mod snapshot;
pub mod venue;

// Re-export for convenience
pub use entry::{EntryError, ExtractionResult, RawEntry, SkipStats, parse_index};
pub use fetch::{FetchError, HttpFetcher, PageFetcher};
pub use pipeline::{RunSummary, run};
pub use snapshot::{SnapshotError, SnapshotLayout, SnapshotOptions, write_snapshot};
pub use venue::{CacheError, VenueCache, VenueOptions, series_key};

/// Person page scraped when nothing else is configured.
pub const DEFAULT_INDEX_URL: &str = "https://dblp.org/pid/50/6579.html";
pub const DEFAULT_OUTPUT_PATH: &str = "assets/data/auto-publications.json";
pub const DEFAULT_VENUE_MAP_PATH: &str = "assets/data/venue_map.json";

/// Publication kind, derived from the entry's class list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    Journal,
    Conference,
    #[serde(rename = "Preprint/Workshop")]
    Preprint,
    #[serde(rename = "unknown")]
    Unknown,
}

/// One publication as written to the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    /// Full venue name, or the abbreviation when it could not be resolved.
    pub venue: String,
    #[serde(default)]
    pub venue_abbr: String,
    pub year: String,
    pub link: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

impl PublicationRecord {
    pub fn from_entry(entry: RawEntry, venue: String) -> Self {
        Self {
            id: entry.id,
            title: entry.title,
            authors: entry.authors,
            venue,
            venue_abbr: entry.venue_abbr,
            year: entry.year,
            link: entry.link,
            entry_type: entry.entry_type,
        }
    }
}

#[derive(Error, Debug)]
pub enum PubfeedError {
    #[error("failed to fetch publication list: {0}")]
    Fetch(#[from] FetchError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("venue map error: {0}")]
    Cache(#[from] CacheError),
}

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub index_url: String,
    /// `None` leaves the index request to the client's defaults.
    pub index_timeout: Option<Duration>,
    pub output_path: PathBuf,
    pub venue_map_path: PathBuf,
    /// Resolve venue abbreviations to full names.
    pub enrich_venues: bool,
    pub venue: VenueOptions,
    pub snapshot: SnapshotOptions,
    /// Leave the previous snapshot alone when no entries were found.
    pub skip_if_empty: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            index_timeout: None,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            venue_map_path: PathBuf::from(DEFAULT_VENUE_MAP_PATH),
            enrich_venues: true,
            venue: VenueOptions::default(),
            snapshot: SnapshotOptions::default(),
            skip_if_empty: false,
        }
    }
}
