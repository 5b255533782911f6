//! One refresh of the publication feed: fetch the index page, extract its
//! entries, optionally resolve venue names, write the snapshot and persist
//! any newly learned venue names.
//!
//! Entries are handled strictly one after another so every venue lookup sees
//! the results of the ones before it.

use reqwest::Url;

use crate::entry::{SkipStats, parse_index};
use crate::fetch::PageFetcher;
use crate::snapshot::write_snapshot;
use crate::venue::{VenueCache, VenueOptions};
use crate::{Config, PublicationRecord, PubfeedError};

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records that made it into the snapshot.
    pub records: usize,
    pub skip_stats: SkipStats,
    /// Series pages requested over the network.
    pub venue_fetches: u64,
    pub venue_hits: u64,
    pub snapshot_written: bool,
    pub venue_map_saved: bool,
}

/// Run the whole pipeline once.
///
/// A failed index fetch ends the run before anything is written. A failed
/// snapshot write does not prevent the venue map from being saved; the first
/// error encountered is returned after both have been attempted.
pub async fn run(config: &Config, fetcher: &dyn PageFetcher) -> Result<RunSummary, PubfeedError> {
    let mut venues = config
        .enrich_venues
        .then(|| VenueCache::load(&config.venue_map_path, venue_options(config)));

    tracing::info!(url = %config.index_url, "fetching publication list");
    let body = fetcher
        .fetch(&config.index_url, config.index_timeout)
        .await?;

    let extraction = parse_index(&body);
    tracing::info!(
        entries = extraction.entries.len(),
        skipped = extraction.skip_stats.skipped(),
        "parsed publication list"
    );

    let mut summary = RunSummary {
        skip_stats: extraction.skip_stats,
        ..RunSummary::default()
    };

    let mut records = Vec::with_capacity(extraction.entries.len());
    for entry in extraction.entries {
        let venue = match venues.as_mut() {
            Some(cache) => {
                cache
                    .resolve(fetcher, &entry.venue_abbr, entry.venue_url.as_deref())
                    .await
            }
            None => entry.venue_abbr.clone(),
        };
        records.push(PublicationRecord::from_entry(entry, venue));
    }
    summary.records = records.len();

    let mut failure: Option<PubfeedError> = None;

    if records.is_empty() && config.skip_if_empty {
        tracing::warn!(path = %config.output_path.display(), "no publications found, keeping previous snapshot");
    } else {
        match write_snapshot(&records, &config.output_path, &config.snapshot) {
            Ok(()) => summary.snapshot_written = true,
            Err(e) => {
                tracing::error!(path = %config.output_path.display(), error = %e, "failed to write snapshot");
                failure = Some(e.into());
            }
        }
    }

    if let Some(cache) = venues.as_mut() {
        summary.venue_fetches = cache.remote_fetches();
        summary.venue_hits = cache.hits();
        match cache.save_if_modified(&config.venue_map_path) {
            Ok(saved) => summary.venue_map_saved = saved,
            Err(e) => {
                tracing::error!(path = %config.venue_map_path.display(), error = %e, "failed to save venue map");
                failure.get_or_insert(e.into());
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(summary),
    }
}

/// Venue options with the base URL defaulting to the index page's origin.
fn venue_options(config: &Config) -> VenueOptions {
    let mut options = config.venue.clone();
    if options.base_url.is_none() {
        options.base_url = Url::parse(&config.index_url)
            .and_then(|u| u.join("/"))
            .ok();
    }
    options
}
