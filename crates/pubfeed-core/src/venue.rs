//! Persistent venue full-name cache.
//!
//! Venue links on an index page point at per-year pages
//! (`db/conf/cvpr/cvpr2022.html`). Every year of a venue shares one
//! **series key** (`db/conf/cvpr/index.html`), and the full name is looked up
//! once per series key: on a miss the series page is fetched, its `<h1>` (or
//! `<title>`) becomes the full name, and the result is remembered. Failed
//! lookups are remembered too, as the abbreviation, so a broken venue page is
//! hit at most once.
//!
//! The mapping lives in a JSON object on disk. It is read once with
//! [`VenueCache::load`] and written back once with
//! [`VenueCache::save_if_modified`], only if something was added.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use thiserror::Error;

use crate::fetch::PageFetcher;
use crate::persist::{to_pretty_json, write_atomic};

/// Pause after every remote lookup, successful or not.
pub const DEFAULT_POLITENESS_DELAY: Duration = Duration::from_secs(1);

/// Request timeout for series pages.
pub const DEFAULT_VENUE_TIMEOUT: Duration = Duration::from_secs(10);

/// Suffix the index site appends to its page titles.
pub const DEFAULT_SITE_SUFFIX: &str = " - dblp";

const SERIES_INDEX: &str = "index.html";

static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static TRAILING_PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^()]*\)$").unwrap());

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed venue map at {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize venue map: {0}")]
    Serialize(serde_json::Error),
}

/// Knobs for remote resolution.
#[derive(Debug, Clone)]
pub struct VenueOptions {
    pub politeness_delay: Duration,
    pub timeout: Option<Duration>,
    /// Stripped from the end of a `<title>` before it is used as a name.
    pub site_suffix: String,
    /// Drop a trailing `(ABBR)` from resolved names.
    pub strip_trailing_abbreviation: bool,
    /// Relative series keys are fetched against this URL.
    pub base_url: Option<Url>,
}

impl Default for VenueOptions {
    fn default() -> Self {
        Self {
            politeness_delay: DEFAULT_POLITENESS_DELAY,
            timeout: Some(DEFAULT_VENUE_TIMEOUT),
            site_suffix: DEFAULT_SITE_SUFFIX.to_string(),
            strip_trailing_abbreviation: false,
            base_url: None,
        }
    }
}

/// Series key → full venue name, with a dirty flag.
#[derive(Debug, Default)]
pub struct VenueCache {
    entries: BTreeMap<String, String>,
    modified: bool,
    options: VenueOptions,
    hits: u64,
    misses: u64,
    remote_fetches: u64,
}

impl VenueCache {
    /// Create an empty cache.
    pub fn new(options: VenueOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Load the mapping persisted at `path`.
    ///
    /// A missing file yields an empty cache; so does an unreadable or
    /// malformed one, after a warning. Never fails.
    pub fn load(path: &Path, options: VenueOptions) -> Self {
        let entries = match read_mapping(path) {
            Ok(Some(entries)) => {
                tracing::info!(path = %path.display(), entries = entries.len(), "loaded venue map");
                entries
            }
            Ok(None) => {
                tracing::debug!(path = %path.display(), "no venue map yet, starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unusable venue map");
                BTreeMap::new()
            }
        };
        Self {
            entries,
            ..Self::new(options)
        }
    }

    /// Cached full name for `key`. Memory only.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Full venue name for an entry.
    ///
    /// Without a venue URL the abbreviation is returned as-is and the cache is
    /// not touched. Otherwise the URL is reduced to its series key and served
    /// from memory when possible, or resolved remotely.
    pub async fn resolve(
        &mut self,
        fetcher: &dyn PageFetcher,
        abbreviation: &str,
        venue_url: Option<&str>,
    ) -> String {
        let Some(url) = venue_url.filter(|u| !u.trim().is_empty()) else {
            return abbreviation.to_string();
        };

        let key = series_key(url);
        if let Some(name) = self.lookup(&key).map(str::to_string) {
            self.hits += 1;
            return name;
        }

        self.misses += 1;
        self.resolve_and_cache(fetcher, abbreviation, &key).await
    }

    /// Fetch the series page for `key`, extract a name and remember it.
    ///
    /// Falls back to `abbreviation` on any failure; the fallback is cached as
    /// well. Sleeps the politeness delay after the request. A key that is
    /// already present is returned without any I/O.
    pub async fn resolve_and_cache(
        &mut self,
        fetcher: &dyn PageFetcher,
        abbreviation: &str,
        key: &str,
    ) -> String {
        if let Some(name) = self.lookup(key) {
            return name.to_string();
        }

        let url = self.fetch_url(key);
        tracing::info!(venue = abbreviation, url = %url, "fetching venue full name");

        self.remote_fetches += 1;
        let resolved = match fetcher.fetch(&url, self.options.timeout).await {
            Ok(body) => {
                let name = extract_full_name(&body, &self.options);
                if name.is_none() {
                    tracing::warn!(venue = abbreviation, url = %url, "no heading or title on venue page");
                }
                name
            }
            Err(e) => {
                tracing::warn!(venue = abbreviation, error = %e, "failed to fetch venue page");
                None
            }
        };

        let name = resolved.unwrap_or_else(|| abbreviation.to_string());
        self.entries.insert(key.to_string(), name.clone());
        self.modified = true;

        if !self.options.politeness_delay.is_zero() {
            tokio::time::sleep(self.options.politeness_delay).await;
        }

        name
    }

    /// Write the mapping to `path` if anything was added since load.
    /// Returns whether a write happened.
    pub fn save_if_modified(&mut self, path: &Path) -> Result<bool, CacheError> {
        if !self.modified {
            return Ok(false);
        }
        let bytes = to_pretty_json(&self.entries).map_err(CacheError::Serialize)?;
        write_atomic(path, &bytes)?;
        self.modified = false;
        tracing::info!(path = %path.display(), entries = self.entries.len(), "venue map updated and saved");
        Ok(true)
    }

    /// The URL actually requested for `key`.
    fn fetch_url(&self, key: &str) -> String {
        if Url::parse(key).is_ok() {
            return key.to_string();
        }
        match &self.options.base_url {
            Some(base) => base
                .join(key)
                .map(String::from)
                .unwrap_or_else(|_| key.to_string()),
            None => key.to_string(),
        }
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Number of series pages requested over the network.
    pub fn remote_fetches(&self) -> u64 {
        self.remote_fetches
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn options(&self) -> &VenueOptions {
        &self.options
    }
}

/// `Ok(None)` when the file does not exist.
fn read_mapping(path: &Path) -> Result<Option<BTreeMap<String, String>>, CacheError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| CacheError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

/// Reduce a per-year venue URL to the series page shared by all years.
///
/// `db/conf/cvpr/cvpr2022.html#Foo22` becomes `db/conf/cvpr/index.html`.
/// URLs with no path segment to replace are returned unchanged.
pub fn series_key(venue_url: &str) -> String {
    let path = venue_url.split(['#', '?']).next().unwrap_or(venue_url);
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() && !parent.ends_with('/') => {
            format!("{parent}/{SERIES_INDEX}")
        }
        _ => venue_url.to_string(),
    }
}

/// Pull a human-readable venue name out of a series page.
///
/// Prefers the first `<h1>`; falls back to `<title>` minus the site suffix.
pub fn extract_full_name(html: &str, options: &VenueOptions) -> Option<String> {
    let document = Html::parse_document(html);

    let heading = document
        .select(&H1)
        .next()
        .map(|h| h.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let name = heading.or_else(|| {
        let title = document.select(&TITLE).next()?;
        let text = title.text().collect::<String>();
        let text = text.trim();
        let text = text
            .strip_suffix(options.site_suffix.as_str())
            .unwrap_or(text)
            .trim();
        (!text.is_empty()).then(|| text.to_string())
    })?;

    if options.strip_trailing_abbreviation {
        let stripped = TRAILING_PARENTHETICAL.replace(&name, "");
        if !stripped.is_empty() {
            return Some(stripped.into_owned());
        }
    }
    Some(name)
}
