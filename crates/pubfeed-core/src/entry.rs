//! Extraction of publication entries from a DBLP person page.
//!
//! Each `li.entry` node is read independently. Structural gaps (no title, no
//! link block, no venue) degrade to empty values; only a missing entry id
//! rejects an entry, and then only that entry.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::EntryType;

/// Title used when an entry has no title element.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

static ENTRY: Lazy<Selector> = Lazy::new(|| Selector::parse("li.entry").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("span.title").unwrap());
static AUTHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"span[itemprop="author"]"#).unwrap());
static DATE_PUBLISHED: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"span[itemprop="datePublished"]"#).unwrap());
static IS_PART_OF: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"span[itemprop="isPartOf"]"#).unwrap());
static NAV_PUBL: Lazy<Selector> = Lazy::new(|| Selector::parse("nav.publ").unwrap());
static DROP_DOWN: Lazy<Selector> = Lazy::new(|| Selector::parse("li.drop-down").unwrap());
static HEAD: Lazy<Selector> = Lazy::new(|| Selector::parse("div.head").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());

/// Path fragments that identify a venue page link.
const VENUE_PATHS: [&str; 2] = ["db/conf/", "db/journals/"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("entry #{position} has no id attribute")]
    MissingId { position: usize },
}

/// Fields of one entry as they appear on the index page, before venue
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: String,
    pub link: String,
    pub entry_type: EntryType,
    pub venue_abbr: String,
    pub venue_url: Option<String>,
}

/// Counts of entries that could not be turned into records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipStats {
    pub missing_id: usize,
    pub total_raw: usize,
}

impl SkipStats {
    pub fn skipped(&self) -> usize {
        self.missing_id
    }
}

/// Result of extracting entries from an index page.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub entries: Vec<RawEntry>,
    pub skip_stats: SkipStats,
}

/// Extract every entry on the page, in document order.
pub fn parse_index(html: &str) -> ExtractionResult {
    let document = Html::parse_document(html);
    let mut result = ExtractionResult::default();

    for (position, element) in document.select(&ENTRY).enumerate() {
        result.skip_stats.total_raw += 1;
        match parse_entry(element, position) {
            Ok(entry) => result.entries.push(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping entry");
                match e {
                    EntryError::MissingId { .. } => result.skip_stats.missing_id += 1,
                }
            }
        }
    }

    result
}

/// Extract one `li.entry` element. `position` is only used for diagnostics.
pub fn parse_entry(entry: ElementRef<'_>, position: usize) -> Result<RawEntry, EntryError> {
    let id = entry
        .value()
        .attr("id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(EntryError::MissingId { position })?
        .to_string();

    let (venue_abbr, venue_url) = extract_venue(entry);

    Ok(RawEntry {
        id,
        title: extract_title(entry),
        authors: entry.select(&AUTHOR).map(text_of).collect(),
        year: entry
            .select(&DATE_PUBLISHED)
            .next()
            .map(text_of)
            .unwrap_or_default(),
        link: extract_link(entry),
        entry_type: classify(entry),
        venue_abbr,
        venue_url,
    })
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn extract_title(entry: ElementRef<'_>) -> String {
    let Some(span) = entry.select(&TITLE).next() else {
        return UNKNOWN_TITLE.to_string();
    };
    let mut title = text_of(span);
    if title.ends_with('.') {
        title.pop();
    }
    title
}

/// `nav.publ > li.drop-down > div.head > a[href]`, each step optional.
fn extract_link(entry: ElementRef<'_>) -> String {
    entry
        .select(&NAV_PUBL)
        .next()
        .and_then(|nav| nav.select(&DROP_DOWN).next())
        .and_then(|li| li.select(&HEAD).next())
        .and_then(|head| head.select(&ANCHOR).next())
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
        .unwrap_or_default()
}

fn classify(entry: ElementRef<'_>) -> EntryType {
    let has = |class: &str| entry.value().classes().any(|c| c == class);
    if has("article") {
        EntryType::Journal
    } else if has("inproceedings") {
        EntryType::Conference
    } else if has("informal") {
        EntryType::Preprint
    } else {
        EntryType::Unknown
    }
}

/// Venue abbreviation plus the best link to its page.
///
/// The link wrapping the venue label wins; otherwise the first venue-looking
/// link anywhere in the entry.
fn extract_venue(entry: ElementRef<'_>) -> (String, Option<String>) {
    let span = entry.select(&IS_PART_OF).next();
    let abbr = span.map(text_of).unwrap_or_default();

    let wrapping_link = span.and_then(|s| {
        s.ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "a")
    });

    let url = match wrapping_link {
        Some(a) => a.value().attr("href").map(str::to_string),
        None => entry
            .select(&ANCHOR)
            .filter_map(|a| a.value().attr("href"))
            .find(|href| VENUE_PATHS.iter().any(|p| href.contains(p)))
            .map(str::to_string),
    };

    (abbr, url)
}
