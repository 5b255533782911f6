//! End-to-end runs of the pipeline against a [`MockFetcher`].
//!
//! Every test points the index URL at `https://dblp.test/` so relative venue
//! links resolve to `https://dblp.test/db/...`. Politeness delays are zeroed
//! unless the test is about the delay.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use pubfeed_core::fetch::{MockFetcher, MockResponse};
use pubfeed_core::{Config, PubfeedError, SnapshotOptions, VenueCache, VenueOptions, run};
use serde_json::Value;

const INDEX_URL: &str = "https://dblp.test/pid/00/0000.html";
const CVPR_SERIES: &str = "https://dblp.test/db/conf/cvpr/index.html";
const CVPR_HEADING: &str = "IEEE Conference on Computer Vision and Pattern Recognition";

fn cvpr_entry(id: &str, year: &str) -> String {
    format!(
        r#"<li class="entry inproceedings" id="{id}">
             <nav class="publ"><ul><li class="drop-down"><div class="head">
               <a href="https://doi.org/10.1/{id}">ee</a>
             </div></li></ul></nav>
             <cite class="data">
               <span itemprop="author"><a><span itemprop="name">Jane Doe</span></a></span>:
               <span class="title" itemprop="name">A Study on X.</span>
               <a href="db/conf/cvpr/cvpr{year}.html"><span itemprop="isPartOf"><span itemprop="name">CVPR</span></span></a>
               <span itemprop="datePublished">{year}</span>
             </cite>
           </li>"#
    )
}

fn index_page(entries: &[String]) -> String {
    format!(
        "<html><head><title>Jane Doe - dblp</title></head><body><ul class=\"publ-list\">{}</ul></body></html>",
        entries.concat()
    )
}

fn config_in(dir: &Path) -> Config {
    Config {
        index_url: INDEX_URL.to_string(),
        output_path: dir.join("data").join("publications.json"),
        venue_map_path: dir.join("data").join("venue_map.json"),
        venue: VenueOptions {
            politeness_delay: Duration::ZERO,
            ..VenueOptions::default()
        },
        ..Config::default()
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn cvpr_entry_resolves_full_venue_name() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let fetcher = MockFetcher::new(MockResponse::Status(404))
        .with_route(INDEX_URL, MockResponse::page(index_page(&[cvpr_entry("abc:2022", "2022")])))
        .with_route(
            CVPR_SERIES,
            MockResponse::page(format!("<html><body><h1>{CVPR_HEADING}</h1></body></html>")),
        );

    let summary = run(&config, &fetcher).await.unwrap();
    assert_eq!(summary.records, 1);
    assert_eq!(summary.venue_fetches, 1);
    assert!(summary.snapshot_written);
    assert!(summary.venue_map_saved);

    let doc = read_json(&config.output_path);
    let publication = &doc["publications"][0];
    assert_eq!(publication["id"], "abc:2022");
    assert_eq!(publication["title"], "A Study on X");
    assert_eq!(publication["authors"], serde_json::json!(["Jane Doe"]));
    assert_eq!(publication["type"], "Conference");
    assert_eq!(publication["venue"], CVPR_HEADING);
    assert_eq!(publication["venue_abbr"], "CVPR");
    assert_eq!(publication["year"], "2022");
    assert_eq!(publication["link"], "https://doi.org/10.1/abc:2022");

    let map: BTreeMap<String, String> =
        serde_json::from_value(read_json(&config.venue_map_path)).unwrap();
    assert_eq!(map.get("db/conf/cvpr/index.html").map(String::as_str), Some(CVPR_HEADING));
}

#[tokio::test]
async fn failed_venue_lookup_falls_back_and_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let fetcher = MockFetcher::new(MockResponse::Status(503)).with_route(
        INDEX_URL,
        MockResponse::page(index_page(&[
            cvpr_entry("abc:2022", "2022"),
            cvpr_entry("abc:2022b", "2022"),
        ])),
    );

    let summary = run(&config, &fetcher).await.unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(fetcher.calls_to(CVPR_SERIES), 1);
    assert_eq!(summary.venue_hits, 1);

    let doc = read_json(&config.output_path);
    assert_eq!(doc["publications"][0]["venue"], "CVPR");
    assert_eq!(doc["publications"][1]["venue"], "CVPR");

    let map = read_json(&config.venue_map_path);
    assert_eq!(map["db/conf/cvpr/index.html"], "CVPR");
}

#[tokio::test]
async fn one_fetch_per_series_across_years() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let entries: Vec<String> = ["2019", "2020", "2021", "2022"]
        .iter()
        .map(|y| cvpr_entry(&format!("p:{y}"), y))
        .collect();
    let fetcher = MockFetcher::new(MockResponse::Status(404))
        .with_route(INDEX_URL, MockResponse::page(index_page(&entries)))
        .with_route(CVPR_SERIES, MockResponse::page(format!("<h1>{CVPR_HEADING}</h1>")));

    let summary = run(&config, &fetcher).await.unwrap();
    assert_eq!(summary.records, 4);
    assert_eq!(summary.venue_fetches, 1);
    assert_eq!(fetcher.call_count(), 2);
}

#[tokio::test]
async fn second_run_uses_persisted_map() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let page = index_page(&[cvpr_entry("abc:2022", "2022")]);

    let first = MockFetcher::new(MockResponse::Status(404))
        .with_route(INDEX_URL, MockResponse::page(page.clone()))
        .with_route(CVPR_SERIES, MockResponse::page(format!("<h1>{CVPR_HEADING}</h1>")));
    run(&config, &first).await.unwrap();

    let second = MockFetcher::new(MockResponse::Status(404))
        .with_route(INDEX_URL, MockResponse::page(page));
    let summary = run(&config, &second).await.unwrap();

    assert_eq!(second.calls(), vec![INDEX_URL]);
    assert_eq!(summary.venue_fetches, 0);
    assert!(!summary.venue_map_saved);
    assert_eq!(read_json(&config.output_path)["publications"][0]["venue"], CVPR_HEADING);
}

#[tokio::test]
async fn enrichment_disabled_makes_no_venue_requests() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        enrich_venues: false,
        snapshot: SnapshotOptions::plain(),
        ..config_in(dir.path())
    };
    let fetcher = MockFetcher::new(MockResponse::page("<h1>never used</h1>")).with_route(
        INDEX_URL,
        MockResponse::page(index_page(&[cvpr_entry("abc:2022", "2022")])),
    );

    let summary = run(&config, &fetcher).await.unwrap();
    assert_eq!(fetcher.call_count(), 1);
    assert!(!summary.venue_map_saved);
    assert!(!config.venue_map_path.exists());

    let doc = read_json(&config.output_path);
    assert_eq!(doc["total_count"], 1);
    assert_eq!(doc["publications"][0]["venue"], "CVPR");
    assert!(doc["publications"][0].get("venue_abbr").is_none());
}

#[tokio::test]
async fn index_fetch_failure_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let fetcher = MockFetcher::new(MockResponse::Transport("dns failure".into()));

    let err = run(&config, &fetcher).await.unwrap_err();
    assert!(matches!(err, PubfeedError::Fetch(_)));
    assert!(!config.output_path.exists());
    assert!(!config.venue_map_path.exists());
}

#[tokio::test]
async fn index_fetch_has_no_timeout_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let fetcher = MockFetcher::new(MockResponse::page(index_page(&[])));

    run(&config, &fetcher).await.unwrap();
    assert_eq!(fetcher.timeout_for(INDEX_URL), Some(None));
}

#[tokio::test]
async fn malformed_entry_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let broken = r#"<li class="entry article"><span class="title">No id.</span></li>"#.to_string();
    let fetcher = MockFetcher::new(MockResponse::page(format!("<h1>{CVPR_HEADING}</h1>")))
        .with_route(
            INDEX_URL,
            MockResponse::page(index_page(&[broken, cvpr_entry("abc:2022", "2022")])),
        );

    let summary = run(&config, &fetcher).await.unwrap();
    assert_eq!(summary.records, 1);
    assert_eq!(summary.skip_stats.missing_id, 1);
    assert_eq!(summary.skip_stats.total_raw, 2);
}

#[tokio::test]
async fn empty_page_writes_empty_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let fetcher = MockFetcher::new(MockResponse::page(index_page(&[])));

    let summary = run(&config, &fetcher).await.unwrap();
    assert!(summary.snapshot_written);

    let doc = read_json(&config.output_path);
    assert_eq!(doc["total_count"], 0);
    assert_eq!(doc["publications"], serde_json::json!([]));
    assert!(doc["last_updated"].is_string());
}

#[tokio::test]
async fn skip_if_empty_keeps_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        skip_if_empty: true,
        ..config_in(dir.path())
    };
    std::fs::create_dir_all(config.output_path.parent().unwrap()).unwrap();
    std::fs::write(&config.output_path, "previous").unwrap();
    let fetcher = MockFetcher::new(MockResponse::page(index_page(&[])));

    let summary = run(&config, &fetcher).await.unwrap();
    assert!(!summary.snapshot_written);
    assert_eq!(std::fs::read_to_string(&config.output_path).unwrap(), "previous");
}

#[tokio::test]
async fn snapshot_failure_still_saves_venue_map() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    let config = Config {
        output_path: blocker.join("publications.json"),
        ..config_in(dir.path())
    };
    let fetcher = MockFetcher::new(MockResponse::page(format!("<h1>{CVPR_HEADING}</h1>")))
        .with_route(
            INDEX_URL,
            MockResponse::page(index_page(&[cvpr_entry("abc:2022", "2022")])),
        );

    let err = run(&config, &fetcher).await.unwrap_err();
    assert!(matches!(err, PubfeedError::Snapshot(_)));

    let reloaded = VenueCache::load(&config.venue_map_path, VenueOptions::default());
    assert_eq!(reloaded.lookup("db/conf/cvpr/index.html"), Some(CVPR_HEADING));
}

#[tokio::test]
async fn corrupted_venue_map_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    std::fs::create_dir_all(config.venue_map_path.parent().unwrap()).unwrap();
    std::fs::write(&config.venue_map_path, "{\"truncated\": ").unwrap();
    let fetcher = MockFetcher::new(MockResponse::page(format!("<h1>{CVPR_HEADING}</h1>")))
        .with_route(
            INDEX_URL,
            MockResponse::page(index_page(&[cvpr_entry("abc:2022", "2022")])),
        );

    let summary = run(&config, &fetcher).await.unwrap();
    assert!(summary.venue_map_saved);

    let map = read_json(&config.venue_map_path);
    assert_eq!(map.as_object().unwrap().len(), 1);
    assert_eq!(map["db/conf/cvpr/index.html"], CVPR_HEADING);
}

#[tokio::test(start_paused = true)]
async fn politeness_delay_applies_per_remote_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        venue: VenueOptions::default(),
        ..config_in(dir.path())
    };
    let entries = vec![
        cvpr_entry("a:2021", "2021"),
        cvpr_entry("a:2022", "2022"),
    ];
    let fetcher = MockFetcher::new(MockResponse::page(format!("<h1>{CVPR_HEADING}</h1>")))
        .with_route(INDEX_URL, MockResponse::page(index_page(&entries)));

    let start = tokio::time::Instant::now();
    run(&config, &fetcher).await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2));
}
