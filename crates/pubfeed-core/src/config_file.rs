use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::Config;
use crate::snapshot::SnapshotLayout;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub source: Option<SourceConfig>,
    pub venues: Option<VenuesConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub index_url: Option<String>,
    pub index_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VenuesConfig {
    pub enabled: Option<bool>,
    pub map_path: Option<String>,
    pub timeout_secs: Option<u64>,
    pub delay_ms: Option<u64>,
    pub site_suffix: Option<String>,
    pub strip_trailing_abbreviation: Option<bool>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: Option<String>,
    /// `full`, `enriched` or `plain`.
    pub layout: Option<String>,
    pub include_total_count: Option<bool>,
    pub include_venue_abbr: Option<bool>,
    pub timestamp_format: Option<String>,
    pub skip_if_empty: Option<bool>,
}

/// Platform config directory path: `<config_dir>/pubfeed/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pubfeed").join("config.toml"))
}

/// Load config by cascading CWD `.pubfeed.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".pubfeed.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// `overlay.section.field`, else `base.section.field`.
macro_rules! pick {
    ($base:expr, $overlay:expr, $field:ident) => {
        $overlay
            .as_ref()
            .and_then(|s| s.$field.clone())
            .or_else(|| $base.as_ref().and_then(|s| s.$field.clone()))
    };
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        source: Some(SourceConfig {
            index_url: pick!(base.source, overlay.source, index_url),
            index_timeout_secs: pick!(base.source, overlay.source, index_timeout_secs),
        }),
        venues: Some(VenuesConfig {
            enabled: pick!(base.venues, overlay.venues, enabled),
            map_path: pick!(base.venues, overlay.venues, map_path),
            timeout_secs: pick!(base.venues, overlay.venues, timeout_secs),
            delay_ms: pick!(base.venues, overlay.venues, delay_ms),
            site_suffix: pick!(base.venues, overlay.venues, site_suffix),
            strip_trailing_abbreviation: pick!(
                base.venues,
                overlay.venues,
                strip_trailing_abbreviation
            ),
            base_url: pick!(base.venues, overlay.venues, base_url),
        }),
        output: Some(OutputConfig {
            path: pick!(base.output, overlay.output, path),
            layout: pick!(base.output, overlay.output, layout),
            include_total_count: pick!(base.output, overlay.output, include_total_count),
            include_venue_abbr: pick!(base.output, overlay.output, include_venue_abbr),
            timestamp_format: pick!(base.output, overlay.output, timestamp_format),
            skip_if_empty: pick!(base.output, overlay.output, skip_if_empty),
        }),
    }
}

/// Apply the values present in `file` on top of `config`.
///
/// An unknown layout name or an unparseable base URL is logged and ignored.
pub fn apply(file: &ConfigFile, mut config: Config) -> Config {
    if let Some(source) = &file.source {
        if let Some(url) = &source.index_url {
            config.index_url = url.clone();
        }
        if let Some(secs) = source.index_timeout_secs {
            config.index_timeout = Some(Duration::from_secs(secs));
        }
    }

    if let Some(venues) = &file.venues {
        if let Some(enabled) = venues.enabled {
            config.enrich_venues = enabled;
        }
        if let Some(path) = &venues.map_path {
            config.venue_map_path = PathBuf::from(path);
        }
        if let Some(secs) = venues.timeout_secs {
            config.venue.timeout = Some(Duration::from_secs(secs));
        }
        if let Some(ms) = venues.delay_ms {
            config.venue.politeness_delay = Duration::from_millis(ms);
        }
        if let Some(suffix) = &venues.site_suffix {
            config.venue.site_suffix = suffix.clone();
        }
        if let Some(strip) = venues.strip_trailing_abbreviation {
            config.venue.strip_trailing_abbreviation = strip;
        }
        if let Some(base) = &venues.base_url {
            match Url::parse(base) {
                Ok(url) => config.venue.base_url = Some(url),
                Err(e) => tracing::warn!(base_url = %base, error = %e, "ignoring invalid venue base URL"),
            }
        }
    }

    if let Some(output) = &file.output {
        if let Some(path) = &output.path {
            config.output_path = PathBuf::from(path);
        }
        if let Some(layout) = &output.layout {
            match layout.parse::<SnapshotLayout>() {
                Ok(layout) => config.snapshot = layout.options(),
                Err(e) => tracing::warn!(error = %e, "ignoring snapshot layout"),
            }
        }
        if let Some(include) = output.include_total_count {
            config.snapshot.include_total_count = include;
        }
        if let Some(include) = output.include_venue_abbr {
            config.snapshot.include_venue_abbr = include;
        }
        if let Some(format) = &output.timestamp_format {
            config.snapshot.timestamp_format = format.clone();
        }
        if let Some(skip) = output.skip_if_empty {
            config.skip_if_empty = skip;
        }
    }

    config
}
