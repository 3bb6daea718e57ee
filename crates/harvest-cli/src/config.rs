//! TOML configuration file schema and parsing.
//!
//! Every section is optional; an empty file reproduces the built-in defaults.
//!
//! ```toml
//! [run]
//! log_format = "json"
//! max_concurrent_sessions = 3
//! probe_timeout_ms = 8000
//!
//! [browser]
//! headless = true
//! executable = "/usr/bin/chromium"
//!
//! [driver]
//! settle_ms = 2000
//! click_attempts = 4
//!
//! [matches]
//! output = "out/StreamedSU.m3u8"
//! epg_url = "https://epg.example/guide.xml"
//!
//! [[matches.category]]
//! name = "Basketball"
//! tvg_id = "Basketball.Dummy.us"
//! logo = "http://logos.example/Basketball.png"
//!
//! [channels]
//! playlist = "TheTVApp.m3u8"
//! channel_groups = ["TV"]
//! slots = "per_tier"
//!
//! [[channels.section]]
//! path = "/nba"
//! group = "NBA"
//!
//! [[channels.section]]
//! path = "/ppv"
//! group = "PPV"
//! tvg_id = "PPV.EVENTS.Dummy.us"
//! logo = "http://logos.example/PPV.png"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use harvest_core::catalog::listing::DEFAULT_ANCHOR_SELECTOR;
use harvest_core::{
    ApiCategory, BrowserOptions, ChannelSlots, DriverConfig, ListingSection, ResolverConfig,
};

const LOGO_BASE: &str = "http://drewlive24.duckdns.org:9000/Logos";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub browser: BrowserSection,

    #[serde(default)]
    pub driver: DriverSection,

    #[serde(default)]
    pub matches: MatchesSection,

    #[serde(default)]
    pub channels: ChannelsSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_catalog_timeout_ms")]
    pub catalog_timeout_ms: u64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            max_concurrent_sessions: default_max_concurrent_sessions(),
            probe_timeout_ms: default_probe_timeout_ms(),
            catalog_timeout_ms: default_catalog_timeout_ms(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_max_concurrent_sessions() -> usize {
    2
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

fn default_catalog_timeout_ms() -> u64 {
    20_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSection {
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default)]
    pub executable: Option<PathBuf>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl BrowserSection {
    pub fn to_browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.headless,
            executable: self.executable.clone(),
        }
    }
}

/// Overrides for the per-attempt interaction budget. Unset fields keep the
/// library defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverSection {
    pub navigation_timeout_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    pub trigger_timeout_ms: Option<u64>,
    pub click_attempts: Option<u32>,
    pub click_interval_ms: Option<u64>,
    pub attempt_deadline_ms: Option<u64>,
}

impl DriverSection {
    pub fn to_driver_config(&self) -> DriverConfig {
        let mut c = DriverConfig::default();
        if let Some(v) = self.navigation_timeout_ms {
            c = c.with_navigation_timeout(v);
        }
        if let Some(v) = self.settle_ms {
            c = c.with_settle(v);
        }
        if let Some(v) = self.trigger_timeout_ms {
            c = c.with_trigger_timeout(v);
        }
        if let Some(v) = self.click_attempts {
            c = c.with_click_attempts(v);
        }
        if let Some(v) = self.click_interval_ms {
            c = c.with_click_interval(v);
        }
        if let Some(v) = self.attempt_deadline_ms {
            c = c.with_attempt_deadline(v);
        }
        c
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchesSection {
    #[serde(default = "default_matches_base_url")]
    pub base_url: String,

    #[serde(default = "default_matches_output")]
    pub output: PathBuf,

    #[serde(default)]
    pub epg_url: Option<String>,

    #[serde(default = "default_group_prefix")]
    pub group_prefix: String,

    #[serde(default = "default_categories", rename = "category")]
    pub categories: Vec<ApiCategory>,
}

impl Default for MatchesSection {
    fn default() -> Self {
        Self {
            base_url: default_matches_base_url(),
            output: default_matches_output(),
            epg_url: None,
            group_prefix: default_group_prefix(),
            categories: default_categories(),
        }
    }
}

fn default_matches_base_url() -> String {
    "https://streamed.su".into()
}

fn default_matches_output() -> PathBuf {
    PathBuf::from("StreamedSU.m3u8")
}

fn default_group_prefix() -> String {
    "StreamedSU".into()
}

fn default_categories() -> Vec<ApiCategory> {
    [
        ("Basketball", "Basketball.Dummy.us", "Basketball.png"),
        ("Football", "Soccer.Dummy.us", "Football2.png"),
        ("American Football", "Football.Dummy.us", "Am-Football.png"),
        ("Baseball", "Baseball.Dummy.us", "Baseball.png"),
        ("Motor Sports", "Racing.Dummy.us", "Motorsports2.png"),
        ("Fight (UFC, Boxing)", "PPV.EVENTS.Dummy.us", "CombatSports2.png"),
        ("Other", "PPV.EVENTS.Dummy.us", "PPV.png"),
    ]
    .into_iter()
    .map(|(name, tvg_id, logo)| ApiCategory::new(name, tvg_id, &format!("{LOGO_BASE}/{logo}")))
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsSection {
    #[serde(default = "default_channels_base_url")]
    pub base_url: String,

    #[serde(default = "default_playlist")]
    pub playlist: PathBuf,

    #[serde(default = "default_epg_url")]
    pub epg_url: String,

    #[serde(default = "default_list_path")]
    pub list_path: String,

    /// Group name given to channel-list items.
    #[serde(default = "default_list_group")]
    pub list_group: String,

    #[serde(default = "default_anchor_selector")]
    pub anchor_selector: String,

    /// Groups whose entries are refreshed in place. Empty means every entry
    /// outside the configured sections.
    #[serde(default)]
    pub channel_groups: Vec<String>,

    /// `per_tier` when the playlist holds an SD and an HD entry per channel,
    /// `first` when it holds one.
    #[serde(default)]
    pub slots: ChannelSlots,

    #[serde(default = "default_sections", rename = "section")]
    pub sections: Vec<ListingSection>,
}

impl Default for ChannelsSection {
    fn default() -> Self {
        Self {
            base_url: default_channels_base_url(),
            playlist: default_playlist(),
            epg_url: default_epg_url(),
            list_path: default_list_path(),
            list_group: default_list_group(),
            anchor_selector: default_anchor_selector(),
            channel_groups: Vec::new(),
            slots: ChannelSlots::default(),
            sections: default_sections(),
        }
    }
}

fn default_channels_base_url() -> String {
    "https://thetvapp.to".into()
}

fn default_playlist() -> PathBuf {
    PathBuf::from("TheTVApp.m3u8")
}

fn default_epg_url() -> String {
    "https://tinyurl.com/DrewLive002-epg".into()
}

fn default_list_path() -> String {
    "/tv".into()
}

fn default_list_group() -> String {
    "TheTVApp".into()
}

fn default_anchor_selector() -> String {
    DEFAULT_ANCHOR_SELECTOR.into()
}

fn default_sections() -> Vec<ListingSection> {
    vec![
        ListingSection::new("/nba", "NBA"),
        ListingSection::new("/mlb", "MLB")
            .with_metadata("MLB.Baseball.Dummy.us", &format!("{LOGO_BASE}/Baseball-2.png")),
        ListingSection::new("/wnba", "WNBA"),
        ListingSection::new("/nfl", "NFL"),
        ListingSection::new("/ncaaf", "NCAAF"),
        ListingSection::new("/ncaab", "NCAAB"),
        ListingSection::new("/soccer", "Soccer"),
        ListingSection::new("/ppv", "PPV")
            .with_metadata("PPV.EVENTS.Dummy.us", &format!("{LOGO_BASE}/PPV.png")),
        ListingSection::new("/events", "Events"),
    ]
}

impl ChannelsSection {
    pub fn section_groups(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.group.clone()).collect()
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default()
            .with_driver(self.driver.to_driver_config())
            .with_probe_timeout(self.run.probe_timeout_ms)
            .with_max_concurrent_sessions(self.run.max_concurrent_sessions)
    }

    fn validate(&self) -> Result<(), String> {
        match self.run.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        if self.run.max_concurrent_sessions == 0 {
            return Err("max_concurrent_sessions must be at least 1".into());
        }
        if self.driver.click_attempts == Some(0) {
            return Err("driver.click_attempts must be at least 1".into());
        }

        check_http_url("matches.base_url", &self.matches.base_url)?;
        check_http_url("channels.base_url", &self.channels.base_url)?;
        check_http_url("channels.epg_url", &self.channels.epg_url)?;
        if let Some(ref epg) = self.matches.epg_url {
            check_http_url("matches.epg_url", epg)?;
        }

        let mut names = HashSet::new();
        for c in &self.matches.categories {
            if c.name.is_empty() {
                return Err("Category name must not be empty".into());
            }
            if !names.insert(c.name.as_str()) {
                return Err(format!("Duplicate category: {}", c.name));
            }
        }

        if self.channels.anchor_selector.trim().is_empty() {
            return Err("channels.anchor_selector must not be empty".into());
        }

        let mut paths = HashSet::new();
        let mut groups = HashSet::new();
        for s in &self.channels.sections {
            if !s.path.starts_with('/') {
                return Err(format!("Section path must start with '/': {}", s.path));
            }
            if !paths.insert(s.path.as_str()) {
                return Err(format!("Duplicate section path: {}", s.path));
            }
            if !groups.insert(s.group.as_str()) {
                return Err(format!("Duplicate section group: {}", s.group));
            }
        }
        if let Some(g) = self
            .channels
            .channel_groups
            .iter()
            .find(|g| groups.contains(g.as_str()))
        {
            return Err(format!(
                "Group '{}' is both a channel group and a section group",
                g
            ));
        }

        Ok(())
    }
}

fn check_http_url(field: &str, value: &str) -> Result<(), String> {
    let parsed =
        url::Url::parse(value).map_err(|e| format!("Invalid {}: {} ({})", field, value, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(format!("{} must use http or https: {}", field, value));
    }
    Ok(())
}
