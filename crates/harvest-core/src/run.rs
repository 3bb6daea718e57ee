//! End-to-end refresh runs: catalog, resolution, merge, persist.
//!
//! Every run mutates the playlist in memory and writes it back as a single
//! temp-file-plus-rename, so a failed run never leaves a partial file behind.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::{CatalogError, LogicalItem};
use crate::playlist::{header_line, EntryMeta, PlaylistDocument, PlaylistEntry, HEADER_PREFIX};
use crate::resolve::{ResolvedStream, StreamResolver};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Playlist not found: {}", .0.display())]
    MissingPlaylist(PathBuf),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("No streams resolved for {0}")]
    NothingResolved(String),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Callbacks for progress display while a run resolves items.
pub trait RunProgress {
    fn phase_started(&mut self, _phase: &str, _items: usize) {}
    fn item_finished(&mut self, _item: &LogicalItem, _stream: Option<&ResolvedStream>) {}
}

/// Progress sink that ignores everything.
pub struct Quiet;

impl RunProgress for Quiet {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub phase: String,
    pub items_seen: usize,
    pub resolved: usize,
    pub unavailable: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub output: PathBuf,
    pub phases: Vec<PhaseReport>,
    /// Existing entries whose URL was swapped in place.
    pub entries_replaced: usize,
    /// Existing entries removed before appending fresh ones.
    pub entries_pruned: usize,
    /// Entries in the written document.
    pub entries_written: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    fn new(output: &Path) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            output: output.to_path_buf(),
            phases: Vec::new(),
            entries_replaced: 0,
            entries_pruned: 0,
            entries_written: 0,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn resolved(&self) -> usize {
        self.phases.iter().map(|p| p.resolved).sum()
    }

    pub fn unavailable(&self) -> usize {
        self.phases.iter().map(|p| p.unavailable).sum()
    }
}

/// Settings for the matches run, which owns its output file outright.
#[derive(Debug, Clone)]
pub struct MatchesPlan {
    pub output: PathBuf,
    pub epg_url: Option<String>,
}

/// How many channel-section entries each channel owns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSlots {
    /// One entry per channel, filled by its first live tier.
    First,
    /// One entry per quality tier, laid out channel by channel in tier order.
    #[default]
    PerTier,
}

/// Settings for the channel refresh run over an existing playlist.
#[derive(Debug, Clone)]
pub struct ChannelsPlan {
    pub playlist: PathBuf,
    pub epg_url: String,
    /// Groups whose entries get their URLs replaced in place. When empty,
    /// every entry outside `section_groups` is part of the channel section.
    pub channel_groups: Vec<String>,
    pub slots: ChannelSlots,
    /// Groups rebuilt from the section listings on every run.
    pub section_groups: Vec<String>,
}

impl ChannelsPlan {
    fn is_channel(&self, entry: &PlaylistEntry) -> bool {
        let category = entry.category();
        if self.channel_groups.is_empty() {
            !category.is_some_and(|c| self.section_groups.iter().any(|g| g == c))
        } else {
            category.is_some_and(|c| self.channel_groups.iter().any(|g| g == c))
        }
    }
}

/// Rebuilds the matches playlist from scratch.
pub async fn refresh_matches(
    resolver: &StreamResolver,
    plan: &MatchesPlan,
    progress: &mut dyn RunProgress,
) -> Result<RunReport, RunError> {
    let mut report = RunReport::new(&plan.output);

    let items = resolver.catalog().items().await?;
    let (phase, resolved) = resolve_phase("matches", resolver, &items, progress).await;
    report.phases.push(phase);

    let entries: Vec<PlaylistEntry> = items
        .iter()
        .zip(resolved)
        .filter_map(|(item, stream)| stream.map(|s| match_entry(item, &s)))
        .collect();

    let header = plan
        .epg_url
        .as_deref()
        .map_or_else(|| HEADER_PREFIX.to_string(), header_line);
    let mut document = PlaylistDocument::new(header);
    document.rebuild_full(entries);

    persist(&plan.output, &document).await?;
    report.entries_written = document.len();
    report.finished_at = Utc::now();

    info!(
        output = %plan.output.display(),
        entries = report.entries_written,
        unavailable = report.unavailable(),
        "Matches playlist written"
    );
    Ok(report)
}

/// Refreshes an existing playlist: channel URLs are swapped in place and
/// section groups are rebuilt. Nothing is written unless every step succeeds.
pub async fn refresh_channels(
    channels: &StreamResolver,
    sections: &StreamResolver,
    plan: &ChannelsPlan,
    progress: &mut dyn RunProgress,
) -> Result<RunReport, RunError> {
    let mut report = RunReport::new(&plan.playlist);

    let text = match tokio::fs::read_to_string(&plan.playlist).await {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(RunError::MissingPlaylist(plan.playlist.clone()));
        }
        Err(source) => {
            return Err(RunError::Io {
                path: plan.playlist.clone(),
                source,
            });
        }
    };
    let header = header_line(&plan.epg_url);
    let mut document = PlaylistDocument::parse(&text, header.clone());

    let channel_items = channels.catalog().items().await?;
    let (phase, slots) = channel_phase(channels, &channel_items, plan.slots, progress).await;
    report.phases.push(phase);

    if slots.iter().all(Option::is_none) {
        return Err(RunError::NothingResolved("channels".into()));
    }
    let channel_entries = document.entries().iter().filter(|e| plan.is_channel(e)).count();
    if slots.len() != channel_entries {
        warn!(
            slots = slots.len(),
            entries = channel_entries,
            "Channel slots and channel entries differ; unmatched ones left as is"
        );
    }
    report.entries_replaced = document.replace_section(&slots, |e| plan.is_channel(e));

    let section_items = sections.catalog().items().await?;
    let (phase, resolved) = resolve_phase("sections", sections, &section_items, progress).await;
    report.phases.push(phase);

    let fresh: Vec<PlaylistEntry> = section_items
        .iter()
        .zip(resolved)
        .filter_map(|(item, stream)| stream.map(|s| section_entry(item, &s)))
        .collect();

    report.entries_pruned = document.prune_categories(&plan.section_groups);
    if fresh.is_empty() {
        warn!("No section streams resolved; section groups left empty");
    } else {
        document.append_entries(fresh);
    }
    document.set_header(header);

    persist(&plan.playlist, &document).await?;
    report.entries_written = document.len();
    report.finished_at = Utc::now();

    info!(
        playlist = %plan.playlist.display(),
        replaced = report.entries_replaced,
        pruned = report.entries_pruned,
        entries = report.entries_written,
        "Channel playlist refreshed"
    );
    Ok(report)
}

async fn resolve_phase(
    name: &str,
    resolver: &StreamResolver,
    items: &[LogicalItem],
    progress: &mut dyn RunProgress,
) -> (PhaseReport, Vec<Option<ResolvedStream>>) {
    info!(phase = name, catalog = resolver.catalog().name(), items = items.len(), "Resolving");
    progress.phase_started(name, items.len());

    let resolved = resolver
        .resolve_all(items, |item, stream| progress.item_finished(item, stream))
        .await;

    let hits = resolved.iter().filter(|r| r.is_some()).count();
    let report = PhaseReport {
        phase: name.to_string(),
        items_seen: items.len(),
        resolved: hits,
        unavailable: items.len() - hits,
    };
    (report, resolved)
}

/// Resolves the channel list into positional URL slots. A channel that did
/// not resolve still occupies its slots so later channels keep their place.
async fn channel_phase(
    resolver: &StreamResolver,
    items: &[LogicalItem],
    layout: ChannelSlots,
    progress: &mut dyn RunProgress,
) -> (PhaseReport, Vec<Option<String>>) {
    let url = |s: Option<ResolvedStream>| s.map(|s| s.manifest_url);
    match layout {
        ChannelSlots::First => {
            let (report, resolved) = resolve_phase("channels", resolver, items, progress).await;
            (report, resolved.into_iter().map(url).collect())
        }
        ChannelSlots::PerTier => {
            info!(
                phase = "channels",
                catalog = resolver.catalog().name(),
                items = items.len(),
                "Resolving every tier"
            );
            progress.phase_started("channels", items.len());

            let resolved = resolver
                .resolve_all_per_tier(items, |item, stream| progress.item_finished(item, stream))
                .await;

            let hits = resolved.iter().filter(|t| t.iter().any(Option::is_some)).count();
            let report = PhaseReport {
                phase: "channels".to_string(),
                items_seen: items.len(),
                resolved: hits,
                unavailable: items.len() - hits,
            };
            (report, resolved.into_iter().flatten().map(url).collect())
        }
    }
}

fn match_entry(item: &LogicalItem, stream: &ResolvedStream) -> PlaylistEntry {
    let language = stream.language.as_deref().unwrap_or("Unknown");
    let title = format!("{} ({} - {})", item.title, language, stream.quality);
    EntryMeta::new(&item.group, title)
        .tvg_id(item.tvg_id.clone())
        .logo(item.logo.clone())
        .into_entry(&stream.manifest_url)
}

fn section_entry(item: &LogicalItem, stream: &ResolvedStream) -> PlaylistEntry {
    let name = item.tvg_id.as_ref().map(|_| item.title.clone());
    EntryMeta::new(&item.group, &item.title)
        .tvg_id(item.tvg_id.clone())
        .tvg_name(name)
        .logo(item.logo.clone())
        .into_entry(&stream.manifest_url)
}

/// Writes `document` next to `path` and renames it into place.
pub async fn persist(path: &Path, document: &PlaylistDocument) -> Result<(), RunError> {
    let io_err = |source: io::Error| RunError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, document.render()).await.map_err(io_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }
    Ok(())
}
