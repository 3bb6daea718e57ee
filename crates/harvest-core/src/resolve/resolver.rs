use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogAdapter, EmbedVariant, LogicalItem, Quality};
use crate::config::ResolverConfig;
use crate::probe::LivenessProbe;
use crate::render::Renderer;
use crate::sniff::SniffRule;

use super::driver::InteractionDriver;

/// A manifest URL that was captured and passed the liveness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStream {
    pub manifest_url: String,
    pub quality: Quality,
    pub language: Option<String>,
    pub resolved_at: DateTime<Utc>,
}

/// Walks an item's candidates in priority order until one yields a live manifest.
pub struct StreamResolver {
    catalog: Arc<dyn CatalogAdapter>,
    driver: InteractionDriver,
    prober: Arc<dyn LivenessProbe>,
    max_concurrent: usize,
}

impl StreamResolver {
    pub fn new(
        catalog: Arc<dyn CatalogAdapter>,
        driver: InteractionDriver,
        prober: Arc<dyn LivenessProbe>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            catalog,
            driver,
            prober,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn from_config(
        catalog: Arc<dyn CatalogAdapter>,
        renderer: Arc<dyn Renderer>,
        rules: Vec<SniffRule>,
        prober: Arc<dyn LivenessProbe>,
        config: &ResolverConfig,
    ) -> Self {
        let driver = InteractionDriver::new(renderer, rules, config.driver.clone());
        Self::new(catalog, driver, prober, config.max_concurrent_sessions)
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogAdapter> {
        &self.catalog
    }

    /// First (candidate, quality) whose capture probes live wins. Later
    /// candidates are never expanded once one succeeds.
    pub async fn resolve_item(&self, item: &LogicalItem) -> Option<ResolvedStream> {
        let mut tried: HashSet<(String, Quality)> = HashSet::new();

        for candidate in &item.candidates {
            let variants = self.catalog.expand(candidate).await;
            if variants.is_empty() {
                debug!(
                    item = %item.title,
                    source = %candidate.source_ref,
                    "Candidate has no embed pages"
                );
                continue;
            }

            for variant in &variants {
                if !tried.insert((variant.embed_url.clone(), variant.quality)) {
                    continue;
                }
                if let Some(stream) = self.attempt(item, &candidate.source_ref, variant).await {
                    return Some(stream);
                }
            }
        }

        warn!(item = %item.title, candidates = item.candidates.len(), "No live stream found");
        None
    }

    /// One slot per entry of [`Quality::TIERS`], each filled by the first
    /// live capture of that tier across the item's candidates.
    ///
    /// Candidates are expanded at most once and only when a tier reaches them.
    pub async fn resolve_item_per_tier(&self, item: &LogicalItem) -> Vec<Option<ResolvedStream>> {
        let mut expanded: Vec<Option<Vec<EmbedVariant>>> = vec![None; item.candidates.len()];
        let mut tried: HashSet<(String, Quality)> = HashSet::new();
        let mut slots = Vec::with_capacity(Quality::TIERS.len());

        for tier in Quality::TIERS {
            let mut found = None;

            'candidates: for (idx, candidate) in item.candidates.iter().enumerate() {
                if expanded[idx].is_none() {
                    expanded[idx] = Some(self.catalog.expand(candidate).await);
                }
                let Some(variants) = expanded[idx].as_ref() else { continue };

                for variant in variants.iter().filter(|v| v.quality == tier) {
                    if !tried.insert((variant.embed_url.clone(), variant.quality)) {
                        continue;
                    }
                    if let Some(stream) = self.attempt(item, &candidate.source_ref, variant).await {
                        found = Some(stream);
                        break 'candidates;
                    }
                }
            }

            if found.is_none() {
                warn!(item = %item.title, quality = %tier, "No live stream for tier");
            }
            slots.push(found);
        }

        slots
    }

    /// Drives one embed page and probes whatever it captured.
    async fn attempt(
        &self,
        item: &LogicalItem,
        source_ref: &str,
        variant: &EmbedVariant,
    ) -> Option<ResolvedStream> {
        info!(
            item = %item.title,
            date = ?item.display_date,
            source = %source_ref,
            quality = %variant.quality,
            "Trying embed page"
        );

        let Some(manifest_url) = self.driver.resolve(variant).await else {
            debug!(item = %item.title, quality = %variant.quality, "No manifest captured");
            return None;
        };

        if !self.prober.probe(&manifest_url).await {
            warn!(item = %item.title, url = %manifest_url, "Captured manifest is not live");
            return None;
        }

        info!(
            item = %item.title,
            quality = %variant.quality,
            url = %manifest_url,
            "Resolved live stream"
        );
        Some(ResolvedStream {
            manifest_url,
            quality: variant.quality,
            language: variant.language.clone(),
            resolved_at: Utc::now(),
        })
    }

    /// Resolves `items` with bounded concurrency. Results come back in input
    /// order; `on_item` fires as each one completes in that order.
    pub async fn resolve_all<F>(
        &self,
        items: &[LogicalItem],
        on_item: F,
    ) -> Vec<Option<ResolvedStream>>
    where
        F: FnMut(&LogicalItem, Option<&ResolvedStream>),
    {
        self.fan_out(items, false, on_item)
            .await
            .into_iter()
            .map(|slots| slots.into_iter().next().flatten())
            .collect()
    }

    /// Like [`resolve_all`](Self::resolve_all), with one slot per quality tier
    /// for every item. `on_item` sees the first tier that resolved.
    pub async fn resolve_all_per_tier<F>(
        &self,
        items: &[LogicalItem],
        on_item: F,
    ) -> Vec<Vec<Option<ResolvedStream>>>
    where
        F: FnMut(&LogicalItem, Option<&ResolvedStream>),
    {
        self.fan_out(items, true, on_item).await
    }

    async fn fan_out<F>(
        &self,
        items: &[LogicalItem],
        per_tier: bool,
        mut on_item: F,
    ) -> Vec<Vec<Option<ResolvedStream>>>
    where
        F: FnMut(&LogicalItem, Option<&ResolvedStream>),
    {
        let mut results = Vec::with_capacity(items.len());
        let mut pending = stream::iter(items.iter())
            .map(|item| async move {
                let slots = if per_tier {
                    self.resolve_item_per_tier(item).await
                } else {
                    vec![self.resolve_item(item).await]
                };
                (item, slots)
            })
            .buffered(self.max_concurrent);

        while let Some((item, slots)) = pending.next().await {
            on_item(item, slots.iter().flatten().next());
            results.push(slots);
        }

        results
    }
}
