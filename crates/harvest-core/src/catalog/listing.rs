use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    get_text, join_url, page_variants, Candidate, CandidateTarget, CatalogAdapter, CatalogError,
    EmbedVariant, LogicalItem,
};

pub const DEFAULT_ANCHOR_SELECTOR: &str = "ol.list-group a";

/// One HTML index page and the playlist group its anchors belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSection {
    pub path: String,
    pub group: String,
    #[serde(default)]
    pub tvg_id: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

impl ListingSection {
    pub fn new(path: &str, group: &str) -> Self {
        Self {
            path: path.to_string(),
            group: group.to_string(),
            tvg_id: None,
            logo: None,
        }
    }

    pub fn with_metadata(mut self, tvg_id: &str, logo: &str) -> Self {
        self.tvg_id = Some(tvg_id.to_string());
        self.logo = Some(logo.to_string());
        self
    }
}

/// Channel/section catalog scraped from HTML listing pages.
pub struct ListingCatalog {
    client: Client,
    base_url: String,
    anchor_selector: String,
    sections: Vec<ListingSection>,
}

impl ListingCatalog {
    pub fn new(client: Client, base_url: impl Into<String>, sections: Vec<ListingSection>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anchor_selector: DEFAULT_ANCHOR_SELECTOR.to_string(),
            sections,
        }
    }

    pub fn with_anchor_selector(mut self, selector: impl Into<String>) -> Self {
        self.anchor_selector = selector.into();
        self
    }

    async fn section_items(
        &self,
        section: &ListingSection,
    ) -> Result<Vec<LogicalItem>, CatalogError> {
        let url = join_url(&self.base_url, &section.path);
        let html = get_text(&self.client, &url).await?;
        let anchors = parse_anchors(&html, &self.anchor_selector).map_err(|message| {
            CatalogError::Parse {
                url: url.clone(),
                message,
            }
        })?;

        let items = anchors
            .into_iter()
            .filter_map(|anchor| {
                let href = anchor.href.filter(|h| !h.trim().is_empty());
                let title = anchor.title.filter(|t| !t.is_empty());
                let (Some(href), Some(title)) = (href, title) else {
                    debug!(section = %section.group, "Skipping anchor without href or title");
                    return None;
                };
                Some(LogicalItem {
                    id: href.clone(),
                    title,
                    display_date: None,
                    group: section.group.clone(),
                    tvg_id: section.tvg_id.clone(),
                    logo: section.logo.clone(),
                    candidates: vec![Candidate {
                        source_ref: href.clone(),
                        quality_hint: None,
                        target: CandidateTarget::Page(join_url(&self.base_url, &href)),
                    }],
                })
            })
            .collect::<Vec<_>>();

        info!(section = %section.group, items = items.len(), "Loaded listing section");
        Ok(items)
    }
}

#[async_trait]
impl CatalogAdapter for ListingCatalog {
    fn name(&self) -> &str {
        "listing"
    }

    async fn items(&self) -> Result<Vec<LogicalItem>, CatalogError> {
        let mut items = Vec::new();
        let mut last_error = None;
        let mut loaded = 0usize;

        for section in &self.sections {
            match self.section_items(section).await {
                Ok(section_items) => {
                    loaded += 1;
                    items.extend(section_items);
                }
                Err(e) => {
                    warn!(section = %section.group, error = %e, "Skipping listing section");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if loaded == 0 => Err(e),
            _ => Ok(items),
        }
    }

    async fn expand(&self, candidate: &Candidate) -> Vec<EmbedVariant> {
        match &candidate.target {
            CandidateTarget::Page(url) => page_variants(url, candidate.quality_hint),
            CandidateTarget::Lookup { .. } => {
                debug!(source = %candidate.source_ref, "Listing pages have no lookup sources");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Anchor {
    href: Option<String>,
    title: Option<String>,
}

fn parse_anchors(html: &str, selector: &str) -> Result<Vec<Anchor>, String> {
    let selector =
        Selector::parse(selector).map_err(|e| format!("bad selector '{selector}': {e}"))?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .map(|el| {
            let raw: String = el.text().collect();
            let title = normalize_title(&raw);
            Anchor {
                href: el.value().attr("href").map(str::to_string),
                title: (!title.is_empty()).then_some(title),
            }
        })
        .collect())
}

/// Joins the non-blank lines of an anchor's text with " - ".
pub fn normalize_title(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" - ")
}
