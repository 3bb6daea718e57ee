//! Upstream catalogs normalized into [`LogicalItem`]s.

pub mod api;
pub mod listing;

pub use api::{ApiCatalog, ApiCategory};
pub use listing::{ListingCatalog, ListingSection};

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("HTTP error {status} fetching {url}")]
    Http { url: String, status: u16 },
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Parse error for {url}: {message}")]
    Parse { url: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "SD")]
    Sd,
    #[serde(rename = "HD")]
    Hd,
}

impl Quality {
    /// Fixed tiers tried for pages that expose a quality toggle, in order.
    pub const TIERS: [Quality; 2] = [Quality::Sd, Quality::Hd];

    /// Label of the on-page control that loads this tier.
    pub fn trigger_label(self) -> String {
        format!("Load {self} Stream")
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sd => write!(f, "SD"),
            Self::Hd => write!(f, "HD"),
        }
    }
}

/// Where a candidate's embed pages come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateTarget {
    /// A single page that exposes per-quality trigger controls.
    Page(String),
    /// An upstream source that needs a secondary lookup to list its pages.
    Lookup { source: String, id: String },
}

/// One upstream-declared place to look for a stream. Order is priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub source_ref: String,
    pub quality_hint: Option<Quality>,
    pub target: CandidateTarget,
}

/// A concrete (page, quality) attempt produced by expanding a [`Candidate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedVariant {
    pub embed_url: String,
    pub quality: Quality,
    pub language: Option<String>,
    pub trigger_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalItem {
    pub id: String,
    pub title: String,
    pub display_date: Option<String>,
    pub group: String,
    pub tvg_id: Option<String>,
    pub logo: Option<String>,
    pub candidates: Vec<Candidate>,
}

impl LogicalItem {
    /// Title followed by the scheduled date when the catalog has one.
    pub fn display_label(&self) -> String {
        match self.display_date {
            Some(ref date) => format!("{} ({date})", self.title),
            None => self.title.clone(),
        }
    }
}

/// Trait for a catalog that yields items and expands their candidates.
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Fetches the catalog snapshot. Malformed records are skipped, not fatal.
    async fn items(&self) -> Result<Vec<LogicalItem>, CatalogError>;

    /// Lists the attempts for one candidate, in the order they should be tried.
    /// Lookup failures yield an empty list.
    async fn expand(&self, candidate: &Candidate) -> Vec<EmbedVariant>;
}

/// SD then HD attempts against one page, or only the hinted tier.
pub(crate) fn page_variants(url: &str, hint: Option<Quality>) -> Vec<EmbedVariant> {
    let tiers: Vec<Quality> = match hint {
        Some(q) => vec![q],
        None => Quality::TIERS.to_vec(),
    };
    tiers
        .into_iter()
        .map(|quality| EmbedVariant {
            embed_url: url.to_string(),
            quality,
            language: None,
            trigger_label: Some(quality.trigger_label()),
        })
        .collect()
}

pub(crate) async fn get_text(client: &Client, url: &str) -> Result<String, CatalogError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| CatalogError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(CatalogError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response.text().await.map_err(|e| CatalogError::Network {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
) -> Result<T, CatalogError> {
    let body = get_text(client, url).await?;
    serde_json::from_str(&body).map_err(|e| CatalogError::Parse {
        url: url.to_string(),
        message: e.to_string(),
    })
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}
