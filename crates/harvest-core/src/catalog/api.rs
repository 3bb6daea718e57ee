use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    get_json, join_url, page_variants, Candidate, CandidateTarget, CatalogAdapter, CatalogError,
    EmbedVariant, LogicalItem, Quality,
};

/// An allow-listed sport category and the display metadata its entries get.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCategory {
    pub name: String,
    pub tvg_id: String,
    pub logo: String,
}

impl ApiCategory {
    pub fn new(name: &str, tvg_id: &str, logo: &str) -> Self {
        Self {
            name: name.to_string(),
            tvg_id: tvg_id.to_string(),
            logo: logo.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Sport {
    id: Value,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Match {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    date: Option<i64>,
    #[serde(default)]
    teams: Option<Teams>,
    #[serde(default)]
    sources: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Teams {
    #[serde(default)]
    home: Option<Team>,
}

#[derive(Debug, Deserialize)]
struct Team {
    #[serde(default)]
    badge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatchSource {
    source: String,
    id: Value,
}

#[derive(Debug, Deserialize)]
struct StreamInfo {
    #[serde(rename = "embedUrl", default)]
    embed_url: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    hd: bool,
}

/// Sports-match catalog served as JSON.
///
/// Categories come from `/api/sports`, matches from `/api/matches/{sport}`, and
/// every match source is expanded lazily through `/api/stream/{source}/{id}`.
pub struct ApiCatalog {
    client: Client,
    base_url: String,
    group_prefix: String,
    categories: Vec<ApiCategory>,
}

impl ApiCatalog {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        group_prefix: impl Into<String>,
        categories: Vec<ApiCategory>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            group_prefix: group_prefix.into(),
            categories,
        }
    }

    fn category(&self, name: &str) -> Option<&ApiCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    fn badge_url(&self, badge: &str) -> String {
        format!("{}/api/images/badge/{}.webp", self.base_url, badge)
    }

    fn to_item(
        &self,
        category: &ApiCategory,
        sport_key: &str,
        index: usize,
        m: Match,
    ) -> Option<LogicalItem> {
        let title = m.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        let Some(title) = title else {
            debug!(sport = %category.name, index, "Skipping match without title");
            return None;
        };

        let candidates: Vec<Candidate> = m
            .sources
            .into_iter()
            .filter_map(|v| serde_json::from_value::<MatchSource>(v).ok())
            .map(|s| {
                let id = value_key(&s.id);
                Candidate {
                    source_ref: format!("{}/{}", s.source, id),
                    quality_hint: None,
                    target: CandidateTarget::Lookup {
                        source: s.source,
                        id,
                    },
                }
            })
            .collect();
        if candidates.is_empty() {
            debug!(item = %title, "Skipping match without sources");
            return None;
        }

        let logo = m
            .teams
            .and_then(|t| t.home)
            .and_then(|h| h.badge)
            .filter(|b| !b.is_empty())
            .map(|b| self.badge_url(&b))
            .unwrap_or_else(|| category.logo.clone());

        let display_date = m
            .date
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string());

        Some(LogicalItem {
            id: m
                .id
                .as_ref()
                .map(value_key)
                .unwrap_or_else(|| format!("{}#{}", sport_key, index)),
            title,
            display_date,
            group: format!("{} - {}", self.group_prefix, category.name),
            tvg_id: Some(category.tvg_id.clone()),
            logo: Some(logo),
            candidates,
        })
    }

    async fn lookup(&self, source: &str, id: &str) -> Vec<EmbedVariant> {
        let url = format!("{}/api/stream/{}/{}", self.base_url, source, id);
        let raw: Vec<Value> = match get_json(&self.client, &url).await {
            Ok(list) => list,
            Err(e) => {
                warn!(source, id, error = %e, "Stream lookup failed");
                return Vec::new();
            }
        };

        lenient::<StreamInfo>(raw)
            .into_iter()
            .filter_map(|s| {
                let embed_url = s.embed_url.filter(|u| !u.is_empty())?;
                Some(EmbedVariant {
                    embed_url,
                    quality: if s.hd { Quality::Hd } else { Quality::Sd },
                    language: s.language.filter(|l| !l.is_empty()),
                    trigger_label: None,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CatalogAdapter for ApiCatalog {
    fn name(&self) -> &str {
        "matches"
    }

    async fn items(&self) -> Result<Vec<LogicalItem>, CatalogError> {
        let sports_url = join_url(&self.base_url, "/api/sports");
        let sports: Vec<Value> = get_json(&self.client, &sports_url).await?;

        let mut items = Vec::new();
        for sport in lenient::<Sport>(sports) {
            let Some(category) = self.category(&sport.name) else {
                debug!(sport = %sport.name, "Category not in allow-list");
                continue;
            };
            let sport_key = value_key(&sport.id);

            let matches_url = format!("{}/api/matches/{}", self.base_url, sport_key);
            let matches: Vec<Value> = match get_json(&self.client, &matches_url).await {
                Ok(m) => m,
                Err(e) => {
                    warn!(
                        sport = %sport.name,
                        error = %e,
                        "Skipping category, match list unavailable"
                    );
                    continue;
                }
            };

            let before = items.len();
            for (index, m) in lenient::<Match>(matches).into_iter().enumerate() {
                if let Some(item) = self.to_item(category, &sport_key, index, m) {
                    items.push(item);
                }
            }
            info!(sport = %sport.name, matches = items.len() - before, "Loaded category");
        }

        Ok(items)
    }

    async fn expand(&self, candidate: &Candidate) -> Vec<EmbedVariant> {
        match &candidate.target {
            CandidateTarget::Lookup { source, id } => self.lookup(source, id).await,
            CandidateTarget::Page(url) => page_variants(url, candidate.quality_hint),
        }
    }
}

/// Deserializes each record on its own so one bad record does not sink the list.
fn lenient<T: DeserializeOwned>(values: Vec<Value>) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(t) => Some(t),
            Err(e) => {
                debug!(error = %e, "Skipping malformed record");
                None
            }
        })
        .collect()
}

fn value_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
