//! Passive manifest capture from a page session's network traffic.
//!
//! A [`ManifestSniffer`] is created per rendering attempt. The rendering
//! engine feeds it every request and response URL it sees; the first URL that
//! matches one of the configured [`SniffRule`]s is latched into the sniffer's
//! [`CaptureCell`] and every later match is ignored.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use crate::render::NetworkObserver;

/// A URL-shape rule that turns an observed URL into a manifest URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SniffRule {
    /// Accept any URL containing the marker verbatim (e.g. `.m3u8`).
    ManifestMarker { marker: String },
    /// Accept the percent-encoded URL carried in `param` of any URL whose text
    /// contains `path_marker` (e.g. tracking pixels such as `ping.gif?mu=`).
    EncodedParam { path_marker: String, param: String },
}

impl SniffRule {
    pub fn manifest_marker(marker: impl Into<String>) -> Self {
        Self::ManifestMarker {
            marker: marker.into(),
        }
    }

    pub fn encoded_param(path_marker: impl Into<String>, param: impl Into<String>) -> Self {
        Self::EncodedParam {
            path_marker: path_marker.into(),
            param: param.into(),
        }
    }

    /// Direct `.m3u8` references only.
    pub fn direct_rules() -> Vec<SniffRule> {
        vec![Self::manifest_marker(".m3u8")]
    }

    /// `ping.gif?mu=<encoded manifest>` indirections first, then direct references.
    pub fn ping_rules() -> Vec<SniffRule> {
        vec![
            Self::encoded_param("ping.gif", "mu"),
            Self::manifest_marker(".m3u8"),
        ]
    }

    pub fn extract(&self, url: &str) -> Option<String> {
        match self {
            Self::ManifestMarker { marker } => {
                url.contains(marker.as_str()).then(|| url.to_string())
            }
            Self::EncodedParam { path_marker, param } => {
                if !url.contains(path_marker.as_str()) {
                    return None;
                }
                let parsed = Url::parse(url).ok()?;
                let value = parsed
                    .query_pairs()
                    .find(|(k, _)| k == param.as_str())
                    .map(|(_, v)| v.into_owned())?;
                if value.is_empty() {
                    return None;
                }
                // Some trackers encode the target twice.
                let inner = urlencoding::decode(&value)
                    .map(|v| v.into_owned())
                    .unwrap_or(value);
                Some(inner)
            }
        }
    }
}

/// Single-assignment slot for the captured manifest URL.
#[derive(Debug, Default)]
pub struct CaptureCell {
    slot: OnceLock<String>,
}

impl CaptureCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `url` if nothing has been captured yet. Returns whether it won.
    pub fn try_set(&self, url: String) -> bool {
        self.slot.set(url).is_ok()
    }

    pub fn get(&self) -> Option<String> {
        self.slot.get().cloned()
    }

    pub fn is_set(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// Applies a rule set to observed URLs and latches the first match.
#[derive(Debug)]
pub struct ManifestSniffer {
    rules: Arc<[SniffRule]>,
    capture: CaptureCell,
}

impl ManifestSniffer {
    pub fn new(rules: Arc<[SniffRule]>) -> Self {
        Self {
            rules,
            capture: CaptureCell::new(),
        }
    }

    pub fn extract(&self, url: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| rule.extract(url))
    }

    pub fn captured(&self) -> Option<String> {
        self.capture.get()
    }

    pub fn has_capture(&self) -> bool {
        self.capture.is_set()
    }
}

impl NetworkObserver for ManifestSniffer {
    fn observe(&self, url: &str) {
        if self.capture.is_set() {
            return;
        }
        if let Some(manifest) = self.extract(url) {
            if self.capture.try_set(manifest.clone()) {
                debug!(url = %manifest, "Manifest captured");
            }
        } else {
            trace!(url, "Ignoring network URL");
        }
    }
}
