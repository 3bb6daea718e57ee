//! Boundary to the browser-automation engine.
//!
//! The resolver only depends on the capability set below: isolated page
//! sessions, navigation with a timeout, click-by-text, click-by-coordinate and
//! a passive network-observation hook. [`chromium::ChromiumRenderer`] is the
//! production implementation.

pub mod chromium;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use chromium::{BrowserOptions, ChromiumRenderer};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("Timed out after {}ms during {step}", elapsed.as_millis())]
    Timeout { step: &'static str, elapsed: Duration },
    #[error("No element with text '{0}'")]
    ElementNotFound(String),
    #[error("Browser protocol error: {0}")]
    Protocol(String),
}

/// Receives the URL of every request sent and response received by a page.
///
/// Implementations must only observe; traffic always continues unmodified.
pub trait NetworkObserver: Send + Sync {
    fn observe(&self, url: &str);
}

/// Factory for isolated page sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Opens a blank session with `observer` attached before any navigation.
    async fn open(
        &self,
        observer: Arc<dyn NetworkObserver>,
    ) -> Result<Box<dyn PageSession>, RenderError>;
}

/// One isolated page, owned by a single attempt.
#[async_trait]
pub trait PageSession: Send {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), RenderError>;

    /// Clicks the element whose visible text equals `label` exactly.
    async fn click_text(&mut self, label: &str, timeout: Duration) -> Result<(), RenderError>;

    /// Returns the (x, y) center of the current viewport in CSS pixels.
    async fn viewport_center(&mut self) -> Result<(f64, f64), RenderError>;

    async fn click_at(&mut self, x: f64, y: f64) -> Result<(), RenderError>;

    /// Releases the page. Safe to call more than once.
    async fn close(&mut self);
}
