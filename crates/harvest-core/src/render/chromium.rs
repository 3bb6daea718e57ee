use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EventRequestWillBeSent, EventResponseReceived};
use chromiumoxide::layout::Point;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{NetworkObserver, PageSession, RenderError, Renderer};

const TEXT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Explicit Chrome/Chromium binary; autodetected when unset.
    pub executable: Option<PathBuf>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
        }
    }
}

/// Headless Chromium driven over the DevTools protocol.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

impl ChromiumRenderer {
    pub async fn launch(options: &BrowserOptions) -> Result<Self, RenderError> {
        let mut builder = BrowserConfig::builder();
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = options.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler event error");
                }
            }
        });

        info!(headless = options.headless, "Browser launched");
        Ok(Self {
            browser: Mutex::new(browser),
            handler,
        })
    }

    pub async fn shutdown(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "Browser did not close cleanly");
        }
        self.handler.abort();
        info!("Browser closed");
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn open(
        &self,
        observer: Arc<dyn NetworkObserver>,
    ) -> Result<Box<dyn PageSession>, RenderError> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(protocol)?;

        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(protocol)?;
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(protocol)?;

        let request_observer = Arc::clone(&observer);
        let request_task = tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                request_observer.observe(&event.request.url);
            }
        });
        let response_task = tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                observer.observe(&event.response.url);
            }
        });

        Ok(Box::new(ChromiumSession {
            page: Some(page),
            listeners: vec![request_task, response_task],
        }))
    }
}

struct ChromiumSession {
    page: Option<Page>,
    listeners: Vec<JoinHandle<()>>,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, RenderError> {
        self.page
            .as_ref()
            .ok_or_else(|| RenderError::Protocol("session already closed".into()))
    }
}

#[derive(Deserialize)]
struct Viewport {
    width: f64,
    height: f64,
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), RenderError> {
        let page = self.page()?;
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(RenderError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(RenderError::Timeout {
                step: "navigation",
                elapsed: timeout,
            }),
        }
    }

    async fn click_text(&mut self, label: &str, timeout: Duration) -> Result<(), RenderError> {
        let page = self.page()?;
        let xpath = format!("//*[normalize-space(text())={}]", xpath_literal(label));
        let deadline = Instant::now() + timeout;

        loop {
            match page.find_xpath(xpath.as_str()).await {
                Ok(element) => {
                    element.click().await.map_err(protocol)?;
                    return Ok(());
                }
                Err(_) if Instant::now() + TEXT_POLL_INTERVAL < deadline => {
                    tokio::time::sleep(TEXT_POLL_INTERVAL).await;
                }
                Err(_) => return Err(RenderError::ElementNotFound(label.to_string())),
            }
        }
    }

    async fn viewport_center(&mut self) -> Result<(f64, f64), RenderError> {
        let viewport: Viewport = self
            .page()?
            .evaluate("({ width: window.innerWidth, height: window.innerHeight })")
            .await
            .map_err(protocol)?
            .into_value()
            .map_err(protocol)?;
        Ok(((viewport.width / 2.0).floor(), (viewport.height / 2.0).floor()))
    }

    async fn click_at(&mut self, x: f64, y: f64) -> Result<(), RenderError> {
        self.page()?.click(Point::new(x, y)).await.map_err(protocol)?;
        Ok(())
    }

    async fn close(&mut self) {
        for task in self.listeners.drain(..) {
            task.abort();
        }
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!(error = %e, "Page close failed");
            }
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        for task in self.listeners.drain(..) {
            task.abort();
        }
        // Reached when the owning attempt was cancelled mid-flight.
        if let Some(page) = self.page.take() {
            tokio::spawn(async move {
                let _ = page.close().await;
            });
        }
    }
}

fn protocol(e: impl std::fmt::Display) -> RenderError {
    RenderError::Protocol(e.to_string())
}

fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{text}'")
    } else if !text.contains('"') {
        format!("\"{text}\"")
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
