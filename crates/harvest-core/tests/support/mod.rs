//! Scripted fakes shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use harvest_core::{DriverConfig, LivenessProbe, NetworkObserver, PageSession, RenderError, Renderer};

/// Renderer whose pages emit scripted network traffic.
///
/// `on_load` fires during navigation; `on_trigger` fires when the labeled
/// control on that page is clicked. Every navigation is recorded.
#[derive(Default)]
pub struct ScriptedRenderer {
    on_load: HashMap<String, String>,
    on_trigger: HashMap<(String, String), String>,
    pub navigations: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRenderer {
    pub fn load(mut self, page: &str, traffic: &str) -> Self {
        self.on_load.insert(page.into(), traffic.into());
        self
    }

    pub fn trigger(mut self, page: &str, label: &str, traffic: &str) -> Self {
        self.on_trigger.insert((page.into(), label.into()), traffic.into());
        self
    }
}

struct ScriptedSession {
    on_load: HashMap<String, String>,
    on_trigger: HashMap<(String, String), String>,
    navigations: Arc<Mutex<Vec<String>>>,
    observer: Arc<dyn NetworkObserver>,
    page: Option<String>,
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn open(&self, observer: Arc<dyn NetworkObserver>) -> Result<Box<dyn PageSession>, RenderError> {
        Ok(Box::new(ScriptedSession {
            on_load: self.on_load.clone(),
            on_trigger: self.on_trigger.clone(),
            navigations: Arc::clone(&self.navigations),
            observer,
            page: None,
        }))
    }
}

#[async_trait]
impl PageSession for ScriptedSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), RenderError> {
        self.navigations.lock().unwrap().push(url.to_string());
        if url.contains("unreachable") {
            return Err(RenderError::Navigation {
                url: url.into(),
                reason: "net::ERR_CONNECTION_REFUSED".into(),
            });
        }
        self.observer.observe("https://ads.example/pixel.gif");
        if let Some(traffic) = self.on_load.get(url) {
            self.observer.observe(traffic);
        }
        self.page = Some(url.to_string());
        Ok(())
    }

    async fn click_text(&mut self, label: &str, _timeout: Duration) -> Result<(), RenderError> {
        let key = (self.page.clone().unwrap_or_default(), label.to_string());
        match self.on_trigger.get(&key) {
            Some(traffic) => {
                self.observer.observe(traffic);
                Ok(())
            }
            None => Err(RenderError::ElementNotFound(label.into())),
        }
    }

    async fn viewport_center(&mut self) -> Result<(f64, f64), RenderError> {
        Ok((400.0, 300.0))
    }

    async fn click_at(&mut self, _x: f64, _y: f64) -> Result<(), RenderError> {
        Ok(())
    }

    async fn close(&mut self) {}
}

/// Prober that accepts a fixed set of URLs and records every call.
#[derive(Default)]
pub struct SetProber {
    live: HashSet<String>,
    pub probed: Mutex<Vec<String>>,
}

impl SetProber {
    pub fn live(urls: &[&str]) -> Self {
        Self {
            live: urls.iter().map(|u| u.to_string()).collect(),
            probed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LivenessProbe for SetProber {
    async fn probe(&self, url: &str) -> bool {
        self.probed.lock().unwrap().push(url.to_string());
        self.live.contains(url)
    }
}

pub fn fast_driver() -> DriverConfig {
    DriverConfig::default()
        .with_settle(0)
        .with_click_attempts(1)
        .with_click_interval(1)
        .with_attempt_deadline(2_000)
}
