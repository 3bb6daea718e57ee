use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::catalog::EmbedVariant;
use crate::config::DriverConfig;
use crate::render::{PageSession, Renderer};
use crate::sniff::{ManifestSniffer, SniffRule};

/// Phases of a single rendering attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Navigating,
    Settling,
    Triggering,
    Polling,
    Captured,
    TimedOut,
    Aborted,
}

impl AttemptPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Captured | Self::TimedOut | Self::Aborted)
    }
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigating => write!(f, "navigating"),
            Self::Settling => write!(f, "settling"),
            Self::Triggering => write!(f, "triggering"),
            Self::Polling => write!(f, "polling"),
            Self::Captured => write!(f, "captured"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Opens one page per attempt and coaxes the player into requesting its manifest.
pub struct InteractionDriver {
    renderer: Arc<dyn Renderer>,
    rules: Arc<[SniffRule]>,
    config: DriverConfig,
}

impl InteractionDriver {
    pub fn new(renderer: Arc<dyn Renderer>, rules: Vec<SniffRule>, config: DriverConfig) -> Self {
        Self {
            renderer,
            rules: rules.into(),
            config,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Runs one bounded attempt against `variant` and returns the latched manifest URL.
    ///
    /// Failures of any kind end the attempt quietly with `None`. The page is
    /// always closed before returning.
    pub async fn resolve(&self, variant: &EmbedVariant) -> Option<String> {
        let attempt = Uuid::new_v4();
        let sniffer = Arc::new(ManifestSniffer::new(Arc::clone(&self.rules)));

        let mut session = match self.renderer.open(sniffer.clone()).await {
            Ok(s) => s,
            Err(e) => {
                warn!(
                    %attempt,
                    embed = %variant.embed_url,
                    error = %e,
                    "Could not open page session"
                );
                return None;
            }
        };

        let phase = match tokio::time::timeout(
            self.config.attempt_deadline,
            self.drive(session.as_mut(), &sniffer, variant, attempt),
        )
        .await
        {
            Ok(phase) => phase,
            Err(_) => {
                debug!(
                    %attempt,
                    deadline_ms = self.config.attempt_deadline.as_millis(),
                    "Attempt deadline reached"
                );
                AttemptPhase::TimedOut
            }
        };

        session.close().await;

        let captured = sniffer.captured();
        debug!(
            %attempt,
            embed = %variant.embed_url,
            quality = %variant.quality,
            %phase,
            captured = captured.is_some(),
            "Attempt finished"
        );
        captured
    }

    async fn drive(
        &self,
        session: &mut dyn PageSession,
        sniffer: &ManifestSniffer,
        variant: &EmbedVariant,
        attempt: Uuid,
    ) -> AttemptPhase {
        let mut phase = AttemptPhase::Navigating;
        let mut clicks = 0u32;
        let mut center: Option<(f64, f64)> = None;

        while !phase.is_terminal() {
            trace!(%attempt, %phase, "Attempt phase");
            phase = match phase {
                AttemptPhase::Navigating => {
                    match session
                        .navigate(&variant.embed_url, self.config.navigation_timeout)
                        .await
                    {
                        Ok(()) => AttemptPhase::Settling,
                        Err(e) => {
                            debug!(%attempt, error = %e, "Navigation failed");
                            AttemptPhase::Aborted
                        }
                    }
                }
                AttemptPhase::Settling => {
                    tokio::time::sleep(self.config.settle).await;
                    AttemptPhase::Triggering
                }
                AttemptPhase::Triggering => {
                    if let Some(ref label) = variant.trigger_label {
                        let clicked = session.click_text(label, self.config.trigger_timeout).await;
                        if let Err(e) = clicked {
                            debug!(%attempt, label, error = %e, "Trigger control unavailable");
                        }
                    }
                    AttemptPhase::Polling
                }
                AttemptPhase::Polling => {
                    if sniffer.has_capture() {
                        AttemptPhase::Captured
                    } else if clicks >= self.config.click_attempts {
                        AttemptPhase::TimedOut
                    } else {
                        clicks += 1;
                        if center.is_none() {
                            center = session
                                .viewport_center()
                                .await
                                .map_err(|e| debug!(%attempt, error = %e, "Viewport query failed"))
                                .ok();
                        }
                        if let Some((x, y)) = center {
                            if let Err(e) = session.click_at(x, y).await {
                                debug!(%attempt, click = clicks, error = %e, "Click failed");
                            }
                        }
                        tokio::time::sleep(self.config.click_interval).await;
                        if sniffer.has_capture() {
                            AttemptPhase::Captured
                        } else {
                            AttemptPhase::Polling
                        }
                    }
                }
                terminal => terminal,
            };
        }

        phase
    }
}
