mod http;

pub use http::HttpProber;

use std::fmt;

use async_trait::async_trait;

/// Outcome of a single liveness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    Live,
    Dead { status: u16 },
    TimedOut,
    Unreachable { reason: String },
}

impl Liveness {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Dead { status } => write!(f, "dead (HTTP {status})"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Unreachable { reason } => write!(f, "unreachable: {reason}"),
        }
    }
}

/// Trait for confirming that a captured manifest URL is currently servable.
///
/// One attempt per call; retry policy belongs to the caller.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, url: &str) -> bool;
}
