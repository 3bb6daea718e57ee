#![forbid(unsafe_code)]

pub mod catalog;
pub mod config;
pub mod playlist;
pub mod probe;
pub mod render;
pub mod resolve;
pub mod run;
pub mod sniff;

pub use catalog::{
    ApiCatalog, ApiCategory, Candidate, CandidateTarget, CatalogAdapter, CatalogError,
    EmbedVariant, ListingCatalog, ListingSection, LogicalItem, Quality,
};
pub use config::{DriverConfig, ResolverConfig};
pub use playlist::{header_line, normalize_header, EntryMeta, PlaylistDocument, PlaylistEntry};
pub use probe::{HttpProber, Liveness, LivenessProbe};
pub use render::{
    BrowserOptions, ChromiumRenderer, NetworkObserver, PageSession, RenderError, Renderer,
};
pub use resolve::{AttemptPhase, InteractionDriver, ResolvedStream, StreamResolver};
pub use run::{
    persist, refresh_channels, refresh_matches, ChannelSlots, ChannelsPlan, MatchesPlan,
    PhaseReport, Quiet, RunError, RunProgress, RunReport,
};
pub use sniff::{CaptureCell, ManifestSniffer, SniffRule};
