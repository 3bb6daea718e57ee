//! Extended-M3U documents and the section-scoped merges applied to them.

mod document;
mod entry;

pub use document::PlaylistDocument;
pub use entry::{EntryMeta, PlaylistEntry};

/// Bare header directive, used when no EPG is configured.
pub const HEADER_PREFIX: &str = "#EXTM3U";

/// Header directive pointing players at an EPG.
pub fn header_line(epg_url: &str) -> String {
    format!("{HEADER_PREFIX} url-tvg=\"{epg_url}\"")
}

/// Drops every header line in `lines` and puts `header` first.
pub fn normalize_header<S: AsRef<str>>(lines: &[S], header: &str) -> Vec<String> {
    std::iter::once(header.to_string())
        .chain(
            lines
                .iter()
                .map(AsRef::as_ref)
                .filter(|l| !l.trim().starts_with(HEADER_PREFIX))
                .map(str::to_string),
        )
        .collect()
}
