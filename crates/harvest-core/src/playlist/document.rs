use tracing::{debug, warn};

use super::entry::{PlaylistEntry, EXTINF_PREFIX};
use super::normalize_header;

/// An extended-M3U playlist: one header line then whole entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistDocument {
    header: String,
    entries: Vec<PlaylistEntry>,
}

impl PlaylistDocument {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            entries: Vec::new(),
        }
    }

    /// Parses `text`, replacing whatever header lines it had with `header`.
    ///
    /// Metadata lines without a URL and URL lines without metadata are
    /// dropped. Blank lines are ignored.
    pub fn parse(text: &str, header: impl Into<String>) -> Self {
        let header = header.into();
        let raw_lines: Vec<&str> = text.lines().collect();
        let lines = normalize_header(&raw_lines, &header);

        let mut entries = Vec::new();
        let mut pending: Option<PlaylistEntry> = None;

        for (idx, raw) in lines.iter().enumerate().skip(1) {
            let line = raw.trim_end_matches('\r');
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if trimmed.starts_with(EXTINF_PREFIX) {
                if let Some(orphan) = pending.take() {
                    warn!(
                        line = idx,
                        metadata = %orphan.metadata_line,
                        "Dropping metadata line without URL"
                    );
                }
                pending = Some(PlaylistEntry::new(line, String::new()));
            } else if trimmed.starts_with('#') {
                match pending.as_mut() {
                    Some(entry) => entry.directives.push(line.to_string()),
                    None => debug!(
                        line = idx,
                        directive = trimmed,
                        "Dropping directive outside an entry"
                    ),
                }
            } else {
                match pending.take() {
                    Some(mut entry) => {
                        entry.url_line = line.to_string();
                        entries.push(entry);
                    }
                    None => warn!(line = idx, url = trimmed, "Dropping URL line without metadata"),
                }
            }
        }

        if let Some(orphan) = pending {
            warn!(metadata = %orphan.metadata_line, "Dropping trailing metadata line without URL");
        }

        Self { header, entries }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn set_header(&mut self, header: impl Into<String>) {
        self.header = header.into();
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the whole body.
    pub fn rebuild_full(&mut self, entries: Vec<PlaylistEntry>) {
        self.entries = entries;
    }

    /// Swaps URLs of matching entries, in order, for `new_urls`.
    ///
    /// Each slot lines up with the next matching entry; a `None` slot leaves
    /// that entry's URL as it was. Stops when either side runs out, so surplus
    /// matching entries keep their old URL and surplus slots are ignored.
    /// Returns the number of URLs actually swapped.
    pub fn replace_section<F>(&mut self, new_urls: &[Option<String>], predicate: F) -> usize
    where
        F: Fn(&PlaylistEntry) -> bool,
    {
        let mut slots = new_urls.iter();
        let mut replaced = 0;
        for entry in self.entries.iter_mut().filter(|e| predicate(&**e)) {
            let Some(slot) = slots.next() else { break };
            if let Some(url) = slot {
                entry.url_line.clone_from(url);
                replaced += 1;
            }
        }
        replaced
    }

    /// Removes every entry whose category is one of `names`. Returns the number removed.
    pub fn prune_categories<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            !entry
                .category()
                .is_some_and(|c| names.iter().any(|n| n.as_ref() == c))
        });
        before - self.entries.len()
    }

    pub fn append_entries<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = PlaylistEntry>,
    {
        self.entries.extend(entries);
    }

    /// Serializes to newline-separated text with the header first.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.header.len() + self.entries.len() * 128);
        out.push_str(&self.header);
        out.push('\n');
        for line in self.entries.iter().flat_map(PlaylistEntry::lines) {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}
