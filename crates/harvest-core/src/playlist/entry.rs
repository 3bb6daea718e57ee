use std::fmt::Write as _;

pub const EXTINF_PREFIX: &str = "#EXTINF";

/// One metadata line and the URL line it describes.
///
/// Directive lines found between the two (`#EXTVLCOPT` and friends) travel
/// with the entry so pass-through entries serialize back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub metadata_line: String,
    pub directives: Vec<String>,
    pub url_line: String,
}

impl PlaylistEntry {
    pub fn new(metadata_line: impl Into<String>, url_line: impl Into<String>) -> Self {
        Self {
            metadata_line: metadata_line.into(),
            directives: Vec::new(),
            url_line: url_line.into(),
        }
    }

    /// Value of the `group-title` attribute, if any.
    pub fn category(&self) -> Option<&str> {
        attribute(&self.metadata_line, "group-title")
    }

    pub fn title(&self) -> Option<&str> {
        let (_, title) = split_title(&self.metadata_line)?;
        Some(title)
    }

    pub fn in_category(&self, name: &str) -> bool {
        self.category() == Some(name)
    }

    pub(crate) fn lines(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.metadata_line.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .chain(std::iter::once(self.url_line.as_str()))
    }
}

/// Display attributes for a freshly written entry. Absent attributes are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMeta {
    pub tvg_id: Option<String>,
    pub tvg_name: Option<String>,
    pub logo: Option<String>,
    pub group: String,
    pub title: String,
}

impl EntryMeta {
    pub fn new(group: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn tvg_id(mut self, id: Option<String>) -> Self {
        self.tvg_id = id;
        self
    }

    pub fn tvg_name(mut self, name: Option<String>) -> Self {
        self.tvg_name = name;
        self
    }

    pub fn logo(mut self, logo: Option<String>) -> Self {
        self.logo = logo;
        self
    }

    pub fn render(&self) -> String {
        let mut line = String::from("#EXTINF:-1");
        let attrs = [
            ("tvg-id", self.tvg_id.as_deref()),
            ("tvg-name", self.tvg_name.as_deref()),
            ("tvg-logo", self.logo.as_deref()),
            ("group-title", Some(self.group.as_str())),
        ];
        for (key, value) in attrs {
            if let Some(v) = value {
                let _ = write!(line, " {key}=\"{}\"", v.replace('"', "'"));
            }
        }
        line.push(',');
        line.push_str(&self.title);
        line
    }

    pub fn into_entry(self, url: impl Into<String>) -> PlaylistEntry {
        PlaylistEntry::new(self.render(), url)
    }
}

fn split_title(line: &str) -> Option<(&str, &str)> {
    // The title follows the first comma outside a quoted attribute value.
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => return Some((&line[..i], &line[i + 1..])),
            _ => {}
        }
    }
    None
}

fn attribute<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let head = split_title(line).map_or(line, |(head, _)| head);
    let needle = format!("{key}=\"");
    let mut from = 0;
    while let Some(pos) = head[from..].find(&needle) {
        let start = from + pos;
        let boundary = start == 0 || head[..start].ends_with(char::is_whitespace);
        let value_start = start + needle.len();
        if boundary {
            let len = head[value_start..].find('"')?;
            return Some(&head[value_start..value_start + len]);
        }
        from = value_start;
    }
    None
}
