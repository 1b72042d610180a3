use chrono::NaiveDateTime;

/// `strftime` pattern of history timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Width of a formatted timestamp ("YYYY-MM-DD HH:MM:SS").
const TIMESTAMP_LEN: usize = 19;

/// A single decoded payload together with the local time it was scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub payload: String,
}

impl HistoryEntry {
    pub fn new(timestamp: NaiveDateTime, payload: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.format(TIMESTAMP_FORMAT).to_string(),
            payload: payload.into(),
        }
    }

    /// Render as one line of the history file, trailing newline included.
    pub fn to_line(&self) -> String {
        format!("{} {}\n", self.timestamp, self.payload)
    }

    /// Parse a line produced by [`to_line`](Self::to_line).
    ///
    /// Returns `None` for lines that do not start with a valid timestamp
    /// followed by a single space.
    pub fn parse_line(line: &str) -> Option<Self> {
        if line.len() < TIMESTAMP_LEN || !line.is_char_boundary(TIMESTAMP_LEN) {
            return None;
        }

        let (timestamp, rest) = line.split_at(TIMESTAMP_LEN);
        NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
        let payload = rest.strip_prefix(' ')?;

        Some(Self {
            timestamp: timestamp.to_string(),
            payload: payload.to_string(),
        })
    }
}

/// Newest-first scan history.
///
/// Text loaded from disk is kept verbatim (`archived`) and only entries added
/// during this run are held as structured values. Rendering puts the new
/// entries above the archived text, so the file stays newest-first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryLog {
    recent: Vec<HistoryEntry>,
    archived: String,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap previously persisted history text without parsing it.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            recent: Vec::new(),
            archived: text.into(),
        }
    }

    /// Prepend a new entry stamped with `timestamp`.
    pub fn append_at(
        &mut self,
        payload: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> &HistoryEntry {
        self.recent.insert(0, HistoryEntry::new(timestamp, payload));
        &self.recent[0]
    }

    /// Full history text, newest first.
    pub fn render(&self) -> String {
        let mut text: String = self.recent.iter().map(HistoryEntry::to_line).collect();
        text.push_str(&self.archived);
        text
    }

    /// Structured view of the whole history, newest first.
    ///
    /// Lossy: payloads with embedded newlines split into several lines and
    /// only the first of them parses back.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.render()
            .lines()
            .filter_map(HistoryEntry::parse_line)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty() && self.archived.is_empty()
    }
}
