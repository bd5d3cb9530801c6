//! Response Protocol
//!
//! The model talks to the engine through up to three tagged sections in
//! each response, in this order:
//!
//! 1. a memory query (`<query>...</query>`) asking the engine to search
//! 2. a memory summary (`<summary>...</summary>`) to be saved as a note
//! 3. a user reply (`<reply>...</reply>`) to show to the user
//!
//! Models do not always close every tag, so each section may fall back to
//! a neighbour's marker as its boundary: a missing start marker falls back
//! to the end marker of the previous section, and a missing end marker to
//! the start marker of the next one. Every input resolves to a value or to
//! "absent" for each section; there is no failure case.

use serde::{Deserialize, Serialize};

/// Start/end marker pair for one section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionMarkers {
    pub start: String,
    pub end: String,
}

impl SectionMarkers {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// `<name>` / `</name>`
    pub fn tag(name: &str) -> Self {
        Self::new(format!("<{}>", name), format!("</{}>", name))
    }
}

/// Markers for all three sections
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtocolMarkers {
    #[serde(default = "default_query_markers")]
    pub query: SectionMarkers,

    #[serde(default = "default_summary_markers")]
    pub summary: SectionMarkers,

    #[serde(default = "default_reply_markers")]
    pub reply: SectionMarkers,
}

fn default_query_markers() -> SectionMarkers {
    SectionMarkers::tag("query")
}

fn default_summary_markers() -> SectionMarkers {
    SectionMarkers::tag("summary")
}

fn default_reply_markers() -> SectionMarkers {
    SectionMarkers::tag("reply")
}

impl Default for ProtocolMarkers {
    fn default() -> Self {
        Self {
            query: default_query_markers(),
            summary: default_summary_markers(),
            reply: default_reply_markers(),
        }
    }
}

impl ProtocolMarkers {
    /// Check that all six markers are non-empty and distinct
    pub fn validate(&self) -> Result<(), String> {
        let all = self.all();
        if all.iter().any(|m| m.is_empty()) {
            return Err("protocol markers must not be empty".to_string());
        }
        for (i, marker) in all.iter().enumerate() {
            if all[i + 1..].contains(marker) {
                return Err(format!("protocol marker '{}' is used twice", marker));
            }
        }
        Ok(())
    }

    fn all(&self) -> [&str; 6] {
        [
            &self.query.start,
            &self.query.end,
            &self.summary.start,
            &self.summary.end,
            &self.reply.start,
            &self.reply.end,
        ]
    }
}

/// Sections extracted from one model response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub query: Option<String>,
    pub summary: Option<String>,
    pub reply: Option<String>,
}

impl ParsedResponse {
    /// True when no section was found
    pub fn is_empty(&self) -> bool {
        self.query.is_none() && self.summary.is_none() && self.reply.is_none()
    }
}

/// Extract one section from `text`
///
/// `alt_start` and `alt_end` are fallback boundaries used when the
/// section's own marker is missing; pass `""` for none.
///
/// 1. If neither `start` nor `end` occurs, the section is absent.
/// 2. The effective start is `start` if present, else `alt_start` if
///    non-empty, else none.
/// 3. Keep everything after the *last* occurrence of the effective start
///    (the whole text when there is none or it does not occur).
/// 4. The effective end is `end` if present in `text`, else `alt_end` if
///    non-empty.
/// 5. Keep everything before the *first* occurrence of the effective end
///    within the remainder from step 3.
pub fn parse_section<'a>(
    text: &'a str,
    start: &str,
    alt_start: &str,
    end: &str,
    alt_end: &str,
) -> Option<&'a str> {
    let has_start = !start.is_empty() && text.contains(start);
    let has_end = !end.is_empty() && text.contains(end);

    if !has_start && !has_end {
        return None;
    }

    let effective_start = if has_start {
        start
    } else {
        alt_start
    };

    let after_start = if effective_start.is_empty() {
        text
    } else {
        match text.rfind(effective_start) {
            Some(pos) => &text[pos + effective_start.len()..],
            None => text,
        }
    };

    let effective_end = if has_end { end } else { alt_end };

    if effective_end.is_empty() {
        return Some(after_start);
    }

    Some(match after_start.find(effective_end) {
        Some(pos) => &after_start[..pos],
        None => after_start,
    })
}

/// Parser for the three-section response protocol
#[derive(Debug, Clone, Default)]
pub struct ResponseParser {
    markers: ProtocolMarkers,
}

impl ResponseParser {
    pub fn new(markers: ProtocolMarkers) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &ProtocolMarkers {
        &self.markers
    }

    /// Split a raw model response into its query, summary and reply
    ///
    /// Fallback chain:
    /// - query: no alternative start, summary start as alternative end
    /// - summary: query end as alternative start, reply start as alternative end
    /// - reply: summary end as alternative start, no alternative end
    pub fn parse(&self, text: &str) -> ParsedResponse {
        let ProtocolMarkers {
            query,
            summary,
            reply,
        } = &self.markers;

        ParsedResponse {
            query: parse_section(text, &query.start, "", &query.end, &summary.start)
                .map(str::to_string),
            summary: parse_section(text, &summary.start, &query.end, &summary.end, &reply.start)
                .map(str::to_string),
            reply: parse_section(text, &reply.start, &summary.end, &reply.end, "")
                .map(str::to_string),
        }
    }
}
