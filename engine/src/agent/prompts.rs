//! Prompt text for the memory protocol
//!
//! The instructional prefix teaches the model the three-section response
//! format. It is rendered from the configured markers so a custom marker
//! set is described to the model exactly as the parser expects it.

use crate::llm::Message;
use crate::protocol::ProtocolMarkers;
use sdk::MemoryRecord;

/// Markers around user input
pub const USER_START: &str = "<user>";
pub const USER_END: &str = "</user>";

/// Markers around search results fed back to the model
pub const MEMORY_OUTPUT_START: &str = "<memory_output>";
pub const MEMORY_OUTPUT_END: &str = "</memory_output>";

/// Reminder placed before every user message
const BEFORE_USER_INPUT: &str = "Remember to search memory if it helps and to summarize anything new \
you learned about the user. A memory query is a short noun phrase, not a command. \
You may hold back the reply until your memory search has returned.\n";

/// Reminder placed before search results
const BEFORE_MEMORY_OUTPUT: &str = "You may search memory again if needed. Use what you found \
the way a person recalls something they already know.\n";

/// Sent instead of results when the search itself failed
const SEARCH_FAILED_NOTE: &str = "Memory search failed, so nothing could be recalled this time. \
Do not repeat the same query.\n";

/// Render the system prompt for `markers`
pub fn system_prompt(markers: &ProtocolMarkers) -> String {
    let q = &markers.query;
    let s = &markers.summary;
    let r = &markers.reply;

    format!(
        "You are a helpful assistant with long-term memory about the user you are talking to.\n\
         \n\
         Every response may contain up to three sections, always in this order:\n\
         1. {qs}search terms{qe} to search your memory about the user. The results come back \
         inside {mos}{moe} in the next message.\n\
         2. {ss}new facts{se} to save anything new and worth remembering that the user just told you.\n\
         3. {rs}your answer{re} to reply to the user.\n\
         \n\
         Rules:\n\
         - Search for details about the user, not general knowledge. Write queries as short noun \
         phrases such as `John's Linux kernel version`, never as instructions.\n\
         - Omit the reply while a search is still pending; you will get another turn once the \
         results arrive.\n\
         - Omit the summary when there is nothing new to remember.\n\
         - The user's message is given inside {us}{ue}.",
        qs = q.start,
        qe = q.end,
        ss = s.start,
        se = s.end,
        rs = r.start,
        re = r.end,
        mos = MEMORY_OUTPUT_START,
        moe = MEMORY_OUTPUT_END,
        us = USER_START,
        ue = USER_END,
    )
}

/// System prompt plus a short worked exchange showing the format
pub fn instructional_history(markers: &ProtocolMarkers) -> Vec<Message> {
    let q = &markers.query;
    let s = &markers.summary;
    let r = &markers.reply;

    vec![
        Message::system(system_prompt(markers)),
        Message::user(frame_user_input(
            "My laptop keeps overheating since I upgraded the kernel.",
        )),
        Message::assistant(format!(
            "{}user's laptop model{}{}User upgraded the kernel on their laptop recently; it has overheated since.{}",
            q.start, q.end, s.start, s.end
        )),
        Message::user(frame_memory_output(&[], false)),
        Message::assistant(format!(
            "{}Sorry to hear that. Which kernel version are you on now, and did the fans change behaviour after the upgrade?{}",
            r.start, r.end
        )),
    ]
}

/// Wrap user input in its reminder and markers
pub fn frame_user_input(input: &str) -> String {
    format!("{}{}{}{}", BEFORE_USER_INPUT, USER_START, input, USER_END)
}

/// Render search results for the model
///
/// Results are a JSON array of `{content, time}` objects. When the search
/// failed the array is empty and an explicit note says so, so the model
/// does not mistake a failure for "nothing remembered".
pub fn frame_memory_output(records: &[MemoryRecord], search_failed: bool) -> String {
    let payload = serde_json::to_string(records).unwrap_or_else(|_| "[]".to_string());
    let note = if search_failed { SEARCH_FAILED_NOTE } else { "" };

    format!(
        "{}{}{}{}{}",
        BEFORE_MEMORY_OUTPUT, note, MEMORY_OUTPUT_START, payload, MEMORY_OUTPUT_END
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ResponseParser, SectionMarkers};

    #[test]
    fn test_system_prompt_uses_configured_markers() {
        let markers = ProtocolMarkers {
            query: SectionMarkers::tag("whoosh"),
            ..ProtocolMarkers::default()
        };
        let prompt = system_prompt(&markers);

        assert!(prompt.contains("<whoosh>search terms</whoosh>"));
        assert!(!prompt.contains("<query>"));
    }

    #[test]
    fn test_worked_example_parses_with_same_markers() {
        let markers = ProtocolMarkers::default();
        let history = instructional_history(&markers);
        let parser = ResponseParser::new(markers);

        let first = parser.parse(&history[2].content);
        assert_eq!(first.query.as_deref(), Some("user's laptop model"));
        assert!(first.summary.is_some());
        assert_eq!(first.reply, None);

        let second = parser.parse(&history[4].content);
        assert_eq!(second.query, None);
        assert!(second.reply.is_some());
    }

    #[test]
    fn test_memory_output_is_json_array() {
        let records = vec![MemoryRecord {
            content: "uses Arch Linux".to_string(),
            time: "2024-03-01 10:00:00+00:00".to_string(),
        }];
        let framed = frame_memory_output(&records, false);

        let start = framed.find(MEMORY_OUTPUT_START).unwrap() + MEMORY_OUTPUT_START.len();
        let end = framed.find(MEMORY_OUTPUT_END).unwrap();
        let parsed: Vec<MemoryRecord> = serde_json::from_str(&framed[start..end]).unwrap();
        assert_eq!(parsed, records);
        assert!(!framed.contains("failed"));
    }

    #[test]
    fn test_failed_search_is_flagged() {
        let framed = frame_memory_output(&[], true);
        assert!(framed.contains("Memory search failed"));
        assert!(framed.contains("<memory_output>[]</memory_output>"));
    }
}
