//! In-room message search and the locally materialized message log.

use std::collections::HashSet;

use crate::models::Message;

/// A message matching a search, with its position in the full log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit<'a> {
    pub index: usize,
    pub message: &'a Message,
}

/// Messages whose original or translated text contains `query`, ignoring case.
///
/// A blank query means search is inactive and matches nothing.
pub fn search<'a>(messages: &'a [Message], query: &str) -> Vec<SearchHit<'a>> {
    if query.trim().is_empty() {
        return Vec::new();
    }

    let needle = query.to_lowercase();
    messages
        .iter()
        .enumerate()
        .filter(|(_, msg)| {
            msg.original_text.to_lowercase().contains(&needle)
                || msg
                    .translated_text
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&needle))
        })
        .map(|(index, message)| SearchHit { index, message })
        .collect()
}

/// Wrap every case-insensitive occurrence of `query` in `open`/`close`.
///
/// Matching is done character by character, so marks always sit on the
/// original text's character boundaries.
pub fn highlight(text: &str, query: &str, open: &str, close: &str) -> String {
    let needle: Vec<char> = query.chars().collect();
    if needle.is_empty() {
        return text.to_string();
    }
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    let mut out = String::with_capacity(text.len() + 8);
    let mut copied = 0;
    let mut i = 0;
    while i + needle.len() <= chars.len() {
        let window = &chars[i..i + needle.len()];
        let matched = window
            .iter()
            .zip(&needle)
            .all(|(&(_, c), n)| c.to_lowercase().eq(n.to_lowercase()));
        if !matched {
            i += 1;
            continue;
        }

        let start = chars[i].0;
        let end = chars
            .get(i + needle.len())
            .map_or(text.len(), |&(offset, _)| offset);
        out.push_str(&text[copied..start]);
        out.push_str(open);
        out.push_str(&text[start..end]);
        out.push_str(close);
        copied = end;
        i += needle.len();
    }
    out.push_str(&text[copied..]);
    out
}

/// First line of `text`, cut to `max_chars` characters.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    let mut out: String = first_line.chars().take(max_chars).collect();
    if first_line.chars().count() > max_chars || text.lines().nth(1).is_some() {
        out.push_str("...");
    }
    out
}

/// Client-side copy of a room's messages, in store write order.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    seen: HashSet<String>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the log with a store snapshot. Returns how many messages
    /// were not in the previous snapshot.
    ///
    /// Ordering uses the store's write sequence only; message timestamps
    /// are never consulted.
    pub fn apply_snapshot(&mut self, mut snapshot: Vec<Message>) -> usize {
        snapshot.sort_by_key(|m| m.seq);
        let fresh = snapshot
            .iter()
            .filter(|m| !self.seen.contains(&m.id))
            .count();
        self.seen = snapshot.iter().map(|m| m.id.clone()).collect();
        self.messages = snapshot;
        fresh
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The last `n` messages, oldest first.
    pub fn tail(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn search(&self, query: &str) -> Vec<SearchHit<'_>> {
        search(&self.messages, query)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageKind, Role};
    use chrono::{Duration, Utc};

    fn msg(seq: u64, original: &str, translated: Option<&str>) -> Message {
        Message {
            id: format!("m{}", seq),
            seq,
            timestamp: Utc::now(),
            sender_role: Role::Doctor,
            original_text: original.to_string(),
            translated_text: translated.map(String::from),
            language: "en".to_string(),
            kind: MessageKind::Text,
        }
    }

    #[test]
    fn test_search_matches_original_or_translation() {
        let log = vec![
            msg(0, "Do you have a Fever?", Some("¿Tiene fiebre?")),
            msg(1, "No", Some("No")),
            msg(2, "Sí, tengo fiebre", Some("Yes, I have a fever")),
            msg(3, "Audio Message", None),
        ];

        let hits = search(&log, "FEVER");
        let indices: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(indices, vec![0, 2]);

        let hits = search(&log, "fiebre");
        let indices: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(hits[1].message.id, "m2");
    }

    #[test]
    fn test_blank_query_is_inactive() {
        let log = vec![msg(0, "anything", None)];
        assert!(search(&log, "").is_empty());
        assert!(search(&log, "   ").is_empty());
    }

    #[test]
    fn test_query_is_not_trimmed_for_matching() {
        let log = vec![msg(0, "chest pain", None), msg(1, "chestpain", None)];
        let hits = search(&log, "chest ");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
    }

    #[test]
    fn test_search_returns_exact_subsequence() {
        let log: Vec<Message> = (0..50)
            .map(|i| msg(i, &format!("note {}", i), None))
            .collect();
        let hits = search(&log, "note 1");
        let expected: Vec<usize> = (0..50)
            .filter(|i| format!("note {}", i).contains("note 1"))
            .map(|i| i as usize)
            .collect();
        let got: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_highlight_marks_all_matches() {
        assert_eq!(
            highlight("Pain, more PAIN", "pain", "[", "]"),
            "[Pain], more [PAIN]"
        );
        assert_eq!(highlight("nothing here", "x", "[", "]"), "nothing here");
    }

    #[test]
    fn test_highlight_non_ascii_text() {
        // 'İ' lowercases to two chars, so the lowered text no longer lines up.
        assert_eq!(highlight("İstanbul", "stan", "[", "]"), "İ[stan]bul");
        assert_eq!(
            highlight("Ärztin und ÄRZTIN", "ärztin", "<", ">"),
            "<Ärztin> und <ÄRZTIN>"
        );
    }

    #[test]
    fn test_snippet_truncates() {
        assert_eq!(snippet("short", 10), "short");
        assert_eq!(snippet("abcdefghij", 4), "abcd...");
        assert_eq!(snippet("line one\nline two", 20), "line one...");
    }

    #[test]
    fn test_log_orders_by_sequence_not_clock() {
        let now = Utc::now();
        // The second write came from a client whose clock runs an hour behind.
        let mut first = msg(10, "first", None);
        first.timestamp = now;
        let mut second = msg(11, "second", None);
        second.timestamp = now - Duration::hours(1);

        let mut log = MessageLog::new();
        assert_eq!(log.apply_snapshot(vec![second.clone(), first.clone()]), 2);
        let order: Vec<&str> = log.messages().iter().map(|m| m.original_text.as_str()).collect();
        assert_eq!(order, vec!["first", "second"]);

        // Same snapshot again: nothing new.
        assert_eq!(log.apply_snapshot(vec![first, second]), 0);
        assert_eq!(log.len(), 2);
        assert_eq!(log.tail(1)[0].original_text, "second");
    }
}
