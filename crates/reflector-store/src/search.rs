//! In-memory reverse index for full-text transcript search (spec §4.1).
//!
//! Maps lowercase words to transcript IDs with match counts. Unlike the
//! session index this is derived from, there's no JSONL directory to scan
//! at startup — the store calls [`TranscriptSearchIndex::index`] inline,
//! right after the title/summary/webvtt field it mutates.

use std::collections::HashMap;

use parking_lot::RwLock;

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub transcript_id: String,
    pub match_count: usize,
    pub preview: String,
}

const MAX_PREVIEW_LEN: usize = 160;
const MAX_RESULTS: usize = 50;

/// word -> { transcript_id -> count }
pub struct TranscriptSearchIndex {
    index: RwLock<HashMap<String, HashMap<String, usize>>>,
    /// (transcript_id, word) -> first matching field content, for preview
    previews: RwLock<HashMap<(String, String), String>>,
}

impl TranscriptSearchIndex {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(HashMap::new()),
            previews: RwLock::new(HashMap::new()),
        }
    }

    /// Index `content` (the full text of one field — title, long_summary,
    /// or the rendered WebVTT) against `transcript_id`. `field` exists only
    /// to namespace previews; it doesn't affect ranking.
    pub fn index(&self, transcript_id: &str, content: &str, field: &str) {
        let words = tokenize(content);
        if words.is_empty() {
            return;
        }

        let mut idx = self.index.write();
        let mut previews = self.previews.write();

        for word in &words {
            let transcripts = idx.entry(word.clone()).or_default();
            *transcripts.entry(transcript_id.to_owned()).or_insert(0) += 1;

            let key = (transcript_id.to_owned(), word.clone());
            previews
                .entry(key)
                .or_insert_with(|| truncate_preview(content, field));
        }
    }

    /// Search for transcripts matching every word in `query` (AND semantics).
    /// Returns up to 50 results sorted by total match count descending.
    pub fn query(&self, query: &str) -> Vec<SearchHit> {
        let query_words = tokenize(query);
        if query_words.is_empty() {
            return vec![];
        }

        let idx = self.index.read();
        let previews = self.previews.read();

        let mut candidates: Option<HashMap<String, usize>> = None;
        for word in &query_words {
            let word_matches = match idx.get(word) {
                Some(m) => m,
                None => return vec![],
            };

            candidates = Some(match candidates {
                None => word_matches.clone(),
                Some(current) => current
                    .into_iter()
                    .filter_map(|(tid, count)| word_matches.get(&tid).map(|wc| (tid, count + wc)))
                    .collect(),
            });
        }

        let scored = match candidates {
            Some(c) => c,
            None => return vec![],
        };

        let mut results: Vec<_> = scored.into_iter().collect();
        results.sort_by(|a, b| b.1.cmp(&a.1));
        results.truncate(MAX_RESULTS);

        results
            .into_iter()
            .map(|(transcript_id, match_count)| {
                let preview = query_words
                    .iter()
                    .find_map(|w| previews.get(&(transcript_id.clone(), w.clone())).cloned())
                    .unwrap_or_default();
                SearchHit {
                    transcript_id,
                    match_count,
                    preview,
                }
            })
            .collect()
    }
}

impl Default for TranscriptSearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2)
        .map(String::from)
        .collect()
}

fn truncate_preview(content: &str, field: &str) -> String {
    if content.len() <= MAX_PREVIEW_LEN {
        format!("{field}: {content}")
    } else {
        let cut = content
            .char_indices()
            .take_while(|(i, _)| *i < MAX_PREVIEW_LEN)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{field}: {}…", &content[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_and_finds_by_word() {
        let idx = TranscriptSearchIndex::new();
        idx.index("t1", "Quarterly roadmap review", "title");
        let hits = idx.query("roadmap");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].transcript_id, "t1");
    }

    #[test]
    fn and_semantics_across_words() {
        let idx = TranscriptSearchIndex::new();
        idx.index("t1", "budget and headcount planning", "long_summary");
        idx.index("t2", "budget planning only", "long_summary");
        let hits = idx.query("budget headcount");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].transcript_id, "t1");
    }

    #[test]
    fn unknown_word_yields_no_hits() {
        let idx = TranscriptSearchIndex::new();
        idx.index("t1", "budget planning", "long_summary");
        assert!(idx.query("nonexistent").is_empty());
    }

    #[test]
    fn results_ranked_by_match_count() {
        let idx = TranscriptSearchIndex::new();
        idx.index("t1", "alpha alpha alpha", "title");
        idx.index("t2", "alpha", "title");
        let hits = idx.query("alpha");
        assert_eq!(hits[0].transcript_id, "t1");
    }
}
