//! WebVTT generation and title cleaning (spec §6, bit-exact).

use reflector_domain::model::Word;

const CUE_GAP_SECS: f64 = 1.5;

/// Group consecutive words into cues: a new cue starts when the speaker
/// changes or the gap to the previous word exceeds 1.5s (spec §6). `words`
/// must already be sorted by `start`.
fn cues(words: &[Word]) -> Vec<Vec<&Word>> {
    let mut cues: Vec<Vec<&Word>> = Vec::new();
    for word in words {
        let starts_new_cue = match cues.last().and_then(|c| c.last()) {
            None => true,
            Some(prev) => prev.speaker != word.speaker || word.start - prev.end > CUE_GAP_SECS,
        };
        if starts_new_cue {
            cues.push(vec![word]);
        } else {
            cues.last_mut().unwrap().push(word);
        }
    }
    cues
}

fn format_timestamp(secs: f64) -> String {
    let total_ms = (secs * 1000.0).round() as i64;
    let ms = total_ms.rem_euclid(1000);
    let total_secs = total_ms / 1000;
    let s = total_secs % 60;
    let total_mins = total_secs / 60;
    let m = total_mins % 60;
    let h = total_mins / 60;
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}

/// Render `words` (sorted by `start`) into a WebVTT document (spec §6).
/// Empty input yields the minimal valid document `"WEBVTT\n\n"`.
pub fn render(words: &[Word]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for cue in cues(words) {
        let Some(first) = cue.first() else { continue };
        let Some(last) = cue.last() else { continue };
        let text = cue
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&format!(
            "{} --> {}\n<v Speaker{}>{}\n\n",
            format_timestamp(first.start),
            format_timestamp(last.end),
            first.speaker,
            text
        ));
    }
    out
}

/// Title cleaning rule (spec §6): strip surrounding quotes, then
/// capitalise each word iff it's the first word or longer than 3 chars,
/// lowercasing the rest; join with single spaces.
pub fn clean_title(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c| c == '\'' || c == '"');
    trimmed
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            if i == 0 || word.chars().count() > 3 {
                capitalize(word)
            } else {
                word.to_lowercase()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}
