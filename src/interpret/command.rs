//! Spoken start/stop command matching and participation trigger words.
//!
//! [`matches`] tolerates speech-to-text noise in three passes, first hit
//! wins:
//!
//! 1. the normalised transcript equals a phrase,
//! 2. the transcript contains a phrase,
//! 3. for multi-word phrases, at least two phrase words occur in the
//!    transcript in the same relative order (each phrase word may sit
//!    inside a longer transcript word).
//!
//! Pass 3 lets `"begin the recording"` through but still rejects scrambled
//! text such as `"recording will begin"`.

// ---------------------------------------------------------------------------
// Static phrase tables
// ---------------------------------------------------------------------------

/// Phrases that start participation tracking.
pub static START_PHRASES: &[&str] = &[
    "start recording",
    "begin recording",
    "start tracking",
    "begin tracking",
    "start monitoring",
    "begin monitoring",
    "start session",
    "begin session",
    "start class",
    "begin class",
    "start now",
    "let's start",
    "let's begin",
];

/// Phrases that stop participation tracking.
pub static STOP_PHRASES: &[&str] = &[
    "stop recording",
    "end recording",
    "stop tracking",
    "end tracking",
    "stop monitoring",
    "end monitoring",
    "stop session",
    "end session",
    "stop class",
    "end class",
    "stop now",
    "that's all",
    "we're done",
];

/// Words signalling that an utterance is about a student's participation.
pub static PARTICIPATION_TRIGGERS: &[&str] = &[
    "participates",
    "answers",
    "responds",
    "contributes",
    "shares",
    "asks",
    "comments",
    "explains",
    "discusses",
    "presents",
    "answered",
    "responded",
    "contributed",
    "shared",
    "asked",
    "commented",
    "explained",
    "discussed",
    "presented",
    "said",
    "says",
    "speaking",
    "spoke",
    "answer",
    "response",
    "question",
    "point",
    "participation",
    "contribution",
];

/// Minimum number of in-order phrase words for a word-subsequence match.
const MIN_ORDERED_WORDS: usize = 2;

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Lower-case, drop apostrophes and collapse runs of whitespace.
///
/// ```
/// use participation_tracker::interpret::command::normalize;
///
/// assert_eq!(normalize("  Let's   START "), "lets start");
/// ```
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace(['\'', '\u{2019}'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Returns `true` when `transcript` expresses any phrase in `phrases`.
///
/// ```
/// use participation_tracker::interpret::command::{matches, START_PHRASES};
///
/// assert!(matches("lets start please", START_PHRASES));
/// assert!(!matches("i will not start today", START_PHRASES));
/// ```
pub fn matches<S: AsRef<str>>(transcript: &str, phrases: &[S]) -> bool {
    let text = normalize(transcript);
    if text.is_empty() {
        return false;
    }

    let normalized: Vec<String> = phrases
        .iter()
        .map(|p| normalize(p.as_ref()))
        .filter(|p| !p.is_empty())
        .collect();

    if normalized.iter().any(|p| *p == text) {
        log::debug!("command: exact match in {text:?}");
        return true;
    }

    if normalized.iter().any(|p| text.contains(p.as_str())) {
        log::debug!("command: substring match in {text:?}");
        return true;
    }

    let words: Vec<&str> = text.split(' ').collect();
    let hit = normalized
        .iter()
        .find(|phrase| ordered_word_hits(&words, phrase) >= MIN_ORDERED_WORDS);
    if let Some(phrase) = hit {
        log::debug!("command: ordered-word match for {phrase:?} in {text:?}");
        return true;
    }

    false
}

/// Count phrase words found in `words` in increasing position order.
///
/// A phrase word that cannot be placed after the previous hit is skipped,
/// so one misrecognised word does not break the chain.
fn ordered_word_hits(words: &[&str], phrase: &str) -> usize {
    let phrase_words: Vec<&str> = phrase.split(' ').collect();
    if phrase_words.len() < MIN_ORDERED_WORDS {
        return 0;
    }

    let mut hits = 0;
    let mut next = 0;
    for wanted in phrase_words {
        if let Some(offset) = words[next..].iter().position(|w| w.contains(wanted)) {
            hits += 1;
            next += offset + 1;
        }
    }
    hits
}

/// Return the first trigger word contained in `transcript`, if any.
pub fn find_trigger<'a, S: AsRef<str>>(transcript: &str, triggers: &'a [S]) -> Option<&'a str> {
    let text = transcript.to_lowercase();
    triggers
        .iter()
        .map(|t| t.as_ref())
        .find(|t| !t.is_empty() && text.contains(&t.to_lowercase()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches("Start Tracking", START_PHRASES));
        assert!(matches("  stop tracking  ", STOP_PHRASES));
    }

    #[test]
    fn substring_match() {
        assert!(matches("okay everyone start class now", START_PHRASES));
        assert!(matches("alright that's all for today", STOP_PHRASES));
    }

    #[test]
    fn apostrophe_free_transcript_matches() {
        assert!(matches("lets start please", START_PHRASES));
        assert!(matches("ok were done", STOP_PHRASES));
    }

    #[test]
    fn ordered_words_with_gap_match() {
        assert!(matches("begin the recording", START_PHRASES));
        // "recordings" contains "recording"
        assert!(matches("please stop all recordings", STOP_PHRASES));
    }

    #[test]
    fn scrambled_order_does_not_match() {
        assert!(!matches("recording will begin", START_PHRASES));
    }

    #[test]
    fn single_word_overlap_does_not_match() {
        assert!(!matches("i will not start today", START_PHRASES));
        assert!(!matches("smith answers very good", START_PHRASES));
        assert!(!matches("smith answers very good", STOP_PHRASES));
    }

    #[test]
    fn empty_inputs() {
        assert!(!matches("", START_PHRASES));
        assert!(!matches("   ", START_PHRASES));
        let none: [&str; 0] = [];
        assert!(!matches("start tracking", &none));
    }

    #[test]
    fn owned_phrase_lists_work() {
        let phrases = vec!["wrap it up".to_string()];
        assert!(matches("lets wrap it up", &phrases));
    }

    #[test]
    fn ordered_word_hits_skips_missing_words() {
        let words = vec!["please", "start", "the", "session"];
        assert_eq!(ordered_word_hits(&words, "start session"), 2);
        assert_eq!(ordered_word_hits(&words, "session start"), 1);
        assert_eq!(ordered_word_hits(&words, "start"), 0);
    }

    #[test]
    fn trigger_detection() {
        assert_eq!(
            find_trigger("smith answers very good", PARTICIPATION_TRIGGERS),
            Some("answers")
        );
        assert_eq!(find_trigger("smith very good", PARTICIPATION_TRIGGERS), None);
    }
}
