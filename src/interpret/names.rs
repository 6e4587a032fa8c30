//! Roster name resolution.
//!
//! [`NameResolver`] scores every [`Candidate`] against the words of a
//! transcript and reports the best one, provided it clears the confidence
//! threshold.  The weights in [`NameWeights`] were tuned by hand against
//! classroom recordings and are exposed through configuration.
//!
//! | Signal                                   | Default points |
//! |------------------------------------------|----------------|
//! | last name is a transcript word           | 5              |
//! | otherwise, partial last-name overlap     | 2              |
//! | first name is a transcript word          | 3 (first/both) |
//! | otherwise, partial first-name overlap    | 1 (first/both) |
//! | `"first last"` or `"last first"` present | 8 (both)       |

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NameDetectionMode
// ---------------------------------------------------------------------------

/// Which parts of a student's name the instructor is expected to say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameDetectionMode {
    FirstNameOnly,
    LastNameOnly,
    Both,
}

impl Default for NameDetectionMode {
    fn default() -> Self {
        Self::Both
    }
}

impl NameDetectionMode {
    /// Parse the short names used on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "first" | "first_name_only" | "firstname" => Some(Self::FirstNameOnly),
            "last" | "last_name_only" | "lastname" => Some(Self::LastNameOnly),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// Read view of a roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Opaque reference back to the roster entry.
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

impl Candidate {
    pub fn new(
        id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// `"Last, First"` as shown in notices.
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

// ---------------------------------------------------------------------------
// NameWeights
// ---------------------------------------------------------------------------

/// Tunable scoring constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameWeights {
    pub exact_last: u32,
    pub partial_last: u32,
    pub exact_first: u32,
    pub partial_first: u32,
    pub full_name: u32,
    /// Both the transcript word and the name must be strictly longer than
    /// this many characters for a partial match to count.
    pub partial_min_len: usize,
    /// Minimum total score for a candidate to be reported.
    pub threshold: u32,
}

impl Default for NameWeights {
    fn default() -> Self {
        Self {
            exact_last: 5,
            partial_last: 2,
            exact_first: 3,
            partial_first: 1,
            full_name: 8,
            partial_min_len: 3,
            threshold: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// NameResolver
// ---------------------------------------------------------------------------

/// A resolved candidate and the score that selected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameMatch<'a> {
    pub candidate: &'a Candidate,
    pub score: u32,
}

/// Scores roster candidates against a transcript.
#[derive(Debug, Clone, Default)]
pub struct NameResolver {
    weights: NameWeights,
}

impl NameResolver {
    pub fn new(weights: NameWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &NameWeights {
        &self.weights
    }

    /// Return the best-scoring candidate mentioned in `transcript`.
    ///
    /// Ties keep the earlier roster entry.  Returns `None` when the best
    /// score is below [`NameWeights::threshold`].
    ///
    /// ```
    /// use participation_tracker::interpret::{Candidate, NameDetectionMode, NameResolver};
    ///
    /// let roster = vec![Candidate::new("1", "John", "Smith")];
    /// let hit = NameResolver::default()
    ///     .resolve("smith answers well", &roster, NameDetectionMode::Both)
    ///     .unwrap();
    /// assert_eq!(hit.candidate.last_name, "Smith");
    /// ```
    pub fn resolve<'a>(
        &self,
        transcript: &str,
        roster: &'a [Candidate],
        mode: NameDetectionMode,
    ) -> Option<NameMatch<'a>> {
        let text = transcript.to_lowercase();
        let words: Vec<&str> = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .collect();
        let word_set: HashSet<&str> = words.iter().copied().collect();

        let mut best: Option<NameMatch<'a>> = None;
        for candidate in roster {
            let score = self.score(&text, &words, &word_set, candidate, mode);
            log::trace!(
                "names: {} {} scored {score}",
                candidate.first_name,
                candidate.last_name
            );
            if score > best.map_or(0, |b| b.score) {
                best = Some(NameMatch { candidate, score });
            }
        }

        match best {
            Some(hit) if hit.score >= self.weights.threshold => {
                log::debug!(
                    "names: matched {} with score {}",
                    hit.candidate.display_name(),
                    hit.score
                );
                Some(hit)
            }
            _ => {
                log::debug!("names: no candidate above threshold in {text:?}");
                None
            }
        }
    }

    fn score(
        &self,
        text: &str,
        words: &[&str],
        word_set: &HashSet<&str>,
        candidate: &Candidate,
        mode: NameDetectionMode,
    ) -> u32 {
        let w = &self.weights;
        let first = candidate.first_name.to_lowercase();
        let last = candidate.last_name.to_lowercase();

        let mut score = self.part_score(&last, words, word_set, w.exact_last, w.partial_last);

        if matches!(mode, NameDetectionMode::FirstNameOnly | NameDetectionMode::Both) {
            score += self.part_score(&first, words, word_set, w.exact_first, w.partial_first);
        }

        if mode == NameDetectionMode::Both && !first.is_empty() && !last.is_empty() {
            let forward = format!("{first} {last}");
            let reverse = format!("{last} {first}");
            if text.contains(&forward) || text.contains(&reverse) {
                score += w.full_name;
            }
        }

        score
    }

    fn part_score(
        &self,
        name: &str,
        words: &[&str],
        word_set: &HashSet<&str>,
        exact: u32,
        partial: u32,
    ) -> u32 {
        if name.is_empty() {
            return 0;
        }
        if word_set.contains(name) {
            return exact;
        }
        let min = self.weights.partial_min_len;
        let long_enough = |s: &str| s.chars().count() > min;
        let overlaps = long_enough(name)
            && words
                .iter()
                .any(|w| long_enough(w) && (w.contains(name) || name.contains(w)));
        if overlaps {
            partial
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
