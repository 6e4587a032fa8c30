//! Participation quality catalog and keyword extraction.
//!
//! [`QualityCatalog`] holds the ordered list of [`QualityLevel`]s, lowest
//! score first.  [`QualityCatalog::extract`] finds the level a transcript
//! expresses, resolving overlapping keywords (`"good"` inside `"very good"`)
//! in favour of the longer, higher-scoring phrase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// QualityLevel
// ---------------------------------------------------------------------------

/// One discrete participation-score category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityLevel {
    /// Display keyword, also matched case-insensitively (e.g. `"Very Good"`).
    pub keyword: String,
    /// Points awarded, `1..=5`.
    pub score: u8,
    /// Additional spoken forms that select this level.
    pub synonyms: Vec<String>,
}

impl QualityLevel {
    fn new(keyword: &str, score: u8, synonyms: &[&str]) -> Self {
        Self {
            keyword: keyword.to_string(),
            score,
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn keyword_lower(&self) -> String {
        self.keyword.to_lowercase()
    }
}

// ---------------------------------------------------------------------------
// QualityCatalog
// ---------------------------------------------------------------------------

/// Immutable, score-ordered set of quality levels.
///
/// # Example
/// ```rust
/// use participation_tracker::interpret::QualityCatalog;
///
/// let catalog = QualityCatalog::default();
/// let level = catalog.extract("the answer was very good").unwrap();
/// assert_eq!(level.score, 4);
/// ```
#[derive(Debug, Clone)]
pub struct QualityCatalog {
    levels: Vec<QualityLevel>,
}

impl QualityCatalog {
    /// Build a catalog from arbitrary levels.  Levels are sorted by
    /// ascending score; the sort is stable so equal scores keep their order.
    pub fn new(mut levels: Vec<QualityLevel>) -> Self {
        levels.sort_by_key(|l| l.score);
        Self { levels }
    }

    /// The built-in five-level catalog with extra synonyms appended.
    ///
    /// `extra` maps a keyword (case-insensitive) to additional spoken forms.
    /// Unknown keywords are logged and skipped.
    pub fn with_synonyms(extra: &BTreeMap<String, Vec<String>>) -> Self {
        let mut catalog = Self::default();
        for (keyword, synonyms) in extra {
            let wanted = keyword.to_lowercase();
            match catalog
                .levels
                .iter_mut()
                .find(|l| l.keyword_lower() == wanted)
            {
                Some(level) => level
                    .synonyms
                    .extend(synonyms.iter().map(|s| s.to_lowercase())),
                None => log::warn!("quality: unknown keyword {keyword:?} in synonym config"),
            }
        }
        catalog
    }

    /// Levels in ascending score order.
    pub fn levels(&self) -> &[QualityLevel] {
        &self.levels
    }

    /// Look up a level by keyword, ignoring case.
    pub fn by_keyword(&self, keyword: &str) -> Option<&QualityLevel> {
        let wanted = keyword.to_lowercase();
        self.levels.iter().find(|l| l.keyword_lower() == wanted)
    }

    /// Return the quality level expressed by `transcript`, or `None`.
    ///
    /// Keywords are checked lowest score first.  A keyword is skipped when a
    /// higher-scoring keyword that contains it is also present, so
    /// `"very good"` never resolves to *Good*.  When no keyword fires, each
    /// level's keyword and synonyms are scanned in catalog order and the
    /// first hit wins.
    pub fn extract(&self, transcript: &str) -> Option<&QualityLevel> {
        let text = transcript.to_lowercase();

        for (idx, level) in self.levels.iter().enumerate() {
            let keyword = level.keyword_lower();
            if keyword.is_empty() || !text.contains(&keyword) {
                continue;
            }
            let shadowed = self.levels[idx + 1..].iter().any(|higher| {
                let longer = higher.keyword_lower();
                longer != keyword && longer.contains(&keyword) && text.contains(&longer)
            });
            if !shadowed {
                log::debug!("quality: {} (score {})", level.keyword, level.score);
                return Some(level);
            }
        }

        for level in &self.levels {
            if text.contains(&level.keyword_lower()) {
                return Some(level);
            }
            if let Some(hit) = level
                .synonyms
                .iter()
                .find(|s| !s.is_empty() && text.contains(&s.to_lowercase()))
            {
                log::debug!("quality: {} via synonym {hit:?}", level.keyword);
                return Some(level);
            }
        }

        log::debug!("quality: no match in {text:?}");
        None
    }
}

impl Default for QualityCatalog {
    fn default() -> Self {
        Self::new(vec![
            QualityLevel::new("Not Quite", 1, &["not quite"]),
            QualityLevel::new("Close", 2, &["close"]),
            QualityLevel::new("Good", 3, &["good"]),
            QualityLevel::new("Very Good", 4, &["very good"]),
            QualityLevel::new("Excellent", 5, &["excellent"]),
        ])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
