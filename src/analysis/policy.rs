//! Word counting and the summary requirement derived from it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt::{Display, Formatter};

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static CJK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\u{4e00}-\u{9fff}\u{3400}-\u{4dbf}\u{3000}-\u{303f}]").expect("valid cjk regex")
});
static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid word regex"));

/// Count words in (possibly HTML) content.
///
/// Markup is ignored, every CJK ideograph or CJK punctuation mark counts as
/// one word, and everything else is split on runs of letters and digits.
pub fn count_words(content: &str) -> usize {
    let text = TAG_RE.replace_all(content, " ");
    let cjk = CJK_RE.find_iter(&text).count();
    let rest = CJK_RE.replace_all(&text, " ");
    cjk + WORD_RE.find_iter(&rest).count()
}

/// True when fewer than half of the title's letters are Latin, meaning an
/// English rendering should be requested alongside the analysis.
pub fn needs_title_translation(title: &str) -> bool {
    let letters: Vec<char> = title.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return false;
    }
    let latin = letters.iter().filter(|c| c.is_ascii_alphabetic()).count();
    latin * 2 <= letters.len()
}

/// Target length handed to the summarizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLength {
    Standard,
    Extended,
}

impl TargetLength {
    /// Inclusive word range for the generated summary.
    pub fn word_range(self) -> (u32, u32) {
        match self {
            TargetLength::Standard => (100, 200),
            TargetLength::Extended => (250, 500),
        }
    }
}

impl Display for TargetLength {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (low, high) = self.word_range();
        write!(f, "{low}-{high} words")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SummaryRequirement {
    pub should_skip: bool,
    pub target_length: Option<TargetLength>,
}

/// Thresholds deciding whether and how long to summarize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryPolicy {
    min_words: usize,
    long_form_words: usize,
}

impl SummaryPolicy {
    pub fn new(min_words: usize, long_form_words: usize) -> Self {
        Self {
            min_words,
            long_form_words: long_form_words.max(min_words),
        }
    }

    pub fn min_words(&self) -> usize {
        self.min_words
    }

    pub fn requirement(&self, word_count: usize) -> SummaryRequirement {
        if word_count < self.min_words {
            return SummaryRequirement {
                should_skip: true,
                target_length: None,
            };
        }
        let target = if word_count <= self.long_form_words {
            TargetLength::Standard
        } else {
            TargetLength::Extended
        };
        SummaryRequirement {
            should_skip: false,
            target_length: Some(target),
        }
    }
}

impl Default for SummaryPolicy {
    fn default() -> Self {
        Self::new(100, 1500)
    }
}
