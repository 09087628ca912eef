//! Affirmative / negative detection for the latest user turn.
//!
//! Deliberately plain pattern matching over a small vocabulary. It runs
//! before any oracle call so its outcome never depends on model behavior.

use crate::config::ConfirmationConfig;
use crate::error::{MealLogError, Result};
use lazy_static::lazy_static;
use regex::Regex;

const AFFIRMATIVES: &[&str] = &[
    "yes",
    "yeah",
    "yea",
    "yep",
    "yup",
    "ya",
    "y",
    "sure",
    "ok",
    "okay",
    "k",
    "correct",
    "confirm",
    "confirmed",
    "right",
    "that's right",
    "exactly",
    "absolutely",
    "perfect",
    "do it",
    "go ahead",
    "go for it",
    "sounds good",
    "please do",
];

/// Allowed after an affirmative but never enough on their own.
const COURTESIES: &[&str] = &["please", "thanks", "thank you", "that's it"];

const NEGATIVES: &[&str] = &[
    "no",
    "nope",
    "nah",
    "n",
    "cancel",
    "nevermind",
    "never mind",
    "don't",
    "dont",
    "do not",
    "stop",
    "forget it",
    "wrong",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Affirmative,
    Negative,
    Other,
}

#[derive(Debug, Clone)]
pub struct ConfirmationMatcher {
    affirmative: Regex,
    negative: Regex,
}

lazy_static! {
    static ref DEFAULT_MATCHER: ConfirmationMatcher = ConfirmationMatcher::build(&[], &[]).unwrap();
}

fn alternation<'a>(words: impl Iterator<Item = &'a str>) -> String {
    let mut words: Vec<String> = words
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    // Longest first so "do it" wins over "do".
    words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    words.dedup();
    words
        .iter()
        .map(|w| regex::escape(w).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|")
}

fn normalize(text: &str) -> String {
    text.replace('\u{2019}', "'")
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl ConfirmationMatcher {
    fn build(extra_affirmatives: &[String], extra_negatives: &[String]) -> Result<Self> {
        let core = alternation(
            AFFIRMATIVES
                .iter()
                .copied()
                .chain(extra_affirmatives.iter().map(String::as_str)),
        );
        let tail = alternation(
            AFFIRMATIVES
                .iter()
                .chain(COURTESIES.iter())
                .copied()
                .chain(extra_affirmatives.iter().map(String::as_str)),
        );
        let negatives = alternation(
            NEGATIVES
                .iter()
                .copied()
                .chain(extra_negatives.iter().map(String::as_str)),
        );

        let affirmative = Regex::new(&format!(r"^(?:{})(?:\s+(?:{}))*$", core, tail))
            .map_err(|e| MealLogError::Config(format!("affirmative vocabulary: {}", e)))?;
        let negative = Regex::new(&format!(r"^(?:{})(?:\s|$)", negatives))
            .map_err(|e| MealLogError::Config(format!("negative vocabulary: {}", e)))?;
        Ok(Self {
            affirmative,
            negative,
        })
    }

    pub fn from_config(config: &ConfirmationConfig) -> Result<Self> {
        if config.extra_affirmatives.is_empty() && config.extra_negatives.is_empty() {
            return Ok(Self::default());
        }
        Self::build(&config.extra_affirmatives, &config.extra_negatives)
    }

    /// An utterance is affirmative only if it consists entirely of
    /// affirmative phrases; it is negative if it starts with a negative one.
    pub fn classify(&self, text: &str) -> Confirmation {
        let normalized = normalize(text);
        if normalized.is_empty() {
            Confirmation::Other
        } else if self.affirmative.is_match(&normalized) {
            Confirmation::Affirmative
        } else if self.negative.is_match(&normalized) {
            Confirmation::Negative
        } else {
            Confirmation::Other
        }
    }

    pub fn is_affirmative(&self, text: &str) -> bool {
        self.classify(text) == Confirmation::Affirmative
    }

    pub fn is_negative(&self, text: &str) -> bool {
        self.classify(text) == Confirmation::Negative
    }
}

impl Default for ConfirmationMatcher {
    fn default() -> Self {
        DEFAULT_MATCHER.clone()
    }
}
