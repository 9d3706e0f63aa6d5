//! Keyword-based prompt moderation
//!
//! Normalizes prompts before matching so that common evasion tricks
//! (leetspeak, separator padding) still hit the keyword table. The request
//! layer consults this gate before any session work begins.

use once_cell::sync::Lazy;
use regex::Regex;

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-_\.]+").unwrap());

const DEFAULT_KEYWORDS: &[&str] = &[
    // NSFW terms
    "nude", "naked", "nsfw", "explicit", "pornographic", "sexual",
    "xxx", "erotic", "adult content", "lewd",
    // Violence
    "gore", "blood", "violent", "gruesome", "mutilated",
    // Harmful content
    "hate", "racist", "offensive", "discriminatory",
];

/// Fold a prompt into its canonical matching form: lowercase, leetspeak
/// substitutions applied, separators collapsed away.
fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let folded: String = lowered
        .chars()
        .map(|ch| match ch {
            '0' => 'o',
            '1' => 'i',
            '3' => 'e',
            '4' => 'a',
            '5' => 's',
            '7' => 't',
            '@' => 'a',
            '$' => 's',
            '8' => 'b',
            other => other,
        })
        .collect();
    SEPARATORS.replace_all(&folded, "").into_owned()
}

/// Keyword filter for inbound prompts.
#[derive(Debug, Clone)]
pub struct PromptFilter {
    blocked: Vec<String>,
}

impl PromptFilter {
    /// Filter with the built-in keyword table, normalized once.
    pub fn new() -> Self {
        Self::with_keywords(DEFAULT_KEYWORDS.iter().copied())
    }

    /// Filter with a caller-supplied keyword table.
    pub fn with_keywords<'a>(keywords: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            blocked: keywords.into_iter().map(normalize).collect(),
        }
    }

    /// Returns true when the prompt should be rejected.
    pub fn is_blocked(&self, prompt: &str) -> bool {
        if prompt.is_empty() {
            return false;
        }
        let normalized = normalize(prompt);
        self.blocked.iter().any(|kw| normalized.contains(kw))
    }
}

impl Default for PromptFilter {
    fn default() -> Self {
        Self::new()
    }
}
