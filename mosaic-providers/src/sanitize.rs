//! Error-message sanitization
//!
//! Adapter failures end up in session records that status queries surface
//! to end users, so credentials must be scrubbed before anything is
//! persisted.

use once_cell::sync::Lazy;
use regex::Regex;

const REDACTED: &str = "[REDACTED]";

static KEY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Bearer tokens and api-key query/header fragments
        Regex::new(r"(?i)bearer\s+[a-z0-9._\-]+").unwrap(),
        Regex::new(r"(?i)(api[-_]?key\s*[=:]\s*)[^\s&,'\x22]+").unwrap(),
        // Common provider key prefixes
        Regex::new(r"\bsk-[A-Za-z0-9\-_]{8,}\b").unwrap(),
        Regex::new(r"\bAIza[A-Za-z0-9\-_]{10,}\b").unwrap(),
    ]
});

/// Scrub known secrets and credential-shaped substrings from a message.
///
/// `secrets` carries the exact API keys in play for the failing call;
/// pattern matching catches anything a provider echoed back in a different
/// shape.
pub fn redact_secrets(message: &str, secrets: &[&str]) -> String {
    let mut scrubbed = message.to_string();
    for secret in secrets {
        if !secret.is_empty() {
            scrubbed = scrubbed.replace(secret, REDACTED);
        }
    }
    for pattern in KEY_PATTERNS.iter() {
        scrubbed = pattern
            .replace_all(&scrubbed, |caps: &regex::Captures<'_>| {
                match caps.get(1) {
                    Some(prefix) => format!("{}{}", prefix.as_str(), REDACTED),
                    None => REDACTED.to_string(),
                }
            })
            .into_owned();
    }
    scrubbed
}
