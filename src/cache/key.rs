//! Prompt normalization, token sets and cache keys.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::types::SamplingParams;

/// Normalize a prompt for keying: lowercase, strip punctuation, collapse
/// whitespace runs to single spaces.
pub fn normalize(prompt: &str) -> String {
    let mut out = String::with_capacity(prompt.len());
    let mut pending_space = false;
    for ch in prompt.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        } else {
            // Whitespace and punctuation both act as separators.
            pending_space = true;
        }
    }
    out
}

/// Token set of an already-normalized prompt.
pub fn token_set(normalized: &str) -> BTreeSet<String> {
    normalized
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Token-set Jaccard similarity: `|A ∩ B| / |A ∪ B|`.
///
/// Two empty sets are defined as identical (1.0).
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Deterministic exact key: SHA-256 over the normalized prompt, the model id
/// and the sampling-parameter fingerprint.
pub fn cache_key(prompt: &str, model: &str, params: &SamplingParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(prompt).as_bytes());
    hasher.update(b"\n");
    hasher.update(model.as_bytes());
    hasher.update(b"\n");
    hasher.update(params.fingerprint().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize("  Hello,   WORLD!  How's it going? "),
            "hello world how s it going"
        );
        assert_eq!(normalize("..."), "");
    }

    #[test]
    fn test_key_ignores_formatting_noise() {
        let params = SamplingParams::default();
        assert_eq!(
            cache_key("Explain lifetimes.", "m1", &params),
            cache_key("explain   LIFETIMES", "m1", &params)
        );
    }

    #[test]
    fn test_key_depends_on_model_and_params() {
        let params = SamplingParams::default();
        let warm = SamplingParams {
            temperature: Some(0.9),
            ..SamplingParams::default()
        };
        let base = cache_key("explain lifetimes", "m1", &params);
        assert_ne!(base, cache_key("explain lifetimes", "m2", &params));
        assert_ne!(base, cache_key("explain lifetimes", "m1", &warm));
    }

    #[test]
    fn test_jaccard() {
        let a = token_set("the quick brown fox");
        let b = token_set("the quick red fox");
        // intersection {the, quick, fox} = 3, union = 5
        assert!((jaccard(&a, &b) - 0.6).abs() < 1e-9);
        assert!((jaccard(&a, &a) - 1.0).abs() < 1e-9);
        assert_eq!(jaccard(&a, &BTreeSet::new()), 0.0);
        assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 1.0);
    }
}
