//! Response cache tests.

use super::*;
use crate::types::{SamplingParams, Usage};

fn config(max: usize) -> CacheConfig {
    CacheConfig {
        max_cache_size: max,
        default_ttl_ms: 60_000,
        similarity_threshold: 0.85,
        cost_savings_target: 0.3,
    }
}

fn response(content: &str) -> CachedResponse {
    CachedResponse {
        content: content.to_string(),
        provider: "p1".to_string(),
        model: "m1".to_string(),
        usage: Usage::default(),
    }
}

#[test]
fn test_exact_hit_round_trip() {
    let cache = ResponseCache::new(config(10));
    let params = SamplingParams::default();
    cache.set("What is Rust?", "m1", &params, response("A language."), None);

    let hit = cache.get("What is Rust?", "m1", &params).unwrap();
    assert_eq!(hit.content, "A language.");

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 0);
    assert!((stats.avg_hit_similarity - 1.0).abs() < 1e-9);
}

#[test]
fn test_exact_hit_survives_formatting_differences() {
    let cache = ResponseCache::new(config(10));
    let params = SamplingParams::default();
    cache.set("What is Rust?", "m1", &params, response("A language."), None);

    assert!(cache.get("what   is RUST", "m1", &params).is_some());
}

#[test]
fn test_miss_on_different_model_or_params() {
    let cache = ResponseCache::new(config(10));
    let params = SamplingParams::default();
    cache.set("What is Rust?", "m1", &params, response("A language."), None);

    assert!(cache.get("What is Rust?", "m2", &params).is_none());
    let warm = SamplingParams {
        temperature: Some(1.0),
        ..SamplingParams::default()
    };
    assert!(cache.get("What is Rust?", "m1", &warm).is_none());
    assert_eq!(cache.stats().misses, 2);
}

#[test]
fn test_similarity_hit_above_threshold() {
    let cache = ResponseCache::new(config(10));
    let params = SamplingParams::default();
    // 7 tokens cached; the query adds one token: 7/8 = 0.875 >= 0.85.
    cache.set(
        "explain the borrow checker rules in rust",
        "m1",
        &params,
        response("Borrowing 101."),
        None,
    );

    let hit = cache
        .get("please explain the borrow checker rules in rust", "m1", &params)
        .unwrap();
    assert_eq!(hit.content, "Borrowing 101.");

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert!(stats.avg_hit_similarity < 1.0);
    assert!(stats.avg_hit_similarity >= 0.85);
}

#[test]
fn test_similarity_miss_below_threshold() {
    let cache = ResponseCache::new(config(10));
    let params = SamplingParams::default();
    cache.set(
        "explain the borrow checker rules in rust",
        "m1",
        &params,
        response("Borrowing 101."),
        None,
    );

    assert!(cache.get("write a haiku about oceans", "m1", &params).is_none());
}

#[test]
fn test_similarity_never_crosses_models() {
    let cache = ResponseCache::new(config(10));
    let params = SamplingParams::default();
    cache.set(
        "explain the borrow checker rules in rust",
        "m1",
        &params,
        response("Borrowing 101."),
        None,
    );

    assert!(
        cache
            .get("please explain the borrow checker rules in rust", "m2", &params)
            .is_none()
    );
}

#[test]
fn test_expired_entry_is_never_returned() {
    let cache = ResponseCache::new(config(10));
    let params = SamplingParams::default();
    cache.set("What is Rust?", "m1", &params, response("A language."), Some(0));

    assert!(cache.get("What is Rust?", "m1", &params).is_none());
    assert_eq!(cache.len(), 1);

    cache.evict();
    assert_eq!(cache.len(), 0);
}

#[test]
fn test_eviction_bound() {
    let cache = ResponseCache::new(config(10));
    let params = SamplingParams::default();
    for i in 0..15 {
        cache.set(
            &format!("unique prompt number {i} with its own words"),
            "m1",
            &params,
            response(&format!("answer {i}")),
            None,
        );
    }
    assert!(cache.len() <= 10);
}

#[test]
fn test_eviction_prefers_least_accessed() {
    let cache = ResponseCache::new(config(5));
    let params = SamplingParams::default();
    for i in 0..5 {
        cache.set(
            &format!("distinct topic {i} alpha beta gamma delta"),
            "m1",
            &params,
            response(&format!("answer {i}")),
            None,
        );
    }
    // Touch every entry except number 2.
    for i in [0usize, 1, 3, 4] {
        assert!(
            cache
                .get(&format!("distinct topic {i} alpha beta gamma delta"), "m1", &params)
                .is_some()
        );
    }
    cache.set(
        "one more distinct topic epsilon zeta eta",
        "m1",
        &params,
        response("answer 5"),
        None,
    );

    assert!(cache.len() <= 5);
    assert!(
        cache
            .get("distinct topic 2 alpha beta gamma delta", "m1", &params)
            .is_none()
    );
}

#[test]
fn test_should_cache_high_value() {
    let cache = ResponseCache::new(config(10));
    // Warm the stats past the savings target so only value/complexity count.
    let params = SamplingParams::default();
    cache.set("warm entry one", "m1", &params, response("x"), None);
    for _ in 0..10 {
        cache.get("warm entry one", "m1", &params);
    }

    assert!(cache.should_cache(0.01, 2000, Complexity::Low));
    assert!(cache.should_cache(0.0, 10, Complexity::High));
    assert!(!cache.should_cache(0.0, 10, Complexity::Low));
}

#[test]
fn test_should_cache_below_savings_target() {
    let cache = ResponseCache::new(config(10));
    // No traffic yet: hit rate 0 < target, so even low-value entries cache.
    assert!(cache.should_cache(0.0, 1, Complexity::Low));
}

#[test]
fn test_restore_discards_expired() {
    let cache = ResponseCache::new(config(10));
    let params = SamplingParams::default();
    cache.set("keep me around", "m1", &params, response("kept"), None);
    cache.set("drop me fast", "m1", &params, response("dropped"), Some(0));
    let entries = {
        // export skips already-expired entries; pull the raw set via a
        // second cache to exercise restore's own filtering too.
        let mut all = cache.export_entries();
        assert_eq!(all.len(), 1);
        all.push(CacheEntry {
            expires_at: chrono::Utc::now() - chrono::Duration::seconds(1),
            ..all[0].clone()
        });
        all
    };

    let restored = ResponseCache::new(config(10));
    restored.restore(entries);
    assert_eq!(restored.len(), 1);
    assert!(restored.get("keep me around", "m1", &params).is_some());
}

#[test]
fn test_take_mutations() {
    let cache = ResponseCache::new(config(10));
    let params = SamplingParams::default();
    assert_eq!(cache.take_mutations(), 0);

    cache.set("a prompt", "m1", &params, response("x"), None);
    cache.set("another prompt", "m1", &params, response("y"), None);
    assert_eq!(cache.take_mutations(), 2);
    assert_eq!(cache.take_mutations(), 0);
}
