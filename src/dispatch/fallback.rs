//! Deterministic local fallback generator.
//!
//! When every provider/model/credential combination is exhausted, the
//! dispatcher answers with text derived purely from the request parameters.
//! Being a pure function it cannot fail, which is what makes `generate`
//! infallible. The output is explicitly lower quality than a remote answer
//! and says so.

/// Templates with `{topic}`, `{iteration}` and `{strategy}` slots. Selection
/// is a stable hash of the topic plus the iteration, so repeated calls with
/// the same parameters produce identical text.
const TEMPLATES: [&str; 4] = [
    "Iteration {iteration} on {topic}: start from the smallest version that works, \
     note what breaks{strategy}, and fold each observation back into the next pass. \
     (Generated locally; remote providers were unavailable.)",
    "Working note {iteration} for {topic}: restate the goal in one sentence, list \
     the two constraints that matter most{strategy}, and commit to a measurable \
     next step. (Generated locally; remote providers were unavailable.)",
    "Pass {iteration} over {topic}: compare the current approach against its \
     simplest alternative{strategy}, keep whichever removes more uncertainty, and \
     record why. (Generated locally; remote providers were unavailable.)",
    "Round {iteration} on {topic}: identify the riskiest assumption{strategy}, \
     design the cheapest probe that could falsify it, and schedule it first. \
     (Generated locally; remote providers were unavailable.)",
];

fn stable_hash(text: &str) -> u64 {
    // djb2; only stability across runs matters here.
    text.bytes()
        .fold(5381u64, |h, b| h.wrapping_mul(33).wrapping_add(b as u64))
}

/// Produce deterministic fallback text referencing the topic and iteration.
pub fn local_fallback(topic: &str, strategy: Option<&str>, iteration: u32) -> String {
    let idx = ((stable_hash(topic).wrapping_add(iteration as u64)) % TEMPLATES.len() as u64) as usize;
    let strategy_clause = strategy
        .map(|s| format!(", following the {s} strategy"))
        .unwrap_or_default();
    TEMPLATES[idx]
        .replace("{topic}", topic)
        .replace("{iteration}", &iteration.to_string())
        .replace("{strategy}", &strategy_clause)
}

/// Topic used when the caller did not provide one: a short prefix of the
/// prompt, cut at a word boundary.
pub fn topic_from_prompt(prompt: &str) -> String {
    let words: Vec<&str> = prompt.split_whitespace().take(8).collect();
    if words.is_empty() {
        "the current task".to_string()
    } else {
        words.join(" ")
    }
}
