use serde_json::Value;

/// Rough tokens-per-character ratio used across the pipeline.
const CHARS_PER_TOKEN: usize = 4;

/// Estimate tokens for a string: `ceil(len / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate tokens for a value by the length of its JSON encoding.
pub fn estimate_json_tokens(value: &Value) -> usize {
    estimate_tokens(&value.to_string())
}

/// Greedy single-pass packing. Walks `items` in order; when adding the
/// next item would push the current batch past either cap and the batch
/// is non-empty, the batch is emitted and a fresh one started. An item
/// larger than the token cap on its own therefore ends up alone in its
/// batch. Concatenating the output reproduces the input order exactly.
pub fn create_batches<T, F>(
    items: Vec<T>,
    max_tokens: usize,
    max_items: usize,
    estimate: F,
) -> Vec<Vec<T>>
where
    F: Fn(&T) -> usize,
{
    let max_items = max_items.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut current_tokens = 0usize;

    for item in items {
        let cost = estimate(&item);
        let would_overflow =
            current.len() + 1 > max_items || current_tokens + cost > max_tokens;
        if would_overflow && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current_tokens += cost;
        current.push(item);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// USD cost for a usage total, with per-1k-token prices from config.
pub fn estimate_cost(
    tokens_in: u64,
    tokens_out: u64,
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
) -> f64 {
    (tokens_in as f64 / 1000.0) * input_cost_per_1k
        + (tokens_out as f64 / 1000.0) * output_cost_per_1k
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_is_ceil_len_over_four() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(103)), 26);
    }

    #[test]
    fn json_estimate_uses_encoded_length() {
        let value = serde_json::json!({"a": 1});
        // {"a":1} is 7 chars.
        assert_eq!(estimate_json_tokens(&value), 2);
    }

    #[test]
    fn token_cap_bounds_batches() {
        // 250 items at 40 tokens, caps 1000 tokens / 50 items: the
        // token cap bites first at 25 per batch.
        let items: Vec<u32> = (0..250).collect();
        let batches = create_batches(items, 1000, 50, |_| 40);
        assert_eq!(batches.len(), 10);
        assert!(batches.iter().all(|b| b.len() == 25));

        // Order is preserved across the whole packing.
        let flattened: Vec<u32> = batches.into_iter().flatten().collect();
        assert_eq!(flattened, (0..250).collect::<Vec<u32>>());
    }

    #[test]
    fn count_cap_bounds_batches() {
        let items: Vec<u32> = (0..10).collect();
        let batches = create_batches(items, 1_000_000, 4, |_| 1);
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn oversized_item_sits_alone() {
        let items = vec![10usize, 500, 10];
        let batches = create_batches(items, 100, 50, |&t| t);
        assert_eq!(batches, vec![vec![10], vec![500], vec![10]]);
    }

    #[test]
    fn cost_is_linear_in_prices() {
        let cost = estimate_cost(2000, 1000, 0.15, 0.60);
        assert!((cost - (2.0 * 0.15 + 1.0 * 0.60)).abs() < 1e-9);
    }
}
