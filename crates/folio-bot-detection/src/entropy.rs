//! Shannon entropy of a string's character distribution.

use std::collections::HashMap;

/// Base-2 Shannon entropy over the characters of `value`.
///
/// `-Σ p(c)·log2(p(c))` where `p(c)` is the relative frequency of character
/// `c`. An empty string has zero entropy; the maximum for a string of `n`
/// distinct characters is `log2(n)`.
pub fn shannon_entropy(value: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in value.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }

    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    let entropy: f64 = counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum();

    // Single-symbol strings produce -0.0
    entropy.max(0.0)
}
