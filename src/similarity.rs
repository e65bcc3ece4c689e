//! Fuzzy comparison of response bodies.

use std::time::Duration;

use similar::TextDiff;

/// Upper bound on the time spent diffing one pair of bodies. Past it, the diff falls
/// back to a coarser (but still bounded and symmetric) approximation.
const DIFF_DEADLINE: Duration = Duration::from_millis(250);

/// Returns how similar two texts are, from 0.0 (nothing in common) to 1.0 (identical).
///
/// The score is the character-level diff ratio `2 * matching / (len(a) + len(b))`. It is
/// symmetric, and two empty texts are identical.
pub fn relative_distance(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    // Diffing is not guaranteed to find the same common subsequence in both directions,
    // so always diff in one canonical order.
    let (old, new) = if a <= b { (a, b) } else { (b, a) };
    let ratio = TextDiff::configure()
        .timeout(DIFF_DEADLINE)
        .diff_chars(old, new)
        .ratio();
    f64::from(ratio).clamp(0.0, 1.0)
}
