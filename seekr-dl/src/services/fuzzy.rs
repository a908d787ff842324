//! Fuzzy partial string similarity
//!
//! Scores how well the shorter string appears somewhere inside the longer one:
//! every window of the longer string with the shorter string's length is
//! compared with normalized Levenshtein similarity and the best window wins.
//! Scores are on a 0-100 scale, case-insensitive.

/// Partial similarity of `a` and `b`, 0-100
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.trim().to_lowercase().chars().collect();
    let b: Vec<char> = b.trim().to_lowercase().chars().collect();

    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let needle: String = shorter.iter().collect();

    let mut best = 0.0_f64;
    for window in longer.windows(shorter.len()) {
        let candidate: String = window.iter().collect();
        let similarity = strsim::normalized_levenshtein(&needle, &candidate);
        if similarity > best {
            best = similarity;
            if best >= 1.0 {
                break;
            }
        }
    }

    (best * 100.0).round() as u8
}
