//! Approximate string similarity on a 0..=100 scale.
//!
//! All scorers are built on the Indel distance (insertions and deletions
//! only, so a substitution costs 2): `ratio` compares whole strings, `partial_ratio` the best-aligned window of the longer
//! string, and the token variants ignore word order and duplication.
//! [`weighted_ratio`] combines them and is what fuzzy ranking uses.

use std::collections::BTreeSet;

/// Similarity of two strings as a percentage.
pub fn ratio(a: &str, b: &str) -> u32 {
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    if len_a == 0 || len_b == 0 {
        return 0;
    }

    let lensum = len_a + len_b;
    let indel = lensum - 2 * longest_common_subsequence(a, b);
    to_score((lensum - indel) as f64 / lensum as f64 * 100.0)
}

/// Length of the longest common subsequence, in chars.
fn longest_common_subsequence(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row = vec![0usize; b.len() + 1];

    for ca in a.chars() {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Best [`ratio`] of the shorter string against every same-length window
/// of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> u32 {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };

    let short_len = shorter.chars().count();
    if short_len == 0 {
        return 0;
    }

    let chars: Vec<char> = longer.chars().collect();
    let mut best = 0;
    for start in 0..=(chars.len() - short_len) {
        let window: String = chars[start..start + short_len].iter().collect();
        best = best.max(ratio(shorter, &window));
        if best == 100 {
            break;
        }
    }
    best
}

pub fn token_sort_ratio(a: &str, b: &str) -> u32 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

pub fn token_set_ratio(a: &str, b: &str) -> u32 {
    token_set(a, b, ratio)
}

fn partial_token_sort_ratio(a: &str, b: &str) -> u32 {
    partial_ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn partial_token_set_ratio(a: &str, b: &str) -> u32 {
    token_set(a, b, partial_ratio)
}

/// Combined scorer. Both inputs are normalized first (lowercase, only
/// alphanumerics and single spaces). When one string is much longer than
/// the other, partial matches count too, scaled down by how lopsided the
/// lengths are.
pub fn weighted_ratio(query: &str, choice: &str) -> u32 {
    let q = normalize(query);
    let c = normalize(choice);
    if q.is_empty() || c.is_empty() {
        return 0;
    }

    const UNBASE_SCALE: f64 = 0.95;

    let len_q = q.chars().count() as f64;
    let len_c = c.chars().count() as f64;
    let len_ratio = len_q.max(len_c) / len_q.min(len_c);

    let base = f64::from(ratio(&q, &c));

    let best = if len_ratio < 1.5 {
        let sort = f64::from(token_sort_ratio(&q, &c)) * UNBASE_SCALE;
        let set = f64::from(token_set_ratio(&q, &c)) * UNBASE_SCALE;
        base.max(sort).max(set)
    } else {
        let partial_scale = if len_ratio > 8.0 { 0.6 } else { 0.9 };
        let partial = f64::from(partial_ratio(&q, &c)) * partial_scale;
        let sort = f64::from(partial_token_sort_ratio(&q, &c))
            * UNBASE_SCALE
            * partial_scale;
        let set = f64::from(partial_token_set_ratio(&q, &c))
            * UNBASE_SCALE
            * partial_scale;
        base.max(partial).max(sort).max(set)
    };

    to_score(best)
}

fn token_set(a: &str, b: &str, scorer: fn(&str, &str) -> u32) -> u32 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let join = |set: Vec<&str>| set.join(" ");
    let intersection = join(tokens_a.intersection(&tokens_b).copied().collect());
    let only_a = join(tokens_a.difference(&tokens_b).copied().collect());
    let only_b = join(tokens_b.difference(&tokens_a).copied().collect());

    let combined_a = format!("{intersection} {only_a}").trim().to_string();
    let combined_b = format!("{intersection} {only_b}").trim().to_string();

    scorer(&intersection, &combined_a)
        .max(scorer(&intersection, &combined_b))
        .max(scorer(&combined_a, &combined_b))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn normalize(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn to_score(value: f64) -> u32 {
    value.round().clamp(0.0, 100.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_bounds() {
        assert_eq!(ratio("fetch", "fetch"), 100);
        assert_eq!(ratio("", "fetch"), 0);
        assert!(ratio("kitten", "sitting") < ratio("kitten", "kittens"));
    }

    #[test]
    fn ratio_counts_substitutions_twice() {
        assert_eq!(ratio("abc", "xyz"), 0);
        // LCS "ittn": (13 - 5) / 13
        assert_eq!(ratio("kitten", "sitting"), 62);
        assert_eq!(ratio("ab", "ba"), 50);
    }

    #[test]
    fn common_subsequence_length() {
        assert_eq!(longest_common_subsequence("fetch", "match"), 3);
        assert_eq!(longest_common_subsequence("abc", ""), 0);
        assert_eq!(longest_common_subsequence("αβγ", "xβγ"), 2);
    }

    #[test]
    fn partial_ratio_finds_substring() {
        assert_eq!(partial_ratio("fetch", "fetchdata function"), 100);
        assert_eq!(partial_ratio("fetchdata function", "fetch"), 100);
        assert!(partial_ratio("fetch", "zzzz yyyy") <= 50);
    }

    #[test]
    fn token_ratios_ignore_order() {
        assert_eq!(token_sort_ratio("array map", "map array"), 100);
        assert_eq!(token_set_ratio("map", "map map array"), 100);
    }

    #[test]
    fn weighted_ratio_scales_partial_matches() {
        // Length ratio 24 / 5 falls in the 0.9 partial band.
        assert_eq!(weighted_ratio("fetch", "fetchData Function Alpha"), 90);
    }

    #[test]
    fn weighted_ratio_is_case_and_punctuation_blind() {
        assert_eq!(weighted_ratio("Array.map", "array map"), 100);
    }

    #[test]
    fn weighted_ratio_rejects_unrelated() {
        assert!(weighted_ratio("fetch", "Config Class Beta") < 60);
        // Best window "match" shares only "tch": 60, scaled by 0.9.
        assert_eq!(weighted_ratio("fetch", "match Guide Beta"), 54);
        assert_eq!(weighted_ratio("", "anything"), 0);
        assert_eq!(weighted_ratio("!!!", "anything"), 0);
    }
}
