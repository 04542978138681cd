//! Generic string comparators.
//!
//! Every comparator maps a pair of strings to a score in [0.0, 1.0] where
//! 1.0 means identical. Two empty strings compare as identical; an empty
//! string against a non-empty one scores 0.0.

use std::collections::{HashMap, HashSet};

use crate::Comparator;

/// Split a string into lowercase alphanumeric word tokens.
pub(crate) fn tokenize(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in s.chars() {
        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Strict equality, scored 0/1.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl Comparator for ExactMatch {
    fn compare(&self, a: &str, b: &str) -> f64 {
        if a == b {
            1.0
        } else {
            0.0
        }
    }

    fn name(&self) -> &'static str {
        "ExactMatch"
    }
}

/// Case-insensitive equality, scored 0/1.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseInsensitiveMatch;

impl Comparator for CaseInsensitiveMatch {
    fn compare(&self, a: &str, b: &str) -> f64 {
        if a.to_lowercase() == b.to_lowercase() {
            1.0
        } else {
            0.0
        }
    }

    fn name(&self) -> &'static str {
        "CaseInsensitiveMatch"
    }
}

/// Jaro similarity with the Winkler common-prefix boost.
///
/// Well suited to person and business names where early characters carry the
/// most signal.
#[derive(Debug, Clone, Copy)]
pub struct JaroWinkler {
    /// Boost per matching prefix character.
    pub prefix_scale: f64,
    /// Number of leading characters eligible for the boost.
    pub prefix_length: usize,
}

impl Default for JaroWinkler {
    fn default() -> Self {
        Self {
            prefix_scale: 0.1,
            prefix_length: 4,
        }
    }
}

impl JaroWinkler {
    fn jaro(a: &[char], b: &[char]) -> f64 {
        if a == b {
            return 1.0;
        }

        // Keep `a` the shorter side.
        let (a, b) = if a.len() > b.len() { (b, a) } else { (a, b) };
        if a.is_empty() {
            return 0.0;
        }

        let match_distance = (b.len().max(a.len()) / 2).saturating_sub(1);

        let mut matches_a = vec![false; a.len()];
        let mut matches_b = vec![false; b.len()];
        let mut matches = 0usize;

        for i in 0..a.len() {
            let start = i.saturating_sub(match_distance);
            let end = (i + match_distance + 1).min(b.len());
            for j in start..end {
                if !matches_b[j] && a[i] == b[j] {
                    matches_a[i] = true;
                    matches_b[j] = true;
                    matches += 1;
                    break;
                }
            }
        }

        if matches == 0 {
            return 0.0;
        }

        let mut transpositions = 0usize;
        let mut k = 0usize;
        for i in 0..a.len() {
            if matches_a[i] {
                while !matches_b[k] {
                    k += 1;
                }
                if a[i] != b[k] {
                    transpositions += 1;
                }
                k += 1;
            }
        }

        let m = matches as f64;
        (m / a.len() as f64 + m / b.len() as f64 + (m - transpositions as f64 / 2.0) / m) / 3.0
    }
}

impl Comparator for JaroWinkler {
    fn compare(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let chars_a: Vec<char> = a.chars().collect();
        let chars_b: Vec<char> = b.chars().collect();

        let jaro = Self::jaro(&chars_a, &chars_b);

        let max_prefix = self.prefix_length.min(chars_a.len()).min(chars_b.len());
        let mut prefix = 0usize;
        for i in 0..max_prefix {
            if chars_a[i] == chars_b[i] {
                prefix += 1;
            } else {
                break;
            }
        }

        jaro + prefix as f64 * self.prefix_scale * (1.0 - jaro)
    }

    fn name(&self) -> &'static str {
        "JaroWinkler"
    }
}

/// Edit-distance similarity: `1 - dist / max(|a|, |b|)` over characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Levenshtein;

impl Levenshtein {
    fn distance(a: &[char], b: &[char]) -> usize {
        let mut prev: Vec<usize> = (0..=b.len()).collect();
        let mut current = vec![0usize; b.len() + 1];

        for i in 1..=a.len() {
            current[0] = i;
            for j in 1..=b.len() {
                let cost = usize::from(a[i - 1] != b[j - 1]);
                current[j] = (prev[j] + 1)
                    .min(current[j - 1] + 1)
                    .min(prev[j - 1] + cost);
            }
            std::mem::swap(&mut prev, &mut current);
        }

        prev[b.len()]
    }
}

impl Comparator for Levenshtein {
    fn compare(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let chars_a: Vec<char> = a.chars().collect();
        let chars_b: Vec<char> = b.chars().collect();
        let distance = Self::distance(&chars_a, &chars_b);
        let max_len = chars_a.len().max(chars_b.len());

        1.0 - distance as f64 / max_len as f64
    }

    fn name(&self) -> &'static str {
        "Levenshtein"
    }
}

/// Jaccard index over lowercase word-token sets.
///
/// Works well for longer texts where word overlap matters more than order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Jaccard;

impl Comparator for Jaccard {
    fn compare(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let set_a: HashSet<String> = tokenize(a).into_iter().collect();
        let set_b: HashSet<String> = tokenize(b).into_iter().collect();

        let intersection = set_a.intersection(&set_b).count();
        let union = set_a.union(&set_b).count();

        if union == 0 {
            return 0.0;
        }
        intersection as f64 / union as f64
    }

    fn name(&self) -> &'static str {
        "Jaccard"
    }
}

/// Cosine similarity over token-frequency vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosine;

impl Comparator for Cosine {
    fn compare(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let mut freq_a: HashMap<String, usize> = HashMap::new();
        for token in tokenize(a) {
            *freq_a.entry(token).or_default() += 1;
        }
        let mut freq_b: HashMap<String, usize> = HashMap::new();
        for token in tokenize(b) {
            *freq_b.entry(token).or_default() += 1;
        }

        let dot: f64 = freq_a
            .iter()
            .filter_map(|(token, &count_a)| freq_b.get(token).map(|&count_b| (count_a * count_b) as f64))
            .sum();

        let mag_a: f64 = freq_a.values().map(|&c| (c * c) as f64).sum::<f64>().sqrt();
        let mag_b: f64 = freq_b.values().map(|&c| (c * c) as f64).sum::<f64>().sqrt();

        if mag_a == 0.0 || mag_b == 0.0 {
            return 0.0;
        }
        dot / (mag_a * mag_b)
    }

    fn name(&self) -> &'static str {
        "Cosine"
    }
}

/// Containment check: if one string contains the other, the score is the
/// length ratio of the shorter to the longer string.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainedIn {
    pub ignore_case: bool,
}

impl Comparator for ContainedIn {
    fn compare(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let (a, b) = if self.ignore_case {
            (a.to_lowercase(), b.to_lowercase())
        } else {
            (a.to_string(), b.to_string())
        };

        if a.contains(&b) || b.contains(&a) {
            let min_len = a.len().min(b.len());
            let max_len = a.len().max(b.len());
            return min_len as f64 / max_len as f64;
        }
        0.0
    }

    fn name(&self) -> &'static str {
        "ContainedIn"
    }
}
