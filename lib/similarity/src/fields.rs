//! Field-specialized comparators for names, addresses, phones, emails and
//! postal codes.
//!
//! Each comparator preprocesses its inputs the way that field is usually
//! written (legal suffixes, street abbreviations, formatting noise) before
//! blending generic metrics with field-appropriate weights.

use regex::Regex;

use crate::text::{CaseInsensitiveMatch, ContainedIn, Jaccard, JaroWinkler};
use crate::Comparator;

/// Name comparator: `0.6 * JaroWinkler + 0.3 * Jaccard + 0.1 * ContainedIn`
/// after lowercasing, legal-suffix stripping and whitespace collapsing.
pub struct NameSimilarity {
    jaro_winkler: JaroWinkler,
    jaccard: Jaccard,
    contained_in: ContainedIn,
    legal_suffix: Regex,
    spaces: Regex,
}

impl NameSimilarity {
    pub fn new() -> Self {
        Self {
            jaro_winkler: JaroWinkler::default(),
            jaccard: Jaccard,
            contained_in: ContainedIn { ignore_case: true },
            legal_suffix: Regex::new(
                r"(?i)\s+(inc\.?|incorporated|corp\.?|corporation|llc|ltd\.?|limited|llp|l\.l\.p\.?|pllc|p\.l\.l\.c\.?|pc|p\.c\.?)$",
            )
            .expect("legal suffix regex"),
            spaces: Regex::new(r"\s+").expect("whitespace regex"),
        }
    }

    fn preprocess(&self, name: &str) -> String {
        let name = name.to_lowercase();
        let name = self.legal_suffix.replace_all(&name, "");
        self.spaces.replace_all(name.trim(), " ").into_owned()
    }
}

impl Default for NameSimilarity {
    fn default() -> Self {
        Self::new()
    }
}

impl Comparator for NameSimilarity {
    fn compare(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }

        let a = self.preprocess(a);
        let b = self.preprocess(b);
        if a.to_lowercase() == b.to_lowercase() {
            return 1.0;
        }

        let jaro = self.jaro_winkler.compare(&a, &b);
        let token = self.jaccard.compare(&a, &b);
        let containment = self.contained_in.compare(&a, &b);

        jaro * 0.6 + token * 0.3 + containment * 0.1
    }

    fn name(&self) -> &'static str {
        "NameSimilarity"
    }
}

/// Address comparator: `(0.5 * Jaccard + 0.2 * JaroWinkler + 0.3 *
/// ContainedIn) * penalty` where a 0.3 penalty applies when the leading
/// house numbers differ.
pub struct AddressSimilarity {
    jaccard: Jaccard,
    jaro_winkler: JaroWinkler,
    contained_in: ContainedIn,
    numeric: Regex,
    street_type: Regex,
    directional: Regex,
    unit: Regex,
    spaces: Regex,
}

impl AddressSimilarity {
    pub fn new() -> Self {
        Self {
            jaccard: Jaccard,
            jaro_winkler: JaroWinkler::default(),
            contained_in: ContainedIn { ignore_case: true },
            numeric: Regex::new(r"\d+").expect("numeric regex"),
            street_type: Regex::new(
                r"(?i)\b(street|st|avenue|ave|boulevard|blvd|road|rd|drive|dr|lane|ln|court|ct|circle|cir|place|pl|way|parkway|pkwy|highway|hwy|expressway|expy)\b\.?",
            )
            .expect("street type regex"),
            directional: Regex::new(r"(?i)\b(north|south|east|west|n|s|e|w|ne|nw|se|sw)\b\.?")
                .expect("directional regex"),
            unit: Regex::new(r"(?i)\s+(apt|apartment|ste|suite|unit|#)\.?\s+[a-z0-9-]+")
                .expect("unit regex"),
            spaces: Regex::new(r"\s+").expect("whitespace regex"),
        }
    }

    fn fold_street_type(token: &str) -> &str {
        match token {
            "street" | "st" => "st",
            "avenue" | "ave" => "ave",
            "boulevard" | "blvd" => "blvd",
            "road" | "rd" => "rd",
            "drive" | "dr" => "dr",
            "lane" | "ln" => "ln",
            "court" | "ct" => "ct",
            "circle" | "cir" => "cir",
            "place" | "pl" => "pl",
            "parkway" | "pkwy" => "pkwy",
            "highway" | "hwy" => "hwy",
            "expressway" | "expy" => "expy",
            other => other,
        }
    }

    fn fold_directional(token: &str) -> &str {
        match token {
            "north" | "n" => "n",
            "south" | "s" => "s",
            "east" | "e" => "e",
            "west" | "w" => "w",
            other => other,
        }
    }

    fn preprocess(&self, address: &str) -> String {
        let address = address.to_lowercase();
        let address = self.unit.replace_all(&address, "");
        let address = self
            .street_type
            .replace_all(&address, |caps: &regex::Captures| {
                Self::fold_street_type(&caps[1]).to_string()
            });
        let address = self
            .directional
            .replace_all(&address, |caps: &regex::Captures| {
                Self::fold_directional(&caps[1]).to_string()
            });
        self.spaces.replace_all(address.trim(), " ").into_owned()
    }

    fn first_number<'a>(&self, address: &'a str) -> Option<&'a str> {
        self.numeric.find(address).map(|m| m.as_str())
    }
}

impl Default for AddressSimilarity {
    fn default() -> Self {
        Self::new()
    }
}

impl Comparator for AddressSimilarity {
    fn compare(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }

        let a = self.preprocess(a);
        let b = self.preprocess(b);
        if a.to_lowercase() == b.to_lowercase() {
            return 1.0;
        }

        // Different house numbers almost always mean different addresses.
        let penalty = match (self.first_number(&a), self.first_number(&b)) {
            (Some(num_a), Some(num_b)) if num_a != num_b => 0.3,
            _ => 1.0,
        };

        let token = self.jaccard.compare(&a, &b);
        let jaro = self.jaro_winkler.compare(&a, &b);
        let containment = self.contained_in.compare(&a, &b);

        (token * 0.5 + jaro * 0.2 + containment * 0.3) * penalty
    }

    fn name(&self) -> &'static str {
        "AddressSimilarity"
    }
}

/// Phone comparator over digit strings: exact digits score 1.0; otherwise the
/// count of matching trailing digits (up to ten) maps onto fixed tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhoneSimilarity;

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

impl Comparator for PhoneSimilarity {
    fn compare(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let digits_a = digits(a);
        let digits_b = digits(b);

        if digits_a.is_empty() && digits_b.is_empty() {
            return 1.0;
        }
        if digits_a.is_empty() || digits_b.is_empty() {
            return 0.0;
        }
        if digits_a == digits_b {
            return 1.0;
        }

        // Compare the last ten digits from the right; local digits carry the
        // most signal across formatting and country-code differences.
        let tail_a: Vec<u8> = digits_a.bytes().rev().take(10).collect();
        let tail_b: Vec<u8> = digits_b.bytes().rev().take(10).collect();

        let mut matching = 0usize;
        for (da, db) in tail_a.iter().zip(tail_b.iter()) {
            if da == db {
                matching += 1;
            } else {
                break;
            }
        }

        match matching {
            10.. => 1.0,
            7..=9 => 0.9,
            4..=6 => 0.7,
            n => n as f64 / 10.0,
        }
    }

    fn name(&self) -> &'static str {
        "PhoneSimilarity"
    }
}

/// Email comparator: domains dominate. Identical addresses score 1.0,
/// case-insensitive equality 0.99, differing domains are capped at 0.3, and
/// same-domain addresses blend username similarity with the domain match.
pub struct EmailSimilarity {
    case_insensitive: CaseInsensitiveMatch,
    jaro_winkler: JaroWinkler,
}

impl EmailSimilarity {
    pub fn new() -> Self {
        Self {
            case_insensitive: CaseInsensitiveMatch,
            jaro_winkler: JaroWinkler::default(),
        }
    }

    fn split(email: &str) -> Option<(&str, &str)> {
        let (user, domain) = email.split_once('@')?;
        if user.is_empty() || domain.is_empty() {
            return None;
        }
        Some((user, domain))
    }
}

impl Default for EmailSimilarity {
    fn default() -> Self {
        Self::new()
    }
}

impl Comparator for EmailSimilarity {
    fn compare(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }
        if self.case_insensitive.compare(a, b) == 1.0 {
            return 0.99;
        }

        let (Some((user_a, domain_a)), Some((user_b, domain_b))) = (Self::split(a), Self::split(b))
        else {
            // Not both valid emails; fall back to plain string similarity.
            return self.jaro_winkler.compare(a, b);
        };

        let domain_score = self.case_insensitive.compare(domain_a, domain_b);
        if domain_score < 1.0 {
            // Different domains are almost certainly different people; cap
            // the score at 0.3 of the domains' own string similarity.
            return self.jaro_winkler.compare(&domain_a.to_lowercase(), &domain_b.to_lowercase())
                * 0.3;
        }

        let user_score = self.jaro_winkler.compare(user_a, user_b);
        user_score * 0.4 + domain_score * 0.6
    }

    fn name(&self) -> &'static str {
        "EmailSimilarity"
    }
}

/// ZIP comparator over digit strings: exact digits score 1.0; otherwise the
/// matching prefix length (up to five) maps onto fixed tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipSimilarity;

impl Comparator for ZipSimilarity {
    fn compare(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let digits_a = digits(a);
        let digits_b = digits(b);

        if digits_a.is_empty() && digits_b.is_empty() {
            return 1.0;
        }
        if digits_a.is_empty() || digits_b.is_empty() {
            return 0.0;
        }
        if digits_a == digits_b {
            return 1.0;
        }

        // A ZIP+4 extension of the same five-digit code is the same code.
        let shorter = digits_a.len().min(digits_b.len());
        if shorter >= 5 && (digits_a.starts_with(&digits_b) || digits_b.starts_with(&digits_a)) {
            return 1.0;
        }

        let prefix_len = 5.min(digits_a.len()).min(digits_b.len());
        let mut matching = 0usize;
        for i in 0..prefix_len {
            if digits_a.as_bytes()[i] == digits_b.as_bytes()[i] {
                matching += 1;
            } else {
                break;
            }
        }

        match matching {
            5.. => 0.95,
            3..=4 => 0.8,
            1..=2 => 0.5,
            _ => 0.0,
        }
    }

    fn name(&self) -> &'static str {
        "ZipSimilarity"
    }
}
