//! # Resolve Normalize
//!
//! Deterministic, field-aware text normalization. Each field type has its own
//! pipeline (name, address, phone, email, state, zip) layered on a common
//! text base (lowercasing, whitespace collapsing, stopword removal).
//!
//! All transforms are idempotent under a fixed configuration: normalizing an
//! already-normalized value returns it unchanged. That property is what makes
//! blocking keys and stored normalized fields stable across re-ingestion.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use resolve_core::config::NormalizationConfig;

/// Stopwords removed from free text when `enable_stopwords` is set.
const STOPWORDS: [&str; 71] = [
    "a", "an", "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at",
    "by", "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
    "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no", "nor",
    "not", "only", "own", "same", "so", "than", "too", "very", "can", "will", "just", "should",
    "now",
];

/// Street-type tokens folded to fixed abbreviations.
const STREET_ABBREVIATIONS: [(&str, &str); 10] = [
    ("street", "st"),
    ("avenue", "ave"),
    ("boulevard", "blvd"),
    ("road", "rd"),
    ("lane", "ln"),
    ("drive", "dr"),
    ("court", "ct"),
    ("square", "sq"),
    ("parkway", "pkwy"),
    ("highway", "hwy"),
];

/// US state full names mapped to their two-letter codes.
const STATE_CODES: [(&str, &str); 50] = [
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
];

/// Field normalizer with precompiled patterns.
///
/// Construction compiles every regex once; the per-call paths only match and
/// replace.
pub struct Normalizer {
    options: NormalizationConfig,
    legal_suffix: Regex,
    initials: Regex,
    street_type: Regex,
    apartment: Regex,
    phone: Regex,
    email: Regex,
    spaces: Regex,
    non_alphanumeric: Regex,
    stopwords: HashSet<&'static str>,
    street_abbreviations: HashMap<&'static str, &'static str>,
    state_codes: HashMap<&'static str, &'static str>,
}

impl Normalizer {
    pub fn new(options: NormalizationConfig) -> Self {
        Self {
            options,
            legal_suffix: Regex::new(
                r"(?i)\s+(inc\.?|incorporated|corp\.?|corporation|llc|ltd\.?|limited|llp|l\.l\.p\.?|pllc|p\.l\.l\.c\.?|pc|p\.c\.?)$",
            )
            .expect("legal suffix regex"),
            initials: Regex::new(r"\b([A-Za-z])\.").expect("initials regex"),
            street_type: Regex::new(
                r"(?i)\b(street|avenue|boulevard|road|lane|drive|court|square|parkway|highway)\b\.?",
            )
            .expect("street type regex"),
            apartment: Regex::new(r"(?i)\s+(apt|apartment|ste|suite|unit|#)\.?\s+[a-z0-9-]+")
                .expect("apartment regex"),
            phone: Regex::new(r"^(?:\+?(\d{1,3}))?[-. (]*(\d{3})[-. )]*(\d{3})[-. ]*(\d{4})$")
                .expect("phone regex"),
            email: Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
                .expect("email regex"),
            spaces: Regex::new(r"\s+").expect("whitespace regex"),
            non_alphanumeric: Regex::new(r"[^0-9a-zA-Z]").expect("non-alphanumeric regex"),
            stopwords: STOPWORDS.into_iter().collect(),
            street_abbreviations: STREET_ABBREVIATIONS.into_iter().collect(),
            state_codes: STATE_CODES.into_iter().collect(),
        }
    }

    /// Basic text normalization: lowercase, collapse whitespace, drop
    /// stopwords. Applied first by every field-specific pipeline.
    pub fn normalize_text(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut text = if self.options.enable_lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        text = self.spaces.replace_all(text.trim(), " ").into_owned();

        if self.options.enable_stopwords {
            text = text
                .split(' ')
                .filter(|word| !self.stopwords.contains(word.to_lowercase().as_str()))
                .collect::<Vec<_>>()
                .join(" ");
        }

        text
    }

    /// Normalize a business or personal name: base text pipeline, then legal
    /// suffix removal and single-letter initial folding.
    pub fn normalize_name(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }

        let mut name = self.normalize_text(name);

        if self.options.name_options.remove_legal_suffixes {
            name = self.legal_suffix.replace_all(&name, "").into_owned();
        }

        if self.options.name_options.normalize_initials {
            name = self.initials.replace_all(&name, "$1").into_owned();
        }

        name.trim().to_string()
    }

    /// Normalize an address: base text pipeline, street-type folding, and
    /// apartment/suite/unit clause removal.
    pub fn normalize_address(&self, address: &str) -> String {
        if address.is_empty() {
            return String::new();
        }

        let mut address = self.normalize_text(address);

        if self.options.address_options.standardize_abbreviations {
            address = self
                .street_type
                .replace_all(&address, |caps: &regex::Captures| {
                    let token = caps[1].to_lowercase();
                    self.street_abbreviations
                        .get(token.as_str())
                        .map_or(token.clone(), |abbr| (*abbr).to_string())
                })
                .into_owned();
        }

        if self.options.address_options.remove_apartment_numbers {
            address = self.apartment.replace_all(&address, "").into_owned();
        }

        address.trim().to_string()
    }

    /// Normalize a phone number to E.164 when it parses; anything that does
    /// not look like a phone number is returned unchanged.
    pub fn normalize_phone(&self, phone: &str) -> String {
        if phone.is_empty() {
            return String::new();
        }

        // Already E.164
        if phone.starts_with('+') && (8..=15).contains(&phone.len()) {
            return phone.to_string();
        }

        let Some(caps) = self.phone.captures(phone) else {
            return phone.to_string();
        };

        if self.options.phone_options.e164_format {
            let country = caps.get(1).map_or("1", |m| m.as_str());
            return format!("+{country}{}{}{}", &caps[2], &caps[3], &caps[4]);
        }

        phone.to_string()
    }

    /// Normalize an email address by lowercasing the domain part. Invalid
    /// input is returned unchanged.
    pub fn normalize_email(&self, email: &str) -> String {
        if email.is_empty() {
            return String::new();
        }

        if !self.email.is_match(email) {
            return email.to_string();
        }

        if self.options.email_options.lowercase_domain {
            if let Some((user, domain)) = email.split_once('@') {
                return format!("{user}@{}", domain.to_lowercase());
            }
        }

        email.to_string()
    }

    /// Normalize a US state to its two-letter code. Two-character input is
    /// upper-cased; unknown full names are returned unchanged.
    pub fn normalize_state(&self, state: &str) -> String {
        if state.is_empty() {
            return String::new();
        }

        if state.chars().count() == 2 {
            return state.to_uppercase();
        }

        self.state_codes
            .get(state.to_lowercase().as_str())
            .map_or_else(|| state.to_string(), |code| (*code).to_string())
    }

    /// Normalize a ZIP code: strip non-alphanumerics and keep the first five
    /// digits of US-style codes.
    pub fn normalize_zip(&self, zip: &str) -> String {
        if zip.is_empty() {
            return String::new();
        }

        let zip = self.non_alphanumeric.replace_all(zip, "").into_owned();

        if zip.len() >= 5 && zip.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return zip[..5].to_string();
        }

        zip
    }

    /// Normalize every known field, merging `<field>_normalized` entries into
    /// a copy of the input map.
    pub fn normalize_entity(&self, fields: &HashMap<String, String>) -> HashMap<String, String> {
        let mut normalized = fields.clone();

        for (field, value) in fields {
            let output = match field.as_str() {
                "name" => self.normalize_name(value),
                "address" => self.normalize_address(value),
                "phone" => self.normalize_phone(value),
                "email" => self.normalize_email(value),
                "state" => self.normalize_state(value),
                "zip" => self.normalize_zip(value),
                "city" => self.normalize_text(value),
                _ => continue,
            };
            normalized.insert(format!("{field}_normalized"), output);
        }

        normalized
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NormalizationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        let mut options = NormalizationConfig::default();
        // Keep stopwords out of the way for most tests; the dedicated test
        // below turns them back on.
        options.enable_stopwords = false;
        Normalizer::new(options)
    }

    #[test]
    fn test_text_collapses_whitespace() {
        let n = normalizer();
        assert_eq!(n.normalize_text("  Acme \t Widgets  "), "acme widgets");
    }

    #[test]
    fn test_text_stopwords() {
        let n = Normalizer::default();
        assert_eq!(n.normalize_text("The Bank of New York"), "bank new york");
    }

    #[test]
    fn test_name_strips_legal_suffixes() {
        let n = normalizer();
        assert_eq!(n.normalize_name("Acme Inc."), "acme");
        assert_eq!(n.normalize_name("Acme Corporation"), "acme");
        assert_eq!(n.normalize_name("Globex LLC"), "globex");
        assert_eq!(n.normalize_name("Wayne Enterprises Ltd"), "wayne enterprises");
    }

    #[test]
    fn test_name_normalizes_initials() {
        let n = normalizer();
        assert_eq!(n.normalize_name("J. R. Smith"), "j r smith");
    }

    #[test]
    fn test_address_standardizes_street_types() {
        let n = normalizer();
        assert_eq!(n.normalize_address("123 Main Street"), "123 main st");
        assert_eq!(n.normalize_address("55 Fifth Avenue"), "55 fifth ave");
        assert_eq!(n.normalize_address("9 Sunset Boulevard"), "9 sunset blvd");
    }

    #[test]
    fn test_address_removes_unit_clauses() {
        let n = normalizer();
        assert_eq!(n.normalize_address("123 Main St Apt 4B"), "123 main st");
        assert_eq!(n.normalize_address("123 Main St Suite 200"), "123 main st");
        assert_eq!(n.normalize_address("123 Main St # 12"), "123 main st");
    }

    #[test]
    fn test_phone_e164() {
        let n = normalizer();
        assert_eq!(n.normalize_phone("(123) 456-7890"), "+11234567890");
        assert_eq!(n.normalize_phone("44 123 456 7890"), "+441234567890");
        // Already E.164: preserved
        assert_eq!(n.normalize_phone("+11234567890"), "+11234567890");
        // Unparseable: unchanged
        assert_eq!(n.normalize_phone("call me maybe"), "call me maybe");
    }

    #[test]
    fn test_email_lowercases_domain() {
        let n = normalizer();
        assert_eq!(n.normalize_email("Info@ACME.COM"), "Info@acme.com");
        assert_eq!(n.normalize_email("not-an-email"), "not-an-email");
    }

    #[test]
    fn test_state_codes() {
        let n = normalizer();
        assert_eq!(n.normalize_state("ny"), "NY");
        assert_eq!(n.normalize_state("New York"), "NY");
        assert_eq!(n.normalize_state("Narnia"), "Narnia");
    }

    #[test]
    fn test_zip_truncation() {
        let n = normalizer();
        assert_eq!(n.normalize_zip("12345-6789"), "12345");
        assert_eq!(n.normalize_zip("12345"), "12345");
        assert_eq!(n.normalize_zip("SW1A 1AA"), "SW1A1AA");
    }

    #[test]
    fn test_normalize_entity_merges_twins() {
        let n = normalizer();
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), "Acme Inc.".to_string());
        fields.insert("zip".to_string(), "10001-1234".to_string());

        let normalized = n.normalize_entity(&fields);
        assert_eq!(normalized.get("name").map(String::as_str), Some("Acme Inc."));
        assert_eq!(normalized.get("name_normalized").map(String::as_str), Some("acme"));
        assert_eq!(normalized.get("zip_normalized").map(String::as_str), Some("10001"));
    }

    #[test]
    fn test_idempotence() {
        let n = Normalizer::default();
        for input in [
            "Acme Inc.",
            "J. R. Smith",
            "The Bank of New York",
            "ACME WIDGETS LLC",
        ] {
            let once = n.normalize_name(input);
            assert_eq!(n.normalize_name(&once), once, "name not idempotent for {input:?}");
        }
        for input in ["123 Main Street Apt 4B", "55 Fifth Avenue"] {
            let once = n.normalize_address(input);
            assert_eq!(n.normalize_address(&once), once, "address not idempotent for {input:?}");
        }
        for input in ["(123) 456-7890", "+11234567890"] {
            let once = n.normalize_phone(input);
            assert_eq!(n.normalize_phone(&once), once, "phone not idempotent for {input:?}");
        }
        for input in ["Info@ACME.com", "user@example.org"] {
            let once = n.normalize_email(input);
            assert_eq!(n.normalize_email(&once), once, "email not idempotent for {input:?}");
        }
        for input in ["12345-6789", "SW1A 1AA"] {
            let once = n.normalize_zip(input);
            assert_eq!(n.normalize_zip(&once), once, "zip not idempotent for {input:?}");
        }
        for input in ["New York", "ny"] {
            let once = n.normalize_state(input);
            assert_eq!(n.normalize_state(&once), once, "state not idempotent for {input:?}");
        }
    }
}
