//! Comparator registry.
//!
//! Central lookup for similarity functions by logical name or by field type,
//! so callers never hard-wire a concrete comparator. Unknown names fall back
//! to the generic text comparator (Jaro-Winkler).

use crate::fields::{
    AddressSimilarity, EmailSimilarity, NameSimilarity, PhoneSimilarity, ZipSimilarity,
};
use crate::text::{
    CaseInsensitiveMatch, ContainedIn, Cosine, ExactMatch, Jaccard, JaroWinkler, Levenshtein,
};
use crate::Comparator;

pub struct Registry {
    name: NameSimilarity,
    address: AddressSimilarity,
    phone: PhoneSimilarity,
    email: EmailSimilarity,
    zip: ZipSimilarity,

    text: JaroWinkler,
    exact: ExactMatch,
    case_insensitive: CaseInsensitiveMatch,
    jaro_winkler: JaroWinkler,
    levenshtein: Levenshtein,
    jaccard: Jaccard,
    cosine: Cosine,
    contained_in: ContainedIn,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            name: NameSimilarity::new(),
            address: AddressSimilarity::new(),
            phone: PhoneSimilarity,
            email: EmailSimilarity::new(),
            zip: ZipSimilarity,
            text: JaroWinkler::default(),
            exact: ExactMatch,
            case_insensitive: CaseInsensitiveMatch,
            jaro_winkler: JaroWinkler::default(),
            levenshtein: Levenshtein,
            jaccard: Jaccard,
            cosine: Cosine,
            contained_in: ContainedIn { ignore_case: true },
        }
    }

    /// Resolve a comparator by logical name.
    pub fn by_name(&self, name: &str) -> &dyn Comparator {
        match name.to_lowercase().as_str() {
            "name" | "namesimilarity" => &self.name,
            "address" | "addresssimilarity" => &self.address,
            "phone" | "phonesimilarity" | "phonenumber" => &self.phone,
            "email" | "emailsimilarity" => &self.email,
            "zip" | "zipcode" | "postalcode" | "zipsimilarity" => &self.zip,
            "exact" | "exactmatch" => &self.exact,
            "case" | "caseinsensitive" | "caseinsensitivematch" => &self.case_insensitive,
            "jaro" | "jarowinkler" => &self.jaro_winkler,
            "levenshtein" | "editdistance" => &self.levenshtein,
            "jaccard" | "token" => &self.jaccard,
            "cosine" | "cosinesimilarity" => &self.cosine,
            "contains" | "containedin" => &self.contained_in,
            _ => &self.text,
        }
    }

    /// Resolve the comparator appropriate for a field type.
    pub fn by_field_type(&self, field_type: &str) -> &dyn Comparator {
        match field_type.to_lowercase().as_str() {
            "name" | "business_name" | "person_name" | "company" | "organization" => &self.name,
            "address" | "street" | "street_address" | "mailing_address" => &self.address,
            "phone" | "phone_number" | "telephone" | "mobile" | "cell" | "fax" => &self.phone,
            "email" | "email_address" => &self.email,
            "zip" | "zipcode" | "postal_code" | "postal" => &self.zip,
            _ => &self.text,
        }
    }

    /// Infer a comparator from a field's name when no explicit type mapping
    /// exists.
    pub fn infer_from_field_name(&self, field_name: &str) -> &dyn Comparator {
        let field = field_name.to_lowercase();
        if ["name", "company", "business", "organization"]
            .iter()
            .any(|hint| field.contains(hint))
        {
            return &self.name;
        }
        if field.contains("address") || field.contains("street") {
            return &self.address;
        }
        if ["phone", "tel", "mobile", "cell", "fax"]
            .iter()
            .any(|hint| field.contains(hint))
        {
            return &self.phone;
        }
        if field.contains("email") {
            return &self.email;
        }
        if field.contains("zip") || field.contains("postal") {
            return &self.zip;
        }
        &self.text
    }

    pub fn exact_match(&self) -> &dyn Comparator {
        &self.exact
    }

    pub fn text(&self) -> &dyn Comparator {
        &self.text
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name_resolution() {
        let registry = Registry::new();
        assert_eq!(registry.by_name("name").name(), "NameSimilarity");
        assert_eq!(registry.by_name("JaroWinkler").name(), "JaroWinkler");
        assert_eq!(registry.by_name("editdistance").name(), "Levenshtein");
        // Unknown names fall back to text similarity.
        assert_eq!(registry.by_name("nonsense").name(), "JaroWinkler");
    }

    #[test]
    fn test_by_field_type_resolution() {
        let registry = Registry::new();
        assert_eq!(registry.by_field_type("business_name").name(), "NameSimilarity");
        assert_eq!(registry.by_field_type("postal_code").name(), "ZipSimilarity");
        assert_eq!(registry.by_field_type("fax").name(), "PhoneSimilarity");
        assert_eq!(registry.by_field_type("notes").name(), "JaroWinkler");
    }

    #[test]
    fn test_infer_from_field_name() {
        let registry = Registry::new();
        assert_eq!(registry.infer_from_field_name("company_name").name(), "NameSimilarity");
        assert_eq!(registry.infer_from_field_name("street_address").name(), "AddressSimilarity");
        assert_eq!(registry.infer_from_field_name("mobile_number").name(), "PhoneSimilarity");
        assert_eq!(registry.infer_from_field_name("contact_email").name(), "EmailSimilarity");
        assert_eq!(registry.infer_from_field_name("zip").name(), "ZipSimilarity");
        assert_eq!(registry.infer_from_field_name("description").name(), "JaroWinkler");
    }
}
