//! # Resolve Similarity
//!
//! String similarity for entity matching: generic comparators, comparators
//! specialized per field type, and a registry resolving them by name or by
//! field type.
//!
//! Every comparator implements [`Comparator`] and maps a pair of strings to
//! a score in [0.0, 1.0]:
//!
//! - [`ExactMatch`] / [`CaseInsensitiveMatch`] - 0/1 equality checks
//! - [`JaroWinkler`] - character similarity with a common-prefix boost
//! - [`Levenshtein`] - edit-distance ratio
//! - [`Jaccard`] / [`Cosine`] - word-token overlap metrics
//! - [`ContainedIn`] - substring containment scored by length ratio
//! - [`NameSimilarity`], [`AddressSimilarity`], [`PhoneSimilarity`],
//!   [`EmailSimilarity`], [`ZipSimilarity`] - field-aware blends
//!
//! ## Example
//!
//! ```rust
//! use resolve_similarity::{Comparator, Registry};
//!
//! let registry = Registry::new();
//! let name = registry.by_field_type("business_name");
//! let score = name.compare("Acme Inc.", "ACME Incorporated");
//! assert_eq!(score, 1.0);
//! ```

pub mod fields;
pub mod registry;
pub mod text;

pub use fields::{
    AddressSimilarity, EmailSimilarity, NameSimilarity, PhoneSimilarity, ZipSimilarity,
};
pub use registry::Registry;
pub use text::{
    CaseInsensitiveMatch, ContainedIn, Cosine, ExactMatch, Jaccard, JaroWinkler, Levenshtein,
};

/// A similarity function over a pair of strings.
///
/// Scores are in [0.0, 1.0] with 1.0 meaning identical. `compare(a, a)` is
/// always 1.0, two empty strings are identical, and an empty string against
/// a non-empty one scores 0.0. Comparators are symmetric unless documented
/// otherwise.
pub trait Comparator: Send + Sync {
    fn compare(&self, a: &str, b: &str) -> f64;

    /// Stable name used in match explanations and field-score output.
    fn name(&self) -> &'static str;
}
