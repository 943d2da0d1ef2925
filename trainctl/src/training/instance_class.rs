//! Normalisation of the free-form subject category a user enters for a project.
//!
//! The training service produces better class-prior images for a small set of canonical
//! nouns, so common synonyms collapse onto them. Anything unrecognised is used verbatim.

const CANONICAL_CLASSES: &[(&str, &[&str])] = &[
    ("man", &["man", "men", "boy", "guy", "male", "gentleman"]),
    ("woman", &["woman", "women", "girl", "lady", "female"]),
    ("person", &["person", "people", "human", "child", "kid"]),
    ("dog", &["dog", "puppy", "doggy"]),
    ("cat", &["cat", "kitten", "kitty"]),
];

/// Map a raw instance class onto its canonical form.
///
/// Matching ignores case and surrounding whitespace. Unknown classes are returned unchanged,
/// including their original casing.
pub fn resolve_instance_class(raw: &str) -> String {
    let key = raw.trim().to_lowercase();

    CANONICAL_CLASSES
        .iter()
        .find(|(_, variants)| variants.contains(&key.as_str()))
        .map(|(canonical, _)| canonical.to_string())
        .unwrap_or_else(|| raw.to_string())
}
