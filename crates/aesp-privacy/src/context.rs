//! Canonical context-string construction: the single input that feeds
//! context-isolated derivation everywhere in this subsystem.

/// Sorts `segments` lexicographically and joins them with `:`. Two calls
/// with the same segment set, in any order, produce the same string.
pub fn build_context(segments: &[String]) -> String {
    let mut sorted = segments.to_vec();
    sorted.sort();
    sorted.join(":")
}

pub fn segment(key: &str, value: &str) -> String {
    format!("{key}:{value}")
}
