//! Search keyword vocabulary.
//!
//! A `KeywordSet` is an ordered list of distinct, lowercased, non-empty
//! terms. The invariant is enforced at construction: normalization happens
//! inside `build`, and an input that normalizes to nothing yields `None`
//! so the caller has to supply a fallback instead of an empty set.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeywordSet {
    terms: Vec<String>,
}

impl KeywordSet {
    /// Builds a set from raw candidates: trims, lowercases, drops empties,
    /// deduplicates keeping first-seen order.
    pub fn build<I, S>(candidates: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut terms = Vec::new();
        for candidate in candidates {
            let term = candidate.as_ref().trim().to_lowercase();
            if term.is_empty() {
                continue;
            }
            if seen.insert(term.clone()) {
                terms.push(term);
            }
        }
        if terms.is_empty() {
            None
        } else {
            Some(Self { terms })
        }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Always false; an empty set cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    pub fn join(&self, sep: &str) -> String {
        self.terms.join(sep)
    }
}

impl fmt::Display for KeywordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.terms.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_lowercases_and_trims() {
        let set = KeywordSet::build(["  KRAS G12C  ", "Sotorasib"]).unwrap();
        assert_eq!(set.terms(), ["kras g12c", "sotorasib"]);
    }

    #[test]
    fn build_dedupes_keeping_first_seen_order() {
        let set = KeywordSet::build(["egfr", "osimertinib", "EGFR", "egfr "]).unwrap();
        assert_eq!(set.terms(), ["egfr", "osimertinib"]);
    }

    #[test]
    fn build_rejects_all_blank_input() {
        assert!(KeywordSet::build(["", "   ", "\t"]).is_none());
        assert!(KeywordSet::build(Vec::<String>::new()).is_none());
    }

    #[test]
    fn display_joins_with_commas() {
        let set = KeywordSet::build(["a", "b"]).unwrap();
        assert_eq!(set.to_string(), "a, b");
    }
}
