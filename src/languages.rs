//! Language sets used to key recognition readers.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Default language when a request names none.
pub const DEFAULT_LANGUAGE: &str = "en";

/// An order-independent set of language codes.
///
/// Codes are trimmed and lowercased; blanks are dropped. The set is kept
/// sorted and deduplicated, so `["fr", "en"]` and `["en", "fr", "en"]`
/// compare (and hash) equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LanguageSet(BTreeSet<String>);

impl LanguageSet {
    /// Build a set from request codes. An empty request means English.
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = codes
            .into_iter()
            .map(|c| c.as_ref().trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();

        if set.is_empty() {
            Self::english()
        } else {
            Self(set)
        }
    }

    /// The `{en}` set used as the construction fallback.
    pub fn english() -> Self {
        Self(BTreeSet::from([DEFAULT_LANGUAGE.to_string()]))
    }

    /// Parse the comma-separated `lang` form field.
    pub fn parse_list(raw: Option<&str>) -> Self {
        match raw {
            Some(raw) => Self::new(raw.split(',')),
            None => Self::english(),
        }
    }

    pub fn is_english_only(&self) -> bool {
        *self == Self::english()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for LanguageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.iter().collect::<Vec<_>>().join("+");
        f.write_str(&joined)
    }
}
