//! Culture and string comparison settings.

use std::cmp::Ordering;
use std::fmt;

/// The culture a view or converter formats and compares values under.
///
/// Cultures are identified by name (`"en-US"`, `"fr-FR"`, ...). The empty
/// name is the invariant culture. The engine passes the culture through to
/// group descriptions and converters; comparisons it performs itself are
/// ordinal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Culture {
    name: String,
}

impl Culture {
    /// The invariant culture.
    pub fn invariant() -> Self {
        Self::default()
    }

    /// A named culture.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The culture name; empty for the invariant culture.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` for the invariant culture.
    pub fn is_invariant(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for Culture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invariant() {
            write!(f, "(invariant)")
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// How two strings are compared when matching names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StringComparison {
    /// Compare code points exactly.
    #[default]
    Ordinal,
    /// Compare code points after simple case folding.
    OrdinalIgnoreCase,
}

impl StringComparison {
    /// Compare two strings under this comparison.
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Ordinal => a.cmp(b),
            Self::OrdinalIgnoreCase => a
                .chars()
                .flat_map(char::to_lowercase)
                .cmp(b.chars().flat_map(char::to_lowercase)),
        }
    }

    /// Returns `true` if the two strings are equal under this comparison.
    pub fn equals(self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_culture() {
        assert!(Culture::invariant().is_invariant());
        assert_eq!(Culture::new("fr-FR").name(), "fr-FR");
        assert_eq!(Culture::invariant().to_string(), "(invariant)");
    }

    #[test]
    fn test_string_comparison() {
        assert!(!StringComparison::Ordinal.equals("Alpha", "alpha"));
        assert!(StringComparison::OrdinalIgnoreCase.equals("Alpha", "aLPHA"));
        assert_eq!(
            StringComparison::OrdinalIgnoreCase.compare("apple", "Banana"),
            Ordering::Less
        );
        assert_eq!(StringComparison::Ordinal.compare("apple", "Banana"), Ordering::Greater);
    }
}
