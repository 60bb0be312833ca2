//! Entity keys and subscription key patterns
//!
//! A key is a short tuple of nullable string parts. A pattern is compared
//! against it part by part:
//!
//! ```text
//! pattern  [ "EUR", "USD", "*" ]
//! key      [ "EUR", "USD", "spot", "bid" ]   → match (wildcard takes the rest)
//! key      [ "EUR", "GBP", "spot" ]          → no match at part 1
//! key      [ "EUR", "USD" ]                  → match (wildcard takes nothing)
//! ```
//!
//! A null part on either side never matches. Without a wildcard the lengths
//! must agree.

use std::fmt;

/// Token that matches the remainder of a key
pub const WILDCARD: &str = "*";

/// Rendering of a null part
const NULL_PART: &str = "<null>";

/// Key of one published entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct EntityKey {
    parts: Vec<Option<String>>,
}

impl EntityKey {
    pub fn new(parts: Vec<Option<String>>) -> Self {
        Self { parts }
    }

    /// Key with every part present
    pub fn of<S: AsRef<str>>(parts: &[S]) -> Self {
        Self::new(parts.iter().map(|p| Some(p.as_ref().to_string())).collect())
    }

    pub fn parts(&self) -> &[Option<String>] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Subscription pattern over entity keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyPattern {
    parts: Vec<Option<String>>,
}

impl KeyPattern {
    pub fn new(parts: Vec<Option<String>>) -> Self {
        Self { parts }
    }

    /// Pattern with every part present; `"*"` parts are wildcards
    pub fn of<S: AsRef<str>>(parts: &[S]) -> Self {
        Self::new(parts.iter().map(|p| Some(p.as_ref().to_string())).collect())
    }

    /// Pattern matching every key
    pub fn any() -> Self {
        Self::of(&[WILDCARD])
    }

    pub fn parts(&self) -> &[Option<String>] {
        &self.parts
    }

    /// Whether `key` is selected by this pattern.
    ///
    /// The first wildcard part matches whatever remains of the key, so a
    /// wildcard placed before the last part behaves as if it were last.
    pub fn matches(&self, key: &EntityKey) -> bool {
        if self.parts.len() > key.parts.len() + 1 {
            return false;
        }

        for (index, part) in self.parts.iter().enumerate() {
            let Some(part) = part.as_deref() else {
                return false;
            };
            if part == WILDCARD {
                return true;
            }
            match key.parts.get(index) {
                Some(Some(key_part)) if key_part == part => {}
                _ => return false,
            }
        }

        self.parts.len() == key.parts.len()
    }
}

fn write_parts(f: &mut fmt::Formatter<'_>, parts: &[Option<String>]) -> fmt::Result {
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            f.write_str(".")?;
        }
        f.write_str(part.as_deref().unwrap_or(NULL_PART))?;
    }
    Ok(())
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_parts(f, &self.parts)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_parts(f, &self.parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exact_match_needs_equal_length() {
        let pattern = KeyPattern::of(&["EUR", "USD"]);
        assert!(pattern.matches(&EntityKey::of(&["EUR", "USD"])));
        assert!(!pattern.matches(&EntityKey::of(&["EUR", "USD", "spot"])));
        assert!(!pattern.matches(&EntityKey::of(&["EUR"])));
        assert!(!pattern.matches(&EntityKey::of(&["EUR", "GBP"])));
    }

    #[test]
    fn test_terminal_wildcard_takes_remainder() {
        let pattern = KeyPattern::of(&["EUR", "*"]);
        assert!(pattern.matches(&EntityKey::of(&["EUR"])));
        assert!(pattern.matches(&EntityKey::of(&["EUR", "USD"])));
        assert!(pattern.matches(&EntityKey::of(&["EUR", "USD", "spot", "bid"])));
        assert!(!pattern.matches(&EntityKey::of(&["GBP", "USD"])));
        assert!(KeyPattern::any().matches(&EntityKey::default()));
    }

    #[test]
    fn test_null_parts_never_match() {
        let key = EntityKey::new(vec![Some("EUR".into()), None]);
        assert!(!KeyPattern::of(&["EUR", "USD"]).matches(&key));
        assert!(KeyPattern::of(&["EUR", "*"]).matches(&key));

        let pattern = KeyPattern::new(vec![None, Some("*".into())]);
        assert!(!pattern.matches(&EntityKey::of(&["EUR", "USD"])));
    }

    #[test]
    fn test_pattern_too_long_fails_immediately() {
        let pattern = KeyPattern::of(&["a", "b", "*"]);
        assert!(!pattern.matches(&EntityKey::of(&["a"])));
        assert!(pattern.matches(&EntityKey::of(&["a", "b"])));
    }

    #[test]
    fn test_display() {
        let key = EntityKey::new(vec![Some("a".into()), None]);
        assert_eq!(key.to_string(), "a.<null>");
        assert_eq!(KeyPattern::of(&["a", "*"]).to_string(), "a.*");
    }

    fn part() -> impl Strategy<Value = String> {
        "[a-z]{1,4}"
    }

    proptest! {
        #[test]
        fn key_matches_itself(parts in prop::collection::vec(part(), 0..6)) {
            prop_assert!(KeyPattern::of(&parts).matches(&EntityKey::of(&parts)));
        }

        #[test]
        fn wildcard_suffix_matches_any_extension(
            prefix in prop::collection::vec(part(), 0..4),
            rest in prop::collection::vec(part(), 0..4),
        ) {
            let mut pattern = prefix.clone();
            pattern.push(WILDCARD.to_string());
            let key: Vec<_> = prefix.iter().chain(rest.iter()).cloned().collect();
            prop_assert!(KeyPattern::of(&pattern).matches(&EntityKey::of(&key)));
        }
    }
}
