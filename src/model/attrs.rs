//! Attrs: the attribute dictionary carried by every node and edge.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::AttributeSet;

/// Attribute key → lattice element.
///
/// A key that is absent behaves exactly like a key bound to the empty set,
/// so `intersection` and `difference` drop keys whose result is empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attrs(BTreeMap<String, AttributeSet>);

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, normalizing raw values into sets.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeSet>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&AttributeSet> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeSet>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeSet> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeSet)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(AttributeSet::is_empty)
    }

    pub fn union(&self, other: &Attrs) -> Attrs {
        let mut out = self.clone();
        for (key, value) in &other.0 {
            let merged = match out.0.get(key) {
                Some(existing) => existing.union(value),
                None => value.clone(),
            };
            out.0.insert(key.clone(), merged);
        }
        out
    }

    pub fn intersection(&self, other: &Attrs) -> Attrs {
        let mut out = Attrs::new();
        for (key, value) in &self.0 {
            if let Some(theirs) = other.0.get(key) {
                let common = value.intersection(theirs);
                if !common.is_empty() {
                    out.0.insert(key.clone(), common);
                }
            }
        }
        out
    }

    pub fn difference(&self, other: &Attrs) -> Attrs {
        let mut out = Attrs::new();
        for (key, value) in &self.0 {
            let rest = match other.0.get(key) {
                Some(theirs) => value.difference(theirs),
                None => value.clone(),
            };
            if !rest.is_empty() {
                out.0.insert(key.clone(), rest);
            }
        }
        out
    }

    /// `valid_attributes(self, other)`: every key of `self` maps to a subset
    /// of the same key in `other`.
    pub fn is_subset_of(&self, other: &Attrs) -> bool {
        self.0.iter().all(|(key, value)| match other.0.get(key) {
            Some(theirs) => value.is_subset(theirs),
            None => value.is_empty(),
        })
    }
}

impl<K: Into<String>, V: Into<AttributeSet>> FromIterator<(K, V)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Attrs(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_empty_set() {
        let a = Attrs::new().with("name", "alice");
        let b = Attrs::new();
        assert!(!a.is_subset_of(&b));
        assert!(b.is_subset_of(&a));
        let empty = Attrs::new().with("name", AttributeSet::Empty);
        assert!(empty.is_subset_of(&b));
    }

    #[test]
    fn test_union_merges_per_key() {
        let a = Attrs::new().with("t", "x").with("u", 1i64);
        let b = Attrs::new().with("t", "y");
        let u = a.union(&b);
        assert_eq!(u.get("t"), Some(&AttributeSet::finite(["x", "y"])));
        assert_eq!(u.get("u"), Some(&AttributeSet::finite([1i64])));
    }

    #[test]
    fn test_intersection_and_difference_drop_empty_keys() {
        let a = Attrs::new().with("t", "x").with("u", 1i64);
        let b = Attrs::new().with("t", "y").with("u", 1i64);
        assert_eq!(a.intersection(&b), Attrs::new().with("u", 1i64));
        assert_eq!(a.difference(&b), Attrs::new().with("t", "x"));
    }

    #[test]
    fn test_json_accepts_raw_values() {
        let attrs: Attrs = serde_json::from_str(r#"{"name": "bob", "age": [30, 31]}"#).unwrap();
        assert_eq!(
            attrs,
            Attrs::new()
                .with("name", "bob")
                .with("age", AttributeSet::finite([30i64, 31]))
        );
    }
}
