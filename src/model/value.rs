//! Scalar attribute values.
//!
//! These are the elements that attribute sets are built from. Values are
//! totally ordered (floats via `total_cmp`) so that sets of them have a
//! canonical, deterministic iteration order.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar stored inside an [`AttributeSet`](super::AttributeSet).
///
/// Serialized untagged, so `"person"`, `42`, `1.5` and `true` in JSON map
/// directly onto the matching variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

// ============================================================================
// Accessors
// ============================================================================

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            AttrValue::Bool(_) => 0,
            AttrValue::Int(_) => 1,
            AttrValue::Float(_) => 2,
            AttrValue::String(_) => 3,
        }
    }
}

// ============================================================================
// Ordering (total, so values can live in BTreeSets)
// ============================================================================

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AttrValue {}

impl PartialOrd for AttrValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttrValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a.cmp(b),
            (AttrValue::Int(a), AttrValue::Int(b)) => a.cmp(b),
            (AttrValue::Float(a), AttrValue::Float(b)) => a.total_cmp(b),
            (AttrValue::String(a), AttrValue::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for AttrValue { fn from(v: bool) -> Self { AttrValue::Bool(v) } }
impl From<i32> for AttrValue { fn from(v: i32) -> Self { AttrValue::Int(v as i64) } }
impl From<i64> for AttrValue { fn from(v: i64) -> Self { AttrValue::Int(v) } }
impl From<f64> for AttrValue { fn from(v: f64) -> Self { AttrValue::Float(v) } }
impl From<String> for AttrValue { fn from(v: String) -> Self { AttrValue::String(v) } }
impl From<&str> for AttrValue { fn from(v: &str) -> Self { AttrValue::String(v.to_owned()) } }

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from() {
        assert_eq!(AttrValue::from("hello"), AttrValue::String("hello".into()));
        assert_eq!(AttrValue::from(42), AttrValue::Int(42));
        assert_eq!(AttrValue::from(true), AttrValue::Bool(true));
    }

    #[test]
    fn test_total_order_across_variants() {
        let mut values = vec![
            AttrValue::from("b"),
            AttrValue::from(3),
            AttrValue::from(false),
            AttrValue::from(1.5),
            AttrValue::from("a"),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                AttrValue::from(false),
                AttrValue::from(3),
                AttrValue::from(1.5),
                AttrValue::from("a"),
                AttrValue::from("b"),
            ]
        );
    }

    #[test]
    fn test_nan_is_equal_to_itself() {
        assert_eq!(AttrValue::Float(f64::NAN), AttrValue::Float(f64::NAN));
    }

    #[test]
    fn test_untagged_json() {
        let v: AttrValue = serde_json::from_str("\"person\"").unwrap();
        assert_eq!(v, AttrValue::from("person"));
        let v: AttrValue = serde_json::from_str("7").unwrap();
        assert_eq!(v, AttrValue::Int(7));
    }
}
