//! Attribute value types.
//!
//! A record attribute is either null, a single [`Scalar`], or an ordered
//! sequence of scalars (a PostgreSQL array column). Scalars are hashable so
//! they can be used directly as index keys while resolving relations.
//!
//! ## Usage
//!
//! ```rust
//! use lifeguard_arrays::{AttrValue, Scalar};
//!
//! let id: Scalar = 42i64.into();
//! let tag_ids: AttrValue = vec![1i64, 2, 3].into();
//! assert_eq!(tag_ids.elements().len(), 3);
//! assert!(tag_ids.contains(&Scalar::Int(2)));
//! assert_eq!(AttrValue::from(id).as_scalar(), Some(&Scalar::Int(42)));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single non-null column value usable as a key
///
/// Variant order matters for untagged deserialization: a JSON string that
/// parses as a UUID becomes `Uuid`, any other string becomes `Text`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Uuid(Uuid),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Uuid(u) => write!(f, "{u}"),
            Scalar::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<Uuid> for Scalar {
    fn from(value: Uuid) -> Self {
        Scalar::Uuid(value)
    }
}

/// The value held by one record attribute
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    #[default]
    Null,
    Scalar(Scalar),
    Array(Vec<Scalar>),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            AttrValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of the value: the array contents, the scalar itself, or
    /// nothing for null.
    pub fn elements(&self) -> &[Scalar] {
        match self {
            AttrValue::Null => &[],
            AttrValue::Scalar(s) => std::slice::from_ref(s),
            AttrValue::Array(items) => items,
        }
    }

    pub fn contains(&self, value: &Scalar) -> bool {
        self.elements().contains(value)
    }
}

impl From<Scalar> for AttrValue {
    fn from(value: Scalar) -> Self {
        AttrValue::Scalar(value)
    }
}

impl From<Option<Scalar>> for AttrValue {
    fn from(value: Option<Scalar>) -> Self {
        value.map_or(AttrValue::Null, AttrValue::Scalar)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Scalar(value.into())
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Scalar(value.into())
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Scalar(value.into())
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Scalar(value.into())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Scalar(value.into())
    }
}

impl From<Uuid> for AttrValue {
    fn from(value: Uuid) -> Self {
        AttrValue::Scalar(value.into())
    }
}

impl<T: Into<Scalar>> From<Vec<T>> for AttrValue {
    fn from(values: Vec<T>) -> Self {
        AttrValue::Array(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_elements_of_each_shape() {
        assert!(AttrValue::Null.elements().is_empty());
        assert_eq!(AttrValue::from(5i64).elements(), &[Scalar::Int(5)]);
        assert_eq!(
            AttrValue::from(vec![1i64, 2]).elements(),
            &[Scalar::Int(1), Scalar::Int(2)]
        );
    }

    #[test]
    fn test_untagged_deserialization() {
        let value: AttrValue = serde_json::from_value(json!([1, 2])).unwrap();
        assert_eq!(value, AttrValue::from(vec![1i64, 2]));

        let value: AttrValue = serde_json::from_value(json!(null)).unwrap();
        assert!(value.is_null());

        let value: AttrValue = serde_json::from_value(json!("drama")).unwrap();
        assert_eq!(value, AttrValue::Scalar(Scalar::Text("drama".to_string())));

        let id = Uuid::new_v4();
        let value: AttrValue = serde_json::from_value(json!(id.to_string())).unwrap();
        assert_eq!(value, AttrValue::Scalar(Scalar::Uuid(id)));
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(Scalar::Int(7).to_string(), "7");
        assert_eq!(Scalar::Text("a".to_string()).to_string(), "a");
        assert_eq!(Scalar::Bool(true).to_string(), "true");
    }
}
