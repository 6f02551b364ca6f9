//! Key extraction, matching and serialization.
//!
//! [`KeyCodec`] reads the join key of a record for one relation side. Which
//! side is array-typed is decided by the descriptor: a `belongs_to_many`
//! owner holds the array, a `has_one`/`has_many` array target holds it.
//!
//! Array keys are rendered as PostgreSQL array literals (`{1,2}`), the same
//! text form the server uses for array columns, so containment predicates
//! built from them compare correctly.

use super::def::{KeySide, RelationDescriptor};
use crate::value::{AttrValue, Record, Scalar};

/// The join key of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValue {
    Scalar(Scalar),
    Array(Vec<Scalar>),
}

impl KeyValue {
    /// Scalars this key indexes under (fan-out for arrays)
    pub fn elements(&self) -> &[Scalar] {
        match self {
            KeyValue::Scalar(s) => std::slice::from_ref(s),
            KeyValue::Array(items) => items,
        }
    }

    pub fn into_attr(self) -> AttrValue {
        match self {
            KeyValue::Scalar(s) => AttrValue::Scalar(s),
            KeyValue::Array(items) => AttrValue::Array(items),
        }
    }
}

/// Key codec bound to one relation
#[derive(Debug, Clone, Copy)]
pub struct KeyCodec<'a> {
    descriptor: &'a RelationDescriptor,
}

impl<'a> KeyCodec<'a> {
    pub fn new(descriptor: &'a RelationDescriptor) -> Self {
        Self { descriptor }
    }

    /// Key of an owner record
    ///
    /// `None` when a scalar key is null. A null array reads as the empty array.
    pub fn encode_owner_key(&self, record: &Record) -> Option<KeyValue> {
        encode(
            record.get(&self.descriptor.owner_key),
            self.descriptor.array_side() == Some(KeySide::Owner),
        )
    }

    /// Key of a target record
    pub fn encode_target_key(&self, record: &Record) -> Option<KeyValue> {
        encode(
            record.get(&self.descriptor.target_key),
            self.descriptor.array_side() == Some(KeySide::Target),
        )
    }

    /// Whether an owner key and a target key refer to each other
    pub fn matches(&self, owner_key: &KeyValue, target_key: &KeyValue) -> bool {
        matches(owner_key, target_key)
    }

    pub fn serialize(&self, key: &KeyValue) -> String {
        serialize(key)
    }
}

fn encode(value: &AttrValue, array: bool) -> Option<KeyValue> {
    if array {
        return Some(KeyValue::Array(value.elements().to_vec()));
    }
    match value {
        AttrValue::Null => None,
        AttrValue::Scalar(s) => Some(KeyValue::Scalar(s.clone())),
        // an array read through a scalar connection only matches as a whole
        AttrValue::Array(items) => Some(KeyValue::Array(items.clone())),
    }
}

/// Equality for two scalars, membership when one side is an array, and
/// overlap when both are.
pub fn matches(owner_key: &KeyValue, target_key: &KeyValue) -> bool {
    match (owner_key, target_key) {
        (KeyValue::Scalar(owner), KeyValue::Scalar(target)) => owner == target,
        (KeyValue::Array(owner), KeyValue::Scalar(target)) => owner.contains(target),
        (KeyValue::Scalar(owner), KeyValue::Array(target)) => target.contains(owner),
        (KeyValue::Array(owner), KeyValue::Array(target)) => {
            owner.iter().any(|item| target.contains(item))
        }
    }
}

/// Text form of a key: a PostgreSQL array literal for arrays
pub fn serialize(key: &KeyValue) -> String {
    match key {
        KeyValue::Scalar(s) => s.to_string(),
        KeyValue::Array(items) => array_literal(items),
    }
}

/// `{1,2}`, `{"a b","c\"d"}`
pub fn array_literal(items: &[Scalar]) -> String {
    let body: Vec<String> = items.iter().map(array_element).collect();
    format!("{{{}}}", body.join(","))
}

fn array_element(value: &Scalar) -> String {
    match value {
        Scalar::Bool(b) => b.to_string(),
        Scalar::Int(i) => i.to_string(),
        Scalar::Uuid(u) => u.to_string(),
        Scalar::Text(s) => {
            let needs_quotes = s.is_empty()
                || s.eq_ignore_ascii_case("null")
                || s.chars().any(|c| {
                    c.is_whitespace() || matches!(c, '{' | '}' | ',' | '"' | '\\' | '\'')
                });
            if needs_quotes {
                let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\"")
            } else {
                s.clone()
            }
        }
    }
}

/// Quoted SQL literal for a scalar
pub fn sql_literal(value: &Scalar) -> String {
    match value {
        Scalar::Bool(b) => b.to_string(),
        Scalar::Int(i) => i.to_string(),
        Scalar::Uuid(u) => format!("'{u}'"),
        Scalar::Text(s) => quote(s),
    }
}

/// Quoted SQL literal of an array, e.g. `'{1,2}'`
pub fn sql_array_literal(items: &[Scalar]) -> String {
    quote(&array_literal(items))
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> RelationDescriptor {
        RelationDescriptor::belongs_to_many("videos", "tags").build().unwrap()
    }

    fn videos() -> RelationDescriptor {
        RelationDescriptor::has_many("tags", "videos").array().build().unwrap()
    }

    #[test]
    fn test_owner_array_key() {
        let desc = tags();
        let codec = KeyCodec::new(&desc);
        let video = Record::loaded("videos", [("id", AttrValue::from(1i64)), ("tag_ids", vec![3i64, 4].into())]);
        assert_eq!(
            codec.encode_owner_key(&video),
            Some(KeyValue::Array(vec![Scalar::Int(3), Scalar::Int(4)]))
        );
    }

    #[test]
    fn test_null_array_reads_as_empty() {
        let desc = tags();
        let codec = KeyCodec::new(&desc);
        let video = Record::loaded("videos", [("id", 1i64)]);
        assert_eq!(codec.encode_owner_key(&video), Some(KeyValue::Array(vec![])));
    }

    #[test]
    fn test_null_scalar_key_is_none() {
        let desc = videos();
        let codec = KeyCodec::new(&desc);
        assert_eq!(codec.encode_owner_key(&Record::new("tags")), None);
    }

    #[test]
    fn test_matches() {
        let one = KeyValue::Scalar(Scalar::Int(1));
        let array = KeyValue::Array(vec![Scalar::Int(1), Scalar::Int(2)]);
        let other = KeyValue::Array(vec![Scalar::Int(5)]);

        assert!(matches(&one, &one));
        assert!(matches(&array, &one));
        assert!(matches(&one, &array));
        assert!(!matches(&one, &other));
        assert!(!matches(&array, &other));
        assert!(matches(&array, &KeyValue::Array(vec![Scalar::Int(2)])));
    }

    #[test]
    fn test_array_literal() {
        assert_eq!(array_literal(&[Scalar::Int(1), Scalar::Int(2)]), "{1,2}");
        assert_eq!(array_literal(&[]), "{}");
        assert_eq!(
            array_literal(&[Scalar::from("a b"), Scalar::from("c\"d"), Scalar::from("plain")]),
            r#"{"a b","c\"d",plain}"#
        );
        assert_eq!(array_literal(&[Scalar::from("NULL")]), r#"{"NULL"}"#);
    }

    #[test]
    fn test_sql_literals() {
        assert_eq!(sql_literal(&Scalar::Int(7)), "7");
        assert_eq!(sql_literal(&Scalar::from("o'hara")), "'o''hara'");
        assert_eq!(sql_array_literal(&[Scalar::from("it's")]), r#"'{"it''s"}'"#);
    }

    #[test]
    fn test_serialize_scalar_and_array() {
        let desc = tags();
        let codec = KeyCodec::new(&desc);
        assert_eq!(codec.serialize(&KeyValue::Scalar(Scalar::Int(9))), "9");
        assert_eq!(codec.serialize(&KeyValue::Array(vec![Scalar::Int(9)])), "{9}");
    }
}
