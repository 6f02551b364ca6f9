//! Relation type definitions.
//!
//! `RelationType` names the macro-level kind of a relation, `Connection`
//! how owner and target keys are compared, and `Cardinality` / `KeySide`
//! are derived from the pair.

/// Type of relationship between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// Many-to-one relationship: the owner holds a scalar key
    BelongsTo,
    /// The owner holds an array of target keys
    BelongsToMany,
    /// One-to-one relationship: the target holds the key
    HasOne,
    /// One-to-many relationship: the target holds the key
    HasMany,
}

impl RelationType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::BelongsTo => "belongs_to",
            RelationType::BelongsToMany => "belongs_to_many",
            RelationType::HasOne => "has_one",
            RelationType::HasMany => "has_many",
        }
    }
}

/// How the owner key is compared with the target key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Connection {
    /// Plain equality
    #[default]
    Scalar,
    /// Membership of a scalar in an array column
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    One,
    Many,
}

/// Which record of the pair stores a key column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySide {
    Owner,
    Target,
}
