//! Relation definitions.
//!
//! A [`RelationDescriptor`] is the declarative description of one relation
//! of an entity. Descriptors are created through [`RelationBuilder`], which
//! fills in the naming defaults and rejects invalid combinations, so a
//! descriptor that exists is always valid.
//!
//! # Example
//!
//! ```
//! use lifeguard_arrays::relation::{RelationDescriptor, KeySide};
//!
//! // videos.tag_ids bigint[] -> tags.id
//! let tags = RelationDescriptor::belongs_to_many("videos", "tags").build().unwrap();
//! assert_eq!(tags.owner_key, "tag_ids");
//! assert_eq!(tags.target_key, "id");
//! assert_eq!(tags.array_side(), Some(KeySide::Owner));
//!
//! // videos.tag_ids, seen from the tag
//! let videos = RelationDescriptor::has_many("tags", "videos").array().build().unwrap();
//! assert_eq!(videos.target_key, "tag_ids");
//! ```

pub mod types;

pub use types::{Cardinality, Connection, KeySide, RelationType};

use crate::config::EngineConfig;
use crate::error::RelationError;
use crate::inflector::{foreign_key, pluralize, singularize};

/// Declarative description of a relation between two entities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    /// Relation name, unique per owner entity
    pub name: String,
    /// Entity declaring the relation
    pub owner_entity: String,
    /// Entity the relation points at; for a polymorphic relation the
    /// actual entity is read from `foreign_type` on each owner
    pub target_entity: String,
    pub kind: RelationType,
    pub connection: Connection,
    /// Column on the owner compared with `target_key`
    pub owner_key: String,
    /// Column on the target compared with `owner_key`
    pub target_key: String,
    /// Name of the reciprocal relation on the target entity
    pub inverse_name: Option<String>,
    pub polymorphic: bool,
    /// Owner column holding the target entity of a polymorphic relation
    pub foreign_type: Option<String>,
    /// Flush the relation whenever the owner is persisted
    pub autosave: bool,
    /// The owner fails validation when the relation is empty
    pub required: bool,
}

impl RelationDescriptor {
    pub fn belongs_to(owner: impl Into<String>, name: impl Into<String>) -> RelationBuilder {
        RelationBuilder::new(RelationType::BelongsTo, owner.into(), name.into())
    }

    /// The owner stores an array of target keys. Always array-connected.
    pub fn belongs_to_many(owner: impl Into<String>, name: impl Into<String>) -> RelationBuilder {
        RelationBuilder::new(RelationType::BelongsToMany, owner.into(), name.into()).array()
    }

    pub fn has_one(owner: impl Into<String>, name: impl Into<String>) -> RelationBuilder {
        RelationBuilder::new(RelationType::HasOne, owner.into(), name.into())
    }

    pub fn has_many(owner: impl Into<String>, name: impl Into<String>) -> RelationBuilder {
        RelationBuilder::new(RelationType::HasMany, owner.into(), name.into())
    }

    pub fn cardinality(&self) -> Cardinality {
        match self.kind {
            RelationType::BelongsTo | RelationType::HasOne => Cardinality::One,
            RelationType::BelongsToMany | RelationType::HasMany => Cardinality::Many,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.cardinality() == Cardinality::Many
    }

    pub fn is_array(&self) -> bool {
        self.connection == Connection::Array
    }

    /// Record holding the key column that links the pair
    pub fn key_side(&self) -> KeySide {
        match self.kind {
            RelationType::BelongsTo | RelationType::BelongsToMany => KeySide::Owner,
            RelationType::HasOne | RelationType::HasMany => KeySide::Target,
        }
    }

    /// Record holding the array-typed key, `None` for scalar connections
    pub fn array_side(&self) -> Option<KeySide> {
        match self.connection {
            Connection::Scalar => None,
            Connection::Array => Some(self.key_side()),
        }
    }

    /// Name of the column that stores the reference
    pub fn foreign_key_name(&self) -> &str {
        match self.key_side() {
            KeySide::Owner => &self.owner_key,
            KeySide::Target => &self.target_key,
        }
    }

    /// Name of the column the reference points at
    pub fn primary_key_name(&self) -> &str {
        match self.key_side() {
            KeySide::Owner => &self.target_key,
            KeySide::Target => &self.owner_key,
        }
    }

    /// Whether `other` joins the same two columns in the opposite direction
    pub fn is_reverse_of(&self, other: &RelationDescriptor) -> bool {
        self.owner_entity == other.target_entity
            && self.target_entity == other.owner_entity
            && self.owner_key == other.target_key
            && self.target_key == other.owner_key
    }
}

/// Builder for [`RelationDescriptor`]
///
/// Defaults follow the usual naming conventions:
///
/// - the target entity is the pluralized relation name (`tag` → `tags`)
/// - `belongs_to` keys live on the owner as `{singular name}_id`
/// - `has_one`/`has_many` keys live on the target as `{singular owner}_id`
/// - collections connected through an array pluralize the default key
///   (`tag_id` → `tag_ids`)
#[derive(Debug, Clone)]
pub struct RelationBuilder {
    kind: RelationType,
    owner: String,
    name: String,
    target: Option<String>,
    foreign_key: Option<String>,
    primary_key: Option<String>,
    inverse_of: Option<String>,
    connection: Connection,
    polymorphic: bool,
    autosave: bool,
    required: Option<bool>,
}

impl RelationBuilder {
    fn new(kind: RelationType, owner: String, name: String) -> Self {
        Self {
            kind,
            owner,
            name,
            target: None,
            foreign_key: None,
            primary_key: None,
            inverse_of: None,
            connection: Connection::Scalar,
            polymorphic: false,
            autosave: false,
            required: None,
        }
    }

    /// Target entity, when it differs from the pluralized relation name
    pub fn target(mut self, entity: impl Into<String>) -> Self {
        self.target = Some(entity.into());
        self
    }

    /// Column storing the reference
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    /// Column the reference points at (default `id`)
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    pub fn inverse_of(mut self, name: impl Into<String>) -> Self {
        self.inverse_of = Some(name.into());
        self
    }

    /// Connect through an array column instead of scalar equality
    pub fn array(mut self) -> Self {
        self.connection = Connection::Array;
        self
    }

    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }

    pub fn autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    /// Validate and build with the default configuration
    pub fn build(self) -> Result<RelationDescriptor, RelationError> {
        self.build_with(&EngineConfig::default())
    }

    /// Validate and build; `config` supplies defaults such as `required`
    ///
    /// # Errors
    ///
    /// Returns `RelationError::Configuration` when:
    /// - the relation is both array-connected and polymorphic
    /// - a `belongs_to` is array-connected (use `belongs_to_many`)
    /// - a relation other than `belongs_to` is polymorphic
    /// - a name or key column is empty
    pub fn build_with(self, config: &EngineConfig) -> Result<RelationDescriptor, RelationError> {
        let what = format!("{} {} on {}", self.kind.as_str(), self.name, self.owner);

        if self.name.is_empty() || self.owner.is_empty() {
            return Err(RelationError::Configuration(format!(
                "{what}: relation and owner names must not be empty"
            )));
        }
        if self.connection == Connection::Array && self.polymorphic {
            return Err(RelationError::Configuration(format!(
                "{what}: array-connected relations cannot be polymorphic"
            )));
        }
        if self.kind == RelationType::BelongsTo && self.connection == Connection::Array {
            return Err(RelationError::Configuration(format!(
                "{what}: belongs_to cannot be connected through an array, use belongs_to_many"
            )));
        }
        if self.polymorphic && self.kind != RelationType::BelongsTo {
            return Err(RelationError::Configuration(format!(
                "{what}: only belongs_to relations can be polymorphic"
            )));
        }

        let target_entity = self
            .target
            .unwrap_or_else(|| pluralize(&singularize(&self.name)));
        let primary_key = self.primary_key.unwrap_or_else(|| "id".to_string());
        let collection = matches!(self.kind, RelationType::HasMany | RelationType::BelongsToMany);

        let foreign_key = self.foreign_key.unwrap_or_else(|| {
            let base = match self.kind {
                RelationType::BelongsTo | RelationType::BelongsToMany => {
                    format!("{}_id", singularize(&self.name))
                }
                RelationType::HasOne | RelationType::HasMany => foreign_key(&self.owner),
            };
            if collection && self.connection == Connection::Array {
                pluralize(&base)
            } else {
                base
            }
        });

        if foreign_key.is_empty() || primary_key.is_empty() || target_entity.is_empty() {
            return Err(RelationError::Configuration(format!(
                "{what}: key columns and target entity must not be empty"
            )));
        }

        let (owner_key, target_key) = match self.kind {
            RelationType::BelongsTo | RelationType::BelongsToMany => (foreign_key, primary_key),
            RelationType::HasOne | RelationType::HasMany => (primary_key, foreign_key),
        };

        let required = self.required.unwrap_or(
            self.kind == RelationType::BelongsToMany && config.belongs_to_many_required_by_default,
        );

        Ok(RelationDescriptor {
            foreign_type: self.polymorphic.then(|| format!("{}_type", self.name)),
            name: self.name,
            owner_entity: self.owner,
            target_entity,
            kind: self.kind,
            connection: self.connection,
            owner_key,
            target_key,
            inverse_name: self.inverse_of,
            polymorphic: self.polymorphic,
            autosave: self.autosave,
            required,
        })
    }
}
