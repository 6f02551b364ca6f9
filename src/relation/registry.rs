//! Registry of relation descriptors per entity.
//!
//! The registry answers two questions for the resolver and the mutation
//! coordinator: which descriptor an `(entity, name)` pair refers to, and
//! which relation on the target entity is the inverse of a given one.

use super::def::RelationDescriptor;
use crate::config::EngineConfig;
use crate::error::RelationError;
use crate::inflector::{pluralize, singularize, underscore};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct RelationRegistry {
    relations: HashMap<String, Vec<RelationDescriptor>>,
    automatic_inverse: bool,
}

impl Default for RelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            relations: HashMap::new(),
            automatic_inverse: config.automatic_inverse,
        }
    }

    /// Register a descriptor under its owner entity
    ///
    /// # Errors
    ///
    /// Returns `RelationError::Configuration` if the owner entity already has
    /// a relation with the same name.
    pub fn register(&mut self, descriptor: RelationDescriptor) -> Result<(), RelationError> {
        let relations = self.relations.entry(descriptor.owner_entity.clone()).or_default();
        if relations.iter().any(|existing| existing.name == descriptor.name) {
            return Err(RelationError::Configuration(format!(
                "relation {} is already defined on {}",
                descriptor.name, descriptor.owner_entity
            )));
        }
        log::debug!(
            "registered {} {} on {}",
            descriptor.kind.as_str(),
            descriptor.name,
            descriptor.owner_entity
        );
        relations.push(descriptor);
        Ok(())
    }

    pub fn get(&self, entity: &str, name: &str) -> Option<&RelationDescriptor> {
        self.relations
            .get(entity)?
            .iter()
            .find(|descriptor| descriptor.name == name)
    }

    /// Like [`get`](Self::get), failing with `UnknownRelation`
    pub fn lookup(&self, entity: &str, name: &str) -> Result<&RelationDescriptor, RelationError> {
        self.get(entity, name).ok_or_else(|| RelationError::UnknownRelation {
            entity: entity.to_string(),
            name: name.to_string(),
        })
    }

    /// Relations of `entity` in registration order
    pub fn relations_of(&self, entity: &str) -> &[RelationDescriptor] {
        self.relations.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Inverse of `descriptor` on its declared target entity
    pub fn inverse_of(&self, descriptor: &RelationDescriptor) -> Option<&RelationDescriptor> {
        self.inverse_on(descriptor, &descriptor.target_entity)
    }

    /// Inverse of `descriptor` on `target_entity`
    ///
    /// An explicit `inverse_of` name always wins. Otherwise, when automatic
    /// inverses are enabled, the candidates are the plural and then the
    /// singular form of the owner entity; a candidate is accepted only if it
    /// joins the same columns in the opposite direction. Polymorphic relations
    /// never get an automatic inverse.
    pub fn inverse_on(
        &self,
        descriptor: &RelationDescriptor,
        target_entity: &str,
    ) -> Option<&RelationDescriptor> {
        if let Some(name) = &descriptor.inverse_name {
            return self.get(target_entity, name);
        }
        if !self.automatic_inverse || descriptor.polymorphic {
            return None;
        }

        let singular = singularize(&underscore(&descriptor.owner_entity));
        [pluralize(&singular), singular]
            .iter()
            .filter_map(|candidate| self.get(target_entity, candidate))
            .find(|candidate| candidate.is_reverse_of(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_tag_registry(config: &EngineConfig) -> RelationRegistry {
        let mut registry = RelationRegistry::with_config(config);
        registry
            .register(RelationDescriptor::belongs_to_many("videos", "tags").build().unwrap())
            .unwrap();
        registry
            .register(RelationDescriptor::has_many("tags", "videos").array().build().unwrap())
            .unwrap();
        registry
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = RelationRegistry::new();
        let desc = RelationDescriptor::has_many("videos", "comments").build().unwrap();
        registry.register(desc.clone()).unwrap();
        assert!(matches!(registry.register(desc), Err(RelationError::Configuration(_))));
    }

    #[test]
    fn test_lookup_unknown_relation() {
        let registry = RelationRegistry::new();
        assert!(matches!(
            registry.lookup("videos", "tags"),
            Err(RelationError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_automatic_inverse() {
        let registry = video_tag_registry(&EngineConfig::default());
        let tags = registry.get("videos", "tags").unwrap();
        assert_eq!(registry.inverse_of(tags).map(|d| d.name.as_str()), Some("videos"));

        let videos = registry.get("tags", "videos").unwrap();
        assert_eq!(registry.inverse_of(videos).map(|d| d.name.as_str()), Some("tags"));
    }

    #[test]
    fn test_automatic_inverse_can_be_disabled() {
        let config = EngineConfig {
            automatic_inverse: false,
            ..EngineConfig::default()
        };
        let registry = video_tag_registry(&config);
        let tags = registry.get("videos", "tags").unwrap();
        assert!(registry.inverse_of(tags).is_none());
    }

    #[test]
    fn test_automatic_inverse_requires_reversed_keys() {
        let mut registry = RelationRegistry::new();
        registry
            .register(RelationDescriptor::belongs_to_many("videos", "tags").build().unwrap())
            .unwrap();
        registry
            .register(
                RelationDescriptor::has_many("tags", "videos")
                    .array()
                    .foreign_key("featured_tag_ids")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let tags = registry.get("videos", "tags").unwrap();
        assert!(registry.inverse_of(tags).is_none());
    }

    #[test]
    fn test_singular_inverse_candidate() {
        let mut registry = RelationRegistry::new();
        registry
            .register(RelationDescriptor::has_one("videos", "thumbnail").build().unwrap())
            .unwrap();
        registry
            .register(RelationDescriptor::belongs_to("thumbnails", "video").build().unwrap())
            .unwrap();
        let thumbnail = registry.get("videos", "thumbnail").unwrap();
        assert_eq!(registry.inverse_of(thumbnail).map(|d| d.name.as_str()), Some("video"));
    }

    #[test]
    fn test_explicit_inverse_wins() {
        let mut registry = RelationRegistry::new();
        registry
            .register(
                RelationDescriptor::belongs_to_many("videos", "tags")
                    .inverse_of("clips")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                RelationDescriptor::has_many("tags", "clips")
                    .target("videos")
                    .array()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let tags = registry.get("videos", "tags").unwrap();
        assert_eq!(registry.inverse_of(tags).map(|d| d.name.as_str()), Some("clips"));
    }
}
