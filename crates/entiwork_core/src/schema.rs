//! Runtime schema for entity types.
//!
//! An [`EntityDescriptor`] lists the state names an entity type declares,
//! and an [`EntityTypeRegistry`] resolves type names to descriptors. The
//! registry is built once at startup and shared read-only afterwards.

use crate::error::{CoreError, CoreResult};
use entiwork_codec::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// The state names an entity type declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    name: String,
    properties: BTreeMap<String, Value>,
    associations: BTreeSet<String>,
    many_associations: BTreeSet<String>,
    named_associations: BTreeSet<String>,
}

impl EntityDescriptor {
    /// Starts building a descriptor for the type `name`.
    pub fn builder(name: impl Into<String>) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder {
            descriptor: EntityDescriptor {
                name: name.into(),
                properties: BTreeMap::new(),
                associations: BTreeSet::new(),
                many_associations: BTreeSet::new(),
                named_associations: BTreeSet::new(),
            },
        }
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the type declares the property.
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Returns the default value of a declared property.
    #[must_use]
    pub fn property_default(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Iterates over declared properties and their defaults.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns true if the type declares the association.
    #[must_use]
    pub fn has_association(&self, name: &str) -> bool {
        self.associations.contains(name)
    }

    /// Returns true if the type declares the many-association.
    #[must_use]
    pub fn has_many_association(&self, name: &str) -> bool {
        self.many_associations.contains(name)
    }

    /// Returns true if the type declares the named association.
    #[must_use]
    pub fn has_named_association(&self, name: &str) -> bool {
        self.named_associations.contains(name)
    }
}

/// Builder for [`EntityDescriptor`].
#[derive(Debug, Clone)]
pub struct EntityDescriptorBuilder {
    descriptor: EntityDescriptor,
}

impl EntityDescriptorBuilder {
    /// Declares a property whose initial value is null.
    #[must_use]
    pub fn property(self, name: impl Into<String>) -> Self {
        self.property_with_default(name, Value::Null)
    }

    /// Declares a property with an initial value for new entities.
    #[must_use]
    pub fn property_with_default(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.descriptor
            .properties
            .insert(name.into(), default.into());
        self
    }

    /// Declares an association.
    #[must_use]
    pub fn association(mut self, name: impl Into<String>) -> Self {
        self.descriptor.associations.insert(name.into());
        self
    }

    /// Declares a many-association.
    #[must_use]
    pub fn many_association(mut self, name: impl Into<String>) -> Self {
        self.descriptor.many_associations.insert(name.into());
        self
    }

    /// Declares a named association.
    #[must_use]
    pub fn named_association(mut self, name: impl Into<String>) -> Self {
        self.descriptor.named_associations.insert(name.into());
        self
    }

    /// Finishes the descriptor.
    #[must_use]
    pub fn build(self) -> EntityDescriptor {
        self.descriptor
    }
}

/// Resolves entity type names to descriptors.
#[derive(Debug, Clone, Default)]
pub struct EntityTypeRegistry {
    types: HashMap<String, Arc<EntityDescriptor>>,
}

impl EntityTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from descriptors.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if two descriptors share a name.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = EntityDescriptor>,
    ) -> CoreResult<Self> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Registers a descriptor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if a type with the same name is registered.
    pub fn register(&mut self, descriptor: EntityDescriptor) -> CoreResult<()> {
        if self.types.contains_key(descriptor.name()) {
            return Err(CoreError::invalid_operation(format!(
                "entity type {} is already registered",
                descriptor.name()
            )));
        }
        self.types
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    /// Looks up a type by name.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchEntityType` if the name is not registered.
    pub fn get(&self, name: &str) -> CoreResult<Arc<EntityDescriptor>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::no_such_entity_type(name))
    }

    /// Returns true if the type is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns registered type names in ascending order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
