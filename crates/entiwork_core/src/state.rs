//! Versioned, mutable entity state.

use crate::error::{CoreError, CoreResult};
use crate::reference::EntityReference;
use crate::schema::EntityDescriptor;
use crate::types::Timestamp;
use entiwork_codec::{EntityRecord, Value};
use entiwork_storage::Version;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Status of an entity within one unit of work.
///
/// Transitions are monotonic: `Loaded` becomes `Updated` on the first
/// effective mutation, and any status may become `Removed`. A `New` entity
/// never becomes `Loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityStatus {
    /// Created in this unit of work; not yet stored.
    New,
    /// Loaded from the store and not modified.
    Loaded,
    /// Loaded from the store and modified.
    Updated,
    /// Marked for removal.
    Removed,
}

impl EntityStatus {
    /// Returns true if completing would write this entity.
    #[must_use]
    pub const fn is_changed(self) -> bool {
        !matches!(self, Self::Loaded)
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Loaded => "loaded",
            Self::Updated => "updated",
            Self::Removed => "removed",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy)]
enum StateKind {
    Property,
    Association,
    ManyAssociation,
    NamedAssociation,
}

impl StateKind {
    const fn label(self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Association => "association",
            Self::ManyAssociation => "many-association",
            Self::NamedAssociation => "named association",
        }
    }

    fn declared(self, descriptor: &EntityDescriptor, name: &str) -> bool {
        match self {
            Self::Property => descriptor.has_property(name),
            Self::Association => descriptor.has_association(name),
            Self::ManyAssociation => descriptor.has_many_association(name),
            Self::NamedAssociation => descriptor.has_named_association(name),
        }
    }
}

/// One entity's state as seen by one unit of work.
///
/// All reads and writes of entity data go through typed accessors on this
/// type. Writing a value equal to the current one is not a mutation and
/// leaves the status untouched.
#[derive(Debug, Clone)]
pub struct EntityState {
    reference: EntityReference,
    descriptor: Arc<EntityDescriptor>,
    version: Option<Version>,
    last_modified: Timestamp,
    status: EntityStatus,
    validate_names: bool,
    properties: BTreeMap<String, Value>,
    associations: BTreeMap<String, EntityReference>,
    many_associations: BTreeMap<String, Vec<EntityReference>>,
    named_associations: BTreeMap<String, Vec<(String, EntityReference)>>,
    undeclared: Undeclared,
}

/// Stored state the descriptor does not declare, kept in encoded form.
#[derive(Debug, Clone, Default)]
struct Undeclared {
    properties: BTreeMap<String, Value>,
    associations: BTreeMap<String, String>,
    many_associations: BTreeMap<String, Vec<String>>,
    named_associations: BTreeMap<String, Vec<(String, String)>>,
}

impl EntityState {
    /// Creates the state of a new entity with the type's property defaults.
    pub(crate) fn new_entity(
        reference: EntityReference,
        descriptor: Arc<EntityDescriptor>,
        current_time: Timestamp,
        validate_names: bool,
    ) -> Self {
        let properties = descriptor
            .properties()
            .map(|(name, default)| (name.to_string(), default.clone()))
            .collect();
        Self {
            reference,
            descriptor,
            version: None,
            last_modified: current_time,
            status: EntityStatus::New,
            validate_names,
            properties,
            associations: BTreeMap::new(),
            many_associations: BTreeMap::new(),
            named_associations: BTreeMap::new(),
            undeclared: Undeclared::default(),
        }
    }

    /// Rebuilds the state of a stored entity.
    ///
    /// With name validation on, names the type does not declare are hidden
    /// from the accessors but kept, and written back unchanged by
    /// [`to_record`](Self::to_record).
    pub(crate) fn loaded(
        reference: EntityReference,
        descriptor: Arc<EntityDescriptor>,
        version: Version,
        record: EntityRecord,
        validate_names: bool,
    ) -> Self {
        let keep = |kind: StateKind, name: &str| {
            let declared = !validate_names || kind.declared(&descriptor, name);
            if !declared {
                debug!(entity = %reference, kind = kind.label(), state_name = name, "hiding undeclared stored state");
            }
            declared
        };

        let mut undeclared = Undeclared::default();
        let (properties, hidden) = record
            .properties
            .into_iter()
            .partition(|(name, _)| keep(StateKind::Property, name));
        undeclared.properties = hidden;
        let (associations, hidden): (BTreeMap<_, _>, _) = record
            .associations
            .into_iter()
            .partition(|(name, _)| keep(StateKind::Association, name));
        undeclared.associations = hidden;
        let (many_associations, hidden): (BTreeMap<_, _>, _) = record
            .many_associations
            .into_iter()
            .partition(|(name, _)| keep(StateKind::ManyAssociation, name));
        undeclared.many_associations = hidden;
        let (named_associations, hidden): (BTreeMap<_, _>, _) = record
            .named_associations
            .into_iter()
            .partition(|(name, _)| keep(StateKind::NamedAssociation, name));
        undeclared.named_associations = hidden;

        Self {
            reference,
            descriptor,
            version: Some(version),
            last_modified: Timestamp::from_millis(record.last_modified),
            status: EntityStatus::Loaded,
            validate_names,
            properties,
            associations: associations
                .into_iter()
                .map(|(name, target)| (name, EntityReference::from(target)))
                .collect(),
            many_associations: many_associations
                .into_iter()
                .map(|(name, targets)| {
                    (name, targets.into_iter().map(EntityReference::from).collect())
                })
                .collect(),
            named_associations: named_associations
                .into_iter()
                .map(|(name, entries)| {
                    let entries = entries
                        .into_iter()
                        .map(|(key, target)| (key, EntityReference::from(target)))
                        .collect();
                    (name, entries)
                })
                .collect(),
            undeclared,
        }
    }

    /// Returns the entity's reference.
    #[must_use]
    pub fn reference(&self) -> &EntityReference {
        &self.reference
    }

    /// Returns the entity's type name.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        self.descriptor.name()
    }

    /// Returns the entity's type descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    /// Returns the stored version this state was loaded at, or `None` for
    /// new entities.
    #[must_use]
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// Returns the last-modified time.
    #[must_use]
    pub fn last_modified(&self) -> Timestamp {
        self.last_modified
    }

    /// Returns the status within this unit of work.
    #[must_use]
    pub fn status(&self) -> EntityStatus {
        self.status
    }

    /// Returns a property value, or `None` if it was never set.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Iterates over all property values.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Sets a property.
    ///
    /// # Errors
    ///
    /// - `UnknownStateName` if the type does not declare the property
    /// - `InvalidOperation` if the entity is removed
    pub fn set_property(&mut self, name: &str, value: impl Into<Value>) -> CoreResult<()> {
        self.check_writable(StateKind::Property, name)?;
        let value = value.into();
        if self.properties.get(name) != Some(&value) {
            self.properties.insert(name.to_string(), value);
            self.mark_updated();
        }
        Ok(())
    }

    /// Returns an association target.
    #[must_use]
    pub fn association(&self, name: &str) -> Option<&EntityReference> {
        self.associations.get(name)
    }

    /// Sets or clears an association.
    ///
    /// # Errors
    ///
    /// - `UnknownStateName` if the type does not declare the association
    /// - `InvalidOperation` if the entity is removed
    pub fn set_association(
        &mut self,
        name: &str,
        target: Option<EntityReference>,
    ) -> CoreResult<()> {
        self.check_writable(StateKind::Association, name)?;
        if self.associations.get(name) == target.as_ref() {
            return Ok(());
        }
        match target {
            Some(target) => {
                self.associations.insert(name.to_string(), target);
            }
            None => {
                self.associations.remove(name);
            }
        }
        self.mark_updated();
        Ok(())
    }

    /// Returns the targets of a many-association in order.
    #[must_use]
    pub fn many_association(&self, name: &str) -> &[EntityReference] {
        self.many_associations
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Appends a target to a many-association.
    ///
    /// Returns false without changing anything if the target is already
    /// present.
    ///
    /// # Errors
    ///
    /// - `UnknownStateName` if the type does not declare the many-association
    /// - `InvalidOperation` if the entity is removed
    pub fn add_many_association(&mut self, name: &str, target: EntityReference) -> CoreResult<bool> {
        self.check_writable(StateKind::ManyAssociation, name)?;
        let targets = self.many_associations.entry(name.to_string()).or_default();
        if targets.contains(&target) {
            return Ok(false);
        }
        targets.push(target);
        self.mark_updated();
        Ok(true)
    }

    /// Removes a target from a many-association.
    ///
    /// Returns false if the target was not present.
    ///
    /// # Errors
    ///
    /// - `UnknownStateName` if the type does not declare the many-association
    /// - `InvalidOperation` if the entity is removed
    pub fn remove_many_association(
        &mut self,
        name: &str,
        target: &EntityReference,
    ) -> CoreResult<bool> {
        self.check_writable(StateKind::ManyAssociation, name)?;
        let Some(targets) = self.many_associations.get_mut(name) else {
            return Ok(false);
        };
        let Some(index) = targets.iter().position(|t| t == target) else {
            return Ok(false);
        };
        targets.remove(index);
        self.mark_updated();
        Ok(true)
    }

    /// Returns the target stored under `key` in a named association.
    #[must_use]
    pub fn named_association(&self, name: &str, key: &str) -> Option<&EntityReference> {
        self.named_associations
            .get(name)?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, target)| target)
    }

    /// Iterates over a named association's entries in insertion order.
    pub fn named_association_entries(
        &self,
        name: &str,
    ) -> impl Iterator<Item = (&str, &EntityReference)> {
        self.named_associations
            .get(name)
            .into_iter()
            .flatten()
            .map(|(key, target)| (key.as_str(), target))
    }

    /// Stores `target` under `key` in a named association.
    ///
    /// Replacing an existing key keeps its position. Returns false if the key
    /// already pointed at `target`.
    ///
    /// # Errors
    ///
    /// - `UnknownStateName` if the type does not declare the named association
    /// - `InvalidOperation` if the entity is removed
    pub fn put_named_association(
        &mut self,
        name: &str,
        key: &str,
        target: EntityReference,
    ) -> CoreResult<bool> {
        self.check_writable(StateKind::NamedAssociation, name)?;
        let entries = self.named_associations.entry(name.to_string()).or_default();
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) if *existing == target => return Ok(false),
            Some((_, existing)) => *existing = target,
            None => entries.push((key.to_string(), target)),
        }
        self.mark_updated();
        Ok(true)
    }

    /// Removes `key` from a named association.
    ///
    /// Returns false if the key was not present.
    ///
    /// # Errors
    ///
    /// - `UnknownStateName` if the type does not declare the named association
    /// - `InvalidOperation` if the entity is removed
    pub fn remove_named_association(&mut self, name: &str, key: &str) -> CoreResult<bool> {
        self.check_writable(StateKind::NamedAssociation, name)?;
        let Some(entries) = self.named_associations.get_mut(name) else {
            return Ok(false);
        };
        let Some(index) = entries.iter().position(|(k, _)| k == key) else {
            return Ok(false);
        };
        entries.remove(index);
        self.mark_updated();
        Ok(true)
    }

    /// Converts this state into its storable form.
    ///
    /// Undeclared names read from the store are carried through untouched.
    #[must_use]
    pub fn to_record(&self) -> EntityRecord {
        let mut properties = self.undeclared.properties.clone();
        properties.extend(self.properties.clone());

        let mut associations = self.undeclared.associations.clone();
        associations.extend(
            self.associations
                .iter()
                .map(|(name, target)| (name.clone(), target.as_str().to_string())),
        );

        let mut many_associations = self.undeclared.many_associations.clone();
        many_associations.extend(self.many_associations.iter().map(|(name, targets)| {
            let targets = targets.iter().map(|t| t.as_str().to_string()).collect();
            (name.clone(), targets)
        }));

        let mut named_associations = self.undeclared.named_associations.clone();
        named_associations.extend(self.named_associations.iter().map(|(name, entries)| {
            let entries = entries
                .iter()
                .map(|(key, target)| (key.clone(), target.as_str().to_string()))
                .collect();
            (name.clone(), entries)
        }));

        EntityRecord {
            identity: self.reference.as_str().to_string(),
            entity_type: self.entity_type().to_string(),
            last_modified: self.last_modified.as_millis(),
            properties,
            associations,
            many_associations,
            named_associations,
        }
    }

    pub(crate) fn mark_removed(&mut self) {
        self.status = EntityStatus::Removed;
    }

    pub(crate) fn stamp(&mut self, current_time: Timestamp) {
        self.last_modified = current_time;
    }

    fn mark_updated(&mut self) {
        if self.status == EntityStatus::Loaded {
            self.status = EntityStatus::Updated;
        }
    }

    fn check_writable(&self, kind: StateKind, name: &str) -> CoreResult<()> {
        if self.status == EntityStatus::Removed {
            return Err(CoreError::invalid_operation(format!(
                "entity {} is removed",
                self.reference
            )));
        }
        if self.validate_names && !kind.declared(&self.descriptor, name) {
            return Err(CoreError::UnknownStateName {
                entity_type: self.entity_type().to_string(),
                kind: kind.label(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}
