//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up entity stores, type
//! registries and unit-of-work factories.

use entiwork_core::{
    Config, EntityDescriptor, EntityReference, EntityStore, EntityTypeRegistry, UnitOfWorkFactory,
};
use entiwork_storage::{FileEntityStore, InMemoryEntityStore};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Name of the person type in [`person_registry`].
pub const PERSON: &str = "Person";

/// Name of the company type in [`person_registry`].
pub const COMPANY: &str = "Company";

/// Builds the standard test registry.
///
/// `Person` declares `name`, `age` (default `0`), `employer`, `friends`
/// and `contacts`; `Company` declares `name` and `employees`.
pub fn person_registry() -> EntityTypeRegistry {
    EntityTypeRegistry::from_descriptors([
        EntityDescriptor::builder(PERSON)
            .property("name")
            .property_with_default("age", 0i64)
            .association("employer")
            .many_association("friends")
            .named_association("contacts")
            .build(),
        EntityDescriptor::builder(COMPANY)
            .property("name")
            .many_association("employees")
            .build(),
    ])
    .expect("Failed to build person registry")
}

/// A test entity store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Arc<dyn EntityStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(InMemoryEntityStore::new()),
            _temp_dir: None,
        }
    }

    /// Creates a new file-backed test store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileEntityStore::open(temp_dir.path()).expect("Failed to open file store");

        Self {
            store: Arc::new(store),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-backed, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Builds a factory over this store with the standard registry.
    pub fn factory(&self) -> UnitOfWorkFactory {
        self.factory_with(Config::default())
    }

    /// Builds a factory over this store with a custom configuration.
    pub fn factory_with(&self, config: Config) -> UnitOfWorkFactory {
        UnitOfWorkFactory::new(Arc::clone(&self.store), person_registry(), config)
    }
}

/// Runs a test against a fresh in-memory store.
///
/// # Example
///
/// ```rust
/// use entiwork_testkit::with_memory_store;
///
/// with_memory_store(|factory| {
///     assert!(factory.new_unit_of_work().is_open());
/// });
/// ```
pub fn with_memory_store<F, R>(f: F) -> R
where
    F: FnOnce(&UnitOfWorkFactory) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.factory())
}

/// Runs a test against a fresh file-backed store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&UnitOfWorkFactory, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store.path().expect("File store should have a path");
    f(&test_store.factory(), path)
}

/// Runs a test once per reference store, in-memory first.
pub fn with_each_store<F>(mut f: F)
where
    F: FnMut(&UnitOfWorkFactory),
{
    for test_store in [TestStore::memory(), TestStore::file()] {
        f(&test_store.factory());
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates `count` people named `person-{i}` in one unit of work.
    pub fn populated_store(count: usize) -> (TestStore, Vec<EntityReference>) {
        let test_store = TestStore::memory();
        let references = seed_people(&test_store.factory(), count);
        (test_store, references)
    }

    /// Stores `count` people and returns their references in creation order.
    pub fn seed_people(factory: &UnitOfWorkFactory, count: usize) -> Vec<EntityReference> {
        let mut uow = factory.new_unit_of_work();
        let mut references = Vec::with_capacity(count);

        for i in 0..count {
            let reference = EntityReference::new(format!("person-{i}"));
            uow.new_entity(PERSON, Some(reference.clone()))
                .and_then(|state| state.set_property("name", format!("Person {i}")))
                .expect("Failed to create person");
            references.push(reference);
        }

        uow.complete().expect("Failed to seed people");
        references
    }

    /// Stores a company employing every given person.
    pub fn company_with_employees(
        factory: &UnitOfWorkFactory,
        employees: &[EntityReference],
    ) -> EntityReference {
        let mut uow = factory.new_unit_of_work();
        let company = uow
            .new_entity(COMPANY, None)
            .expect("Failed to create company");
        company
            .set_property("name", "Acme")
            .expect("Failed to name company");
        for employee in employees {
            company
                .add_many_association("employees", employee.clone())
                .expect("Failed to add employee");
        }
        let company = company.reference().clone();

        for employee in employees {
            uow.get(employee)
                .and_then(|state| state.set_association("employer", Some(company.clone())))
                .expect("Failed to set employer");
        }

        uow.complete().expect("Failed to store company");
        company
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entiwork_core::Value;

    #[test]
    fn test_memory_store_has_no_path() {
        let test_store = TestStore::memory();
        assert!(test_store.path().is_none());
        assert!(test_store.store.identities().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_survives_until_dropped() {
        let test_store = TestStore::file();
        let path = test_store.path().unwrap().to_path_buf();
        assert!(path.is_dir());
        drop(test_store);
        assert!(!path.exists());
    }

    #[test]
    fn test_populated_scenario() {
        let (test_store, references) = scenarios::populated_store(5);
        assert_eq!(references.len(), 5);

        let mut uow = test_store.factory().new_unit_of_work();
        assert_eq!(
            uow.get(&references[3]).unwrap().property("name"),
            Some(&Value::from("Person 3"))
        );
    }

    #[test]
    fn test_company_scenario_links_both_ways() {
        with_each_store(|factory| {
            let people = scenarios::seed_people(factory, 2);
            let company = scenarios::company_with_employees(factory, &people);

            let mut uow = factory.new_unit_of_work();
            assert_eq!(uow.get(&company).unwrap().many_association("employees"), &people[..]);
            assert_eq!(
                uow.get(&people[0]).unwrap().association("employer"),
                Some(&company)
            );
        });
    }
}
