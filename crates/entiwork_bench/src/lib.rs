//! Benchmark utilities.

use entiwork_codec::Value;
use entiwork_core::{
    Config, EntityDescriptor, EntityReference, EntityStore, EntityTypeRegistry, UnitOfWorkFactory,
};
use std::sync::Arc;

/// Registry with a single `Item` type used by every benchmark.
pub fn bench_registry() -> EntityTypeRegistry {
    EntityTypeRegistry::from_descriptors([EntityDescriptor::builder("Item")
        .property("payload")
        .property_with_default("counter", 0i64)
        .many_association("links")
        .build()])
    .expect("Failed to build benchmark registry")
}

/// Builds a factory over `store` with the benchmark registry.
pub fn bench_factory(store: Arc<dyn EntityStore>) -> UnitOfWorkFactory {
    UnitOfWorkFactory::new(store, bench_registry(), Config::default())
}

/// Deterministic text payload of `size` bytes.
pub fn text_payload(size: usize) -> Value {
    Value::Text((0..size).map(|i| char::from(b'a' + (i % 26) as u8)).collect())
}

/// Generates `count` sequential references with a common prefix.
pub fn references(prefix: &str, count: usize) -> Vec<EntityReference> {
    (0..count)
        .map(|i| EntityReference::new(format!("{prefix}-{i}")))
        .collect()
}

/// Seeds `count` items in one unit of work and returns their references.
pub fn seed_items(factory: &UnitOfWorkFactory, count: usize) -> Vec<EntityReference> {
    let refs = references("seed", count);
    let mut uow = factory.new_unit_of_work();
    for reference in &refs {
        uow.new_entity("Item", Some(reference.clone()))
            .and_then(|state| state.set_property("payload", text_payload(64)))
            .expect("Failed to seed item");
    }
    uow.complete().expect("Failed to complete seeding");
    refs
}
