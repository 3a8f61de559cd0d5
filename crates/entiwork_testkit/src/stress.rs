//! Stress helpers for concurrent units of work.
//!
//! These run many units of work against one store and count how often
//! optimistic concurrency forced a retry.

use crate::fixtures::PERSON;
use entiwork_core::{
    CoreError, CoreResult, EntityReference, UnitOfWorkFactory, UnitOfWorkStack, Usecase, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Operations that eventually completed.
    pub successful_ops: usize,
    /// Operations that gave up.
    pub failed_ops: usize,
    /// Attempts that ended in a concurrent modification.
    pub conflicts: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, conflicts: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            conflicts,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Conflicts: {}", self.conflicts);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Operations performed by each thread.
    pub operations_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            operations_per_thread: 25,
        }
    }
}

/// Name of the counter property incremented by [`stress_conflicting_increments`].
pub const COUNTER_PROPERTY: &str = "age";

/// Increments one shared counter from many threads.
///
/// Every increment is a read-modify-write in its own unit of work, retried
/// on conflict according to the factory's retry policy. Returns the
/// counter's reference along with the result; the stored counter equals
/// `successful_ops` when no update was lost.
pub fn stress_conflicting_increments(
    factory: &UnitOfWorkFactory,
    config: &StressConfig,
) -> (EntityReference, StressTestResult) {
    let counter = EntityReference::new("stress-counter");
    let mut setup = factory.new_unit_of_work();
    setup
        .new_entity(PERSON, Some(counter.clone()))
        .expect("Failed to create counter");
    setup.complete().expect("Failed to store counter");

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let factory = factory.clone();
            let counter = counter.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let conflicts = Arc::clone(&conflicts);
            let operations = config.operations_per_thread;

            thread::spawn(move || {
                let mut stack = UnitOfWorkStack::new(factory);
                for _ in 0..operations {
                    let mut attempts = 0usize;
                    let result = stack.run_with_retry(Usecase::new(format!("increment-{t}")), |s| {
                        attempts += 1;
                        increment(s, &counter)
                    });

                    match result {
                        Ok(()) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                            conflicts.fetch_add(attempts - 1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            let lost = if e.is_conflict() { attempts } else { attempts - 1 };
                            conflicts.fetch_add(lost, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Stress thread panicked");
    }

    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        conflicts.load(Ordering::Relaxed),
        start.elapsed(),
    );
    (counter, result)
}

/// Reads the counter's current value in a fresh unit of work.
pub fn read_counter(factory: &UnitOfWorkFactory, counter: &EntityReference) -> CoreResult<i64> {
    let mut uow = factory.new_unit_of_work();
    let value = uow
        .get(counter)?
        .property(COUNTER_PROPERTY)
        .and_then(Value::as_integer)
        .unwrap_or(0);
    uow.discard();
    Ok(value)
}

/// Creates entities sequentially, one unit of work each.
pub fn stress_sequential_creates(
    factory: &UnitOfWorkFactory,
    config: &StressConfig,
) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for _ in 0..config.operations_per_thread * config.threads {
        let mut uow = factory.new_unit_of_work();
        let outcome = match uow.new_entity(PERSON, None) {
            Ok(_) => uow.complete(),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, 0, start.elapsed())
}

fn increment(stack: &mut UnitOfWorkStack, counter: &EntityReference) -> CoreResult<()> {
    let state = stack.current()?.get(counter)?;
    let current = state
        .property(COUNTER_PROPERTY)
        .and_then(Value::as_integer)
        .ok_or_else(|| CoreError::invalid_operation("counter is not an integer"))?;
    state.set_property(COUNTER_PROPERTY, current + 1)
}
