//! Nested units of work.
//!
//! A [`UnitOfWorkStack`] is the caller-owned context holding the active units
//! of work of one thread or task. The top of the stack is the current unit
//! of work. [`UnitOfWorkStack::run`] executes a closure under a
//! [`Propagation`] rule:
//!
//! | Rule          | Active unit of work | No active unit of work |
//! |---------------|---------------------|------------------------|
//! | `Mandatory`   | join it             | `NoActiveUnitOfWork`   |
//! | `Required`    | join it             | start a new one        |
//! | `RequiresNew` | start a new one     | start a new one        |
//!
//! A joined unit of work is left open for its owner to complete. A new one
//! is completed when the closure succeeds and discarded when it fails.

use crate::error::{CoreError, CoreResult};
use crate::factory::UnitOfWorkFactory;
use crate::retry::retry_on_conflict;
use crate::uow::UnitOfWork;
use crate::usecase::Usecase;
use tracing::debug;

/// How a unit of work relates to the one already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Propagation {
    /// Join the active unit of work; fail if there is none.
    Mandatory,
    /// Join the active unit of work, or start one if there is none.
    Required,
    /// Always start a fresh unit of work.
    RequiresNew,
}

/// The active units of work of one thread or task.
#[derive(Debug)]
pub struct UnitOfWorkStack {
    factory: UnitOfWorkFactory,
    stack: Vec<UnitOfWork>,
}

impl UnitOfWorkStack {
    /// Creates an empty stack that starts units of work from `factory`.
    #[must_use]
    pub fn new(factory: UnitOfWorkFactory) -> Self {
        Self {
            factory,
            stack: Vec::new(),
        }
    }

    /// Returns the factory.
    #[must_use]
    pub fn factory(&self) -> &UnitOfWorkFactory {
        &self.factory
    }

    /// Returns the current unit of work.
    ///
    /// # Errors
    ///
    /// `NoActiveUnitOfWork` if the stack is empty.
    pub fn current(&mut self) -> CoreResult<&mut UnitOfWork> {
        self.stack.last_mut().ok_or(CoreError::NoActiveUnitOfWork)
    }

    /// Returns true if a unit of work is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Returns the number of active units of work.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Starts a unit of work and makes it current.
    pub fn begin(&mut self, usecase: Usecase) -> &mut UnitOfWork {
        let uow = self.factory.new_unit_of_work_for(usecase);
        self.push(uow);
        let depth = self.stack.len();
        &mut self.stack[depth - 1]
    }

    /// Makes `uow` current.
    pub fn push(&mut self, uow: UnitOfWork) {
        debug!(unit_of_work = %uow.id(), depth = self.stack.len() + 1, "unit of work pushed");
        self.stack.push(uow);
    }

    /// Removes the current unit of work and returns it.
    ///
    /// # Errors
    ///
    /// `NoActiveUnitOfWork` if the stack is empty.
    pub fn pop(&mut self) -> CoreResult<UnitOfWork> {
        self.stack.pop().ok_or(CoreError::NoActiveUnitOfWork)
    }

    /// Completes the current unit of work and removes it.
    ///
    /// # Errors
    ///
    /// `NoActiveUnitOfWork` if the stack is empty, or the completion error.
    pub fn complete_current(&mut self) -> CoreResult<()> {
        self.pop()?.complete()
    }

    /// Discards the current unit of work and removes it.
    ///
    /// # Errors
    ///
    /// `NoActiveUnitOfWork` if the stack is empty.
    pub fn discard_current(&mut self) -> CoreResult<()> {
        self.pop()?.discard();
        Ok(())
    }

    /// Pauses the current unit of work and removes it from the stack.
    ///
    /// The previous unit of work becomes current. Hand the returned one to
    /// [`resume`](Self::resume) to continue it.
    ///
    /// # Errors
    ///
    /// `NoActiveUnitOfWork` if the stack is empty, or `IllegalUnitOfWorkState`
    /// if it cannot be paused (it then stays current).
    pub fn pause(&mut self) -> CoreResult<UnitOfWork> {
        self.current()?.pause()?;
        self.pop()
    }

    /// Resumes a paused unit of work and makes it current.
    ///
    /// # Errors
    ///
    /// `IllegalUnitOfWorkState` if `uow` is not paused. It is returned to the
    /// caller's scope and dropped, which discards it.
    pub fn resume(&mut self, mut uow: UnitOfWork) -> CoreResult<()> {
        uow.resume()?;
        self.push(uow);
        Ok(())
    }

    /// Runs `f` under `propagation`.
    ///
    /// Units of work `f` leaves on the stack above the one it ran in are
    /// discarded, and the previously current unit of work is current again
    /// afterwards.
    ///
    /// # Errors
    ///
    /// - `NoActiveUnitOfWork` for `Mandatory` without an active unit of work
    /// - the error returned by `f`
    /// - the completion error of a newly started unit of work
    pub fn run<T, F>(&mut self, propagation: Propagation, usecase: Usecase, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Self) -> CoreResult<T>,
    {
        match propagation {
            Propagation::Mandatory if !self.is_active() => Err(CoreError::NoActiveUnitOfWork),
            Propagation::Mandatory | Propagation::Required if self.is_active() => self.join(f),
            _ => self.run_new(usecase, f),
        }
    }

    /// Runs `f` in fresh units of work until it does not end in a conflict.
    ///
    /// Each attempt is a `RequiresNew` run; attempts and back-off follow the
    /// factory's retry policy.
    ///
    /// # Errors
    ///
    /// The first non-conflict error, or the last conflict.
    pub fn run_with_retry<T, F>(&mut self, usecase: Usecase, mut f: F) -> CoreResult<T>
    where
        F: FnMut(&mut Self) -> CoreResult<T>,
    {
        let policy = self.factory.config().retry;
        retry_on_conflict(&policy, || {
            self.run(Propagation::RequiresNew, usecase.clone(), &mut f)
        })
    }

    fn join<T, F>(&mut self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Self) -> CoreResult<T>,
    {
        let depth = self.depth();
        let result = f(self);
        self.unwind_to(depth);
        result
    }

    fn run_new<T, F>(&mut self, usecase: Usecase, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Self) -> CoreResult<T>,
    {
        let base = self.depth();
        let own_id = self.begin(usecase).id();
        let result = f(self);
        self.unwind_to(base + 1);

        // `f` may already have resolved its own unit of work, and may have
        // started another in its place.
        let popped = if self.depth() == base + 1 {
            self.stack.pop()
        } else {
            None
        };
        let own = match popped {
            Some(uow) if uow.id() == own_id => Some(uow),
            Some(mut other) => {
                debug!(unit_of_work = %other.id(), "discarding unit of work left on stack");
                other.discard();
                None
            }
            None => None,
        };
        match (result, own) {
            (Ok(value), Some(mut uow)) => {
                if uow.is_open() {
                    uow.complete()?;
                }
                Ok(value)
            }
            (Err(e), Some(mut uow)) => {
                uow.discard();
                Err(e)
            }
            (result, None) => result,
        }
    }

    fn unwind_to(&mut self, depth: usize) {
        while self.stack.len() > depth {
            if let Some(mut leftover) = self.stack.pop() {
                debug!(unit_of_work = %leftover.id(), "discarding unit of work left on stack");
                leftover.discard();
            }
        }
    }
}

impl Drop for UnitOfWorkStack {
    fn drop(&mut self) {
        self.unwind_to(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::reference::EntityReference;
    use crate::schema::{EntityDescriptor, EntityTypeRegistry};
    use crate::types::UnitOfWorkState;
    use entiwork_codec::Value;
    use entiwork_storage::{EntityStore, InMemoryEntityStore};
    use std::sync::Arc;

    fn stack() -> (Arc<InMemoryEntityStore>, UnitOfWorkStack) {
        let store = Arc::new(InMemoryEntityStore::new());
        let registry = EntityTypeRegistry::from_descriptors([EntityDescriptor::builder("Person")
            .property("name")
            .build()])
        .unwrap();
        let factory = UnitOfWorkFactory::new(
            Arc::clone(&store) as Arc<dyn EntityStore>,
            registry,
            Config::default(),
        );
        (store, UnitOfWorkStack::new(factory))
    }

    #[test]
    fn empty_stack_has_no_current() {
        let (_, mut stack) = stack();
        assert!(!stack.is_active());
        assert!(matches!(stack.current(), Err(CoreError::NoActiveUnitOfWork)));
        assert!(matches!(stack.pop(), Err(CoreError::NoActiveUnitOfWork)));
    }

    #[test]
    fn mandatory_requires_active() {
        let (_, mut stack) = stack();
        let result = stack.run(Propagation::Mandatory, Usecase::default(), |_| Ok(()));
        assert!(matches!(result, Err(CoreError::NoActiveUnitOfWork)));
    }

    #[test]
    fn mandatory_joins_without_completing() {
        let (store, mut stack) = stack();
        let outer = stack.begin(Usecase::new("outer")).id();

        stack
            .run(Propagation::Mandatory, Usecase::default(), |s| {
                let current = s.current()?;
                assert_eq!(current.id(), outer);
                current.new_entity("Person", Some("p1".into()))?;
                Ok(())
            })
            .unwrap();

        assert_eq!(stack.depth(), 1);
        assert!(store.is_empty());
        stack.complete_current().unwrap();
        assert!(store.contains("p1").unwrap());
    }

    #[test]
    fn required_starts_one_when_empty() {
        let (store, mut stack) = stack();
        stack
            .run(Propagation::Required, Usecase::default(), |s| {
                s.current()?.new_entity("Person", Some("p1".into()))?;
                Ok(())
            })
            .unwrap();
        assert!(!stack.is_active());
        assert!(store.contains("p1").unwrap());
    }

    #[test]
    fn requires_new_restores_previous() {
        let (store, mut stack) = stack();
        let outer = stack.begin(Usecase::new("outer")).id();

        let inner = stack
            .run(Propagation::RequiresNew, Usecase::new("inner"), |s| {
                let current = s.current()?;
                assert_eq!(current.usecase().name(), "inner");
                current.new_entity("Person", Some("p1".into()))?;
                Ok(current.id())
            })
            .unwrap();

        assert_ne!(inner, outer);
        assert_eq!(stack.current().unwrap().id(), outer);
        // The inner unit of work committed on its own.
        assert!(store.contains("p1").unwrap());
    }

    #[test]
    fn requires_new_discards_on_error() {
        let (store, mut stack) = stack();
        let outer = stack.begin(Usecase::new("outer")).id();

        let result: CoreResult<()> = stack.run(Propagation::RequiresNew, Usecase::default(), |s| {
            s.current()?.new_entity("Person", Some("p1".into()))?;
            Err(CoreError::invalid_operation("boom"))
        });

        assert!(result.is_err());
        assert!(store.is_empty());
        assert_eq!(stack.current().unwrap().id(), outer);
    }

    #[test]
    fn leftover_units_of_work_are_discarded() {
        let (store, mut stack) = stack();
        stack
            .run(Propagation::RequiresNew, Usecase::default(), |s| {
                s.begin(Usecase::new("forgotten"))
                    .new_entity("Person", Some("lost".into()))?;
                Ok(())
            })
            .unwrap();
        assert!(!stack.is_active());
        assert!(!store.contains("lost").unwrap());
    }

    #[test]
    fn replacement_started_after_own_completion_is_discarded() {
        let (store, mut stack) = stack();
        stack
            .run(Propagation::RequiresNew, Usecase::default(), |s| {
                s.current()?.new_entity("Person", Some("kept".into()))?;
                s.complete_current()?;
                s.begin(Usecase::new("replacement"))
                    .new_entity("Person", Some("stray".into()))?;
                Ok(())
            })
            .unwrap();
        assert!(!stack.is_active());
        assert!(store.contains("kept").unwrap());
        assert!(!store.contains("stray").unwrap());
    }

    #[test]
    fn resolving_own_unit_of_work_leaves_outer_current() {
        let (_, mut stack) = stack();
        let outer = stack.begin(Usecase::new("outer")).id();
        stack
            .run(Propagation::RequiresNew, Usecase::new("inner"), |s| {
                s.complete_current()?;
                Ok(())
            })
            .unwrap();
        assert_eq!(stack.current().unwrap().id(), outer);
        assert!(stack.current().unwrap().is_open());
    }

    #[test]
    fn pause_and_resume_move_off_and_onto_stack() {
        let (_, mut stack) = stack();
        let outer = stack.begin(Usecase::new("outer")).id();
        let inner = stack.begin(Usecase::new("inner")).id();

        let paused = stack.pause().unwrap();
        assert_eq!(paused.id(), inner);
        assert!(paused.is_paused());
        assert_eq!(stack.current().unwrap().id(), outer);

        stack.resume(paused).unwrap();
        assert_eq!(stack.current().unwrap().id(), inner);
        assert!(!stack.current().unwrap().is_paused());
    }

    #[test]
    fn resume_of_running_unit_of_work_fails() {
        let (_, mut stack) = stack();
        let uow = stack.factory().new_unit_of_work();
        assert!(matches!(
            stack.resume(uow),
            Err(CoreError::IllegalUnitOfWorkState { .. })
        ));
        assert!(!stack.is_active());
    }

    #[test]
    fn run_with_retry_recovers_from_conflict() {
        let (_, mut stack) = stack();
        let reference = EntityReference::new("p1");
        stack
            .run(Propagation::RequiresNew, Usecase::default(), |s| {
                s.current()?
                    .new_entity("Person", Some(reference.clone()))?
                    .set_property("name", 0i64)
            })
            .unwrap();

        let factory = stack.factory().clone();
        let mut attempts = 0;
        stack
            .run_with_retry(Usecase::new("increment"), |s| {
                attempts += 1;
                let uow = s.current()?;
                let value = uow.get(&reference)?.property("name").and_then(Value::as_integer).unwrap_or(0);
                if attempts == 1 {
                    // A competing writer commits between our read and our write.
                    let mut rival = factory.new_unit_of_work();
                    rival.get(&reference)?.set_property("name", 100i64)?;
                    rival.complete()?;
                }
                s.current()?.get(&reference)?.set_property("name", value + 1)
            })
            .unwrap();

        assert_eq!(attempts, 2);
        let mut check = stack.factory().new_unit_of_work();
        assert_eq!(
            check.get(&reference).unwrap().property("name"),
            Some(&Value::Integer(101))
        );
    }

    #[test]
    fn dropping_stack_discards_everything() {
        let (store, mut stack) = stack();
        stack.begin(Usecase::default()).new_entity("Person", None).unwrap();
        assert_eq!(stack.current().unwrap().state(), UnitOfWorkState::Open);
        drop(stack);
        assert!(store.is_empty());
    }
}
