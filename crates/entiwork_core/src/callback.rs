//! Hooks around unit-of-work completion.

use crate::error::CoreResult;
use crate::uow::UnitOfWork;

/// How a unit of work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStatus {
    /// `complete()` succeeded.
    Completed,
    /// The unit of work was discarded or its completion failed.
    Discarded,
}

/// Observer of one unit of work's completion.
///
/// `before_completion` runs after changes have been validated and before
/// they are committed; an error aborts the completion. `after_completion`
/// runs once the outcome is known and cannot fail it.
pub trait UnitOfWorkCallback: Send {
    /// Called before committing. Returning an error cancels the commit.
    ///
    /// # Errors
    ///
    /// Any error aborts completion with `CompletionFailed`.
    fn before_completion(&mut self, _uow: &UnitOfWork) -> CoreResult<()> {
        Ok(())
    }

    /// Called after the unit of work completed or was discarded.
    fn after_completion(&mut self, _status: CompletionStatus) {}
}

/// Handle returned when registering a callback, used to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(pub(crate) u64);
