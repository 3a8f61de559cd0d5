//! Error types for EntiWork core.

use crate::reference::EntityReference;
use crate::types::UnitOfWorkState;
use entiwork_codec::CodecError;
use entiwork_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in unit-of-work operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity store error other than a version conflict.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Record encoding or decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No entity with this reference exists, or it was removed in this
    /// unit of work.
    #[error("entity not found: {reference}")]
    EntityNotFound {
        /// The reference that was looked up.
        reference: EntityReference,
    },

    /// An entity with this reference already exists.
    #[error("entity already exists: {reference}")]
    EntityAlreadyExists {
        /// The reference that was requested.
        reference: EntityReference,
    },

    /// Another unit of work changed these entities first.
    #[error("{}", describe_conflict(.identities, .usecase))]
    ConcurrentModification {
        /// Every entity whose stored version no longer matched.
        identities: Vec<EntityReference>,
        /// Usecase of the unit of work that lost, when known.
        usecase: Option<String>,
    },

    /// `complete()` failed for a reason other than a version conflict.
    #[error("completion of usecase {usecase} failed: {source}")]
    CompletionFailed {
        /// Usecase of the failed unit of work.
        usecase: String,
        /// What went wrong.
        source: Box<CoreError>,
    },

    /// An operation required an active unit of work and there was none.
    #[error("no active unit of work")]
    NoActiveUnitOfWork,

    /// The unit of work is not in a state that allows the operation.
    #[error("cannot {operation}: unit of work is {}", describe_state(.state, .paused))]
    IllegalUnitOfWorkState {
        /// Life-cycle state at the time of the call.
        state: UnitOfWorkState,
        /// Whether the unit of work was paused.
        paused: bool,
        /// The rejected operation.
        operation: &'static str,
    },

    /// The entity type is not registered.
    #[error("no such entity type: {name}")]
    NoSuchEntityType {
        /// The requested type name.
        name: String,
    },

    /// The state name is not declared by the entity type.
    #[error("entity type {entity_type} declares no {kind} named {name}")]
    UnknownStateName {
        /// The entity type.
        entity_type: String,
        /// Property, association, many-association, or named-association.
        kind: &'static str,
        /// The undeclared name.
        name: String,
    },

    /// Operation not permitted.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

fn describe_conflict(identities: &[EntityReference], usecase: &Option<String>) -> String {
    let names: Vec<&str> = identities.iter().map(EntityReference::as_str).collect();
    match usecase {
        Some(usecase) => format!(
            "concurrent modification of {} in usecase {usecase}",
            names.join(", ")
        ),
        None => format!("concurrent modification of {}", names.join(", ")),
    }
}

fn describe_state(state: &UnitOfWorkState, paused: &bool) -> String {
    if *paused {
        format!("{state} and paused")
    } else {
        state.to_string()
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConcurrentModification { identities } => Self::ConcurrentModification {
                identities: identities.into_iter().map(EntityReference::from).collect(),
                usecase: None,
            },
            other => Self::Storage(other),
        }
    }
}

impl CoreError {
    /// Creates an entity not found error.
    pub fn entity_not_found(reference: EntityReference) -> Self {
        Self::EntityNotFound { reference }
    }

    /// Creates an entity already exists error.
    pub fn entity_already_exists(reference: EntityReference) -> Self {
        Self::EntityAlreadyExists { reference }
    }

    /// Creates a no such entity type error.
    pub fn no_such_entity_type(name: impl Into<String>) -> Self {
        Self::NoSuchEntityType { name: name.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    /// Returns the conflicting entities, or an empty slice for other errors.
    pub fn conflicting_identities(&self) -> &[EntityReference] {
        match self {
            Self::ConcurrentModification { identities, .. } => identities,
            _ => &[],
        }
    }

    /// Wraps an error raised while completing a unit of work.
    ///
    /// Conflicts keep their kind and gain the usecase; everything else
    /// becomes `CompletionFailed`.
    pub(crate) fn into_completion_error(self, usecase: &str) -> Self {
        match self {
            Self::ConcurrentModification { identities, .. } => Self::ConcurrentModification {
                identities,
                usecase: Some(usecase.to_string()),
            },
            failed @ Self::CompletionFailed { .. } => failed,
            other => Self::CompletionFailed {
                usecase: usecase.to_string(),
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_conflict_becomes_concurrent_modification() {
        let err = CoreError::from(StorageError::concurrent_modification(vec![
            "a".into(),
            "b".into(),
        ]));
        assert!(err.is_conflict());
        assert_eq!(
            err.conflicting_identities(),
            &[EntityReference::new("a"), EntityReference::new("b")]
        );
    }

    #[test]
    fn other_storage_errors_are_wrapped() {
        let err = CoreError::from(StorageError::Locked);
        assert!(matches!(err, CoreError::Storage(StorageError::Locked)));
        assert!(!err.is_conflict());
    }

    #[test]
    fn completion_error_keeps_conflicts() {
        let conflict = CoreError::ConcurrentModification {
            identities: vec![EntityReference::new("a")],
            usecase: None,
        };
        let err = conflict.into_completion_error("checkout");
        assert_eq!(
            err.to_string(),
            "concurrent modification of a in usecase checkout"
        );
    }

    #[test]
    fn completion_error_wraps_others() {
        let err = CoreError::invalid_operation("boom").into_completion_error("checkout");
        match err {
            CoreError::CompletionFailed { usecase, source } => {
                assert_eq!(usecase, "checkout");
                assert!(matches!(*source, CoreError::InvalidOperation { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn illegal_state_message() {
        let err = CoreError::IllegalUnitOfWorkState {
            state: UnitOfWorkState::Open,
            paused: true,
            operation: "get an entity",
        };
        assert_eq!(
            err.to_string(),
            "cannot get an entity: unit of work is open and paused"
        );
    }
}
