//! Usecases name the intent of a unit of work.

use std::fmt;

/// Name of the default usecase.
pub const DEFAULT_USECASE: &str = "default";

/// The intent of a unit of work and its options.
///
/// The name is attached to every change batch the unit of work submits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Usecase {
    name: String,
    prune_on_pause: Option<bool>,
}

impl Usecase {
    /// Creates a usecase with no options set.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prune_on_pause: None,
        }
    }

    /// Returns the usecase name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the prune-on-pause option, if this usecase sets one.
    #[must_use]
    pub fn prune_on_pause(&self) -> Option<bool> {
        self.prune_on_pause
    }

    /// Sets whether pausing evicts unmodified entities.
    ///
    /// Overrides `Config::prune_on_pause` for units of work of this usecase.
    #[must_use]
    pub fn with_prune_on_pause(mut self, prune: bool) -> Self {
        self.prune_on_pause = Some(prune);
        self
    }
}

impl Default for Usecase {
    fn default() -> Self {
        Self::new(DEFAULT_USECASE)
    }
}

impl fmt::Display for Usecase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Usecase {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Usecase {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}
