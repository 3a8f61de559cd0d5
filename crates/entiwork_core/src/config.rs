//! Unit-of-work configuration.

use crate::retry::RetryPolicy;

/// Configuration shared by every unit of work a factory creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Retry policy used by `UnitOfWorkStack::run_with_retry`.
    pub retry: RetryPolicy,

    /// Whether pausing evicts unmodified entities, unless the usecase says
    /// otherwise.
    pub prune_on_pause: bool,

    /// Whether writing an undeclared state name is an error.
    pub validate_state_names: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            prune_on_pause: false,
            validate_state_names: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets whether pausing evicts unmodified entities.
    #[must_use]
    pub const fn prune_on_pause(mut self, value: bool) -> Self {
        self.prune_on_pause = value;
        self
    }

    /// Sets whether undeclared state names are rejected.
    #[must_use]
    pub const fn validate_state_names(mut self, value: bool) -> Self {
        self.validate_state_names = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!config.prune_on_pause);
        assert!(config.validate_state_names);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .retry(RetryPolicy::no_retry())
            .prune_on_pause(true)
            .validate_state_names(false);

        assert_eq!(config.retry.max_attempts, 1);
        assert!(config.prune_on_pause);
        assert!(!config.validate_state_names);
    }
}
