//! Serialized execution of user-triggered lifecycle actions.
//!
//! One action runs at a time. Retryable failures are handed to the
//! [`ActionObserver`], which decides whether the same action closure is
//! invoked again. Whatever the outcome, the observer is asked to
//! resynchronize exactly once before [`ActionExecutor::run`] returns.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use thiserror::Error;

use vswitch_backend::{ActionError, CatalogError, Operation, ProcessError};

/// A retryable failure of one attempt, as shown to the user.
#[derive(Debug)]
pub struct ActionFailure<'a> {
    pub description: &'a str,
    pub attempt: usize,
    pub error: &'a ActionError,
}

impl ActionFailure<'_> {
    /// Name of the process or version the failed attempt targeted.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self.error {
            ActionError::Process(error) => Some(error.name()),
            ActionError::Catalog(
                CatalogError::SwitchFailed { version, .. }
                | CatalogError::VersionNotFound { version },
            ) => Some(version),
            ActionError::Catalog(CatalogError::Discovery { .. }) | ActionError::Unexpected(_) => {
                None
            }
        }
    }

    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        match self.error {
            ActionError::Process(ProcessError::Operation { operation, .. }) => Some(*operation),
            _ => None,
        }
    }
}

/// Callback surface implemented by the presentation layer.
#[async_trait]
pub trait ActionObserver: Send + Sync {
    /// An action was accepted and is about to run.
    fn on_action_start(&self, _description: &str) {}

    /// The action finished, one way or another; rebuild visible state.
    fn on_action_resync(&self);

    /// Report a retryable failure and return whether to try again.
    async fn on_action_failed(&self, failure: &ActionFailure<'_>) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed { attempts: usize },
    /// The user declined a retry, or the failure was not retryable.
    Abandoned { attempts: usize, error: ActionError },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Another action is in progress; {description} was not started")]
    Busy { description: String },

    #[error("Waiting for {description} aborted: {error}")]
    Fatal {
        description: String,
        error: ActionError,
    },
}

#[derive(Clone)]
pub struct ActionExecutor {
    observer: Arc<dyn ActionObserver>,
    busy: Arc<AtomicBool>,
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

/// Resynchronizes and releases the executor when an invocation ends,
/// including by unwinding.
struct RunGuard<'a> {
    observer: &'a dyn ActionObserver,
    busy: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.observer.on_action_resync();
        self.busy.store(false, Ordering::Release);
    }
}

impl ActionExecutor {
    pub fn new(observer: Arc<dyn ActionObserver>) -> Self {
        Self {
            observer,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run `action` until it succeeds, fails without retry, or the observer
    /// declines a retry. The same closure is re-invoked on every attempt.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Busy`] without running anything if another
    /// invocation is in flight, and [`ExecutorError::Fatal`] if the action
    /// fails with an unclassified error.
    pub async fn run<F, Fut>(
        &self,
        description: &str,
        mut action: F,
    ) -> Result<ActionOutcome, ExecutorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), ActionError>>,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejected {description}: another action is running");
            return Err(ExecutorError::Busy {
                description: description.to_string(),
            });
        }

        let _guard = RunGuard {
            observer: self.observer.as_ref(),
            busy: &self.busy,
        };

        info!("Waiting for {description}");
        self.observer.on_action_start(description);

        let mut attempts = 0;
        loop {
            attempts += 1;

            let error = match action().await {
                Ok(()) => {
                    info!("{description} completed after {attempts} attempt(s)");
                    return Ok(ActionOutcome::Completed { attempts });
                }
                Err(error) => error,
            };

            if !error.is_classified() {
                error!("{description} aborted: {error}");
                return Err(ExecutorError::Fatal {
                    description: description.to_string(),
                    error,
                });
            }

            if !error.is_retryable() {
                warn!("{description} failed without retry: {error}");
                return Ok(ActionOutcome::Abandoned { attempts, error });
            }

            warn!("{description} attempt {attempts} failed: {error}");
            let failure = ActionFailure {
                description,
                attempt: attempts,
                error: &error,
            };
            if !self.observer.on_action_failed(&failure).await {
                info!("{description} abandoned by user");
                return Ok(ActionOutcome::Abandoned { attempts, error });
            }

            debug!("Retrying {description}");
        }
    }
}
