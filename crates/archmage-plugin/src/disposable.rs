//! Disposable resource handles.
//!
//! A [`Disposable`] wraps one release action, or a group of other
//! disposables, and runs it at most once. Clones share state, so a handle
//! pushed into a collector and the copy kept by the caller release the same
//! resource. Release actions run outside the internal lock, which makes it
//! safe to dispose other handles (or the same one) from inside an action.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{panic_message, ApiError};

/// A disposable-like object.
///
/// Anything implementing this trait can be combined with
/// [`Disposable::from_all`].
pub trait Dispose: Send + Sync {
    /// Release the underlying resource, reporting failure instead of
    /// panicking.
    fn try_dispose(&self) -> Result<(), ApiError>;
}

impl<D: Dispose + ?Sized> Dispose for Box<D> {
    fn try_dispose(&self) -> Result<(), ApiError> {
        (**self).try_dispose()
    }
}

type ReleaseFn = Box<dyn FnOnce() -> Result<(), ApiError> + Send>;

enum Release {
    Action(ReleaseFn),
    Composite(Vec<Box<dyn Dispose>>),
}

/// A one-shot, idempotent resource release handle.
#[derive(Clone)]
pub struct Disposable {
    release: Arc<Mutex<Option<Release>>>,
}

impl Disposable {
    /// Wrap an infallible release action. A panic inside `action` is caught
    /// and reported as a disposal failure.
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::try_new(move || {
            action();
            Ok(())
        })
    }

    /// Wrap a release action that may fail.
    pub fn try_new<F>(action: F) -> Self
    where
        F: FnOnce() -> Result<(), ApiError> + Send + 'static,
    {
        Self::with_release(Release::Action(Box::new(action)))
    }

    /// A handle that is already disposed.
    pub fn none() -> Self {
        Self {
            release: Arc::new(Mutex::new(None)),
        }
    }

    /// Combine many disposable-likes into one.
    ///
    /// Releasing the result releases every item in iteration order. A
    /// failing item does not stop the remaining ones; failures are
    /// collected into a single [`ApiError::DisposalFailure`].
    pub fn from_all<I, D>(items: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Dispose + 'static,
    {
        let items = items
            .into_iter()
            .map(|item| Box::new(item) as Box<dyn Dispose>)
            .collect();
        Self::with_release(Release::Composite(items))
    }

    fn with_release(release: Release) -> Self {
        Self {
            release: Arc::new(Mutex::new(Some(release))),
        }
    }

    /// Whether this handle (or any clone of it) has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Release the resource. Subsequent calls are no-ops.
    ///
    /// Failures are logged, never raised.
    pub fn dispose(&self) {
        if let Err(e) = self.try_dispose() {
            tracing::error!("{e}");
        }
    }

    /// Release the resource and return any failures.
    ///
    /// Every sub-resource is released before the error is returned.
    pub fn try_dispose(&self) -> Result<(), ApiError> {
        let taken = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(release) = taken else {
            return Ok(());
        };

        let mut failures = Vec::new();
        match release {
            Release::Action(action) => {
                collect_failure(catch_unwind(AssertUnwindSafe(action)), &mut failures);
            }
            Release::Composite(items) => {
                for item in items {
                    let outcome = catch_unwind(AssertUnwindSafe(|| item.try_dispose()));
                    collect_failure(outcome, &mut failures);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ApiError::DisposalFailure(failures))
        }
    }
}

fn collect_failure(
    outcome: std::thread::Result<Result<(), ApiError>>,
    failures: &mut Vec<String>,
) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(ApiError::DisposalFailure(nested))) => failures.extend(nested),
        Ok(Err(e)) => failures.push(e.to_string()),
        Err(payload) => failures.push(panic_message(payload.as_ref())),
    }
}

impl Dispose for Disposable {
    fn try_dispose(&self) -> Result<(), ApiError> {
        Disposable::try_dispose(self)
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
