//! Command registry mapping command identifiers to handlers.
//!
//! The `CommandRegistry` is an explicitly constructed, cloneable handle;
//! clones share one command map. Every registration returns a
//! [`Disposable`] that removes exactly the handler it installed.
//!
//! Commands are owned either by the host or by an extension. Extensions
//! reach the registry through [`ExtensionCommands`]; when such a call
//! targets a host-owned command, only primitive [`Arg`] values are
//! accepted.
//!
//! Execution returns a [`Deferred`] future. There is no cancellation: a
//! handler that never completes leaves the caller pending.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::command::Arg;
use crate::disposable::Disposable;
use crate::error::{panic_message, ApiError};

/// Prefix marking host-internal command identifiers.
pub const INTERNAL_COMMAND_PREFIX: char = '_';

type Handler = Arc<dyn Fn(Vec<Arg>) -> BoxFuture<'static, Result<Arg, ApiError>> + Send + Sync>;

// ─── Deferred result ────────────────────────────────────────────────────

/// Result of a command execution.
///
/// Settles exactly once, either with the handler's value or with an error.
/// A handler that panics while running rejects with
/// [`ApiError::HandlerPanicked`].
#[must_use = "a deferred result does nothing unless awaited"]
pub struct Deferred<T> {
    state: DeferredState<T>,
}

enum DeferredState<T> {
    Settled(Option<Result<T, ApiError>>),
    Pending(BoxFuture<'static, Result<T, ApiError>>),
}

impl<T: Send + 'static> Deferred<T> {
    pub fn resolved(value: T) -> Self {
        Self {
            state: DeferredState::Settled(Some(Ok(value))),
        }
    }

    pub fn rejected(error: ApiError) -> Self {
        Self {
            state: DeferredState::Settled(Some(Err(error))),
        }
    }

    fn pending<F>(command: &str, future: F) -> Self
    where
        F: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let command = command.to_string();
        let guarded = AssertUnwindSafe(future)
            .catch_unwind()
            .map(move |outcome| match outcome {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(command = %command, "command handler panicked: {message}");
                    Err(ApiError::HandlerPanicked { command, message })
                }
            });
        Self {
            state: DeferredState::Pending(guarded.boxed()),
        }
    }

    /// Whether the result is already available without polling.
    pub fn is_settled(&self) -> bool {
        matches!(self.state, DeferredState::Settled(_))
    }
}

impl<T> Unpin for Deferred<T> {}

impl<T> Future for Deferred<T> {
    type Output = Result<T, ApiError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match &mut self.state {
            DeferredState::Settled(result) => match result.take() {
                Some(result) => result,
                None => panic!("`Deferred` polled after completion"),
            },
            DeferredState::Pending(future) => match future.as_mut().poll(cx) {
                Poll::Ready(result) => result,
                Poll::Pending => return Poll::Pending,
            },
        };
        self.state = DeferredState::Settled(None);
        Poll::Ready(result)
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            DeferredState::Settled(Some(Ok(_))) => "resolved",
            DeferredState::Settled(Some(Err(_))) => "rejected",
            DeferredState::Settled(None) => "consumed",
            DeferredState::Pending(_) => "pending",
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}

// ─── Registry ───────────────────────────────────────────────────────────

/// Who registered a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOrigin {
    Host,
    Extension(String),
}

impl fmt::Display for CommandOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOrigin::Host => f.write_str("host"),
            CommandOrigin::Extension(id) => write!(f, "extension:{id}"),
        }
    }
}

struct RegisteredCommand {
    /// Distinguishes this registration from later ones under the same id.
    token: u64,
    origin: CommandOrigin,
    handler: Handler,
}

#[derive(Default)]
struct CommandTable {
    entries: RwLock<HashMap<String, RegisteredCommand>>,
    next_token: AtomicU64,
}

impl CommandTable {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, RegisteredCommand>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RegisteredCommand>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn unregister(&self, id: &str, token: u64) {
        let mut entries = self.write();
        if entries.get(id).is_some_and(|entry| entry.token == token) {
            entries.remove(id);
            tracing::debug!(command = %id, "command unregistered");
        } else {
            tracing::debug!(command = %id, "stale command registration released, ignoring");
        }
    }
}

/// Registry of invocable commands.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    table: Arc<CommandTable>,
}

fn validate_command_id(id: &str) -> Result<(), ApiError> {
    if id.trim().is_empty() || id.chars().any(char::is_control) {
        return Err(ApiError::InvalidCommandId(id.to_string()));
    }
    Ok(())
}

/// Whether `id` follows the internal-command naming convention.
pub fn is_internal_command(id: &str) -> bool {
    id.starts_with(INTERNAL_COMMAND_PREFIX)
}

fn box_handler<F, Fut>(handler: F) -> Handler
where
    F: Fn(Vec<Arg>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arg, ApiError>> + Send + 'static,
{
    Arc::new(move |args| handler(args).boxed())
}

fn bind_handler<C, F, Fut>(context: Arc<C>, handler: F) -> Handler
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Vec<Arg>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arg, ApiError>> + Send + 'static,
{
    box_handler(move |args| handler(context.clone(), args))
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host-owned command.
    ///
    /// Fails with [`ApiError::DuplicateCommand`] when `id` already has a
    /// handler; registration never overwrites.
    pub fn register_command<F, Fut>(&self, id: &str, handler: F) -> Result<Disposable, ApiError>
    where
        F: Fn(Vec<Arg>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arg, ApiError>> + Send + 'static,
    {
        self.register(id, CommandOrigin::Host, box_handler(handler))
    }

    /// Register a host-owned command whose handler receives `context` on
    /// every invocation.
    pub fn register_command_bound<C, F, Fut>(
        &self,
        id: &str,
        context: Arc<C>,
        handler: F,
    ) -> Result<Disposable, ApiError>
    where
        C: Send + Sync + 'static,
        F: Fn(Arc<C>, Vec<Arg>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arg, ApiError>> + Send + 'static,
    {
        self.register(id, CommandOrigin::Host, bind_handler(context, handler))
    }

    fn register(
        &self,
        id: &str,
        origin: CommandOrigin,
        handler: Handler,
    ) -> Result<Disposable, ApiError> {
        validate_command_id(id)?;
        let token = self.table.next_token.fetch_add(1, Ordering::Relaxed);

        {
            let mut entries = self.table.write();
            if entries.contains_key(id) {
                return Err(ApiError::DuplicateCommand(id.to_string()));
            }
            tracing::debug!(command = %id, origin = %origin, "command registered");
            entries.insert(
                id.to_string(),
                RegisteredCommand {
                    token,
                    origin,
                    handler,
                },
            );
        }

        let table = Arc::downgrade(&self.table);
        let id = id.to_string();
        Ok(Disposable::new(move || {
            if let Some(table) = table.upgrade() {
                table.unregister(&id, token);
            }
        }))
    }

    /// Execute a command from inside the host. No argument restrictions
    /// apply.
    pub fn execute_command(&self, id: &str, args: Vec<Arg>) -> Deferred<Arg> {
        self.dispatch(id, args, None)
    }

    fn dispatch(&self, id: &str, args: Vec<Arg>, caller: Option<&str>) -> Deferred<Arg> {
        let (handler, origin) = {
            let entries = self.table.read();
            match entries.get(id) {
                Some(entry) => (entry.handler.clone(), entry.origin.clone()),
                None => return Deferred::rejected(ApiError::UnknownCommand(id.to_string())),
            }
        };

        if let (Some(extension), CommandOrigin::Host) = (caller, &origin) {
            if let Some(position) = args.iter().position(|arg| !arg.is_primitive()) {
                tracing::warn!(
                    command = %id,
                    extension = %extension,
                    position,
                    "rejected non-primitive argument to host command"
                );
                return Deferred::rejected(ApiError::InvalidArgument {
                    command: id.to_string(),
                    position,
                });
            }
        }

        tracing::trace!(command = %id, origin = %origin, args = args.len(), "executing command");
        match catch_unwind(AssertUnwindSafe(|| handler(args))) {
            Ok(future) => Deferred::pending(id, future),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(command = %id, "command handler panicked: {message}");
                Deferred::rejected(ApiError::HandlerPanicked {
                    command: id.to_string(),
                    message,
                })
            }
        }
    }

    /// All registered identifiers, sorted. With `filter_internal`,
    /// identifiers starting with an underscore are left out.
    pub fn get_commands(&self, filter_internal: bool) -> Vec<String> {
        let mut ids: Vec<String> = self
            .table
            .read()
            .keys()
            .filter(|id| !(filter_internal && is_internal_command(id)))
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.table.read().contains_key(id)
    }

    /// Owner of the command currently registered under `id`.
    pub fn origin(&self, id: &str) -> Option<CommandOrigin> {
        self.table.read().get(id).map(|entry| entry.origin.clone())
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// A handle that registers and executes on behalf of `extension_id`.
    pub fn for_extension(&self, extension_id: &str) -> Result<ExtensionCommands, ApiError> {
        if extension_id.trim().is_empty() {
            return Err(ApiError::InvalidExtensionId(extension_id.to_string()));
        }
        Ok(ExtensionCommands {
            registry: self.clone(),
            extension_id: extension_id.to_string(),
        })
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.len())
            .finish()
    }
}

// ─── Extension view ─────────────────────────────────────────────────────

/// The command namespace as seen by one extension.
#[derive(Clone, Debug)]
pub struct ExtensionCommands {
    registry: CommandRegistry,
    extension_id: String,
}

impl ExtensionCommands {
    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    /// Register a command owned by this extension.
    pub fn register_command<F, Fut>(&self, id: &str, handler: F) -> Result<Disposable, ApiError>
    where
        F: Fn(Vec<Arg>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arg, ApiError>> + Send + 'static,
    {
        self.registry.register(id, self.origin(), box_handler(handler))
    }

    pub fn register_command_bound<C, F, Fut>(
        &self,
        id: &str,
        context: Arc<C>,
        handler: F,
    ) -> Result<Disposable, ApiError>
    where
        C: Send + Sync + 'static,
        F: Fn(Arc<C>, Vec<Arg>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arg, ApiError>> + Send + 'static,
    {
        self.registry
            .register(id, self.origin(), bind_handler(context, handler))
    }

    /// Execute a command from outside the host. Host-owned commands only
    /// accept primitive arguments.
    pub fn execute_command(&self, id: &str, args: Vec<Arg>) -> Deferred<Arg> {
        self.registry.dispatch(id, args, Some(&self.extension_id))
    }

    pub fn get_commands(&self, filter_internal: bool) -> Vec<String> {
        self.registry.get_commands(filter_internal)
    }

    fn origin(&self) -> CommandOrigin {
        CommandOrigin::Extension(self.extension_id.clone())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────
