//! Module defining errors that can occur during registration and dispatch.
use std::any::TypeId;
use std::borrow::Cow;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tiller_utils::InputError;

use crate::sender::Sender;

/// The reason an argument or flag value failed to parse.
///
/// Parsers are free to consume input before failing; the execution engine
/// restores the cursor around every parser invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseFailure {
    message: Cow<'static, str>,
    consumed: Option<String>,
}

impl ParseFailure {
    /// Creates a failure with the given reason.
    #[must_use]
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
            consumed: None,
        }
    }

    /// Attaches the input the parser had consumed before failing.
    #[must_use]
    pub fn with_consumed(mut self, consumed: impl Into<String>) -> Self {
        self.consumed = Some(consumed.into());
        self
    }

    /// The failure reason.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The input consumed before the failure, if the parser recorded it.
    #[must_use]
    pub fn consumed(&self) -> Option<&str> {
        self.consumed.as_deref()
    }
}

impl From<InputError> for ParseFailure {
    fn from(error: InputError) -> Self {
        Self::new(error.to_string())
    }
}

/// An error produced by dispatching a line of input.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No root command matched the first token.
    #[error("unknown command {input:?}")]
    UnknownCommand {
        /// The token that matched no root surface.
        input: String,
    },
    /// The sender lacks a permission on the matched path or a flag.
    #[error("missing permission {permission:?}")]
    NoPermission {
        /// A printable form of the denied permission.
        permission: String,
    },
    /// The walk ended before a terminal, or tokens were left over.
    #[error("invalid syntax at byte {position}: expected {expected}")]
    InvalidSyntax {
        /// A rendering of the expected continuation.
        expected: String,
        /// Byte offset into the input where the walk stopped.
        position: usize,
    },
    /// The sender does not satisfy the command's required sender type.
    #[error("this command requires a {required} sender")]
    InvalidSenderType {
        /// Name of the required sender type.
        required: &'static str,
    },
    /// A component parser rejected the input.
    #[error("failed to parse argument {component:?}")]
    ArgumentParse {
        /// Name of the component whose parser failed.
        component: String,
        /// The parser's reason.
        #[source]
        reason: ParseFailure,
    },
    /// The flag parser rejected the input.
    #[error("failed to parse flag {flag:?}")]
    FlagParse {
        /// Primary name of the offending flag.
        flag: String,
        /// The parser's reason.
        #[source]
        reason: ParseFailure,
    },
    /// The handler raised an error.
    #[error("command execution failed")]
    Execution(#[source] anyhow::Error),
    /// The invocation was cancelled before the handler ran.
    #[error("dispatch was cancelled")]
    Cancelled,
}

impl DispatchError {
    /// The fieldless kind of this error, used for routing.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownCommand { .. } => ErrorKind::UnknownCommand,
            Self::NoPermission { .. } => ErrorKind::NoPermission,
            Self::InvalidSyntax { .. } => ErrorKind::InvalidSyntax,
            Self::InvalidSenderType { .. } => ErrorKind::InvalidSenderType,
            Self::ArgumentParse { .. } => ErrorKind::ArgumentParse,
            Self::FlagParse { .. } => ErrorKind::FlagParse,
            Self::Execution(_) => ErrorKind::Execution,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// The kinds of [`DispatchError`], used as routing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`DispatchError::UnknownCommand`].
    UnknownCommand,
    /// See [`DispatchError::NoPermission`].
    NoPermission,
    /// See [`DispatchError::InvalidSyntax`].
    InvalidSyntax,
    /// See [`DispatchError::InvalidSenderType`].
    InvalidSenderType,
    /// See [`DispatchError::ArgumentParse`].
    ArgumentParse,
    /// See [`DispatchError::FlagParse`].
    FlagParse,
    /// See [`DispatchError::Execution`].
    Execution,
    /// See [`DispatchError::Cancelled`].
    Cancelled,
}

/// An error produced while inserting a command into the tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A command is already attached to the terminal node.
    #[error("a command is already registered at {path:?}")]
    DuplicateCommand {
        /// The component path of the occupied node.
        path: String,
    },
    /// A new literal's surfaces intersect a sibling literal's.
    #[error("literal {name:?} conflicts with sibling literal {existing:?}")]
    ConflictingLiterals {
        /// The literal being inserted.
        name: String,
        /// The sibling it collides with.
        existing: String,
    },
    /// Two argument children of one node cannot be told apart.
    #[error("ambiguous argument components under {path:?}")]
    AmbiguousArguments {
        /// The component path of the offending node.
        path: String,
    },
    /// The manager has left its registration phase.
    #[error("the manager no longer accepts registrations")]
    RegistrationLocked,
}

/// An error produced by [`CommandBuilder::build`](crate::command::CommandBuilder::build).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandBuildError {
    /// The builder was finished without a handler.
    #[error("command has no handler")]
    MissingHandler,
    /// Two components share a name.
    #[error("duplicate component name {name:?}")]
    DuplicateComponentName {
        /// The repeated name.
        name: String,
    },
    /// A required component was declared after an optional one.
    #[error("required component {name:?} follows an optional component")]
    RequiredAfterOptional {
        /// Name of the misplaced component.
        name: String,
    },
    /// No parser factory is registered for an inferred value type.
    #[error("no parser registered for value type {type_name}")]
    UnknownValueType {
        /// The Rust name of the unknown type.
        type_name: &'static str,
    },
    /// Two flags of one command share a surface.
    #[error("duplicate flag name {name:?}")]
    DuplicateFlagName {
        /// The repeated surface.
        name: String,
    },
}

/// What an [`ExceptionHandler`] did with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// The error was fully handled.
    Handled,
    /// Fall through to the default handler.
    Escalate,
}

/// A user-installed handler for dispatch failures of one kind.
pub trait ExceptionHandler<S: Sender>: Send + Sync {
    /// Handles `error` on behalf of `sender`.
    fn handle(&self, sender: &S, error: &DispatchError) -> ErrorDisposition;
}

impl<S: Sender, F> ExceptionHandler<S> for F
where
    F: Fn(&S, &DispatchError) -> ErrorDisposition + Send + Sync,
{
    fn handle(&self, sender: &S, error: &DispatchError) -> ErrorDisposition {
        self(sender, error)
    }
}

struct ExecutionRoute<S: Sender> {
    matches: Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>,
    handler: Arc<dyn ExceptionHandler<S>>,
}

impl<S: Sender> Clone for ExecutionRoute<S> {
    fn clone(&self) -> Self {
        Self {
            matches: Arc::clone(&self.matches),
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Routes dispatch failures to user-installed handlers by kind, or by inner
/// error type for [`DispatchError::Execution`].
///
/// Routing is synchronous and runs on the thread that produced the failure.
/// Errors no handler consumes fall through to a default that stringifies
/// them to the log.
pub struct ExceptionRouter<S: Sender> {
    by_kind: RwLock<FxHashMap<ErrorKind, Arc<dyn ExceptionHandler<S>>>>,
    execution_routes: RwLock<Vec<(TypeId, ExecutionRoute<S>)>>,
}

impl<S: Sender> Default for ExceptionRouter<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sender> ExceptionRouter<S> {
    /// Creates a router with no installed handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_kind: RwLock::new(FxHashMap::default()),
            execution_routes: RwLock::new(Vec::new()),
        }
    }

    /// Installs a handler for one error kind, replacing any previous one.
    pub fn install(&self, kind: ErrorKind, handler: impl ExceptionHandler<S> + 'static) {
        self.by_kind.write().insert(kind, Arc::new(handler));
    }

    /// Installs a handler for [`DispatchError::Execution`] failures whose
    /// wrapped error downcasts to `E`. Typed routes are consulted before the
    /// [`ErrorKind::Execution`] handler.
    pub fn install_for_execution_error<E>(&self, handler: impl ExceptionHandler<S> + 'static)
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let route = ExecutionRoute {
            matches: Arc::new(|error: &anyhow::Error| error.downcast_ref::<E>().is_some()),
            handler: Arc::new(handler),
        };
        let mut routes = self.execution_routes.write();
        routes.retain(|(id, _)| *id != TypeId::of::<E>());
        routes.push((TypeId::of::<E>(), route));
    }

    /// Routes `error`, falling back to stringifying it to the log.
    pub fn route(&self, sender: &S, error: &DispatchError) {
        if let DispatchError::Execution(source) = error {
            let routes: Vec<ExecutionRoute<S>> = self
                .execution_routes
                .read()
                .iter()
                .map(|(_, route)| route.clone())
                .collect();
            for route in routes {
                if (route.matches)(source)
                    && route.handler.handle(sender, error) == ErrorDisposition::Handled
                {
                    return;
                }
            }
        }
        let handler = self.by_kind.read().get(&error.kind()).cloned();
        if let Some(handler) = handler
            && handler.handle(sender, error) == ErrorDisposition::Handled
        {
            return;
        }
        tracing::warn!(%error, "unhandled command dispatch failure");
    }
}
