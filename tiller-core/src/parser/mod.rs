//! The parser contract: how components turn input into typed values.
pub mod combinators;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tiller_utils::InputCursor;

use crate::context::CommandContext;
use crate::error::ParseFailure;
use crate::parser::combinators::{FlatMappedParser, MappedParser, ThenParser};
use crate::sender::Sender;

/// A synchronous argument parser.
///
/// Given the invocation context and the input cursor, a parser either
/// produces a typed value (consuming some input) or fails with a reason.
/// Implementations may consume input before failing; the execution engine
/// snapshots and restores the cursor around every invocation.
pub trait ArgumentParser<S: Sender>: Send + Sync {
    /// The type of the parsed value.
    type Output: Send + Sync + 'static;

    /// Parses a value from the cursor.
    fn parse(
        &self,
        ctx: &CommandContext<S>,
        input: &mut InputCursor<'_>,
    ) -> Result<Self::Output, ParseFailure>;

    /// Completion candidates for the partial token `partial`.
    ///
    /// Candidates are returned unfiltered; the suggestion engine applies the
    /// partial-token filter itself.
    fn suggest(&self, _ctx: &CommandContext<S>, _partial: &str) -> Vec<String> {
        Vec::new()
    }

    /// Whether this parser's result depends only on the input, which lets
    /// hosts cache its suggestions.
    fn context_free(&self) -> bool {
        false
    }

    /// Whether this parser consumes all remaining input on success.
    fn greedy(&self) -> bool {
        false
    }
}

/// An argument parser that may suspend, e.g. to consult a remote resolver.
///
/// Suspension is only permitted at parser boundaries; the cursor is never
/// held across an await inside a token read.
pub trait SuspendingParser<S: Sender>: Send + Sync {
    /// The type of the parsed value.
    type Output: Send + Sync + 'static;

    /// Parses a value from the cursor, possibly suspending.
    fn parse<'a, 'src: 'a>(
        &'a self,
        ctx: &'a CommandContext<S>,
        input: &'a mut InputCursor<'src>,
    ) -> BoxFuture<'a, Result<Self::Output, ParseFailure>>;

    /// Completion candidates for the partial token `partial`.
    fn suggest(&self, _ctx: &CommandContext<S>, _partial: &str) -> Vec<String> {
        Vec::new()
    }

    /// Whether this parser's result depends only on the input.
    fn context_free(&self) -> bool {
        false
    }

    /// Whether this parser consumes all remaining input on success.
    fn greedy(&self) -> bool {
        false
    }
}

/// Combinators available on every [`ArgumentParser`].
pub trait ArgumentParserExt<S: Sender>: ArgumentParser<S> + Sized {
    /// Transforms this parser's output with `transform`.
    fn map<U, F>(self, transform: F) -> MappedParser<Self, F>
    where
        U: Send + Sync + 'static,
        F: Fn(Self::Output) -> U + Send + Sync,
    {
        MappedParser::new(self, transform)
    }

    /// Transforms this parser's output with a fallible `transform`.
    fn flat_map<U, F>(self, transform: F) -> FlatMappedParser<Self, F>
    where
        U: Send + Sync + 'static,
        F: Fn(Self::Output) -> Result<U, ParseFailure> + Send + Sync,
    {
        FlatMappedParser::new(self, transform)
    }

    /// Runs this parser, then `next`, yielding both values as a pair.
    fn then<P>(self, next: P) -> ThenParser<Self, P>
    where
        P: ArgumentParser<S>,
    {
        ThenParser::new(self, next)
    }
}

impl<S: Sender, P: ArgumentParser<S> + Sized> ArgumentParserExt<S> for P {}

/// The object-safe face of a parser, with its output type erased.
pub(crate) trait ErasedParser<S: Sender>: Send + Sync {
    fn parse_value<'a, 'src: 'a>(
        &'a self,
        ctx: &'a CommandContext<S>,
        input: &'a mut InputCursor<'src>,
    ) -> BoxFuture<'a, Result<Box<dyn Any + Send + Sync>, ParseFailure>>;

    fn suggest_values(&self, ctx: &CommandContext<S>, partial: &str) -> Vec<String>;

    fn is_context_free(&self) -> bool;

    fn is_greedy(&self) -> bool;
}

struct SyncBridge<P> {
    parser: P,
}

impl<S, P> ErasedParser<S> for SyncBridge<P>
where
    S: Sender,
    P: ArgumentParser<S>,
{
    fn parse_value<'a, 'src: 'a>(
        &'a self,
        ctx: &'a CommandContext<S>,
        input: &'a mut InputCursor<'src>,
    ) -> BoxFuture<'a, Result<Box<dyn Any + Send + Sync>, ParseFailure>> {
        let result = self
            .parser
            .parse(ctx, input)
            .map(|value| Box::new(value) as Box<dyn Any + Send + Sync>);
        Box::pin(std::future::ready(result))
    }

    fn suggest_values(&self, ctx: &CommandContext<S>, partial: &str) -> Vec<String> {
        self.parser.suggest(ctx, partial)
    }

    fn is_context_free(&self) -> bool {
        self.parser.context_free()
    }

    fn is_greedy(&self) -> bool {
        self.parser.greedy()
    }
}

struct SuspendingBridge<P> {
    parser: P,
}

impl<S, P> ErasedParser<S> for SuspendingBridge<P>
where
    S: Sender,
    P: SuspendingParser<S>,
{
    fn parse_value<'a, 'src: 'a>(
        &'a self,
        ctx: &'a CommandContext<S>,
        input: &'a mut InputCursor<'src>,
    ) -> BoxFuture<'a, Result<Box<dyn Any + Send + Sync>, ParseFailure>> {
        Box::pin(async move {
            self.parser
                .parse(ctx, input)
                .await
                .map(|value| Box::new(value) as Box<dyn Any + Send + Sync>)
        })
    }

    fn suggest_values(&self, ctx: &CommandContext<S>, partial: &str) -> Vec<String> {
        self.parser.suggest(ctx, partial)
    }

    fn is_context_free(&self) -> bool {
        self.parser.context_free()
    }

    fn is_greedy(&self) -> bool {
        self.parser.greedy()
    }
}

/// A type-erased, reference-counted parser handle, as stored in components
/// and flags.
///
/// Cloning shares the underlying parser, which also preserves parser
/// identity: the command tree unifies argument components across commands
/// only when their handles share one parser.
pub struct AnyParser<S: Sender> {
    inner: Arc<dyn ErasedParser<S>>,
}

impl<S: Sender> Clone for AnyParser<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Sender> fmt::Debug for AnyParser<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyParser(..)")
    }
}

impl<S: Sender> AnyParser<S> {
    /// Erases a synchronous parser.
    #[must_use]
    pub fn new<P>(parser: P) -> Self
    where
        P: ArgumentParser<S> + 'static,
    {
        Self {
            inner: Arc::new(SyncBridge { parser }),
        }
    }

    /// Erases a suspending parser. The synchronous path is simply the
    /// suspending one that never waits.
    #[must_use]
    pub fn suspending<P>(parser: P) -> Self
    where
        P: SuspendingParser<S> + 'static,
    {
        Self {
            inner: Arc::new(SuspendingBridge { parser }),
        }
    }

    /// Whether two handles share one underlying parser.
    #[must_use]
    pub fn same_parser(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether the underlying parser is context-free.
    #[must_use]
    pub fn context_free(&self) -> bool {
        self.inner.is_context_free()
    }

    /// Whether the underlying parser consumes all remaining input.
    #[must_use]
    pub fn greedy(&self) -> bool {
        self.inner.is_greedy()
    }

    /// Completion candidates for the partial token `partial`.
    #[must_use]
    pub fn suggest(&self, ctx: &CommandContext<S>, partial: &str) -> Vec<String> {
        self.inner.suggest_values(ctx, partial)
    }

    pub(crate) fn parse_value<'a, 'src: 'a>(
        &'a self,
        ctx: &'a CommandContext<S>,
        input: &'a mut InputCursor<'src>,
    ) -> BoxFuture<'a, Result<Box<dyn Any + Send + Sync>, ParseFailure>> {
        self.inner.parse_value(ctx, input)
    }
}
