//! Pre- and post-processing hooks around dispatch.
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::command::Command;
use crate::context::CommandContext;
use crate::error::DispatchError;
use crate::sender::Sender;

/// Runs before tokenization; may rewrite the raw input or abort the
/// dispatch.
pub trait CommandPreprocessor<S: Sender>: Send + Sync {
    /// Processes the invocation. Returning an error aborts the dispatch
    /// with it.
    fn process(&self, ctx: &mut CommandContext<S>, input: &mut String)
    -> Result<(), DispatchError>;
}

impl<S: Sender, F> CommandPreprocessor<S> for F
where
    F: Fn(&mut CommandContext<S>, &mut String) -> Result<(), DispatchError> + Send + Sync,
{
    fn process(
        &self,
        ctx: &mut CommandContext<S>,
        input: &mut String,
    ) -> Result<(), DispatchError> {
        self(ctx, input)
    }
}

/// Runs after a terminal match, before the handler; may veto the
/// invocation.
pub trait CommandPostprocessor<S: Sender>: Send + Sync {
    /// Processes the matched invocation. Returning an error suppresses the
    /// handler and fails the dispatch with it.
    fn process(
        &self,
        ctx: &mut CommandContext<S>,
        command: &Command<S>,
    ) -> Result<(), DispatchError>;
}

impl<S: Sender, F> CommandPostprocessor<S> for F
where
    F: Fn(&mut CommandContext<S>, &Command<S>) -> Result<(), DispatchError> + Send + Sync,
{
    fn process(
        &self,
        ctx: &mut CommandContext<S>,
        command: &Command<S>,
    ) -> Result<(), DispatchError> {
        self(ctx, command)
    }
}

/// Transforms the suggestion list after tree gathering.
pub trait SuggestionProcessor<S: Sender>: Send + Sync {
    /// Filters or maps the gathered suggestions.
    fn process(&self, ctx: &CommandContext<S>, suggestions: Vec<String>) -> Vec<String>;
}

impl<S: Sender, F> SuggestionProcessor<S> for F
where
    F: Fn(&CommandContext<S>, Vec<String>) -> Vec<String> + Send + Sync,
{
    fn process(&self, ctx: &CommandContext<S>, suggestions: Vec<String>) -> Vec<String> {
        self(ctx, suggestions)
    }
}

/// A copy-on-write processor chain.
///
/// Registration prepends (LIFO order); dispatch iterates a snapshot, so
/// concurrent registration never tears a running invocation.
pub(crate) struct ProcessorChain<P: ?Sized> {
    chain: ArcSwap<Vec<Arc<P>>>,
}

impl<P: ?Sized> ProcessorChain<P> {
    pub(crate) fn new() -> Self {
        Self {
            chain: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub(crate) fn push(&self, processor: Arc<P>) {
        self.chain.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.push(Arc::clone(&processor));
            next.extend(current.iter().cloned());
            next
        });
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<P>>> {
        self.chain.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_are_lifo_and_snapshot_consistent() {
        let chain: ProcessorChain<str> = ProcessorChain::new();
        chain.push(Arc::from("first"));
        let snapshot = chain.snapshot();
        chain.push(Arc::from("second"));

        assert_eq!(snapshot.len(), 1);
        let latest = chain.snapshot();
        let order: Vec<&str> = latest.iter().map(|s| &**s).collect();
        assert_eq!(order, ["second", "first"]);
    }
}
