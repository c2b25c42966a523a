//! Per-invocation state carried through a parse and into the handler.
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::sender::Sender;

/// A value stored in the context's heterogeneous map.
pub(crate) type StoredValue = Box<dyn Any + Send + Sync>;

/// Raised by [`CommandContext::require`] when a value is absent or of the
/// wrong type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no value named {name:?} of the requested type")]
pub struct MissingValue {
    /// The requested component name.
    pub name: String,
}

/// A typed key into the context map.
///
/// The phantom parameter pins the value type at the use site, so lookups
/// through a key cannot be mistyped.
#[derive(Debug, Clone, Copy)]
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    /// Creates a key for the component `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The component name this key addresses.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

#[derive(Default)]
struct FlagEntry {
    occurrences: u32,
    values: Vec<StoredValue>,
}

impl fmt::Debug for FlagEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagEntry")
            .field("occurrences", &self.occurrences)
            .field("values", &self.values.len())
            .finish()
    }
}

/// The context of a single invocation.
///
/// Created when dispatch starts, filled in as the walk binds components and
/// flags, and finally handed to the handler. Values are stored under their
/// component's name and recovered by type.
pub struct CommandContext<S: Sender> {
    sender: S,
    raw_input: String,
    values: FxHashMap<Cow<'static, str>, StoredValue>,
    flags: FxHashMap<Cow<'static, str>, FlagEntry>,
    cancellation: CancellationToken,
    suggesting: bool,
}

impl<S: Sender> fmt::Debug for CommandContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("raw_input", &self.raw_input)
            .field("values", &self.values.len())
            .field("flags", &self.flags)
            .field("cancellation", &self.cancellation)
            .field("suggesting", &self.suggesting)
            .finish_non_exhaustive()
    }
}

impl<S: Sender> CommandContext<S> {
    pub(crate) fn new(
        sender: S,
        raw_input: String,
        cancellation: CancellationToken,
        suggesting: bool,
    ) -> Self {
        Self {
            sender,
            raw_input,
            values: FxHashMap::default(),
            flags: FxHashMap::default(),
            cancellation,
            suggesting,
        }
    }

    /// The actor that invoked the command.
    #[must_use]
    pub const fn sender(&self) -> &S {
        &self.sender
    }

    /// The input line this invocation is parsing.
    #[must_use]
    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    pub(crate) fn set_raw_input(&mut self, raw_input: String) {
        self.raw_input = raw_input;
    }

    /// Whether this context belongs to a suggestion request rather than a
    /// dispatch.
    #[must_use]
    pub const fn is_suggesting(&self) -> bool {
        self.suggesting
    }

    /// The token cancelling this invocation cooperatively.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Stores `value` under `name`, replacing any previous entry.
    pub fn set<T: Send + Sync + 'static>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        value: T,
    ) {
        self.values.insert(name.into(), Box::new(value));
    }

    pub(crate) fn set_boxed(&mut self, name: Cow<'static, str>, value: StoredValue) {
        self.values.insert(name, value);
    }

    /// Whether a value is stored under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Looks up the value stored under `name`, if it has type `T`.
    #[must_use]
    pub fn get<T: 'static>(&self, name: &str) -> Option<&T> {
        self.values.get(name).and_then(|value| value.downcast_ref())
    }

    /// Looks up the value stored under `name`, failing loudly when absent.
    pub fn require<T: 'static>(&self, name: &str) -> Result<&T, MissingValue> {
        self.get(name).ok_or_else(|| MissingValue {
            name: name.to_owned(),
        })
    }

    /// Looks up the value addressed by a typed key.
    #[must_use]
    pub fn get_key<T: 'static>(&self, key: &ContextKey<T>) -> Option<&T> {
        self.get(key.name)
    }

    /// Stores a value under a typed key.
    pub fn set_key<T: Send + Sync + 'static>(&mut self, key: &ContextKey<T>, value: T) {
        self.set(key.name, value);
    }

    /// Looks up the value addressed by a typed key, failing loudly when
    /// absent.
    pub fn require_key<T: 'static>(&self, key: &ContextKey<T>) -> Result<&T, MissingValue> {
        self.require(key.name)
    }

    /// Whether the flag `name` appeared at least once.
    #[must_use]
    pub fn flag_present(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    /// How many times the flag `name` appeared.
    #[must_use]
    pub fn flag_count(&self, name: &str) -> u32 {
        self.flags.get(name).map_or(0, |entry| entry.occurrences)
    }

    /// The first value recorded for the flag `name`, if it has type `T`.
    #[must_use]
    pub fn flag_value<T: 'static>(&self, name: &str) -> Option<&T> {
        self.flags
            .get(name)
            .and_then(|entry| entry.values.first())
            .and_then(|value| value.downcast_ref())
    }

    /// Every value recorded for the repeatable flag `name`, in input order.
    #[must_use]
    pub fn flag_values<T: 'static>(&self, name: &str) -> Vec<&T> {
        self.flags.get(name).map_or_else(Vec::new, |entry| {
            entry
                .values
                .iter()
                .filter_map(|value| value.downcast_ref())
                .collect()
        })
    }

    pub(crate) fn record_flag_presence(&mut self, name: Cow<'static, str>) {
        self.flags.entry(name).or_default().occurrences += 1;
    }

    pub(crate) fn record_flag_value(&mut self, name: Cow<'static, str>, value: StoredValue) {
        let entry = self.flags.entry(name).or_default();
        entry.occurrences += 1;
        entry.values.push(value);
    }
}
