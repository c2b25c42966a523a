//! The registry mapping value types to parser factories.
use std::any::TypeId;
use std::borrow::Cow;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::component::ValueTypeTag;
use crate::parser::AnyParser;
use crate::sender::Sender;

/// Well-known parameter keys understood by the standard parser factories.
pub mod keys {
    /// Inclusive lower bound for numeric parsers.
    pub const MIN: &str = "min";
    /// Inclusive upper bound for numeric parsers.
    pub const MAX: &str = "max";
    /// Makes the string parser consume all remaining input.
    pub const GREEDY: &str = "greedy";
    /// Makes the string parser decode quoted tokens.
    pub const QUOTED: &str = "quoted";
}

/// One value in a [`ParserParameters`] bag.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// An integer parameter.
    Integer(i64),
    /// A floating point parameter.
    Float(f64),
    /// A boolean parameter.
    Boolean(bool),
    /// A text parameter.
    Text(String),
}

/// The parameter bag handed to a parser factory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParserParameters {
    values: FxHashMap<Cow<'static, str>, ParameterValue>,
}

impl ParserParameters {
    /// An empty parameter bag.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a parameter, consuming and returning the bag.
    #[must_use]
    pub fn with(mut self, key: impl Into<Cow<'static, str>>, value: ParameterValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Stores a parameter.
    pub fn insert(&mut self, key: impl Into<Cow<'static, str>>, value: ParameterValue) {
        self.values.insert(key.into(), value);
    }

    /// Reads an integer parameter.
    #[must_use]
    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(ParameterValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    /// Reads a floating point parameter.
    #[must_use]
    pub fn float(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(ParameterValue::Float(value)) => Some(*value),
            _ => None,
        }
    }

    /// Reads a boolean parameter.
    #[must_use]
    pub fn boolean(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(ParameterValue::Boolean(value)) => Some(*value),
            _ => None,
        }
    }

    /// Reads a text parameter.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(ParameterValue::Text(value)) => Some(value),
            _ => None,
        }
    }
}

struct Factory<S: Sender> {
    build: Arc<dyn Fn(&ParserParameters) -> AnyParser<S> + Send + Sync>,
}

impl<S: Sender> Clone for Factory<S> {
    fn clone(&self) -> Self {
        Self {
            build: Arc::clone(&self.build),
        }
    }
}

/// Maps value type tags to parser factories, so arguments can be declared
/// by type alone.
///
/// Registration is permitted in any lifecycle state; lookups are
/// concurrent-safe and read-mostly.
pub struct ParserRegistry<S: Sender> {
    factories: scc::HashMap<TypeId, Factory<S>>,
}

impl<S: Sender> Default for ParserRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sender> ParserRegistry<S> {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: scc::HashMap::new(),
        }
    }

    /// A registry pre-populated with the standard parser suite.
    #[must_use]
    pub fn with_standard_parsers() -> Self {
        let registry = Self::new();
        crate::arguments::register_standard(&registry);
        registry
    }

    /// Registers a factory for the value type `T`, replacing any previous
    /// one.
    pub fn register<T, F>(&self, factory: F)
    where
        T: 'static,
        F: Fn(&ParserParameters) -> AnyParser<S> + Send + Sync + 'static,
    {
        let entry = Factory {
            build: Arc::new(factory),
        };
        if let Err((key, entry)) = self.factories.insert_sync(TypeId::of::<T>(), entry) {
            let _ = self.factories.remove_sync(&key);
            let _ = self.factories.insert_sync(key, entry);
        }
    }

    /// Whether a factory is registered for `T`.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.factories
            .read_sync(&TypeId::of::<T>(), |_, _| ())
            .is_some()
    }

    /// Creates a parser for `T` with the given parameters.
    #[must_use]
    pub fn create<T: 'static>(&self, parameters: &ParserParameters) -> Option<AnyParser<S>> {
        self.factories
            .read_sync(&TypeId::of::<T>(), |_, factory| (factory.build)(parameters))
    }

    /// Creates a parser for a runtime value type tag.
    #[must_use]
    pub fn create_by_tag(
        &self,
        tag: ValueTypeTag,
        parameters: &ParserParameters,
    ) -> Option<AnyParser<S>> {
        self.factories
            .read_sync(&tag.id(), |_, factory| (factory.build)(parameters))
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::context::CommandContext;
    use tiller_utils::InputCursor;

    fn context() -> CommandContext<()> {
        CommandContext::new((), String::new(), CancellationToken::new(), false)
    }

    #[test]
    fn standard_suite_is_registered() {
        let registry: ParserRegistry<()> = ParserRegistry::with_standard_parsers();
        assert!(registry.contains::<i64>());
        assert!(registry.contains::<f64>());
        assert!(registry.contains::<bool>());
        assert!(registry.contains::<String>());
        assert!(!registry.contains::<u128>());
    }

    #[test]
    fn unknown_type_yields_no_parser() {
        let registry: ParserRegistry<()> = ParserRegistry::new();
        assert!(registry.create::<i64>(&ParserParameters::empty()).is_none());
    }

    #[tokio::test]
    async fn factories_honor_parameters() {
        let registry: ParserRegistry<()> = ParserRegistry::with_standard_parsers();
        let parameters = ParserParameters::empty()
            .with(keys::MIN, ParameterValue::Integer(1))
            .with(keys::MAX, ParameterValue::Integer(64));
        let parser = registry.create::<i64>(&parameters).unwrap();

        let ctx = context();
        let mut cursor = InputCursor::new("100");
        assert!(parser.parse_value(&ctx, &mut cursor).await.is_err());

        let mut cursor = InputCursor::new("32");
        let value = parser.parse_value(&ctx, &mut cursor).await.unwrap();
        assert_eq!(value.downcast_ref::<i64>(), Some(&32));
    }

    #[test]
    fn re_registration_replaces_the_factory() {
        let registry: ParserRegistry<()> = ParserRegistry::with_standard_parsers();
        registry.register::<bool, _>(|_| {
            AnyParser::new(crate::arguments::boolean::BoolParser)
        });
        assert!(registry.contains::<bool>());
    }
}
