//! Commands and the builder assembling them.
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use rustc_hash::FxHashMap;

use crate::component::{CommandComponent, DefaultValue, SuggestionProvider, ValueTypeTag};
use crate::context::CommandContext;
use crate::error::CommandBuildError;
use crate::flags::{CommandFlag, FlagSet};
use crate::parser::{AnyParser, ArgumentParser};
use crate::permission::Permission;
use crate::registry::{ParserParameters, ParserRegistry};
use crate::sender::Sender;

/// Free-form command metadata: a description plus arbitrary string entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandMeta {
    description: Cow<'static, str>,
    values: FxHashMap<Cow<'static, str>, String>,
}

impl CommandMeta {
    /// Empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata with a description.
    #[must_use]
    pub fn with_description(description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            description: description.into(),
            values: FxHashMap::default(),
        }
    }

    /// The command description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Stores an arbitrary entry.
    pub fn set(&mut self, key: impl Into<Cow<'static, str>>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Looks up an arbitrary entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Names a required sender subtype and checks senders against it.
pub struct SenderTypeRequirement<S: Sender> {
    name: &'static str,
    check: Arc<dyn Fn(&S) -> bool + Send + Sync>,
}

impl<S: Sender> Clone for SenderTypeRequirement<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            check: Arc::clone(&self.check),
        }
    }
}

impl<S: Sender> fmt::Debug for SenderTypeRequirement<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderTypeRequirement")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<S: Sender> SenderTypeRequirement<S> {
    /// Creates a requirement named `name`, satisfied when `check` passes.
    #[must_use]
    pub fn new(name: &'static str, check: impl Fn(&S) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name,
            check: Arc::new(check),
        }
    }

    /// The requirement's printable name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn test(&self, sender: &S) -> bool {
        (self.check)(sender)
    }
}

/// The function a matched command dispatches into.
pub enum CommandHandler<S: Sender> {
    /// A handler that completes before returning.
    Sync(Arc<dyn Fn(&mut CommandContext<S>) -> anyhow::Result<()> + Send + Sync>),
    /// A handler yielding a deferred outcome.
    Suspending(
        Arc<
            dyn for<'a> Fn(&'a mut CommandContext<S>) -> BoxFuture<'a, anyhow::Result<()>>
                + Send
                + Sync,
        >,
    ),
}

impl<S: Sender> fmt::Debug for CommandHandler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => write!(f, "CommandHandler::Sync(..)"),
            Self::Suspending(_) => write!(f, "CommandHandler::Suspending(..)"),
        }
    }
}

impl<S: Sender> Clone for CommandHandler<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(handler) => Self::Sync(Arc::clone(handler)),
            Self::Suspending(handler) => Self::Suspending(Arc::clone(handler)),
        }
    }
}

impl<S: Sender> CommandHandler<S> {
    pub(crate) async fn invoke(&self, ctx: &mut CommandContext<S>) -> anyhow::Result<()> {
        match self {
            Self::Sync(handler) => handler(ctx),
            Self::Suspending(handler) => handler(ctx).await,
        }
    }
}

/// An immutable command: an ordered component sequence, a handler, and its
/// gating metadata. Built via [`Command::builder`].
#[derive(Debug)]
pub struct Command<S: Sender> {
    components: Vec<Arc<CommandComponent<S>>>,
    handler: CommandHandler<S>,
    sender_type: Option<SenderTypeRequirement<S>>,
    permission: Permission<S>,
    meta: CommandMeta,
}

impl<S: Sender> Clone for Command<S> {
    fn clone(&self) -> Self {
        Self {
            components: self.components.clone(),
            handler: self.handler.clone(),
            sender_type: self.sender_type.clone(),
            permission: self.permission.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<S: Sender> Command<S> {
    /// Starts a builder for a command rooted at the literal `name`.
    #[must_use]
    pub fn builder(name: impl Into<Cow<'static, str>>) -> CommandBuilder<S> {
        CommandBuilder::new(name, None)
    }

    /// The ordered components, root literal first.
    #[must_use]
    pub fn components(&self) -> &[Arc<CommandComponent<S>>] {
        &self.components
    }

    /// The root literal's primary surface.
    #[must_use]
    pub fn root_surface(&self) -> &str {
        self.components[0].name()
    }

    /// The handler run on a successful parse.
    #[must_use]
    pub const fn handler(&self) -> &CommandHandler<S> {
        &self.handler
    }

    /// The required sender type, if the command declares one.
    #[must_use]
    pub const fn sender_type(&self) -> Option<&SenderTypeRequirement<S>> {
        self.sender_type.as_ref()
    }

    /// The permission gating the whole command.
    #[must_use]
    pub const fn permission(&self) -> &Permission<S> {
        &self.permission
    }

    /// The command metadata.
    #[must_use]
    pub const fn meta(&self) -> &CommandMeta {
        &self.meta
    }
}

/// Assembles a [`Command`] fluently; every mutator moves the builder.
///
/// Obtained from [`Command::builder`] or, with registry-backed type
/// inference, from
/// [`CommandManager::command_builder`](crate::manager::CommandManager::command_builder).
pub struct CommandBuilder<S: Sender> {
    components: Vec<CommandComponent<S>>,
    flags: Vec<CommandFlag<S>>,
    handler: Option<CommandHandler<S>>,
    sender_type: Option<SenderTypeRequirement<S>>,
    permission: Permission<S>,
    meta: CommandMeta,
    registry: Option<Arc<ParserRegistry<S>>>,
    errors: Vec<CommandBuildError>,
}

impl<S: Sender> CommandBuilder<S> {
    pub(crate) fn new(
        name: impl Into<Cow<'static, str>>,
        registry: Option<Arc<ParserRegistry<S>>>,
    ) -> Self {
        Self {
            components: vec![CommandComponent::literal(name)],
            flags: Vec::new(),
            handler: None,
            sender_type: None,
            permission: Permission::None,
            meta: CommandMeta::new(),
            registry,
            errors: Vec::new(),
        }
    }

    /// Adds an alias surface to the root literal.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<Cow<'static, str>>) -> Self {
        let root = self.components.remove(0);
        self.components.insert(0, root.with_alias(alias));
        self
    }

    /// Appends a literal component.
    #[must_use]
    pub fn literal(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.components.push(CommandComponent::literal(name));
        self
    }

    /// Appends a required argument component.
    #[must_use]
    pub fn required<P>(mut self, name: impl Into<Cow<'static, str>>, parser: P) -> Self
    where
        P: ArgumentParser<S> + 'static,
    {
        let value_type = ValueTypeTag::of::<P::Output>();
        self.components
            .push(CommandComponent::argument(name, AnyParser::new(parser), value_type));
        self
    }

    /// Appends a required argument component from a pre-erased parser.
    #[must_use]
    pub fn required_any(
        mut self,
        name: impl Into<Cow<'static, str>>,
        parser: AnyParser<S>,
        value_type: ValueTypeTag,
    ) -> Self {
        self.components
            .push(CommandComponent::argument(name, parser, value_type));
        self
    }

    /// Appends a required argument whose parser is inferred from the
    /// registry by value type.
    #[must_use]
    pub fn required_of<T: 'static>(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.inferred::<T>(name, true, None)
    }

    /// Appends an optional argument component without a default.
    #[must_use]
    pub fn optional<P>(mut self, name: impl Into<Cow<'static, str>>, parser: P) -> Self
    where
        P: ArgumentParser<S> + 'static,
    {
        let value_type = ValueTypeTag::of::<P::Output>();
        self.components.push(
            CommandComponent::argument(name, AnyParser::new(parser), value_type).optional(),
        );
        self
    }

    /// Appends an optional argument component with a default value.
    #[must_use]
    pub fn optional_default<P>(
        mut self,
        name: impl Into<Cow<'static, str>>,
        parser: P,
        default: DefaultValue<S>,
    ) -> Self
    where
        P: ArgumentParser<S> + 'static,
    {
        let value_type = ValueTypeTag::of::<P::Output>();
        self.components.push(
            CommandComponent::argument(name, AnyParser::new(parser), value_type)
                .with_default(default),
        );
        self
    }

    /// Appends an optional argument whose parser is inferred from the
    /// registry by value type.
    #[must_use]
    pub fn optional_of<T: 'static>(
        self,
        name: impl Into<Cow<'static, str>>,
        default: Option<DefaultValue<S>>,
    ) -> Self {
        self.inferred::<T>(name, false, default)
    }

    fn inferred<T: 'static>(
        mut self,
        name: impl Into<Cow<'static, str>>,
        required: bool,
        default: Option<DefaultValue<S>>,
    ) -> Self {
        let created = self
            .registry
            .as_ref()
            .and_then(|registry| registry.create::<T>(&ParserParameters::empty()));
        match created {
            Some(parser) => {
                let mut component =
                    CommandComponent::argument(name, parser, ValueTypeTag::of::<T>());
                if !required {
                    component = match default {
                        Some(default) => component.with_default(default),
                        None => component.optional(),
                    };
                }
                self.components.push(component);
            }
            None => self.errors.push(CommandBuildError::UnknownValueType {
                type_name: std::any::type_name::<T>(),
            }),
        }
        self
    }

    /// Adds a flag to the command's flag group. The group materializes as
    /// the final component at build time.
    #[must_use]
    pub fn flag(mut self, flag: CommandFlag<S>) -> Self {
        self.flags.push(flag);
        self
    }

    /// Attaches a suggestion override to the most recently added component.
    #[must_use]
    pub fn with_suggestions(
        mut self,
        provide: impl Fn(&CommandContext<S>, &str) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        if let Some(last) = self.components.pop() {
            self.components
                .push(last.with_suggestions(SuggestionProvider::new(provide)));
        }
        self
    }

    /// Attaches a description to the most recently added component.
    #[must_use]
    pub fn with_component_description(
        mut self,
        description: impl Into<Cow<'static, str>>,
    ) -> Self {
        if let Some(last) = self.components.pop() {
            self.components.push(last.with_description(description));
        }
        self
    }

    /// Attaches a permission to the most recently added component.
    #[must_use]
    pub fn with_component_permission(mut self, permission: Permission<S>) -> Self {
        if let Some(last) = self.components.pop() {
            self.components.push(last.with_permission(permission));
        }
        self
    }

    /// Gates the whole command behind a permission.
    #[must_use]
    pub fn permission(mut self, permission: Permission<S>) -> Self {
        self.permission = permission;
        self
    }

    /// Requires senders to satisfy a named predicate.
    #[must_use]
    pub fn sender_type(
        mut self,
        name: &'static str,
        check: impl Fn(&S) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.sender_type = Some(SenderTypeRequirement::new(name, check));
        self
    }

    /// Sets the command description.
    #[must_use]
    pub fn description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.meta.description = description.into();
        self
    }

    /// Stores an arbitrary metadata entry.
    #[must_use]
    pub fn meta(mut self, key: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        self.meta.set(key, value);
        self
    }

    /// Sets a synchronous handler.
    #[must_use]
    pub fn handler(
        mut self,
        handler: impl Fn(&mut CommandContext<S>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(CommandHandler::Sync(Arc::new(handler)));
        self
    }

    /// Sets a suspending handler.
    #[must_use]
    pub fn handler_async<F>(mut self, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut CommandContext<S>) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.handler = Some(CommandHandler::Suspending(Arc::new(handler)));
        self
    }

    /// Validates and assembles the command.
    pub fn build(mut self) -> Result<Command<S>, CommandBuildError> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }
        let Some(handler) = self.handler else {
            return Err(CommandBuildError::MissingHandler);
        };
        if !self.flags.is_empty() {
            let flags = FlagSet::new(self.flags)?;
            self.components.push(CommandComponent::flag_group(flags));
        }

        let mut seen_optional = false;
        let mut names: Vec<&str> = Vec::with_capacity(self.components.len());
        for component in &self.components {
            if names.contains(&component.name()) {
                return Err(CommandBuildError::DuplicateComponentName {
                    name: component.name().to_owned(),
                });
            }
            if component.required() && seen_optional {
                return Err(CommandBuildError::RequiredAfterOptional {
                    name: component.name().to_owned(),
                });
            }
            seen_optional = seen_optional || !component.required();
            names.push(component.name());
        }
        drop(names);

        Ok(Command {
            components: self.components.into_iter().map(Arc::new).collect(),
            handler,
            sender_type: self.sender_type,
            permission: self.permission,
            meta: self.meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::integer::IntegerParser;
    use crate::arguments::string::StringParser;

    fn handled(builder: CommandBuilder<()>) -> CommandBuilder<()> {
        builder.handler(|_| Ok(()))
    }

    #[test]
    fn builds_components_in_order() {
        let command = handled(
            Command::<()>::builder("give")
                .required("player", StringParser::single())
                .required("item", StringParser::single())
                .optional_default("amount", IntegerParser::new(), DefaultValue::constant(1_i64)),
        )
        .build()
        .unwrap();

        let names: Vec<&str> = command
            .components()
            .iter()
            .map(|component| component.name())
            .collect();
        assert_eq!(names, ["give", "player", "item", "amount"]);
        assert_eq!(command.root_surface(), "give");
        assert!(command.components()[3].default_value().is_some());
    }

    #[test]
    fn missing_handler_is_rejected() {
        let error = Command::<()>::builder("x").build().unwrap_err();
        assert_eq!(error, CommandBuildError::MissingHandler);
    }

    #[test]
    fn required_after_optional_is_rejected() {
        let error = handled(
            Command::<()>::builder("x")
                .optional("a", IntegerParser::new())
                .required("b", IntegerParser::new()),
        )
        .build()
        .unwrap_err();
        assert!(matches!(
            error,
            CommandBuildError::RequiredAfterOptional { name } if name == "b"
        ));
    }

    #[test]
    fn duplicate_component_names_are_rejected() {
        let error = handled(
            Command::<()>::builder("x")
                .required("a", IntegerParser::new())
                .required("a", IntegerParser::new()),
        )
        .build()
        .unwrap_err();
        assert!(matches!(
            error,
            CommandBuildError::DuplicateComponentName { name } if name == "a"
        ));
    }

    #[test]
    fn flag_group_lands_last() {
        let command = handled(
            Command::<()>::builder("mkdir")
                .required("name", StringParser::single())
                .flag(CommandFlag::presence("parents"))
                .flag(CommandFlag::with_value(
                    "mode",
                    AnyParser::new(IntegerParser::new()),
                )),
        )
        .build()
        .unwrap();
        let last = command.components().last().unwrap();
        assert!(last.is_flag_group());
        assert_eq!(last.flags().unwrap().len(), 2);
    }

    #[test]
    fn building_twice_yields_equal_shapes() {
        let build = || {
            handled(
                Command::<()>::builder("give")
                    .alias("g")
                    .description("Gives an item.")
                    .meta("category", "items")
                    .required("player", StringParser::single()),
            )
            .build()
            .unwrap()
        };
        let a = build();
        let b = build();
        assert_eq!(a.meta(), b.meta());
        let names = |command: &Command<()>| {
            command
                .components()
                .iter()
                .map(|component| component.name().to_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&a), names(&b));
        assert_eq!(
            a.sender_type().map(SenderTypeRequirement::name),
            b.sender_type().map(SenderTypeRequirement::name)
        );
    }
}
