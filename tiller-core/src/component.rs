//! Command components: the parsing units a command is a sequence of.
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::context::CommandContext;
use crate::flags::FlagSet;
use crate::parser::AnyParser;
use crate::permission::Permission;
use crate::sender::Sender;

/// A value type tag: a `TypeId` paired with a printable name, used for
/// registry lookups and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueTypeTag {
    id: TypeId,
    name: &'static str,
}

impl ValueTypeTag {
    /// The tag for the Rust type `T`.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The tagged type's name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) const fn id(&self) -> TypeId {
        self.id
    }
}

/// Supplies a value for an optional component the input did not provide.
pub struct DefaultValue<S: Sender> {
    supply: Arc<dyn Fn(&CommandContext<S>) -> Box<dyn Any + Send + Sync> + Send + Sync>,
}

impl<S: Sender> Clone for DefaultValue<S> {
    fn clone(&self) -> Self {
        Self {
            supply: Arc::clone(&self.supply),
        }
    }
}

impl<S: Sender> fmt::Debug for DefaultValue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefaultValue(..)")
    }
}

impl<S: Sender> DefaultValue<S> {
    /// A default that clones a fixed value.
    #[must_use]
    pub fn constant<T: Clone + Send + Sync + 'static>(value: T) -> Self {
        Self {
            supply: Arc::new(move |_| Box::new(value.clone())),
        }
    }

    /// A default computed from the invocation context.
    #[must_use]
    pub fn computed<T, F>(supply: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&CommandContext<S>) -> T + Send + Sync + 'static,
    {
        Self {
            supply: Arc::new(move |ctx| Box::new(supply(ctx))),
        }
    }

    pub(crate) fn produce(&self, ctx: &CommandContext<S>) -> Box<dyn Any + Send + Sync> {
        (self.supply)(ctx)
    }
}

/// Overrides a component parser's own suggestions.
pub struct SuggestionProvider<S: Sender> {
    provide: Arc<dyn Fn(&CommandContext<S>, &str) -> Vec<String> + Send + Sync>,
}

impl<S: Sender> Clone for SuggestionProvider<S> {
    fn clone(&self) -> Self {
        Self {
            provide: Arc::clone(&self.provide),
        }
    }
}

impl<S: Sender> fmt::Debug for SuggestionProvider<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SuggestionProvider(..)")
    }
}

impl<S: Sender> SuggestionProvider<S> {
    /// Wraps a suggestion function.
    #[must_use]
    pub fn new(provide: impl Fn(&CommandContext<S>, &str) -> Vec<String> + Send + Sync + 'static) -> Self {
        Self {
            provide: Arc::new(provide),
        }
    }

    pub(crate) fn provide(&self, ctx: &CommandContext<S>, partial: &str) -> Vec<String> {
        (self.provide)(ctx, partial)
    }
}

/// The three component variants the execution walk dispatches on.
#[derive(Debug)]
pub enum ComponentKind<S: Sender> {
    /// A fixed keyword, matched against its primary name or an alias.
    Literal {
        /// Alternative surfaces for this keyword.
        aliases: SmallVec<[Cow<'static, str>; 2]>,
    },
    /// A typed value produced by a parser.
    Argument {
        /// The parser producing the value.
        parser: AnyParser<S>,
        /// Tag of the produced value type.
        value_type: ValueTypeTag,
    },
    /// The single per-command component owning all flags.
    FlagGroup {
        /// The flags this group parses.
        flags: FlagSet<S>,
    },
}

impl<S: Sender> Clone for ComponentKind<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal { aliases } => Self::Literal {
                aliases: aliases.clone(),
            },
            Self::Argument { parser, value_type } => Self::Argument {
                parser: parser.clone(),
                value_type: *value_type,
            },
            Self::FlagGroup { flags } => Self::FlagGroup {
                flags: flags.clone(),
            },
        }
    }
}

/// One parsing unit within a command.
#[derive(Debug)]
pub struct CommandComponent<S: Sender> {
    name: Cow<'static, str>,
    kind: ComponentKind<S>,
    required: bool,
    default: Option<DefaultValue<S>>,
    description: Cow<'static, str>,
    suggestions: Option<SuggestionProvider<S>>,
    permission: Permission<S>,
}

impl<S: Sender> Clone for CommandComponent<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind.clone(),
            required: self.required,
            default: self.default.clone(),
            description: self.description.clone(),
            suggestions: self.suggestions.clone(),
            permission: self.permission.clone(),
        }
    }
}

impl<S: Sender> CommandComponent<S> {
    /// A required literal component.
    #[must_use]
    pub fn literal(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            kind: ComponentKind::Literal {
                aliases: SmallVec::new(),
            },
            required: true,
            default: None,
            description: Cow::Borrowed(""),
            suggestions: None,
            permission: Permission::None,
        }
    }

    /// A required argument component.
    #[must_use]
    pub fn argument(
        name: impl Into<Cow<'static, str>>,
        parser: AnyParser<S>,
        value_type: ValueTypeTag,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ComponentKind::Argument { parser, value_type },
            required: true,
            default: None,
            description: Cow::Borrowed(""),
            suggestions: None,
            permission: Permission::None,
        }
    }

    /// The flag-group component for a set of flags. Flag groups are never
    /// required.
    #[must_use]
    pub fn flag_group(flags: FlagSet<S>) -> Self {
        Self {
            name: Cow::Borrowed("flags"),
            kind: ComponentKind::FlagGroup { flags },
            required: false,
            default: None,
            description: Cow::Borrowed(""),
            suggestions: None,
            permission: Permission::None,
        }
    }

    /// Adds an alias surface. Only meaningful on literals.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<Cow<'static, str>>) -> Self {
        if let ComponentKind::Literal { aliases } = &mut self.kind {
            aliases.push(alias.into());
        }
        self
    }

    /// Marks this component optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Marks this component optional with a default value.
    #[must_use]
    pub fn with_default(mut self, default: DefaultValue<S>) -> Self {
        self.required = false;
        self.default = Some(default);
        self
    }

    /// Sets the component description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    /// Gates this component behind a permission.
    #[must_use]
    pub fn with_permission(mut self, permission: Permission<S>) -> Self {
        self.permission = permission;
        self
    }

    /// Overrides the parser's suggestions for this component.
    #[must_use]
    pub fn with_suggestions(mut self, suggestions: SuggestionProvider<S>) -> Self {
        self.suggestions = Some(suggestions);
        self
    }

    /// The component name, unique within its command.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_cow(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    /// The component's variant.
    #[must_use]
    pub const fn kind(&self) -> &ComponentKind<S> {
        &self.kind
    }

    /// Whether input for this component is mandatory.
    #[must_use]
    pub const fn required(&self) -> bool {
        self.required
    }

    /// The default value supplier, when one was declared.
    #[must_use]
    pub const fn default_value(&self) -> Option<&DefaultValue<S>> {
        self.default.as_ref()
    }

    /// The component description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The component's suggestion override, if any.
    #[must_use]
    pub const fn suggestion_override(&self) -> Option<&SuggestionProvider<S>> {
        self.suggestions.as_ref()
    }

    /// The permission gating this component.
    #[must_use]
    pub const fn permission(&self) -> &Permission<S> {
        &self.permission
    }

    /// Whether this is a literal component.
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        matches!(self.kind, ComponentKind::Literal { .. })
    }

    /// Whether this is an argument component.
    #[must_use]
    pub const fn is_argument(&self) -> bool {
        matches!(self.kind, ComponentKind::Argument { .. })
    }

    /// Whether this is the flag-group component.
    #[must_use]
    pub const fn is_flag_group(&self) -> bool {
        matches!(self.kind, ComponentKind::FlagGroup { .. })
    }

    /// The argument parser, for argument components.
    #[must_use]
    pub fn parser(&self) -> Option<&AnyParser<S>> {
        match &self.kind {
            ComponentKind::Argument { parser, .. } => Some(parser),
            _ => None,
        }
    }

    /// The value type tag, for argument components.
    #[must_use]
    pub fn value_type(&self) -> Option<ValueTypeTag> {
        match &self.kind {
            ComponentKind::Argument { value_type, .. } => Some(*value_type),
            _ => None,
        }
    }

    /// The owned flags, for flag-group components.
    #[must_use]
    pub fn flags(&self) -> Option<&FlagSet<S>> {
        match &self.kind {
            ComponentKind::FlagGroup { flags } => Some(flags),
            _ => None,
        }
    }

    /// Every surface a literal matches: its primary name, then its aliases.
    pub fn literal_surfaces(&self) -> impl Iterator<Item = &str> {
        let aliases = match &self.kind {
            ComponentKind::Literal { aliases } => aliases.as_slice(),
            _ => &[],
        };
        std::iter::once(self.name.as_ref()).chain(aliases.iter().map(Cow::as_ref))
    }

    /// Whether `token` matches this literal's primary name or an alias,
    /// case-sensitively.
    #[must_use]
    pub fn matches_literal(&self, token: &str) -> bool {
        self.is_literal() && self.literal_surfaces().any(|surface| surface == token)
    }

    /// Whether two literals share any surface.
    pub(crate) fn surfaces_intersect(&self, other: &Self) -> bool {
        self.literal_surfaces()
            .any(|surface| other.matches_literal(surface))
    }
}
