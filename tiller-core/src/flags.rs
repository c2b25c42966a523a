//! Flags: named side-channel parameters and the state machine parsing them.
use std::borrow::Cow;

use smallvec::SmallVec;
use tiller_utils::InputCursor;

use crate::context::CommandContext;
use crate::error::{CommandBuildError, DispatchError, ParseFailure};
use crate::parser::AnyParser;
use crate::permission::{Permission, PermissionChecker};
use crate::sender::Sender;
use crate::suggestion::starts_with_ignore_case;

/// A single flag: `--name`, `-n`, with or without a value.
///
/// Single-character surfaces (the primary name or an alias) double as short
/// forms usable in combined runs such as `-abc`.
#[derive(Debug)]
pub struct CommandFlag<S: Sender> {
    name: Cow<'static, str>,
    aliases: SmallVec<[Cow<'static, str>; 2]>,
    parser: Option<AnyParser<S>>,
    repeatable: bool,
    permission: Permission<S>,
    description: Cow<'static, str>,
}

impl<S: Sender> Clone for CommandFlag<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            aliases: self.aliases.clone(),
            parser: self.parser.clone(),
            repeatable: self.repeatable,
            permission: self.permission.clone(),
            description: self.description.clone(),
        }
    }
}

impl<S: Sender> CommandFlag<S> {
    /// A presence flag: it carries no value, only an occurrence count.
    #[must_use]
    pub fn presence(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            aliases: SmallVec::new(),
            parser: None,
            repeatable: false,
            permission: Permission::None,
            description: Cow::Borrowed(""),
        }
    }

    /// A value flag: the token after it is parsed by `parser`.
    #[must_use]
    pub fn with_value(name: impl Into<Cow<'static, str>>, parser: AnyParser<S>) -> Self {
        Self {
            name: name.into(),
            aliases: SmallVec::new(),
            parser: Some(parser),
            repeatable: false,
            permission: Permission::None,
            description: Cow::Borrowed(""),
        }
    }

    /// Adds an alias surface. Single-character aliases double as short
    /// forms.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<Cow<'static, str>>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Permits this flag to appear more than once.
    #[must_use]
    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    /// Gates this flag behind a permission. Gated flags are omitted from
    /// suggestions and rejected in input for senders lacking the
    /// permission.
    #[must_use]
    pub fn permission(mut self, permission: Permission<S>) -> Self {
        self.permission = permission;
        self
    }

    /// Sets the flag description.
    #[must_use]
    pub fn description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    /// The flag's primary name. Values and occurrence counts are recorded
    /// under it regardless of the surface used in the input.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_cow(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    /// The flag's alias surfaces.
    #[must_use]
    pub fn aliases(&self) -> &[Cow<'static, str>] {
        &self.aliases
    }

    /// Whether this flag carries no value.
    #[must_use]
    pub const fn is_presence(&self) -> bool {
        self.parser.is_none()
    }

    /// Whether this flag may appear more than once.
    #[must_use]
    pub const fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    /// The permission gating this flag.
    #[must_use]
    pub const fn flag_permission(&self) -> &Permission<S> {
        &self.permission
    }

    /// The value parser, for value flags.
    #[must_use]
    pub const fn value_parser(&self) -> Option<&AnyParser<S>> {
        self.parser.as_ref()
    }

    /// Every surface this flag answers to.
    pub(crate) fn surfaces(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_ref()).chain(self.aliases.iter().map(Cow::as_ref))
    }

    /// Whether `name` matches this flag's long form.
    pub(crate) fn matches_long(&self, name: &str) -> bool {
        self.surfaces().any(|surface| surface == name)
    }

    /// The single-character surfaces usable as short forms.
    pub(crate) fn short_names(&self) -> impl Iterator<Item = char> {
        self.surfaces().filter_map(|surface| {
            let mut chars = surface.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        })
    }

    /// The surfaces longer than one character, suggested with `--`.
    pub(crate) fn long_names(&self) -> impl Iterator<Item = &str> {
        self.surfaces().filter(|surface| surface.chars().count() > 1)
    }
}

/// The ordered, name-unique set of flags owned by one flag group.
#[derive(Debug)]
pub struct FlagSet<S: Sender> {
    flags: Vec<CommandFlag<S>>,
}

impl<S: Sender> Clone for FlagSet<S> {
    fn clone(&self) -> Self {
        Self {
            flags: self.flags.clone(),
        }
    }
}

impl<S: Sender> FlagSet<S> {
    /// Builds a set, rejecting duplicate surfaces.
    pub fn new(flags: Vec<CommandFlag<S>>) -> Result<Self, CommandBuildError> {
        let mut seen: Vec<&str> = Vec::new();
        for flag in &flags {
            for surface in flag.surfaces() {
                if seen.contains(&surface) {
                    return Err(CommandBuildError::DuplicateFlagName {
                        name: surface.to_owned(),
                    });
                }
                seen.push(surface);
            }
        }
        Ok(Self { flags })
    }

    /// The flags in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, CommandFlag<S>> {
        self.flags.iter()
    }

    /// The number of flags in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub(crate) fn lookup_long(&self, name: &str) -> Option<&CommandFlag<S>> {
        self.flags.iter().find(|flag| flag.matches_long(name))
    }

    pub(crate) fn lookup_short(&self, short: char) -> Option<&CommandFlag<S>> {
        self.flags
            .iter()
            .find(|flag| flag.short_names().any(|c| c == short))
    }

    /// Flag-name suggestions for a `-`-prefixed partial token. Long names
    /// only when the partial starts with `--`; gated flags are silently
    /// omitted.
    pub(crate) fn suggest_names(
        &self,
        ctx: &CommandContext<S>,
        checker: &PermissionChecker<S>,
        partial: &str,
    ) -> Vec<String> {
        let long_only = partial.starts_with("--");
        let mut out = Vec::new();
        for flag in &self.flags {
            if !flag.permission.evaluate(ctx.sender(), checker) {
                continue;
            }
            for name in flag.long_names() {
                let surface = format!("--{name}");
                if starts_with_ignore_case(&surface, partial) {
                    out.push(surface);
                }
            }
            if !long_only {
                for short in flag.short_names() {
                    let surface = format!("-{short}");
                    if starts_with_ignore_case(&surface, partial) {
                        out.push(surface);
                    }
                }
            }
        }
        out
    }
}

/// Walks flag tokens off the cursor for one flag group.
///
/// The machine seeks flag tokens, detours through a value state after a
/// value flag, and terminates on `--`, end of input, or (outside strict
/// mode) the first token it cannot own.
pub(crate) struct FlagWalker<'f, S: Sender> {
    flags: &'f FlagSet<S>,
    strict: bool,
}

impl<'f, S: Sender> FlagWalker<'f, S> {
    /// `strict` is set at the flag-group position proper, where a dash
    /// token that resolves to no flag is an error rather than a yield.
    pub(crate) const fn new(flags: &'f FlagSet<S>, strict: bool) -> Self {
        Self { flags, strict }
    }

    /// Consumes as many flag tokens as the input provides.
    pub(crate) async fn consume(
        &self,
        ctx: &mut CommandContext<S>,
        cursor: &mut InputCursor<'_>,
        checker: &PermissionChecker<S>,
    ) -> Result<(), DispatchError> {
        loop {
            if !cursor.has_remaining() {
                return Ok(());
            }
            let mark = cursor.mark();
            let Ok(token) = cursor.peek_string() else {
                // A malformed quoted token is not ours to report.
                return Ok(());
            };
            if token == "--" {
                let _ = cursor.read_string();
                return Ok(());
            }
            if let Some(name) = token.strip_prefix("--") {
                let name = name.to_owned();
                let _ = cursor.read_string();
                let Some(flag) = self.flags.lookup_long(&name) else {
                    if self.strict {
                        return Err(DispatchError::FlagParse {
                            flag: name,
                            reason: ParseFailure::new("unknown flag"),
                        });
                    }
                    cursor.restore(mark);
                    return Ok(());
                };
                self.record(flag, ctx, cursor, checker).await?;
            } else if token.starts_with('-') && token.chars().count() > 1 {
                let shorts: Vec<char> = token.chars().skip(1).collect();
                let mut resolved: Vec<&CommandFlag<S>> = Vec::with_capacity(shorts.len());
                let mut unknown = None;
                for short in &shorts {
                    match self.flags.lookup_short(*short) {
                        Some(flag) => resolved.push(flag),
                        None => {
                            unknown = Some(*short);
                            break;
                        }
                    }
                }
                if let Some(short) = unknown {
                    if self.strict {
                        return Err(DispatchError::FlagParse {
                            flag: short.to_string(),
                            reason: ParseFailure::new("unknown flag"),
                        });
                    }
                    return Ok(());
                }
                let _ = cursor.read_string();
                let last = resolved.len() - 1;
                for (index, flag) in resolved.into_iter().enumerate() {
                    if flag.is_presence() {
                        self.record(flag, ctx, cursor, checker).await?;
                    } else if index == last {
                        self.record(flag, ctx, cursor, checker).await?;
                    } else {
                        return Err(DispatchError::FlagParse {
                            flag: flag.name().to_owned(),
                            reason: ParseFailure::new(
                                "a value flag may only end a combined short run",
                            ),
                        });
                    }
                }
            } else {
                return Ok(());
            }
        }
    }

    /// Records one resolved flag, reading its value when it takes one.
    async fn record(
        &self,
        flag: &CommandFlag<S>,
        ctx: &mut CommandContext<S>,
        cursor: &mut InputCursor<'_>,
        checker: &PermissionChecker<S>,
    ) -> Result<(), DispatchError> {
        if !flag.permission.evaluate(ctx.sender(), checker) {
            return Err(DispatchError::NoPermission {
                permission: flag.permission.describe(),
            });
        }
        if !flag.is_repeatable() && ctx.flag_present(flag.name()) {
            return Err(DispatchError::FlagParse {
                flag: flag.name().to_owned(),
                reason: ParseFailure::new("duplicate flag"),
            });
        }
        let Some(parser) = flag.value_parser() else {
            ctx.record_flag_presence(flag.name_cow());
            return Ok(());
        };
        if !cursor.has_remaining() {
            return Err(DispatchError::FlagParse {
                flag: flag.name().to_owned(),
                reason: ParseFailure::new("missing flag value"),
            });
        }
        let mark = cursor.mark();
        match parser.parse_value(ctx, cursor).await {
            Ok(value) => {
                ctx.record_flag_value(flag.name_cow(), value);
                Ok(())
            }
            Err(reason) => {
                cursor.restore(mark);
                Err(DispatchError::FlagParse {
                    flag: flag.name().to_owned(),
                    reason,
                })
            }
        }
    }
}
