//! Parser combinators, composing parsers as values rather than hierarchies.
use tiller_utils::InputCursor;

use crate::context::CommandContext;
use crate::error::ParseFailure;
use crate::parser::ArgumentParser;
use crate::sender::Sender;

/// A parser whose output is transformed by a function.
///
/// Built by [`ArgumentParserExt::map`](crate::parser::ArgumentParserExt::map)
/// or directly via [`MappedParser::new`]. The direct constructor keeps the
/// sender type open, which helps inference when composing parsers that are
/// themselves generic over every sender.
pub struct MappedParser<P, F> {
    parser: P,
    transform: F,
}

impl<P, F> MappedParser<P, F> {
    /// Wraps `parser`, passing its output through `transform`.
    pub const fn new(parser: P, transform: F) -> Self {
        Self { parser, transform }
    }
}

impl<S, P, F, U> ArgumentParser<S> for MappedParser<P, F>
where
    S: Sender,
    P: ArgumentParser<S>,
    F: Fn(P::Output) -> U + Send + Sync,
    U: Send + Sync + 'static,
{
    type Output = U;

    fn parse(
        &self,
        ctx: &CommandContext<S>,
        input: &mut InputCursor<'_>,
    ) -> Result<Self::Output, ParseFailure> {
        self.parser.parse(ctx, input).map(&self.transform)
    }

    fn suggest(&self, ctx: &CommandContext<S>, partial: &str) -> Vec<String> {
        self.parser.suggest(ctx, partial)
    }

    fn context_free(&self) -> bool {
        self.parser.context_free()
    }

    fn greedy(&self) -> bool {
        self.parser.greedy()
    }
}

/// A parser whose output is transformed by a fallible function.
///
/// Built by
/// [`ArgumentParserExt::flat_map`](crate::parser::ArgumentParserExt::flat_map)
/// or directly via [`FlatMappedParser::new`].
pub struct FlatMappedParser<P, F> {
    parser: P,
    transform: F,
}

impl<P, F> FlatMappedParser<P, F> {
    /// Wraps `parser`, passing its output through the fallible `transform`.
    pub const fn new(parser: P, transform: F) -> Self {
        Self { parser, transform }
    }
}

impl<S, P, F, U> ArgumentParser<S> for FlatMappedParser<P, F>
where
    S: Sender,
    P: ArgumentParser<S>,
    F: Fn(P::Output) -> Result<U, ParseFailure> + Send + Sync,
    U: Send + Sync + 'static,
{
    type Output = U;

    fn parse(
        &self,
        ctx: &CommandContext<S>,
        input: &mut InputCursor<'_>,
    ) -> Result<Self::Output, ParseFailure> {
        self.parser.parse(ctx, input).and_then(&self.transform)
    }

    fn suggest(&self, ctx: &CommandContext<S>, partial: &str) -> Vec<String> {
        self.parser.suggest(ctx, partial)
    }

    fn context_free(&self) -> bool {
        self.parser.context_free()
    }

    fn greedy(&self) -> bool {
        self.parser.greedy()
    }
}

/// Two parsers in sequence, yielding both values as a pair.
///
/// Built by [`ArgumentParserExt::then`](crate::parser::ArgumentParserExt::then)
/// or directly via [`ThenParser::new`].
pub struct ThenParser<A, B> {
    first: A,
    second: B,
}

impl<A, B> ThenParser<A, B> {
    /// Runs `first`, then `second`, yielding both values.
    pub const fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<S, A, B> ArgumentParser<S> for ThenParser<A, B>
where
    S: Sender,
    A: ArgumentParser<S>,
    B: ArgumentParser<S>,
{
    type Output = (A::Output, B::Output);

    fn parse(
        &self,
        ctx: &CommandContext<S>,
        input: &mut InputCursor<'_>,
    ) -> Result<Self::Output, ParseFailure> {
        let first = self.first.parse(ctx, input)?;
        let second = self.second.parse(ctx, input)?;
        Ok((first, second))
    }

    fn suggest(&self, ctx: &CommandContext<S>, partial: &str) -> Vec<String> {
        // Complete the second half once the partial already satisfies the
        // first parser, otherwise complete the first.
        let mut cursor = InputCursor::new(partial);
        if self.first.parse(ctx, &mut cursor).is_ok() && cursor.position() > 0 {
            let remaining = cursor.remaining().to_owned();
            let consumed = &partial[..partial.len() - remaining.len()];
            return self
                .second
                .suggest(ctx, &remaining)
                .into_iter()
                .map(|suggestion| format!("{consumed}{suggestion}"))
                .collect();
        }
        self.first.suggest(ctx, partial)
    }

    fn greedy(&self) -> bool {
        self.second.greedy()
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::arguments::integer::IntegerParser;
    use crate::arguments::string::StringParser;

    fn context() -> CommandContext<()> {
        CommandContext::new((), String::new(), CancellationToken::new(), false)
    }

    #[test]
    fn map_transforms_the_value() {
        let parser = MappedParser::new(IntegerParser::new(), |value: i64| value * 2);
        let ctx = context();
        let mut cursor = InputCursor::new("21");
        assert_eq!(
            ArgumentParser::<()>::parse(&parser, &ctx, &mut cursor).unwrap(),
            42
        );
    }

    #[test]
    fn flat_map_can_reject() {
        let parser = FlatMappedParser::new(IntegerParser::new(), |value: i64| {
            if value % 2 == 0 {
                Ok(value)
            } else {
                Err(ParseFailure::new("expected an even number"))
            }
        });
        let ctx = context();
        let mut cursor = InputCursor::new("4 5");
        assert_eq!(
            ArgumentParser::<()>::parse(&parser, &ctx, &mut cursor).unwrap(),
            4
        );
        assert!(ArgumentParser::<()>::parse(&parser, &ctx, &mut cursor).is_err());
    }

    #[test]
    fn then_sequences_two_parsers() {
        let parser = ThenParser::new(StringParser::single(), IntegerParser::new());
        let ctx = context();
        let mut cursor = InputCursor::new("apple 64");
        let (item, amount) = ArgumentParser::<()>::parse(&parser, &ctx, &mut cursor).unwrap();
        assert_eq!(item, "apple");
        assert_eq!(amount, 64);
    }
}
