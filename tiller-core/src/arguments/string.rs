//! A string argument parser.
use tiller_utils::InputCursor;

use crate::context::CommandContext;
use crate::error::ParseFailure;
use crate::parser::ArgumentParser;
use crate::sender::Sender;

/// How much input a [`StringParser`] consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMode {
    /// One space-delimited word, quotes left verbatim.
    Single,
    /// One token, decoding quoted tokens spanning spaces.
    Quoted,
    /// Everything remaining on the line.
    Greedy,
}

/// Parses a string in one of three modes.
pub struct StringParser {
    mode: StringMode,
}

impl StringParser {
    /// A parser for one bare word.
    #[must_use]
    pub const fn single() -> Self {
        Self {
            mode: StringMode::Single,
        }
    }

    /// A parser accepting quoted tokens.
    #[must_use]
    pub const fn quoted() -> Self {
        Self {
            mode: StringMode::Quoted,
        }
    }

    /// A parser consuming the rest of the input.
    #[must_use]
    pub const fn greedy() -> Self {
        Self {
            mode: StringMode::Greedy,
        }
    }

    /// A parser for an explicit mode.
    #[must_use]
    pub const fn with_mode(mode: StringMode) -> Self {
        Self { mode }
    }

    /// This parser's mode.
    #[must_use]
    pub const fn mode(&self) -> StringMode {
        self.mode
    }
}

impl<S: Sender> ArgumentParser<S> for StringParser {
    type Output = String;

    fn parse(
        &self,
        _ctx: &CommandContext<S>,
        input: &mut InputCursor<'_>,
    ) -> Result<Self::Output, ParseFailure> {
        match self.mode {
            StringMode::Single => Ok(input.read_word()?.to_owned()),
            StringMode::Quoted => Ok(input.read_string()?.into_owned()),
            StringMode::Greedy => {
                let remaining = input.read_remaining();
                if remaining.is_empty() {
                    return Err(ParseFailure::new("expected a string"));
                }
                Ok(remaining.to_owned())
            }
        }
    }

    fn context_free(&self) -> bool {
        true
    }

    fn greedy(&self) -> bool {
        matches!(self.mode, StringMode::Greedy)
    }
}
