//! An integer argument parser.
use tiller_utils::InputCursor;

use crate::context::CommandContext;
use crate::error::ParseFailure;
use crate::parser::ArgumentParser;
use crate::sender::Sender;

/// Parses a 64-bit signed integer from one token.
///
/// Can optionally have minimum and maximum bounds.
pub struct IntegerParser {
    min: Option<i64>,
    max: Option<i64>,
}

impl IntegerParser {
    /// Creates a new unbounded integer parser.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    /// Creates a new integer parser with bounds.
    #[must_use]
    pub const fn bounded(min: Option<i64>, max: Option<i64>) -> Self {
        Self { min, max }
    }
}

impl Default for IntegerParser {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sender> ArgumentParser<S> for IntegerParser {
    type Output = i64;

    fn parse(
        &self,
        _ctx: &CommandContext<S>,
        input: &mut InputCursor<'_>,
    ) -> Result<Self::Output, ParseFailure> {
        let token = input.read_string()?;
        let value: i64 = token
            .parse()
            .map_err(|_| ParseFailure::new(format!("unparseable integer {token:?}")))?;

        if let Some(min) = self.min
            && value < min
        {
            return Err(ParseFailure::new(format!(
                "{value} is below the minimum of {min}"
            )));
        }
        if let Some(max) = self.max
            && value > max
        {
            return Err(ParseFailure::new(format!(
                "{value} is above the maximum of {max}"
            )));
        }

        Ok(value)
    }

    fn context_free(&self) -> bool {
        true
    }
}
