//! A boolean argument parser.
use tiller_utils::InputCursor;

use crate::context::CommandContext;
use crate::error::ParseFailure;
use crate::parser::ArgumentParser;
use crate::sender::Sender;

/// Parses "true" or "false", case-insensitively.
pub struct BoolParser;

impl<S: Sender> ArgumentParser<S> for BoolParser {
    type Output = bool;

    fn parse(
        &self,
        _ctx: &CommandContext<S>,
        input: &mut InputCursor<'_>,
    ) -> Result<Self::Output, ParseFailure> {
        let token = input.read_string()?;
        match token.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ParseFailure::new(format!("{token:?} is not a boolean"))),
        }
    }

    fn suggest(&self, _ctx: &CommandContext<S>, _partial: &str) -> Vec<String> {
        vec!["true".to_owned(), "false".to_owned()]
    }

    fn context_free(&self) -> bool {
        true
    }
}
