//! A floating point argument parser.
use tiller_utils::InputCursor;

use crate::context::CommandContext;
use crate::error::ParseFailure;
use crate::parser::ArgumentParser;
use crate::sender::Sender;

/// Parses a 64-bit floating point number from one token.
///
/// Can optionally have minimum and maximum bounds.
pub struct FloatParser {
    min: Option<f64>,
    max: Option<f64>,
}

impl FloatParser {
    /// Creates a new unbounded float parser.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    /// Creates a new float parser with bounds.
    #[must_use]
    pub const fn bounded(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }
}

impl Default for FloatParser {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sender> ArgumentParser<S> for FloatParser {
    type Output = f64;

    fn parse(
        &self,
        _ctx: &CommandContext<S>,
        input: &mut InputCursor<'_>,
    ) -> Result<Self::Output, ParseFailure> {
        let token = input.read_string()?;
        let value: f64 = token
            .parse()
            .map_err(|_| ParseFailure::new(format!("unparseable number {token:?}")))?;

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

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn context() -> CommandContext<()> {
        CommandContext::new((), String::new(), CancellationToken::new(), false)
    }

    #[test]
    fn parses_decimal_tokens() {
        let parser = FloatParser::new();
        let ctx = context();
        let mut cursor = InputCursor::new("0.5");
        let value = ArgumentParser::<()>::parse(&parser, &ctx, &mut cursor).unwrap();
        assert!((value - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn enforces_bounds() {
        let parser = FloatParser::bounded(Some(0.0), Some(1.0));
        let ctx = context();
        let mut cursor = InputCursor::new("1.5");
        assert!(ArgumentParser::<()>::parse(&parser, &ctx, &mut cursor).is_err());
    }
}
