//! The standard argument parser suite.
pub mod boolean;
pub mod float;
pub mod integer;
pub mod string;

use crate::arguments::boolean::BoolParser;
use crate::arguments::float::FloatParser;
use crate::arguments::integer::IntegerParser;
use crate::arguments::string::{StringMode, StringParser};
use crate::parser::AnyParser;
use crate::registry::{ParserRegistry, keys};
use crate::sender::Sender;

/// Registers the standard suite with a registry: `i64`, `f64`, `bool` and
/// `String`.
pub(crate) fn register_standard<S: Sender>(registry: &ParserRegistry<S>) {
    registry.register::<i64, _>(|parameters| {
        AnyParser::new(IntegerParser::bounded(
            parameters.integer(keys::MIN),
            parameters.integer(keys::MAX),
        ))
    });
    registry.register::<f64, _>(|parameters| {
        AnyParser::new(FloatParser::bounded(
            parameters.float(keys::MIN),
            parameters.float(keys::MAX),
        ))
    });
    registry.register::<bool, _>(|_| AnyParser::new(BoolParser));
    registry.register::<String, _>(|parameters| {
        let mode = if parameters.boolean(keys::GREEDY) == Some(true) {
            StringMode::Greedy
        } else if parameters.boolean(keys::QUOTED) == Some(true) {
            StringMode::Quoted
        } else {
            StringMode::Single
        };
        AnyParser::new(StringParser::with_mode(mode))
    });
}
