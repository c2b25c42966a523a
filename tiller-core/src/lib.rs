//! # Tiller Core
//!
//! A general-purpose command framework: declare structured commands, match
//! free-form textual input against them, extract typed arguments, and
//! dispatch to handlers. The host supplies the sender type; the framework
//! handles tokenization, tree-based dispatch, argument and flag parsing,
//! suggestions, permissions and error reporting.

pub mod arguments;
pub mod command;
pub mod component;
pub mod context;
pub mod error;
pub mod flags;
pub mod manager;
pub mod parser;
pub mod permission;
pub mod processors;
pub mod registry;
pub mod sender;
pub mod settings;

mod execution;
mod suggestion;
mod tree;

pub use tiller_utils::CursorMark;
pub use tiller_utils::InputCursor;
pub use tiller_utils::InputError;

pub use command::Command;
pub use command::CommandBuilder;
pub use command::CommandHandler;
pub use command::CommandMeta;
pub use command::SenderTypeRequirement;
pub use component::CommandComponent;
pub use component::ComponentKind;
pub use component::DefaultValue;
pub use component::SuggestionProvider;
pub use component::ValueTypeTag;
pub use context::CommandContext;
pub use context::ContextKey;
pub use context::MissingValue;
pub use error::CommandBuildError;
pub use error::DispatchError;
pub use error::ErrorDisposition;
pub use error::ErrorKind;
pub use error::ExceptionHandler;
pub use error::ExceptionRouter;
pub use error::ParseFailure;
pub use error::RegistrationError;
pub use flags::CommandFlag;
pub use flags::FlagSet;
pub use manager::CommandManager;
pub use manager::RegistrationState;
pub use parser::AnyParser;
pub use parser::ArgumentParser;
pub use parser::ArgumentParserExt;
pub use parser::SuspendingParser;
pub use parser::combinators::FlatMappedParser;
pub use parser::combinators::MappedParser;
pub use parser::combinators::ThenParser;
pub use permission::Permission;
pub use processors::CommandPostprocessor;
pub use processors::CommandPreprocessor;
pub use processors::SuggestionProcessor;
pub use registry::ParameterValue;
pub use registry::ParserParameters;
pub use registry::ParserRegistry;
pub use sender::Sender;
pub use settings::ManagerSettings;
