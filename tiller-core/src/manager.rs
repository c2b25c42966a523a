//! The manager: owns the tree, registry, engines, processors and policy.
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use tiller_utils::InputCursor;
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandBuilder};
use crate::context::CommandContext;
use crate::error::{
    DispatchError, ErrorKind, ExceptionHandler, ExceptionRouter, RegistrationError,
};
use crate::execution::{self, WalkEnv};
use crate::parser::AnyParser;
use crate::permission::PermissionChecker;
use crate::processors::{
    CommandPostprocessor, CommandPreprocessor, ProcessorChain, SuggestionProcessor,
};
use crate::registry::{ParserParameters, ParserRegistry};
use crate::sender::Sender;
use crate::settings::ManagerSettings;
use crate::suggestion;
use crate::tree::CommandTree;

/// Where a manager is in its registration lifecycle.
///
/// The lifecycle only moves forward: `Before` on creation, `During` once
/// the first command registers, `After` once registration locks. `After` is
/// terminal unless unsafe registration is enabled in the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// No command has been registered yet.
    Before,
    /// Commands are being registered.
    During,
    /// Registration is locked; the tree is read-only.
    After,
}

impl RegistrationState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Before,
            1 => Self::During,
            _ => Self::After,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Before => 0,
            Self::During => 1,
            Self::After => 2,
        }
    }
}

/// The central orchestrator of a command framework instance.
///
/// Holds the command tree, the parser registry, the processor chains, the
/// exception router and the settings. Multiple managers coexist freely;
/// there is no global state. Dispatch runs against an atomic snapshot of
/// the tree, so concurrent executions tolerate concurrent registration
/// exactly as well as the registration lifecycle advertises.
pub struct CommandManager<S: Sender> {
    tree: ArcSwap<CommandTree<S>>,
    registry: Arc<ParserRegistry<S>>,
    preprocessors: ProcessorChain<dyn CommandPreprocessor<S>>,
    postprocessors: ProcessorChain<dyn CommandPostprocessor<S>>,
    suggestion_processors: ProcessorChain<dyn SuggestionProcessor<S>>,
    router: ExceptionRouter<S>,
    settings: RwLock<ManagerSettings>,
    state: AtomicU8,
    permission_checker: RwLock<PermissionChecker<S>>,
}

impl<S: Sender> Default for CommandManager<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sender> CommandManager<S> {
    /// Creates a manager with default settings and the standard parser
    /// suite.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: ArcSwap::from_pointee(CommandTree::new()),
            registry: Arc::new(ParserRegistry::with_standard_parsers()),
            preprocessors: ProcessorChain::new(),
            postprocessors: ProcessorChain::new(),
            suggestion_processors: ProcessorChain::new(),
            router: ExceptionRouter::new(),
            settings: RwLock::new(ManagerSettings::default()),
            state: AtomicU8::new(RegistrationState::Before.as_u8()),
            permission_checker: RwLock::new(Arc::new(|_, _| true)),
        }
    }

    /// Creates a manager with explicit settings.
    #[must_use]
    pub fn with_settings(settings: ManagerSettings) -> Self {
        let manager = Self::new();
        *manager.settings.write() = settings;
        manager
    }

    /// The current registration lifecycle state.
    #[must_use]
    pub fn state(&self) -> RegistrationState {
        RegistrationState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// A copy of the current settings.
    #[must_use]
    pub fn settings(&self) -> ManagerSettings {
        *self.settings.read()
    }

    /// Mutates the settings in place.
    pub fn update_settings(&self, update: impl FnOnce(&mut ManagerSettings)) {
        update(&mut self.settings.write());
    }

    /// Installs the permission checker consulted for node permissions.
    /// The default checker grants everything.
    pub fn set_permission_checker(
        &self,
        checker: impl Fn(&S, &str) -> bool + Send + Sync + 'static,
    ) {
        *self.permission_checker.write() = Arc::new(checker);
    }

    /// The parser registry backing typed argument inference.
    #[must_use]
    pub fn registry(&self) -> &ParserRegistry<S> {
        &self.registry
    }

    /// Registers a parser factory for the value type `T`.
    pub fn register_parser<T, F>(&self, factory: F)
    where
        T: 'static,
        F: Fn(&ParserParameters) -> AnyParser<S> + Send + Sync + 'static,
    {
        self.registry.register::<T, F>(factory);
    }

    /// Creates a parser for `T` from the registry.
    #[must_use]
    pub fn parser<T: 'static>(&self, parameters: &ParserParameters) -> Option<AnyParser<S>> {
        self.registry.create::<T>(parameters)
    }

    /// Starts a command builder wired to this manager's registry, so
    /// arguments can be declared by value type alone.
    #[must_use]
    pub fn command_builder(&self, name: &'static str) -> CommandBuilder<S> {
        CommandBuilder::new(name, Some(Arc::clone(&self.registry)))
    }

    /// Prepends a preprocessor to the chain (LIFO order).
    pub fn register_preprocessor(&self, processor: impl CommandPreprocessor<S> + 'static) {
        self.preprocessors.push(Arc::new(processor));
    }

    /// Prepends a postprocessor to the chain (LIFO order).
    pub fn register_postprocessor(&self, processor: impl CommandPostprocessor<S> + 'static) {
        self.postprocessors.push(Arc::new(processor));
    }

    /// Prepends a suggestion processor to the pipeline (LIFO order).
    pub fn register_suggestion_processor(
        &self,
        processor: impl SuggestionProcessor<S> + 'static,
    ) {
        self.suggestion_processors.push(Arc::new(processor));
    }

    /// The exception routing table.
    #[must_use]
    pub fn exceptions(&self) -> &ExceptionRouter<S> {
        &self.router
    }

    /// Installs an exception handler for one error kind.
    pub fn on_error(&self, kind: ErrorKind, handler: impl ExceptionHandler<S> + 'static) {
        self.router.install(kind, handler);
    }

    fn ensure_mutable(&self) -> Result<(), RegistrationError> {
        match self.state() {
            RegistrationState::After => {
                if self.settings().allow_unsafe_registration {
                    Ok(())
                } else {
                    Err(RegistrationError::RegistrationLocked)
                }
            }
            RegistrationState::Before => {
                self.state
                    .store(RegistrationState::During.as_u8(), Ordering::SeqCst);
                Ok(())
            }
            RegistrationState::During => Ok(()),
        }
    }

    /// Registers a command into the tree.
    pub fn register(&self, command: Command<S>) -> Result<(), RegistrationError> {
        self.ensure_mutable()?;
        let command = Arc::new(command);
        let surface = command.root_surface().to_owned();
        let override_existing = self.settings().override_existing_commands;
        let mut tree = (**self.tree.load()).clone();
        tree.insert(command, override_existing)?;
        self.tree.store(Arc::new(tree));
        tracing::debug!(command = %surface, "registered command");
        Ok(())
    }

    /// Deletes the root command matching `name`. Returns whether anything
    /// was removed.
    pub fn delete_root(&self, name: &str) -> Result<bool, RegistrationError> {
        self.ensure_mutable()?;
        let mut tree = (**self.tree.load()).clone();
        let removed = tree.delete_root(name);
        if removed {
            self.tree.store(Arc::new(tree));
            tracing::debug!(command = name, "deleted root command");
        }
        Ok(removed)
    }

    /// Validates the tree for ambiguity and locks registration.
    pub fn lock_registration(&self) -> Result<(), RegistrationError> {
        self.tree.load().validate()?;
        self.state
            .store(RegistrationState::After.as_u8(), Ordering::SeqCst);
        Ok(())
    }

    /// Dispatches a line of input for `sender`.
    ///
    /// On success the invocation context is returned with every component
    /// and flag bound. Failures are routed through the exception table
    /// before being returned.
    pub async fn execute(
        &self,
        sender: S,
        input: impl Into<String>,
    ) -> Result<CommandContext<S>, DispatchError> {
        self.execute_cancellable(sender, input, CancellationToken::new())
            .await
    }

    /// As [`execute`](Self::execute), cancellable through the given token.
    /// A cancelled invocation never reaches postprocessors or the handler.
    pub async fn execute_cancellable(
        &self,
        sender: S,
        input: impl Into<String>,
        cancellation: CancellationToken,
    ) -> Result<CommandContext<S>, DispatchError> {
        let mut raw = input.into();
        let mut ctx = CommandContext::new(sender, raw.clone(), cancellation, false);
        match self.dispatch_inner(&mut ctx, &mut raw).await {
            Ok(()) => Ok(ctx),
            Err(error) => {
                self.router.route(ctx.sender(), &error);
                Err(error)
            }
        }
    }

    async fn dispatch_inner(
        &self,
        ctx: &mut CommandContext<S>,
        raw: &mut String,
    ) -> Result<(), DispatchError> {
        let preprocessors = self.preprocessors.snapshot();
        for processor in preprocessors.iter() {
            processor.process(ctx, raw)?;
        }
        ctx.set_raw_input(raw.clone());
        if raw.trim().is_empty() {
            return Err(DispatchError::InvalidSyntax {
                expected: "a command".to_owned(),
                position: 0,
            });
        }
        let tree = self.tree.load_full();
        let settings = self.settings();
        let checker = self.permission_checker.read().clone();
        let postprocessors = self.postprocessors.snapshot();
        let env = WalkEnv {
            tree: &tree,
            settings,
            checker,
            postprocessors: postprocessors.as_slice(),
        };
        let mut cursor = InputCursor::new(raw);
        execution::dispatch(&env, ctx, &mut cursor).await
    }

    /// Produces completion candidates for an in-progress input line.
    ///
    /// The request never mutates the tree, the registry or the processor
    /// chains.
    pub async fn suggest(&self, sender: S, input: impl Into<String>) -> Vec<String> {
        let mut raw = input.into();
        let mut ctx = CommandContext::new(sender, raw.clone(), CancellationToken::new(), true);
        let preprocessors = self.preprocessors.snapshot();
        for processor in preprocessors.iter() {
            if processor.process(&mut ctx, &mut raw).is_err() {
                return self.finish_suggestions(&ctx, Vec::new());
            }
        }
        ctx.set_raw_input(raw.clone());
        let tree = self.tree.load_full();
        let settings = self.settings();
        let checker = self.permission_checker.read().clone();
        let env = WalkEnv {
            tree: &tree,
            settings,
            checker,
            postprocessors: &[],
        };
        let gathered = suggestion::suggest(&env, &mut ctx, &raw).await;
        self.finish_suggestions(&ctx, gathered)
    }

    fn finish_suggestions(
        &self,
        ctx: &CommandContext<S>,
        mut suggestions: Vec<String>,
    ) -> Vec<String> {
        let processors = self.suggestion_processors.snapshot();
        for processor in processors.iter() {
            suggestions = processor.process(ctx, suggestions);
        }
        if suggestions.is_empty() && self.settings().force_suggestion {
            suggestions.push(String::new());
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use futures::future::BoxFuture;

    use super::*;
    use crate::arguments::integer::IntegerParser;
    use crate::arguments::string::StringParser;
    use crate::component::{DefaultValue, ValueTypeTag};
    use crate::error::{ErrorDisposition, ParseFailure};
    use crate::flags::CommandFlag;
    use crate::parser::SuspendingParser;
    use crate::permission::Permission;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestSender {
        Console,
        Player(&'static str),
        Admin,
    }

    fn give_manager() -> CommandManager<TestSender> {
        let manager = CommandManager::new();
        manager
            .register(
                Command::builder("give")
                    .required("player", StringParser::single())
                    .with_suggestions(|_, _| vec!["alice".to_owned(), "bob".to_owned()])
                    .required("item", StringParser::single())
                    .optional_default(
                        "amount",
                        IntegerParser::new(),
                        DefaultValue::constant(1_i64),
                    )
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        manager
    }

    fn mkdir_manager() -> CommandManager<TestSender> {
        let manager = CommandManager::new();
        manager
            .register(
                Command::builder("mkdir")
                    .required("name", StringParser::single())
                    .flag(CommandFlag::presence("parents").alias("p"))
                    .flag(
                        CommandFlag::with_value("mode", AnyParser::new(IntegerParser::new()))
                            .alias("m"),
                    )
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        manager
    }

    #[tokio::test]
    async fn optional_component_defaults_when_absent() {
        let manager = give_manager();
        let ctx = manager
            .execute(TestSender::Admin, "give alice apple")
            .await
            .unwrap();
        assert_eq!(ctx.get::<String>("player").unwrap(), "alice");
        assert_eq!(ctx.get::<String>("item").unwrap(), "apple");
        assert_eq!(ctx.get::<i64>("amount"), Some(&1));
    }

    #[tokio::test]
    async fn optional_component_binds_provided_value() {
        let manager = give_manager();
        let ctx = manager
            .execute(TestSender::Admin, "give alice apple 64")
            .await
            .unwrap();
        assert_eq!(ctx.get::<i64>("amount"), Some(&64));
    }

    #[tokio::test]
    async fn missing_required_component_is_invalid_syntax() {
        let manager = give_manager();
        let error = manager
            .execute(TestSender::Admin, "give alice")
            .await
            .unwrap_err();
        match error {
            DispatchError::InvalidSyntax { expected, position } => {
                assert_eq!(position, 10);
                assert!(expected.contains("item"), "unexpected hint {expected:?}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn excess_tokens_are_too_many_arguments() {
        let manager = CommandManager::new();
        manager
            .register(
                Command::builder("foo")
                    .required("n", IntegerParser::new())
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let error = manager
            .execute(TestSender::Console, "foo 1 2")
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            DispatchError::InvalidSyntax { expected, .. } if expected.contains("too many arguments")
        ));
    }

    #[tokio::test]
    async fn sender_type_requirement_is_enforced() {
        let manager = CommandManager::new();
        manager
            .register(
                Command::builder("tp")
                    .required("target", StringParser::single())
                    .sender_type("player", |sender: &TestSender| {
                        matches!(sender, TestSender::Player(_))
                    })
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let error = manager
            .execute(TestSender::Console, "tp bob")
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            DispatchError::InvalidSenderType { required: "player" }
        ));

        manager
            .execute(TestSender::Player("alice"), "tp bob")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn flags_bind_presence_and_values() {
        let manager = mkdir_manager();
        let ctx = manager
            .execute(TestSender::Admin, "mkdir foo --parents --mode 755")
            .await
            .unwrap();
        assert_eq!(ctx.get::<String>("name").unwrap(), "foo");
        assert!(ctx.flag_present("parents"));
        assert_eq!(ctx.flag_value::<i64>("mode"), Some(&755));
    }

    #[tokio::test]
    async fn flag_value_parse_failure_surfaces_the_flag() {
        let manager = mkdir_manager();
        let error = manager
            .execute(TestSender::Admin, "mkdir foo --mode abc")
            .await
            .unwrap_err();
        match error {
            DispatchError::FlagParse { flag, reason } => {
                assert_eq!(flag, "mode");
                assert!(reason.message().contains("unparseable integer"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn liberal_mode_accepts_interleaved_flags() {
        let manager = mkdir_manager();
        manager.update_settings(|settings| settings.liberal_flag_parsing = true);
        let ctx = manager
            .execute(TestSender::Admin, "mkdir --parents foo --mode 700")
            .await
            .unwrap();
        assert_eq!(ctx.get::<String>("name").unwrap(), "foo");
        assert!(ctx.flag_present("parents"));
        assert_eq!(ctx.flag_value::<i64>("mode"), Some(&700));
    }

    #[tokio::test]
    async fn literal_prefix_suggestions_come_first() {
        let manager = give_manager();
        manager
            .register(
                Command::builder("gift")
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let suggestions = manager.suggest(TestSender::Admin, "gi").await;
        assert_eq!(suggestions, ["give", "gift"]);
    }

    #[tokio::test]
    async fn argument_suggestions_come_from_the_provider() {
        let manager = give_manager();
        let suggestions = manager.suggest(TestSender::Admin, "give ").await;
        assert_eq!(suggestions, ["alice", "bob"]);

        let suggestions = manager.suggest(TestSender::Admin, "give a").await;
        assert_eq!(suggestions, ["alice"]);
    }

    #[tokio::test]
    async fn flag_suggestions_follow_dash_shape() {
        let manager = mkdir_manager();
        let suggestions = manager.suggest(TestSender::Admin, "mkdir foo --").await;
        assert_eq!(suggestions, ["--parents", "--mode"]);

        let suggestions = manager.suggest(TestSender::Admin, "mkdir foo -").await;
        assert!(suggestions.contains(&"-p".to_owned()));
        assert!(suggestions.contains(&"--mode".to_owned()));
    }

    #[tokio::test]
    async fn empty_input_is_invalid_syntax_at_zero() {
        let manager = give_manager();
        for input in ["", "   "] {
            let error = manager
                .execute(TestSender::Admin, input)
                .await
                .unwrap_err();
            assert!(matches!(
                error,
                DispatchError::InvalidSyntax { position: 0, .. }
            ));
        }
    }

    #[tokio::test]
    async fn unknown_root_surface_is_unknown_command() {
        let manager = give_manager();
        let error = manager
            .execute(TestSender::Admin, "take alice apple")
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            DispatchError::UnknownCommand { input } if input == "take"
        ));
    }

    #[tokio::test]
    async fn denied_permission_beats_unknown_command() {
        let manager = CommandManager::new();
        manager
            .register(
                Command::builder("stop")
                    .permission(Permission::node("admin.stop"))
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        manager.set_permission_checker(|sender: &TestSender, _| {
            matches!(sender, TestSender::Admin)
        });

        let error = manager
            .execute(TestSender::Console, "stop")
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            DispatchError::NoPermission { permission } if permission == "admin.stop"
        ));

        manager.execute(TestSender::Admin, "stop").await.unwrap();
    }

    #[tokio::test]
    async fn handler_errors_are_wrapped_as_execution_failures() {
        let manager: CommandManager<TestSender> = CommandManager::new();
        manager
            .register(
                Command::builder("explode")
                    .handler(|_| Err(anyhow::anyhow!("kaboom")))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let error = manager
            .execute(TestSender::Admin, "explode")
            .await
            .unwrap_err();
        assert!(matches!(error, DispatchError::Execution(_)));
    }

    #[tokio::test]
    async fn exception_router_sees_dispatch_failures() {
        let manager = give_manager();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        manager.on_error(
            ErrorKind::UnknownCommand,
            move |_: &TestSender, _: &DispatchError| {
                seen.fetch_add(1, Ordering::SeqCst);
                ErrorDisposition::Handled
            },
        );
        let _ = manager.execute(TestSender::Admin, "nope").await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registration_locks_and_can_be_reopened_unsafely() {
        let manager = give_manager();
        assert_eq!(manager.state(), RegistrationState::During);
        manager.lock_registration().unwrap();
        assert_eq!(manager.state(), RegistrationState::After);

        let command = || {
            Command::builder("late")
                .handler(|_| Ok(()))
                .build()
                .unwrap()
        };
        assert_eq!(
            manager.register(command()).unwrap_err(),
            RegistrationError::RegistrationLocked
        );

        manager.update_settings(|settings| settings.allow_unsafe_registration = true);
        manager.register(command()).unwrap();
        manager.execute(TestSender::Admin, "late").await.unwrap();
    }

    #[tokio::test]
    async fn delete_root_forgets_the_command() {
        let manager = give_manager();
        assert!(manager.delete_root("give").unwrap());
        assert!(!manager.delete_root("give").unwrap());
        let error = manager
            .execute(TestSender::Admin, "give alice apple")
            .await
            .unwrap_err();
        assert!(matches!(error, DispatchError::UnknownCommand { .. }));
    }

    #[tokio::test]
    async fn override_setting_replaces_commands() {
        let manager: CommandManager<TestSender> = CommandManager::with_settings(ManagerSettings {
            override_existing_commands: true,
            ..ManagerSettings::default()
        });
        let ran_second = Arc::new(AtomicBool::new(false));
        manager
            .register(
                Command::builder("greet")
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let marker = Arc::clone(&ran_second);
        manager
            .register(
                Command::builder("greet")
                    .handler(move |_| {
                        marker.store(true, Ordering::SeqCst);
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        manager.execute(TestSender::Admin, "greet").await.unwrap();
        assert!(ran_second.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancelled_invocation_never_runs_the_handler() {
        let manager: CommandManager<TestSender> = CommandManager::new();
        let ran = Arc::new(AtomicBool::new(false));
        let marker = Arc::clone(&ran);
        manager
            .register(
                Command::builder("slow")
                    .handler(move |_| {
                        marker.store(true, Ordering::SeqCst);
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let error = manager
            .execute_cancellable(TestSender::Admin, "slow", token)
            .await
            .unwrap_err();
        assert!(matches!(error, DispatchError::Cancelled));
        assert!(!ran.load(Ordering::SeqCst));
    }

    struct UppercaseResolver;

    impl SuspendingParser<TestSender> for UppercaseResolver {
        type Output = String;

        fn parse<'a, 'src: 'a>(
            &'a self,
            _ctx: &'a CommandContext<TestSender>,
            input: &'a mut InputCursor<'src>,
        ) -> BoxFuture<'a, Result<Self::Output, ParseFailure>> {
            Box::pin(async move {
                let token = input.read_string()?;
                Ok(token.to_uppercase())
            })
        }
    }

    fn shout_handler(
        ctx: &mut CommandContext<TestSender>,
    ) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let target: String = ctx.require::<String>("target")?.clone();
            ctx.set("announcement", format!("hello {target}"));
            Ok(())
        })
    }

    #[tokio::test]
    async fn suspending_parsers_and_handlers_compose() {
        let manager: CommandManager<TestSender> = CommandManager::new();
        manager
            .register(
                Command::builder("shout")
                    .required_any(
                        "target",
                        AnyParser::suspending(UppercaseResolver),
                        ValueTypeTag::of::<String>(),
                    )
                    .handler_async(shout_handler)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let ctx = manager
            .execute(TestSender::Admin, "shout alice")
            .await
            .unwrap();
        assert_eq!(ctx.get::<String>("target").unwrap(), "ALICE");
        assert_eq!(ctx.get::<String>("announcement").unwrap(), "hello ALICE");
    }

    #[tokio::test]
    async fn preprocessors_can_rewrite_input() {
        let manager = give_manager();
        manager.register_preprocessor(
            |_: &mut CommandContext<TestSender>, input: &mut String| {
                if let Some(stripped) = input.strip_prefix('/') {
                    *input = stripped.to_owned();
                }
                Ok(())
            },
        );
        let ctx = manager
            .execute(TestSender::Admin, "/give alice apple")
            .await
            .unwrap();
        assert_eq!(ctx.raw_input(), "give alice apple");
        assert_eq!(ctx.get::<String>("player").unwrap(), "alice");
    }

    #[tokio::test]
    async fn postprocessors_gate_the_handler() {
        let manager: CommandManager<TestSender> = CommandManager::new();
        let ran = Arc::new(AtomicBool::new(false));
        let marker = Arc::clone(&ran);
        manager
            .register(
                Command::builder("guarded")
                    .handler(move |_| {
                        marker.store(true, Ordering::SeqCst);
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        manager.register_postprocessor(
            |_: &mut CommandContext<TestSender>, _: &Command<TestSender>| {
                Err(DispatchError::NoPermission {
                    permission: "vetoed".to_owned(),
                })
            },
        );
        let error = manager
            .execute(TestSender::Admin, "guarded")
            .await
            .unwrap_err();
        assert!(matches!(error, DispatchError::NoPermission { .. }));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn suggestion_processors_and_force_suggest() {
        let manager = give_manager();
        manager.register_suggestion_processor(
            |_: &CommandContext<TestSender>, suggestions: Vec<String>| {
                suggestions
                    .into_iter()
                    .filter(|s| s != "bob")
                    .collect()
            },
        );
        let suggestions = manager.suggest(TestSender::Admin, "give ").await;
        assert_eq!(suggestions, ["alice"]);

        manager.update_settings(|settings| settings.force_suggestion = true);
        let suggestions = manager.suggest(TestSender::Admin, "give alice apple 64 ").await;
        assert_eq!(suggestions, [String::new()]);
    }

    #[tokio::test]
    async fn builder_infers_parsers_from_the_registry() {
        let manager: CommandManager<TestSender> = CommandManager::new();
        manager
            .register(
                manager
                    .command_builder("repeat")
                    .required_of::<i64>("times")
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let ctx = manager
            .execute(TestSender::Admin, "repeat 3")
            .await
            .unwrap();
        assert_eq!(ctx.get::<i64>("times"), Some(&3));

        let error = manager
            .command_builder("broken")
            .required_of::<u128>("value")
            .handler(|_| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(
            error,
            crate::error::CommandBuildError::UnknownValueType { .. }
        ));
    }

    #[tokio::test]
    async fn suggestions_are_pure() {
        let manager = give_manager();
        let before = manager.suggest(TestSender::Admin, "gi").await;
        let _ = manager.suggest(TestSender::Admin, "give alice app").await;
        let after = manager.suggest(TestSender::Admin, "gi").await;
        assert_eq!(before, after);
        assert_eq!(manager.state(), RegistrationState::During);
    }

    #[tokio::test]
    async fn quoted_arguments_span_spaces() {
        let manager: CommandManager<TestSender> = CommandManager::new();
        manager
            .register(
                Command::builder("say")
                    .required("message", StringParser::quoted())
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let ctx = manager
            .execute(TestSender::Admin, "say \"hello there\"")
            .await
            .unwrap();
        assert_eq!(ctx.get::<String>("message").unwrap(), "hello there");

        let error = manager
            .execute(TestSender::Admin, "say \"oops")
            .await
            .unwrap_err();
        match error {
            DispatchError::ArgumentParse { component, reason } => {
                assert_eq!(component, "message");
                assert!(reason.message().contains("malformed quoted string"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
