//! The execution engine: the cursor-driven walk from input to handler.
use std::borrow::Cow;
use std::sync::Arc;

use smallvec::SmallVec;
use tiller_utils::InputCursor;

use crate::component::{CommandComponent, ComponentKind};
use crate::context::CommandContext;
use crate::error::{DispatchError, ParseFailure};
use crate::flags::{FlagSet, FlagWalker};
use crate::permission::PermissionChecker;
use crate::processors::CommandPostprocessor;
use crate::sender::Sender;
use crate::settings::ManagerSettings;
use crate::tree::{CommandTree, NodeId};

/// The snapshot of manager state one walk runs against.
pub(crate) struct WalkEnv<'e, S: Sender> {
    pub(crate) tree: &'e CommandTree<S>,
    pub(crate) settings: ManagerSettings,
    pub(crate) checker: PermissionChecker<S>,
    pub(crate) postprocessors: &'e [Arc<dyn CommandPostprocessor<S>>],
}

/// Whether `sender` may descend into `child`: the child's own component
/// permission must pass, and something in its subtree must be reachable.
pub(crate) fn child_permitted<S: Sender>(
    env: &WalkEnv<'_, S>,
    ctx: &CommandContext<S>,
    child: NodeId,
) -> bool {
    let node = env.tree.node(child);
    let component_ok = node
        .component
        .as_deref()
        .is_none_or(|component| component.permission().evaluate(ctx.sender(), &env.checker));
    component_ok && node.aggregated.evaluate(ctx.sender(), &env.checker)
}

fn denial_description<S: Sender>(env: &WalkEnv<'_, S>, child: NodeId) -> String {
    let node = env.tree.node(child);
    let component_permission = node
        .component
        .as_deref()
        .map(|component| component.permission().describe())
        .filter(|description| !description.is_empty());
    component_permission.unwrap_or_else(|| node.aggregated.describe())
}

/// The single flag group reachable from `node`, when it is unambiguous.
/// Liberal flag interleaving stays positional otherwise.
fn unique_flag_group<'e, S: Sender>(
    tree: &'e CommandTree<S>,
    node: NodeId,
) -> Option<&'e FlagSet<S>> {
    let mut found: Option<&'e FlagSet<S>> = None;
    let mut stack = vec![node];
    while let Some(id) = stack.pop() {
        for &child in tree.children(id) {
            if let Some(flags) = tree
                .node(child)
                .component
                .as_deref()
                .and_then(CommandComponent::flags)
            {
                if found.is_some() {
                    return None;
                }
                found = Some(flags);
            }
            stack.push(child);
        }
    }
    found
}

/// Cascades defaults through optional children once input is exhausted,
/// returning the node the walk lands on.
fn apply_optional_defaults<S: Sender>(
    env: &WalkEnv<'_, S>,
    ctx: &mut CommandContext<S>,
    mut node: NodeId,
) -> NodeId {
    loop {
        if env.tree.node(node).command.is_some() {
            return node;
        }
        let next = env.tree.children(node).iter().copied().find(|&child| {
            env.tree
                .node(child)
                .component
                .as_deref()
                .is_some_and(|component| {
                    !component.required() && (component.is_argument() || component.is_flag_group())
                })
                && child_permitted(env, ctx, child)
        });
        match next {
            Some(child) => {
                if let Some(component) = env.tree.node(child).component.as_deref()
                    && let Some(default) = component.default_value()
                {
                    let value = default.produce(ctx);
                    ctx.set_boxed(component.name_cow(), value);
                }
                node = child;
            }
            None => return node,
        }
    }
}

fn render_component<S: Sender>(component: &CommandComponent<S>) -> String {
    match component.kind() {
        ComponentKind::Literal { .. } => component.name().to_owned(),
        ComponentKind::Argument { .. } => {
            if component.required() {
                format!("<{}>", component.name())
            } else {
                format!("[{}]", component.name())
            }
        }
        ComponentKind::FlagGroup { flags } => flags
            .iter()
            .map(|flag| {
                if flag.is_presence() {
                    format!("[--{}]", flag.name())
                } else {
                    format!("[--{} <value>]", flag.name())
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Renders the expected continuation below `node`, for syntax errors.
pub(crate) fn syntax_hint<S: Sender>(tree: &CommandTree<S>, node: NodeId) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = node;
    loop {
        let children = tree.children(current);
        if children.is_empty() {
            break;
        }
        let rendered: Vec<String> = children
            .iter()
            .filter_map(|&child| tree.node(child).component.as_deref().map(render_component))
            .collect();
        if rendered.is_empty() {
            break;
        }
        parts.push(rendered.join("|"));
        current = children[0];
        if tree.node(current).command.is_some() {
            break;
        }
    }
    if parts.is_empty() {
        "end of input".to_owned()
    } else {
        parts.join(" ")
    }
}

/// Runs the matched command: sender-type gate, postprocessors, handler.
async fn finish<S: Sender>(
    env: &WalkEnv<'_, S>,
    ctx: &mut CommandContext<S>,
    cursor: &InputCursor<'_>,
    node: NodeId,
) -> Result<(), DispatchError> {
    let tree_node = env.tree.node(node);
    let Some(command) = tree_node.command.as_ref() else {
        return Err(DispatchError::InvalidSyntax {
            expected: syntax_hint(env.tree, node),
            position: cursor.position(),
        });
    };
    if !command.permission().evaluate(ctx.sender(), &env.checker) {
        return Err(DispatchError::NoPermission {
            permission: command.permission().describe(),
        });
    }
    if let Some(required) = command.sender_type()
        && !required.test(ctx.sender())
    {
        return Err(DispatchError::InvalidSenderType {
            required: required.name(),
        });
    }
    if ctx.is_cancelled() {
        return Err(DispatchError::Cancelled);
    }
    for processor in env.postprocessors {
        processor.process(ctx, command)?;
    }
    command
        .handler()
        .invoke(ctx)
        .await
        .map_err(DispatchError::Execution)
}

/// Walks the tree over the input, binding components into the context, and
/// invokes the matched command's handler.
pub(crate) async fn dispatch<S: Sender>(
    env: &WalkEnv<'_, S>,
    ctx: &mut CommandContext<S>,
    cursor: &mut InputCursor<'_>,
) -> Result<(), DispatchError> {
    let mut node = NodeId::ROOT;
    loop {
        if ctx.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        if env.settings.liberal_flag_parsing
            && cursor
                .peek_string()
                .is_ok_and(|token| token.starts_with('-') && token.len() > 1)
            && let Some(flags) = unique_flag_group(env.tree, node)
        {
            FlagWalker::new(flags, false)
                .consume(ctx, cursor, &env.checker)
                .await?;
        }

        if !cursor.has_remaining() {
            let landed = apply_optional_defaults(env, ctx, node);
            return finish(env, ctx, cursor, landed).await;
        }

        let children = env.tree.children(node);
        let mut permitted: SmallVec<[NodeId; 8]> = SmallVec::new();
        let mut denied: Option<String> = None;
        for &child in children {
            if child_permitted(env, ctx, child) {
                permitted.push(child);
            } else {
                denied = Some(denial_description(env, child));
            }
        }
        if !children.is_empty() && permitted.is_empty() {
            return Err(DispatchError::NoPermission {
                permission: denied.unwrap_or_default(),
            });
        }

        let peeked = cursor.peek_string().ok();

        // Literal children first, in declared order. A literal that matches
        // but is not permitted surfaces the denial immediately.
        if let Some(token) = &peeked {
            let mut matched = None;
            for &child in children {
                let Some(component) = env.tree.node(child).component.as_deref() else {
                    continue;
                };
                if component.matches_literal(token) {
                    matched = Some(child);
                    break;
                }
            }
            if let Some(child) = matched {
                if !permitted.contains(&child) {
                    return Err(DispatchError::NoPermission {
                        permission: denial_description(env, child),
                    });
                }
                let _ = cursor.read_string();
                if let Some(component) = env.tree.node(child).component.as_deref() {
                    ctx.set(component.name_cow(), token.clone().into_owned());
                }
                node = child;
                continue;
            }
        }

        // Argument children next, in declared order; the flag group last.
        let mut first_failure: Option<(String, ParseFailure)> = None;
        let mut required_failed = false;
        let mut advanced = false;
        for &child in &permitted {
            let Some(component) = env.tree.node(child).component.as_deref() else {
                continue;
            };
            match component.kind() {
                ComponentKind::Literal { .. } => {}
                ComponentKind::Argument { parser, .. } => {
                    if ctx.is_cancelled() {
                        return Err(DispatchError::Cancelled);
                    }
                    let mark = cursor.mark();
                    match parser.parse_value(ctx, cursor).await {
                        Ok(value) => {
                            ctx.set_boxed(component.name_cow(), value);
                            node = child;
                            advanced = true;
                            break;
                        }
                        Err(failure) => {
                            cursor.restore(mark);
                            required_failed = required_failed || component.required();
                            if first_failure.is_none() {
                                first_failure = Some((component.name().to_owned(), failure));
                            }
                        }
                    }
                }
                ComponentKind::FlagGroup { flags } => {
                    FlagWalker::new(flags, true)
                        .consume(ctx, cursor, &env.checker)
                        .await?;
                    node = child;
                    advanced = true;
                    break;
                }
            }
        }
        if advanced {
            continue;
        }

        // Nothing consumed the next token.
        if node == NodeId::ROOT {
            let input = peeked.map_or_else(|| cursor.remaining().to_owned(), Cow::into_owned);
            return Err(DispatchError::UnknownCommand { input });
        }
        if env.tree.node(node).command.is_some() {
            return Err(DispatchError::InvalidSyntax {
                expected: "end of input (too many arguments)".to_owned(),
                position: cursor.position(),
            });
        }
        if !required_failed {
            // An optional child the input did not satisfy is defaulted and
            // the walk continues below it.
            let optional = permitted.iter().copied().find(|&child| {
                env.tree
                    .node(child)
                    .component
                    .as_deref()
                    .is_some_and(|component| !component.required() && component.is_argument())
            });
            if let Some(child) = optional {
                if let Some(component) = env.tree.node(child).component.as_deref()
                    && let Some(default) = component.default_value()
                {
                    let value = default.produce(ctx);
                    ctx.set_boxed(component.name_cow(), value);
                }
                node = child;
                continue;
            }
        }
        if let Some((component, reason)) = first_failure {
            return Err(DispatchError::ArgumentParse { component, reason });
        }
        return Err(DispatchError::InvalidSyntax {
            expected: syntax_hint(env.tree, node),
            position: cursor.position(),
        });
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::arguments::integer::IntegerParser;
    use crate::arguments::string::StringParser;
    use crate::command::Command;
    use crate::flags::CommandFlag;
    use crate::parser::AnyParser;

    fn env_for(tree: &CommandTree<()>) -> WalkEnv<'_, ()> {
        WalkEnv {
            tree,
            settings: ManagerSettings::default(),
            checker: Arc::new(|_, _| true),
            postprocessors: &[],
        }
    }

    fn context(input: &str) -> CommandContext<()> {
        CommandContext::new((), input.to_owned(), CancellationToken::new(), false)
    }

    #[tokio::test]
    async fn committed_positionals_survive_flag_failures() {
        let mut tree = CommandTree::new();
        tree.insert(
            Arc::new(
                Command::<()>::builder("mkdir")
                    .required("name", StringParser::single())
                    .flag(CommandFlag::presence("parents"))
                    .flag(CommandFlag::with_value(
                        "mode",
                        AnyParser::new(IntegerParser::new()),
                    ))
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            ),
            false,
        )
        .unwrap();

        let env = env_for(&tree);
        let mut ctx = context("mkdir foo --mode abc");
        let mut cursor = InputCursor::new("mkdir foo --mode abc");
        let error = dispatch(&env, &mut ctx, &mut cursor).await.unwrap_err();
        assert!(matches!(error, DispatchError::FlagParse { flag, .. } if flag == "mode"));
        // The committed positional stays bound after the flag failure.
        assert_eq!(ctx.get::<String>("name").unwrap(), "foo");
    }

    #[tokio::test]
    async fn failed_argument_child_restores_the_cursor_for_siblings() {
        let mut tree = CommandTree::new();
        tree.insert(
            Arc::new(
                Command::<()>::builder("set")
                    .required("n", IntegerParser::new())
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            ),
            false,
        )
        .unwrap();
        tree.insert(
            Arc::new(
                Command::<()>::builder("set")
                    .required("s", StringParser::single())
                    .literal("two")
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            ),
            false,
        )
        .unwrap();

        let env = env_for(&tree);
        let mut ctx = context("set abc two");
        let mut cursor = InputCursor::new("set abc two");
        dispatch(&env, &mut ctx, &mut cursor).await.unwrap();
        // The integer child failed, the sibling saw the untouched token.
        assert!(ctx.get::<i64>("n").is_none());
        assert_eq!(ctx.get::<String>("s").unwrap(), "abc");
    }

    #[tokio::test]
    async fn first_argument_failure_is_reported() {
        let mut tree = CommandTree::new();
        tree.insert(
            Arc::new(
                Command::<()>::builder("set")
                    .required("n", IntegerParser::new())
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            ),
            false,
        )
        .unwrap();

        let env = env_for(&tree);
        let mut ctx = context("set abc");
        let mut cursor = InputCursor::new("set abc");
        let error = dispatch(&env, &mut ctx, &mut cursor).await.unwrap_err();
        match error {
            DispatchError::ArgumentParse { component, reason } => {
                assert_eq!(component, "n");
                assert!(reason.message().contains("unparseable integer"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn syntax_hint_renders_the_expected_continuation() {
        let mut tree = CommandTree::new();
        tree.insert(
            Arc::new(
                Command::<()>::builder("give")
                    .required("player", StringParser::single())
                    .required("item", StringParser::single())
                    .optional("amount", IntegerParser::new())
                    .handler(|_| Ok(()))
                    .build()
                    .unwrap(),
            ),
            false,
        )
        .unwrap();

        let env = env_for(&tree);
        let mut ctx = context("give alice");
        let mut cursor = InputCursor::new("give alice");
        let error = dispatch(&env, &mut ctx, &mut cursor).await.unwrap_err();
        match error {
            DispatchError::InvalidSyntax { expected, position } => {
                assert_eq!(expected, "<item> [amount]");
                assert_eq!(position, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
