//! The suggestion engine: a partial-parse traversal producing completions.
use rustc_hash::FxHashSet;
use tiller_utils::InputCursor;

use crate::component::ComponentKind;
use crate::context::CommandContext;
use crate::execution::{WalkEnv, child_permitted};
use crate::flags::{CommandFlag, FlagSet};
use crate::sender::Sender;
use crate::tree::{CommandTree, NodeId};

/// Case-insensitive ASCII prefix test; an empty prefix matches everything.
pub(crate) fn starts_with_ignore_case(surface: &str, partial: &str) -> bool {
    surface
        .get(..partial.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(partial))
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = FxHashSet::default();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

fn extend_filtered(out: &mut Vec<String>, candidates: Vec<String>, partial: &str) {
    out.extend(
        candidates
            .into_iter()
            .filter(|candidate| starts_with_ignore_case(candidate, partial)),
    );
}

/// The flag set in effect at `node`: a direct flag-group child, or, in
/// liberal mode, the unique flag group below the node.
fn flag_set_at<'e, S: Sender>(env: &WalkEnv<'e, S>, node: NodeId) -> Option<&'e FlagSet<S>> {
    for &child in env.tree.children(node) {
        if let Some(flags) = env
            .tree
            .node(child)
            .component
            .as_deref()
            .and_then(crate::component::CommandComponent::flags)
        {
            return Some(flags);
        }
    }
    if env.settings.liberal_flag_parsing {
        return unique_flag_group_below(env.tree, node);
    }
    None
}

fn unique_flag_group_below<'e, S: Sender>(
    tree: &'e CommandTree<S>,
    node: NodeId,
) -> Option<&'e FlagSet<S>> {
    let mut found = None;
    let mut stack = vec![node];
    while let Some(id) = stack.pop() {
        for &child in tree.children(id) {
            if let Some(flags) = tree
                .node(child)
                .component
                .as_deref()
                .and_then(crate::component::CommandComponent::flags)
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

/// Gathers completions at the frontier node for the partial token.
fn gather<S: Sender>(
    env: &WalkEnv<'_, S>,
    ctx: &CommandContext<S>,
    node: NodeId,
    partial: &str,
    pending_value_flag: Option<&CommandFlag<S>>,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(flag) = pending_value_flag {
        if let Some(parser) = flag.value_parser() {
            extend_filtered(&mut out, parser.suggest(ctx, partial), partial);
        }
        return dedup(out);
    }
    for &child in env.tree.children(node) {
        if !child_permitted(env, ctx, child) {
            continue;
        }
        let Some(component) = env.tree.node(child).component.as_deref() else {
            continue;
        };
        match component.kind() {
            ComponentKind::Literal { .. } => {
                for surface in component.literal_surfaces() {
                    if starts_with_ignore_case(surface, partial) {
                        out.push(surface.to_owned());
                    }
                }
            }
            ComponentKind::Argument { parser, .. } => {
                let candidates = match component.suggestion_override() {
                    Some(provider) => provider.provide(ctx, partial),
                    None => parser.suggest(ctx, partial),
                };
                extend_filtered(&mut out, candidates, partial);
            }
            ComponentKind::FlagGroup { flags } => {
                if partial.starts_with('-') {
                    out.extend(flags.suggest_names(ctx, &env.checker, partial));
                }
            }
        }
    }
    dedup(out)
}

/// Walks as far as the complete tokens allow, then gathers completions for
/// the final partial token. Never mutates manager state.
pub(crate) async fn suggest<S: Sender>(
    env: &WalkEnv<'_, S>,
    ctx: &mut CommandContext<S>,
    input: &str,
) -> Vec<String> {
    let mut cursor = InputCursor::new(input);
    let mut node = NodeId::ROOT;
    let mut pending_value_flag: Option<&CommandFlag<S>> = None;
    loop {
        let mark = cursor.mark();
        let Ok(token) = cursor.read_string() else {
            return gather(env, ctx, node, "", pending_value_flag);
        };
        let complete = cursor.has_remaining() || input.ends_with(' ');
        if !complete {
            cursor.restore(mark);
            return gather(env, ctx, node, &token, pending_value_flag);
        }

        if let Some(flag) = pending_value_flag.take() {
            let Some(parser) = flag.value_parser() else {
                continue;
            };
            cursor.restore(mark);
            match parser.parse_value(ctx, &mut cursor).await {
                Ok(value) => {
                    ctx.record_flag_value(flag.name_cow(), value);
                    continue;
                }
                Err(_) => return Vec::new(),
            }
        }

        if token == "--" {
            continue;
        }
        if token.starts_with('-') && token.len() > 1 {
            let Some(flags) = flag_set_at(env, node) else {
                return Vec::new();
            };
            if let Some(name) = token.strip_prefix("--") {
                match flags.lookup_long(name) {
                    Some(flag) if flag.value_parser().is_some() => {
                        pending_value_flag = Some(flag);
                    }
                    Some(flag) => ctx.record_flag_presence(flag.name_cow()),
                    None => return Vec::new(),
                }
            } else {
                let shorts: Vec<char> = token.chars().skip(1).collect();
                for (index, short) in shorts.iter().enumerate() {
                    match flags.lookup_short(*short) {
                        Some(flag) if flag.value_parser().is_some() => {
                            if index + 1 == shorts.len() {
                                pending_value_flag = Some(flag);
                            } else {
                                return Vec::new();
                            }
                        }
                        Some(flag) => ctx.record_flag_presence(flag.name_cow()),
                        None => return Vec::new(),
                    }
                }
            }
            continue;
        }

        // Positional descent: literal match, then argument children.
        let children = env.tree.children(node);
        let mut next = None;
        for &child in children {
            let Some(component) = env.tree.node(child).component.as_deref() else {
                continue;
            };
            if component.matches_literal(&token) && child_permitted(env, ctx, child) {
                ctx.set(component.name_cow(), token.clone().into_owned());
                next = Some(child);
                break;
            }
        }
        if next.is_none() {
            cursor.restore(mark);
            for &child in children {
                if !child_permitted(env, ctx, child) {
                    continue;
                }
                let Some(component) = env.tree.node(child).component.as_deref() else {
                    continue;
                };
                let ComponentKind::Argument { parser, .. } = component.kind() else {
                    continue;
                };
                let argument_mark = cursor.mark();
                match parser.parse_value(ctx, &mut cursor).await {
                    Ok(value) => {
                        ctx.set_boxed(component.name_cow(), value);
                        next = Some(child);
                        break;
                    }
                    Err(_) => cursor.restore(argument_mark),
                }
            }
        }
        match next {
            // A parser that consumed nothing cannot make progress.
            Some(child) if cursor.position() > mark.position() => node = child,
            _ => return Vec::new(),
        }
    }
}
