//! The shared prefix tree all registered commands dispatch through.
use std::sync::Arc;

use smallvec::SmallVec;

use crate::command::Command;
use crate::component::CommandComponent;
use crate::error::RegistrationError;
use crate::permission::Permission;
use crate::sender::Sender;

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeId(usize);

impl NodeId {
    /// The root node, present in every tree.
    pub(crate) const ROOT: Self = Self(0);
}

pub(crate) struct TreeNode<S: Sender> {
    pub(crate) component: Option<Arc<CommandComponent<S>>>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: SmallVec<[NodeId; 4]>,
    pub(crate) command: Option<Arc<Command<S>>>,
    /// Cached disjunction of the permissions reachable through this node,
    /// kept current across mutations. Lets dispatch distinguish "no
    /// permission" from "unknown command".
    pub(crate) aggregated: Permission<S>,
    occupied: bool,
}

impl<S: Sender> Clone for TreeNode<S> {
    fn clone(&self) -> Self {
        Self {
            component: self.component.clone(),
            parent: self.parent,
            children: self.children.clone(),
            command: self.command.clone(),
            aggregated: self.aggregated.clone(),
            occupied: self.occupied,
        }
    }
}

impl<S: Sender> TreeNode<S> {
    fn empty() -> Self {
        Self {
            component: None,
            parent: None,
            children: SmallVec::new(),
            command: None,
            aggregated: Permission::None,
            occupied: false,
        }
    }
}

/// Arena-backed prefix tree of command components.
///
/// The tree owns its nodes exclusively; commands are attached to terminal
/// nodes as `Arc`s. Children are kept with literals before arguments before
/// flag groups, in declaration order within each rank.
pub(crate) struct CommandTree<S: Sender> {
    nodes: Vec<TreeNode<S>>,
    free: Vec<usize>,
}

impl<S: Sender> Clone for CommandTree<S> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            free: self.free.clone(),
        }
    }
}

fn component_rank<S: Sender>(component: &CommandComponent<S>) -> u8 {
    if component.is_literal() {
        0
    } else if component.is_argument() {
        1
    } else {
        2
    }
}

impl<S: Sender> CommandTree<S> {
    pub(crate) fn new() -> Self {
        let mut root = TreeNode::empty();
        root.occupied = true;
        Self {
            nodes: vec![root],
            free: Vec::new(),
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &TreeNode<S> {
        &self.nodes[id.0]
    }

    pub(crate) fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    fn alloc(&mut self, node: TreeNode<S>) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                NodeId(index)
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id.0] = TreeNode::empty();
        self.free.push(id.0);
    }

    /// Inserts a child keeping literals before arguments before flag
    /// groups.
    fn attach_child(&mut self, parent: NodeId, child: NodeId, rank: u8) {
        let index = self.nodes[parent.0]
            .children
            .iter()
            .position(|&existing| {
                self.nodes[existing.0]
                    .component
                    .as_ref()
                    .is_some_and(|component| component_rank(component) > rank)
            });
        match index {
            Some(index) => self.nodes[parent.0].children.insert(index, child),
            None => self.nodes[parent.0].children.push(child),
        }
    }

    fn equivalent(existing: &CommandComponent<S>, incoming: &CommandComponent<S>) -> bool {
        if existing.is_literal() && incoming.is_literal() {
            return existing.name() == incoming.name();
        }
        if let (Some(a), Some(b)) = (existing.parser(), incoming.parser()) {
            return existing.name() == incoming.name() && a.same_parser(b);
        }
        false
    }

    /// Inserts `command`, unifying shared prefixes with existing commands.
    pub(crate) fn insert(
        &mut self,
        command: Arc<Command<S>>,
        override_existing: bool,
    ) -> Result<(), RegistrationError> {
        let mut current = NodeId::ROOT;
        for component in command.components() {
            let siblings = self.nodes[current.0].children.clone();
            let mut matched = None;
            for &child in &siblings {
                let Some(child_component) = self.nodes[child.0].component.as_deref() else {
                    continue;
                };
                if Self::equivalent(child_component, component) {
                    matched = Some(child);
                    break;
                }
                if child_component.is_literal()
                    && component.is_literal()
                    && child_component.surfaces_intersect(component)
                {
                    return Err(RegistrationError::ConflictingLiterals {
                        name: component.name().to_owned(),
                        existing: child_component.name().to_owned(),
                    });
                }
            }
            current = match matched {
                Some(child) => child,
                None => {
                    let rank = component_rank(component);
                    let child = self.alloc(TreeNode {
                        component: Some(Arc::clone(component)),
                        parent: Some(current),
                        children: SmallVec::new(),
                        command: None,
                        aggregated: Permission::None,
                        occupied: true,
                    });
                    self.attach_child(current, child, rank);
                    child
                }
            };
        }
        if self.nodes[current.0].command.is_some() && !override_existing {
            return Err(RegistrationError::DuplicateCommand {
                path: self.render_path(current),
            });
        }
        self.nodes[current.0].command = Some(command);
        self.recompute_up(current);
        Ok(())
    }

    /// Removes the subtree rooted at `id`, then prunes ancestors left with
    /// neither a command nor children.
    pub(crate) fn delete_recursively(&mut self, id: NodeId) {
        let parent = self.nodes[id.0].parent;
        if let Some(parent) = parent {
            self.nodes[parent.0].children.retain(|&mut child| child != id);
        }
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            stack.extend(self.nodes[node.0].children.iter().copied());
            self.release(node);
        }
        let mut cursor = parent;
        while let Some(node_id) = cursor {
            if node_id == NodeId::ROOT {
                break;
            }
            let node = &self.nodes[node_id.0];
            if node.command.is_none() && node.children.is_empty() {
                let grandparent = node.parent;
                if let Some(grandparent) = grandparent {
                    self.nodes[grandparent.0]
                        .children
                        .retain(|&mut child| child != node_id);
                }
                self.release(node_id);
                cursor = grandparent;
            } else {
                break;
            }
        }
        self.recompute_up(cursor.unwrap_or(NodeId::ROOT));
    }

    /// Deletes the root command whose literal matches `name`. Returns
    /// whether anything was removed.
    pub(crate) fn delete_root(&mut self, name: &str) -> bool {
        let target = self.nodes[0].children.iter().copied().find(|&child| {
            self.nodes[child.0]
                .component
                .as_deref()
                .is_some_and(|component| component.matches_literal(name))
        });
        match target {
            Some(child) => {
                self.delete_recursively(child);
                true
            }
            None => false,
        }
    }

    /// The ambiguity pass run when registration locks: no node may hold two
    /// argument children sharing one parser, nor two greedy argument
    /// children.
    pub(crate) fn validate(&self) -> Result<(), RegistrationError> {
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            let parsers: Vec<_> = node
                .children
                .iter()
                .filter_map(|&child| self.nodes[child.0].component.as_deref())
                .filter_map(CommandComponent::parser)
                .collect();
            for (index, parser) in parsers.iter().enumerate() {
                for other in &parsers[index + 1..] {
                    if parser.same_parser(other) {
                        return Err(RegistrationError::AmbiguousArguments {
                            path: self.render_path(id),
                        });
                    }
                }
            }
            if parsers.iter().filter(|parser| parser.greedy()).count() > 1 {
                return Err(RegistrationError::AmbiguousArguments {
                    path: self.render_path(id),
                });
            }
            stack.extend(node.children.iter().copied());
        }
        Ok(())
    }

    fn aggregated_for(&self, id: NodeId) -> Permission<S> {
        let node = &self.nodes[id.0];
        let mut parts: Vec<Permission<S>> = Vec::new();
        if let Some(command) = &node.command {
            parts.push(command.permission().clone());
        }
        for &child in &node.children {
            let child_node = &self.nodes[child.0];
            let component_permission = child_node
                .component
                .as_deref()
                .map_or(Permission::None, |component| component.permission().clone());
            let combined = match (
                component_permission.is_none(),
                child_node.aggregated.is_none(),
            ) {
                (true, true) => Permission::None,
                (true, false) => child_node.aggregated.clone(),
                (false, true) => component_permission,
                (false, false) => {
                    Permission::all_of([component_permission, child_node.aggregated.clone()])
                }
            };
            parts.push(combined);
        }
        if parts.is_empty() || parts.iter().any(Permission::is_none) {
            Permission::None
        } else if parts.len() == 1 {
            parts.swap_remove(0)
        } else {
            Permission::AnyOf(parts)
        }
    }

    fn recompute_up(&mut self, start: NodeId) {
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            self.nodes[id.0].aggregated = self.aggregated_for(id);
            cursor = self.nodes[id.0].parent;
        }
    }

    /// The component path leading to `id`, for diagnostics.
    pub(crate) fn render_path(&self, id: NodeId) -> String {
        let mut names: Vec<&str> = Vec::new();
        let mut cursor = Some(id);
        while let Some(node_id) = cursor {
            let node = &self.nodes[node_id.0];
            if let Some(component) = node.component.as_deref() {
                names.push(component.name());
            }
            cursor = node.parent;
        }
        names.reverse();
        names.join(" ")
    }

    /// A structural fingerprint: the sorted component paths of every
    /// registered command.
    #[cfg(test)]
    pub(crate) fn signature(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            if self.nodes[id.0].command.is_some() {
                out.push(self.render_path(id));
            }
            stack.extend(self.nodes[id.0].children.iter().copied());
        }
        out.sort();
        out
    }
}
