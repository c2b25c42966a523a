//! Permissions gating commands, components and flags.
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::sender::Sender;

/// The signature of the host-installed permission checker, consulted for
/// [`Permission::Node`] entries.
pub(crate) type PermissionChecker<S> = Arc<dyn Fn(&S, &str) -> bool + Send + Sync>;

/// A caller-evaluated capability.
///
/// Node permissions are strings resolved through the manager's installed
/// checker; predicate permissions are evaluated directly against the sender.
/// Combinations nest arbitrarily.
pub enum Permission<S: Sender> {
    /// Always granted.
    None,
    /// A named permission node, resolved by the manager's checker.
    Node(Cow<'static, str>),
    /// An arbitrary predicate over the sender.
    Predicate(Arc<dyn Fn(&S) -> bool + Send + Sync>),
    /// Granted only when every inner permission is granted. An empty list is
    /// always granted.
    AllOf(Vec<Permission<S>>),
    /// Granted when any inner permission is granted. An empty list is never
    /// granted.
    AnyOf(Vec<Permission<S>>),
}

impl<S: Sender> Clone for Permission<S> {
    fn clone(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Node(node) => Self::Node(node.clone()),
            Self::Predicate(predicate) => Self::Predicate(Arc::clone(predicate)),
            Self::AllOf(inner) => Self::AllOf(inner.clone()),
            Self::AnyOf(inner) => Self::AnyOf(inner.clone()),
        }
    }
}

impl<S: Sender> fmt::Debug for Permission<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Node(node) => f.debug_tuple("Node").field(node).finish(),
            Self::Predicate(_) => write!(f, "Predicate(..)"),
            Self::AllOf(inner) => f.debug_tuple("AllOf").field(inner).finish(),
            Self::AnyOf(inner) => f.debug_tuple("AnyOf").field(inner).finish(),
        }
    }
}

impl<S: Sender> Permission<S> {
    /// A named permission node.
    #[must_use]
    pub fn node(node: impl Into<Cow<'static, str>>) -> Self {
        Self::Node(node.into())
    }

    /// A predicate permission.
    #[must_use]
    pub fn predicate(predicate: impl Fn(&S) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(predicate))
    }

    /// The conjunction of the given permissions.
    #[must_use]
    pub fn all_of(permissions: impl IntoIterator<Item = Permission<S>>) -> Self {
        Self::AllOf(permissions.into_iter().collect())
    }

    /// The disjunction of the given permissions.
    #[must_use]
    pub fn any_of(permissions: impl IntoIterator<Item = Permission<S>>) -> Self {
        Self::AnyOf(permissions.into_iter().collect())
    }

    /// Whether this permission always passes.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Evaluates this permission for `sender`.
    pub(crate) fn evaluate(&self, sender: &S, checker: &PermissionChecker<S>) -> bool {
        match self {
            Self::None => true,
            Self::Node(node) => checker(sender, node),
            Self::Predicate(predicate) => predicate(sender),
            Self::AllOf(inner) => inner.iter().all(|p| p.evaluate(sender, checker)),
            Self::AnyOf(inner) => inner.iter().any(|p| p.evaluate(sender, checker)),
        }
    }

    /// A printable form, used in `NoPermission` failures.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::None => String::new(),
            Self::Node(node) => node.to_string(),
            Self::Predicate(_) => "<predicate>".to_owned(),
            Self::AllOf(inner) => {
                let parts: Vec<String> = inner.iter().map(Permission::describe).collect();
                parts.join(" & ")
            }
            Self::AnyOf(inner) => {
                let parts: Vec<String> = inner.iter().map(Permission::describe).collect();
                parts.join(" | ")
            }
        }
    }
}
