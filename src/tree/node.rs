//! Immutable region tree declarations.
//!
//! A [`Node`] names a region, fixes its set of states, and lists its child
//! regions. A child may be restricted to a subset of the parent's states, in
//! which case it is only reachable while the parent holds one of those
//! states. Nodes are declared once, validated at construction, and shared
//! read-only by every live context instantiated from them.

use crate::tree::error::TreeError;
use std::sync::Arc;

/// The wildcard state label, valid wherever a state is *compared*, never as
/// a declared state or a transition target.
pub const WILDCARD: &str = "*";

/// A child declaration: the child node plus the parent states it is visible
/// in (`None` = visible in every parent state).
#[derive(Debug, Clone)]
pub(crate) struct ChildDecl {
    pub(crate) node: Arc<Node>,
    pub(crate) only_in: Option<Vec<usize>>,
}

impl ChildDecl {
    pub(crate) fn visible_in(&self, state: Option<usize>) -> bool {
        match &self.only_in {
            None => true,
            Some(states) => state.is_some_and(|s| states.contains(&s)),
        }
    }
}

/// Immutable declaration of a named state region.
///
/// # Example
///
/// ```rust
/// use strata::tree::{leaf, node, restrict};
///
/// let car = leaf("CAR", ["forward", "brake"]).unwrap();
/// let light = node(
///     "LIGHT",
///     ["red", "yellow", "green"],
///     [restrict(["green"], [car])],
/// )
/// .unwrap();
///
/// assert!(light.has_state("red"));
/// assert!(light.has_state("*"));
/// assert!(!light.has_state("blue"));
///
/// // CAR only exists while LIGHT is green.
/// assert_eq!(light.visible_children(Some("green")).count(), 1);
/// assert_eq!(light.visible_children(Some("red")).count(), 0);
/// ```
#[derive(Debug)]
pub struct Node {
    name: String,
    states: Vec<String>,
    children: Vec<ChildDecl>,
}

/// One or more child declarations, as accepted by [`node`].
///
/// Produced from a bare `Arc<Node>` (unrestricted child) or from
/// [`restrict`] (a group of children visible only in specific parent
/// states).
#[derive(Debug, Clone)]
pub struct ChildSpec {
    entries: Vec<(Arc<Node>, Option<Vec<String>>)>,
}

impl From<Arc<Node>> for ChildSpec {
    fn from(node: Arc<Node>) -> Self {
        Self {
            entries: vec![(node, None)],
        }
    }
}

impl From<&Arc<Node>> for ChildSpec {
    fn from(node: &Arc<Node>) -> Self {
        Arc::clone(node).into()
    }
}

/// Restrict a group of children to a subset of the parent's states.
///
/// The restricted children are reachable only while the parent holds one of
/// the listed states. The states are validated against the parent's declared
/// states when the parent [`node`] is built.
pub fn restrict<S, N>(states: S, nodes: N) -> ChildSpec
where
    S: IntoIterator,
    S::Item: Into<String>,
    N: IntoIterator<Item = Arc<Node>>,
{
    let states: Vec<String> = states.into_iter().map(Into::into).collect();
    ChildSpec {
        entries: nodes
            .into_iter()
            .map(|n| (n, Some(states.clone())))
            .collect(),
    }
}

/// Declare a region with states and children.
///
/// Fails with [`TreeError::DuplicateChild`] if two children with the same
/// name are visible in an overlapping set of parent states, and with the
/// other [`TreeError`] variants on malformed state lists or restrictions.
pub fn node<S, C>(name: impl Into<String>, states: S, children: C) -> Result<Arc<Node>, TreeError>
where
    S: IntoIterator,
    S::Item: Into<String>,
    C: IntoIterator,
    C::Item: Into<ChildSpec>,
{
    Node::declare(
        name.into(),
        states.into_iter().map(Into::into).collect(),
        children.into_iter().flat_map(|c| c.into().entries).collect(),
    )
}

/// Declare a childless region.
pub fn leaf<S>(name: impl Into<String>, states: S) -> Result<Arc<Node>, TreeError>
where
    S: IntoIterator,
    S::Item: Into<String>,
{
    Node::declare(name.into(), states.into_iter().map(Into::into).collect(), Vec::new())
}

impl Node {
    fn declare(
        name: String,
        states: Vec<String>,
        entries: Vec<(Arc<Node>, Option<Vec<String>>)>,
    ) -> Result<Arc<Self>, TreeError> {
        for (i, state) in states.iter().enumerate() {
            if state == WILDCARD {
                return Err(TreeError::WildcardState { node: name });
            }
            if states[..i].contains(state) {
                return Err(TreeError::DuplicateState {
                    node: name,
                    state: state.clone(),
                });
            }
        }

        let mut children = Vec::with_capacity(entries.len());
        for (child, only_in) in entries {
            let only_in = match only_in {
                None => None,
                Some(labels) => {
                    let mut ids = Vec::with_capacity(labels.len());
                    for label in labels {
                        match states.iter().position(|s| *s == label) {
                            Some(id) => ids.push(id),
                            None => {
                                return Err(TreeError::UnknownRestriction {
                                    node: name,
                                    state: label,
                                })
                            }
                        }
                    }
                    Some(ids)
                }
            };
            children.push(ChildDecl { node: child, only_in });
        }

        // Two same-named children collide when any parent state (or the
        // unset pre-entry assignment) can see both.
        for (i, a) in children.iter().enumerate() {
            for b in &children[i + 1..] {
                if a.node.name == b.node.name && Self::overlaps(a, b) {
                    return Err(TreeError::DuplicateChild {
                        parent: name,
                        child: a.node.name.clone(),
                    });
                }
            }
        }

        Ok(Arc::new(Self {
            name,
            states,
            children,
        }))
    }

    /// Construct the internal sentinel node wrapping the top-level regions
    /// of a machine. No states of its own; children are unrestricted.
    pub(crate) fn sentinel(roots: Vec<Arc<Node>>) -> Result<Arc<Self>, TreeError> {
        Self::declare(
            crate::machine::SENTINEL.to_string(),
            Vec::new(),
            roots.into_iter().map(|n| (n, None)).collect(),
        )
    }

    fn overlaps(a: &ChildDecl, b: &ChildDecl) -> bool {
        match (&a.only_in, &b.only_in) {
            (None, None) => true,
            (None, Some(s)) | (Some(s), None) => !s.is_empty(),
            (Some(a), Some(b)) => a.iter().any(|s| b.contains(s)),
        }
    }

    /// The region's name, unique within its parent's namespace.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared states, in declaration order.
    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// True if `label` is a declared state or the wildcard.
    pub fn has_state(&self, label: &str) -> bool {
        label == WILDCARD || self.states.iter().any(|s| s == label)
    }

    /// True if both sides are either a declared state or the wildcard.
    pub fn has_transition(&self, from: &str, to: &str) -> bool {
        self.has_state(from) && self.has_state(to)
    }

    /// Index of a declared state label. Wildcards are not states and
    /// resolve to `None`.
    pub fn state_id(&self, label: &str) -> Option<usize> {
        self.states.iter().position(|s| s == label)
    }

    /// Children visible while the node holds `state`: the union of
    /// unrestricted children and those restricted to that state. `None`
    /// (the unset, pre-entry assignment) yields unrestricted children only.
    pub fn visible_children<'a>(
        &'a self,
        state: Option<&str>,
    ) -> impl Iterator<Item = &'a Arc<Node>> + 'a {
        let id = state.and_then(|s| self.state_id(s));
        self.children
            .iter()
            .filter(move |c| c.visible_in(id))
            .map(|c| &c.node)
    }

    pub(crate) fn visible_decls(
        &self,
        state: Option<usize>,
    ) -> impl Iterator<Item = &ChildDecl> + '_ {
        self.children.iter().filter(move |c| c.visible_in(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> Arc<Node> {
        let car = leaf("CAR", ["forward", "brake"]).unwrap();
        node("LIGHT", ["red", "yellow", "green"], [restrict(["green"], [car])]).unwrap()
    }

    #[test]
    fn declares_states_in_order() {
        let n = light();
        assert_eq!(n.states(), &["red", "yellow", "green"]);
        assert_eq!(n.state_id("yellow"), Some(1));
        assert_eq!(n.state_id("blue"), None);
        assert_eq!(n.state_id("*"), None);
    }

    #[test]
    fn wildcard_is_a_state_everywhere_it_is_compared() {
        let n = light();
        assert!(n.has_state("*"));
        assert!(n.has_transition("red", "*"));
        assert!(n.has_transition("*", "*"));
        assert!(!n.has_transition("red", "blue"));
    }

    #[test]
    fn restricted_child_is_visible_only_in_its_states() {
        let n = light();
        let in_green: Vec<_> = n.visible_children(Some("green")).map(|c| c.name()).collect();
        assert_eq!(in_green, ["CAR"]);
        assert_eq!(n.visible_children(Some("red")).count(), 0);
        assert_eq!(n.visible_children(None).count(), 0);
    }

    #[test]
    fn unrestricted_child_is_visible_before_entry() {
        let child = leaf("A", ["x"]).unwrap();
        let n = node("P", ["one"], [child]).unwrap();
        assert_eq!(n.visible_children(None).count(), 1);
        assert_eq!(n.visible_children(Some("one")).count(), 1);
    }

    #[test]
    fn duplicate_unrestricted_children_are_rejected() {
        let a = leaf("A", ["x"]).unwrap();
        let b = leaf("A", ["y"]).unwrap();
        let err = node("P", ["one"], [a, b]).unwrap_err();
        assert_eq!(
            err,
            TreeError::DuplicateChild {
                parent: "P".into(),
                child: "A".into(),
            }
        );
    }

    #[test]
    fn duplicate_children_in_overlapping_states_are_rejected() {
        let a = leaf("A", ["x"]).unwrap();
        let b = leaf("A", ["y"]).unwrap();
        let err = node(
            "P",
            ["one", "two", "three"],
            [restrict(["one", "two"], [a]), restrict(["two"], [b])],
        )
        .unwrap_err();
        assert!(matches!(err, TreeError::DuplicateChild { .. }));
    }

    #[test]
    fn same_name_in_disjoint_states_is_allowed() {
        let a = leaf("A", ["x"]).unwrap();
        let b = leaf("A", ["y"]).unwrap();
        let n = node(
            "P",
            ["one", "two"],
            [restrict(["one"], [a]), restrict(["two"], [b])],
        )
        .unwrap();
        assert_eq!(n.visible_children(Some("one")).count(), 1);
        assert_eq!(n.visible_children(Some("two")).count(), 1);
    }

    #[test]
    fn duplicate_state_is_rejected() {
        let err = leaf("N", ["a", "b", "a"]).unwrap_err();
        assert_eq!(
            err,
            TreeError::DuplicateState {
                node: "N".into(),
                state: "a".into(),
            }
        );
    }

    #[test]
    fn wildcard_state_is_rejected() {
        let err = leaf("N", ["a", "*"]).unwrap_err();
        assert_eq!(err, TreeError::WildcardState { node: "N".into() });
    }

    #[test]
    fn restriction_must_name_a_declared_state() {
        let child = leaf("A", ["x"]).unwrap();
        let err = node("P", ["one"], [restrict(["two"], [child])]).unwrap_err();
        assert_eq!(
            err,
            TreeError::UnknownRestriction {
                node: "P".into(),
                state: "two".into(),
            }
        );
    }
}
