//! AST module for Lexmac
//!
//! This module provides the immutable syntax-tree node the macro engine rewrites.
//! Nodes are reference counted: cloning a [`Node`] is cheap, and a rewrite that
//! leaves a subtree alone hands back the very same allocation, so callers can
//! detect "nothing changed" with [`Node::ptr_eq`].
//!
//! A node is an identifier, a literal, or a call (a target node applied to an
//! ordered argument list). Every node also carries an ordered list of attribute
//! nodes and a [`NodeStyle`].

// ============================================================================
// IMPORTS
// ============================================================================

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub mod symbol;

pub use symbol::Symbol;

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// Ordered, persistent list of nodes. Slicing and cloning share structure.
pub type NodeList = im::Vector<Node>;

static EMPTY_LIST: Lazy<NodeList> = Lazy::new(NodeList::new);

/// Literal payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
}

/// How a node was written. Only the message policy looks at this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeStyle {
    #[default]
    Default,
    /// Written as an explicit macro call, e.g. `name!(...)`.
    Macro,
}

/// The shape of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Id(Symbol),
    Literal(Literal),
    Call { target: Node, args: NodeList },
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    attrs: NodeList,
    style: NodeStyle,
}

/// Immutable syntax-tree node with structural equality.
#[derive(Clone)]
pub struct Node(Arc<NodeData>);

// ============================================================================
// PUBLIC API IMPLEMENTATION
// ============================================================================

impl Node {
    fn from_parts(kind: NodeKind, attrs: NodeList, style: NodeStyle) -> Self {
        Node(Arc::new(NodeData { kind, attrs, style }))
    }

    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    /// Creates an identifier node.
    ///
    /// ```rust
    /// use lexmac::ast::Node;
    /// let node = Node::id("Foo");
    /// assert!(node.is_id());
    /// assert_eq!(node.name().map(|s| s.as_str()), Some("Foo"));
    /// ```
    pub fn id(name: impl Into<Symbol>) -> Self {
        Self::from_parts(NodeKind::Id(name.into()), NodeList::new(), NodeStyle::Default)
    }

    pub fn literal(value: Literal) -> Self {
        Self::from_parts(NodeKind::Literal(value), NodeList::new(), NodeStyle::Default)
    }

    pub fn number(value: f64) -> Self {
        Self::literal(Literal::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(Literal::Str(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::literal(Literal::Bool(value))
    }

    /// Creates a call of `target` with the given arguments.
    pub fn call(target: Node, args: impl IntoIterator<Item = Node>) -> Self {
        Self::from_parts(
            NodeKind::Call {
                target,
                args: args.into_iter().collect(),
            },
            NodeList::new(),
            NodeStyle::Default,
        )
    }

    /// Creates a call whose target is the identifier `name`.
    ///
    /// ```rust
    /// use lexmac::ast::Node;
    /// let node = Node::call_sym("f", [Node::number(1.0)]);
    /// assert!(node.calls_n(&"f".into(), 1));
    /// ```
    pub fn call_sym(name: impl Into<Symbol>, args: impl IntoIterator<Item = Node>) -> Self {
        Self::call(Self::id(name), args)
    }

    /// A splice marker holding `items`.
    pub fn splice(items: impl IntoIterator<Item = Node>) -> Self {
        Self::call_sym(&*symbol::SPLICE, items)
    }

    /// A braced block holding `stmts`.
    pub fn braces(stmts: impl IntoIterator<Item = Node>) -> Self {
        Self::call_sym(&*symbol::BRACES, stmts)
    }

    /// The qualified name `left.right`.
    pub fn dotted(left: Node, right: Node) -> Self {
        Self::call_sym(&*symbol::DOT, [left, right])
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    pub fn attrs(&self) -> &NodeList {
        &self.0.attrs
    }

    pub fn has_attrs(&self) -> bool {
        !self.0.attrs.is_empty()
    }

    pub fn style(&self) -> NodeStyle {
        self.0.style
    }

    pub fn is_id(&self) -> bool {
        matches!(self.0.kind, NodeKind::Id(_))
    }

    pub fn is_call(&self) -> bool {
        matches!(self.0.kind, NodeKind::Call { .. })
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.0.kind, NodeKind::Literal(_))
    }

    /// The call target, if this node is a call.
    pub fn target(&self) -> Option<&Node> {
        match &self.0.kind {
            NodeKind::Call { target, .. } => Some(target),
            _ => None,
        }
    }

    /// The argument list. Non-calls have no arguments.
    pub fn args(&self) -> &NodeList {
        match &self.0.kind {
            NodeKind::Call { args, .. } => args,
            _ => &EMPTY_LIST,
        }
    }

    /// True for identifiers, and for calls whose target is an identifier
    /// without attributes.
    pub fn has_simple_head(&self) -> bool {
        match &self.0.kind {
            NodeKind::Id(_) => true,
            NodeKind::Literal(_) => false,
            NodeKind::Call { target, .. } => target.is_id() && !target.has_attrs(),
        }
    }

    /// The head name: the identifier itself, or the identifier a call targets.
    pub fn name(&self) -> Option<&Symbol> {
        match &self.0.kind {
            NodeKind::Id(name) => Some(name),
            NodeKind::Literal(_) => None,
            NodeKind::Call { target, .. } => match &target.0.kind {
                NodeKind::Id(name) => Some(name),
                _ => None,
            },
        }
    }

    /// True if this is a call with a simple head named `name`.
    pub fn calls(&self, name: &Symbol) -> bool {
        self.is_call() && self.has_simple_head() && self.name() == Some(name)
    }

    /// True if this is a call to `name` with exactly `arg_count` arguments.
    pub fn calls_n(&self, name: &Symbol, arg_count: usize) -> bool {
        self.calls(name) && self.args().len() == arg_count
    }

    /// Reference identity, used to observe structural sharing.
    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    // ------------------------------------------------------------------------
    // Functional updates
    // ------------------------------------------------------------------------

    pub fn with_attrs(&self, attrs: NodeList) -> Node {
        Self::from_parts(self.0.kind.clone(), attrs, self.0.style)
    }

    pub fn plus_attr(&self, attr: Node) -> Node {
        let mut attrs = self.0.attrs.clone();
        attrs.push_back(attr);
        self.with_attrs(attrs)
    }

    pub fn with_style(&self, style: NodeStyle) -> Node {
        Self::from_parts(self.0.kind.clone(), self.0.attrs.clone(), style)
    }

    /// Replaces the call target. A non-call becomes a call with no arguments.
    pub fn with_target(&self, target: Node) -> Node {
        let args = self.args().clone();
        Self::from_parts(NodeKind::Call { target, args }, self.0.attrs.clone(), self.0.style)
    }

    /// Replaces the argument list. A non-call becomes a call of itself
    /// (stripped of attributes), keeping the attributes on the outer node.
    pub fn with_args(&self, args: NodeList) -> Node {
        let target = match &self.0.kind {
            NodeKind::Call { target, .. } => target.clone(),
            kind => Self::from_parts(kind.clone(), NodeList::new(), NodeStyle::Default),
        };
        Self::from_parts(NodeKind::Call { target, args }, self.0.attrs.clone(), self.0.style)
    }
}

// ============================================================================
// TRAIT IMPLEMENTATIONS
// ============================================================================

// Equality and drop walk the tree with an explicit stack; a runaway macro can
// nest nodes far deeper than the thread stack allows.

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        let mut pending: Vec<(&Node, &Node)> = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            if Node::ptr_eq(a, b) {
                continue;
            }
            if a.0.attrs.len() != b.0.attrs.len() {
                return false;
            }
            match (&a.0.kind, &b.0.kind) {
                (NodeKind::Id(x), NodeKind::Id(y)) if x == y => {}
                (NodeKind::Literal(x), NodeKind::Literal(y)) if x == y => {}
                (
                    NodeKind::Call { target: t1, args: a1 },
                    NodeKind::Call { target: t2, args: a2 },
                ) if a1.len() == a2.len() => {
                    pending.push((t1, t2));
                    pending.extend(a1.iter().zip(a2.iter()));
                }
                _ => return false,
            }
            pending.extend(a.0.attrs.iter().zip(b.0.attrs.iter()));
        }
        true
    }
}

impl Drop for NodeData {
    fn drop(&mut self) {
        let mut orphans = Vec::new();
        self.release_children(&mut orphans);
        while let Some(Node(data)) = orphans.pop() {
            if let Some(mut data) = Arc::into_inner(data) {
                data.release_children(&mut orphans);
            }
        }
    }
}

impl NodeData {
    /// Moves the children out, leaving a leaf behind.
    fn release_children(&mut self, out: &mut Vec<Node>) {
        if self.attrs.is_empty() && !matches!(self.kind, NodeKind::Call { .. }) {
            return;
        }
        out.extend(std::mem::take(&mut self.attrs));
        if let NodeKind::Call { target, args } =
            std::mem::replace(&mut self.kind, NodeKind::Literal(Literal::Bool(false)))
        {
            out.push(target);
            out.extend(args);
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self)
    }
}

impl From<Symbol> for Node {
    fn from(name: Symbol) -> Self {
        Node::id(name)
    }
}
