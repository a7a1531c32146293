//! Owned syntax trees and depth-first traversal.
//!
//! Grammar-specific parsers build a [`SyntaxTree`] whose nodes carry a kind,
//! an optional field name under their parent, and a byte span into the
//! source. Trees are immutable once built, so extraction routines on other
//! threads can read the same tree concurrently.

use std::ops::Range;
use std::sync::Arc;

/// A node in a syntax tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    kind: &'static str,
    field: Option<&'static str>,
    span: Range<usize>,
    children: Vec<Node>,
}

impl Node {
    pub fn new(kind: &'static str, span: Range<usize>) -> Self {
        Self {
            kind,
            field: None,
            span,
            children: Vec::new(),
        }
    }

    /// Name this node under its parent (e.g. "name", "tag", "as").
    pub fn with_field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn field(&self) -> Option<&'static str> {
        self.field
    }

    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// First direct child stored under `field`.
    pub fn child_by_field_name(&self, field: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.field == Some(field))
    }

    /// Direct children of the given kind.
    pub fn children_of_kind<'n>(&'n self, kind: &'n str) -> impl Iterator<Item = &'n Node> + 'n {
        self.children.iter().filter(move |c| c.kind == kind)
    }
}

/// A parsed file: its source text and the root node spanning it.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    source: Arc<str>,
    root: Node,
}

impl SyntaxTree {
    pub fn new(source: impl Into<Arc<str>>, root: Node) -> Self {
        Self {
            source: source.into(),
            root,
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Source text covered by `node`.
    pub fn text(&self, node: &Node) -> &str {
        self.source.get(node.span()).unwrap_or("")
    }

    /// 1-based line on which `node` starts.
    pub fn line(&self, node: &Node) -> usize {
        self.source
            .get(..node.span.start)
            .map_or(0, |before| before.matches('\n').count())
            + 1
    }
}

/// Visit every node under (and including) `node` in post-order: all children
/// of a node, left to right, before the node itself.
pub fn walk<'t>(node: &'t Node, mut visit: impl FnMut(&'t Node)) {
    let mut stack: Vec<(&'t Node, usize)> = vec![(node, 0)];
    while let Some(top) = stack.last_mut() {
        let (current, next) = *top;
        match current.children.get(next) {
            Some(child) => {
                top.1 += 1;
                stack.push((child, 0));
            }
            None => {
                stack.pop();
                visit(current);
            }
        }
    }
}

/// All nodes under `node` matching `predicate`, in post-order.
pub fn find<'t>(node: &'t Node, predicate: impl Fn(&Node) -> bool) -> Vec<&'t Node> {
    let mut found = Vec::new();
    walk(node, |n| {
        if predicate(n) {
            found.push(n);
        }
    });
    found
}
