use std::fmt::Write;

use crate::errors::{Diagnostic, Severity};
use crate::scalar::DecodedValue;

/// Identifies a node in a [`TreeSink`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Receives the tree of labeled nodes produced by decoding a message.
pub trait TreeSink {
    /// Return the invisible root node which top-level messages are added to.
    fn root(&self) -> NodeId;

    /// Add a node as the last child of `parent`.
    fn append(&mut self, parent: NodeId, label: String, value: Option<DecodedValue>) -> NodeId;

    /// Replace the label of a node.
    fn set_label(&mut self, node: NodeId, label: String);

    fn attach_diagnostic(&mut self, node: NodeId, diagnostic: Diagnostic);
}

/// A node in a [`DecodeTree`].
#[derive(Clone, Debug, Default)]
pub struct TreeNode {
    label: String,
    value: Option<DecodedValue>,
    children: Vec<NodeId>,
    diagnostics: Vec<Diagnostic>,
}

impl TreeNode {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Return the value decoded for this node, if it represents a field.
    pub fn value(&self) -> Option<&DecodedValue> {
        self.value.as_ref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Arena-allocated [`TreeSink`] which can render the tree as text.
#[derive(Clone, Debug)]
pub struct DecodeTree {
    nodes: Vec<TreeNode>,
}

impl DecodeTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![TreeNode::default()],
        }
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    /// Return the children of `id`.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &TreeNode)> {
        self.nodes[id.0]
            .children
            .iter()
            .map(|&child| (child, &self.nodes[child.0]))
    }

    /// Return the first node added whose label starts with `prefix`.
    pub fn find(&self, prefix: &str) -> Option<&TreeNode> {
        self.nodes[1..].iter().find(|n| n.label.starts_with(prefix))
    }

    /// Return all diagnostics in the tree, in the order they were attached to
    /// nodes.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.nodes.iter().flat_map(|n| n.diagnostics.iter())
    }

    /// Render the tree as indented text, with one line per node.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for &child in &self.nodes[0].children {
            self.render_node(child, 0, &mut out);
        }
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = &self.nodes[id.0];
        let indent = "  ".repeat(depth);
        let _ = writeln!(out, "{}{}", indent, node.label);
        for diag in &node.diagnostics {
            let severity = match diag.severity() {
                Severity::Warning => "warning",
                Severity::Error => "error",
            };
            let _ = writeln!(out, "{}  [{}] {}", indent, severity, diag);
        }
        for &child in &node.children {
            self.render_node(child, depth + 1, out);
        }
    }
}

impl Default for DecodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeSink for DecodeTree {
    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn append(&mut self, parent: NodeId, label: String, value: Option<DecodedValue>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TreeNode {
            label,
            value,
            children: Vec::new(),
            diagnostics: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    fn set_label(&mut self, node: NodeId, label: String) {
        self.nodes[node.0].label = label;
    }

    fn attach_diagnostic(&mut self, node: NodeId, diagnostic: Diagnostic) {
        self.nodes[node.0].diagnostics.push(diagnostic);
    }
}
