use serde::{Deserialize, Serialize};

/// Two control characters marking where the editing cursor should land
/// after a rendered tree is inserted.
pub const CURSOR_MARKER: &str = "\u{1}\u{2}";

/// A content string plus ordered child nodes: the unit being rendered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineNode>,
    #[serde(default, skip_serializing_if = "NodeData::is_empty")]
    pub data: NodeData,
}

/// Engine-private metadata attached to a node.
///
/// A host persisting rendered nodes only looks at `uuid` and `cursor`;
/// `origin` never leaves the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Identity of the template block this node was produced from.
    #[serde(skip)]
    pub origin: Option<String>,
    /// Identifier to force onto the persisted node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Cursor offsets (in chars) inside `content`, at most two.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cursor: Vec<usize>,
}

impl NodeData {
    pub fn is_empty(&self) -> bool {
        self.uuid.is_none() && self.cursor.is_empty()
    }
}

impl OutlineNode {
    pub fn new(content: impl Into<String>) -> Self {
        OutlineNode {
            content: content.into(),
            children: Vec::new(),
            data: NodeData::default(),
        }
    }

    pub fn with_children(content: impl Into<String>, children: Vec<OutlineNode>) -> Self {
        OutlineNode {
            content: content.into(),
            children,
            data: NodeData::default(),
        }
    }

    /// True when neither this node nor any descendant carries content.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty() && self.children.iter().all(OutlineNode::is_blank)
    }

    /// Follow `path` (child indices) down from this node.
    pub fn get(&self, path: &[usize]) -> Option<&OutlineNode> {
        let mut node = self;
        for &index in path {
            node = node.children.get(index)?;
        }
        Some(node)
    }

    pub fn get_mut(&mut self, path: &[usize]) -> Option<&mut OutlineNode> {
        let mut node = self;
        for &index in path {
            node = node.children.get_mut(index)?;
        }
        Some(node)
    }

    /// Render the subtree as indented Markdown bullets.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        write_bullets(self, 0, &mut out);
        out
    }
}

/// Render a forest as indented Markdown bullets.
pub fn forest_to_markdown(nodes: &[OutlineNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_bullets(node, 0, &mut out);
    }
    out
}

fn write_bullets(node: &OutlineNode, level: usize, out: &mut String) {
    let indent = "  ".repeat(level);
    let mut lines = node.content.lines();
    out.push_str(&indent);
    out.push_str("- ");
    out.push_str(lines.next().unwrap_or(""));
    out.push('\n');
    for line in lines {
        out.push_str(&indent);
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    for child in &node.children {
        write_bullets(child, level + 1, out);
    }
}
