//! Rendered node tree
//!
//! An arena tree of element and text nodes standing in for the live rendered
//! view. Rich content is parsed with the same tag rule the canonicalizer
//! strips with, so the text leaves in document order always spell out the
//! stripped markup.

use sha2::{Digest, Sha256};

use crate::error::AnchorError;

/// Elements that never have children
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Element {
        tag: String,
        /// Raw attribute text between the tag name and `>`, kept verbatim
        attrs: String,
    },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct RenderNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct RenderTree {
    nodes: Vec<RenderNode>,
}

impl Default for RenderTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderTree {
    /// An empty tree holding only the root
    pub fn new() -> Self {
        Self {
            nodes: vec![RenderNode {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// A tree with a single text leaf, as plain rendering produces
    pub fn from_plain(text: &str) -> Self {
        let mut tree = Self::new();
        let root = tree.root();
        tree.append_text(root, text);
        tree
    }

    /// Parse rich markup into a tree.
    ///
    /// Never fails: stray closing tags are dropped, unclosed elements end at
    /// the end of input, and a `<` with no later `>` is text.
    pub fn parse(markup: &str) -> Self {
        let mut tree = Self::new();
        let mut stack = vec![tree.root()];
        let mut rest = markup;

        while !rest.is_empty() {
            let Some(open) = rest.find('<') else {
                tree.append_text(current(&stack), rest);
                break;
            };
            let Some(close) = rest[open..].find('>').map(|c| open + c) else {
                tree.append_text(current(&stack), rest);
                break;
            };

            if open > 0 {
                tree.append_text(current(&stack), &rest[..open]);
            }
            tree.apply_tag(&rest[open + 1..close], &mut stack);
            rest = &rest[close + 1..];
        }

        tree
    }

    fn apply_tag(&mut self, body: &str, stack: &mut Vec<NodeId>) {
        if body.starts_with('!') || body.starts_with('?') {
            return;
        }

        if let Some(name) = body.strip_prefix('/') {
            let name = tag_name(name);
            // Close the nearest matching open element, ignore strays
            if let Some(depth) = stack.iter().rposition(|id| {
                matches!(&self.node(*id).kind, NodeKind::Element { tag, .. } if *tag == name)
            }) {
                stack.truncate(depth);
            }
            return;
        }

        let body = body.trim_start();
        let name = tag_name(body);
        if name.is_empty() {
            return;
        }
        let attrs = body[name.len()..]
            .trim_end_matches('/')
            .trim()
            .to_string();
        let self_closing = body.ends_with('/') || VOID_ELEMENTS.contains(&name.as_str());
        let id = self.push_node(
            NodeKind::Element { tag: name, attrs },
            Some(current(stack)),
        );
        self.nodes[current(stack).0].children.push(id);
        if !self_closing {
            stack.push(id);
        }
    }

    fn push_node(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(RenderNode {
            kind,
            parent,
            children: Vec::new(),
        });
        id
    }

    /// Append a text leaf under `parent`
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.push_node(NodeKind::Text(text.to_string()), Some(parent));
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &RenderNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Result<&RenderNode, AnchorError> {
        self.nodes.get(id.0).ok_or(AnchorError::UnknownNode(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.nodes[0].children.is_empty()
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Text leaves in document order
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        self.walk(self.root(), &mut |id, node| {
            if matches!(node.kind, NodeKind::Text(_)) {
                leaves.push(id);
            }
        });
        leaves
    }

    /// Concatenated text of every leaf, as a structural traversal yields it
    pub fn leaf_text(&self) -> String {
        self.leaves()
            .into_iter()
            .filter_map(|id| self.text(id))
            .collect()
    }

    /// Pre-order traversal from `id`
    pub fn walk<F: FnMut(NodeId, &RenderNode)>(&self, id: NodeId, visit: &mut F) {
        // Explicit stack: unclosed `<p>`/`<li>` runs nest arbitrarily deep
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let node = self.node(id);
            visit(id, node);
            pending.extend(node.children.iter().rev());
        }
    }

    /// Serialize back to markup
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        let mut pending = vec![Step::Open(self.root())];

        while let Some(step) = pending.pop() {
            let id = match step {
                Step::Open(id) => id,
                Step::Close(tag) => {
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                    continue;
                }
            };
            let node = self.node(id);
            match &node.kind {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Root => {}
                NodeKind::Element { tag, attrs } => {
                    out.push('<');
                    out.push_str(tag);
                    if !attrs.is_empty() {
                        out.push(' ');
                        out.push_str(attrs);
                    }
                    out.push('>');
                    if VOID_ELEMENTS.contains(&tag.as_str()) && node.children.is_empty() {
                        continue;
                    }
                    pending.push(Step::Close(tag));
                }
            }
            pending.extend(node.children.iter().rev().map(|c| Step::Open(*c)));
        }

        out
    }

    /// Content identity of the tree
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_markup().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn position_in_parent(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.nodes.get(id.0)?.parent?;
        let index = self.nodes[parent.0].children.iter().position(|c| *c == id)?;
        Some((parent, index))
    }

    /// Chain from `id` up to the root, `id` first
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.nodes[current.0].parent {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Split a text node at a character offset.
    ///
    /// `id` keeps `[0, offset)`; the returned node holds the rest and becomes
    /// the next sibling. Offsets at either end do not split.
    pub fn split_text(
        &mut self,
        id: NodeId,
        offset: usize,
    ) -> Result<Option<NodeId>, AnchorError> {
        let text = self.text(id).ok_or(AnchorError::NotText(id))?;
        let char_len = text.chars().count();
        if offset > char_len {
            return Err(AnchorError::PointOutOfRange { node: id, offset });
        }
        if offset == 0 || offset == char_len {
            return Ok(None);
        }
        let byte = text
            .char_indices()
            .nth(offset)
            .map(|(b, _)| b)
            .unwrap_or(text.len());
        let tail = text[byte..].to_string();
        let (parent, index) = self
            .position_in_parent(id)
            .ok_or(AnchorError::UnknownNode(id))?;

        if let NodeKind::Text(text) = &mut self.nodes[id.0].kind {
            text.truncate(byte);
        }
        let new_id = self.push_node(NodeKind::Text(tail), Some(parent));
        self.nodes[parent.0].children.insert(index + 1, new_id);
        Ok(Some(new_id))
    }

    /// Split an element before child `at`.
    ///
    /// `id` keeps its first `at` children; a shallow copy of `id` holding the
    /// rest is inserted as its next sibling and returned.
    pub fn split_element(&mut self, id: NodeId, at: usize) -> Result<NodeId, AnchorError> {
        let (parent, index) = self
            .position_in_parent(id)
            .ok_or(AnchorError::UnknownNode(id))?;
        let kind = self.nodes[id.0].kind.clone();
        let moved = self.nodes[id.0].children.split_off(at);
        let copy = self.push_node(kind, Some(parent));
        for child in &moved {
            self.nodes[child.0].parent = Some(copy);
        }
        self.nodes[copy.0].children = moved;
        self.nodes[parent.0].children.insert(index + 1, copy);
        Ok(copy)
    }

    /// Insert a new, empty element as child `index` of `parent`
    pub fn insert_element(
        &mut self,
        parent: NodeId,
        index: usize,
        tag: &str,
        attrs: String,
    ) -> NodeId {
        let id = self.push_node(
            NodeKind::Element {
                tag: tag.to_string(),
                attrs,
            },
            Some(parent),
        );
        self.nodes[parent.0].children.insert(index, id);
        id
    }

    /// Move `parent`'s children in `range` to the end of `new_parent`
    pub fn reparent_children(
        &mut self,
        parent: NodeId,
        range: std::ops::Range<usize>,
        new_parent: NodeId,
    ) {
        let moved: Vec<NodeId> = self.nodes[parent.0].children.drain(range).collect();
        for child in &moved {
            self.nodes[child.0].parent = Some(new_parent);
        }
        self.nodes[new_parent.0].children.extend(moved);
    }

    /// Detach `id` from its parent. The arena slot stays allocated.
    pub fn detach(&mut self, id: NodeId) {
        if let Some((parent, index)) = self.position_in_parent(id) {
            self.nodes[parent.0].children.remove(index);
            self.nodes[id.0].parent = None;
        }
    }
}

/// Serializer work item
enum Step<'a> {
    Open(NodeId),
    Close(&'a str),
}

fn current(stack: &[NodeId]) -> NodeId {
    stack[stack.len() - 1]
}

fn tag_name(body: &str) -> String {
    body.trim_start()
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '/' && *c != '>')
        .collect::<String>()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::strip_markup;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_nests_elements() {
        let tree = RenderTree::parse("<p>Tenant <b>waives</b> notice</p>");
        let root = tree.node(tree.root());
        assert_eq!(root.children.len(), 1);
        let p = tree.node(root.children[0]);
        assert!(matches!(&p.kind, NodeKind::Element { tag, .. } if tag == "p"));
        assert_eq!(p.children.len(), 3);
        assert_eq!(tree.leaf_text(), "Tenant waives notice");
    }

    #[test]
    fn test_void_and_self_closing_elements_do_not_nest() {
        let tree = RenderTree::parse("a<br>b<img src=\"x\"/>c");
        let root = tree.node(tree.root());
        assert_eq!(root.children.len(), 5);
        assert_eq!(tree.leaf_text(), "abc");
    }

    #[test]
    fn test_comments_and_stray_closers_are_ignored() {
        let tree = RenderTree::parse("<!-- note --><p>x</span>y</p></div>z");
        assert_eq!(tree.leaf_text(), "xyz");
    }

    #[test]
    fn test_leaf_text_matches_strip_markup() {
        let inputs = [
            "<div><p>One</p>\n<p>Two &amp; <em>three</em></p></div>",
            "1 < 2 and <b>bold</b>",
            "<p>unclosed <i>italic",
            "<!-- a > b --> tail",
            "plain text only",
        ];
        for input in inputs {
            assert_eq!(RenderTree::parse(input).leaf_text(), strip_markup(input), "{input}");
        }
    }

    #[test]
    fn test_to_markup_round_trips_well_formed_input() {
        let input = "<p class=\"lead\">Hello <b>world</b><br></p>";
        assert_eq!(RenderTree::parse(input).to_markup(), input);
    }

    #[test]
    fn test_split_text_at_char_offset() {
        let mut tree = RenderTree::from_plain("héllo");
        let leaf = tree.leaves()[0];
        let tail = tree.split_text(leaf, 2).unwrap().unwrap();
        assert_eq!(tree.text(leaf), Some("hé"));
        assert_eq!(tree.text(tail), Some("llo"));
        assert_eq!(tree.leaves(), vec![leaf, tail]);
        assert_eq!(tree.split_text(leaf, 0).unwrap(), None);
        assert!(tree.split_text(leaf, 9).is_err());
    }

    #[test]
    fn test_split_element_moves_trailing_children() {
        let mut tree = RenderTree::parse("<p>a<b>b</b>c</p>");
        let p = tree.node(tree.root()).children[0];
        let copy = tree.split_element(p, 1).unwrap();
        assert_eq!(tree.to_markup(), "<p>a</p><p><b>b</b>c</p>");
        assert_eq!(tree.node(copy).children.len(), 2);
    }

    #[test]
    fn test_unclosed_paragraphs_nest_without_overflow() {
        let markup: String = (0..10_000).map(|i| format!("<p>Clause {i} text")).collect();
        let tree = RenderTree::parse(&markup);
        assert_eq!(tree.ancestors(*tree.leaves().last().unwrap()).len(), 10_002);
        assert_eq!(tree.leaves().len(), 10_000);
        assert!(tree.to_markup().starts_with(&markup));
        assert!(tree.to_markup().ends_with("</p></p>"));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = RenderTree::parse("<p>x</p>");
        let b = RenderTree::parse("<p>x</p>");
        let c = RenderTree::parse("<p>y</p>");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
