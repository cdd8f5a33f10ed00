//! A small live text tree: elements and text nodes in an arena, with
//! subscribers notified of inserted subtrees.
//!
//! This stands in for a host page. The annotation engine only reads and
//! rewrites it through the methods here; insertions made by the host are
//! reported to every subscriber as [`Mutation::Inserted`].

use scraper::{Html, Node as HtmlNode};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::text::escape_html;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|value| value.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(Element),
    Text(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Inserted(NodeId),
}

pub type MutationReceiver = UnboundedReceiver<Mutation>;

pub(crate) const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr",
];

#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
    root: NodeId,
    subscribers: Vec<UnboundedSender<Mutation>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty document whose root is a `body` element.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            subscribers: Vec::new(),
        };
        doc.root = doc.create_element("body", Vec::new());
        doc
    }

    /// Parses an HTML fragment into a fresh document under `body`.
    pub fn from_html(html: &str) -> Self {
        let mut doc = Self::new();
        let root = doc.root;
        doc.import_fragment(html, root);
        doc
    }

    /// Copies a parsed fragment under `parent`, returning the new top-level
    /// nodes. Comments and doctypes are dropped.
    fn import_fragment(&mut self, html: &str, parent: NodeId) -> Vec<NodeId> {
        let fragment = Html::parse_fragment(html);
        let mut top_level = Vec::new();
        let mut stack: Vec<_> = fragment
            .root_element()
            .children()
            .map(|child| (child, parent))
            .collect();
        stack.reverse();
        while let Some((node, parent_id)) = stack.pop() {
            let id = match node.value() {
                HtmlNode::Element(el) => {
                    let attrs = el
                        .attrs()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    self.create_element(el.name(), attrs)
                }
                HtmlNode::Text(text) => self.create_text(text),
                _ => continue,
            };
            self.attach(parent_id, id, None);
            if parent_id == parent {
                top_level.push(id);
            }
            let children: Vec<_> = node.children().collect();
            for child in children.into_iter().rev() {
                stack.push((child, id));
            }
        }
        top_level
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Registers a new subscriber for host insertions.
    pub fn subscribe(&mut self) -> MutationReceiver {
        let (tx, rx) = unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self, mutation: Mutation) {
        self.subscribers.retain(|tx| tx.send(mutation).is_ok());
    }

    pub fn create_element(&mut self, tag: &str, attrs: Vec<(String, String)>) -> NodeId {
        self.push(NodeKind::Element(Element {
            tag: tag.to_ascii_lowercase(),
            attrs,
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Host insertion: appends `child` under `parent` and notifies subscribers.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.attach(parent, child, None);
        self.notify(Mutation::Inserted(child));
    }

    /// Host insertion before `reference`, which must be a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        let index = self.index_in_parent(parent, reference);
        self.attach(parent, child, index);
        self.notify(Mutation::Inserted(child));
    }

    /// Host insertion of parsed HTML at the end of `parent`.
    pub fn append_html(&mut self, parent: NodeId, html: &str) -> Vec<NodeId> {
        let inserted = self.import_fragment(html, parent);
        for &id in &inserted {
            self.notify(Mutation::Inserted(id));
        }
        inserted
    }

    /// Detaches `node` from its parent. The node stays in the arena and can be
    /// re-inserted.
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    /// Swaps `node` for `replacements` in place without notifying subscribers.
    /// Used for rewrites that must not be mistaken for host insertions.
    pub(crate) fn replace_quietly(&mut self, node: NodeId, replacements: &[NodeId]) {
        let Some(parent) = self.nodes[node.0].parent else {
            return;
        };
        let Some(index) = self.index_in_parent(parent, node) else {
            return;
        };
        self.nodes[parent.0].children.remove(index);
        self.nodes[node.0].parent = None;
        for (offset, &replacement) in replacements.iter().enumerate() {
            self.detach(replacement);
            self.nodes[replacement.0].parent = Some(parent);
            self.nodes[parent.0]
                .children
                .insert(index + offset, replacement);
        }
    }

    pub(crate) fn append_quietly(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.attach(parent, child, None);
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        match index {
            Some(i) if i <= children.len() => children.insert(i, child),
            _ => children.push(child),
        }
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
    }

    fn index_in_parent(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.nodes[parent.0].children.iter().position(|&c| c == child)
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element(_) => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// True if `node` is reachable from the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.ancestors_inclusive(node).last() == Some(self.root)
    }

    /// `node` followed by each of its ancestors up to the root.
    pub fn ancestors_inclusive(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(node), move |&n| self.parent(n))
    }

    /// Pre-order traversal of the subtree rooted at `node`.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// Merges adjacent text children of `node` and drops empty ones.
    pub fn normalize(&mut self, node: NodeId) {
        let children = self.nodes[node.0].children.clone();
        let mut kept: Vec<NodeId> = Vec::with_capacity(children.len());
        for child in children {
            let Some(text) = self.text(child).map(str::to_string) else {
                kept.push(child);
                continue;
            };
            if text.is_empty() {
                self.nodes[child.0].parent = None;
                continue;
            }
            match kept.last().copied() {
                Some(prev) if self.text(prev).is_some() => {
                    if let NodeKind::Text(prev_text) = &mut self.nodes[prev.0].kind {
                        prev_text.push_str(&text);
                    }
                    self.nodes[child.0].parent = None;
                }
                _ => kept.push(child),
            }
        }
        self.nodes[node.0].children = kept;
    }

    /// Serializes the children of `node`.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(node) {
            self.write_html(child, &mut out);
        }
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            NodeKind::Text(text) => out.push_str(&escape_html(text)),
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for (key, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape_html(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&el.tag.as_str()) {
                    return;
                }
                for &child in self.children(node) {
                    self.write_html(child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }

    /// First element in the subtree with the given `id` attribute.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&n| self.element(n).and_then(|el| el.attr("id")) == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_serializes() {
        let doc = Document::from_html("<p class=\"x\">Hello <b>world</b></p><br>tail");
        assert_eq!(
            doc.inner_html(doc.root()),
            "<p class=\"x\">Hello <b>world</b></p><br>tail"
        );
        assert_eq!(doc.text_content(doc.root()), "Hello worldtail");
    }

    #[test]
    fn host_insertions_notify_subscribers() {
        let mut doc = Document::new();
        let mut rx = doc.subscribe();
        let p = doc.create_element("p", Vec::new());
        let root = doc.root();
        doc.append_child(root, p);
        assert_eq!(rx.try_recv().ok(), Some(Mutation::Inserted(p)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn quiet_replacement_does_not_notify() {
        let mut doc = Document::from_html("<p>abc</p>");
        let mut rx = doc.subscribe();
        let p = doc.children(doc.root())[0];
        let text = doc.children(p)[0];
        let a = doc.create_text("a");
        let b = doc.create_text("bc");
        doc.replace_quietly(text, &[a, b]);
        assert_eq!(doc.children(p), &[a, b]);
        assert!(rx.try_recv().is_err());
        assert!(!doc.is_connected(text));
    }

    #[test]
    fn normalize_merges_adjacent_text() {
        let mut doc = Document::from_html("<p>a</p>");
        let p = doc.children(doc.root())[0];
        let b = doc.create_text("b");
        let empty = doc.create_text("");
        let c = doc.create_text("c");
        doc.append_quietly(p, b);
        doc.append_quietly(p, empty);
        doc.append_quietly(p, c);
        doc.normalize(p);
        assert_eq!(doc.children(p).len(), 1);
        assert_eq!(doc.text_content(p), "abc");
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let mut doc = Document::new();
        let rx = doc.subscribe();
        drop(rx);
        let p = doc.create_element("p", Vec::new());
        let root = doc.root();
        doc.append_child(root, p);
        assert!(doc.subscribers.is_empty());
    }
}
