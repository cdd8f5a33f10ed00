//! Wraps lookup candidates in a live document with addressable markers.
//!
//! Annotation only ever splits text nodes: each candidate becomes a `mark`
//! element holding the original text, so unwrapping every marker and merging
//! the text back restores the exact text content of the subtree.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::dom::{Document, Mutation, MutationReceiver, NodeId};
use crate::script::{TokenPattern, pattern_for};
use crate::session::Session;
use crate::text::{fold, lookup_key};

pub const MARKER_TAG: &str = "mark";
pub const MARKER_CLASS: &str = "word-lookup-mark";
pub const MARKER_KEY_ATTR: &str = "data-lookup";
/// Element id of the overlay; its subtree is never annotated.
pub const OVERLAY_ID: &str = "word-lookup-tooltip";

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "textarea", "input", "select", "option", "template",
];

/// An annotated candidate in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub node: NodeId,
    /// Cleaned lookup key, case preserved.
    pub key: String,
    /// Text as it appears on the page.
    pub text: String,
}

pub struct Annotator {
    session: Arc<Session>,
    pattern: &'static TokenPattern,
    mutations: Option<MutationReceiver>,
}

impl Annotator {
    pub fn new(session: Arc<Session>) -> Self {
        let pattern = pattern_for(session.language());
        Self {
            session,
            pattern,
            mutations: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.mutations.is_some()
    }

    /// Subscribes to host insertions and annotates the whole document once.
    pub fn attach(&mut self, doc: &mut Document) -> usize {
        self.mutations = Some(doc.subscribe());
        let root = doc.root();
        self.annotate(doc, root)
    }

    /// Stops following the document and unwraps every marker.
    pub fn detach(&mut self, doc: &mut Document) -> usize {
        self.mutations = None;
        let root = doc.root();
        self.restore(doc, root)
    }

    /// Annotates only the subtrees inserted since the last call.
    pub fn process_mutations(&mut self, doc: &mut Document) -> usize {
        let Some(rx) = self.mutations.as_mut() else {
            return 0;
        };
        let mut inserted = Vec::new();
        while let Ok(Mutation::Inserted(node)) = rx.try_recv() {
            if !inserted.contains(&node) {
                inserted.push(node);
            }
        }
        let mut created = 0;
        for &node in &inserted {
            // A node inside another inserted subtree is covered by that subtree.
            let nested = doc
                .ancestors_inclusive(node)
                .skip(1)
                .any(|ancestor| inserted.contains(&ancestor));
            if nested || !doc.is_connected(node) {
                continue;
            }
            created += self.annotate(doc, node);
        }
        if created > 0 {
            debug!(subtrees = inserted.len(), markers = created, "annotated inserted subtrees");
        }
        created
    }

    /// Wraps every candidate under `root` in a marker and returns how many
    /// markers were created. Running it again on an unchanged subtree creates
    /// none.
    pub fn annotate(&self, doc: &mut Document, root: NodeId) -> usize {
        if doc
            .ancestors_inclusive(root)
            .skip(1)
            .any(|ancestor| is_opaque(doc, ancestor))
        {
            return 0;
        }
        let mut text_nodes = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if doc.text(node).is_some() {
                text_nodes.push(node);
            } else if !is_opaque(doc, node) {
                stack.extend(doc.children(node).iter().rev().copied());
            }
        }

        let mut created = 0;
        for node in text_nodes {
            created += self.wrap_text_node(doc, node);
        }
        created
    }

    fn wrap_text_node(&self, doc: &mut Document, node: NodeId) -> usize {
        let Some(text) = doc.text(node).map(str::to_string) else {
            return 0;
        };
        let candidates: Vec<_> = self
            .pattern
            .candidates(&text)
            .into_iter()
            .filter(|c| !self.session.is_dead(c.text))
            .collect();
        if candidates.is_empty() {
            return 0;
        }

        let mut pieces = Vec::with_capacity(candidates.len() * 2 + 1);
        let mut last = 0;
        for candidate in &candidates {
            if candidate.start > last {
                pieces.push(doc.create_text(&text[last..candidate.start]));
            }
            let attrs = vec![
                ("class".to_string(), MARKER_CLASS.to_string()),
                (MARKER_KEY_ATTR.to_string(), lookup_key(candidate.text)),
            ];
            let mark = doc.create_element(MARKER_TAG, attrs);
            let inner = doc.create_text(candidate.text);
            doc.append_quietly(mark, inner);
            pieces.push(mark);
            last = candidate.end;
        }
        if last < text.len() {
            pieces.push(doc.create_text(&text[last..]));
        }
        doc.replace_quietly(node, &pieces);
        candidates.len()
    }

    /// Unwraps every marker under `root` back into plain text and merges the
    /// text runs it leaves behind.
    pub fn restore(&self, doc: &mut Document, root: NodeId) -> usize {
        let markers: Vec<_> = self.markers(doc, root).into_iter().map(|m| m.node).collect();
        unwrap_markers(doc, &markers)
    }

    /// Unwraps the markers whose key folds to the same form as `key`.
    pub fn prune(&self, doc: &mut Document, key: &str) -> usize {
        let folded = fold(key);
        let root = doc.root();
        let doomed: Vec<_> = self
            .markers(doc, root)
            .into_iter()
            .filter(|m| fold(&m.key) == folded)
            .map(|m| m.node)
            .collect();
        unwrap_markers(doc, &doomed)
    }

    /// Unwraps markers for every key the session has recorded as unusable.
    pub fn prune_dead(&self, doc: &mut Document) -> usize {
        let root = doc.root();
        let doomed: Vec<_> = self
            .markers(doc, root)
            .into_iter()
            .filter(|m| self.session.is_dead(&m.key))
            .map(|m| m.node)
            .collect();
        unwrap_markers(doc, &doomed)
    }

    pub fn markers(&self, doc: &Document, root: NodeId) -> Vec<Marker> {
        doc.descendants(root)
            .into_iter()
            .filter_map(|node| marker_of(doc, node))
            .collect()
    }
}

/// The marker that `node` is, or sits inside of.
pub fn marker_at(doc: &Document, node: NodeId) -> Option<Marker> {
    doc.ancestors_inclusive(node)
        .find_map(|candidate| marker_of(doc, candidate))
}

fn marker_of(doc: &Document, node: NodeId) -> Option<Marker> {
    let el = doc.element(node)?;
    if el.tag != MARKER_TAG || !el.has_class(MARKER_CLASS) {
        return None;
    }
    Some(Marker {
        node,
        key: el.attr(MARKER_KEY_ATTR).unwrap_or_default().to_string(),
        text: doc.text_content(node),
    })
}

/// Elements whose text is never annotated: non-content elements, editable
/// regions, existing markers and the overlay itself.
fn is_opaque(doc: &Document, node: NodeId) -> bool {
    let Some(el) = doc.element(node) else {
        return false;
    };
    SKIPPED_TAGS.contains(&el.tag.as_str())
        || el.attr("contenteditable").is_some_and(|v| v != "false")
        || el.attr("id") == Some(OVERLAY_ID)
        || (el.tag == MARKER_TAG && el.has_class(MARKER_CLASS))
}

fn unwrap_markers(doc: &mut Document, markers: &[NodeId]) -> usize {
    let mut parents = HashSet::new();
    for &marker in markers {
        let Some(parent) = doc.parent(marker) else {
            continue;
        };
        let text = doc.text_content(marker);
        let replacement = doc.create_text(&text);
        doc.replace_quietly(marker, &[replacement]);
        parents.insert(parent);
    }
    for parent in parents {
        doc.normalize(parent);
    }
    if !markers.is_empty() {
        debug!(markers = markers.len(), "unwrapped markers");
    }
    markers.len()
}
