// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared pieces for the demos: a terminal "DOM" render target and logging setup.

use std::fmt::Write as _;

use understory_reconciler::{PropValue, Props, RenderTarget};

/// Install a `tracing` subscriber that honours `RUST_LOG`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();
}

/// Handle to a node of a [`TerminalDom`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// The container every demo renders into.
    pub const ROOT: Self = Self(0);
}

#[derive(Debug)]
enum Content {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug)]
struct Node {
    content: Content,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An in-memory tree printed as indented markup.
///
/// Every mutation is logged at `info`, and [`mutations`](Self::mutations)
/// counts them so demos can show how little work an update took.
#[derive(Debug)]
pub struct TerminalDom {
    nodes: Vec<Node>,
    mutations: usize,
    microtask_requested: bool,
}

impl Default for TerminalDom {
    fn default() -> Self {
        Self {
            nodes: vec![Node {
                content: Content::Element {
                    tag: "body".into(),
                    attrs: Vec::new(),
                },
                parent: None,
                children: Vec::new(),
            }],
            mutations: 0,
            microtask_requested: false,
        }
    }
}

impl TerminalDom {
    /// Number of container mutations performed so far.
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    /// Whether sync work asked for a microtask; clears the request.
    pub fn take_microtask(&mut self) -> bool {
        std::mem::take(&mut self.microtask_requested)
    }

    /// Indented markup of everything below the root.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for &child in &self.nodes[0].children {
            self.write_node(child, 0, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = &self.nodes[id.0];
        let indent = "  ".repeat(depth);
        match &node.content {
            Content::Text(text) => {
                let _ = writeln!(out, "{indent}{text:?}");
            }
            Content::Element { tag, attrs } => {
                let _ = write!(out, "{indent}<{tag}");
                for (name, value) in attrs {
                    let _ = write!(out, " {name}={value}");
                }
                let _ = writeln!(out, ">");
                for &child in &node.children {
                    self.write_node(child, depth + 1, out);
                }
            }
        }
    }

    fn push(&mut self, content: Content) -> NodeId {
        self.nodes.push(Node {
            content,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != child);
        }
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        self.detach(child);
        let children = &mut self.nodes[parent.0].children;
        let at = before
            .and_then(|before| children.iter().position(|&c| c == before))
            .unwrap_or(children.len());
        children.insert(at, child);
        self.nodes[child.0].parent = Some(parent);
    }
}

fn format_attrs(props: &Props) -> Vec<(String, String)> {
    props
        .attrs
        .iter()
        .filter_map(|(name, value)| {
            let value = match value {
                PropValue::Null | PropValue::Callback(_) => return None,
                PropValue::Bool(b) => b.to_string(),
                PropValue::Int(i) => i.to_string(),
                PropValue::Float(f) => f.to_string(),
                PropValue::Str(s) => format!("{s:?}"),
            };
            Some((name.to_string(), value))
        })
        .collect()
}

impl RenderTarget for TerminalDom {
    type Instance = NodeId;

    fn create_instance(&mut self, tag: &str, props: &Props) -> NodeId {
        self.push(Content::Element {
            tag: tag.into(),
            attrs: format_attrs(props),
        })
    }

    fn create_text_instance(&mut self, text: &str) -> NodeId {
        self.push(Content::Text(text.into()))
    }

    fn append_initial_child(&mut self, parent: &NodeId, child: &NodeId) {
        self.attach(*parent, *child, None);
    }

    fn append_child_to_container(&mut self, child: &NodeId, container: &NodeId) {
        tracing::info!(?child, ?container, "append");
        self.mutations += 1;
        self.attach(*container, *child, None);
    }

    fn insert_child_to_container(&mut self, child: &NodeId, container: &NodeId, before: &NodeId) {
        tracing::info!(?child, ?container, ?before, "insert");
        self.mutations += 1;
        self.attach(*container, *child, Some(*before));
    }

    fn remove_child(&mut self, child: &NodeId, container: &NodeId) {
        tracing::info!(?child, ?container, "remove");
        self.mutations += 1;
        self.detach(*child);
    }

    fn commit_update(&mut self, instance: &NodeId, props: &Props) {
        tracing::info!(?instance, "update attributes");
        self.mutations += 1;
        if let Content::Element { attrs, .. } = &mut self.nodes[instance.0].content {
            *attrs = format_attrs(props);
        }
    }

    fn commit_text_update(&mut self, instance: &NodeId, text: &str) {
        tracing::info!(?instance, text, "update text");
        self.mutations += 1;
        self.nodes[instance.0].content = Content::Text(text.into());
    }

    fn schedule_microtask(&mut self) {
        self.microtask_requested = true;
    }
}
