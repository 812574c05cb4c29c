// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A recording render target for tests.

use alloc::borrow::ToOwned;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::element::{PropValue, Props};
use crate::host::RenderTarget;

/// Instance id of the container every test root renders into.
pub(crate) const CONTAINER: u32 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Create(u32, String),
    CreateText(u32, String),
    AppendInitial { parent: u32, child: u32 },
    Append { parent: u32, child: u32 },
    Insert { parent: u32, child: u32, before: u32 },
    Remove { parent: u32, child: u32 },
    Update(u32),
    TextUpdate(u32, String),
    Microtask,
}

#[derive(Debug)]
struct Node {
    tag: String,
    text: Option<String>,
    attrs: BTreeMap<String, PropValue>,
    parent: Option<u32>,
    children: Vec<u32>,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_owned(),
            text: None,
            attrs: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

/// In-memory tree plus a log of every call the reconciler made.
#[derive(Debug)]
pub(crate) struct TestHost {
    nodes: BTreeMap<u32, Node>,
    next_id: u32,
    pub(crate) ops: Vec<Op>,
}

impl Default for TestHost {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(CONTAINER, Node::new("root"));
        Self {
            nodes,
            next_id: CONTAINER + 1,
            ops: Vec::new(),
        }
    }
}

impl TestHost {
    pub(crate) fn take_ops(&mut self) -> Vec<Op> {
        core::mem::take(&mut self.ops)
    }

    pub(crate) fn children(&self, id: u32) -> &[u32] {
        &self.nodes[&id].children
    }

    pub(crate) fn attr(&self, id: u32, name: &str) -> Option<&PropValue> {
        self.nodes[&id].attrs.get(name)
    }

    /// Serialize the subtree under `id`, e.g. `<ul><li>a</li></ul>`.
    pub(crate) fn markup(&self, id: u32) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_markup(child, &mut out);
        }
        out
    }

    fn write_markup(&self, id: u32, out: &mut String) {
        let node = &self.nodes[&id];
        if let Some(text) = &node.text {
            out.push_str(text);
            return;
        }
        out.push('<');
        out.push_str(&node.tag);
        out.push('>');
        for &child in &node.children {
            self.write_markup(child, out);
        }
        out.push_str("</");
        out.push_str(&node.tag);
        out.push('>');
    }

    fn alloc(&mut self, node: Node) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    fn detach(&mut self, child: u32) {
        if let Some(parent) = self.nodes.get_mut(&child).and_then(|n| n.parent.take()) {
            self.nodes
                .get_mut(&parent)
                .expect("parent exists")
                .children
                .retain(|&c| c != child);
        }
    }

    fn attach(&mut self, parent: u32, child: u32, before: Option<u32>) {
        self.detach(child);
        let siblings = &mut self.nodes.get_mut(&parent).expect("parent exists").children;
        let at = before
            .and_then(|b| siblings.iter().position(|&c| c == b))
            .unwrap_or(siblings.len());
        siblings.insert(at, child);
        self.nodes.get_mut(&child).expect("child exists").parent = Some(parent);
    }

    fn copy_attrs(props: &Props) -> BTreeMap<String, PropValue> {
        props
            .attrs
            .iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.clone()))
            .collect()
    }
}

impl RenderTarget for TestHost {
    type Instance = u32;

    fn create_instance(&mut self, tag: &str, props: &Props) -> u32 {
        let mut node = Node::new(tag);
        node.attrs = Self::copy_attrs(props);
        let id = self.alloc(node);
        self.ops.push(Op::Create(id, tag.to_owned()));
        id
    }

    fn create_text_instance(&mut self, text: &str) -> u32 {
        let mut node = Node::new("#text");
        node.text = Some(text.to_owned());
        let id = self.alloc(node);
        self.ops.push(Op::CreateText(id, text.to_owned()));
        id
    }

    fn append_initial_child(&mut self, parent: &u32, child: &u32) {
        self.attach(*parent, *child, None);
        self.ops.push(Op::AppendInitial {
            parent: *parent,
            child: *child,
        });
    }

    fn append_child_to_container(&mut self, child: &u32, container: &u32) {
        self.attach(*container, *child, None);
        self.ops.push(Op::Append {
            parent: *container,
            child: *child,
        });
    }

    fn insert_child_to_container(&mut self, child: &u32, container: &u32, before: &u32) {
        self.attach(*container, *child, Some(*before));
        self.ops.push(Op::Insert {
            parent: *container,
            child: *child,
            before: *before,
        });
    }

    fn remove_child(&mut self, child: &u32, container: &u32) {
        assert_eq!(
            self.nodes[child].parent,
            Some(*container),
            "removed child must belong to the container"
        );
        self.detach(*child);
        self.ops.push(Op::Remove {
            parent: *container,
            child: *child,
        });
    }

    fn commit_update(&mut self, instance: &u32, props: &Props) {
        let attrs = Self::copy_attrs(props);
        self.nodes.get_mut(instance).expect("instance exists").attrs = attrs;
        self.ops.push(Op::Update(*instance));
    }

    fn commit_text_update(&mut self, instance: &u32, text: &str) {
        self.nodes.get_mut(instance).expect("instance exists").text = Some(text.to_owned());
        self.ops.push(Op::TextUpdate(*instance, text.to_owned()));
    }

    fn schedule_microtask(&mut self) {
        self.ops.push(Op::Microtask);
    }
}
