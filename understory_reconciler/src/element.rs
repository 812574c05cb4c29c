// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Declarative tree descriptions.
//!
//! An [`Element`] describes what one position of the tree should look like
//! after the next commit. Elements are cheap to clone: props are reference
//! counted and shared with the fibers built from them.
//!
//! ```
//! use understory_reconciler::element::{Element, PropValue};
//!
//! let list = Element::host("ul").with_children([
//!     Element::host("li").with_key("a").with_child(Element::text("first")),
//!     Element::host("li").with_key("b").with_child(Element::text("second")),
//! ]);
//! assert_eq!(list.props.children.len(), 2);
//! assert_eq!(
//!     Element::host("input").with_attr("value", 3).props.attrs.get("value"),
//!     Some(&PropValue::Int(3)),
//! );
//! ```

use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::any::Any;
use core::cell::RefCell;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::RenderError;
use crate::hooks::Hooks;

/// Host element tag, e.g. `"div"`.
pub type Tag = Cow<'static, str>;

/// Stable identity of an element within its sibling group.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Cow<'static, str>);

impl Key {
    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Key {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Self(Cow::Owned(value.to_string()))
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Self(Cow::Owned(value.to_string()))
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Self(Cow::Owned(value.to_string()))
    }
}

/// A host-side callback carried as a prop. Compared by identity.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn()>);

impl Callback {
    /// Wrap `f`.
    pub fn new(f: impl Fn() + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the callback.
    pub fn call(&self) {
        (self.0)();
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// A single attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    /// Absent or cleared.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// String.
    Str(Cow<'static, str>),
    /// Host callback, e.g. a click handler.
    Callback(Callback),
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&'static str> for PropValue {
    fn from(value: &'static str) -> Self {
        Self::Str(Cow::Borrowed(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Str(Cow::Owned(value))
    }
}

impl From<Callback> for PropValue {
    fn from(value: Callback) -> Self {
        Self::Callback(value)
    }
}

/// Value carried by a context provider.
pub type ContextValue = Rc<dyn Any>;

/// Props of an element. Shared between the element and the fibers built from it.
#[derive(Clone, Default)]
pub struct Props {
    /// Content-bearing attributes; host updates are raised when these change.
    pub attrs: BTreeMap<Cow<'static, str>, PropValue>,
    /// Child descriptions.
    pub children: Vec<Element>,
    /// Text content of a text element.
    pub text: Option<Cow<'static, str>>,
    /// Value published by a provider element.
    pub context_value: Option<ContextValue>,
}

impl Props {
    /// Look up an attribute.
    pub fn attr(&self, name: &str) -> Option<&PropValue> {
        self.attrs.get(name)
    }

    /// Whether the content a host instance renders differs between `self` and `other`.
    pub fn content_differs(&self, other: &Self) -> bool {
        self.attrs != other.attrs || self.text != other.text
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.attrs)
            .field("children", &self.children)
            .field("text", &self.text)
            .field("context_value", &self.context_value.is_some())
            .finish()
    }
}

type RenderFn = dyn Fn(&mut Hooks<'_>, &Props) -> Result<Element, RenderError>;

/// A function component.
///
/// Identity is the render function's allocation: build a component once and
/// clone it into every element that uses it. Two components built from the
/// same closure body are still different kinds and remount on swap.
#[derive(Clone)]
pub struct Component {
    name: Cow<'static, str>,
    render: Rc<RenderFn>,
}

impl Component {
    /// A component whose render cannot fail.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        render: impl Fn(&mut Hooks<'_>, &Props) -> Element + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            render: Rc::new(move |hooks: &mut Hooks<'_>, props: &Props| {
                Ok::<_, RenderError>(render(hooks, props))
            }),
        }
    }

    /// A component whose render may fail.
    pub fn fallible(
        name: impl Into<Cow<'static, str>>,
        render: impl Fn(&mut Hooks<'_>, &Props) -> Result<Element, RenderError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            render: Rc::new(render),
        }
    }

    /// Display name, used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_owned(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    pub(crate) fn render(
        &self,
        hooks: &mut Hooks<'_>,
        props: &Props,
    ) -> Result<Element, RenderError> {
        (self.render)(hooks, props)
    }

    /// Whether `self` and `other` are the same component.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Identifier of a [`Context`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u32);

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(0);

/// A value scoped to a subtree, read with [`Hooks::use_context`].
#[derive(Clone, Debug)]
pub struct Context<T> {
    id: ContextId,
    default: T,
}

impl<T: Clone + 'static> Context<T> {
    /// A new context with its own identity.
    pub fn new(default: T) -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            default,
        }
    }

    /// This context's identity.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Value read when no provider is above the reader.
    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// A provider element publishing `value` to `children`.
    pub fn provider(&self, value: T, children: impl IntoIterator<Item = Element>) -> Element {
        let mut element = Element::new(ElementType::Provider(self.id)).with_children(children);
        Rc::make_mut(&mut element.props).context_value = Some(Rc::new(value));
        element
    }
}

/// Handle the commit attaches a host instance to.
///
/// The instance is stored type-erased; read it back with [`NodeRef::get`].
#[derive(Clone, Default)]
pub struct NodeRef(Rc<RefCell<Option<Box<dyn Any>>>>);

impl NodeRef {
    /// An empty ref.
    pub fn new() -> Self {
        Self::default()
    }

    /// The attached instance, if any and if it has type `T`.
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.0
            .borrow()
            .as_ref()
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Whether an instance is attached.
    pub fn is_attached(&self) -> bool {
        self.0.borrow().is_some()
    }

    pub(crate) fn attach(&self, instance: Box<dyn Any>) {
        *self.0.borrow_mut() = Some(instance);
    }

    pub(crate) fn detach(&self) {
        *self.0.borrow_mut() = None;
    }

    /// Whether both handles are the same ref.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.is_attached()).finish()
    }
}

/// Kind of an element.
#[derive(Clone, Debug)]
pub enum ElementType {
    /// A host node with the given tag.
    Host(Tag),
    /// A host text node; content is `props.text`.
    Text,
    /// A function component.
    Component(Component),
    /// A transparent grouping of children.
    Fragment,
    /// A context provider; value is `props.context_value`.
    Provider(ContextId),
}

/// Description of one tree position.
#[derive(Clone, Debug)]
pub struct Element {
    /// What kind of node this is.
    pub ty: ElementType,
    /// Identity among siblings; unkeyed elements match by index.
    pub key: Option<Key>,
    /// Ref to attach the host instance to.
    pub node_ref: Option<NodeRef>,
    /// Props, shared with the fibers built from this element.
    pub props: Rc<Props>,
}

impl Element {
    /// An element of kind `ty` with empty props.
    pub fn new(ty: ElementType) -> Self {
        Self {
            ty,
            key: None,
            node_ref: None,
            props: Rc::new(Props::default()),
        }
    }

    /// A host element.
    pub fn host(tag: impl Into<Tag>) -> Self {
        Self::new(ElementType::Host(tag.into()))
    }

    /// A text node.
    pub fn text(content: impl Into<Cow<'static, str>>) -> Self {
        let mut element = Self::new(ElementType::Text);
        Rc::make_mut(&mut element.props).text = Some(content.into());
        element
    }

    /// A component element with empty props.
    pub fn component(component: &Component) -> Self {
        Self::new(ElementType::Component(component.clone()))
    }

    /// A fragment grouping `children`.
    pub fn fragment(children: impl IntoIterator<Item = Self>) -> Self {
        Self::new(ElementType::Fragment).with_children(children)
    }

    /// An element that renders nothing.
    pub fn empty() -> Self {
        Self::new(ElementType::Fragment)
    }

    /// Set the key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the ref.
    #[must_use]
    pub fn with_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    /// Set an attribute.
    #[must_use]
    pub fn with_attr(
        mut self,
        name: impl Into<Cow<'static, str>>,
        value: impl Into<PropValue>,
    ) -> Self {
        Rc::make_mut(&mut self.props)
            .attrs
            .insert(name.into(), value.into());
        self
    }

    /// Append one child.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        Rc::make_mut(&mut self.props).children.push(child);
        self
    }

    /// Append several children.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        Rc::make_mut(&mut self.props).children.extend(children);
        self
    }

    /// Whether this is an unkeyed fragment, which reconciles as its children.
    pub(crate) fn is_unkeyed_fragment(&self) -> bool {
        self.key.is_none() && matches!(self.ty, ElementType::Fragment)
    }
}
