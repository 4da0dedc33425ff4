//! The renderable node tree.
//!
//! [`Node`] is the input of every render function. Elements are built with
//! the [`Element`] builder, components are closures that produce a node, and
//! [`Suspense`] marks a region that may stream in after its fallback.

use crate::error::Interrupt;
use crate::thenable::Thenable;
use crate::tree::{KeyPath, TreeContext};
use reinhardt_ssr_markup::attributes::AttrValue;
use reinhardt_ssr_markup::style::StyleMap;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A node of the tree being rendered.
#[derive(Debug, Clone)]
pub enum Node {
	/// Renders nothing.
	Empty,
	/// Escaped text.
	Text(Cow<'static, str>),
	/// A number, written as text.
	Number(f64),
	/// Pre-escaped markup written verbatim.
	Raw(Cow<'static, str>),
	/// An element.
	Element(Element),
	/// A component invoked during the render.
	Component(Component),
	/// Several nodes without a wrapper.
	Fragment(Vec<Node>),
	/// A node with an explicit key for position tracking.
	Keyed {
		/// The key.
		key: Cow<'static, str>,
		/// The keyed node.
		node: Box<Node>,
	},
	/// A suspense boundary.
	Suspense(Suspense),
	/// Coordinates the reveal order of child boundaries.
	SuspenseList(SuspenseList),
	/// A node that is itself a pending value.
	Await(Thenable<Node>),
}

impl Default for Node {
	fn default() -> Self {
		Node::Empty
	}
}

impl Node {
	/// Creates an empty node.
	pub fn empty() -> Self {
		Node::Empty
	}

	/// Creates a text node.
	pub fn text(text: impl Into<Cow<'static, str>>) -> Self {
		Node::Text(text.into())
	}

	/// Creates a raw markup node. The content is not escaped.
	pub fn raw(html: impl Into<Cow<'static, str>>) -> Self {
		Node::Raw(html.into())
	}

	/// Creates a fragment.
	pub fn fragment(children: impl IntoIterator<Item = impl IntoNode>) -> Self {
		Node::Fragment(children.into_iter().map(IntoNode::into_node).collect())
	}

	/// Wraps `node` with an explicit key.
	pub fn keyed(key: impl Into<Cow<'static, str>>, node: impl IntoNode) -> Self {
		Node::Keyed {
			key: key.into(),
			node: Box::new(node.into_node()),
		}
	}

	/// Creates a component node.
	pub fn component<F>(name: impl Into<Cow<'static, str>>, render: F) -> Self
	where
		F: Fn(&mut ComponentCx<'_>) -> Result<Node, Interrupt> + Send + Sync + 'static,
	{
		Node::Component(Component::new(name, render))
	}

	/// Creates a suspense boundary.
	pub fn suspense(fallback: impl IntoNode, children: impl IntoNode) -> Self {
		Node::Suspense(Suspense::new(fallback, children))
	}

	/// Creates a suspense list.
	pub fn suspense_list(
		reveal_order: RevealOrder,
		children: impl IntoIterator<Item = impl IntoNode>,
	) -> Self {
		Node::SuspenseList(SuspenseList {
			reveal_order,
			children: children.into_iter().map(IntoNode::into_node).collect(),
		})
	}

	/// Creates a node that renders the value of `thenable` once it settles.
	pub fn deferred(thenable: Thenable<Node>) -> Self {
		Node::Await(thenable)
	}
}

/// Builder for an element node.
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_renderer::node::{Element, Node};
///
/// let card = Element::new("section")
///     .attr("className", "card")
///     .bool_attr("hidden", false)
///     .child(Element::new("h2").child("Title"))
///     .child("Body");
/// assert_eq!(card.tag(), "section");
/// assert_eq!(card.child_nodes().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Element {
	tag: Cow<'static, str>,
	attrs: Vec<(Cow<'static, str>, AttrValue)>,
	children: Vec<Node>,
	inner_html: Option<Cow<'static, str>>,
}

impl Element {
	/// Creates a new element.
	pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
		Self {
			tag: tag.into(),
			attrs: Vec::new(),
			children: Vec::new(),
			inner_html: None,
		}
	}

	/// Adds an attribute.
	pub fn attr(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<AttrValue>) -> Self {
		self.attrs.push((name.into(), value.into()));
		self
	}

	/// Adds a boolean attribute.
	pub fn bool_attr(self, name: impl Into<Cow<'static, str>>, value: bool) -> Self {
		self.attr(name, AttrValue::Bool(value))
	}

	/// Sets the inline style.
	pub fn style(self, style: StyleMap) -> Self {
		self.attr("style", AttrValue::Style(style))
	}

	/// Adds a child node.
	pub fn child(mut self, child: impl IntoNode) -> Self {
		self.children.push(child.into_node());
		self
	}

	/// Adds multiple child nodes.
	pub fn children(mut self, children: impl IntoIterator<Item = impl IntoNode>) -> Self {
		self.children
			.extend(children.into_iter().map(IntoNode::into_node));
		self
	}

	/// Sets pre-escaped inner markup. Mutually exclusive with children.
	pub fn inner_html(mut self, html: impl Into<Cow<'static, str>>) -> Self {
		self.inner_html = Some(html.into());
		self
	}

	/// Returns the tag name.
	pub fn tag(&self) -> &str {
		&self.tag
	}

	/// Returns the attributes in insertion order.
	pub fn attrs(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
		self.attrs.iter().map(|(n, v)| (n.as_ref(), v))
	}

	/// Returns the value of the last attribute named `name`.
	pub fn get_attr(&self, name: &str) -> Option<&AttrValue> {
		self.attrs
			.iter()
			.rev()
			.find(|(n, _)| n == name)
			.map(|(_, v)| v)
	}

	/// Returns the child nodes.
	pub fn child_nodes(&self) -> &[Node] {
		&self.children
	}

	/// Returns the inner markup, if set.
	pub fn inner_html_content(&self) -> Option<&str> {
		self.inner_html.as_deref()
	}
}

type RenderFn = dyn Fn(&mut ComponentCx<'_>) -> Result<Node, Interrupt> + Send + Sync;

/// A function component.
///
/// Components run synchronously during the walk. A component that needs a
/// value that is not ready returns the [`Interrupt`] produced by
/// [`ComponentCx::read`]; the renderer calls it again once the value settles.
#[derive(Clone)]
pub struct Component {
	name: Cow<'static, str>,
	render: Arc<RenderFn>,
}

impl Component {
	/// Creates a component.
	pub fn new<F>(name: impl Into<Cow<'static, str>>, render: F) -> Self
	where
		F: Fn(&mut ComponentCx<'_>) -> Result<Node, Interrupt> + Send + Sync + 'static,
	{
		Self {
			name: name.into(),
			render: Arc::new(render),
		}
	}

	/// Returns the component name.
	pub fn name(&self) -> &str {
		&self.name
	}

	pub(crate) fn call(&self, cx: &mut ComponentCx<'_>) -> Result<Node, Interrupt> {
		(self.render)(cx)
	}
}

impl fmt::Debug for Component {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Component").field("name", &self.name).finish()
	}
}

/// What a component can see and do while it renders.
pub struct ComponentCx<'a> {
	key_path: &'a KeyPath,
	tree: &'a TreeContext,
	identifier_prefix: &'a str,
	local_ids: u32,
}

impl<'a> ComponentCx<'a> {
	pub(crate) fn new(key_path: &'a KeyPath, tree: &'a TreeContext, identifier_prefix: &'a str) -> Self {
		Self {
			key_path,
			tree,
			identifier_prefix,
			local_ids: 0,
		}
	}

	/// Returns the settled value of `thenable`, or the interrupt that
	/// suspends this component until it settles.
	pub fn read<T: Clone + Send + 'static>(&self, thenable: &Thenable<T>) -> Result<T, Interrupt> {
		match thenable.get() {
			Some(Ok(value)) => Ok(value),
			Some(Err(error)) => Err(Interrupt::Error(error)),
			None => Err(Interrupt::Suspend(thenable.wakeable())),
		}
	}

	/// Returns the interrupt that leaves this component's subtree for a
	/// later resume. Outside a prerender it is reported as an error.
	pub fn postpone(&self, reason: impl Into<String>) -> Interrupt {
		Interrupt::Postpone(reason.into())
	}

	/// Returns an id that is unique within the render and identical on every
	/// render of the same tree.
	pub fn use_id(&mut self) -> String {
		let local = self.local_ids;
		self.local_ids += 1;
		let mut id = format!(":{}R{}", self.identifier_prefix, self.tree.tree_id());
		if local > 0 {
			id.push('H');
			id.push_str(&local.to_string());
		}
		id.push(':');
		id
	}

	/// Returns the key path of this component.
	pub fn key_path(&self) -> &KeyPath {
		self.key_path
	}
}

/// A suspense boundary: `children` stream in after `fallback` if they are
/// not ready when the surrounding content is flushed.
#[derive(Debug, Clone)]
pub struct Suspense {
	pub(crate) fallback: Box<Node>,
	pub(crate) children: Box<Node>,
}

impl Suspense {
	/// Creates a boundary.
	pub fn new(fallback: impl IntoNode, children: impl IntoNode) -> Self {
		Self {
			fallback: Box::new(fallback.into_node()),
			children: Box::new(children.into_node()),
		}
	}
}

/// Order in which the boundaries of a [`SuspenseList`] are revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevealOrder {
	/// Each boundary as soon as it is ready.
	#[default]
	Independent,
	/// In document order.
	Forwards,
	/// In reverse document order.
	Backwards,
	/// All at once.
	Together,
}

/// Children whose boundaries are revealed in a coordinated order.
#[derive(Debug, Clone)]
pub struct SuspenseList {
	pub(crate) reveal_order: RevealOrder,
	pub(crate) children: Vec<Node>,
}

/// Conversion into a [`Node`].
pub trait IntoNode {
	/// Converts self into a Node.
	fn into_node(self) -> Node;
}

impl IntoNode for Node {
	fn into_node(self) -> Node {
		self
	}
}

impl IntoNode for Element {
	fn into_node(self) -> Node {
		Node::Element(self)
	}
}

impl IntoNode for Component {
	fn into_node(self) -> Node {
		Node::Component(self)
	}
}

impl IntoNode for Suspense {
	fn into_node(self) -> Node {
		Node::Suspense(self)
	}
}

impl IntoNode for String {
	fn into_node(self) -> Node {
		Node::Text(Cow::Owned(self))
	}
}

impl IntoNode for &'static str {
	fn into_node(self) -> Node {
		Node::Text(Cow::Borrowed(self))
	}
}

impl IntoNode for Cow<'static, str> {
	fn into_node(self) -> Node {
		Node::Text(self)
	}
}

macro_rules! impl_into_node_number {
	($($ty:ty),*) => {
		$(impl IntoNode for $ty {
			fn into_node(self) -> Node {
				Node::Number(self as f64)
			}
		})*
	};
}

impl_into_node_number!(i32, i64, u32, u64, usize, f64);

impl<T: IntoNode> IntoNode for Option<T> {
	fn into_node(self) -> Node {
		match self {
			Some(v) => v.into_node(),
			None => Node::Empty,
		}
	}
}

impl<T: IntoNode> IntoNode for Vec<T> {
	fn into_node(self) -> Node {
		Node::Fragment(self.into_iter().map(IntoNode::into_node).collect())
	}
}

impl IntoNode for Thenable<Node> {
	fn into_node(self) -> Node {
		Node::Await(self)
	}
}
