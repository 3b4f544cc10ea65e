//! The in-memory property tree of a single image.
//!
//! Nodes live in an arena owned by [`Image`] and refer to each other through
//! [`NodeId`]s. Removing a node only unlinks it, so ids stay valid for the
//! lifetime of the image.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use derive_more::{Display, From, Into};
use wz_canvas::Bitmap;
use wz_crypto::Keystream;

use crate::{
    error::{Error, Result},
    value::Value,
};

/// Index of a node inside its [`Image`]
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, From, Into)]
#[display("#{_0}")]
pub struct NodeId(usize);

/// A named value with its place in the tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    value: Value,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` for the root and for nodes that were removed
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// A parsed image: the root node, its descendants, and the body the lazy
/// payloads point into
#[derive(Debug)]
pub struct Image {
    nodes: Vec<Node>,
    root: NodeId,
    pub(crate) source: Option<Arc<[u8]>>,
    pub(crate) keystream: Arc<Keystream>,
    pub(crate) bitmaps: Mutex<HashMap<NodeId, Arc<Bitmap>>>,
}

impl Image {
    /// An empty property image
    pub fn new(name: impl Into<String>, keystream: Arc<Keystream>) -> Self {
        Self::with_root(name.into(), Value::Property, keystream)
    }

    /// A script image holding `source` in plain text
    pub fn script(name: impl Into<String>, keystream: Arc<Keystream>, source: &[u8]) -> Self {
        let mut data = source.to_vec();
        keystream.xor(&mut data);
        Self::with_root(name.into(), Value::Script(data), keystream)
    }

    fn with_root(name: String, value: Value, keystream: Arc<Keystream>) -> Self {
        Self {
            nodes: vec![Node {
                name,
                parent: None,
                children: Vec::new(),
                value,
            }],
            root: NodeId(0),
            source: None,
            keystream,
            bitmaps: Mutex::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.node(self.root).name
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn keystream(&self) -> &Arc<Keystream> {
        &self.keystream
    }

    /// The image body this tree was parsed from, if any
    pub fn source(&self) -> Option<&Arc<[u8]>> {
        self.source.as_ref()
    }

    /// The decrypted script source of a script image
    pub fn script_source(&self) -> Option<Vec<u8>> {
        match self.value(self.root) {
            Value::Script(data) => {
                let mut data = data.clone();
                self.keystream.xor(&mut data);
                Some(data)
            }
            _ => None,
        }
    }

    /// # Panics
    ///
    /// When `id` was not handed out by this image
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn value(&self, id: NodeId) -> &Value {
        &self.node(id).value
    }

    pub(crate) fn value_mut(&mut self, id: NodeId) -> &mut Value {
        &mut self.nodes[id.0].value
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// First child of `id` called `name`
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&child| self.node(child).name == name)
    }

    /// Look up a `/` separated path below the root
    pub fn get(&self, path: &str) -> Option<NodeId> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self.root, |node, segment| self.child(node, segment))
    }

    /// Path of `id` from the root, without the image name
    pub fn path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            segments.push(self.node(current).name.as_str());
            current = parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// `id` and everything below it, parents before children
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    /// Number of nodes reachable from the root
    pub fn len(&self) -> usize {
        self.descendants(self.root).len()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    /// Append a node without checking the parent kind
    pub(crate) fn push(&mut self, parent: NodeId, name: String, value: Value) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name,
            parent: Some(parent),
            children: Vec::new(),
            value,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Add a child to a container node
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>, value: Value) -> Result<NodeId> {
        let container = self.value(parent);
        if !container.accepts_children() {
            return Err(Error::Validation(format!(
                "{} node {} cannot have children",
                container.kind(),
                self.path(parent)
            )));
        }
        if matches!(container, Value::Convex) && !value.is_extended() {
            return Err(Error::Validation(format!(
                "convex node {} only holds extended values, not {}",
                self.path(parent),
                value.kind()
            )));
        }
        if matches!(value, Value::Script(_)) {
            return Err(Error::Validation("scripts can only be image roots".into()));
        }
        Ok(self.push(parent, name.into(), value))
    }

    /// Unlink `id` from its parent
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        let parent = self
            .parent(id)
            .ok_or_else(|| Error::Validation(format!("node {id} has no parent to be removed from")))?;
        self.nodes[parent.0].children.retain(|&child| child != id);
        self.nodes[id.0].parent = None;
        Ok(())
    }

    pub fn rename(&mut self, id: NodeId, name: impl Into<String>) {
        self.nodes[id.0].name = name.into();
    }

    /// Replace the value of `id`.
    ///
    /// Nodes with children can only take values that accept children.
    pub fn set_value(&mut self, id: NodeId, value: Value) -> Result<()> {
        if !self.children(id).is_empty() && !value.accepts_children() {
            return Err(Error::Validation(format!(
                "node {} has children and cannot become a {}",
                self.path(id),
                value.kind()
            )));
        }
        if id != self.root && matches!(value, Value::Script(_)) {
            return Err(Error::Validation("scripts can only be image roots".into()));
        }
        self.nodes[id.0].value = value;
        self.forget_bitmap(id);
        Ok(())
    }

    /// Remove `id` and move it with its subtree into a new image.
    ///
    /// The new image shares this image's body, so lazy payloads stay
    /// readable after this image is dropped.
    pub fn detach(&mut self, id: NodeId) -> Result<Image> {
        if id == self.root {
            return Err(Error::Validation("the root cannot be detached".into()));
        }

        let mut image = Image::with_root(
            self.node(id).name.clone(),
            self.value(id).clone(),
            self.keystream.clone(),
        );
        image.source = self.source.clone();

        let mut stack = vec![(id, image.root)];
        while let Some((from, to)) = stack.pop() {
            for &child in self.children(from) {
                let node = self.node(child);
                let copy = image.push(to, node.name.clone(), node.value.clone());
                stack.push((child, copy));
            }
        }

        self.remove(id)?;
        Ok(image)
    }

    pub(crate) fn forget_bitmap(&self, id: NodeId) {
        if let Ok(mut bitmaps) = self.bitmaps.lock() {
            bitmaps.remove(&id);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use wz_crypto::{Keystream, WellKnownKey};

    use crate::{
        error::{Error, Result},
        tree::Image,
        value::{Canvas, Value, Vector},
    };

    fn sample() -> Result<Image> {
        let mut image = Image::new("Mob.img", Arc::new(Keystream::neutral()));
        let root = image.root();
        let info = image.add_child(root, "info", Value::Property)?;
        image.add_child(info, "level", Value::Int(10))?;
        image.add_child(info, "level", Value::Int(20))?;
        let stand = image.add_child(root, "stand", Value::Property)?;
        let frame = image.add_child(stand, "0", Value::Canvas(Canvas::default()))?;
        image.add_child(frame, "origin", Value::Vector(Vector { x: 1, y: 2 }))?;
        Ok(image)
    }

    #[test]
    fn lookup_returns_the_first_match() -> Result<()> {
        let image = sample()?;
        let level = image.get("info/level").ok_or(Error::NotFound("level".into()))?;
        assert_eq!(image.value(level), &Value::Int(10));
        assert_eq!(image.path(level), "info/level");
        assert_eq!(image.get("info/missing"), None);
        Ok(())
    }

    #[test]
    fn descendants_are_in_tree_order() -> Result<()> {
        let image = sample()?;
        let names = image
            .descendants(image.root())
            .into_iter()
            .map(|id| image.node(id).name().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, ["Mob.img", "info", "level", "level", "stand", "0", "origin"]);
        assert_eq!(image.len(), 7);
        Ok(())
    }

    #[test]
    fn leaves_reject_children() -> Result<()> {
        let mut image = sample()?;
        let level = image.get("info/level").ok_or(Error::NotFound("level".into()))?;
        let result = image.add_child(level, "x", Value::Null);
        assert!(matches!(result, Err(Error::Validation(_))));
        Ok(())
    }

    #[test]
    fn convex_only_holds_extended_values() -> Result<()> {
        let mut image = sample()?;
        let root = image.root();
        let convex = image.add_child(root, "shape", Value::Convex)?;
        image.add_child(convex, "0", Value::Vector(Vector::default()))?;
        assert!(image.add_child(convex, "1", Value::Int(1)).is_err());
        Ok(())
    }

    #[test]
    fn containers_with_children_keep_their_kind() -> Result<()> {
        let mut image = sample()?;
        let info = image.get("info").ok_or(Error::NotFound("info".into()))?;
        assert!(image.set_value(info, Value::Int(1)).is_err());
        image.set_value(info, Value::Convex)?;
        Ok(())
    }

    #[test]
    fn removed_nodes_are_unreachable() -> Result<()> {
        let mut image = sample()?;
        let info = image.get("info").ok_or(Error::NotFound("info".into()))?;
        image.remove(info)?;
        assert_eq!(image.get("info/level"), None);
        assert_eq!(image.len(), 4);
        assert!(image.remove(image.root()).is_err());
        Ok(())
    }

    #[test]
    fn detach_moves_the_subtree() -> Result<()> {
        let mut image = sample()?;
        let stand = image.get("stand").ok_or(Error::NotFound("stand".into()))?;
        let detached = image.detach(stand)?;

        assert_eq!(image.get("stand"), None);
        assert_eq!(detached.name(), "stand");
        let origin = detached.get("0/origin").ok_or(Error::NotFound("origin".into()))?;
        assert_eq!(detached.value(origin), &Value::Vector(Vector { x: 1, y: 2 }));
        Ok(())
    }

    #[test]
    fn script_source_roundtrip() {
        let keystream = Arc::new(Keystream::new(WellKnownKey::Gms.into()));
        let image = Image::script("Script.img", keystream, b"print('hi')");
        assert_ne!(image.value(image.root()), &Value::Script(b"print('hi')".to_vec()));
        assert_eq!(image.script_source(), Some(b"print('hi')".to_vec()));
    }
}
