//! Following `UOL` links between nodes of an image.

use std::collections::HashSet;

use crate::{
    error::{Error, Result},
    tree::{Image, NodeId},
    value::Value,
};

impl Image {
    /// One step of a link: walk `path` starting at the parent of `link`
    fn follow(&self, link: NodeId, path: &str) -> Option<NodeId> {
        let mut node = self.parent(link)?;
        for segment in path.split('/') {
            node = match segment {
                "" | "." => node,
                ".." => self.parent(node)?,
                name => self.child(node, name)?,
            };
        }
        Some(node)
    }

    /// The node `id` stands for.
    ///
    /// Chains of links are followed until a node that is not a link. A node
    /// that is not a link resolves to itself, and so does a link whose chain
    /// is broken or loops back on itself.
    pub fn resolve(&self, id: NodeId) -> NodeId {
        let mut visited = HashSet::new();
        let mut current = id;
        loop {
            let Value::Uol(path) = self.value(current) else {
                return current;
            };
            if !visited.insert(current) {
                return id;
            }
            match self.follow(current, path) {
                Some(next) => current = next,
                None => return id,
            }
        }
    }

    /// Like [`Image::resolve`] but reports a broken link as an error
    pub fn try_resolve(&self, id: NodeId) -> Result<NodeId> {
        let target = self.resolve(id);
        if target == id && matches!(self.value(id), Value::Uol(_)) {
            return Err(Error::LinkBroken {
                path: self.path(id),
            });
        }
        Ok(target)
    }

    /// Look up `path` below the root, resolving links along the way
    pub fn get_resolved(&self, path: &str) -> Option<NodeId> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self.root(), |node, segment| {
                self.child(self.resolve(node), segment)
            })
            .map(|node| self.resolve(node))
    }

    /// Paths of every reachable link that does not resolve
    pub fn broken_links(&self) -> Vec<String> {
        self.descendants(self.root())
            .into_iter()
            .filter(|&id| self.try_resolve(id).is_err())
            .map(|id| self.path(id))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use wz_crypto::Keystream;

    use crate::{
        error::{Error, Result},
        tree::Image,
        value::Value,
    };

    fn image() -> Image {
        Image::new("Effect.img", Arc::new(Keystream::neutral()))
    }

    #[test]
    fn self_reference_is_broken() -> Result<()> {
        let mut image = image();
        let root = image.root();
        let link = image.add_child(root, "loop", Value::Uol("loop".into()))?;

        assert_eq!(image.resolve(link), link);
        assert!(matches!(image.try_resolve(link), Err(Error::LinkBroken { path }) if path == "loop"));
        assert_eq!(image.broken_links(), vec!["loop".to_string()]);
        Ok(())
    }

    #[test]
    fn two_link_cycle_is_broken() -> Result<()> {
        let mut image = image();
        let root = image.root();
        let a = image.add_child(root, "a", Value::Uol("b".into()))?;
        let b = image.add_child(root, "b", Value::Uol("a".into()))?;
        assert_eq!(image.resolve(a), a);
        assert_eq!(image.resolve(b), b);
        Ok(())
    }

    #[test]
    fn three_hop_chain() -> Result<()> {
        let mut image = image();
        let root = image.root();
        let skill = image.add_child(root, "skill", Value::Property)?;
        let effect = image.add_child(skill, "effect", Value::Property)?;
        let frame = image.add_child(effect, "0", Value::Int(7))?;

        let hit = image.add_child(skill, "hit", Value::Property)?;
        let first = image.add_child(hit, "0", Value::Uol("../effect/0".into()))?;
        let second = image.add_child(hit, "1", Value::Uol("0".into()))?;
        let third = image.add_child(root, "alias", Value::Uol("skill/hit/1".into()))?;

        assert_eq!(image.resolve(first), frame);
        assert_eq!(image.resolve(second), frame);
        assert_eq!(image.resolve(third), frame);
        assert!(image.broken_links().is_empty());
        Ok(())
    }

    #[test]
    fn missing_target_and_climbing_past_the_root() -> Result<()> {
        let mut image = image();
        let root = image.root();
        let missing = image.add_child(root, "missing", Value::Uol("nowhere".into()))?;
        let escape = image.add_child(root, "escape", Value::Uol("../../x".into()))?;
        assert_eq!(image.resolve(missing), missing);
        assert_eq!(image.resolve(escape), escape);
        assert_eq!(image.broken_links().len(), 2);
        Ok(())
    }

    #[test]
    fn lookup_through_links() -> Result<()> {
        let mut image = image();
        let root = image.root();
        let real = image.add_child(root, "real", Value::Property)?;
        let leaf = image.add_child(real, "x", Value::Short(3))?;
        image.add_child(root, "alias", Value::Uol("real".into()))?;

        assert_eq!(image.get("alias/x"), None);
        assert_eq!(image.get_resolved("alias/x"), Some(leaf));
        Ok(())
    }

    #[test]
    fn non_links_resolve_to_themselves() -> Result<()> {
        let mut image = image();
        let root = image.root();
        let leaf = image.add_child(root, "x", Value::Null)?;
        assert_eq!(image.try_resolve(leaf)?, leaf);
        Ok(())
    }
}
