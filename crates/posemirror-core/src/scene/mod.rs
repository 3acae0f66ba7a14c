//! Scene graph arena
//!
//! Nodes live in a flat arena and refer to each other through [`NodeId`].
//! Each node stores its transform relative to its parent; world transforms
//! are computed on demand by walking the parent chain, so there is no cached
//! world matrix to invalidate after re-parenting.
//!
//! Two re-parenting flavours exist:
//! - [`SceneGraph::set_parent`] keeps the local transform (the node moves with its new parent)
//! - [`SceneGraph::attach`] keeps the world transform (the node stays put visually)

mod bounds;

pub use bounds::Aabb;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backend::{GeometryId, MaterialId};
use crate::math::{transform_point, Matrix4, Quaternion, Transform, Vector3};
use crate::{Error, Result};

/// Handle to a node in a [`SceneGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Index of the node in its arena
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Light types used by the stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Light {
    /// Sky / ground gradient light
    Hemisphere {
        sky_color: u32,
        ground_color: u32,
        intensity: f64,
    },
    /// Parallel light shining from the node position toward the origin
    Directional { color: u32, intensity: f64 },
}

/// What a node carries besides its transform
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NodeKind {
    /// Pure grouping node
    #[default]
    Group,
    /// Renderable geometry with local-space bounds
    Mesh {
        bounds: Aabb,
        material: Option<MaterialId>,
        geometry: Option<GeometryId>,
    },
    /// Light source
    Light(Light),
}

impl NodeKind {
    /// Mesh with bounds only (asset geometry)
    pub fn mesh(bounds: Aabb) -> Self {
        NodeKind::Mesh {
            bounds,
            material: None,
            geometry: None,
        }
    }
}

/// A single scene node
#[derive(Debug, Clone)]
pub struct Node {
    /// Node name, used for rig matching
    pub name: String,
    /// Transform relative to the parent
    pub local: Transform,
    /// Node payload
    pub kind: NodeKind,
    /// Hidden nodes are skipped by renderers
    pub visible: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    /// Parent node, if attached
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Direct children in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Arena of scene nodes rooted at a single scene node
#[derive(Debug, Clone)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    root: NodeId,
}

impl SceneGraph {
    /// Create a graph containing only the scene root
    pub fn new() -> Self {
        let root = Node {
            name: "Scene".to_string(),
            local: Transform::identity(),
            kind: NodeKind::Group,
            visible: true,
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// The scene root
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes ever created (detached ones included)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root exists
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Get a node
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Get a node mutably
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    fn get(&self, id: NodeId) -> Result<&Node> {
        self.node(id)
            .ok_or_else(|| Error::Scene(format!("unknown node {}", id)))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.node_mut(id)
            .ok_or_else(|| Error::Scene(format!("unknown node {}", id)))
    }

    /// Node name, empty for unknown ids
    pub fn name(&self, id: NodeId) -> &str {
        self.node(id).map(|n| n.name.as_str()).unwrap_or("")
    }

    /// Create a detached node
    pub fn add_node(&mut self, name: impl Into<String>, kind: NodeKind, local: Transform) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            name: name.into(),
            local,
            kind,
            visible: true,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Create a node under `parent`
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        kind: NodeKind,
        local: Transform,
    ) -> Result<NodeId> {
        self.get(parent)?;
        let id = self.add_node(name, kind, local);
        self.set_parent(id, parent)?;
        Ok(id)
    }

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Children of a node
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Local transform of a node
    pub fn local(&self, id: NodeId) -> Option<&Transform> {
        self.node(id).map(|n| &n.local)
    }

    /// Mutable local transform of a node
    pub fn local_mut(&mut self, id: NodeId) -> Option<&mut Transform> {
        self.node_mut(id).map(|n| &mut n.local)
    }

    /// True if `ancestor` is `id` or one of its ancestors
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Remove a node from its parent, keeping its subtree intact
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let parent = self.get(id)?.parent;
        if let Some(parent) = parent {
            self.get_mut(parent)?.children.retain(|&c| c != id);
            self.get_mut(id)?.parent = None;
        }
        Ok(())
    }

    /// Re-parent keeping the local transform
    pub fn set_parent(&mut self, id: NodeId, parent: NodeId) -> Result<()> {
        self.get(parent)?;
        if self.is_ancestor(id, parent) {
            return Err(Error::Scene(format!(
                "cannot parent {} under its own descendant {}",
                id, parent
            )));
        }
        self.detach(id)?;
        self.get_mut(parent)?.children.push(id);
        self.get_mut(id)?.parent = Some(parent);
        Ok(())
    }

    /// Re-parent keeping the world transform
    pub fn attach(&mut self, id: NodeId, parent: NodeId) -> Result<()> {
        let world = self.world_matrix(id)?;
        let parent_world = self.world_matrix(parent)?;
        let inv = parent_world
            .try_inverse()
            .ok_or_else(|| Error::Scene(format!("parent {} has a singular transform", parent)))?;
        self.set_parent(id, parent)?;
        self.get_mut(id)?.local = Transform::from_matrix(&(inv * world));
        Ok(())
    }

    /// World matrix of a node (product of the parent chain)
    pub fn world_matrix(&self, id: NodeId) -> Result<Matrix4> {
        let mut m = self.get(id)?.local.to_matrix();
        let mut cursor = self.get(id)?.parent;
        while let Some(parent) = cursor {
            let node = self.get(parent)?;
            m = node.local.to_matrix() * m;
            cursor = node.parent;
        }
        Ok(m)
    }

    /// World-space position of a node origin
    pub fn world_position(&self, id: NodeId) -> Result<Vector3> {
        let m = self.world_matrix(id)?;
        Ok(Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]))
    }

    /// World-space orientation of a node
    pub fn world_rotation(&self, id: NodeId) -> Result<Quaternion> {
        Ok(Transform::from_matrix(&self.world_matrix(id)?).rotation)
    }

    /// Convert a world-space point into a node's local space
    pub fn world_to_local(&self, id: NodeId, point: &Vector3) -> Result<Vector3> {
        let inv = self
            .world_matrix(id)?
            .try_inverse()
            .ok_or_else(|| Error::Scene(format!("node {} has a singular transform", id)))?;
        Ok(transform_point(&inv, point))
    }

    /// Depth-first pre-order traversal of a subtree, `id` included
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.node(current).is_none() {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// First node named `name` in a pre-order walk of the subtree
    pub fn find_by_name(&self, subtree: NodeId, name: &str) -> Option<NodeId> {
        self.descendants(subtree)
            .into_iter()
            .find(|&id| self.name(id) == name)
    }

    /// Name → node index of a subtree, first occurrence wins
    pub fn name_index(&self, subtree: NodeId) -> HashMap<String, NodeId> {
        let mut index = HashMap::new();
        for id in self.descendants(subtree) {
            let name = self.name(id);
            if !name.is_empty() && !index.contains_key(name) {
                index.insert(name.to_string(), id);
            }
        }
        index
    }

    /// World-space bounds of every mesh in a subtree
    pub fn world_bounds(&self, subtree: NodeId) -> Result<Aabb> {
        let mut out = Aabb::empty();
        for id in self.descendants(subtree) {
            if let NodeKind::Mesh { bounds, .. } = self.get(id)?.kind {
                out = out.union(&bounds.transformed(&self.world_matrix(id)?));
            }
        }
        Ok(out)
    }

    /// True if the node is reachable from the scene root
    pub fn is_in_scene(&self, id: NodeId) -> bool {
        self.node(id).is_some() && self.is_ancestor(self.root, id)
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn rotated_parent(graph: &mut SceneGraph) -> NodeId {
        let local = Transform::from_translation(1.0, 0.0, 0.0)
            .with_rotation(Quaternion::from_axis_angle(&Vector3::z(), PI / 2.0));
        graph
            .add_child(graph.root(), "parent", NodeKind::Group, local)
            .unwrap()
    }

    #[test]
    fn test_world_position_chain() {
        let mut graph = SceneGraph::new();
        let parent = rotated_parent(&mut graph);
        let child = graph
            .add_child(parent, "child", NodeKind::Group, Transform::from_translation(1.0, 0.0, 0.0))
            .unwrap();
        let p = graph.world_position(child).unwrap();
        assert_relative_eq!(p, Vector3::new(1.0, 1.0, 0.0), epsilon = 1e-10);
    }

    #[test]
    fn test_attach_preserves_world() {
        let mut graph = SceneGraph::new();
        let parent = rotated_parent(&mut graph);
        let child = graph
            .add_child(parent, "child", NodeKind::Group, Transform::from_translation(0.5, 0.2, 0.1))
            .unwrap();
        let before = graph.world_matrix(child).unwrap();
        graph.attach(child, graph.root()).unwrap();
        assert_eq!(graph.parent(child), Some(graph.root()));
        assert_relative_eq!(graph.world_matrix(child).unwrap(), before, epsilon = 1e-10);
    }

    #[test]
    fn test_set_parent_keeps_local() {
        let mut graph = SceneGraph::new();
        let parent = rotated_parent(&mut graph);
        let child = graph
            .add_child(graph.root(), "child", NodeKind::Group, Transform::from_translation(1.0, 0.0, 0.0))
            .unwrap();
        graph.set_parent(child, parent).unwrap();
        assert_relative_eq!(
            graph.local(child).unwrap().translation,
            Vector3::new(1.0, 0.0, 0.0)
        );
        assert_relative_eq!(
            graph.world_position(child).unwrap(),
            Vector3::new(1.0, 1.0, 0.0),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_cycle_rejected() {
        let mut graph = SceneGraph::new();
        let a = graph.add_child(graph.root(), "a", NodeKind::Group, Transform::identity()).unwrap();
        let b = graph.add_child(a, "b", NodeKind::Group, Transform::identity()).unwrap();
        assert!(matches!(graph.set_parent(a, b), Err(Error::Scene(_))));
    }

    #[test]
    fn test_find_by_name_first_match() {
        let mut graph = SceneGraph::new();
        let a = graph.add_child(graph.root(), "dup", NodeKind::Group, Transform::identity()).unwrap();
        let _b = graph.add_child(a, "dup", NodeKind::Group, Transform::identity()).unwrap();
        assert_eq!(graph.find_by_name(graph.root(), "dup"), Some(a));
        assert_eq!(graph.name_index(graph.root()).get("dup"), Some(&a));
        assert_eq!(graph.find_by_name(graph.root(), "missing"), None);
    }

    #[test]
    fn test_world_bounds_and_detach() {
        let mut graph = SceneGraph::new();
        let group = graph
            .add_child(graph.root(), "group", NodeKind::Group, Transform::from_translation(0.0, 2.0, 0.0))
            .unwrap();
        let mesh = graph
            .add_child(group, "mesh", NodeKind::mesh(Aabb::from_half_extents(0.5, 0.5, 0.5)), Transform::identity())
            .unwrap();
        let b = graph.world_bounds(group).unwrap();
        assert_relative_eq!(b.min.y, 1.5);
        assert_relative_eq!(b.max.y, 2.5);

        graph.detach(group).unwrap();
        assert!(!graph.is_in_scene(mesh));
        assert!(graph.children(graph.root()).is_empty());
    }
}
