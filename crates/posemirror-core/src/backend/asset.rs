//! Decoded model description
//!
//! A backend's loader turns a model file into a flat list of named nodes with
//! their local transforms and optional mesh bounds. Parents always precede
//! their children.

use serde::{Deserialize, Serialize};

use crate::math::Transform;
use crate::scene::{Aabb, NodeId, NodeKind, SceneGraph};
use crate::{Error, Result};

/// One node of a decoded model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetNode {
    /// Node name as authored
    pub name: String,
    /// Index of the parent in [`AssetScene::nodes`]
    #[serde(default)]
    pub parent: Option<usize>,
    /// Transform relative to the parent
    #[serde(default)]
    pub transform: Transform,
    /// Local-space bounds when the node carries geometry
    #[serde(default)]
    pub bounds: Option<Aabb>,
}

/// A decoded model ready to be instantiated into a scene graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetScene {
    /// Nodes in parent-first order
    pub nodes: Vec<AssetNode>,
}

impl AssetScene {
    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let scene: AssetScene = serde_json::from_str(json)?;
        scene.validate()?;
        Ok(scene)
    }

    /// Check that every parent index points to an earlier node
    pub fn validate(&self) -> Result<()> {
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                if parent >= i {
                    return Err(Error::AssetLoad(format!(
                        "node '{}' references parent {} which does not precede it",
                        node.name, parent
                    )));
                }
            }
        }
        Ok(())
    }

    /// Copy the model into `graph` under a new group named `root_name`
    ///
    /// Returns the group. Top-level asset nodes become its children.
    pub fn instantiate(&self, graph: &mut SceneGraph, parent: NodeId, root_name: &str) -> Result<NodeId> {
        self.validate()?;
        let root = graph.add_child(parent, root_name, NodeKind::Group, Transform::identity())?;
        let mut ids = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let kind = match node.bounds {
                Some(bounds) => NodeKind::mesh(bounds),
                None => NodeKind::Group,
            };
            let parent_id = node.parent.map(|p| ids[p]).unwrap_or(root);
            ids.push(graph.add_child(parent_id, node.name.clone(), kind, node.transform)?);
        }
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_minimal() {
        let json = r#"{"nodes":[
            {"name":"base_link"},
            {"name":"Torso_link","parent":0,"transform":{"translation":[0.0,0.0,0.5]}},
            {"name":"Head","parent":1,"bounds":{"min":[-0.1,-0.1,-0.1],"max":[0.1,0.1,0.1]}}
        ]}"#;
        let asset = AssetScene::from_json(json).unwrap();
        assert_eq!(asset.nodes.len(), 3);
        assert_eq!(asset.nodes[1].transform.translation.z, 0.5);
        assert_eq!(asset.nodes[1].transform.scale.x, 1.0);

        let mut graph = SceneGraph::new();
        let scene_root = graph.root();
        let root = asset.instantiate(&mut graph, scene_root, "Model").unwrap();
        let head = graph.find_by_name(root, "Head").unwrap();
        let torso = graph.find_by_name(root, "Torso_link").unwrap();
        assert_eq!(graph.parent(head), Some(torso));
    }

    #[test]
    fn test_forward_parent_rejected() {
        let asset = AssetScene {
            nodes: vec![AssetNode {
                name: "a".into(),
                parent: Some(0),
                transform: Transform::identity(),
                bounds: None,
            }],
        };
        assert!(matches!(asset.validate(), Err(Error::AssetLoad(_))));
    }
}
