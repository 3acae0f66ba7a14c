//! Ground plane anchoring and per-frame contact correction
//!
//! The plane is placed once under the lowest contact geometry. For legged
//! robots the model root is then nudged every frame so the contact nodes
//! stay at the height they had at rest, which keeps the feet on the floor
//! when hip motion would otherwise lift or sink them.

use serde::Serialize;

use crate::scene::{NodeId, SceneGraph};

/// Lowest point found among a set of contact nodes
#[derive(Debug, Clone, PartialEq)]
pub struct ContactHeight {
    pub min_y: f64,
    /// Name of the node holding the lowest point
    pub source: String,
}

/// Minimum world-bounds Y over the named nodes under `subtree`
pub fn lowest_contact(graph: &SceneGraph, subtree: NodeId, names: &[String]) -> Option<ContactHeight> {
    let mut best: Option<ContactHeight> = None;
    for name in names {
        let Some(node) = graph.find_by_name(subtree, name) else {
            continue;
        };
        let Ok(bounds) = graph.world_bounds(node) else {
            continue;
        };
        if bounds.is_empty() || !bounds.min.y.is_finite() {
            continue;
        }
        if best.as_ref().map_or(true, |b| bounds.min.y < b.min_y) {
            best = Some(ContactHeight {
                min_y: bounds.min.y,
                source: name.clone(),
            });
        }
    }
    best
}

/// Move the ground plane under the lowest contact plus `padding`
///
/// Returns the new plane height, or `None` when nothing moved (no contact
/// found, or already within `epsilon`).
pub fn anchor_plane(
    graph: &mut SceneGraph,
    plane: NodeId,
    model: NodeId,
    names: &[String],
    padding: f64,
    epsilon: f64,
) -> Option<f64> {
    let Some(contact) = lowest_contact(graph, model, names) else {
        tracing::warn!("no contact geometry found to anchor the ground plane: {:?}", names);
        return None;
    };
    let target = contact.min_y + padding;
    let local = graph.local_mut(plane)?;
    if (target - local.translation.y).abs() <= epsilon {
        return None;
    }
    local.translation.y = target;
    tracing::debug!("ground plane anchored at y={:.4} (lowest: {})", target, contact.source);
    Some(target)
}

/// One applied ground correction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroundCorrection {
    pub baseline_y: f64,
    pub contact_y: f64,
    /// Unclamped drift of the contacts from the baseline
    pub delta: f64,
    /// Vertical offset removed from the model root
    pub applied: f64,
}

/// Keeps contact nodes at their rest height
#[derive(Debug, Clone)]
pub struct GroundStabilizer {
    model_root: NodeId,
    contacts: Vec<NodeId>,
    baseline_y: f64,
    max_correction: f64,
    epsilon: f64,
    last_contact_y: Option<f64>,
    last_correction: Option<GroundCorrection>,
}

fn min_origin_y(graph: &SceneGraph, nodes: &[NodeId]) -> Option<f64> {
    nodes
        .iter()
        .filter_map(|&n| graph.world_position(n).ok())
        .map(|p| p.y)
        .filter(|y| y.is_finite())
        .reduce(f64::min)
}

impl GroundStabilizer {
    /// Capture the rest height of the contact nodes
    ///
    /// Without any contact node the baseline falls back to
    /// `fallback_baseline` (the model's lowest bound), then to zero.
    pub fn capture(
        graph: &SceneGraph,
        model_root: NodeId,
        names: &[String],
        fallback_baseline: f64,
        max_correction: f64,
        epsilon: f64,
    ) -> Self {
        let contacts: Vec<NodeId> = names
            .iter()
            .filter_map(|name| graph.find_by_name(model_root, name))
            .collect();
        if contacts.is_empty() {
            tracing::warn!("no contact nodes among {:?}, stabilizing on model bounds", names);
        }
        let baseline_y = min_origin_y(graph, &contacts)
            .or(Some(fallback_baseline).filter(|y| y.is_finite()))
            .unwrap_or(0.0);
        Self {
            model_root,
            contacts,
            baseline_y,
            max_correction: max_correction.abs(),
            epsilon,
            last_contact_y: None,
            last_correction: None,
        }
    }

    pub fn baseline_y(&self) -> f64 {
        self.baseline_y
    }

    pub fn contacts(&self) -> &[NodeId] {
        &self.contacts
    }

    pub fn last_contact_y(&self) -> Option<f64> {
        self.last_contact_y
    }

    pub fn last_correction(&self) -> Option<GroundCorrection> {
        self.last_correction
    }

    /// Measure contact drift and shift the model root to cancel it
    ///
    /// The shift is clamped to `±max_correction` per call; drift within
    /// `epsilon` is left alone.
    pub fn stabilize(&mut self, graph: &mut SceneGraph) -> Option<GroundCorrection> {
        let contact_y = min_origin_y(graph, &self.contacts).or_else(|| {
            graph
                .world_bounds(self.model_root)
                .ok()
                .filter(|b| !b.is_empty())
                .map(|b| b.min.y)
                .filter(|y| y.is_finite())
        })?;
        self.last_contact_y = Some(contact_y);

        let delta = contact_y - self.baseline_y;
        if delta.abs() <= self.epsilon {
            return None;
        }
        let applied = delta.clamp(-self.max_correction, self.max_correction);
        let local = graph.local_mut(self.model_root)?;
        local.translation.y -= applied;

        let correction = GroundCorrection {
            baseline_y: self.baseline_y,
            contact_y,
            delta,
            applied,
        };
        tracing::trace!("ground correction {:?}", correction);
        self.last_correction = Some(correction);
        Some(correction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Transform;
    use crate::scene::{Aabb, NodeKind};
    use approx::assert_relative_eq;

    fn legged_scene() -> (SceneGraph, NodeId, NodeId) {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let model = graph
            .add_child(root, "model", NodeKind::Group, Transform::identity())
            .unwrap();
        let ankle = graph
            .add_child(model, "LAnkleRoll_link", NodeKind::Group, Transform::from_translation(0.0, 0.05, 0.0))
            .unwrap();
        graph
            .add_child(
                ankle,
                "LFoot",
                NodeKind::mesh(Aabb::from_half_extents(0.05, 0.02, 0.08)),
                Transform::from_translation(0.0, -0.03, 0.0),
            )
            .unwrap();
        (graph, model, ankle)
    }

    #[test]
    fn test_anchor_plane_under_lowest_contact() {
        let (mut graph, model, _) = legged_scene();
        let root = graph.root();
        let plane = graph
            .add_child(root, "ground", NodeKind::Group, Transform::from_translation(0.0, -1.0, 0.0))
            .unwrap();
        let names = vec!["LFoot".to_string(), "Missing".to_string()];
        let y = anchor_plane(&mut graph, plane, model, &names, -0.01, 1e-4).unwrap();
        assert_relative_eq!(y, -0.01, epsilon = 1e-12);
        // already in place
        assert!(anchor_plane(&mut graph, plane, model, &names, -0.01, 1e-4).is_none());
        assert!(anchor_plane(&mut graph, plane, model, &["Missing".to_string()], 0.0, 1e-4).is_none());
    }

    #[test]
    fn test_stabilizer_cancels_drift_with_clamp() {
        let (mut graph, model, ankle) = legged_scene();
        let names = vec!["LAnkleRoll_link".to_string()];
        let mut stabilizer = GroundStabilizer::capture(&graph, model, &names, 0.0, 0.3, 1e-4);
        assert_relative_eq!(stabilizer.baseline_y(), 0.05);

        // within epsilon
        assert!(stabilizer.stabilize(&mut graph).is_none());

        graph.local_mut(ankle).unwrap().translation.y = 0.55;
        let c = stabilizer.stabilize(&mut graph).unwrap();
        assert_relative_eq!(c.delta, 0.5, epsilon = 1e-12);
        assert_relative_eq!(c.applied, 0.3);
        assert_relative_eq!(graph.local(model).unwrap().translation.y, -0.3);

        let c = stabilizer.stabilize(&mut graph).unwrap();
        assert_relative_eq!(c.applied, 0.2, epsilon = 1e-12);
        assert!(stabilizer.stabilize(&mut graph).is_none());
    }

    #[test]
    fn test_stabilizer_falls_back_to_bounds() {
        let (mut graph, model, _) = legged_scene();
        let stabilizer = GroundStabilizer::capture(&graph, model, &["Nope".to_string()], f64::NAN, 0.3, 1e-4);
        assert_eq!(stabilizer.baseline_y(), 0.0);
        assert!(stabilizer.contacts().is_empty());
        let mut stabilizer = stabilizer;
        // Foot bounds bottom at 0.0, matching the baseline
        assert!(stabilizer.stabilize(&mut graph).is_none());
        assert_relative_eq!(stabilizer.last_contact_y().unwrap(), 0.0, epsilon = 1e-12);
    }
}
