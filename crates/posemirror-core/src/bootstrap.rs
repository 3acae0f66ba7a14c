//! Stage construction and model placement
//!
//! Builds everything around the robot (surface, camera, lights, ground
//! disc) and places a loaded model so it stands centred on the floor facing
//! the camera.

use std::f64::consts::FRAC_PI_2;

use crate::backend::{AssetScene, GeometryId, MaterialDesc, MaterialId, RenderBackend, SurfaceId, TextureId};
use crate::camera::{Camera, Framing};
use crate::config::VisualizerConfig;
use crate::math::{Quaternion, Transform, Vector3};
use crate::rig::RigDescriptor;
use crate::scene::{Aabb, Light, NodeId, NodeKind, SceneGraph};
use crate::Result;

/// Segments of the ground disc
pub const GROUND_SEGMENTS: u32 = 60;

/// Material used when the ground texture cannot be loaded
pub const GROUND_FALLBACK: MaterialDesc = MaterialDesc::Flat {
    color: 0x152032,
    opacity: 0.68,
    transparent: true,
    roughness: 0.92,
    metalness: 0.05,
};

/// Name of the group holding the decoded model under the model root
pub const ASSET_ROOT_NAME: &str = "ModelScene";

/// Ground disc and its GPU resources
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPlane {
    pub node: NodeId,
    pub geometry: GeometryId,
    pub material: MaterialId,
    /// `None` when the fallback material is in use
    pub texture: Option<TextureId>,
}

impl GroundPlane {
    /// Create the disc under the scene root
    pub fn build(
        graph: &mut SceneGraph,
        backend: &mut dyn RenderBackend,
        rig: &RigDescriptor,
        texture_url: &str,
    ) -> Result<Self> {
        let radius = rig.ground.plane_radius;
        let texture = match backend.load_texture(texture_url) {
            Ok(texture) => Some(texture),
            Err(e) => {
                tracing::warn!("ground texture unavailable, using flat material: {}", e);
                None
            }
        };
        let desc = match texture {
            Some(texture) => MaterialDesc::Textured {
                texture,
                repeat: [rig.ground.texture_repeat, rig.ground.texture_repeat],
                roughness: 0.92,
                metalness: 0.05,
            },
            None => GROUND_FALLBACK,
        };
        let material = backend.create_material(&desc);
        let geometry = backend.create_circle_geometry(radius, GROUND_SEGMENTS);

        // The disc is authored in XY; lay it flat
        let local = Transform::identity().with_rotation(Quaternion::from_axis_angle(&Vector3::x(), -FRAC_PI_2));
        let kind = NodeKind::Mesh {
            bounds: Aabb::from_half_extents(radius, radius, 0.0),
            material: Some(material),
            geometry: Some(geometry),
        };
        let root = graph.root();
        let node = graph.add_child(root, "GroundPlane", kind, local)?;
        Ok(Self {
            node,
            geometry,
            material,
            texture,
        })
    }

    /// Detach the disc and release its resources
    pub fn release(self, graph: &mut SceneGraph, backend: &mut dyn RenderBackend) {
        let _ = graph.detach(self.node);
        backend.release_geometry(self.geometry);
        backend.release_material(self.material);
        if let Some(texture) = self.texture {
            backend.release_texture(texture);
        }
    }
}

/// Lights of the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLights {
    pub hemisphere: NodeId,
    pub directional: NodeId,
}

/// Add the hemisphere and directional lights
pub fn add_lights(graph: &mut SceneGraph, rig: &RigDescriptor) -> Result<StageLights> {
    let l = &rig.lighting;
    let root = graph.root();
    let hemisphere = graph.add_child(
        root,
        "HemisphereLight",
        NodeKind::Light(Light::Hemisphere {
            sky_color: l.sky_color,
            ground_color: l.ground_color,
            intensity: l.hemisphere_intensity,
        }),
        Transform::from_translation(0.0, 1.0, 0.0),
    )?;
    let p = l.directional_position;
    let directional = graph.add_child(
        root,
        "DirectionalLight",
        NodeKind::Light(Light::Directional {
            color: l.directional_color,
            intensity: l.directional_intensity,
        }),
        Transform::from_translation(p.x, p.y, p.z),
    )?;
    Ok(StageLights {
        hemisphere,
        directional,
    })
}

/// Surface, camera and lights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    pub surface: SurfaceId,
    pub camera: Camera,
    pub lights: StageLights,
}

/// Create the render surface, camera and lights for a container of `size`
pub fn build_stage(
    graph: &mut SceneGraph,
    backend: &mut dyn RenderBackend,
    rig: &RigDescriptor,
    config: &VisualizerConfig,
    size: (u32, u32),
) -> Result<Stage> {
    let (width, height) = (size.0.max(1), size.1.max(1));
    let surface = backend.create_surface(width, height, config.pixel_ratio)?;
    let camera = Camera::new(rig.framing.fov_deg, width as f64 / height as f64);
    let lights = match add_lights(graph, rig) {
        Ok(lights) => lights,
        Err(e) => {
            backend.release_surface(surface);
            return Err(e);
        }
    };
    tracing::debug!("stage ready on {} ({}x{})", backend.name(), width, height);
    Ok(Stage {
        surface,
        camera,
        lights,
    })
}

/// Where the model ended up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Group carrying the facing yaw (and ground corrections)
    pub model_root: NodeId,
    /// Decoded model, scaled, oriented and grounded
    pub asset_root: NodeId,
    /// Bounding-box size after scaling and orientation
    pub size: Vector3,
    pub framing: Framing,
    /// Lowest model point right after placement
    pub initial_min_y: f64,
}

/// Instantiate `asset` and stand it on the floor
///
/// Order: scale and orient the asset, centre it on its bounds with the
/// lowest point at y = 0, apply the facing yaw to the root, fit the camera,
/// re-ground, then add the rig's extra ground offset.
pub fn place_model(
    graph: &mut SceneGraph,
    asset: &AssetScene,
    rig: &RigDescriptor,
    camera: &mut Camera,
) -> Result<Placement> {
    let scene_root = graph.root();
    let model_root = graph.add_child(scene_root, rig.root_name.clone(), NodeKind::Group, Transform::identity())?;
    let asset_root = asset.instantiate(graph, model_root, ASSET_ROOT_NAME)?;

    let [rx, ry, rz] = rig.orientation_fix;
    set_local(graph, asset_root, |t| {
        t.rotation = Quaternion::from_euler_xyz(rx, ry, rz);
        t.scale = Vector3::new(rig.model_scale, rig.model_scale, rig.model_scale);
    });

    let bounds = graph.world_bounds(model_root)?;
    let (size, center) = if bounds.is_empty() {
        tracing::warn!("model '{}' has no geometry bounds", rig.model_url);
        (Vector3::zeros(), Vector3::zeros())
    } else {
        (bounds.size(), bounds.center())
    };
    set_local(graph, asset_root, |t| {
        t.translation -= center;
        t.translation.y += size.y / 2.0;
    });

    set_local(graph, model_root, |t| {
        t.rotation = Quaternion::from_axis_angle(&Vector3::y(), rig.facing_yaw);
    });
    let framing = rig.framing.fit(camera, &size);

    let grounded = graph.world_bounds(asset_root)?;
    if !grounded.is_empty() && grounded.min.y.is_finite() && grounded.min.y.abs() > 1e-5 {
        let lift = grounded.min.y;
        set_local(graph, asset_root, |t| t.translation.y -= lift);
    }
    if rig.model_ground_offset.abs() > 1e-6 {
        set_local(graph, asset_root, |t| t.translation.y += rig.model_ground_offset);
    }

    let placed = graph.world_bounds(model_root)?;
    let initial_min_y = if placed.is_empty() { 0.0 } else { placed.min.y };
    tracing::info!(
        "{} placed: size {:.3}x{:.3}x{:.3}, camera at {:.2}",
        rig.name,
        size.x,
        size.y,
        size.z,
        framing.distance
    );

    Ok(Placement {
        model_root,
        asset_root,
        size,
        framing,
        initial_min_y,
    })
}

fn set_local(graph: &mut SceneGraph, id: NodeId, f: impl FnOnce(&mut Transform)) {
    if let Some(local) = graph.local_mut(id) {
        f(local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::fixtures;
    use approx::assert_relative_eq;

    #[test]
    fn test_model_stands_on_floor() {
        for rig in [RigDescriptor::pepper(), RigDescriptor::nao()] {
            let mut graph = SceneGraph::new();
            let mut camera = Camera::new(rig.framing.fov_deg, 1.0);
            let placement = place_model(&mut graph, &fixtures::asset_for(&rig), &rig, &mut camera).unwrap();

            let bounds = graph.world_bounds(placement.model_root).unwrap();
            assert_relative_eq!(bounds.min.y, rig.model_ground_offset, epsilon = 1e-9);
            assert_relative_eq!(placement.initial_min_y, bounds.min.y, epsilon = 1e-12);
            // centred horizontally
            let c = bounds.center();
            assert!(c.x.abs() < 1e-9 && c.z.abs() < 1e-9, "{}: {:?}", rig.name, c);
            // Z-up asset now stands along Y
            assert!(placement.size.y > placement.size.x);
            assert_relative_eq!(camera.target.y, placement.framing.focus_y);
        }
    }

    #[test]
    fn test_ground_falls_back_to_flat_material() {
        let rig = RigDescriptor::nao();
        let mut graph = SceneGraph::new();
        let mut backend = HeadlessBackend::new();
        let ground = GroundPlane::build(&mut graph, &mut backend, &rig, "missing.jpg").unwrap();
        assert!(ground.texture.is_none());
        assert_eq!(backend.stats().materials_created, 1);
        ground.release(&mut graph, &mut backend);
        assert_eq!(backend.stats().live_resources(), 0);
        assert!(!graph.is_in_scene(ground.node));
    }

    #[test]
    fn test_stage_requires_graphics() {
        let rig = RigDescriptor::pepper();
        let mut graph = SceneGraph::new();
        let mut backend = HeadlessBackend::with_options(crate::backend::HeadlessOptions {
            graphics: false,
            ..Default::default()
        });
        let err = build_stage(&mut graph, &mut backend, &rig, &VisualizerConfig::default(), (640, 480));
        assert!(matches!(err, Err(crate::Error::GraphicsUnavailable(_))));

        let mut backend = HeadlessBackend::new();
        let stage = build_stage(&mut graph, &mut backend, &rig, &VisualizerConfig::default(), (0, 0)).unwrap();
        assert_eq!(backend.stats().surface_size, Some((1, 1)));
        assert_relative_eq!(stage.camera.aspect, 1.0);
    }
}
