//! Rendering backend abstraction
//!
//! The visualizer never talks to a GPU or a DOM directly. Everything the host
//! provides (render surface, asset and texture loading, 2D canvases for the
//! HUD, frame scheduling, resize notifications) goes through
//! [`RenderBackend`]. [`HeadlessBackend`] is the in-memory implementation
//! used by tests, benches and the replay tool.

mod asset;
mod canvas;
mod headless;

pub use asset::{AssetNode, AssetScene};
pub use canvas::{Canvas2d, DrawCommand, RecordingCanvas, TextAlign};
pub use headless::{HeadlessBackend, HeadlessContainer, HeadlessOptions, HeadlessStats};

use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::scene::SceneGraph;
use crate::Result;

/// CSS class of the block shown by [`HostContainer::show_fallback`]
pub const FALLBACK_CLASS: &str = "robot-virtuel__fallback";

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

resource_id!(
    /// Render surface (canvas + context) handle
    SurfaceId
);
resource_id!(
    /// GPU texture handle
    TextureId
);
resource_id!(
    /// Material handle
    MaterialId
);
resource_id!(
    /// Geometry buffer handle
    GeometryId
);
resource_id!(
    /// Pending animation-frame request
    FrameHandle
);
resource_id!(
    /// Resize subscription handle
    WatchId
);

/// How surface resizes are being tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeWatch {
    /// Container-level resize observer
    Observer(WatchId),
    /// Window-level resize listener (hosts without an observer)
    WindowListener(WatchId),
}

/// Material description handed to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaterialDesc {
    /// Tiled texture (ground plane)
    Textured {
        texture: TextureId,
        repeat: [f64; 2],
        roughness: f64,
        metalness: f64,
    },
    /// Flat colour
    Flat {
        color: u32,
        opacity: f64,
        transparent: bool,
        roughness: f64,
        metalness: f64,
    },
    /// Unlit texture backed by a 2D canvas (HUD)
    Canvas { texture: TextureId, transparent: bool },
}

/// The host element the render surface is mounted into
pub trait HostContainer: Send {
    /// Current client size in CSS pixels
    fn client_size(&self) -> (u32, u32);

    /// Set a data attribute (`state`, `version`, `kind`)
    fn set_data(&mut self, key: &str, value: &str);

    /// Read back a data attribute
    fn data(&self, key: &str) -> Option<String>;

    /// Insert the render surface
    fn mount_surface(&mut self, surface: SurfaceId);

    /// Remove the render surface if mounted
    fn unmount_surface(&mut self, surface: SurfaceId);

    /// Replace the container content with a [`FALLBACK_CLASS`] message block
    fn show_fallback(&mut self, message: &str);
}

/// Trait for rendering backends
///
/// Implementations bridge the visualizer to a concrete renderer. Setup
/// methods return `Result`; the per-frame methods are infallible except for
/// [`RenderBackend::render`].
pub trait RenderBackend: Send {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Whether a graphics context can be created at all
    fn graphics_available(&self) -> bool;

    /// Resolve a container selector, if the host has one
    fn resolve_container(&mut self, _selector: &str) -> Option<Box<dyn HostContainer>> {
        None
    }

    /// Create the render surface
    fn create_surface(&mut self, width: u32, height: u32, pixel_ratio: f64) -> Result<SurfaceId>;

    /// Resize the render surface
    fn resize_surface(&mut self, surface: SurfaceId, width: u32, height: u32);

    /// Release the render surface and its context
    fn release_surface(&mut self, surface: SurfaceId);

    /// Load and decode a model
    fn load_asset(&mut self, url: &str) -> Result<AssetScene>;

    /// Load a texture from a URL
    fn load_texture(&mut self, url: &str) -> Result<TextureId>;

    /// Create a material
    fn create_material(&mut self, desc: &MaterialDesc) -> MaterialId;

    /// Create a flat circle geometry in the XY plane
    fn create_circle_geometry(&mut self, radius: f64, segments: u32) -> GeometryId;

    /// Create a plane geometry in the XY plane
    fn create_plane_geometry(&mut self, width: f64, height: f64) -> GeometryId;

    /// Create a 2D drawing canvas, `None` if the host has no 2D context
    fn create_canvas(&mut self, width: u32, height: u32) -> Option<Box<dyn Canvas2d>>;

    /// Wrap a canvas into a texture
    fn create_canvas_texture(&mut self, canvas: &dyn Canvas2d) -> Result<TextureId>;

    /// Re-upload canvas pixels into its texture
    fn upload_canvas(&mut self, texture: TextureId, canvas: &dyn Canvas2d);

    /// Release a texture
    fn release_texture(&mut self, texture: TextureId);

    /// Release a material
    fn release_material(&mut self, material: MaterialId);

    /// Release a geometry
    fn release_geometry(&mut self, geometry: GeometryId);

    /// Ask the host for the next frame callback
    fn request_frame(&mut self) -> FrameHandle;

    /// Cancel a pending frame callback
    fn cancel_frame(&mut self, handle: FrameHandle);

    /// Observe container resizes, `None` if the host lacks an observer
    fn observe_resize(&mut self, surface: SurfaceId) -> Option<WatchId>;

    /// Listen to window-level resizes
    fn listen_window_resize(&mut self) -> WatchId;

    /// Stop a resize subscription
    fn unwatch_resize(&mut self, watch: ResizeWatch);

    /// Draw the scene from the camera
    fn render(&mut self, surface: SurfaceId, scene: &SceneGraph, camera: &Camera) -> Result<()>;
}
