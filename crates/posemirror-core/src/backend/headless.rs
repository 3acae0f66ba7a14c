//! In-memory backend for tests, benches and headless replay
//!
//! Keeps resource counters behind a shared handle so callers can inspect
//! them after the backend has been moved into a visualizer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    AssetScene, Canvas2d, FrameHandle, GeometryId, HostContainer, MaterialDesc, MaterialId,
    RecordingCanvas, RenderBackend, ResizeWatch, SurfaceId, TextureId, WatchId,
};
use crate::camera::Camera;
use crate::scene::SceneGraph;
use crate::{Error, Result};

/// Capabilities the headless host pretends to have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessOptions {
    /// A graphics context can be created
    pub graphics: bool,
    /// A model loader is available
    pub loader: bool,
    /// 2D canvases can be created
    pub canvas: bool,
    /// Container resize observers exist
    pub resize_observer: bool,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            graphics: true,
            loader: true,
            canvas: true,
            resize_observer: true,
        }
    }
}

/// Resource counters of a [`HeadlessBackend`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadlessStats {
    pub surfaces_created: u64,
    pub surfaces_released: u64,
    pub surface_size: Option<(u32, u32)>,
    pub asset_loads: u64,
    pub textures_created: u64,
    pub textures_released: u64,
    pub materials_created: u64,
    pub materials_released: u64,
    pub geometries_created: u64,
    pub geometries_released: u64,
    pub canvas_uploads: u64,
    pub frames_requested: u64,
    pub frames_cancelled: u64,
    pub pending_frame: Option<FrameHandle>,
    pub renders: u64,
    pub last_render_nodes: usize,
    pub last_aspect: Option<f64>,
    pub active_watch: Option<ResizeWatch>,
    pub watches_removed: u64,
}

impl HeadlessStats {
    /// Textures, materials, geometries and surfaces not yet released
    pub fn live_resources(&self) -> u64 {
        self.textures_created.saturating_sub(self.textures_released)
            + self.materials_created.saturating_sub(self.materials_released)
            + self.geometries_created.saturating_sub(self.geometries_released)
            + self.surfaces_created.saturating_sub(self.surfaces_released)
    }
}

#[derive(Debug, Default)]
struct ContainerState {
    size: (u32, u32),
    data: BTreeMap<String, String>,
    surfaces: Vec<SurfaceId>,
    fallback: Option<String>,
}

/// Host container backed by shared state
///
/// Clones observe the same container.
#[derive(Debug, Clone)]
pub struct HeadlessContainer {
    state: Arc<Mutex<ContainerState>>,
}

impl HeadlessContainer {
    /// Create a container of the given client size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(ContainerState {
                size: (width, height),
                ..Default::default()
            })),
        }
    }

    /// Change the client size (resize notifications are up to the caller)
    pub fn set_size(&self, width: u32, height: u32) {
        self.state.lock().size = (width, height);
    }

    /// Fallback message shown, if any
    pub fn fallback(&self) -> Option<String> {
        self.state.lock().fallback.clone()
    }

    /// Markup a DOM host would insert for the fallback
    pub fn fallback_html(&self) -> Option<String> {
        self.fallback()
            .map(|message| format!("<div class=\"{}\">{}</div>", super::FALLBACK_CLASS, message))
    }

    /// Surfaces currently mounted
    pub fn mounted(&self) -> Vec<SurfaceId> {
        self.state.lock().surfaces.clone()
    }
}

impl HostContainer for HeadlessContainer {
    fn client_size(&self) -> (u32, u32) {
        self.state.lock().size
    }

    fn set_data(&mut self, key: &str, value: &str) {
        self.state.lock().data.insert(key.to_string(), value.to_string());
    }

    fn data(&self, key: &str) -> Option<String> {
        self.state.lock().data.get(key).cloned()
    }

    fn mount_surface(&mut self, surface: SurfaceId) {
        let mut state = self.state.lock();
        if !state.surfaces.contains(&surface) {
            state.surfaces.push(surface);
        }
    }

    fn unmount_surface(&mut self, surface: SurfaceId) {
        self.state.lock().surfaces.retain(|&s| s != surface);
    }

    fn show_fallback(&mut self, message: &str) {
        let mut state = self.state.lock();
        state.surfaces.clear();
        state.fallback = Some(message.to_string());
    }
}

/// A rendering backend that keeps everything in memory
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    options: HeadlessOptions,
    assets: HashMap<String, AssetScene>,
    textures: HashSet<String>,
    containers: HashMap<String, HeadlessContainer>,
    surfaces: HashSet<SurfaceId>,
    next_id: u64,
    stats: Arc<Mutex<HeadlessStats>>,
}

impl HeadlessBackend {
    /// Create a backend with every capability enabled
    pub fn new() -> Self {
        Self::with_options(HeadlessOptions::default())
    }

    /// Create with explicit capabilities
    pub fn with_options(options: HeadlessOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Serve `asset` for `url`
    pub fn with_asset(mut self, url: impl Into<String>, asset: AssetScene) -> Self {
        self.assets.insert(url.into(), asset);
        self
    }

    /// Make `url` a loadable texture
    pub fn with_texture(mut self, url: impl Into<String>) -> Self {
        self.textures.insert(url.into());
        self
    }

    /// Register a container under a selector
    pub fn with_container(mut self, selector: impl Into<String>, container: HeadlessContainer) -> Self {
        self.containers.insert(selector.into(), container);
        self
    }

    /// Shared handle to the resource counters
    pub fn stats_handle(&self) -> Arc<Mutex<HeadlessStats>> {
        Arc::clone(&self.stats)
    }

    /// Snapshot of the resource counters
    pub fn stats(&self) -> HeadlessStats {
        self.stats.lock().clone()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn graphics_available(&self) -> bool {
        self.options.graphics
    }

    fn resolve_container(&mut self, selector: &str) -> Option<Box<dyn HostContainer>> {
        self.containers
            .get(selector)
            .map(|c| Box::new(c.clone()) as Box<dyn HostContainer>)
    }

    fn create_surface(&mut self, width: u32, height: u32, _pixel_ratio: f64) -> Result<SurfaceId> {
        if !self.options.graphics {
            return Err(Error::GraphicsUnavailable("headless backend has graphics disabled".into()));
        }
        let id = SurfaceId(self.next());
        self.surfaces.insert(id);
        let mut stats = self.stats.lock();
        stats.surfaces_created += 1;
        stats.surface_size = Some((width, height));
        Ok(id)
    }

    fn resize_surface(&mut self, surface: SurfaceId, width: u32, height: u32) {
        if self.surfaces.contains(&surface) {
            self.stats.lock().surface_size = Some((width, height));
        }
    }

    fn release_surface(&mut self, surface: SurfaceId) {
        if self.surfaces.remove(&surface) {
            self.stats.lock().surfaces_released += 1;
        }
    }

    fn load_asset(&mut self, url: &str) -> Result<AssetScene> {
        if !self.options.loader {
            return Err(Error::LoaderUnavailable("no model loader registered".into()));
        }
        self.stats.lock().asset_loads += 1;
        self.assets
            .get(url)
            .cloned()
            .ok_or_else(|| Error::AssetLoad(format!("{}: not found", url)))
    }

    fn load_texture(&mut self, url: &str) -> Result<TextureId> {
        if !self.textures.contains(url) {
            return Err(Error::AssetLoad(format!("{}: texture not found", url)));
        }
        self.stats.lock().textures_created += 1;
        Ok(TextureId(self.next()))
    }

    fn create_material(&mut self, _desc: &MaterialDesc) -> MaterialId {
        self.stats.lock().materials_created += 1;
        MaterialId(self.next())
    }

    fn create_circle_geometry(&mut self, _radius: f64, _segments: u32) -> GeometryId {
        self.stats.lock().geometries_created += 1;
        GeometryId(self.next())
    }

    fn create_plane_geometry(&mut self, _width: f64, _height: f64) -> GeometryId {
        self.stats.lock().geometries_created += 1;
        GeometryId(self.next())
    }

    fn create_canvas(&mut self, width: u32, height: u32) -> Option<Box<dyn Canvas2d>> {
        if !self.options.canvas {
            return None;
        }
        Some(Box::new(RecordingCanvas::new(width, height)))
    }

    fn create_canvas_texture(&mut self, _canvas: &dyn Canvas2d) -> Result<TextureId> {
        self.stats.lock().textures_created += 1;
        Ok(TextureId(self.next()))
    }

    fn upload_canvas(&mut self, _texture: TextureId, _canvas: &dyn Canvas2d) {
        self.stats.lock().canvas_uploads += 1;
    }

    fn release_texture(&mut self, _texture: TextureId) {
        self.stats.lock().textures_released += 1;
    }

    fn release_material(&mut self, _material: MaterialId) {
        self.stats.lock().materials_released += 1;
    }

    fn release_geometry(&mut self, _geometry: GeometryId) {
        self.stats.lock().geometries_released += 1;
    }

    fn request_frame(&mut self) -> FrameHandle {
        let handle = FrameHandle(self.next());
        let mut stats = self.stats.lock();
        stats.frames_requested += 1;
        stats.pending_frame = Some(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        let mut stats = self.stats.lock();
        if stats.pending_frame == Some(handle) {
            stats.pending_frame = None;
            stats.frames_cancelled += 1;
        }
    }

    fn observe_resize(&mut self, _surface: SurfaceId) -> Option<WatchId> {
        if !self.options.resize_observer {
            return None;
        }
        let id = WatchId(self.next());
        self.stats.lock().active_watch = Some(ResizeWatch::Observer(id));
        Some(id)
    }

    fn listen_window_resize(&mut self) -> WatchId {
        let id = WatchId(self.next());
        self.stats.lock().active_watch = Some(ResizeWatch::WindowListener(id));
        id
    }

    fn unwatch_resize(&mut self, watch: ResizeWatch) {
        let mut stats = self.stats.lock();
        if stats.active_watch == Some(watch) {
            stats.active_watch = None;
            stats.watches_removed += 1;
        }
    }

    fn render(&mut self, surface: SurfaceId, scene: &SceneGraph, camera: &Camera) -> Result<()> {
        if !self.surfaces.contains(&surface) {
            return Err(Error::Backend(format!("unknown surface {:?}", surface)));
        }
        let visible = scene
            .descendants(scene.root())
            .into_iter()
            .filter(|&id| scene.node(id).map(|n| n.visible).unwrap_or(false))
            .count();
        let mut stats = self.stats.lock();
        stats.renders += 1;
        stats.last_render_nodes = visible;
        stats.last_aspect = Some(camera.aspect);
        Ok(())
    }
}
