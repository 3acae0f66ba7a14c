//! Battery overlay painted on the chest tablet
//!
//! The panel is a small textured quad parented to the tablet node. Its
//! canvas is only repainted when the displayed state (rounded charge,
//! plugged flag, severity band) changes.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::{Canvas2d, GeometryId, MaterialDesc, MaterialId, RenderBackend, TextAlign, TextureId};
use crate::math::{Quaternion, Transform, Vector3};
use crate::rig::HudSpec;
use crate::scene::{Aabb, NodeId, NodeKind, SceneGraph};

/// Panel offset relative to its anchor node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HudAlignment {
    pub position: Vector3,
    /// Euler rotations applied in X, Y, Z order on top of the anchor orientation
    pub rotation: [f64; 3],
}

impl HudAlignment {
    /// Alignment for the chest tablet of the wheeled robot
    pub fn tablet() -> Self {
        Self {
            position: Vector3::new(0.0, -0.013, 0.038),
            rotation: [0.0, PI / 1.5, PI / 2.0],
        }
    }
}

/// Battery data as reported by the robot
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BatteryReading {
    #[serde(default)]
    pub charge: Option<f64>,
    #[serde(default)]
    pub plugged: bool,
}

/// Normalized battery state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryStatus {
    /// Charge in percent, within `[0, 100]`
    pub charge: f64,
    pub plugged: bool,
}

/// Turn a raw reading into a displayable status
///
/// Readings without a finite charge count as no data.
pub fn normalize_battery(reading: Option<BatteryReading>) -> Option<BatteryStatus> {
    let reading = reading?;
    let charge = reading.charge.filter(|c| c.is_finite())?;
    Some(BatteryStatus {
        charge: charge.clamp(0.0, 100.0),
        plugged: reading.plugged,
    })
}

/// Charge severity shown by the icon color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeverityBand {
    Critical,
    Medium,
    High,
    Unknown,
}

impl SeverityBand {
    /// Band for a rounded charge percentage
    pub fn from_charge(charge: Option<i64>) -> Self {
        match charge {
            None => SeverityBand::Unknown,
            Some(c) if c < 20 => SeverityBand::Critical,
            Some(c) if c <= 50 => SeverityBand::Medium,
            Some(_) => SeverityBand::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityBand::Critical => "critical",
            SeverityBand::Medium => "medium",
            SeverityBand::High => "high",
            SeverityBand::Unknown => "unknown",
        }
    }

    /// CSS color of the battery icon and label
    pub fn icon_color(&self) -> &'static str {
        match self {
            SeverityBand::Critical => "#ef4444",
            SeverityBand::Medium => "#facc15",
            SeverityBand::High => "#22c55e",
            SeverityBand::Unknown => "#94a3b8",
        }
    }
}

/// Everything the panel displays; equal keys paint identical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HudKey {
    pub charge: Option<i64>,
    pub plugged: bool,
    pub band: SeverityBand,
}

impl HudKey {
    pub fn from_status(status: Option<&BatteryStatus>) -> Self {
        let charge = status.map(|s| s.charge.round() as i64);
        Self {
            charge,
            plugged: status.map(|s| s.plugged).unwrap_or(false),
            band: SeverityBand::from_charge(charge),
        }
    }

    /// Text shown next to the icon
    pub fn label(&self) -> String {
        match self.charge {
            Some(c) => format!("{}%", c),
            None => "--%".to_string(),
        }
    }
}

impl fmt::Display for HudKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.charge {
            Some(c) => write!(f, "{}", c)?,
            None => write!(f, "na")?,
        }
        write!(f, "|{}|{}", u8::from(self.plugged), self.band.as_str())
    }
}

fn rounded_rect(ctx: &mut dyn Canvas2d, x: f64, y: f64, w: f64, h: f64, r: f64) {
    let r = r.min(h / 2.0).min(w / 2.0);
    ctx.begin_path();
    ctx.move_to(x + r, y);
    ctx.line_to(x + w - r, y);
    ctx.quadratic_curve_to(x + w, y, x + w, y + r);
    ctx.line_to(x + w, y + h - r);
    ctx.quadratic_curve_to(x + w, y + h, x + w - r, y + h);
    ctx.line_to(x + r, y + h);
    ctx.quadratic_curve_to(x, y + h, x, y + h - r);
    ctx.line_to(x, y + r);
    ctx.quadratic_curve_to(x, y, x + r, y);
    ctx.close_path();
}

/// Paint the battery panel for `key`
pub fn paint(ctx: &mut dyn Canvas2d, key: &HudKey) {
    let width = ctx.width() as f64;
    let height = ctx.height() as f64;
    ctx.clear();

    let padding = (width * 0.08).round();
    let corner = (width * 0.08).round();
    let body_x = padding;
    let body_y = padding;
    let body_w = width - padding * 2.0;
    let body_h = height - padding * 2.0;
    let color = key.band.icon_color();

    rounded_rect(ctx, body_x, body_y, body_w, body_h, corner);
    ctx.set_fill_style("rgba(15,23,42,0.82)");
    ctx.fill();

    let icon_padding = (width * 0.04).round();
    let icon_w = (body_w * 0.32).round();
    let icon_h = (body_h * 0.6).round();
    let icon_x = body_x + icon_padding;
    let icon_y = body_y + (body_h - icon_h) / 2.0;
    let tip = (icon_w * 0.12).round().max(6.0);
    let inner = (icon_w * 0.1).round().max(4.0);
    ctx.set_line_width((width * 0.01).round().max(2.0));
    ctx.set_stroke_style(color);

    // Outline with the terminal nub on the right
    ctx.begin_path();
    ctx.move_to(icon_x, icon_y);
    ctx.line_to(icon_x + icon_w - tip, icon_y);
    ctx.line_to(icon_x + icon_w - tip, icon_y + icon_h * 0.25);
    ctx.line_to(icon_x + icon_w, icon_y + icon_h * 0.25);
    ctx.line_to(icon_x + icon_w, icon_y + icon_h * 0.75);
    ctx.line_to(icon_x + icon_w - tip, icon_y + icon_h * 0.75);
    ctx.line_to(icon_x + icon_w - tip, icon_y + icon_h);
    ctx.line_to(icon_x, icon_y + icon_h);
    ctx.close_path();
    ctx.stroke();

    match key.charge {
        Some(charge) => {
            let fill_w = (charge as f64 / 100.0).clamp(0.0, 1.0) * (icon_w - tip - inner * 2.0);
            if fill_w > 0.0 {
                ctx.set_fill_style(color);
                ctx.fill_rect(icon_x + inner, icon_y + inner, fill_w, icon_h - inner * 2.0);
            }
        }
        None => {
            ctx.set_stroke_style("#e2e8f0");
            ctx.set_line_dash(&[10.0, 6.0]);
            ctx.begin_path();
            ctx.move_to(icon_x + inner, icon_y + icon_h / 2.0);
            ctx.line_to(icon_x + icon_w - inner - tip, icon_y + icon_h / 2.0);
            ctx.stroke();
            ctx.set_line_dash(&[]);
        }
    }

    if key.plugged {
        let bolt_w = icon_w * 0.32;
        let bolt_h = icon_h * 0.5;
        let bolt_x = icon_x + icon_w / 2.0 - bolt_w / 2.0 - tip * 0.25;
        let bolt_y = icon_y + icon_h / 2.0 - bolt_h / 2.0;
        ctx.set_fill_style(if key.charge.is_some() { "#0f172a" } else { "#1e293b" });
        ctx.begin_path();
        ctx.move_to(bolt_x + bolt_w * 0.5, bolt_y);
        ctx.line_to(bolt_x + bolt_w * 0.3, bolt_y + bolt_h * 0.42);
        ctx.line_to(bolt_x + bolt_w * 0.58, bolt_y + bolt_h * 0.42);
        ctx.line_to(bolt_x + bolt_w * 0.5, bolt_y + bolt_h);
        ctx.line_to(bolt_x + bolt_w * 0.7, bolt_y + bolt_h * 0.56);
        ctx.line_to(bolt_x + bolt_w * 0.42, bolt_y + bolt_h * 0.56);
        ctx.close_path();
        ctx.fill();
    }

    ctx.set_font(&format!(
        "{}px \"Inter\", \"Segoe UI\", \"Roboto\", sans-serif",
        (body_h * 0.46).round()
    ));
    ctx.set_text_align(TextAlign::Right);
    ctx.set_fill_style(color);
    ctx.fill_text(&key.label(), body_x + body_w - icon_padding, body_y + body_h / 2.0);
}

/// Battery panel attached to the model
pub struct BatteryHud {
    panel: NodeId,
    canvas: Box<dyn Canvas2d>,
    texture: TextureId,
    material: MaterialId,
    geometry: GeometryId,
    last_key: Option<HudKey>,
    repaint_count: u64,
}

impl fmt::Debug for BatteryHud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatteryHud")
            .field("panel", &self.panel)
            .field("texture", &self.texture)
            .field("last_key", &self.last_key)
            .field("repaint_count", &self.repaint_count)
            .finish()
    }
}

impl BatteryHud {
    /// Create the panel under the first anchor found in `model`
    ///
    /// Returns `None` (with a warning) when no anchor exists or the host
    /// cannot provide a 2D canvas. The panel is not painted yet.
    pub fn attach(
        graph: &mut SceneGraph,
        backend: &mut dyn RenderBackend,
        model: NodeId,
        spec: &HudSpec,
        canvas_size: (u32, u32),
        panel_width: f64,
    ) -> Option<Self> {
        let Some(anchor) = spec.anchors.iter().find_map(|name| graph.find_by_name(model, name)) else {
            tracing::warn!("battery HUD skipped: no anchor among {:?}", spec.anchors);
            return None;
        };
        let (w, h) = canvas_size;
        if w == 0 || h == 0 {
            tracing::warn!("battery HUD skipped: empty canvas size {}x{}", w, h);
            return None;
        }
        let Some(canvas) = backend.create_canvas(w, h) else {
            tracing::warn!("battery HUD skipped: 2D canvas unavailable");
            return None;
        };
        let texture = match backend.create_canvas_texture(canvas.as_ref()) {
            Ok(texture) => texture,
            Err(e) => {
                tracing::warn!("battery HUD skipped: {}", e);
                return None;
            }
        };
        let material = backend.create_material(&MaterialDesc::Canvas {
            texture,
            transparent: true,
        });
        let panel_height = panel_width * (h as f64 / w as f64);
        let geometry = backend.create_plane_geometry(panel_width, panel_height);

        // The panel starts from the anchor's own local orientation
        let anchor_rotation = graph.local(anchor).map(|t| t.rotation).unwrap_or_default();
        let [rx, ry, rz] = spec.alignment.rotation;
        let rotation = anchor_rotation
            * Quaternion::from_axis_angle(&Vector3::x(), rx)
            * Quaternion::from_axis_angle(&Vector3::y(), ry)
            * Quaternion::from_axis_angle(&Vector3::z(), rz);
        let p = spec.alignment.position;
        let local = Transform::from_translation(p.x, p.y, p.z).with_rotation(rotation);
        let kind = NodeKind::Mesh {
            bounds: Aabb::from_half_extents(panel_width / 2.0, panel_height / 2.0, 0.0),
            material: Some(material),
            geometry: Some(geometry),
        };
        let panel = match graph.add_child(anchor, spec.panel_name.clone(), kind, local) {
            Ok(panel) => panel,
            Err(e) => {
                tracing::warn!("battery HUD skipped: {}", e);
                backend.release_texture(texture);
                backend.release_material(material);
                backend.release_geometry(geometry);
                return None;
            }
        };
        tracing::debug!("battery HUD attached under '{}'", graph.name(anchor));

        Some(Self {
            panel,
            canvas,
            texture,
            material,
            geometry,
            last_key: None,
            repaint_count: 0,
        })
    }

    /// Repaint if the displayed state changed (or `force`)
    ///
    /// Returns whether the canvas was repainted.
    pub fn refresh(&mut self, status: Option<&BatteryStatus>, backend: &mut dyn RenderBackend, force: bool) -> bool {
        let key = HudKey::from_status(status);
        if !force && self.last_key == Some(key) {
            return false;
        }
        paint(self.canvas.as_mut(), &key);
        backend.upload_canvas(self.texture, self.canvas.as_ref());
        self.last_key = Some(key);
        self.repaint_count += 1;
        true
    }

    pub fn panel(&self) -> NodeId {
        self.panel
    }

    pub fn repaint_count(&self) -> u64 {
        self.repaint_count
    }

    pub fn last_key(&self) -> Option<HudKey> {
        self.last_key
    }

    /// Label currently painted
    pub fn last_label(&self) -> Option<String> {
        self.last_key.map(|k| k.label())
    }

    /// Detach the panel and release its GPU resources
    pub fn dispose(self, graph: &mut SceneGraph, backend: &mut dyn RenderBackend) {
        if let Err(e) = graph.detach(self.panel) {
            tracing::debug!("battery HUD panel already gone: {}", e);
        }
        backend.release_texture(self.texture);
        backend.release_material(self.material);
        backend.release_geometry(self.geometry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DrawCommand, HeadlessBackend, RecordingCanvas};
    use crate::rig::RigDescriptor;

    fn status(charge: f64, plugged: bool) -> Option<BatteryStatus> {
        normalize_battery(Some(BatteryReading {
            charge: Some(charge),
            plugged,
        }))
    }

    #[test]
    fn test_normalize_clamps_and_drops_invalid() {
        assert_eq!(status(140.0, true).unwrap().charge, 100.0);
        assert_eq!(status(-3.0, false).unwrap().charge, 0.0);
        assert!(status(f64::NAN, true).is_none());
        assert!(normalize_battery(Some(BatteryReading { charge: None, plugged: true })).is_none());
        assert!(normalize_battery(None).is_none());
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(SeverityBand::from_charge(Some(19)), SeverityBand::Critical);
        assert_eq!(SeverityBand::from_charge(Some(20)), SeverityBand::Medium);
        assert_eq!(SeverityBand::from_charge(Some(50)), SeverityBand::Medium);
        assert_eq!(SeverityBand::from_charge(Some(51)), SeverityBand::High);
        assert_eq!(SeverityBand::from_charge(None), SeverityBand::Unknown);
    }

    #[test]
    fn test_key_rounds_charge() {
        let a = HudKey::from_status(status(41.6, false).as_ref());
        let b = HudKey::from_status(status(42.4, false).as_ref());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "42|0|medium");
        assert_eq!(HudKey::from_status(None).to_string(), "na|0|unknown");
    }

    #[test]
    fn test_paint_unknown_draws_dashes() {
        let mut canvas = RecordingCanvas::new(512, 256);
        paint(&mut canvas, &HudKey::from_status(None));
        assert_eq!(canvas.texts(), vec!["--%"]);
        assert!(canvas
            .commands()
            .iter()
            .any(|c| matches!(c, DrawCommand::LineDash(d) if d == &vec![10.0, 6.0])));
        assert!(!canvas.commands().iter().any(|c| matches!(c, DrawCommand::FillRect(..))));
    }

    #[test]
    fn test_paint_known_fills_bar() {
        let mut canvas = RecordingCanvas::new(512, 256);
        paint(&mut canvas, &HudKey::from_status(status(75.0, true).as_ref()));
        assert_eq!(canvas.texts(), vec!["75%"]);
        assert!(canvas.commands().iter().any(|c| matches!(c, DrawCommand::FillRect(..))));
        assert!(canvas
            .commands()
            .iter()
            .any(|c| matches!(c, DrawCommand::FillStyle(s) if s == "#0f172a")));
    }

    #[test]
    fn test_refresh_is_memoized() {
        let rig = RigDescriptor::pepper();
        let spec = rig.hud.clone().unwrap();
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let model = graph
            .add_child(root, "model", NodeKind::Group, Transform::identity())
            .unwrap();
        graph
            .add_child(model, "Tablet", NodeKind::Group, Transform::identity())
            .unwrap();
        let mut backend = HeadlessBackend::new();

        let mut hud = BatteryHud::attach(&mut graph, &mut backend, model, &spec, (512, 256), 0.18).unwrap();
        assert!(hud.refresh(None, &mut backend, true));
        assert!(!hud.refresh(None, &mut backend, false));
        assert!(hud.refresh(status(80.0, false).as_ref(), &mut backend, false));
        assert!(!hud.refresh(status(80.2, false).as_ref(), &mut backend, false));
        assert_eq!(hud.repaint_count(), 2);
        assert_eq!(hud.last_label().as_deref(), Some("80%"));
        assert_eq!(backend.stats().canvas_uploads, 2);

        hud.dispose(&mut graph, &mut backend);
        let stats = backend.stats();
        assert_eq!(stats.textures_released, stats.textures_created);
        assert_eq!(stats.materials_released, stats.materials_created);
    }

    #[test]
    fn test_attach_without_anchor_skips() {
        let spec = RigDescriptor::pepper().hud.unwrap();
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let mut backend = HeadlessBackend::new();
        assert!(BatteryHud::attach(&mut graph, &mut backend, root, &spec, (512, 256), 0.18).is_none());
    }
}
