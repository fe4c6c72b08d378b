//! Turns panel draw commands into a colored triangle list in clip space, plus
//! the text runs that are composited on the CPU after readback.

use bytemuck::{Pod, Zeroable};
use std::mem;

use super::scene::{DrawCommand, Rgba, Scene};

const MARKER_SEGMENTS: usize = 16;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq)]
pub struct Vertex {
    pub position: [f32; 2],
    /// Linear RGB with straight alpha.
    pub color: [f32; 4],
}

impl Vertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: 8,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// Frame pixels to clip space.
#[derive(Clone, Copy)]
struct ClipTransform {
    scale_x: f32,
    scale_y: f32,
    offset: [f32; 2],
}

impl ClipTransform {
    fn to_clip(self, p: [f32; 2]) -> [f32; 2] {
        let x = p[0] + self.offset[0];
        let y = p[1] + self.offset[1];
        [x * self.scale_x - 1.0, 1.0 - y * self.scale_y]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// Top-left in frame pixels.
    pub x: f32,
    pub y: f32,
    pub text: String,
    pub size: f32,
    pub color: [u8; 4],
}

#[derive(Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub texts: Vec<TextRun>,
}

pub fn tessellate(scene: &Scene, frame_width: u32, frame_height: u32) -> Mesh {
    let mut mesh = Mesh::default();
    let scale_x = 2.0 / frame_width.max(1) as f32;
    let scale_y = 2.0 / frame_height.max(1) as f32;

    for panel in &scene.panels {
        let Ok(commands) = &panel.outcome else {
            continue;
        };
        let origin = [panel.surface.x as f32, panel.surface.y as f32];
        let clip = ClipTransform { scale_x, scale_y, offset: origin };
        for cmd in commands {
            push_command(&mut mesh, clip, origin, cmd);
        }
    }
    mesh
}

fn push_command(mesh: &mut Mesh, clip: ClipTransform, origin: [f32; 2], cmd: &DrawCommand) {
    let out = &mut mesh.vertices;
    match cmd {
        DrawCommand::FillRect { x, y, width, height, color } => {
            let c = linear(*color);
            let (x0, y0, x1, y1) = (*x, *y, x + width, y + height);
            push_quad(out, clip, [[x0, y0], [x1, y0], [x1, y1], [x0, y1]], c);
        }
        DrawCommand::Line { from, to, width, color } => {
            push_segment(out, clip, *from, *to, *width, linear(*color));
        }
        DrawCommand::Polyline { points, width, color } => {
            push_polyline(out, clip, points, *width, linear(*color));
        }
        DrawCommand::FilledCurve { points, baseline, color } => {
            let c = linear(*color);
            for pair in points.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                push_quad(out, clip, [a, b, [b[0], *baseline], [a[0], *baseline]], c);
            }
        }
        DrawCommand::Marker { center, radius, color } => {
            let c = linear(*color);
            let step = std::f32::consts::TAU / MARKER_SEGMENTS as f32;
            for k in 0..MARKER_SEGMENTS {
                let a0 = k as f32 * step;
                let a1 = a0 + step;
                let p0 = [center[0] + radius * a0.cos(), center[1] + radius * a0.sin()];
                let p1 = [center[0] + radius * a1.cos(), center[1] + radius * a1.sin()];
                push_triangle(out, clip, [*center, p0, p1], c);
            }
        }
        DrawCommand::Text { position, text, size, color } => {
            mesh.texts.push(TextRun {
                x: position[0] + origin[0],
                y: position[1] + origin[1],
                text: text.clone(),
                size: *size,
                color: to_bytes(*color),
            });
        }
    }
}

fn push_triangle(out: &mut Vec<Vertex>, clip: ClipTransform, pts: [[f32; 2]; 3], color: [f32; 4]) {
    for p in pts {
        out.push(Vertex { position: clip.to_clip(p), color });
    }
}

fn push_quad(out: &mut Vec<Vertex>, clip: ClipTransform, pts: [[f32; 2]; 4], color: [f32; 4]) {
    push_triangle(out, clip, [pts[0], pts[1], pts[2]], color);
    push_triangle(out, clip, [pts[0], pts[2], pts[3]], color);
}

fn push_segment(out: &mut Vec<Vertex>, clip: ClipTransform, a: [f32; 2], b: [f32; 2], width: f32, color: [f32; 4]) {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let len = (dx * dx + dy * dy).sqrt();
    if len <= f32::EPSILON {
        return;
    }
    let h = width * 0.5;
    let (nx, ny) = (-dy / len * h, dx / len * h);
    push_quad(
        out,
        clip,
        [[a[0] + nx, a[1] + ny], [b[0] + nx, b[1] + ny], [b[0] - nx, b[1] - ny], [a[0] - nx, a[1] - ny]],
        color,
    );
}

/// Strip along averaged vertex normals so joints stay closed.
fn push_polyline(out: &mut Vec<Vertex>, clip: ClipTransform, points: &[[f32; 2]], width: f32, color: [f32; 4]) {
    if points.len() < 2 {
        return;
    }
    let normals = vertex_normals(points);
    let h = width * 0.5;
    let edge = |i: usize, sign: f32| {
        [points[i][0] + normals[i][0] * h * sign, points[i][1] + normals[i][1] * h * sign]
    };
    for i in 0..points.len() - 1 {
        push_quad(out, clip, [edge(i, 1.0), edge(i + 1, 1.0), edge(i + 1, -1.0), edge(i, -1.0)], color);
    }
}

fn vertex_normals(points: &[[f32; 2]]) -> Vec<[f32; 2]> {
    let segment: Vec<[f32; 2]> = points
        .windows(2)
        .map(|w| {
            let (dx, dy) = (w[1][0] - w[0][0], w[1][1] - w[0][1]);
            let len = (dx * dx + dy * dy).sqrt();
            if len <= f32::EPSILON {
                [0.0, 1.0]
            } else {
                [-dy / len, dx / len]
            }
        })
        .collect();

    (0..points.len())
        .map(|i| {
            let prev = if i == 0 { segment[0] } else { segment[i - 1] };
            let next = segment.get(i).copied().unwrap_or(prev);
            let (nx, ny) = (prev[0] + next[0], prev[1] + next[1]);
            let len = (nx * nx + ny * ny).sqrt();
            if len <= f32::EPSILON {
                next
            } else {
                [nx / len, ny / len]
            }
        })
        .collect()
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// The render target is an sRGB texture, so vertex colors go in linear.
fn linear(color: Rgba) -> [f32; 4] {
    [
        srgb_to_linear(color[0]),
        srgb_to_linear(color[1]),
        srgb_to_linear(color[2]),
        color[3],
    ]
}

fn to_bytes(color: Rgba) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::VisibleWindow;
    use crate::render::scene::{PanelFrame, PanelKind, PanelSurface};

    fn scene_with(commands: Vec<DrawCommand>, surface: PanelSurface) -> Scene {
        Scene {
            window: VisibleWindow { time_start: 0.0, time_end: 1.0, start_idx: 0, end_idx: 1 },
            local_correlation: 0.0,
            panels: vec![PanelFrame { surface, outcome: Ok(commands) }],
        }
    }

    const WHITE: Rgba = [1.0, 1.0, 1.0, 1.0];

    #[test]
    fn full_frame_rect_spans_clip_space() {
        let surface = PanelSurface { kind: PanelKind::Pitch, x: 0, y: 0, width: 100, height: 50 };
        let scene = scene_with(
            vec![DrawCommand::FillRect { x: 0.0, y: 0.0, width: 100.0, height: 50.0, color: WHITE }],
            surface,
        );
        let mesh = tessellate(&scene, 100, 50);
        assert_eq!(mesh.vertices.len(), 6);
        assert_eq!(mesh.vertices[0].position, [-1.0, 1.0]);
        assert_eq!(mesh.vertices[2].position, [1.0, -1.0]);
    }

    #[test]
    fn panel_origin_offsets_geometry_and_text() {
        let surface = PanelSurface { kind: PanelKind::Amplitude, x: 0, y: 50, width: 100, height: 50 };
        let scene = scene_with(
            vec![
                DrawCommand::FillRect { x: 0.0, y: 0.0, width: 100.0, height: 50.0, color: WHITE },
                DrawCommand::Text { position: [4.0, 2.0], text: "0".into(), size: 12.0, color: WHITE },
            ],
            surface,
        );
        let mesh = tessellate(&scene, 100, 100);
        assert_eq!(mesh.vertices[0].position, [-1.0, 0.0]);
        assert_eq!(mesh.texts[0].y, 52.0);
        assert_eq!(mesh.texts[0].color, [255, 255, 255, 255]);
    }

    #[test]
    fn failed_panels_contribute_nothing() {
        let surface = PanelSurface { kind: PanelKind::Pitch, x: 0, y: 0, width: 0, height: 0 };
        let mut scene = scene_with(Vec::new(), surface);
        scene.panels[0].outcome = Err(crate::render::scene::PanelError::Degenerate {
            kind: PanelKind::Pitch,
            width: 0,
            height: 0,
        });
        let mesh = tessellate(&scene, 100, 100);
        assert!(mesh.vertices.is_empty() && mesh.texts.is_empty());
    }

    #[test]
    fn shapes_emit_whole_triangles() {
        let surface = PanelSurface { kind: PanelKind::Pitch, x: 0, y: 0, width: 100, height: 100 };
        let points = vec![[0.0, 50.0], [10.0, 40.0], [20.0, 60.0], [30.0, 50.0]];
        let scene = scene_with(
            vec![
                DrawCommand::Polyline { points: points.clone(), width: 2.0, color: WHITE },
                DrawCommand::FilledCurve { points, baseline: 50.0, color: WHITE },
                DrawCommand::Marker { center: [50.0, 50.0], radius: 4.0, color: WHITE },
                DrawCommand::Line { from: [0.0, 0.0], to: [0.0, 0.0], width: 1.0, color: WHITE },
            ],
            surface,
        );
        let mesh = tessellate(&scene, 100, 100);
        // 3 strip quads + 3 fill quads + marker fan; the zero-length line is dropped.
        assert_eq!(mesh.vertices.len(), 3 * 6 + 3 * 6 + MARKER_SEGMENTS * 3);
    }

    #[test]
    fn srgb_endpoints_are_preserved() {
        assert_eq!(linear([0.0, 1.0, 0.0, 0.5]), [0.0, 1.0, 0.0, 0.5]);
        assert!(srgb_to_linear(0.5) < 0.5);
    }
}
