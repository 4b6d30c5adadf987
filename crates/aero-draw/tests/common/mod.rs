//! Shared helpers for `aero-draw` integration tests.
//!
//! Vertices are float4 positions in buffer 0; the recording backend's layout
//! is a single float4 read from slot 0, so released buffers can be compared
//! as plain `[x, y, z, w]` records.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use aero_draw::capture::{RecordingRender, RenderLog};
use aero_draw::{
    DrawContext, DrawOptions, EmitFormat, RasterizerState, VertexElement, VertexFormat, VertexInfo,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn float4_vinfo() -> VertexInfo {
    VertexInfo::new().attr(0, EmitFormat::Float4)
}

pub fn float4_render() -> RecordingRender {
    RecordingRender::new(float4_vinfo())
}

/// `[x, y, 0, 1]` for every point, as little-endian bytes.
pub fn positions(points: &[[f32; 2]]) -> Vec<u8> {
    let verts: Vec<[f32; 4]> = points.iter().map(|&[x, y]| [x, y, 0.0, 1.0]).collect();
    bytemuck::cast_slice(&verts).to_vec()
}

pub fn position_elements() -> Vec<VertexElement> {
    vec![VertexElement::new(0, 0, VertexFormat::Float32x4)]
}

pub fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Rasterizer state that skips shading and clipping.
pub fn bypass() -> RasterizerState {
    RasterizerState {
        bypass_vs: true,
        ..Default::default()
    }
}

/// A context drawing into `render` with position elements bound.
pub fn context(
    options: DrawOptions,
    rasterizer: RasterizerState,
    render: RecordingRender,
) -> (DrawContext, Rc<RefCell<RenderLog>>) {
    init_tracing();
    let log = render.log_handle();
    let mut ctx = DrawContext::new(options);
    ctx.set_render(Box::new(render));
    ctx.set_rasterizer_state(rasterizer);
    ctx.set_vertex_elements(&position_elements());
    (ctx, log)
}

pub fn no_passthrough() -> DrawOptions {
    DrawOptions {
        passthrough: false,
        ..Default::default()
    }
}
