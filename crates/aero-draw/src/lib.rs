//! `aero-draw` turns draw calls into hardware vertex and index buffers.
//!
//! A [`DrawContext`] holds bound state (rasterizer, viewport, clip planes,
//! vertex elements, vertex shader) and a [`VbufRender`] backend. Each draw
//! goes through one of these paths:
//! - passthrough: unshaded, unclipped, non-indexed draws are fetched straight
//!   into hardware buffers.
//! - the vcache front end, which de-duplicates indices into batches and hands
//!   them to a middle end that fetches, optionally shades and clip tests, then
//!   either emits directly or runs the primitive [`Pipeline`] (clip, cull,
//!   unfilled, stipple, vbuf).
//!
//! [`capture::RecordingRender`] is a backend that records every call and
//! resolves the drawn primitives, for tests and tracing.

#![forbid(unsafe_code)]

mod backend;
mod config;
mod context;
mod error;
mod passthrough;
mod prim;
mod pt;
mod shader;
mod stats;
mod util;

pub mod capture;
pub mod pipeline;
pub mod translate;
pub mod vertex;

pub use backend::{max_vertices_for, VbufRender};
pub use config::{
    canonical_planes, CullMode, DrawCallConfig, DrawOptions, FillMode, RasterizerState, Viewport,
    CANONICAL_CLIP_PLANES, DISABLE_FSE_ENV, DISABLE_PASSTHROUGH_ENV, MAX_USER_CLIP_PLANES,
    PASSTHROUGH_MAX_VERTICES_ENV,
};
pub use context::{DrawContext, DrawInputs};
pub use error::DrawError;
pub use pipeline::{FlushFlags, Pipeline};
pub use prim::{DrawElt, Elts, PrimitiveType};
pub use pt::DRAW_PIPE_MAX_VERTICES;
pub use shader::{FnShader, PassthroughShader, ShaderInfo, VertexShader};
pub use stats::DrawStats;
pub use translate::{VertexBufferView, VertexElement};
pub use vertex::{EmitFormat, VertexFormat, VertexInfo, UNDEFINED_VERTEX_ID};
