//! Primitive assembly and the primitive stage chain.
//!
//! [`Pipeline::run`] turns a vertex batch plus draw elements into points,
//! lines and triangles and pushes each one through the configured stages
//! (clip, cull, unfilled, stipple). The chain always ends in the emission
//! stage, which batches hardware vertices and indices for the backend.

mod clip;
mod cull;
mod stipple;
mod unfilled;
mod vbuf;

use bitflags::bitflags;
use tracing::{debug, error};

use crate::backend::VbufRender;
use crate::config::{CullMode, DrawCallConfig};
use crate::error::DrawError;
use crate::prim::{DrawElt, PrimitiveType};
use crate::stats::VbufStats;
use crate::vertex::{VertexStore, UNDEFINED_VERTEX_ID};

pub(crate) use vbuf::VbufStage;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct FlushFlags: u32 {
        /// State is about to change: submit pending indices.
        const STATE_CHANGE = 1 << 0;
        /// Also hand the open vertex buffer back to the backend.
        const BACKEND = 1 << 1;
    }
}

/// Edge flag bit for the edge starting at corner 0 (`v0 -> v1`).
pub const EDGE_FLAG_0: u8 = 1 << 0;
/// Edge `v1 -> v2`.
pub const EDGE_FLAG_1: u8 = 1 << 1;
/// Edge `v2 -> v0`.
pub const EDGE_FLAG_2: u8 = 1 << 2;
pub const EDGE_FLAG_ALL: u8 = EDGE_FLAG_0 | EDGE_FLAG_1 | EDGE_FLAG_2;

/// A point, line or triangle referencing vertices of the current batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimHeader {
    pub v: [usize; 3],
    pub edgeflags: u8,
    pub reset_line_stipple: bool,
}

impl PrimHeader {
    pub fn point(v0: usize) -> Self {
        Self {
            v: [v0, 0, 0],
            edgeflags: 1,
            reset_line_stipple: false,
        }
    }

    pub fn line(v0: usize, v1: usize, reset_line_stipple: bool) -> Self {
        Self {
            v: [v0, v1, 0],
            edgeflags: 0,
            reset_line_stipple,
        }
    }

    pub fn tri(v: [usize; 3], edgeflags: u8, reset_line_stipple: bool) -> Self {
        Self {
            v,
            edgeflags,
            reset_line_stipple,
        }
    }
}

/// One primitive-processing stage. The default methods forward unchanged.
pub(crate) trait Stage {
    fn name(&self) -> &'static str;

    fn point(&mut self, prim: &PrimHeader, next: &mut StageChain<'_>) -> Result<(), DrawError> {
        next.point(prim)
    }

    fn line(&mut self, prim: &PrimHeader, next: &mut StageChain<'_>) -> Result<(), DrawError> {
        next.line(prim)
    }

    fn tri(&mut self, prim: &PrimHeader, next: &mut StageChain<'_>) -> Result<(), DrawError> {
        next.tri(prim)
    }

    fn reset_stipple_counter(&mut self, next: &mut StageChain<'_>) {
        next.reset_stipple_counter();
    }
}

/// The remainder of the chain as seen from one stage.
pub(crate) struct StageChain<'a> {
    stages: &'a mut [Box<dyn Stage>],
    vbuf: &'a mut VbufStage,
    pub(crate) verts: &'a mut VertexStore,
    render: &'a mut dyn VbufRender,
}

macro_rules! forward {
    ($self:ident, $method:ident, $prim:ident) => {
        match $self.stages.split_first_mut() {
            Some((stage, rest)) => {
                let mut next = StageChain {
                    stages: rest,
                    vbuf: &mut *$self.vbuf,
                    verts: &mut *$self.verts,
                    render: &mut *$self.render,
                };
                stage.$method($prim, &mut next)
            }
            None => $self.vbuf.$method($prim, $self.verts, $self.render),
        }
    };
}

impl StageChain<'_> {
    pub(crate) fn point(&mut self, prim: &PrimHeader) -> Result<(), DrawError> {
        forward!(self, point, prim)
    }

    pub(crate) fn line(&mut self, prim: &PrimHeader) -> Result<(), DrawError> {
        forward!(self, line, prim)
    }

    pub(crate) fn tri(&mut self, prim: &PrimHeader) -> Result<(), DrawError> {
        forward!(self, tri, prim)
    }

    pub(crate) fn reset_stipple_counter(&mut self) {
        if let Some((stage, rest)) = self.stages.split_first_mut() {
            let mut next = StageChain {
                stages: rest,
                vbuf: &mut *self.vbuf,
                verts: &mut *self.verts,
                render: &mut *self.render,
            };
            stage.reset_stipple_counter(&mut next);
        }
    }
}

/// Window-space signed area term of a triangle. Negative means
/// counter-clockwise with y pointing down.
pub(crate) fn triangle_det(verts: &VertexStore, prim: &PrimHeader, pos: usize) -> f32 {
    let p0 = verts.attrib(prim.v[0], pos);
    let p1 = verts.attrib(prim.v[1], pos);
    let p2 = verts.attrib(prim.v[2], pos);
    let (ex, ey) = (p0[0] - p2[0], p0[1] - p2[1]);
    let (fx, fy) = (p1[0] - p2[0], p1[1] - p2[1]);
    ex * fy - ey * fx
}

pub(crate) fn is_front_facing(det: f32, front_ccw: bool) -> bool {
    (det < 0.0) == front_ccw
}

/// Primitive assembly plus the stage chain, ending in hardware emission.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    vbuf: VbufStage,
    validated: Option<DrawCallConfig>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            vbuf: VbufStage::new(),
            validated: None,
        }
    }

    /// Check the backend's declared limits and rebuild the stage chain if
    /// `config` differs from the last validated one.
    pub fn validate(
        &mut self,
        config: &DrawCallConfig,
        render: &dyn VbufRender,
    ) -> Result<(), DrawError> {
        let max_indices = render.max_indices();
        if max_indices >= UNDEFINED_VERTEX_ID as usize {
            error!(max_indices, "backend max_indices collides with the vertex id sentinel");
            return Err(DrawError::InvalidBackendCaps(
                "max_indices must be below the vertex id sentinel",
            ));
        }
        if max_indices < 3 {
            error!(max_indices, "backend index batches cannot hold a triangle");
            return Err(DrawError::InvalidBackendCaps("max_indices must be at least 3"));
        }
        self.vbuf.configure(max_indices, config.rasterizer.point_size);

        if self.validated.as_ref() == Some(config) {
            return Ok(());
        }

        let rast = &config.rasterizer;
        let pos = config.position_output;
        self.stages.clear();
        if !config.bypass_clipping {
            self.stages.push(Box::new(clip::ClipStage::new(config)));
        }
        if rast.cull_mode != CullMode::None {
            self.stages
                .push(Box::new(cull::CullStage::new(rast.cull_mode, rast.front_ccw, pos)));
        }
        if config.unfilled() {
            self.stages.push(Box::new(unfilled::UnfilledStage::new(
                rast.fill_front,
                rast.fill_back,
                rast.front_ccw,
                pos,
            )));
        }
        if rast.line_stipple_enable {
            self.stages.push(Box::new(stipple::StippleStage::new(
                rast.line_stipple_factor,
                rast.line_stipple_pattern,
                pos,
            )));
        }
        debug!(stages = ?self.stage_names(), "rebuilt primitive pipeline");
        self.validated = Some(config.clone());
        Ok(())
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.stages.iter().map(|s| s.name()).collect();
        names.push("vbuf");
        names
    }

    /// Assemble `elts` as primitives of the base kind `prim` and run them
    /// through the chain. Trailing partial primitives are ignored.
    ///
    /// Vertices must arrive without a vertex id, or with ids assigned by the
    /// currently open hardware buffer.
    pub fn run(
        &mut self,
        render: &mut dyn VbufRender,
        verts: &mut VertexStore,
        prim: PrimitiveType,
        elts: &[DrawElt],
    ) -> Result<(), DrawError> {
        self.assemble(render, verts, prim, elts.len(), |i| elts[i])
    }

    /// Like [`Self::run`] with implicit elements `0..count`, all edge flags set.
    pub fn run_linear(
        &mut self,
        render: &mut dyn VbufRender,
        verts: &mut VertexStore,
        prim: PrimitiveType,
        count: usize,
    ) -> Result<(), DrawError> {
        self.assemble(render, verts, prim, count, |i| DrawElt::new(i as u16))
    }

    fn assemble(
        &mut self,
        render: &mut dyn VbufRender,
        verts: &mut VertexStore,
        prim: PrimitiveType,
        count: usize,
        elt: impl Fn(usize) -> DrawElt,
    ) -> Result<(), DrawError> {
        debug_assert!(prim.is_base(), "pipeline only assembles base primitives");
        let mut chain = StageChain {
            stages: &mut self.stages,
            vbuf: &mut self.vbuf,
            verts,
            render,
        };

        match prim.reduced() {
            PrimitiveType::Points => {
                for i in 0..count {
                    chain.point(&PrimHeader::point(usize::from(elt(i).index)))?;
                    chain.verts.truncate_temps();
                }
            }
            PrimitiveType::Lines => {
                let mut i = 0;
                while i + 1 < count {
                    let (e0, e1) = (elt(i), elt(i + 1));
                    let header = PrimHeader::line(
                        usize::from(e0.index),
                        usize::from(e1.index),
                        e0.reset_stipple,
                    );
                    chain.line(&header)?;
                    chain.verts.truncate_temps();
                    i += 2;
                }
            }
            _ => {
                let mut i = 0;
                while i + 2 < count {
                    let e = [elt(i), elt(i + 1), elt(i + 2)];
                    let v = e.map(|e| usize::from(e.index));
                    let mut edgeflags = 0;
                    for k in 0..3 {
                        if e[k].edge_flag && chain.verts.header(v[k]).edgeflag {
                            edgeflags |= 1 << k;
                        }
                    }
                    chain.tri(&PrimHeader::tri(v, edgeflags, e[0].reset_stipple))?;
                    chain.verts.truncate_temps();
                    i += 3;
                }
            }
        }
        Ok(())
    }

    pub fn flush(&mut self, render: &mut dyn VbufRender, flags: FlushFlags) {
        self.vbuf.flush(render, flags);
    }

    pub(crate) fn vbuf_stats(&self) -> VbufStats {
        self.vbuf.stats()
    }
}
