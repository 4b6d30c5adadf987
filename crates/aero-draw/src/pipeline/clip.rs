//! Clip-space clipping against the canonical and user planes.

use crate::config::{DrawCallConfig, Viewport, CANONICAL_CLIP_PLANES};
use crate::error::DrawError;
use crate::vertex::{ClipMask, VertexStore};

use super::{PrimHeader, Stage, StageChain, EDGE_FLAG_0, EDGE_FLAG_1, EDGE_FLAG_2};

#[inline]
fn dot4(a: [f32; 4], b: [f32; 4]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]
}

pub(crate) struct ClipStage {
    planes: Vec<[f32; 4]>,
    pos: usize,
    viewport: Viewport,
    /// Scratch polygon lists, reused across triangles.
    inlist: Vec<usize>,
    outlist: Vec<usize>,
    inedges: Vec<bool>,
    outedges: Vec<bool>,
}

impl ClipStage {
    pub(crate) fn new(config: &DrawCallConfig) -> Self {
        Self {
            planes: config.planes.clone(),
            pos: config.position_output,
            viewport: config.viewport,
            inlist: Vec::new(),
            outlist: Vec::new(),
            inedges: Vec::new(),
            outedges: Vec::new(),
        }
    }

    fn plane(&self, index: usize) -> [f32; 4] {
        // Masks only carry bits for planes that exist; anything else never
        // clips.
        self.planes.get(index).copied().unwrap_or([0.0, 0.0, 0.0, 1.0])
    }

    /// New vertex `a + t * (b - a)`, with its window position derived from
    /// the interpolated clip position.
    fn interp(&self, verts: &mut VertexStore, t: f32, a: usize, b: usize) -> usize {
        let v = verts.interpolate(t, a, b);
        let clip = verts.header(v).clip;
        let w = 1.0 / clip[3];
        let mut pos = [clip[0] * w, clip[1] * w, clip[2] * w, w];
        self.viewport.apply(&mut pos);
        verts.data_mut(v)[self.pos] = pos;
        v
    }

    fn clip_line(&mut self, prim: &PrimHeader, mask: ClipMask, next: &mut StageChain<'_>) -> Result<(), DrawError> {
        let (v0, v1) = (prim.v[0], prim.v[1]);
        let c0 = next.verts.header(v0).clip;
        let c1 = next.verts.header(v1).clip;
        let mut t0 = 0.0f32;
        let mut t1 = 0.0f32;

        for plane in mask.planes() {
            let p = self.plane(plane);
            let dp0 = dot4(c0, p);
            let dp1 = dot4(c1, p);
            if dp1 < 0.0 {
                t1 = t1.max(dp1 / (dp1 - dp0));
            }
            if dp0 < 0.0 {
                t0 = t0.max(dp0 / (dp0 - dp1));
            }
            if t0 + t1 >= 1.0 {
                return Ok(());
            }
        }

        let mut out = *prim;
        if !next.verts.header(v0).clipmask.is_empty() {
            out.v[0] = self.interp(next.verts, t0, v0, v1);
        }
        if !next.verts.header(v1).clipmask.is_empty() {
            out.v[1] = self.interp(next.verts, t1, v1, v0);
        }
        next.line(&out)
    }

    fn clip_tri(&mut self, prim: &PrimHeader, mask: ClipMask, next: &mut StageChain<'_>) -> Result<(), DrawError> {
        let mut inlist = std::mem::take(&mut self.inlist);
        let mut outlist = std::mem::take(&mut self.outlist);
        let mut inedges = std::mem::take(&mut self.inedges);
        let mut outedges = std::mem::take(&mut self.outedges);
        inlist.clear();
        inedges.clear();
        inlist.extend_from_slice(&prim.v);
        inedges.extend((0..3).map(|k| prim.edgeflags & (1 << k) != 0));

        for plane_idx in mask.planes() {
            let plane = self.plane(plane_idx);
            outlist.clear();
            outedges.clear();

            let n = inlist.len();
            let mut prev = inlist[0];
            let mut ef_prev = inedges[0];
            let mut dp_prev = dot4(next.verts.header(prev).clip, plane);
            for i in 1..=n {
                let vert = inlist[i % n];
                let ef = inedges[i % n];
                let dp = dot4(next.verts.header(vert).clip, plane);

                if dp_prev >= 0.0 || dp_prev.is_nan() {
                    outlist.push(prev);
                    outedges.push(ef_prev);
                }
                if (dp < 0.0) != (dp_prev < 0.0) {
                    if dp < 0.0 {
                        // Leaving: the next edge runs along the clip plane.
                        let t = dp / (dp - dp_prev);
                        outlist.push(self.interp(next.verts, t, vert, prev));
                        outedges.push(plane_idx >= CANONICAL_CLIP_PLANES);
                    } else {
                        // Entering: continues the original edge.
                        let t = dp_prev / (dp_prev - dp);
                        outlist.push(self.interp(next.verts, t, prev, vert));
                        outedges.push(ef_prev);
                    }
                }

                prev = vert;
                ef_prev = ef;
                dp_prev = dp;
            }

            std::mem::swap(&mut inlist, &mut outlist);
            std::mem::swap(&mut inedges, &mut outedges);
            if inlist.len() < 3 {
                break;
            }
        }

        let result = if inlist.len() >= 3 {
            emit_poly(prim, &inlist, &inedges, next)
        } else {
            Ok(())
        };

        self.inlist = inlist;
        self.outlist = outlist;
        self.inedges = inedges;
        self.outedges = outedges;
        result
    }
}

/// Fan the clipped polygon out as triangles `(p[i-1], p[i], p[0])`, keeping
/// only edge flags of edges that lie on the polygon boundary.
fn emit_poly(
    prim: &PrimHeader,
    poly: &[usize],
    edges: &[bool],
    next: &mut StageChain<'_>,
) -> Result<(), DrawError> {
    let n = poly.len();
    for i in 2..n {
        let mut flags = 0;
        if edges[i - 1] {
            flags |= EDGE_FLAG_0;
        }
        if i == n - 1 && edges[i] {
            flags |= EDGE_FLAG_1;
        }
        if i == 2 && edges[0] {
            flags |= EDGE_FLAG_2;
        }
        let header = PrimHeader::tri(
            [poly[i - 1], poly[i], poly[0]],
            flags,
            prim.reset_line_stipple && i == 2,
        );
        next.tri(&header)?;
    }
    Ok(())
}

impl Stage for ClipStage {
    fn name(&self) -> &'static str {
        "clip"
    }

    fn point(&mut self, prim: &PrimHeader, next: &mut StageChain<'_>) -> Result<(), DrawError> {
        if next.verts.header(prim.v[0]).clipmask.is_empty() {
            next.point(prim)
        } else {
            Ok(())
        }
    }

    fn line(&mut self, prim: &PrimHeader, next: &mut StageChain<'_>) -> Result<(), DrawError> {
        let m0 = next.verts.header(prim.v[0]).clipmask;
        let m1 = next.verts.header(prim.v[1]).clipmask;
        if (m0 | m1).is_empty() {
            next.line(prim)
        } else if !(m0 & m1).is_empty() {
            Ok(())
        } else {
            self.clip_line(prim, m0 | m1, next)
        }
    }

    fn tri(&mut self, prim: &PrimHeader, next: &mut StageChain<'_>) -> Result<(), DrawError> {
        let m0 = next.verts.header(prim.v[0]).clipmask;
        let m1 = next.verts.header(prim.v[1]).clipmask;
        let m2 = next.verts.header(prim.v[2]).clipmask;
        if (m0 | m1 | m2).is_empty() {
            next.tri(prim)
        } else if !(m0 & m1 & m2).is_empty() {
            Ok(())
        } else {
            self.clip_tri(prim, m0 | m1 | m2, next)
        }
    }
}
