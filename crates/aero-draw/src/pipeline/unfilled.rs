use crate::config::FillMode;
use crate::error::DrawError;

use super::{is_front_facing, triangle_det, PrimHeader, Stage, StageChain};

/// Turns triangles into their edges or corners according to the fill mode of
/// the face they show. Only flagged edges (and the corners starting them)
/// are drawn.
pub(crate) struct UnfilledStage {
    front: FillMode,
    back: FillMode,
    front_ccw: bool,
    pos: usize,
}

impl UnfilledStage {
    pub(crate) fn new(front: FillMode, back: FillMode, front_ccw: bool, pos: usize) -> Self {
        Self {
            front,
            back,
            front_ccw,
            pos,
        }
    }
}

impl Stage for UnfilledStage {
    fn name(&self) -> &'static str {
        "unfilled"
    }

    fn tri(&mut self, prim: &PrimHeader, next: &mut StageChain<'_>) -> Result<(), DrawError> {
        let det = triangle_det(next.verts, prim, self.pos);
        let mode = if is_front_facing(det, self.front_ccw) {
            self.front
        } else {
            self.back
        };
        let [v0, v1, v2] = prim.v;
        match mode {
            FillMode::Fill => next.tri(prim),
            FillMode::Line => {
                if prim.reset_line_stipple {
                    next.reset_stipple_counter();
                }
                for (edge, a, b) in [(2, v2, v0), (0, v0, v1), (1, v1, v2)] {
                    if prim.edgeflags & (1 << edge) != 0 {
                        next.line(&PrimHeader::line(a, b, false))?;
                    }
                }
                Ok(())
            }
            FillMode::Point => {
                for (k, v) in prim.v.into_iter().enumerate() {
                    if prim.edgeflags & (1 << k) != 0 {
                        next.point(&PrimHeader::point(v))?;
                    }
                }
                Ok(())
            }
        }
    }
}
