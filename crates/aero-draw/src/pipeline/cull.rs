use crate::config::CullMode;
use crate::error::DrawError;

use super::{is_front_facing, triangle_det, PrimHeader, Stage, StageChain};

/// Drops triangles by facing. Zero-area triangles are always dropped.
pub(crate) struct CullStage {
    mode: CullMode,
    front_ccw: bool,
    pos: usize,
}

impl CullStage {
    pub(crate) fn new(mode: CullMode, front_ccw: bool, pos: usize) -> Self {
        Self {
            mode,
            front_ccw,
            pos,
        }
    }
}

impl Stage for CullStage {
    fn name(&self) -> &'static str {
        "cull"
    }

    fn tri(&mut self, prim: &PrimHeader, next: &mut StageChain<'_>) -> Result<(), DrawError> {
        let det = triangle_det(next.verts, prim, self.pos);
        if det == 0.0 {
            return Ok(());
        }
        let front = is_front_facing(det, self.front_ccw);
        let culled = match self.mode {
            CullMode::None => false,
            CullMode::Front => front,
            CullMode::Back => !front,
            CullMode::FrontAndBack => true,
        };
        if culled {
            Ok(())
        } else {
            next.tri(prim)
        }
    }
}
