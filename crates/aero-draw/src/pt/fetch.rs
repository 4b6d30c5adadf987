//! Gathers source attributes into float4 vertex slots.

use std::sync::Arc;

use crate::error::DrawError;
use crate::prim::linear_index;
use crate::translate::{Translate, TranslateKey};
use crate::vertex::VertexStore;

use super::PtContext;

#[derive(Default)]
pub(crate) struct Fetch {
    translate: Option<Arc<Translate>>,
    need_edgeflags: bool,
}

impl Fetch {
    /// Select the program writing the shader's inputs into `stride_slots`-slot
    /// vertices. Equal layouts share one cached program.
    pub(crate) fn prepare(
        &mut self,
        cx: &mut PtContext<'_>,
        stride_slots: usize,
    ) -> Result<(), DrawError> {
        let key =
            TranslateKey::for_float4_slots(cx.elements, cx.config.num_inputs, stride_slots)?;
        let reuse = self.translate.as_ref().is_some_and(|t| *t.key() == key);
        if !reuse {
            self.translate = Some(cx.cache.get(&key));
        }
        self.need_edgeflags = cx.config.need_edgeflags;
        Ok(())
    }

    fn translate(&self) -> Result<&Translate, DrawError> {
        self.translate
            .as_deref()
            .ok_or(DrawError::NotPrepared("fetch"))
    }

    pub(crate) fn run(
        &self,
        cx: &mut PtContext<'_>,
        elts: &[u32],
        verts: &mut VertexStore,
    ) -> Result<(), DrawError> {
        self.translate()?
            .run_elts(cx.buffers, elts, verts.data_bytes_mut())?;
        if self.need_edgeflags {
            for (v, &elt) in elts.iter().enumerate() {
                verts.header_mut(v).edgeflag = user_edgeflag(cx.edgeflags, elt);
            }
        }
        cx.stats.vertices_fetched += elts.len() as u64;
        Ok(())
    }

    pub(crate) fn run_linear(
        &self,
        cx: &mut PtContext<'_>,
        start: u32,
        count: usize,
        verts: &mut VertexStore,
    ) -> Result<(), DrawError> {
        self.translate()?
            .run_linear(cx.buffers, start, count, verts.data_bytes_mut())?;
        if self.need_edgeflags {
            for v in 0..count {
                let elt = linear_index(start, v)
                    .ok_or(DrawError::VertexIndexOverflow { start, count })?;
                verts.header_mut(v).edgeflag = user_edgeflag(cx.edgeflags, elt);
            }
        }
        cx.stats.vertices_fetched += count as u64;
        Ok(())
    }
}

fn user_edgeflag(flags: Option<&[bool]>, elt: u32) -> bool {
    flags
        .and_then(|f| f.get(elt as usize).copied())
        .unwrap_or(true)
}
