//! Fetch straight into the hardware vertex layout. Used when shading,
//! clipping and the primitive pipeline are all bypassed.

use std::sync::Arc;

use tracing::debug;

use crate::error::DrawError;
use crate::prim::{DrawElt, PrimitiveType};
use crate::translate::{Translate, TranslateKey, VertexBufferView};
use crate::vertex::VertexInfo;

use super::{emit, DrawList, MiddleEnd, PtContext, PtOptions};

#[derive(Default)]
pub(crate) struct FetchEmit {
    prepared: Option<Prepared>,
}

struct Prepared {
    prim: PrimitiveType,
    vinfo: VertexInfo,
    translate: Arc<Translate>,
    /// Source of `EmitFormat::PointSize` attributes, bound after the user's
    /// vertex buffers with a zero stride.
    point_size: [u8; 4],
}

impl Prepared {
    fn draw(
        &self,
        cx: &mut PtContext<'_>,
        count: usize,
        list: DrawList<'_>,
        fill: impl FnOnce(&Translate, &[VertexBufferView<'_>], &mut [u8]) -> Result<(), DrawError>,
    ) -> Result<(), DrawError> {
        let mut buffers = cx.buffers.to_vec();
        buffers.push(VertexBufferView::new(&self.point_size, 0));
        let translate = &*self.translate;
        emit::write_batch(&mut *cx.render, &self.vinfo, self.prim, count, list, |buf| {
            fill(translate, &buffers, buf)
        })?;
        cx.stats.vertices_fetched += count as u64;
        cx.stats.vertices_emitted += count as u64;
        cx.stats.emit_batches += 1;
        Ok(())
    }
}

impl MiddleEnd for FetchEmit {
    fn name(&self) -> &'static str {
        "fetch_emit"
    }

    fn prepare(
        &mut self,
        cx: &mut PtContext<'_>,
        prim: PrimitiveType,
        _opts: PtOptions,
    ) -> Result<usize, DrawError> {
        let vinfo = emit::begin(&mut *cx.render, &mut *cx.pipeline, prim)?;
        let key = TranslateKey::for_hw_vertex(&vinfo, cx.elements, cx.buffers.len(), self.name())?;
        let translate = cx.cache.get(&key);
        let max_vertices = emit::max_vertices(&*cx.render, &vinfo)?;
        debug!(%prim, vertex_size = vinfo.vertex_size(), max_vertices, "fetch_emit prepared");
        self.prepared = Some(Prepared {
            prim,
            vinfo,
            translate,
            point_size: cx.config.rasterizer.point_size.to_le_bytes(),
        });
        Ok(max_vertices)
    }

    fn run(
        &mut self,
        cx: &mut PtContext<'_>,
        fetch_elts: &[u32],
        draw_elts: &[DrawElt],
    ) -> Result<(), DrawError> {
        let prepared = self.prepared.as_ref().ok_or(DrawError::NotPrepared("fetch_emit"))?;
        prepared.draw(cx, fetch_elts.len(), DrawList::Elts(draw_elts), |t, buffers, dst| {
            t.run_elts(buffers, fetch_elts, dst)
        })
    }

    fn run_linear(
        &mut self,
        cx: &mut PtContext<'_>,
        start: u32,
        count: usize,
    ) -> Result<(), DrawError> {
        let prepared = self.prepared.as_ref().ok_or(DrawError::NotPrepared("fetch_emit"))?;
        prepared.draw(cx, count, DrawList::Linear(count), |t, buffers, dst| {
            t.run_linear(buffers, start, count, dst)
        })
    }

    fn finish(&mut self, _cx: &mut PtContext<'_>) {
        self.prepared = None;
    }
}
