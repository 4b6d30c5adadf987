//! Fetch, then run the primitive pipeline on the unshaded vertices.

use crate::error::DrawError;
use crate::prim::{DrawElt, PrimitiveType};
use crate::vertex::VertexStore;

use super::fetch::Fetch;
use super::{MiddleEnd, PtContext, PtOptions, DRAW_PIPE_MAX_VERTICES};

#[derive(Default)]
pub(crate) struct FetchPipeline {
    fetch: Fetch,
    prim: Option<PrimitiveType>,
    slots: usize,
}

impl FetchPipeline {
    fn prim(&self) -> Result<PrimitiveType, DrawError> {
        self.prim.ok_or(DrawError::NotPrepared("fetch_pipeline"))
    }
}

impl MiddleEnd for FetchPipeline {
    fn name(&self) -> &'static str {
        "fetch_pipeline"
    }

    fn prepare(
        &mut self,
        cx: &mut PtContext<'_>,
        prim: PrimitiveType,
        _opts: PtOptions,
    ) -> Result<usize, DrawError> {
        self.slots = cx.config.vertex_slots();
        self.fetch.prepare(cx, self.slots)?;
        cx.pipeline.validate(cx.config, &*cx.render)?;
        self.prim = Some(prim);
        Ok(DRAW_PIPE_MAX_VERTICES)
    }

    fn run(
        &mut self,
        cx: &mut PtContext<'_>,
        fetch_elts: &[u32],
        draw_elts: &[DrawElt],
    ) -> Result<(), DrawError> {
        let prim = self.prim()?;
        let mut verts = VertexStore::new(self.slots, fetch_elts.len());
        self.fetch.run(cx, fetch_elts, &mut verts)?;
        cx.pipeline.run(&mut *cx.render, &mut verts, prim, draw_elts)?;
        cx.stats.pipeline_batches += 1;
        Ok(())
    }

    fn run_linear(
        &mut self,
        cx: &mut PtContext<'_>,
        start: u32,
        count: usize,
    ) -> Result<(), DrawError> {
        let prim = self.prim()?;
        let mut verts = VertexStore::new(self.slots, count);
        self.fetch.run_linear(cx, start, count, &mut verts)?;
        cx.pipeline
            .run_linear(&mut *cx.render, &mut verts, prim, count)?;
        cx.stats.pipeline_batches += 1;
        Ok(())
    }

    fn finish(&mut self, _cx: &mut PtContext<'_>) {
        self.prim = None;
    }
}
