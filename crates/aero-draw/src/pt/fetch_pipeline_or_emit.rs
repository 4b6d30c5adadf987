//! The general path: fetch, shade, post-VS, then either the primitive
//! pipeline or direct emission, decided per batch.

use tracing::{debug, trace};

use crate::error::DrawError;
use crate::prim::{DrawElt, PrimitiveType};
use crate::vertex::VertexStore;

use super::fetch::Fetch;
use super::post_vs::PostVs;
use super::{emit, DrawList, MiddleEnd, PtContext, PtOptions, DRAW_PIPE_MAX_VERTICES};

#[derive(Default)]
pub(crate) struct FetchPipelineOrEmit {
    fetch: Fetch,
    post_vs: Option<PostVs>,
    prim: Option<PrimitiveType>,
    opts: Option<PtOptions>,
    input_slots: usize,
    output_slots: usize,
}

impl FetchPipelineOrEmit {
    /// Fetch `count` vertices (via `fetch`) and shade them into a fresh
    /// output store.
    fn shade(
        &self,
        cx: &mut PtContext<'_>,
        count: usize,
        fetch: impl FnOnce(&Fetch, &mut PtContext<'_>, &mut VertexStore) -> Result<(), DrawError>,
    ) -> Result<VertexStore, DrawError> {
        let shader = cx.require_shader()?;
        let mut inputs = VertexStore::new(self.input_slots, count);
        fetch(&self.fetch, cx, &mut inputs)?;

        let mut outputs = VertexStore::new(self.output_slots, count);
        shader.run_linear(
            inputs.all_data(),
            self.input_slots,
            outputs.all_data_mut(),
            self.output_slots,
            count,
        );
        for v in 0..count {
            outputs.header_mut(v).edgeflag = inputs.header(v).edgeflag;
        }
        Ok(outputs)
    }

    fn finish_batch(
        &mut self,
        cx: &mut PtContext<'_>,
        mut verts: VertexStore,
        list: DrawList<'_>,
    ) -> Result<(), DrawError> {
        let prim = self.prim.ok_or(DrawError::NotPrepared("fetch_pipeline_or_emit"))?;
        let opts = self.opts.unwrap_or(PtOptions::all());
        let post_vs = self
            .post_vs
            .as_ref()
            .ok_or(DrawError::NotPrepared("fetch_pipeline_or_emit"))?;

        let clipped = post_vs.run(&mut verts);
        if clipped || opts.contains(PtOptions::PIPELINE) {
            trace!(%prim, count = verts.batch_len(), clipped, "batch takes the pipeline");
            match list {
                DrawList::Elts(elts) => cx.pipeline.run(&mut *cx.render, &mut verts, prim, elts)?,
                DrawList::Indices(indices) => {
                    let elts: Vec<DrawElt> = indices.iter().copied().map(DrawElt::new).collect();
                    cx.pipeline.run(&mut *cx.render, &mut verts, prim, &elts)?
                }
                DrawList::Linear(n) => {
                    cx.pipeline.run_linear(&mut *cx.render, &mut verts, prim, n)?
                }
            }
            cx.stats.pipeline_batches += 1;
            Ok(())
        } else {
            trace!(%prim, count = verts.batch_len(), "batch emitted directly");
            emit::emit_store(cx, prim, &verts, list)
        }
    }
}

impl MiddleEnd for FetchPipelineOrEmit {
    fn name(&self) -> &'static str {
        "fetch_pipeline_or_emit"
    }

    fn prepare(
        &mut self,
        cx: &mut PtContext<'_>,
        prim: PrimitiveType,
        opts: PtOptions,
    ) -> Result<usize, DrawError> {
        cx.require_shader()?;
        self.input_slots = cx.config.num_inputs.max(1);
        self.output_slots = cx.config.vertex_slots();
        self.fetch.prepare(cx, self.input_slots)?;
        let post_vs = PostVs::new(cx.config);
        cx.pipeline.validate(cx.config, &*cx.render)?;

        // Batches that skip the pipeline must fit one hardware buffer.
        let max_vertices = if opts.contains(PtOptions::PIPELINE) {
            DRAW_PIPE_MAX_VERTICES
        } else {
            let vinfo = emit::begin(&mut *cx.render, &mut *cx.pipeline, prim)?;
            emit::max_vertices(&*cx.render, &vinfo)?
        };
        debug!(%prim, ?opts, post_vs = ?post_vs.mode(), max_vertices, "fetch_pipeline_or_emit prepared");

        self.post_vs = Some(post_vs);
        self.prim = Some(prim);
        self.opts = Some(opts);
        Ok(max_vertices)
    }

    fn run(
        &mut self,
        cx: &mut PtContext<'_>,
        fetch_elts: &[u32],
        draw_elts: &[DrawElt],
    ) -> Result<(), DrawError> {
        let verts = self.shade(cx, fetch_elts.len(), |fetch, cx, store| {
            fetch.run(cx, fetch_elts, store)
        })?;
        self.finish_batch(cx, verts, DrawList::Elts(draw_elts))
    }

    fn run_linear(
        &mut self,
        cx: &mut PtContext<'_>,
        start: u32,
        count: usize,
    ) -> Result<(), DrawError> {
        let verts = self.shade(cx, count, |fetch, cx, store| {
            fetch.run_linear(cx, start, count, store)
        })?;
        self.finish_batch(cx, verts, DrawList::Linear(count))
    }

    fn finish(&mut self, _cx: &mut PtContext<'_>) {
        self.prim = None;
        self.opts = None;
    }
}
