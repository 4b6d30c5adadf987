//! Fused fetch + shade + emit for draws that need shading but neither clip
//! testing nor the primitive pipeline.
//!
//! Vertices are processed in small groups straight into the mapped hardware
//! buffer, so no batch-sized intermediate copy exists.

use std::sync::Arc;

use tracing::debug;

use crate::error::DrawError;
use crate::prim::{linear_index, DrawElt, PrimitiveType};
use crate::translate::{Translate, TranslateKey};
use crate::vertex::{emit_hw_vertex, VertexInfo, VertexStore};

use super::post_vs::PostVs;
use super::{emit, DrawList, MiddleEnd, PtContext, PtOptions};

/// Vertices fetched and shaded together.
const GROUP: usize = 16;

#[derive(Default)]
pub(crate) struct FetchShadeEmit {
    prepared: Option<Prepared>,
}

struct Prepared {
    prim: PrimitiveType,
    vinfo: VertexInfo,
    translate: Arc<Translate>,
    post_vs: PostVs,
    input_slots: usize,
    output_slots: usize,
}

impl FetchShadeEmit {
    fn draw(
        &self,
        cx: &mut PtContext<'_>,
        fetch_elts: &[u32],
        list: DrawList<'_>,
    ) -> Result<(), DrawError> {
        let p = self
            .prepared
            .as_ref()
            .ok_or(DrawError::NotPrepared("fetch_shade_emit"))?;
        let shader = cx.require_shader()?;
        let buffers = cx.buffers;
        let point_size = cx.config.rasterizer.point_size;
        let size = p.vinfo.vertex_size();
        let count = fetch_elts.len();

        emit::write_batch(&mut *cx.render, &p.vinfo, p.prim, count, list, |buf| {
            for (group, elts) in fetch_elts.chunks(GROUP).enumerate() {
                let n = elts.len();
                let mut inputs = VertexStore::new(p.input_slots, n);
                p.translate
                    .run_elts(buffers, elts, inputs.data_bytes_mut())?;

                let mut outputs = VertexStore::new(p.output_slots, n);
                shader.run_linear(
                    inputs.all_data(),
                    p.input_slots,
                    outputs.all_data_mut(),
                    p.output_slots,
                    n,
                );
                p.post_vs.run(&mut outputs);

                let base = group * GROUP * size;
                let dst = &mut buf[base..base + n * size];
                for (v, out) in dst.chunks_exact_mut(size).enumerate() {
                    emit_hw_vertex(&p.vinfo, outputs.header(v), outputs.data(v), point_size, out);
                }
            }
            Ok(())
        })?;

        cx.stats.vertices_fetched += count as u64;
        cx.stats.vertices_emitted += count as u64;
        cx.stats.emit_batches += 1;
        Ok(())
    }
}

impl MiddleEnd for FetchShadeEmit {
    fn name(&self) -> &'static str {
        "fetch_shade_emit"
    }

    fn prepare(
        &mut self,
        cx: &mut PtContext<'_>,
        prim: PrimitiveType,
        opts: PtOptions,
    ) -> Result<usize, DrawError> {
        debug_assert_eq!(opts, PtOptions::SHADE);
        cx.require_shader()?;
        let input_slots = cx.config.num_inputs.max(1);
        let output_slots = cx.config.vertex_slots();

        let vinfo = emit::begin(&mut *cx.render, &mut *cx.pipeline, prim)?;
        vinfo.check_sources(output_slots)?;
        let key = TranslateKey::for_float4_slots(cx.elements, cx.config.num_inputs, input_slots)?;
        let translate = cx.cache.get(&key);
        let max_vertices = emit::max_vertices(&*cx.render, &vinfo)?;
        debug!(%prim, vertex_size = vinfo.vertex_size(), max_vertices, "fetch_shade_emit prepared");

        self.prepared = Some(Prepared {
            prim,
            vinfo,
            translate,
            post_vs: PostVs::new(cx.config),
            input_slots,
            output_slots,
        });
        Ok(max_vertices)
    }

    fn run(
        &mut self,
        cx: &mut PtContext<'_>,
        fetch_elts: &[u32],
        draw_elts: &[DrawElt],
    ) -> Result<(), DrawError> {
        self.draw(cx, fetch_elts, DrawList::Elts(draw_elts))
    }

    fn run_linear(
        &mut self,
        cx: &mut PtContext<'_>,
        start: u32,
        count: usize,
    ) -> Result<(), DrawError> {
        let elts = (0..count)
            .map(|i| linear_index(start, i))
            .collect::<Option<Vec<u32>>>()
            .ok_or(DrawError::VertexIndexOverflow { start, count })?;
        self.draw(cx, &elts, DrawList::Linear(count))
    }

    fn finish(&mut self, _cx: &mut PtContext<'_>) {
        self.prepared = None;
    }
}
