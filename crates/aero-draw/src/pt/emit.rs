//! Direct hardware emission of a whole batch, bypassing the primitive
//! pipeline.

use tracing::{error, trace};

use crate::backend::{max_vertices_for, VbufRender};
use crate::error::DrawError;
use crate::pipeline::{FlushFlags, Pipeline};
use crate::prim::PrimitiveType;
use crate::vertex::{emit_hw_vertex, VertexInfo, VertexStore};

use super::{DrawList, PtContext, DRAW_PIPE_MAX_VERTICES};

/// Select `prim` on the backend and return its hardware layout.
///
/// The pipeline's open vertex buffer is released first; the backend only
/// ever has one buffer allocated.
pub(crate) fn begin(
    render: &mut dyn VbufRender,
    pipeline: &mut Pipeline,
    prim: PrimitiveType,
) -> Result<VertexInfo, DrawError> {
    pipeline.flush(render, FlushFlags::BACKEND);
    if !render.set_primitive(prim) {
        error!(%prim, "backend rejected primitive for direct emission");
        return Err(DrawError::PrimitiveRejected(prim));
    }
    let vinfo = render.get_vertex_info();
    if vinfo.vertex_size() == 0 {
        return Err(DrawError::InvalidBackendCaps("hardware vertex layout is empty"));
    }
    Ok(vinfo)
}

/// Largest even batch whose hardware vertices fit one backend buffer.
pub(crate) fn max_vertices(render: &dyn VbufRender, vinfo: &VertexInfo) -> Result<usize, DrawError> {
    let max_bytes = render.max_vertex_buffer_bytes();
    let n = max_vertices_for(max_bytes, vinfo.vertex_size()).min(DRAW_PIPE_MAX_VERTICES);
    if n == 0 {
        error!(vertex_size = vinfo.vertex_size(), max_bytes, "hardware vertex exceeds the vertex buffer");
        return Err(DrawError::VertexTooLarge {
            vertex_size: vinfo.vertex_size(),
            max_bytes,
        });
    }
    Ok(n)
}

/// Allocate `count` hardware vertices, let `fill` write them, draw `list`
/// and release the buffer. If `fill` fails nothing is drawn.
pub(crate) fn write_batch(
    render: &mut dyn VbufRender,
    vinfo: &VertexInfo,
    prim: PrimitiveType,
    count: usize,
    list: DrawList<'_>,
    fill: impl FnOnce(&mut [u8]) -> Result<(), DrawError>,
) -> Result<(), DrawError> {
    if count == 0 {
        return Ok(());
    }
    if count > DRAW_PIPE_MAX_VERTICES {
        return Err(DrawError::BatchTooLarge { count });
    }
    let size = vinfo.vertex_size();
    if !render.allocate_vertices(size, count) {
        error!(vertex_size = size, count, "vertex allocation failed");
        return Err(DrawError::VertexAllocationFailed {
            vertex_size: size,
            count,
        });
    }

    let needed = size * count;
    let buf = render.map_vertices();
    let filled = if buf.len() < needed {
        Err(DrawError::MappedBufferTooSmall {
            needed,
            available: buf.len(),
        })
    } else {
        fill(&mut buf[..needed])
    };
    if let Err(err) = filled {
        render.release_vertices(size, 0);
        return Err(err);
    }

    match list {
        DrawList::Elts(elts) => {
            let per_prim = prim.vertices_per_prim();
            let step = (render.max_indices() / per_prim).max(1) * per_prim;
            let indices: Vec<u16> = elts.iter().map(|e| e.index).collect();
            for chunk in indices.chunks(step) {
                render.draw(chunk);
            }
        }
        DrawList::Indices(indices) => render.draw(indices),
        DrawList::Linear(n) => render.draw_arrays(0, n as u32),
    }
    trace!(%prim, count, "direct emit batch");
    render.release_vertices(size, count);
    Ok(())
}

/// Emit every vertex of `verts` in the backend's layout and draw `list`.
pub(crate) fn emit_store(
    cx: &mut PtContext<'_>,
    prim: PrimitiveType,
    verts: &VertexStore,
    list: DrawList<'_>,
) -> Result<(), DrawError> {
    let vinfo = begin(&mut *cx.render, &mut *cx.pipeline, prim)?;
    vinfo.check_sources(verts.slots())?;
    let count = verts.batch_len();
    let size = vinfo.vertex_size();
    let point_size = cx.config.rasterizer.point_size;
    write_batch(&mut *cx.render, &vinfo, prim, count, list, |buf| {
        for (v, dst) in buf.chunks_exact_mut(size).enumerate() {
            emit_hw_vertex(&vinfo, verts.header(v), verts.data(v), point_size, dst);
        }
        Ok(())
    })?;
    cx.stats.vertices_emitted += count as u64;
    cx.stats.emit_batches += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{RecordingRender, RenderCall};
    use crate::prim::DrawElt;
    use crate::vertex::EmitFormat;

    #[test]
    fn indexed_batch_is_split_at_primitive_boundaries() {
        let vinfo = VertexInfo::new().attr(0, EmitFormat::Float1);
        let mut render = RecordingRender::new(vinfo.clone()).with_max_indices(4);
        let log = render.log_handle();
        let elts: Vec<_> = [0u16, 1, 2, 2, 1, 3].into_iter().map(DrawElt::new).collect();

        write_batch(
            &mut render,
            &vinfo,
            PrimitiveType::Triangles,
            4,
            DrawList::Elts(&elts),
            |buf| {
                buf.fill(0);
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(log.borrow().draws(), vec![vec![0, 1, 2], vec![2, 1, 3]]);
        assert_eq!(
            log.borrow().calls.last(),
            Some(&RenderCall::Release {
                vertex_size: 4,
                used: 4
            })
        );
    }

    #[test]
    fn failed_fill_draws_nothing() {
        let vinfo = VertexInfo::new().attr(0, EmitFormat::Float4);
        let mut render = RecordingRender::new(vinfo.clone());
        let log = render.log_handle();

        let err = write_batch(
            &mut render,
            &vinfo,
            PrimitiveType::Points,
            2,
            DrawList::Linear(2),
            |_| Err(DrawError::MissingVertexElement(3)),
        )
        .unwrap_err();

        assert_eq!(err, DrawError::MissingVertexElement(3));
        assert!(log.borrow().draws().is_empty());
        assert!(!log
            .borrow()
            .calls
            .iter()
            .any(|c| matches!(c, RenderCall::DrawArrays { .. })));
        assert_eq!(
            log.borrow().calls.last(),
            Some(&RenderCall::Release {
                vertex_size: 16,
                used: 0
            })
        );
    }

    #[test]
    fn max_vertices_respects_buffer_and_is_even() {
        let vinfo = VertexInfo::new().attr(0, EmitFormat::Float3);
        let render = RecordingRender::new(vinfo.clone()).with_max_vertex_buffer_bytes(12 * 7);
        assert_eq!(max_vertices(&render, &vinfo).unwrap(), 6);

        let tiny = RecordingRender::new(vinfo.clone()).with_max_vertex_buffer_bytes(8);
        assert!(matches!(
            max_vertices(&tiny, &vinfo),
            Err(DrawError::VertexTooLarge { .. })
        ));
    }
}
