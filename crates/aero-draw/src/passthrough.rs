//! Fast path for non-indexed draws that need neither shading, clipping nor
//! the primitive pipeline: vertices are fetched straight into hardware
//! buffers and drawn with the backend's own topology where it has one.

use tracing::{debug, warn};

use crate::backend::max_vertices_for;
use crate::config::{DrawCallConfig, DrawOptions};
use crate::error::DrawError;
use crate::pipeline::FlushFlags;
use crate::prim::{linear_index, Elts, PrimitiveType};
use crate::pt::emit::write_batch;
use crate::pt::{DrawList, PtContext};
use crate::translate::{TranslateKey, VertexBufferView};

/// Whether a draw may take the fast path at all.
pub(crate) fn eligible(
    options: &DrawOptions,
    config: &DrawCallConfig,
    prim: PrimitiveType,
    elts: &Elts<'_>,
) -> bool {
    options.passthrough
        && config.bypass_vs
        && config.bypass_clipping
        && !config.need_pipeline(prim)
        && elts.is_linear()
}

/// Topology the backend is asked to draw for `prim`.
fn hw_prim(prim: PrimitiveType) -> PrimitiveType {
    match prim {
        PrimitiveType::LineLoop => PrimitiveType::LineStrip,
        PrimitiveType::Quads | PrimitiveType::QuadStrip => PrimitiveType::Triangles,
        PrimitiveType::Polygon => PrimitiveType::TriangleFan,
        other => other,
    }
}

/// Hardware indices for a chunk of `n` vertices, for the topologies the
/// backend cannot draw directly.
fn synthesize_indices(prim: PrimitiveType, n: usize) -> Option<Vec<u16>> {
    let idx = |i: usize| i as u16;
    match prim {
        PrimitiveType::LineLoop => {
            let mut out: Vec<u16> = (0..n).map(idx).collect();
            out.push(0);
            Some(out)
        }
        PrimitiveType::Quads => Some(
            (0..n / 4)
                .flat_map(|q| {
                    let i = 4 * q;
                    [i, i + 1, i + 3, i + 1, i + 2, i + 3]
                })
                .map(idx)
                .collect(),
        ),
        PrimitiveType::QuadStrip => Some(
            (0..n.saturating_sub(2) / 2)
                .flat_map(|q| {
                    let i = 2 * q;
                    [i, i + 1, i + 3, i + 2, i, i + 3]
                })
                .map(idx)
                .collect(),
        ),
        _ => None,
    }
}

/// Vertices per chunk, honouring the configured limit, the backend's
/// buffer and index capacities and the topology's stepping rule.
fn chunk_size(prim: PrimitiveType, limit: usize, backend_max: usize, max_indices: usize) -> usize {
    let chunk = limit.min(backend_max) & !1;
    let chunk = match prim {
        PrimitiveType::LineLoop => chunk.min(max_indices.saturating_sub(1)),
        PrimitiveType::Quads => chunk.min(max_indices / 6 * 4),
        PrimitiveType::QuadStrip => chunk.min(max_indices / 6 * 2 + 2),
        _ => chunk,
    };
    prim.trim(chunk)
}

/// Draw `count` (already trimmed) vertices of `prim` starting at the linear
/// `elts`. Returns `Ok(false)` when the draw must take the general path
/// instead; nothing has been drawn in that case.
pub(crate) fn draw(
    cx: &mut PtContext<'_>,
    options: &DrawOptions,
    prim: PrimitiveType,
    elts: Elts<'_>,
    count: usize,
) -> Result<bool, DrawError> {
    let Elts::Linear { start } = elts else {
        return Ok(false);
    };

    cx.pipeline.flush(&mut *cx.render, FlushFlags::BACKEND);
    let hw = hw_prim(prim);
    if !cx.render.set_primitive(hw) {
        warn!(%prim, hw_prim = %hw, "backend rejected passthrough primitive; using the general path");
        return Ok(false);
    }

    let vinfo = cx.render.get_vertex_info();
    let vertex_size = vinfo.vertex_size();
    let max_bytes = cx.render.max_vertex_buffer_bytes();
    let backend_max = max_vertices_for(max_bytes, vertex_size);
    if backend_max == 0 {
        return Err(DrawError::VertexTooLarge {
            vertex_size,
            max_bytes,
        });
    }

    let (first, incr) = prim.split_prim();
    let chunk = chunk_size(
        prim,
        options.passthrough_max_vertices,
        backend_max,
        cx.render.max_indices(),
    );
    if chunk < first || (!prim.is_splittable() && count > chunk) {
        debug!(%prim, count, chunk, "passthrough declined: draw does not fit one chunk");
        return Ok(false);
    }

    let key = TranslateKey::for_hw_vertex(&vinfo, cx.elements, cx.buffers.len(), "passthrough")?;
    let translate = cx.cache.get(&key);
    let point_size = cx.config.rasterizer.point_size.to_le_bytes();
    let mut buffers: Vec<VertexBufferView<'_>> = cx.buffers.to_vec();
    buffers.push(VertexBufferView::new(&point_size, 0));

    let overlap = first - incr;
    let mut offset = 0;
    loop {
        let n = chunk.min(count - offset);
        let chunk_start = linear_index(start, offset)
            .ok_or(DrawError::VertexIndexOverflow { start, count })?;
        let indices = synthesize_indices(prim, n);
        let list = match &indices {
            Some(indices) => DrawList::Indices(indices),
            None => DrawList::Linear(n),
        };
        write_batch(&mut *cx.render, &vinfo, hw, n, list, |buf| {
            translate.run_linear(&buffers, chunk_start, n, buf)
        })?;
        cx.stats.vertices_fetched += n as u64;
        cx.stats.vertices_emitted += n as u64;

        if offset + n >= count {
            break;
        }
        offset += n - overlap;
    }

    cx.stats.passthrough_draws += 1;
    debug!(%prim, hw_prim = %hw, count, chunk, "passthrough draw");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_and_quads_get_explicit_indices() {
        assert_eq!(
            synthesize_indices(PrimitiveType::LineLoop, 5),
            Some(vec![0, 1, 2, 3, 4, 0])
        );
        assert_eq!(
            synthesize_indices(PrimitiveType::QuadStrip, 4),
            Some(vec![0, 1, 3, 2, 0, 3])
        );
        assert_eq!(
            synthesize_indices(PrimitiveType::Quads, 8),
            Some(vec![0, 1, 3, 1, 2, 3, 4, 5, 7, 5, 6, 7])
        );
        assert_eq!(synthesize_indices(PrimitiveType::TriangleStrip, 5), None);
    }

    #[test]
    fn chunks_keep_strip_parity_and_index_limits() {
        assert_eq!(chunk_size(PrimitiveType::TriangleStrip, 1023, 4096, 4096), 1022);
        assert_eq!(chunk_size(PrimitiveType::Triangles, 1024, 4096, 4096), 1023);
        assert_eq!(chunk_size(PrimitiveType::Quads, 1024, 4096, 60), 40);
        assert_eq!(chunk_size(PrimitiveType::QuadStrip, 1024, 4096, 60), 22);
        assert_eq!(chunk_size(PrimitiveType::LineLoop, 1024, 4096, 100), 99);
        assert_eq!(chunk_size(PrimitiveType::Points, 1024, 6, 4096), 6);
    }
}
