//! Terminal stage: batches hardware vertices and indices for the backend.

use tracing::{error, trace};

use crate::backend::{max_vertices_for, VbufRender};
use crate::error::DrawError;
use crate::prim::PrimitiveType;
use crate::stats::VbufStats;
use crate::vertex::{emit_hw_vertex, VertexInfo, VertexStore};

use super::{FlushFlags, PrimHeader};

pub(crate) struct VbufStage {
    /// Hardware primitive of the open index batch; `None` until the next
    /// primitive re-selects it.
    prim: Option<PrimitiveType>,
    vinfo: Option<VertexInfo>,
    vertex_size: usize,
    max_vertices: usize,
    nr_vertices: usize,
    allocated: bool,
    indices: Vec<u16>,
    max_indices: usize,
    point_size: f32,
    stats: VbufStats,
}

impl VbufStage {
    pub(crate) fn new() -> Self {
        Self {
            prim: None,
            vinfo: None,
            vertex_size: 0,
            max_vertices: 0,
            nr_vertices: 0,
            allocated: false,
            indices: Vec::new(),
            max_indices: 0,
            point_size: 1.0,
            stats: VbufStats::default(),
        }
    }

    pub(crate) fn configure(&mut self, max_indices: usize, point_size: f32) {
        self.max_indices = max_indices;
        self.point_size = point_size;
        if self.indices.capacity() < max_indices {
            self.indices.reserve(max_indices - self.indices.len());
        }
    }

    pub(crate) fn stats(&self) -> VbufStats {
        self.stats
    }

    pub(crate) fn point(
        &mut self,
        prim: &PrimHeader,
        verts: &mut VertexStore,
        render: &mut dyn VbufRender,
    ) -> Result<(), DrawError> {
        self.emit_prim(PrimitiveType::Points, &prim.v[..1], verts, render)
    }

    pub(crate) fn line(
        &mut self,
        prim: &PrimHeader,
        verts: &mut VertexStore,
        render: &mut dyn VbufRender,
    ) -> Result<(), DrawError> {
        self.emit_prim(PrimitiveType::Lines, &prim.v[..2], verts, render)
    }

    pub(crate) fn tri(
        &mut self,
        prim: &PrimHeader,
        verts: &mut VertexStore,
        render: &mut dyn VbufRender,
    ) -> Result<(), DrawError> {
        self.emit_prim(PrimitiveType::Triangles, &prim.v[..3], verts, render)
    }

    fn emit_prim(
        &mut self,
        kind: PrimitiveType,
        vs: &[usize],
        verts: &mut VertexStore,
        render: &mut dyn VbufRender,
    ) -> Result<(), DrawError> {
        if self.prim != Some(kind) {
            self.set_prim(kind, verts, render)?;
        }
        self.check_space(kind, vs.len(), verts, render)?;
        for &v in vs {
            let id = self.emit_vertex(v, verts, render)?;
            self.indices.push(id);
        }
        Ok(())
    }

    fn set_prim(
        &mut self,
        prim: PrimitiveType,
        verts: &mut VertexStore,
        render: &mut dyn VbufRender,
    ) -> Result<(), DrawError> {
        self.flush_indices(render);

        if !render.set_primitive(prim) {
            error!(%prim, "backend rejected a base primitive");
            return Err(DrawError::PrimitiveRejected(prim));
        }

        // The layout may depend on the primitive, so query it after selecting.
        let vinfo = render.get_vertex_info();
        vinfo.check_sources(verts.slots())?;
        if self.vinfo.as_ref() != Some(&vinfo) {
            self.flush_vertices(Some(verts), render);
            self.vertex_size = vinfo.vertex_size();
            self.vinfo = Some(vinfo);
        }
        if !self.allocated {
            self.alloc_vertices(render)?;
        }

        trace!(%prim, vertex_size = self.vertex_size, "vbuf primitive selected");
        self.prim = Some(prim);
        Ok(())
    }

    fn check_space(
        &mut self,
        prim: PrimitiveType,
        n: usize,
        verts: &mut VertexStore,
        render: &mut dyn VbufRender,
    ) -> Result<(), DrawError> {
        if !self.allocated || self.nr_vertices + n > self.max_vertices {
            self.flush_vertices(Some(verts), render);
            self.alloc_vertices(render)?;
            if n > self.max_vertices {
                error!(%prim, max_vertices = self.max_vertices, "vertex buffer cannot hold one primitive");
                return Err(DrawError::BatchTooSmall {
                    prim,
                    max_vertices: self.max_vertices,
                });
            }
        }
        if self.indices.len() + n > self.max_indices {
            self.flush_indices(render);
        }
        Ok(())
    }

    fn alloc_vertices(&mut self, render: &mut dyn VbufRender) -> Result<(), DrawError> {
        if self.vertex_size == 0 {
            error!("backend declared an empty hardware vertex");
            return Err(DrawError::InvalidBackendCaps("hardware vertex layout is empty"));
        }
        let max_bytes = render.max_vertex_buffer_bytes();
        self.max_vertices = max_vertices_for(max_bytes, self.vertex_size);
        if self.max_vertices == 0 {
            error!(vertex_size = self.vertex_size, max_bytes, "hardware vertex exceeds the vertex buffer");
            return Err(DrawError::VertexTooLarge {
                vertex_size: self.vertex_size,
                max_bytes,
            });
        }
        if !render.allocate_vertices(self.vertex_size, self.max_vertices) {
            error!(vertex_size = self.vertex_size, count = self.max_vertices, "vertex allocation failed");
            return Err(DrawError::VertexAllocationFailed {
                vertex_size: self.vertex_size,
                count: self.max_vertices,
            });
        }
        self.allocated = true;
        self.nr_vertices = 0;
        Ok(())
    }

    fn emit_vertex(
        &mut self,
        v: usize,
        verts: &mut VertexStore,
        render: &mut dyn VbufRender,
    ) -> Result<u16, DrawError> {
        match verts.header(v).vertex_id {
            Some(id) if usize::from(id) < self.nr_vertices => return Ok(id),
            Some(id) => {
                error!(
                    vertex = v,
                    vertex_id = id,
                    nr_vertices = self.nr_vertices,
                    "stale vertex id; vertex ids were not reset after a flush"
                );
                return Err(DrawError::StaleVertexId {
                    vertex: v,
                    vertex_id: id,
                    nr_vertices: self.nr_vertices,
                });
            }
            None => {}
        }

        let Some(vinfo) = self.vinfo.as_ref() else {
            return Err(DrawError::InvalidBackendCaps("no hardware vertex layout selected"));
        };
        let size = self.vertex_size;
        let start = self.nr_vertices * size;
        let buf = render.map_vertices();
        if buf.len() < start + size {
            return Err(DrawError::MappedBufferTooSmall {
                needed: start + size,
                available: buf.len(),
            });
        }
        let id = self.nr_vertices as u16;
        verts.header_mut(v).vertex_id = Some(id);
        emit_hw_vertex(
            vinfo,
            verts.header(v),
            verts.data(v),
            self.point_size,
            &mut buf[start..start + size],
        );
        self.nr_vertices += 1;
        self.stats.vertices_emitted += 1;
        Ok(id)
    }

    fn flush_indices(&mut self, render: &mut dyn VbufRender) {
        if self.indices.is_empty() {
            return;
        }
        trace!(count = self.indices.len(), "vbuf index flush");
        render.draw(&self.indices);
        self.indices.clear();
        self.stats.index_flushes += 1;
    }

    /// Submit pending indices and release the vertex buffer. Every vertex id
    /// in `verts` becomes meaningless and is reset.
    fn flush_vertices(&mut self, verts: Option<&mut VertexStore>, render: &mut dyn VbufRender) {
        if self.allocated {
            self.flush_indices(render);
            trace!(used = self.nr_vertices, "vbuf vertex flush");
            render.release_vertices(self.vertex_size, self.nr_vertices);
            self.allocated = false;
            self.nr_vertices = 0;
            self.stats.vertex_flushes += 1;
        }
        if let Some(verts) = verts {
            verts.reset_vertex_ids();
        }
    }

    pub(crate) fn flush(&mut self, render: &mut dyn VbufRender, flags: FlushFlags) {
        self.flush_indices(render);
        if flags.contains(FlushFlags::BACKEND) {
            self.flush_vertices(None, render);
            self.vinfo = None;
        }
        self.prim = None;
    }
}
