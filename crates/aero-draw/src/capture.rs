//! A recording [`VbufRender`] for tests and tooling.
//!
//! [`RecordingRender`] keeps every backend call in a shared [`RenderLog`] and
//! resolves each draw into the primitives it rasterizes, with the hardware
//! bytes of every vertex, so different draw paths can be compared by output.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::VbufRender;
use crate::prim::PrimitiveType;
use crate::vertex::VertexInfo;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderCall {
    SetPrimitive(PrimitiveType),
    Allocate { vertex_size: usize, count: usize },
    Draw(Vec<u16>),
    DrawArrays { start: u32, count: u32 },
    Release { vertex_size: usize, used: usize },
}

/// One rasterized point, line or triangle: the bytes of each of its vertices.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DrawnPrim {
    pub vertices: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Default)]
pub struct RenderLog {
    pub calls: Vec<RenderCall>,
    pub primitives: Vec<DrawnPrim>,
    /// Contents of each released vertex buffer, truncated to the used vertices.
    pub released: Vec<Vec<u8>>,
}

impl RenderLog {
    pub fn allocations(&self) -> Vec<(usize, usize)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RenderCall::Allocate { vertex_size, count } => Some((*vertex_size, *count)),
                _ => None,
            })
            .collect()
    }

    pub fn draws(&self) -> Vec<Vec<u16>> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RenderCall::Draw(indices) => Some(indices.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn primitive_types(&self) -> Vec<PrimitiveType> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RenderCall::SetPrimitive(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    /// Total index entries submitted through `draw`.
    pub fn index_count(&self) -> usize {
        self.draws().iter().map(Vec::len).sum()
    }
}

pub struct RecordingRender {
    log: Rc<RefCell<RenderLog>>,
    vinfo: VertexInfo,
    vinfo_by_prim: HashMap<PrimitiveType, VertexInfo>,
    max_indices: usize,
    max_vertex_buffer_bytes: usize,
    rejected: Vec<PrimitiveType>,
    fail_allocations: bool,
    prim: Option<PrimitiveType>,
    vertex_size: usize,
    buffer: Vec<u8>,
}

impl RecordingRender {
    pub fn new(vinfo: VertexInfo) -> Self {
        Self {
            log: Rc::new(RefCell::new(RenderLog::default())),
            vinfo,
            vinfo_by_prim: HashMap::new(),
            max_indices: 4096,
            max_vertex_buffer_bytes: 16 * 1024,
            rejected: Vec::new(),
            fail_allocations: false,
            prim: None,
            vertex_size: 0,
            buffer: Vec::new(),
        }
    }

    pub fn with_max_indices(mut self, max_indices: usize) -> Self {
        self.max_indices = max_indices;
        self
    }

    pub fn with_max_vertex_buffer_bytes(mut self, bytes: usize) -> Self {
        self.max_vertex_buffer_bytes = bytes;
        self
    }

    /// Use a different vertex layout while `prim` is the active primitive.
    pub fn with_vertex_info_for(mut self, prim: PrimitiveType, vinfo: VertexInfo) -> Self {
        self.vinfo_by_prim.insert(prim, vinfo);
        self
    }

    pub fn rejecting(mut self, prim: PrimitiveType) -> Self {
        self.rejected.push(prim);
        self
    }

    pub fn failing_allocations(mut self) -> Self {
        self.fail_allocations = true;
        self
    }

    /// Shared handle to the log; stays valid after the render is boxed.
    pub fn log_handle(&self) -> Rc<RefCell<RenderLog>> {
        Rc::clone(&self.log)
    }

    pub fn log(&self) -> Ref<'_, RenderLog> {
        self.log.borrow()
    }

    fn vertex(&self, index: usize) -> Vec<u8> {
        let start = index * self.vertex_size;
        self.buffer
            .get(start..start + self.vertex_size)
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    fn resolve(&self, indices: &[usize]) -> Vec<DrawnPrim> {
        let Some(prim) = self.prim else {
            return Vec::new();
        };
        let n = indices.len();
        let mut out = Vec::new();
        let mut push = |corners: &[usize]| {
            out.push(DrawnPrim {
                vertices: corners.iter().map(|&i| self.vertex(indices[i])).collect(),
            });
        };
        match prim {
            PrimitiveType::Points => (0..n).for_each(|i| push(&[i])),
            PrimitiveType::Lines => (0..n / 2).for_each(|i| push(&[2 * i, 2 * i + 1])),
            PrimitiveType::LineStrip => (1..n).for_each(|i| push(&[i - 1, i])),
            PrimitiveType::LineLoop => {
                (1..n).for_each(|i| push(&[i - 1, i]));
                if n >= 2 {
                    push(&[n - 1, 0]);
                }
            }
            PrimitiveType::Triangles => {
                (0..n / 3).for_each(|i| push(&[3 * i, 3 * i + 1, 3 * i + 2]))
            }
            PrimitiveType::TriangleStrip => {
                for i in 0..n.saturating_sub(2) {
                    if i & 1 == 0 {
                        push(&[i, i + 1, i + 2]);
                    } else {
                        push(&[i + 1, i, i + 2]);
                    }
                }
            }
            PrimitiveType::TriangleFan | PrimitiveType::Polygon => {
                (0..n.saturating_sub(2)).for_each(|i| push(&[0, i + 1, i + 2]))
            }
            PrimitiveType::Quads | PrimitiveType::QuadStrip => {}
        }
        out
    }
}

impl VbufRender for RecordingRender {
    fn max_indices(&self) -> usize {
        self.max_indices
    }

    fn max_vertex_buffer_bytes(&self) -> usize {
        self.max_vertex_buffer_bytes
    }

    fn get_vertex_info(&mut self) -> VertexInfo {
        self.prim
            .and_then(|p| self.vinfo_by_prim.get(&p))
            .unwrap_or(&self.vinfo)
            .clone()
    }

    fn set_primitive(&mut self, prim: PrimitiveType) -> bool {
        if self.rejected.contains(&prim) {
            return false;
        }
        self.prim = Some(prim);
        self.log.borrow_mut().calls.push(RenderCall::SetPrimitive(prim));
        true
    }

    fn allocate_vertices(&mut self, vertex_size: usize, count: usize) -> bool {
        if self.fail_allocations {
            return false;
        }
        self.vertex_size = vertex_size;
        self.buffer = vec![0; vertex_size * count];
        self.log
            .borrow_mut()
            .calls
            .push(RenderCall::Allocate { vertex_size, count });
        true
    }

    fn map_vertices(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    fn draw(&mut self, indices: &[u16]) {
        let idx: Vec<usize> = indices.iter().map(|&i| usize::from(i)).collect();
        let prims = self.resolve(&idx);
        let mut log = self.log.borrow_mut();
        log.calls.push(RenderCall::Draw(indices.to_vec()));
        log.primitives.extend(prims);
    }

    fn draw_arrays(&mut self, start: u32, count: u32) {
        let idx: Vec<usize> = (start..start + count).map(|i| i as usize).collect();
        let prims = self.resolve(&idx);
        let mut log = self.log.borrow_mut();
        log.calls.push(RenderCall::DrawArrays { start, count });
        log.primitives.extend(prims);
    }

    fn release_vertices(&mut self, vertex_size: usize, vertices_used: usize) {
        let used = (vertex_size * vertices_used).min(self.buffer.len());
        let contents = self.buffer[..used].to_vec();
        self.buffer.clear();
        let mut log = self.log.borrow_mut();
        log.calls.push(RenderCall::Release {
            vertex_size,
            used: vertices_used,
        });
        log.released.push(contents);
    }
}
