use crate::prim::PrimitiveType;
use crate::vertex::{VertexInfo, UNDEFINED_VERTEX_ID};

/// Driver-supplied consumer of hardware vertex and index buffers.
///
/// A backend owns at most one vertex buffer at a time. The draw module
/// allocates it, writes vertices through [`VbufRender::map_vertices`], issues
/// any number of [`VbufRender::draw`] / [`VbufRender::draw_arrays`] calls
/// against it and finally hands it back with
/// [`VbufRender::release_vertices`].
pub trait VbufRender {
    /// Largest index batch accepted by [`VbufRender::draw`]. Must be below
    /// [`UNDEFINED_VERTEX_ID`].
    fn max_indices(&self) -> usize;

    /// Capacity of one vertex buffer in bytes.
    fn max_vertex_buffer_bytes(&self) -> usize;

    /// Hardware vertex layout for the current primitive and state.
    fn get_vertex_info(&mut self) -> VertexInfo;

    /// Select the hardware primitive. Points, lines and triangles must be
    /// accepted; other kinds are optional.
    fn set_primitive(&mut self, prim: PrimitiveType) -> bool;

    /// Allocate a buffer for `count` vertices of `vertex_size` bytes.
    /// Returns false if no buffer could be allocated.
    fn allocate_vertices(&mut self, vertex_size: usize, count: usize) -> bool;

    /// The currently allocated vertex buffer.
    fn map_vertices(&mut self) -> &mut [u8];

    fn draw(&mut self, indices: &[u16]);

    fn draw_arrays(&mut self, start: u32, count: u32);

    /// Return the buffer; only the first `vertices_used` vertices were written.
    fn release_vertices(&mut self, vertex_size: usize, vertices_used: usize);
}

/// Vertices of `vertex_size` bytes fitting in `bytes`, rounded down to an even
/// count and kept below the vertex id sentinel.
pub fn max_vertices_for(bytes: usize, vertex_size: usize) -> usize {
    if vertex_size == 0 {
        return 0;
    }
    let n = (bytes / vertex_size).min(UNDEFINED_VERTEX_ID as usize - 1);
    n & !1
}
