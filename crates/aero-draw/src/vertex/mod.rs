//! Vertex records flowing through the shaded and pipeline paths.

mod format;
mod info;

use bitflags::bitflags;

pub use format::{OutputFormat, VertexFormat};
pub(crate) use format::{EmitFn, FetchFn};
pub use info::{EmitFormat, VertexAttrib, VertexInfo};
pub(crate) use info::emit_hw_vertex;

/// Sentinel written into hardware headers for a vertex without an id, and the
/// exclusive upper bound on backend index counts.
pub const UNDEFINED_VERTEX_ID: u16 = 0xffff;

bitflags! {
    /// Clip planes a vertex lies outside of. Bit `i` corresponds to plane `i`
    /// of the draw's plane list (canonical planes first).
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ClipMask: u16 {
        /// `-x + w < 0`
        const RIGHT = 1 << 0;
        /// `x + w < 0`
        const LEFT = 1 << 1;
        /// `-y + w < 0`
        const TOP = 1 << 2;
        /// `y + w < 0`
        const BOTTOM = 1 << 3;
        /// `z + w < 0` (GL) or `z < 0` (D3D)
        const NEAR = 1 << 4;
        /// `-z + w < 0`
        const FAR = 1 << 5;
        const USER0 = 1 << 6;
        const USER1 = 1 << 7;
        const USER2 = 1 << 8;
        const USER3 = 1 << 9;
        const USER4 = 1 << 10;
        const USER5 = 1 << 11;
    }
}

impl ClipMask {
    pub fn plane(index: usize) -> ClipMask {
        ClipMask::from_bits_retain(1 << index)
    }

    /// Indices of the set planes, lowest first.
    pub fn planes(self) -> impl Iterator<Item = usize> {
        let bits = self.bits();
        (0..16).filter(move |i| bits & (1 << i) != 0)
    }
}

/// Per-vertex metadata.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexHeader {
    /// Slot in the currently open hardware vertex buffer, if emitted there.
    pub vertex_id: Option<u16>,
    pub clipmask: ClipMask,
    pub edgeflag: bool,
    /// Clip-space position, valid once clip testing has run.
    pub clip: [f32; 4],
}

impl Default for VertexHeader {
    fn default() -> Self {
        Self {
            vertex_id: None,
            clipmask: ClipMask::empty(),
            edgeflag: true,
            clip: [0.0; 4],
        }
    }
}

impl VertexHeader {
    /// Hardware header word: clipmask in bits 0..12, edge flag in bit 12,
    /// vertex id in the upper half.
    pub fn pack(&self) -> u32 {
        let id = self.vertex_id.unwrap_or(UNDEFINED_VERTEX_ID);
        u32::from(self.clipmask.bits() & 0xfff) | (u32::from(self.edgeflag) << 12) | (u32::from(id) << 16)
    }
}

/// Batch-scoped vertex storage: one header plus `slots` float4 attributes per
/// vertex.
///
/// Vertices past the batch length are temporaries created by pipeline stages
/// (clipped intersections, stipple segment ends) and are dropped with
/// [`VertexStore::truncate_temps`].
#[derive(Clone, Debug)]
pub struct VertexStore {
    slots: usize,
    headers: Vec<VertexHeader>,
    data: Vec<[f32; 4]>,
    batch_len: usize,
}

impl VertexStore {
    pub fn new(slots: usize, count: usize) -> Self {
        Self {
            slots,
            headers: vec![VertexHeader::default(); count],
            data: vec![[0.0; 4]; slots * count],
            batch_len: count,
        }
    }

    /// Build a store from per-vertex attribute rows.
    pub fn from_rows(slots: usize, rows: &[Vec<[f32; 4]>]) -> Self {
        let mut store = Self::new(slots, rows.len());
        for (v, row) in rows.iter().enumerate() {
            let n = row.len().min(slots);
            store.data_mut(v)[..n].copy_from_slice(&row[..n]);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Vertices written by fetch/shade, excluding temporaries.
    pub fn batch_len(&self) -> usize {
        self.batch_len
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn header(&self, v: usize) -> &VertexHeader {
        &self.headers[v]
    }

    pub fn header_mut(&mut self, v: usize) -> &mut VertexHeader {
        &mut self.headers[v]
    }

    pub fn headers(&self) -> &[VertexHeader] {
        &self.headers
    }

    pub fn data(&self, v: usize) -> &[[f32; 4]] {
        &self.data[v * self.slots..(v + 1) * self.slots]
    }

    pub fn data_mut(&mut self, v: usize) -> &mut [[f32; 4]] {
        &mut self.data[v * self.slots..(v + 1) * self.slots]
    }

    pub fn attrib(&self, v: usize, slot: usize) -> [f32; 4] {
        self.data[v * self.slots + slot]
    }

    pub(crate) fn all_data(&self) -> &[[f32; 4]] {
        &self.data
    }

    pub(crate) fn all_data_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.data
    }

    /// Attribute data as raw bytes, for translate programs writing float4 slots.
    pub(crate) fn data_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.data)
    }

    /// Forget every hardware vertex id. Must run whenever the hardware buffer
    /// these ids point into has been released.
    pub fn reset_vertex_ids(&mut self) {
        for h in &mut self.headers {
            h.vertex_id = None;
        }
    }

    /// Append a temporary vertex `a + t * (b - a)`, interpolating the clip
    /// position and every attribute slot. Returns its index.
    pub(crate) fn interpolate(&mut self, t: f32, a: usize, b: usize) -> usize {
        let ca = self.headers[a].clip;
        let cb = self.headers[b].clip;
        let mut clip = [0.0; 4];
        for c in 0..4 {
            clip[c] = ca[c] + t * (cb[c] - ca[c]);
        }
        self.headers.push(VertexHeader {
            clip,
            ..VertexHeader::default()
        });

        let slots = self.slots;
        for s in 0..slots {
            let va = self.data[a * slots + s];
            let vb = self.data[b * slots + s];
            let mut out = [0.0; 4];
            for c in 0..4 {
                out[c] = va[c] + t * (vb[c] - va[c]);
            }
            self.data.push(out);
        }
        self.headers.len() - 1
    }

    pub(crate) fn truncate_temps(&mut self) {
        self.headers.truncate(self.batch_len);
        self.data.truncate(self.batch_len * self.slots);
    }
}
