use crate::error::DrawError;

use super::format::float_to_ubyte;
use super::VertexHeader;

/// How one attribute is written into a hardware vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EmitFormat {
    /// Attribute is not emitted.
    Omit,
    Float1,
    Float2,
    Float3,
    Float4,
    /// Four components packed as bytes in B, G, R, A order.
    Unorm8x4,
    /// The packed vertex header word (see [`VertexHeader::pack`]).
    Header,
    /// The rasterizer point size as one float; the source attribute is ignored.
    PointSize,
}

impl EmitFormat {
    /// Hardware size in 4-byte words.
    pub fn words(self) -> u32 {
        match self {
            EmitFormat::Omit => 0,
            EmitFormat::Float1 => 1,
            EmitFormat::Float2 => 2,
            EmitFormat::Float3 => 3,
            EmitFormat::Float4 => 4,
            EmitFormat::Unorm8x4 | EmitFormat::Header | EmitFormat::PointSize => 1,
        }
    }

    /// Whether the format reads the attribute's source slot.
    pub(crate) fn reads_source(self) -> bool {
        !matches!(
            self,
            EmitFormat::Omit | EmitFormat::Header | EmitFormat::PointSize
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttrib {
    /// Shader output slot (or vertex element, for unshaded draws) to read.
    pub src_index: usize,
    pub emit: EmitFormat,
}

/// Hardware vertex layout declared by the backend.
///
/// The word size always equals the sum of the attributes' emitted sizes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexInfo {
    attribs: Vec<VertexAttrib>,
    size: u32,
}

impl VertexInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute and account for its size.
    pub fn attr(mut self, src_index: usize, emit: EmitFormat) -> Self {
        self.attribs.push(VertexAttrib { src_index, emit });
        self.size += emit.words();
        self
    }

    /// Build from attributes plus a separately declared size, rejecting a
    /// declaration that disagrees with the attributes.
    pub fn from_parts(attribs: Vec<VertexAttrib>, declared_size: u32) -> Result<Self, DrawError> {
        let computed = attribs.iter().map(|a| a.emit.words()).sum();
        if computed != declared_size {
            return Err(DrawError::VertexInfoSizeMismatch {
                declared: declared_size,
                computed,
            });
        }
        Ok(Self {
            attribs,
            size: declared_size,
        })
    }

    pub fn attribs(&self) -> &[VertexAttrib] {
        &self.attribs
    }

    /// Size in 4-byte words.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Size in bytes.
    pub fn vertex_size(&self) -> usize {
        self.size as usize * 4
    }

    /// Check every read attribute against the number of available slots.
    pub(crate) fn check_sources(&self, slots: usize) -> Result<(), DrawError> {
        for a in &self.attribs {
            if a.emit.reads_source() && a.src_index >= slots {
                return Err(DrawError::AttributeOutOfRange {
                    src_index: a.src_index,
                    slots,
                });
            }
        }
        Ok(())
    }
}

/// Write one hardware vertex. `dst` is exactly `info.vertex_size()` bytes and
/// `data` has been checked with [`VertexInfo::check_sources`].
pub(crate) fn emit_hw_vertex(
    info: &VertexInfo,
    header: &VertexHeader,
    data: &[[f32; 4]],
    point_size: f32,
    dst: &mut [u8],
) {
    let mut off = 0;
    for a in &info.attribs {
        match a.emit {
            EmitFormat::Omit => {}
            EmitFormat::Float1 | EmitFormat::Float2 | EmitFormat::Float3 | EmitFormat::Float4 => {
                let n = a.emit.words() as usize;
                let v = &data[a.src_index];
                for c in 0..n {
                    dst[off + c * 4..off + c * 4 + 4].copy_from_slice(&v[c].to_le_bytes());
                }
            }
            EmitFormat::Unorm8x4 => {
                let v = &data[a.src_index];
                dst[off] = float_to_ubyte(v[2]);
                dst[off + 1] = float_to_ubyte(v[1]);
                dst[off + 2] = float_to_ubyte(v[0]);
                dst[off + 3] = float_to_ubyte(v[3]);
            }
            EmitFormat::Header => {
                dst[off..off + 4].copy_from_slice(&header.pack().to_le_bytes());
            }
            EmitFormat::PointSize => {
                dst[off..off + 4].copy_from_slice(&point_size.to_le_bytes());
            }
        }
        off += a.emit.words() as usize * 4;
    }
}
