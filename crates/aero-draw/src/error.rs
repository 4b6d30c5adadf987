use thiserror::Error;

use crate::prim::PrimitiveType;
use crate::vertex::EmitFormat;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrawError {
    #[error("draw called without a vbuf backend")]
    NoBackend,
    #[error("draw requires vertex shading but no vertex shader is bound")]
    MissingVertexShader,
    #[error("backend rejected primitive type {0}")]
    PrimitiveRejected(PrimitiveType),
    #[error("backend failed to allocate {count} vertices of {vertex_size} bytes")]
    VertexAllocationFailed { vertex_size: usize, count: usize },
    #[error("hardware vertex of {vertex_size} bytes does not fit in a {max_bytes} byte vertex buffer")]
    VertexTooLarge { vertex_size: usize, max_bytes: usize },
    #[error("mapped vertex buffer too small (need {needed} bytes, have {available})")]
    MappedBufferTooSmall { needed: usize, available: usize },
    #[error("invalid backend capabilities: {0}")]
    InvalidBackendCaps(&'static str),
    #[error("vertex info declares size {declared} words but attributes emit {computed} words")]
    VertexInfoSizeMismatch { declared: u32, computed: u32 },
    #[error("vertex fetch out of bounds (element {element}, vertex {index}, buffer {buffer}: read end {read_end} > len {len})")]
    FetchOutOfBounds {
        element: usize,
        index: u32,
        buffer: usize,
        read_end: usize,
        len: usize,
    },
    #[error("vertex element {element} references unbound vertex buffer {buffer}")]
    UnboundVertexBuffer { element: usize, buffer: usize },
    #[error("index range {start}..{end} out of bounds for index buffer of {len} indices")]
    IndexOutOfBounds { start: usize, end: usize, len: usize },
    #[error("linear range of {count} vertices from {start} overflows the vertex index range")]
    VertexIndexOverflow { start: u32, count: usize },
    #[error("no vertex element bound for attribute {0}")]
    MissingVertexElement(usize),
    #[error("attribute {src_index} reads shader output slot outside the {slots} available")]
    AttributeOutOfRange { src_index: usize, slots: usize },
    #[error("shader output slot {slot} is outside the shader's {outputs} outputs")]
    ShaderOutputOutOfRange { slot: usize, outputs: usize },
    #[error("emit format {format:?} is not supported by the {path} path")]
    UnsupportedEmitFormat {
        format: EmitFormat,
        path: &'static str,
    },
    #[error("vertex {vertex} has stale vertex id {vertex_id} (only {nr_vertices} vertices in the open buffer)")]
    StaleVertexId {
        vertex: usize,
        vertex_id: u16,
        nr_vertices: usize,
    },
    #[error("{count} user clip planes requested, at most {max} supported")]
    TooManyClipPlanes { count: usize, max: usize },
    #[error("batch limit of {max_vertices} vertices cannot hold a single {prim} primitive")]
    BatchTooSmall {
        prim: PrimitiveType,
        max_vertices: usize,
    },
    #[error("batch of {count} vertices exceeds the addressable vertex id range")]
    BatchTooLarge { count: usize },
    #[error("{0} ran before prepare")]
    NotPrepared(&'static str),
}
