//! Cached vertex format conversion programs.
//!
//! A [`Translate`] gathers attributes from source vertex buffers and writes
//! them, converted, at fixed offsets of a destination vertex. Programs are
//! built from a structural [`TranslateKey`] and shared through a small LRU
//! cache, so draws with identical vertex layouts reuse the same program.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::{error, trace};

use crate::error::DrawError;
use crate::prim::linear_index;
use crate::vertex::{EmitFn, EmitFormat, FetchFn, OutputFormat, VertexFormat, VertexInfo};

/// Driver-described source attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub src_offset: usize,
    pub vertex_buffer_index: usize,
    pub src_format: VertexFormat,
}

impl VertexElement {
    pub fn new(vertex_buffer_index: usize, src_offset: usize, src_format: VertexFormat) -> Self {
        Self {
            src_offset,
            vertex_buffer_index,
            src_format,
        }
    }
}

/// Borrowed vertex buffer contents for one draw.
#[derive(Clone, Copy, Debug)]
pub struct VertexBufferView<'a> {
    pub data: &'a [u8],
    /// Bytes between consecutive vertices. Zero repeats the first vertex.
    pub stride: usize,
}

impl<'a> VertexBufferView<'a> {
    pub fn new(data: &'a [u8], stride: usize) -> Self {
        Self { data, stride }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TranslateElement {
    pub input_format: VertexFormat,
    pub input_buffer: usize,
    pub input_offset: usize,
    pub output_format: OutputFormat,
    pub output_offset: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TranslateKey {
    pub output_stride: usize,
    pub elements: Vec<TranslateElement>,
}

impl TranslateKey {
    /// Key that writes the hardware layout `info` straight from source vertex
    /// elements. `src_index` of each attribute selects the element.
    ///
    /// Point size attributes read a one-float constant buffer expected at
    /// `point_size_buffer` with a zero stride.
    pub fn for_hw_vertex(
        info: &VertexInfo,
        elements: &[VertexElement],
        point_size_buffer: usize,
        path: &'static str,
    ) -> Result<Self, DrawError> {
        let mut key = TranslateKey {
            output_stride: info.vertex_size(),
            elements: Vec::with_capacity(info.attribs().len()),
        };
        let mut offset = 0;
        for a in info.attribs() {
            let output_format = match a.emit {
                EmitFormat::Omit => continue,
                EmitFormat::Float1 | EmitFormat::PointSize => OutputFormat::Float32x1,
                EmitFormat::Float2 => OutputFormat::Float32x2,
                EmitFormat::Float3 => OutputFormat::Float32x3,
                EmitFormat::Float4 => OutputFormat::Float32x4,
                EmitFormat::Unorm8x4 => OutputFormat::Bgra8Unorm,
                EmitFormat::Header => {
                    return Err(DrawError::UnsupportedEmitFormat {
                        format: a.emit,
                        path,
                    })
                }
            };
            let element = if a.emit == EmitFormat::PointSize {
                TranslateElement {
                    input_format: VertexFormat::Float32x1,
                    input_buffer: point_size_buffer,
                    input_offset: 0,
                    output_format,
                    output_offset: offset,
                }
            } else {
                let src = elements
                    .get(a.src_index)
                    .ok_or(DrawError::MissingVertexElement(a.src_index))?;
                TranslateElement {
                    input_format: src.src_format,
                    input_buffer: src.vertex_buffer_index,
                    input_offset: src.src_offset,
                    output_format,
                    output_offset: offset,
                }
            };
            key.elements.push(element);
            offset += a.emit.words() as usize * 4;
        }
        Ok(key)
    }

    /// Key that writes `num_inputs` source elements as consecutive float4
    /// slots of a `stride_slots`-slot vertex.
    pub fn for_float4_slots(
        elements: &[VertexElement],
        num_inputs: usize,
        stride_slots: usize,
    ) -> Result<Self, DrawError> {
        let elements = (0..num_inputs)
            .map(|i| {
                let src = elements.get(i).ok_or(DrawError::MissingVertexElement(i))?;
                Ok(TranslateElement {
                    input_format: src.src_format,
                    input_buffer: src.vertex_buffer_index,
                    input_offset: src.src_offset,
                    output_format: OutputFormat::Float32x4,
                    output_offset: i * 16,
                })
            })
            .collect::<Result<Vec<_>, DrawError>>()?;
        Ok(TranslateKey {
            output_stride: stride_slots * 16,
            elements,
        })
    }
}

struct TranslateOp {
    fetch: FetchFn,
    emit: EmitFn,
    buffer: usize,
    offset: usize,
    in_size: usize,
    out_offset: usize,
    out_size: usize,
}

/// A conversion program built from a [`TranslateKey`].
pub struct Translate {
    key: TranslateKey,
    ops: Vec<TranslateOp>,
}

impl std::fmt::Debug for Translate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translate").field("key", &self.key).finish()
    }
}

impl Translate {
    pub fn new(key: TranslateKey) -> Self {
        let ops = key
            .elements
            .iter()
            .map(|e| TranslateOp {
                fetch: e.input_format.fetch_fn(),
                emit: e.output_format.emit_fn(),
                buffer: e.input_buffer,
                offset: e.input_offset,
                in_size: e.input_format.byte_size(),
                out_offset: e.output_offset,
                out_size: e.output_format.byte_size(),
            })
            .collect();
        Self { key, ops }
    }

    pub fn key(&self) -> &TranslateKey {
        &self.key
    }

    pub fn output_stride(&self) -> usize {
        self.key.output_stride
    }

    /// Convert the vertices named by `elts` into consecutive records of `dst`.
    pub fn run_elts(
        &self,
        buffers: &[VertexBufferView<'_>],
        elts: &[u32],
        dst: &mut [u8],
    ) -> Result<(), DrawError> {
        let stride = self.check_dst(elts.len(), dst)?;
        for (i, &elt) in elts.iter().enumerate() {
            self.run_one(buffers, elt, &mut dst[i * stride..(i + 1) * stride])?;
        }
        Ok(())
    }

    /// Same as [`Self::run_elts`] with `elts = start..start + count`.
    pub fn run_linear(
        &self,
        buffers: &[VertexBufferView<'_>],
        start: u32,
        count: usize,
        dst: &mut [u8],
    ) -> Result<(), DrawError> {
        let stride = self.check_dst(count, dst)?;
        for i in 0..count {
            let Some(elt) = linear_index(start, i) else {
                let (buffer, len) = self
                    .ops
                    .first()
                    .map(|op| (op.buffer, buffers.get(op.buffer).map_or(0, |b| b.data.len())))
                    .unwrap_or((0, 0));
                return Err(self.out_of_bounds(0, u32::MAX, buffer, usize::MAX, len));
            };
            self.run_one(buffers, elt, &mut dst[i * stride..(i + 1) * stride])?;
        }
        Ok(())
    }

    fn check_dst(&self, count: usize, dst: &[u8]) -> Result<usize, DrawError> {
        let stride = self.key.output_stride;
        let needed = count.saturating_mul(stride);
        if dst.len() < needed {
            return Err(DrawError::MappedBufferTooSmall {
                needed,
                available: dst.len(),
            });
        }
        Ok(stride)
    }

    fn run_one(
        &self,
        buffers: &[VertexBufferView<'_>],
        index: u32,
        out: &mut [u8],
    ) -> Result<(), DrawError> {
        for (element, op) in self.ops.iter().enumerate() {
            let Some(buf) = buffers.get(op.buffer) else {
                error!(element, buffer = op.buffer, "vertex element references an unbound vertex buffer");
                return Err(DrawError::UnboundVertexBuffer {
                    element,
                    buffer: op.buffer,
                });
            };
            let start = (index as usize)
                .checked_mul(buf.stride)
                .and_then(|v| v.checked_add(op.offset));
            let read_end = start.and_then(|s| s.checked_add(op.in_size));
            let (Some(start), Some(read_end)) = (start, read_end) else {
                return Err(self.out_of_bounds(element, index, op.buffer, usize::MAX, buf.data.len()));
            };
            if read_end > buf.data.len() {
                return Err(self.out_of_bounds(element, index, op.buffer, read_end, buf.data.len()));
            }
            let value = (op.fetch)(&buf.data[start..read_end]);
            (op.emit)(&value, &mut out[op.out_offset..op.out_offset + op.out_size]);
        }
        Ok(())
    }

    fn out_of_bounds(
        &self,
        element: usize,
        index: u32,
        buffer: usize,
        read_end: usize,
        len: usize,
    ) -> DrawError {
        error!(element, index, buffer, read_end, len, "vertex fetch out of bounds");
        DrawError::FetchOutOfBounds {
            element,
            index,
            buffer,
            read_end,
            len,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TranslateCacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// LRU of conversion programs keyed by layout.
pub struct TranslateCache {
    cache: LruCache<TranslateKey, Arc<Translate>>,
    stats: TranslateCacheStats,
}

impl TranslateCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            stats: TranslateCacheStats::default(),
        }
    }

    pub fn get(&mut self, key: &TranslateKey) -> Arc<Translate> {
        if let Some(t) = self.cache.get(key) {
            self.stats.hits += 1;
            return Arc::clone(t);
        }
        self.stats.misses += 1;
        trace!(elements = key.elements.len(), stride = key.output_stride, "building translate program");
        let t = Arc::new(Translate::new(key.clone()));
        self.cache.put(key.clone(), Arc::clone(&t));
        t
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> TranslateCacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn float2_buffer(verts: &[[f32; 2]]) -> Vec<u8> {
        verts
            .iter()
            .flat_map(|v| v.iter().flat_map(|c| c.to_le_bytes()))
            .collect()
    }

    #[test]
    fn hw_key_rejects_header_and_missing_elements() {
        let elements = [VertexElement::new(0, 0, VertexFormat::Float32x2)];
        let info = VertexInfo::new().attr(0, EmitFormat::Header);
        assert_eq!(
            TranslateKey::for_hw_vertex(&info, &elements, 1, "fetch_emit").unwrap_err(),
            DrawError::UnsupportedEmitFormat {
                format: EmitFormat::Header,
                path: "fetch_emit"
            }
        );

        let info = VertexInfo::new().attr(2, EmitFormat::Float4);
        assert_eq!(
            TranslateKey::for_hw_vertex(&info, &elements, 1, "fetch_emit").unwrap_err(),
            DrawError::MissingVertexElement(2)
        );
    }

    #[test]
    fn hw_key_lays_out_attributes_and_point_size() {
        let elements = [
            VertexElement::new(0, 0, VertexFormat::Float32x2),
            VertexElement::new(1, 4, VertexFormat::Bgra8Unorm),
        ];
        let info = VertexInfo::new()
            .attr(0, EmitFormat::Float2)
            .attr(1, EmitFormat::Omit)
            .attr(1, EmitFormat::Unorm8x4)
            .attr(0, EmitFormat::PointSize);
        let key = TranslateKey::for_hw_vertex(&info, &elements, 2, "fetch_emit").unwrap();
        assert_eq!(key.output_stride, 16);
        let offsets: Vec<_> = key.elements.iter().map(|e| e.output_offset).collect();
        assert_eq!(offsets, vec![0, 8, 12]);
        assert_eq!(key.elements[2].input_buffer, 2);
    }

    #[test]
    fn run_elts_gathers_in_index_order() {
        let data = float2_buffer(&[[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]]);
        let buffers = [VertexBufferView::new(&data, 8)];
        let elements = [VertexElement::new(0, 0, VertexFormat::Float32x2)];
        let key = TranslateKey::for_float4_slots(&elements, 1, 1).unwrap();
        let t = Translate::new(key);

        let mut dst = vec![0u8; 32];
        t.run_elts(&buffers, &[2, 0], &mut dst).unwrap();
        assert_eq!(floats(&dst), vec![4.0, 5.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn out_of_bounds_fetch_is_an_error() {
        let data = float2_buffer(&[[0.0, 1.0]]);
        let buffers = [VertexBufferView::new(&data, 8)];
        let elements = [VertexElement::new(0, 0, VertexFormat::Float32x2)];
        let t = Translate::new(TranslateKey::for_float4_slots(&elements, 1, 1).unwrap());

        let mut dst = vec![0u8; 16];
        assert_eq!(
            t.run_linear(&buffers, 1, 1, &mut dst).unwrap_err(),
            DrawError::FetchOutOfBounds {
                element: 0,
                index: 1,
                buffer: 0,
                read_end: 16,
                len: 8
            }
        );
        assert_eq!(
            t.run_linear(&[], 0, 1, &mut dst).unwrap_err(),
            DrawError::UnboundVertexBuffer {
                element: 0,
                buffer: 0
            }
        );
    }

    #[test]
    fn zero_stride_repeats_first_vertex() {
        let ps = 4.0f32.to_le_bytes();
        let buffers = [VertexBufferView::new(&ps, 0)];
        let elements = [VertexElement::new(0, 0, VertexFormat::Float32x1)];
        let t = Translate::new(TranslateKey::for_float4_slots(&elements, 1, 1).unwrap());
        let mut dst = vec![0u8; 48];
        t.run_linear(&buffers, 5, 3, &mut dst).unwrap();
        assert_eq!(floats(&dst), [4.0, 0.0, 0.0, 1.0].repeat(3));

        // Zero stride never reads out of bounds, but indices must not wrap.
        let err = t.run_linear(&buffers, u32::MAX - 1, 3, &mut dst).unwrap_err();
        assert_eq!(
            err,
            DrawError::FetchOutOfBounds {
                element: 0,
                index: u32::MAX,
                buffer: 0,
                read_end: usize::MAX,
                len: 4
            }
        );
    }

    #[test]
    fn cache_reuses_programs_for_equal_keys() {
        let elements = [VertexElement::new(0, 0, VertexFormat::Float32x3)];
        let key = TranslateKey::for_float4_slots(&elements, 1, 2).unwrap();
        let mut cache = TranslateCache::new(2);
        let a = cache.get(&key);
        let b = cache.get(&key.clone());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats(), TranslateCacheStats { hits: 1, misses: 1 });
        assert_eq!(cache.len(), 1);
    }
}
