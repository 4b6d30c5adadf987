use std::fmt;

use tracing::error;

use crate::error::DrawError;

/// Primitive topologies accepted by the draw entry points.
///
/// Only [`PrimitiveType::Points`], [`PrimitiveType::Lines`] and
/// [`PrimitiveType::Triangles`] reach the primitive pipeline; everything else is
/// decomposed by the front end (or rewritten by the passthrough path).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
    QuadStrip,
    Polygon,
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveType::Points => "points",
            PrimitiveType::Lines => "lines",
            PrimitiveType::LineLoop => "line_loop",
            PrimitiveType::LineStrip => "line_strip",
            PrimitiveType::Triangles => "triangles",
            PrimitiveType::TriangleStrip => "triangle_strip",
            PrimitiveType::TriangleFan => "triangle_fan",
            PrimitiveType::Quads => "quads",
            PrimitiveType::QuadStrip => "quad_strip",
            PrimitiveType::Polygon => "polygon",
        };
        f.write_str(s)
    }
}

impl PrimitiveType {
    /// The base primitive kind this topology decomposes into.
    pub fn reduced(self) -> PrimitiveType {
        match self {
            PrimitiveType::Points => PrimitiveType::Points,
            PrimitiveType::Lines | PrimitiveType::LineLoop | PrimitiveType::LineStrip => {
                PrimitiveType::Lines
            }
            _ => PrimitiveType::Triangles,
        }
    }

    /// Whether this is one of the three kinds the pipeline understands directly.
    pub fn is_base(self) -> bool {
        self.reduced() == self
    }

    /// Vertices referenced by one primitive of a base kind.
    pub fn vertices_per_prim(self) -> usize {
        match self.reduced() {
            PrimitiveType::Points => 1,
            PrimitiveType::Lines => 2,
            _ => 3,
        }
    }

    /// `(first, incr)` stepping rule: a draw needs at least `first` vertices,
    /// and every further primitive consumes `incr` more.
    ///
    /// Loops, fans and polygons also report `incr == 1`, but they cannot be
    /// chunked without repeating their first vertex (see [`Self::is_splittable`]).
    pub fn split_prim(self) -> (usize, usize) {
        match self {
            PrimitiveType::Points => (1, 1),
            PrimitiveType::Lines => (2, 2),
            PrimitiveType::LineStrip | PrimitiveType::LineLoop => (2, 1),
            PrimitiveType::Triangles => (3, 3),
            PrimitiveType::TriangleStrip
            | PrimitiveType::TriangleFan
            | PrimitiveType::Polygon => (3, 1),
            PrimitiveType::Quads => (4, 4),
            PrimitiveType::QuadStrip => (4, 2),
        }
    }

    /// Whether a long draw of this topology can be split into independent
    /// chunks that overlap by `first - incr` vertices.
    pub fn is_splittable(self) -> bool {
        !matches!(
            self,
            PrimitiveType::LineLoop | PrimitiveType::TriangleFan | PrimitiveType::Polygon
        )
    }

    /// Drop a trailing partial primitive from `count`.
    pub fn trim(self, count: usize) -> usize {
        let (first, incr) = self.split_prim();
        trim(count, first, incr)
    }
}

pub(crate) fn trim(count: usize, first: usize, incr: usize) -> usize {
    if count < first {
        0
    } else {
        count - (count - first) % incr
    }
}

/// One reference from a primitive to a fetched vertex.
///
/// `index` addresses the de-duplicated, already-fetched vertex batch (never the
/// source vertex buffers). `edge_flag` belongs to the edge that starts at this
/// corner; `reset_stipple` is only meaningful on a primitive's first corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawElt {
    pub index: u16,
    pub edge_flag: bool,
    pub reset_stipple: bool,
}

impl DrawElt {
    pub fn new(index: u16) -> Self {
        Self {
            index,
            edge_flag: true,
            reset_stipple: true,
        }
    }

    pub(crate) fn with_flags(index: u16, edge_flag: bool, reset_stipple: bool) -> Self {
        Self {
            index,
            edge_flag,
            reset_stipple,
        }
    }
}

/// Vertex index `start + i`, or `None` past `u32::MAX`.
#[inline]
pub(crate) fn linear_index(start: u32, i: usize) -> Option<u32> {
    u32::try_from(i).ok().and_then(|i| start.checked_add(i))
}

/// Source of vertex indices for one draw call.
#[derive(Clone, Copy, Debug)]
pub enum Elts<'a> {
    /// Implicit `start + i` indices.
    Linear { start: u32 },
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl<'a> Elts<'a> {
    pub fn is_linear(&self) -> bool {
        matches!(self, Elts::Linear { .. })
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Elts::Linear { .. } => None,
            Elts::U8(v) => Some(v.len()),
            Elts::U16(v) => Some(v.len()),
            Elts::U32(v) => Some(v.len()),
        }
    }

    /// Restrict the indices to `start..start + count`. Linear ranges must
    /// stay within `u32` vertex indices.
    pub(crate) fn range(self, start: usize, count: usize) -> Result<Elts<'a>, DrawError> {
        let check = |len: usize| -> Result<(), DrawError> {
            let end = start.checked_add(count).unwrap_or(usize::MAX);
            if end > len {
                return Err(DrawError::IndexOutOfBounds { start, end, len });
            }
            Ok(())
        };
        Ok(match self {
            Elts::Linear { start: base } => {
                let first = linear_index(base, start);
                let last = first.and_then(|first| match count {
                    0 => Some(first),
                    n => linear_index(first, n - 1),
                });
                match (first, last) {
                    (Some(first), Some(_)) => Elts::Linear { start: first },
                    _ => {
                        error!(base, start, count, "linear draw range overflows u32 indices");
                        return Err(DrawError::VertexIndexOverflow { start: base, count });
                    }
                }
            }
            Elts::U8(v) => {
                check(v.len())?;
                Elts::U8(&v[start..start + count])
            }
            Elts::U16(v) => {
                check(v.len())?;
                Elts::U16(&v[start..start + count])
            }
            Elts::U32(v) => {
                check(v.len())?;
                Elts::U32(&v[start..start + count])
            }
        })
    }

    /// Fetch index `i` (relative to the start of the range).
    #[inline]
    pub fn get(&self, i: usize) -> u32 {
        match self {
            // `range` has checked every linear index fits.
            Elts::Linear { start } => linear_index(*start, i).unwrap_or(u32::MAX),
            Elts::U8(v) => u32::from(v[i]),
            Elts::U16(v) => u32::from(v[i]),
            Elts::U32(v) => v[i],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduced_prim_maps_to_base_kinds() {
        assert_eq!(PrimitiveType::LineLoop.reduced(), PrimitiveType::Lines);
        assert_eq!(PrimitiveType::QuadStrip.reduced(), PrimitiveType::Triangles);
        assert_eq!(PrimitiveType::Polygon.reduced(), PrimitiveType::Triangles);
        assert!(PrimitiveType::Points.is_base());
        assert!(!PrimitiveType::TriangleFan.is_base());
    }

    #[test]
    fn trim_drops_trailing_partial_primitive() {
        assert_eq!(PrimitiveType::Triangles.trim(7), 6);
        assert_eq!(PrimitiveType::Triangles.trim(2), 0);
        assert_eq!(PrimitiveType::TriangleStrip.trim(7), 7);
        assert_eq!(PrimitiveType::Quads.trim(9), 8);
        assert_eq!(PrimitiveType::QuadStrip.trim(7), 6);
        assert_eq!(PrimitiveType::Lines.trim(5), 4);
        assert_eq!(PrimitiveType::LineLoop.trim(1), 0);
    }

    #[test]
    fn elts_range_is_bounds_checked() {
        let idx = [5u16, 6, 7, 8];
        let r = Elts::U16(&idx).range(1, 2).unwrap();
        assert_eq!(r.get(0), 6);
        assert_eq!(r.get(1), 7);

        let err = Elts::U16(&idx).range(3, 2).unwrap_err();
        assert_eq!(
            err,
            DrawError::IndexOutOfBounds {
                start: 3,
                end: 5,
                len: 4
            }
        );

        let linear = Elts::Linear { start: 10 }.range(2, 100).unwrap();
        assert_eq!(linear.get(3), 15);
    }

    #[test]
    fn linear_range_must_fit_u32_indices() {
        let last = Elts::Linear { start: u32::MAX - 2 }.range(0, 3).unwrap();
        assert_eq!(last.get(2), u32::MAX);

        let err = Elts::Linear { start: u32::MAX - 2 }.range(0, 4).unwrap_err();
        assert_eq!(
            err,
            DrawError::VertexIndexOverflow {
                start: u32::MAX - 2,
                count: 4
            }
        );
        assert!(Elts::Linear { start: u32::MAX }.range(1, 0).is_err());
        assert_eq!(linear_index(u32::MAX, 1), None);
    }
}
