//! Front end: decomposes any topology into base primitives and hands the
//! middle end batches of de-duplicated fetch indices.

use tracing::{error, trace};

use crate::error::DrawError;
use crate::pipeline::{EDGE_FLAG_0, EDGE_FLAG_1, EDGE_FLAG_2, EDGE_FLAG_ALL};
use crate::prim::{linear_index, DrawElt, Elts, PrimitiveType};

use super::{MiddleEnd, PtContext, PtOptions};

/// Direct-mapped cache slots.
pub const CACHE_MAX: usize = 256;
/// Fetch indices per batch, before the middle end's own limit.
pub const FETCH_MAX: usize = 256;
/// Draw elements per batch.
pub const DRAW_MAX: usize = 16 * 1024;

/// One base primitive, as positions into the draw's index range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Decomposed {
    Point(usize),
    Line { v: [usize; 2], reset: bool },
    Tri { v: [usize; 3], edgeflags: u8, reset: bool },
}

fn quad(
    [a, b, c, d]: [usize; 4],
    flatshade_first: bool,
    emit: &mut impl FnMut(Decomposed) -> Result<(), DrawError>,
) -> Result<(), DrawError> {
    // The diagonal is interior and never gets an edge flag.
    if flatshade_first {
        emit(Decomposed::Tri {
            v: [a, b, c],
            edgeflags: EDGE_FLAG_0 | EDGE_FLAG_1,
            reset: true,
        })?;
        emit(Decomposed::Tri {
            v: [a, c, d],
            edgeflags: EDGE_FLAG_1 | EDGE_FLAG_2,
            reset: false,
        })
    } else {
        emit(Decomposed::Tri {
            v: [a, b, d],
            edgeflags: EDGE_FLAG_0 | EDGE_FLAG_2,
            reset: true,
        })?;
        emit(Decomposed::Tri {
            v: [b, c, d],
            edgeflags: EDGE_FLAG_0 | EDGE_FLAG_1,
            reset: false,
        })
    }
}

/// Split `count` vertices of `prim` into base primitives, in draw order.
/// `count` must already be trimmed to whole primitives.
///
/// Triangle orderings keep the provoking vertex in place for the selected
/// flat shading convention.
pub(crate) fn decompose(
    prim: PrimitiveType,
    count: usize,
    flatshade_first: bool,
    mut emit: impl FnMut(Decomposed) -> Result<(), DrawError>,
) -> Result<(), DrawError> {
    let n = count;
    let tri = |v, edgeflags, reset| Decomposed::Tri {
        v,
        edgeflags,
        reset,
    };
    match prim {
        PrimitiveType::Points => {
            for i in 0..n {
                emit(Decomposed::Point(i))?;
            }
        }
        PrimitiveType::Lines => {
            for i in 0..n / 2 {
                emit(Decomposed::Line {
                    v: [2 * i, 2 * i + 1],
                    reset: true,
                })?;
            }
        }
        PrimitiveType::LineStrip | PrimitiveType::LineLoop => {
            for i in 1..n {
                emit(Decomposed::Line {
                    v: [i - 1, i],
                    reset: i == 1,
                })?;
            }
            if prim == PrimitiveType::LineLoop && n >= 2 {
                emit(Decomposed::Line {
                    v: [n - 1, 0],
                    reset: false,
                })?;
            }
        }
        PrimitiveType::Triangles => {
            for i in 0..n / 3 {
                emit(tri([3 * i, 3 * i + 1, 3 * i + 2], EDGE_FLAG_ALL, true))?;
            }
        }
        PrimitiveType::TriangleStrip => {
            for i in 0..n.saturating_sub(2) {
                let odd = i & 1;
                let v = if flatshade_first {
                    [i, i + 1 + odd, i + 2 - odd]
                } else {
                    [i + odd, i + 1 - odd, i + 2]
                };
                emit(tri(v, EDGE_FLAG_ALL, true))?;
            }
        }
        PrimitiveType::TriangleFan => {
            for i in 0..n.saturating_sub(2) {
                let v = if flatshade_first {
                    [i + 1, i + 2, 0]
                } else {
                    [0, i + 1, i + 2]
                };
                emit(tri(v, EDGE_FLAG_ALL, true))?;
            }
        }
        PrimitiveType::Quads => {
            for q in 0..n / 4 {
                let i = 4 * q;
                quad([i, i + 1, i + 2, i + 3], flatshade_first, &mut emit)?;
            }
        }
        PrimitiveType::QuadStrip => {
            let mut i = 0;
            while i + 3 < n {
                let v = if flatshade_first {
                    [i, i + 1, i + 3, i + 2]
                } else {
                    [i + 2, i, i + 1, i + 3]
                };
                quad(v, flatshade_first, &mut emit)?;
                i += 2;
            }
        }
        PrimitiveType::Polygon => {
            // Only the polygon's outline carries edge flags: the first
            // triangle owns the edge leaving vertex 0, the last one the edge
            // returning to it.
            let last = n.saturating_sub(3);
            for i in 0..n.saturating_sub(2) {
                let (v, flags) = if flatshade_first {
                    let mut f = EDGE_FLAG_1;
                    if i == 0 {
                        f |= EDGE_FLAG_0;
                    }
                    if i == last {
                        f |= EDGE_FLAG_2;
                    }
                    ([0, i + 1, i + 2], f)
                } else {
                    let mut f = EDGE_FLAG_0;
                    if i == 0 {
                        f |= EDGE_FLAG_2;
                    }
                    if i == last {
                        f |= EDGE_FLAG_1;
                    }
                    ([i + 1, i + 2, 0], f)
                };
                emit(tri(v, flags, i == 0))?;
            }
        }
    }
    Ok(())
}

/// Batches decomposed primitives for a middle end, de-duplicating fetch
/// indices through a small direct-mapped cache.
pub(crate) struct Vcache {
    tags: [Option<u32>; CACHE_MAX],
    slots: [u16; CACHE_MAX],
    fetch_elts: Vec<u32>,
    draw_elts: Vec<DrawElt>,
    fetch_max: usize,
}

impl Default for Vcache {
    fn default() -> Self {
        Self {
            tags: [None; CACHE_MAX],
            slots: [0; CACHE_MAX],
            fetch_elts: Vec::with_capacity(FETCH_MAX),
            draw_elts: Vec::with_capacity(DRAW_MAX),
            fetch_max: FETCH_MAX,
        }
    }
}

impl Vcache {
    /// Draw `count` vertices of `prim` addressed by `elts` (already
    /// restricted to the draw's range) through `middle`.
    pub(crate) fn run(
        &mut self,
        cx: &mut PtContext<'_>,
        middle: &mut dyn MiddleEnd,
        prim: PrimitiveType,
        elts: Elts<'_>,
        count: usize,
        opts: PtOptions,
    ) -> Result<(), DrawError> {
        let base = prim.reduced();
        let max_vertices = middle.prepare(cx, base, opts)?;
        let result = self.run_prepared(cx, middle, prim, elts, count, max_vertices);
        middle.finish(cx);
        result
    }

    fn run_prepared(
        &mut self,
        cx: &mut PtContext<'_>,
        middle: &mut dyn MiddleEnd,
        prim: PrimitiveType,
        elts: Elts<'_>,
        count: usize,
        max_vertices: usize,
    ) -> Result<(), DrawError> {
        if max_vertices < prim.vertices_per_prim() {
            error!(%prim, max_vertices, middle = middle.name(), "batch limit cannot hold one primitive");
            return Err(DrawError::BatchTooSmall { prim, max_vertices });
        }

        if let (Elts::Linear { start }, true) = (elts, prim.is_base()) {
            let step = prim.trim(max_vertices);
            let mut done = 0;
            while done < count {
                let n = step.min(count - done);
                let batch_start = linear_index(start, done)
                    .ok_or(DrawError::VertexIndexOverflow { start, count })?;
                trace!(%prim, start = batch_start, n, "vcache linear batch");
                middle.run_linear(cx, batch_start, n)?;
                cx.stats.batches += 1;
                done += n;
            }
            return Ok(());
        }

        self.fetch_max = max_vertices.min(FETCH_MAX);
        self.reset();
        let flatshade_first = cx.config.rasterizer.flatshade_first;
        decompose(prim, count, flatshade_first, |d| {
            self.push(cx, middle, &elts, d)
        })?;
        self.flush(cx, middle)
    }

    fn reset(&mut self) {
        self.tags = [None; CACHE_MAX];
        self.fetch_elts.clear();
        self.draw_elts.clear();
    }

    fn add(&mut self, felt: u32) -> u16 {
        let slot = felt as usize % CACHE_MAX;
        if self.tags[slot] != Some(felt) {
            self.tags[slot] = Some(felt);
            self.slots[slot] = self.fetch_elts.len() as u16;
            self.fetch_elts.push(felt);
        }
        self.slots[slot]
    }

    fn push(
        &mut self,
        cx: &mut PtContext<'_>,
        middle: &mut dyn MiddleEnd,
        elts: &Elts<'_>,
        prim: Decomposed,
    ) -> Result<(), DrawError> {
        if self.draw_elts.len() + 6 >= DRAW_MAX || self.fetch_elts.len() + 4 >= self.fetch_max {
            self.flush(cx, middle)?;
        }
        match prim {
            Decomposed::Point(i) => {
                let idx = self.add(elts.get(i));
                self.draw_elts.push(DrawElt::with_flags(idx, true, false));
            }
            Decomposed::Line { v, reset } => {
                for (k, i) in v.into_iter().enumerate() {
                    let idx = self.add(elts.get(i));
                    self.draw_elts
                        .push(DrawElt::with_flags(idx, true, reset && k == 0));
                }
            }
            Decomposed::Tri {
                v,
                edgeflags,
                reset,
            } => {
                for (k, i) in v.into_iter().enumerate() {
                    let idx = self.add(elts.get(i));
                    self.draw_elts.push(DrawElt::with_flags(
                        idx,
                        edgeflags & (1 << k) != 0,
                        reset && k == 0,
                    ));
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self, cx: &mut PtContext<'_>, middle: &mut dyn MiddleEnd) -> Result<(), DrawError> {
        if self.draw_elts.is_empty() {
            return Ok(());
        }
        trace!(
            fetch = self.fetch_elts.len(),
            draw = self.draw_elts.len(),
            "vcache flush"
        );
        middle.run(cx, &self.fetch_elts, &self.draw_elts)?;
        cx.stats.batches += 1;
        self.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RecordingRender;
    use crate::config::{DrawCallConfig, RasterizerState, Viewport};
    use crate::pipeline::Pipeline;
    use crate::stats::DrawStats;
    use crate::translate::TranslateCache;
    use crate::vertex::{EmitFormat, VertexInfo};

    fn collect(prim: PrimitiveType, count: usize, flatshade_first: bool) -> Vec<Decomposed> {
        let mut out = Vec::new();
        decompose(prim, count, flatshade_first, |d| {
            out.push(d);
            Ok(())
        })
        .unwrap();
        out
    }

    fn tris(prims: &[Decomposed]) -> Vec<([usize; 3], u8, bool)> {
        prims
            .iter()
            .map(|d| match *d {
                Decomposed::Tri {
                    v,
                    edgeflags,
                    reset,
                } => (v, edgeflags, reset),
                other => panic!("expected a triangle, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn strip_alternates_winding() {
        let last = tris(&collect(PrimitiveType::TriangleStrip, 5, false));
        let v: Vec<_> = last.iter().map(|t| t.0).collect();
        assert_eq!(v, vec![[0, 1, 2], [2, 1, 3], [2, 3, 4]]);

        let first = tris(&collect(PrimitiveType::TriangleStrip, 5, true));
        let v: Vec<_> = first.iter().map(|t| t.0).collect();
        assert_eq!(v, vec![[0, 1, 2], [1, 3, 2], [2, 3, 4]]);
    }

    #[test]
    fn quads_hide_the_diagonal() {
        let t = tris(&collect(PrimitiveType::Quads, 4, false));
        assert_eq!(
            t,
            vec![
                ([0, 1, 3], EDGE_FLAG_0 | EDGE_FLAG_2, true),
                ([1, 2, 3], EDGE_FLAG_0 | EDGE_FLAG_1, false),
            ]
        );

        let t = tris(&collect(PrimitiveType::QuadStrip, 4, false));
        assert_eq!(t[0].0, [2, 0, 3]);
        assert_eq!(t[1].0, [0, 1, 3]);
    }

    #[test]
    fn polygon_flags_only_its_outline() {
        let t = tris(&collect(PrimitiveType::Polygon, 5, false));
        assert_eq!(
            t,
            vec![
                ([1, 2, 0], EDGE_FLAG_0 | EDGE_FLAG_2, true),
                ([2, 3, 0], EDGE_FLAG_0, false),
                ([3, 4, 0], EDGE_FLAG_0 | EDGE_FLAG_1, false),
            ]
        );

        let t = tris(&collect(PrimitiveType::Polygon, 3, true));
        assert_eq!(t, vec![([0, 1, 2], EDGE_FLAG_ALL, true)]);
    }

    #[test]
    fn line_loop_closes_and_resets_once() {
        let lines = collect(PrimitiveType::LineLoop, 3, false);
        assert_eq!(
            lines,
            vec![
                Decomposed::Line {
                    v: [0, 1],
                    reset: true
                },
                Decomposed::Line {
                    v: [1, 2],
                    reset: false
                },
                Decomposed::Line {
                    v: [2, 0],
                    reset: false
                },
            ]
        );
    }

    /// Records every batch instead of drawing it.
    struct Recorder {
        max_vertices: usize,
        batches: Vec<(Vec<u32>, Vec<DrawElt>)>,
        linear: Vec<(u32, usize)>,
        prepared: Option<PrimitiveType>,
        finished: bool,
    }

    impl Recorder {
        fn new(max_vertices: usize) -> Self {
            Self {
                max_vertices,
                batches: Vec::new(),
                linear: Vec::new(),
                prepared: None,
                finished: false,
            }
        }
    }

    impl MiddleEnd for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn prepare(
            &mut self,
            _cx: &mut PtContext<'_>,
            prim: PrimitiveType,
            _opts: PtOptions,
        ) -> Result<usize, DrawError> {
            self.prepared = Some(prim);
            Ok(self.max_vertices)
        }

        fn run(
            &mut self,
            _cx: &mut PtContext<'_>,
            fetch_elts: &[u32],
            draw_elts: &[DrawElt],
        ) -> Result<(), DrawError> {
            self.batches.push((fetch_elts.to_vec(), draw_elts.to_vec()));
            Ok(())
        }

        fn run_linear(
            &mut self,
            _cx: &mut PtContext<'_>,
            start: u32,
            count: usize,
        ) -> Result<(), DrawError> {
            self.linear.push((start, count));
            Ok(())
        }

        fn finish(&mut self, _cx: &mut PtContext<'_>) {
            self.finished = true;
        }
    }

    fn with_cx(f: impl FnOnce(&mut PtContext<'_>)) -> DrawStats {
        let rast = RasterizerState {
            bypass_vs: true,
            ..Default::default()
        };
        let config = DrawCallConfig::new(&rast, &Viewport::default(), &[], None, 1, false).unwrap();
        let mut render = RecordingRender::new(VertexInfo::new().attr(0, EmitFormat::Float4));
        let mut pipeline = Pipeline::new();
        let mut cache = TranslateCache::new(4);
        let mut stats = DrawStats::default();
        let mut cx = PtContext {
            config: &config,
            elements: &[],
            buffers: &[],
            edgeflags: None,
            shader: None,
            render: &mut render,
            pipeline: &mut pipeline,
            cache: &mut cache,
            stats: &mut stats,
        };
        f(&mut cx);
        stats
    }

    #[test]
    fn indexed_draw_dedups_within_a_batch() {
        let mut middle = Recorder::new(64);
        let indices = [7u16, 8, 9, 9, 8, 10];
        let stats = with_cx(|cx| {
            Vcache::default()
                .run(
                    cx,
                    &mut middle,
                    PrimitiveType::Triangles,
                    Elts::U16(&indices),
                    6,
                    PtOptions::empty(),
                )
                .unwrap();
        });

        assert_eq!(middle.prepared, Some(PrimitiveType::Triangles));
        assert!(middle.finished);
        assert_eq!(stats.batches, 1);
        let (fetch, draw) = &middle.batches[0];
        assert_eq!(fetch, &vec![7, 8, 9, 10]);
        let idx: Vec<_> = draw.iter().map(|e| e.index).collect();
        assert_eq!(idx, vec![0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn batches_respect_the_middle_end_limit() {
        let mut middle = Recorder::new(8);
        let indices: Vec<u32> = (0..40).collect();
        with_cx(|cx| {
            Vcache::default()
                .run(
                    cx,
                    &mut middle,
                    PrimitiveType::TriangleStrip,
                    Elts::U32(&indices),
                    40,
                    PtOptions::empty(),
                )
                .unwrap();
        });

        assert_eq!(middle.prepared, Some(PrimitiveType::Triangles));
        let mut triangles = 0;
        for (fetch, draw) in &middle.batches {
            assert!(fetch.len() <= 8);
            assert_eq!(draw.len() % 3, 0);
            assert!(draw.iter().all(|e| usize::from(e.index) < fetch.len()));
            triangles += draw.len() / 3;
        }
        assert_eq!(triangles, 38);
    }

    #[test]
    fn linear_base_draws_are_chunked_whole() {
        let mut middle = Recorder::new(10);
        let stats = with_cx(|cx| {
            Vcache::default()
                .run(
                    cx,
                    &mut middle,
                    PrimitiveType::Triangles,
                    Elts::Linear { start: 5 },
                    21,
                    PtOptions::empty(),
                )
                .unwrap();
        });
        assert!(middle.batches.is_empty());
        assert_eq!(middle.linear, vec![(5, 9), (14, 9), (23, 3)]);
        assert_eq!(stats.batches, 3);
    }

    #[test]
    fn limit_below_one_primitive_is_an_error() {
        let mut middle = Recorder::new(2);
        with_cx(|cx| {
            let err = Vcache::default()
                .run(
                    cx,
                    &mut middle,
                    PrimitiveType::Triangles,
                    Elts::Linear { start: 0 },
                    3,
                    PtOptions::empty(),
                )
                .unwrap_err();
            assert!(matches!(err, DrawError::BatchTooSmall { .. }));
        });
        assert!(middle.finished);
    }
}
