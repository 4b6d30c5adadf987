mod common;

use aero_draw::capture::{DrawnPrim, RecordingRender};
use aero_draw::{DrawInputs, DrawOptions, PrimitiveType, VertexBufferView};
use pretty_assertions::assert_eq;

use common::{bypass, context, float4_render, no_passthrough, positions};

fn grid(n: usize) -> Vec<[f32; 2]> {
    (0..n).map(|i| [i as f32, (i % 3) as f32]).collect()
}

/// Primitives drawn for `prim` over `points`, sorted for comparison.
fn drawn(
    options: DrawOptions,
    render: RecordingRender,
    prim: PrimitiveType,
    points: &[[f32; 2]],
) -> (Vec<DrawnPrim>, u64) {
    let (mut ctx, log) = context(options, bypass(), render);
    let data = positions(points);
    let buffers = [VertexBufferView::new(&data, 16)];
    ctx.draw_arrays(prim, 0, points.len(), &DrawInputs::new(&buffers))
        .unwrap();
    let passthrough_draws = ctx.stats().passthrough_draws;
    drop(ctx);

    let mut prims = log.borrow().primitives.clone();
    prims.sort();
    (prims, passthrough_draws)
}

#[test]
fn line_loop_is_drawn_as_a_closed_strip() {
    let (mut ctx, log) = context(DrawOptions::default(), bypass(), float4_render());
    let data = positions(&grid(5));
    let buffers = [VertexBufferView::new(&data, 16)];

    ctx.draw_arrays(PrimitiveType::LineLoop, 0, 5, &DrawInputs::new(&buffers))
        .unwrap();

    let log = log.borrow();
    assert_eq!(log.primitive_types(), vec![PrimitiveType::LineStrip]);
    assert_eq!(log.draws(), vec![vec![0, 1, 2, 3, 4, 0]]);
    assert_eq!(log.primitives.len(), 5);
    assert_eq!(ctx.stats().passthrough_draws, 1);
}

#[test]
fn quad_strip_becomes_indexed_triangles() {
    let (mut ctx, log) = context(DrawOptions::default(), bypass(), float4_render());
    let data = positions(&grid(4));
    let buffers = [VertexBufferView::new(&data, 16)];

    ctx.draw_arrays(PrimitiveType::QuadStrip, 0, 4, &DrawInputs::new(&buffers))
        .unwrap();

    let log = log.borrow();
    assert_eq!(log.primitive_types(), vec![PrimitiveType::Triangles]);
    assert_eq!(log.draws(), vec![vec![0, 1, 3, 2, 0, 3]]);
}

#[test]
fn rejected_topology_falls_back_to_the_general_path() {
    let render = float4_render().rejecting(PrimitiveType::LineStrip);
    let (mut ctx, log) = context(DrawOptions::default(), bypass(), render);
    let data = positions(&grid(5));
    let buffers = [VertexBufferView::new(&data, 16)];

    ctx.draw_arrays(PrimitiveType::LineLoop, 0, 5, &DrawInputs::new(&buffers))
        .unwrap();

    let log = log.borrow();
    assert_eq!(log.primitive_types(), vec![PrimitiveType::Lines]);
    assert_eq!(log.index_count(), 10);
    assert_eq!(ctx.stats().passthrough_draws, 0);
}

#[test]
fn loops_longer_than_one_chunk_fall_back() {
    let options = DrawOptions {
        passthrough_max_vertices: 4,
        ..Default::default()
    };
    let (mut ctx, log) = context(options, bypass(), float4_render());
    let data = positions(&grid(5));
    let buffers = [VertexBufferView::new(&data, 16)];

    ctx.draw_arrays(PrimitiveType::LineLoop, 0, 5, &DrawInputs::new(&buffers))
        .unwrap();

    assert_eq!(ctx.stats().passthrough_draws, 0);
    assert_eq!(log.borrow().primitives.len(), 5);
}

#[test]
fn points_are_split_across_small_vertex_buffers() {
    for options in [DrawOptions::default(), no_passthrough()] {
        let expect_passthrough = u64::from(options.passthrough);
        let render = float4_render().with_max_vertex_buffer_bytes(32);
        let (mut ctx, log) = context(options, bypass(), render);
        let data = positions(&grid(3));
        let buffers = [VertexBufferView::new(&data, 16)];

        ctx.draw_arrays(PrimitiveType::Points, 0, 3, &DrawInputs::new(&buffers))
            .unwrap();

        let log = log.borrow();
        assert_eq!(log.allocations(), vec![(16, 2), (16, 1)]);
        assert_eq!(log.primitives.len(), 3);
        assert_eq!(ctx.stats().passthrough_draws, expect_passthrough);
    }
}

#[test]
fn long_strips_are_chunked_with_overlap() {
    let options = DrawOptions {
        passthrough_max_vertices: 4,
        ..Default::default()
    };
    let (mut ctx, log) = context(options, bypass(), float4_render());
    let data = positions(&grid(7));
    let buffers = [VertexBufferView::new(&data, 16)];

    ctx.draw_arrays(PrimitiveType::TriangleStrip, 0, 7, &DrawInputs::new(&buffers))
        .unwrap();

    let mut prims = log.borrow().primitives.clone();
    assert_eq!(log.borrow().allocations(), vec![(16, 4), (16, 4), (16, 3)]);
    assert_eq!(prims.len(), 5);
    assert_eq!(ctx.stats().passthrough_draws, 1);

    prims.sort();
    let (general, _) = drawn(
        no_passthrough(),
        float4_render(),
        PrimitiveType::TriangleStrip,
        &grid(7),
    );
    assert_eq!(prims, general);
}

#[test]
fn passthrough_matches_the_general_path() {
    // Polygons are drawn as fans here, which starts each triangle at a
    // different corner than the general path's decomposition.
    let prims = [
        PrimitiveType::Points,
        PrimitiveType::Lines,
        PrimitiveType::LineStrip,
        PrimitiveType::LineLoop,
        PrimitiveType::Triangles,
        PrimitiveType::TriangleStrip,
        PrimitiveType::TriangleFan,
        PrimitiveType::Quads,
        PrimitiveType::QuadStrip,
    ];
    let points = grid(12);
    for prim in prims {
        let (fast, fast_draws) = drawn(DrawOptions::default(), float4_render(), prim, &points);
        let (general, general_draws) = drawn(no_passthrough(), float4_render(), prim, &points);
        assert_eq!((fast_draws, general_draws), (1, 0), "{prim}");
        assert!(!fast.is_empty(), "{prim} drew nothing");
        assert_eq!(fast, general, "{prim}");
    }
}
