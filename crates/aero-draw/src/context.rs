//! The draw context: bound state plus the two draw entry points.

use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::backend::VbufRender;
use crate::config::{DrawCallConfig, DrawOptions, RasterizerState, Viewport, MAX_USER_CLIP_PLANES};
use crate::error::DrawError;
use crate::passthrough;
use crate::pipeline::{FlushFlags, Pipeline};
use crate::prim::{Elts, PrimitiveType};
use crate::pt::vcache::Vcache;
use crate::pt::{MiddleEnds, PtContext, PtOptions};
use crate::shader::VertexShader;
use crate::stats::DrawStats;
use crate::translate::{TranslateCache, VertexBufferView, VertexElement};

/// Per-draw source data.
#[derive(Clone, Copy, Debug, Default)]
pub struct DrawInputs<'a> {
    pub vertex_buffers: &'a [VertexBufferView<'a>],
    /// One flag per source vertex; only consulted for unfilled triangles.
    pub edgeflags: Option<&'a [bool]>,
}

impl<'a> DrawInputs<'a> {
    pub fn new(vertex_buffers: &'a [VertexBufferView<'a>]) -> Self {
        Self {
            vertex_buffers,
            edgeflags: None,
        }
    }

    pub fn with_edgeflags(mut self, edgeflags: &'a [bool]) -> Self {
        self.edgeflags = Some(edgeflags);
        self
    }
}

/// Vertex processing front end for one driver context.
///
/// State setters flush anything buffered under the previous state before the
/// new state takes effect. Draws leave primitives queued in the pipeline until
/// the next state change or explicit [`DrawContext::flush`].
pub struct DrawContext {
    options: DrawOptions,
    render: Option<Box<dyn VbufRender>>,
    rasterizer: RasterizerState,
    viewport: Viewport,
    user_planes: Vec<[f32; 4]>,
    elements: Vec<VertexElement>,
    shader: Option<Arc<dyn VertexShader>>,
    pipeline: Pipeline,
    middle: MiddleEnds,
    vcache: Vcache,
    cache: TranslateCache,
    stats: DrawStats,
}

impl Default for DrawContext {
    fn default() -> Self {
        Self::new(DrawOptions::default())
    }
}

impl DrawContext {
    pub fn new(options: DrawOptions) -> Self {
        debug!(?options, "creating draw context");
        Self {
            cache: TranslateCache::new(options.translate_cache_capacity),
            options,
            render: None,
            rasterizer: RasterizerState::default(),
            viewport: Viewport::default(),
            user_planes: Vec::new(),
            elements: Vec::new(),
            shader: None,
            pipeline: Pipeline::new(),
            middle: MiddleEnds::default(),
            vcache: Vcache::default(),
            stats: DrawStats::default(),
        }
    }

    /// Context configured from [`DrawOptions::from_env`].
    pub fn from_env() -> Self {
        Self::new(DrawOptions::from_env())
    }

    pub fn options(&self) -> &DrawOptions {
        &self.options
    }

    /// Install the hardware backend. The previous backend, if any, gets its
    /// queued primitives and is returned.
    pub fn set_render(&mut self, render: Box<dyn VbufRender>) -> Option<Box<dyn VbufRender>> {
        self.flush(FlushFlags::BACKEND);
        self.render.replace(render)
    }

    pub fn set_rasterizer_state(&mut self, rasterizer: RasterizerState) {
        self.flush(FlushFlags::STATE_CHANGE);
        self.rasterizer = rasterizer;
    }

    pub fn rasterizer_state(&self) -> &RasterizerState {
        &self.rasterizer
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.flush(FlushFlags::STATE_CHANGE);
        self.viewport = viewport;
    }

    pub fn set_clip_planes(&mut self, planes: &[[f32; 4]]) -> Result<(), DrawError> {
        if planes.len() > MAX_USER_CLIP_PLANES {
            error!(count = planes.len(), "too many user clip planes");
            return Err(DrawError::TooManyClipPlanes {
                count: planes.len(),
                max: MAX_USER_CLIP_PLANES,
            });
        }
        self.flush(FlushFlags::STATE_CHANGE);
        self.user_planes = planes.to_vec();
        Ok(())
    }

    pub fn set_vertex_elements(&mut self, elements: &[VertexElement]) {
        self.flush(FlushFlags::STATE_CHANGE);
        self.elements = elements.to_vec();
    }

    pub fn bind_vertex_shader(&mut self, shader: Option<Arc<dyn VertexShader>>) {
        self.flush(FlushFlags::STATE_CHANGE);
        self.shader = shader;
    }

    /// Hand queued primitives to the backend.
    pub fn flush(&mut self, flags: FlushFlags) {
        if let Some(render) = self.render.as_deref_mut() {
            self.pipeline.flush(render, flags);
        }
    }

    /// Draw `count` vertices starting at vertex `start`.
    pub fn draw_arrays(
        &mut self,
        prim: PrimitiveType,
        start: u32,
        count: usize,
        inputs: &DrawInputs<'_>,
    ) -> Result<(), DrawError> {
        let elts = Elts::Linear { start }.range(0, count)?;
        self.draw(prim, elts, count, inputs)
    }

    /// Draw `count` vertices named by `elts[start..start + count]`.
    pub fn draw_elements(
        &mut self,
        prim: PrimitiveType,
        elts: Elts<'_>,
        start: usize,
        count: usize,
        inputs: &DrawInputs<'_>,
    ) -> Result<(), DrawError> {
        let elts = elts.range(start, count)?;
        self.draw(prim, elts, count, inputs)
    }

    fn draw(
        &mut self,
        prim: PrimitiveType,
        elts: Elts<'_>,
        count: usize,
        inputs: &DrawInputs<'_>,
    ) -> Result<(), DrawError> {
        let Some(render) = self.render.as_deref_mut() else {
            error!(%prim, "draw without a backend");
            return Err(DrawError::NoBackend);
        };

        let count = prim.trim(count);
        if count == 0 {
            trace!(%prim, "empty draw");
            return Ok(());
        }
        self.stats.draws += 1;

        let config = DrawCallConfig::new(
            &self.rasterizer,
            &self.viewport,
            &self.user_planes,
            self.shader.as_ref().map(|s| s.info()),
            self.elements.len(),
            inputs.edgeflags.is_some(),
        )?;
        let opts = PtOptions::for_draw(&config, prim);

        let mut cx = PtContext {
            config: &config,
            elements: &self.elements,
            buffers: inputs.vertex_buffers,
            edgeflags: inputs.edgeflags,
            shader: self.shader.as_deref(),
            render,
            pipeline: &mut self.pipeline,
            cache: &mut self.cache,
            stats: &mut self.stats,
        };

        if passthrough::eligible(&self.options, &config, prim, &elts)
            && passthrough::draw(&mut cx, &self.options, prim, elts, count)?
        {
            return Ok(());
        }

        let middle = self.middle.select(opts, &self.options);
        debug!(%prim, count, ?opts, middle = middle.name(), "draw");
        self.vcache.run(&mut cx, middle, prim, elts, count, opts)
    }

    /// Counters since creation, including those kept by the pipeline's
    /// emission stage and the translate cache.
    pub fn stats(&self) -> DrawStats {
        let mut stats = self.stats;
        let vbuf = self.pipeline.vbuf_stats();
        stats.vertices_emitted += vbuf.vertices_emitted;
        stats.index_flushes += vbuf.index_flushes;
        stats.vertex_flushes += vbuf.vertex_flushes;
        let cache = self.cache.stats();
        stats.translate_hits = cache.hits;
        stats.translate_misses = cache.misses;
        stats
    }

    /// Stage names of the primitive pipeline as validated by the last draw
    /// that used it.
    pub fn pipeline_stages(&self) -> Vec<&'static str> {
        self.pipeline.stage_names()
    }
}

impl Drop for DrawContext {
    fn drop(&mut self) {
        self.flush(FlushFlags::BACKEND);
    }
}
