//! Fetch / shade / emit middle ends and the vcache front end that feeds them.
//!
//! A draw is split by [`vcache::Vcache`] into batches of de-duplicated fetch
//! indices plus base-primitive draw elements. Each batch is handed to one
//! [`MiddleEnd`], chosen once per draw from [`PtOptions`]:
//!
//! | options               | middle end               |
//! |-----------------------|--------------------------|
//! | none                  | `fetch_emit`             |
//! | `SHADE` only          | `fetch_shade_emit`       |
//! | no `SHADE`            | `fetch_pipeline`         |
//! | anything else         | `fetch_pipeline_or_emit` |

pub(crate) mod emit;
mod fetch;
mod fetch_emit;
mod fetch_pipeline;
mod fetch_pipeline_or_emit;
mod fetch_shade_emit;
mod post_vs;
pub(crate) mod vcache;

use bitflags::bitflags;

use crate::backend::VbufRender;
use crate::config::{DrawCallConfig, DrawOptions};
use crate::error::DrawError;
use crate::pipeline::Pipeline;
use crate::prim::{DrawElt, PrimitiveType};
use crate::shader::VertexShader;
use crate::stats::DrawStats;
use crate::translate::{TranslateCache, VertexBufferView, VertexElement};

pub(crate) use fetch_emit::FetchEmit;
pub(crate) use fetch_pipeline::FetchPipeline;
pub(crate) use fetch_pipeline_or_emit::FetchPipelineOrEmit;
pub(crate) use fetch_shade_emit::FetchShadeEmit;

/// Largest batch any middle end accepts. Even, so strips keep their winding
/// parity across batches.
pub const DRAW_PIPE_MAX_VERTICES: usize = 0xffff & !1;

bitflags! {
    /// What a draw needs beyond fetch + emit.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PtOptions: u32 {
        const SHADE = 1 << 0;
        const CLIPTEST = 1 << 1;
        const PIPELINE = 1 << 2;
    }
}

impl PtOptions {
    pub fn for_draw(config: &DrawCallConfig, prim: PrimitiveType) -> Self {
        let mut opts = PtOptions::empty();
        if !config.bypass_vs {
            opts |= PtOptions::SHADE;
        }
        if !config.bypass_clipping {
            opts |= PtOptions::CLIPTEST;
        }
        if config.need_pipeline(prim) {
            opts |= PtOptions::PIPELINE;
        }
        opts
    }
}

/// Everything a middle end touches while running one draw.
pub(crate) struct PtContext<'a> {
    pub config: &'a DrawCallConfig,
    pub elements: &'a [VertexElement],
    pub buffers: &'a [VertexBufferView<'a>],
    pub edgeflags: Option<&'a [bool]>,
    pub shader: Option<&'a dyn VertexShader>,
    pub render: &'a mut dyn VbufRender,
    pub pipeline: &'a mut Pipeline,
    pub cache: &'a mut TranslateCache,
    pub stats: &'a mut DrawStats,
}

impl<'a> PtContext<'a> {
    pub(crate) fn require_shader(&self) -> Result<&'a dyn VertexShader, DrawError> {
        self.shader.ok_or(DrawError::MissingVertexShader)
    }
}

/// Draw list of one batch: explicit elements or the implicit `0..count`.
#[derive(Clone, Copy, Debug)]
pub(crate) enum DrawList<'a> {
    Elts(&'a [DrawElt]),
    /// Hardware indices submitted as a single draw; must fit `max_indices`.
    Indices(&'a [u16]),
    Linear(usize),
}

pub(crate) trait MiddleEnd {
    fn name(&self) -> &'static str;

    /// Configure for draws of the base primitive `prim`. Returns the largest
    /// number of fetched vertices one batch may carry; always even.
    fn prepare(
        &mut self,
        cx: &mut PtContext<'_>,
        prim: PrimitiveType,
        opts: PtOptions,
    ) -> Result<usize, DrawError>;

    /// `fetch_elts` index the vertex buffers; `draw_elts` index `fetch_elts`.
    fn run(
        &mut self,
        cx: &mut PtContext<'_>,
        fetch_elts: &[u32],
        draw_elts: &[DrawElt],
    ) -> Result<(), DrawError>;

    /// Batch of source vertices `start..start + count`, drawn in order.
    fn run_linear(
        &mut self,
        cx: &mut PtContext<'_>,
        start: u32,
        count: usize,
    ) -> Result<(), DrawError>;

    fn finish(&mut self, _cx: &mut PtContext<'_>) {}
}

/// The four middle ends, kept alive across draws so their scratch state and
/// cached translate programs are reused.
#[derive(Default)]
pub(crate) struct MiddleEnds {
    fetch_emit: FetchEmit,
    fetch_pipeline: FetchPipeline,
    fetch_pipeline_or_emit: FetchPipelineOrEmit,
    fetch_shade_emit: FetchShadeEmit,
}

impl MiddleEnds {
    pub(crate) fn select(&mut self, opts: PtOptions, options: &DrawOptions) -> &mut dyn MiddleEnd {
        if opts.is_empty() {
            &mut self.fetch_emit
        } else if opts == PtOptions::SHADE && options.fused_shade_emit {
            &mut self.fetch_shade_emit
        } else if !opts.contains(PtOptions::SHADE) {
            &mut self.fetch_pipeline
        } else {
            &mut self.fetch_pipeline_or_emit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CullMode, RasterizerState, Viewport};
    use crate::shader::ShaderInfo;

    fn shader_info() -> ShaderInfo {
        ShaderInfo {
            num_inputs: 1,
            num_outputs: 1,
            position_output: 0,
            edgeflag_output: None,
        }
    }

    fn config(rast: RasterizerState) -> DrawCallConfig {
        DrawCallConfig::new(&rast, &Viewport::default(), &[], Some(shader_info()), 1, false)
            .unwrap()
    }

    #[test]
    fn selection_follows_options() {
        let mut ends = MiddleEnds::default();
        let mut options = DrawOptions::default();
        let name = |ends: &mut MiddleEnds, opts, options: &DrawOptions| {
            ends.select(opts, options).name()
        };

        assert_eq!(name(&mut ends, PtOptions::empty(), &options), "fetch_emit");
        assert_eq!(name(&mut ends, PtOptions::SHADE, &options), "fetch_shade_emit");
        assert_eq!(name(&mut ends, PtOptions::PIPELINE, &options), "fetch_pipeline");
        assert_eq!(
            name(&mut ends, PtOptions::SHADE | PtOptions::CLIPTEST, &options),
            "fetch_pipeline_or_emit"
        );

        options.fused_shade_emit = false;
        assert_eq!(
            name(&mut ends, PtOptions::SHADE, &options),
            "fetch_pipeline_or_emit"
        );
    }

    #[test]
    fn options_reflect_draw_state() {
        let bypass = config(RasterizerState {
            bypass_vs: true,
            ..Default::default()
        });
        assert_eq!(
            PtOptions::for_draw(&bypass, PrimitiveType::TriangleStrip),
            PtOptions::empty()
        );

        let culled = config(RasterizerState {
            cull_mode: CullMode::Back,
            ..Default::default()
        });
        assert_eq!(
            PtOptions::for_draw(&culled, PrimitiveType::Triangles),
            PtOptions::all()
        );
        // Culling only concerns triangles.
        assert_eq!(
            PtOptions::for_draw(&culled, PrimitiveType::LineStrip),
            PtOptions::SHADE | PtOptions::CLIPTEST
        );
    }
}
