//! Draw options and the immutable per-draw configuration.

use tracing::error;

use crate::error::DrawError;
use crate::prim::PrimitiveType;
use crate::shader::ShaderInfo;
use crate::util::{env_var_truthy, env_var_usize};

pub const DISABLE_PASSTHROUGH_ENV: &str = "AERO_DRAW_DISABLE_PASSTHROUGH";
pub const DISABLE_FSE_ENV: &str = "AERO_DRAW_DISABLE_FSE";
pub const PASSTHROUGH_MAX_VERTICES_ENV: &str = "AERO_DRAW_PASSTHROUGH_MAX_VERTICES";

/// Number of canonical view-volume planes. User planes follow them.
pub const CANONICAL_CLIP_PLANES: usize = 6;
pub const MAX_USER_CLIP_PLANES: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Fill,
    Line,
    Point,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
    FrontAndBack,
}

/// Rasterizer state consumed by the vertex pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterizerState {
    /// Positions arrive in window space; skip clip testing.
    pub bypass_clipping: bool,
    /// Vertex data is already shaded; skip the vertex shader (implies
    /// `bypass_clipping`).
    pub bypass_vs: bool,
    /// GL clip space (`-w <= z <= w`). When false the D3D near plane
    /// (`z >= 0`) is used instead.
    pub gl_rasterization_rules: bool,
    pub fill_front: FillMode,
    pub fill_back: FillMode,
    pub front_ccw: bool,
    pub cull_mode: CullMode,
    pub line_stipple_enable: bool,
    /// Repeat count minus one, as in GL.
    pub line_stipple_factor: u8,
    pub line_stipple_pattern: u16,
    pub point_size: f32,
    pub flatshade_first: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            bypass_clipping: false,
            bypass_vs: false,
            gl_rasterization_rules: true,
            fill_front: FillMode::Fill,
            fill_back: FillMode::Fill,
            front_ccw: true,
            cull_mode: CullMode::None,
            line_stipple_enable: false,
            line_stipple_factor: 0,
            line_stipple_pattern: 0xffff,
            point_size: 1.0,
            flatshade_first: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub scale: [f32; 4],
    pub translate: [f32; 4],
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: [1.0, 1.0, 1.0, 1.0],
            translate: [0.0; 4],
        }
    }
}

impl Viewport {
    /// Viewport mapping NDC onto a `width` x `height` window (y down, depth 0..1).
    pub fn from_window(width: f32, height: f32) -> Self {
        Self {
            scale: [width * 0.5, -height * 0.5, 0.5, 1.0],
            translate: [width * 0.5, height * 0.5, 0.5, 0.0],
        }
    }

    pub fn is_identity(&self) -> bool {
        self.scale[..3] == [1.0, 1.0, 1.0] && self.translate[..3] == [0.0, 0.0, 0.0]
    }

    #[inline]
    pub(crate) fn apply(&self, pos: &mut [f32; 4]) {
        for c in 0..3 {
            pos[c] = pos[c] * self.scale[c] + self.translate[c];
        }
    }
}

/// Draw-context wide options, normally fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawOptions {
    /// Allow the passthrough fast path for unshaded, unclipped draws.
    pub passthrough: bool,
    /// Allow the fused fetch+shade+emit middle end.
    pub fused_shade_emit: bool,
    /// Vertices per passthrough chunk. The backend's vertex buffer capacity
    /// caps this further.
    pub passthrough_max_vertices: usize,
    pub translate_cache_capacity: usize,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            passthrough: true,
            fused_shade_emit: true,
            passthrough_max_vertices: 1024,
            translate_cache_capacity: 64,
        }
    }
}

impl DrawOptions {
    /// Defaults overlaid with the `AERO_DRAW_*` environment toggles.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if env_var_truthy(DISABLE_PASSTHROUGH_ENV) {
            options.passthrough = false;
        }
        if env_var_truthy(DISABLE_FSE_ENV) {
            options.fused_shade_emit = false;
        }
        if let Some(max) = env_var_usize(PASSTHROUGH_MAX_VERTICES_ENV) {
            options.passthrough_max_vertices = max;
        }
        options
    }
}

/// Everything a draw needs to know about state, resolved once per draw call.
///
/// Stages receive this by reference; nothing here changes while a draw runs.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCallConfig {
    pub rasterizer: RasterizerState,
    pub viewport: Viewport,
    /// Canonical planes first, then user planes.
    pub planes: Vec<[f32; 4]>,
    pub bypass_clipping: bool,
    pub bypass_vs: bool,
    pub bypass_viewport: bool,
    /// Attribute slots written by fetch.
    pub num_inputs: usize,
    /// Attribute slots carried by shaded vertices.
    pub num_outputs: usize,
    pub position_output: usize,
    pub edgeflag_output: Option<usize>,
    /// Fetch must copy per-vertex edge flags from the user array.
    pub need_edgeflags: bool,
}

impl DrawCallConfig {
    pub fn new(
        rasterizer: &RasterizerState,
        viewport: &Viewport,
        user_planes: &[[f32; 4]],
        shader: Option<ShaderInfo>,
        num_elements: usize,
        has_user_edgeflags: bool,
    ) -> Result<Self, DrawError> {
        if user_planes.len() > MAX_USER_CLIP_PLANES {
            error!(count = user_planes.len(), "too many user clip planes");
            return Err(DrawError::TooManyClipPlanes {
                count: user_planes.len(),
                max: MAX_USER_CLIP_PLANES,
            });
        }

        let bypass_vs = rasterizer.bypass_vs;
        let bypass_clipping = rasterizer.bypass_clipping || bypass_vs;
        let bypass_viewport = bypass_vs || viewport.is_identity();

        let (num_inputs, num_outputs, position_output, edgeflag_output) = if bypass_vs {
            (num_elements, num_elements, 0, None)
        } else {
            let info = shader.ok_or(DrawError::MissingVertexShader)?;
            let out_of_range = std::iter::once(info.position_output)
                .chain(info.edgeflag_output)
                .find(|&slot| slot >= info.num_outputs);
            if let Some(slot) = out_of_range {
                error!(slot, outputs = info.num_outputs, "shader output slot out of range");
                return Err(DrawError::ShaderOutputOutOfRange {
                    slot,
                    outputs: info.num_outputs,
                });
            }
            (
                info.num_inputs,
                info.num_outputs,
                info.position_output,
                info.edgeflag_output,
            )
        };

        let mut planes = canonical_planes(rasterizer.gl_rasterization_rules).to_vec();
        planes.extend_from_slice(user_planes);

        let need_edgeflags = has_user_edgeflags
            && (rasterizer.fill_front != FillMode::Fill || rasterizer.fill_back != FillMode::Fill);

        Ok(Self {
            rasterizer: *rasterizer,
            viewport: *viewport,
            planes,
            bypass_clipping,
            bypass_vs,
            bypass_viewport,
            num_inputs,
            num_outputs,
            position_output,
            edgeflag_output,
            need_edgeflags,
        })
    }

    pub fn nr_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn unfilled(&self) -> bool {
        self.rasterizer.fill_front != FillMode::Fill || self.rasterizer.fill_back != FillMode::Fill
    }

    /// Whether primitives of the (reduced) kind `prim` must go through the
    /// primitive pipeline regardless of clipping.
    pub fn need_pipeline(&self, prim: PrimitiveType) -> bool {
        match prim.reduced() {
            PrimitiveType::Lines => self.rasterizer.line_stipple_enable,
            PrimitiveType::Triangles => {
                self.unfilled() || self.rasterizer.cull_mode != CullMode::None
            }
            _ => false,
        }
    }

    /// Vertex slots per shaded vertex, large enough to shade in place.
    pub(crate) fn vertex_slots(&self) -> usize {
        self.num_outputs.max(self.num_inputs).max(1)
    }
}

/// The six view-volume planes, in clipmask bit order.
pub fn canonical_planes(gl_rasterization_rules: bool) -> [[f32; 4]; CANONICAL_CLIP_PLANES] {
    let near = if gl_rasterization_rules {
        [0.0, 0.0, 1.0, 1.0]
    } else {
        [0.0, 0.0, 1.0, 0.0]
    };
    [
        [-1.0, 0.0, 0.0, 1.0],
        [1.0, 0.0, 0.0, 1.0],
        [0.0, -1.0, 0.0, 1.0],
        [0.0, 1.0, 0.0, 1.0],
        near,
        [0.0, 0.0, -1.0, 1.0],
    ]
}
