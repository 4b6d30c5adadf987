//! Clip test, perspective divide and viewport transform of shaded vertices.

use crate::config::{DrawCallConfig, Viewport};
use crate::vertex::{ClipMask, VertexStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PostVsMode {
    /// Positions are final.
    None,
    /// Scale and translate xyz; no divide, no clip test.
    ViewportOnly,
    ClipViewport,
    /// As `ClipViewport`, also reading the shader's edge flag output.
    ClipViewportEdgeflag,
}

pub(crate) struct PostVs {
    mode: PostVsMode,
    planes: Vec<[f32; 4]>,
    viewport: Viewport,
    pos: usize,
    edgeflag: Option<usize>,
}

impl PostVs {
    pub(crate) fn new(config: &DrawCallConfig) -> Self {
        let mode = match (config.bypass_clipping, config.bypass_viewport) {
            (true, true) => PostVsMode::None,
            (true, false) => PostVsMode::ViewportOnly,
            (false, _) if config.edgeflag_output.is_some() => PostVsMode::ClipViewportEdgeflag,
            (false, _) => PostVsMode::ClipViewport,
        };
        Self {
            mode,
            planes: config.planes.clone(),
            viewport: config.viewport,
            pos: config.position_output,
            edgeflag: config.edgeflag_output,
        }
    }

    pub(crate) fn mode(&self) -> PostVsMode {
        self.mode
    }

    /// Process the first `verts.batch_len()` vertices. Returns whether any
    /// vertex needs the primitive pipeline: it is clipped or one of its
    /// edge flags is false.
    ///
    /// `w == 0` is not special-cased and yields non-finite positions.
    pub(crate) fn run(&self, verts: &mut VertexStore) -> bool {
        match self.mode {
            PostVsMode::None => false,
            PostVsMode::ViewportOnly => {
                for v in 0..verts.batch_len() {
                    self.viewport.apply(&mut verts.data_mut(v)[self.pos]);
                }
                false
            }
            PostVsMode::ClipViewport => self.clip_viewport(verts, None),
            PostVsMode::ClipViewportEdgeflag => self.clip_viewport(verts, self.edgeflag),
        }
    }

    fn clip_viewport(&self, verts: &mut VertexStore, edgeflag: Option<usize>) -> bool {
        let mut need_pipeline = false;
        for v in 0..verts.batch_len() {
            let pos = verts.attrib(v, self.pos);
            let mut mask = ClipMask::empty();
            for (i, plane) in self.planes.iter().enumerate() {
                let dp = pos[0] * plane[0] + pos[1] * plane[1] + pos[2] * plane[2] + pos[3] * plane[3];
                if dp < 0.0 {
                    mask |= ClipMask::plane(i);
                }
            }

            if mask.is_empty() {
                let w = 1.0 / pos[3];
                let mut out = [pos[0] * w, pos[1] * w, pos[2] * w, w];
                self.viewport.apply(&mut out);
                verts.data_mut(v)[self.pos] = out;
            }

            let header = verts.header_mut(v);
            header.clip = pos;
            header.clipmask = mask;
            need_pipeline |= !mask.is_empty();

            if let Some(slot) = edgeflag {
                let flag = verts.attrib(v, slot)[0] == 1.0;
                verts.header_mut(v).edgeflag = flag;
                need_pipeline |= !flag;
            }
        }
        need_pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RasterizerState;
    use crate::shader::ShaderInfo;
    use proptest::prelude::*;

    fn config(rast: RasterizerState, viewport: Viewport, edgeflag: Option<usize>) -> DrawCallConfig {
        let shader = ShaderInfo {
            num_inputs: 2,
            num_outputs: 2,
            position_output: 0,
            edgeflag_output: edgeflag,
        };
        DrawCallConfig::new(&rast, &viewport, &[[1.0, 0.0, 0.0, 0.5]], Some(shader), 2, false)
            .unwrap()
    }

    #[test]
    fn mode_follows_bypass_flags() {
        let window = Viewport::from_window(64.0, 32.0);
        let bypass = RasterizerState {
            bypass_clipping: true,
            ..Default::default()
        };
        let cases = [
            (bypass, Viewport::default(), None, PostVsMode::None),
            (bypass, window, None, PostVsMode::ViewportOnly),
            (RasterizerState::default(), window, None, PostVsMode::ClipViewport),
            (RasterizerState::default(), window, Some(1), PostVsMode::ClipViewportEdgeflag),
        ];
        for (rast, vp, ef, mode) in cases {
            assert_eq!(PostVs::new(&config(rast, vp, ef)).mode(), mode);
        }
    }

    #[test]
    fn unclipped_vertices_are_divided_and_mapped() {
        let cfg = config(RasterizerState::default(), Viewport::from_window(100.0, 50.0), None);
        let post = PostVs::new(&cfg);
        let mut verts = VertexStore::from_rows(
            2,
            &[
                vec![[0.5, 0.5, 0.0, 2.0]],
                // Outside the left plane and the user plane `x + 0.5 >= 0`.
                vec![[-3.0, 0.0, 0.0, 1.0]],
            ],
        );

        assert!(post.run(&mut verts));
        assert_eq!(verts.header(0).clipmask, ClipMask::empty());
        assert_eq!(verts.attrib(0, 0), [62.5, 18.75, 0.5, 0.5]);
        assert_eq!(verts.header(0).clip, [0.5, 0.5, 0.0, 2.0]);

        assert_eq!(verts.header(1).clipmask, ClipMask::LEFT | ClipMask::USER0);
        // Clipped vertices keep their clip-space position.
        assert_eq!(verts.attrib(1, 0), [-3.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn d3d_near_plane_is_z_zero() {
        let rast = RasterizerState {
            gl_rasterization_rules: false,
            ..Default::default()
        };
        let post = PostVs::new(&config(rast, Viewport::default(), None));
        let mut verts = VertexStore::from_rows(
            2,
            &[vec![[0.0, 0.0, -0.5, 1.0]], vec![[0.0, 0.0, 0.5, 1.0]]],
        );
        assert!(post.run(&mut verts));
        assert_eq!(verts.header(0).clipmask, ClipMask::NEAR);
        assert_eq!(verts.header(1).clipmask, ClipMask::empty());
    }

    #[test]
    fn viewport_only_skips_divide() {
        let rast = RasterizerState {
            bypass_clipping: true,
            ..Default::default()
        };
        let post = PostVs::new(&config(rast, Viewport::from_window(10.0, 10.0), None));
        let mut verts = VertexStore::from_rows(2, &[vec![[1.0, 1.0, 1.0, 2.0]]]);
        assert!(!post.run(&mut verts));
        assert_eq!(verts.attrib(0, 0), [10.0, 0.0, 1.0, 2.0]);
    }

    fn coord() -> impl Strategy<Value = f32> {
        prop_oneof![-4.0f32..4.0, Just(0.0), Just(1.0), Just(-1.0)]
    }

    proptest! {
        #[test]
        fn reports_pipeline_exactly_when_a_vertex_needs_it(
            rows in prop::collection::vec(
                ((coord(), coord(), coord(), 0.25f32..4.0), any::<bool>()),
                1..24,
            )
        ) {
            let cfg = config(RasterizerState::default(), Viewport::from_window(8.0, 8.0), Some(1));
            let post = PostVs::new(&cfg);
            let data: Vec<_> = rows
                .iter()
                .map(|&((x, y, z, w), ef)| vec![[x, y, z, w], [if ef { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0]])
                .collect();
            let mut verts = VertexStore::from_rows(2, &data);

            let need = post.run(&mut verts);
            let any = verts
                .headers()
                .iter()
                .any(|h| !h.clipmask.is_empty() || !h.edgeflag);
            prop_assert_eq!(need, any);
            for ((_, ef), h) in rows.iter().zip(verts.headers()) {
                prop_assert_eq!(h.edgeflag, *ef);
            }
        }
    }
}
