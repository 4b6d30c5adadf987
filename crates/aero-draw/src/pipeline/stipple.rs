use crate::error::DrawError;

use super::{PrimHeader, Stage, StageChain};

/// Longest line, in pattern steps, that is walked run by run. Window-space
/// lines are bounded by the viewport; past this the last run extends to the
/// end of the line.
const MAX_STEPS: u32 = 1 << 16;

/// Splits lines into the "on" runs of a 16-bit stipple pattern. The pattern
/// phase carries over between connected lines until a reset.
pub(crate) struct StippleStage {
    counter: u32,
    pattern: u16,
    factor: u32,
    pos: usize,
}

impl StippleStage {
    pub(crate) fn new(factor: u8, pattern: u16, pos: usize) -> Self {
        Self {
            counter: 0,
            pattern,
            factor: u32::from(factor) + 1,
            pos,
        }
    }

    fn test(&self, step: u32) -> bool {
        self.bit((step / self.factor) & 0xf)
    }

    fn bit(&self, cell: u32) -> bool {
        self.pattern & (1 << cell) != 0
    }

    /// Steps from `step` until the pattern bit changes, capped at one period.
    fn run_len(&self, step: u32) -> u32 {
        let cell = (step / self.factor) & 0xf;
        let on = self.bit(cell);
        let mut len = self.factor - step % self.factor;
        for k in 1..16 {
            if self.bit((cell + k) & 0xf) != on {
                break;
            }
            len += self.factor;
        }
        len
    }

    fn emit_segment(
        &self,
        prim: &PrimHeader,
        t0: f32,
        t1: f32,
        next: &mut StageChain<'_>,
    ) -> Result<(), DrawError> {
        let (v0, v1) = (prim.v[0], prim.v[1]);
        let mut seg = PrimHeader::line(v0, v1, false);
        if t0 > 0.0 {
            seg.v[0] = next.verts.interpolate(t0, v0, v1);
        }
        if t1 < 1.0 {
            seg.v[1] = next.verts.interpolate(t1, v0, v1);
        }
        next.line(&seg)
    }
}

impl Stage for StippleStage {
    fn name(&self) -> &'static str {
        "stipple"
    }

    fn line(&mut self, prim: &PrimHeader, next: &mut StageChain<'_>) -> Result<(), DrawError> {
        let p0 = next.verts.attrib(prim.v[0], self.pos);
        let p1 = next.verts.attrib(prim.v[1], self.pos);
        let length = (p1[0] - p0[0]).abs().max((p1[1] - p0[1]).abs());
        let steps = if length.is_finite() {
            length.ceil().min(MAX_STEPS as f32) as u32
        } else {
            0
        };

        if prim.reset_line_stipple {
            self.counter = 0;
        }

        let mut run_start = None;
        let mut i = 0;
        while i < steps {
            let step = self.counter.wrapping_add(i);
            if self.test(step) {
                run_start.get_or_insert(i);
            } else if let Some(start) = run_start.take() {
                self.emit_segment(prim, start as f32 / length, i as f32 / length, next)?;
            }
            i += self.run_len(step).min(steps - i);
        }
        if let Some(start) = run_start {
            if (start as f32) < length {
                self.emit_segment(prim, start as f32 / length, 1.0, next)?;
            }
        }

        self.counter = self.counter.wrapping_add(length as u32);
        Ok(())
    }

    fn reset_stipple_counter(&mut self, next: &mut StageChain<'_>) {
        self.counter = 0;
        next.reset_stipple_counter();
    }
}
