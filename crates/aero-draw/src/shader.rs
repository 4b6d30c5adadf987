//! Interface to the external vertex shader engine.

/// Shape of a vertex shader's register files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderInfo {
    pub num_inputs: usize,
    pub num_outputs: usize,
    /// Output slot holding the clip-space position.
    pub position_output: usize,
    /// Output slot holding an edge flag (`1.0` is true), if any.
    pub edgeflag_output: Option<usize>,
}

/// A vertex shader executed over batches of float4 vertices.
pub trait VertexShader {
    fn info(&self) -> ShaderInfo;

    /// Shade `count` vertices. Vertex `i`'s inputs are
    /// `input[i * input_stride..][..num_inputs]` and its outputs go to
    /// `output[i * output_stride..][..num_outputs]`.
    fn run_linear(
        &self,
        input: &[[f32; 4]],
        input_stride: usize,
        output: &mut [[f32; 4]],
        output_stride: usize,
        count: usize,
    );
}

/// Shader that copies its inputs to the same output slots.
#[derive(Clone, Copy, Debug)]
pub struct PassthroughShader {
    num_slots: usize,
}

impl PassthroughShader {
    pub fn new(num_slots: usize) -> Self {
        Self { num_slots }
    }
}

impl VertexShader for PassthroughShader {
    fn info(&self) -> ShaderInfo {
        ShaderInfo {
            num_inputs: self.num_slots,
            num_outputs: self.num_slots,
            position_output: 0,
            edgeflag_output: None,
        }
    }

    fn run_linear(
        &self,
        input: &[[f32; 4]],
        input_stride: usize,
        output: &mut [[f32; 4]],
        output_stride: usize,
        count: usize,
    ) {
        let n = self.num_slots;
        for i in 0..count {
            output[i * output_stride..i * output_stride + n]
                .copy_from_slice(&input[i * input_stride..i * input_stride + n]);
        }
    }
}

/// Shader built from a per-vertex function.
pub struct FnShader<F> {
    info: ShaderInfo,
    f: F,
}

impl<F> FnShader<F>
where
    F: Fn(&[[f32; 4]], &mut [[f32; 4]]),
{
    pub fn new(info: ShaderInfo, f: F) -> Self {
        Self { info, f }
    }
}

impl<F> VertexShader for FnShader<F>
where
    F: Fn(&[[f32; 4]], &mut [[f32; 4]]),
{
    fn info(&self) -> ShaderInfo {
        self.info
    }

    fn run_linear(
        &self,
        input: &[[f32; 4]],
        input_stride: usize,
        output: &mut [[f32; 4]],
        output_stride: usize,
        count: usize,
    ) {
        let (ni, no) = (self.info.num_inputs, self.info.num_outputs);
        for i in 0..count {
            let src = &input[i * input_stride..i * input_stride + ni];
            let dst = &mut output[i * output_stride..i * output_stride + no];
            (self.f)(src, dst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fn_shader_runs_per_vertex_with_strides() {
        let info = ShaderInfo {
            num_inputs: 1,
            num_outputs: 2,
            position_output: 0,
            edgeflag_output: None,
        };
        let shader = FnShader::new(info, |i: &[[f32; 4]], o: &mut [[f32; 4]]| {
            o[0] = i[0];
            o[1] = [i[0][0] * 2.0, 0.0, 0.0, 1.0];
        });
        let input = [[1.0, 0.0, 0.0, 1.0], [9.0; 4], [3.0, 0.0, 0.0, 1.0], [9.0; 4]];
        let mut output = [[0.0; 4]; 4];
        shader.run_linear(&input, 2, &mut output, 2, 2);
        assert_eq!(output[1], [2.0, 0.0, 0.0, 1.0]);
        assert_eq!(output[2], [3.0, 0.0, 0.0, 1.0]);
        assert_eq!(output[3], [6.0, 0.0, 0.0, 1.0]);
    }
}
