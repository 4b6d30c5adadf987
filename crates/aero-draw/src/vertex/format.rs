//! Fixed codec table: decode source attributes to `float4`, encode `float4`
//! into hardware attribute formats.

use half::f16;

/// Source attribute formats readable by fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x1,
    Float32x2,
    Float32x3,
    Float32x4,
    Float16x2,
    Float16x4,
    /// RGBA bytes, normalized.
    Unorm8x4,
    /// BGRA bytes (D3D `D3DCOLOR` layout), normalized and swizzled to RGBA.
    Bgra8Unorm,
    /// Unsigned bytes converted to float without normalization.
    Uint8x4,
    Snorm16x2,
    Snorm16x4,
    Unorm16x2,
    Unorm16x4,
    /// Signed shorts converted to float without normalization.
    Sint16x2,
    Sint16x4,
    Uint32x1,
}

pub(crate) type FetchFn = fn(&[u8]) -> [f32; 4];
pub(crate) type EmitFn = fn(&[f32; 4], &mut [u8]);

const DEFAULT: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

impl VertexFormat {
    pub fn byte_size(self) -> usize {
        match self {
            VertexFormat::Float32x1 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
            VertexFormat::Float16x2 => 4,
            VertexFormat::Float16x4 => 8,
            VertexFormat::Unorm8x4 | VertexFormat::Bgra8Unorm | VertexFormat::Uint8x4 => 4,
            VertexFormat::Snorm16x2 | VertexFormat::Unorm16x2 | VertexFormat::Sint16x2 => 4,
            VertexFormat::Snorm16x4 | VertexFormat::Unorm16x4 | VertexFormat::Sint16x4 => 8,
            VertexFormat::Uint32x1 => 4,
        }
    }

    pub(crate) fn fetch_fn(self) -> FetchFn {
        match self {
            VertexFormat::Float32x1 => fetch_f32::<1>,
            VertexFormat::Float32x2 => fetch_f32::<2>,
            VertexFormat::Float32x3 => fetch_f32::<3>,
            VertexFormat::Float32x4 => fetch_f32::<4>,
            VertexFormat::Float16x2 => fetch_f16::<2>,
            VertexFormat::Float16x4 => fetch_f16::<4>,
            VertexFormat::Unorm8x4 => fetch_unorm8x4,
            VertexFormat::Bgra8Unorm => fetch_bgra8,
            VertexFormat::Uint8x4 => fetch_uint8x4,
            VertexFormat::Snorm16x2 => fetch_snorm16::<2>,
            VertexFormat::Snorm16x4 => fetch_snorm16::<4>,
            VertexFormat::Unorm16x2 => fetch_unorm16::<2>,
            VertexFormat::Unorm16x4 => fetch_unorm16::<4>,
            VertexFormat::Sint16x2 => fetch_sint16::<2>,
            VertexFormat::Sint16x4 => fetch_sint16::<4>,
            VertexFormat::Uint32x1 => fetch_uint32,
        }
    }

    /// Decode one attribute. `src` must hold at least [`Self::byte_size`] bytes.
    pub fn fetch(self, src: &[u8]) -> [f32; 4] {
        (self.fetch_fn())(src)
    }
}

/// Destination formats written by translate programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Float32x1,
    Float32x2,
    Float32x3,
    Float32x4,
    /// Packed bytes in B, G, R, A order.
    Bgra8Unorm,
}

impl OutputFormat {
    pub fn byte_size(self) -> usize {
        match self {
            OutputFormat::Float32x1 | OutputFormat::Bgra8Unorm => 4,
            OutputFormat::Float32x2 => 8,
            OutputFormat::Float32x3 => 12,
            OutputFormat::Float32x4 => 16,
        }
    }

    pub(crate) fn emit_fn(self) -> EmitFn {
        match self {
            OutputFormat::Float32x1 => emit_f32::<1>,
            OutputFormat::Float32x2 => emit_f32::<2>,
            OutputFormat::Float32x3 => emit_f32::<3>,
            OutputFormat::Float32x4 => emit_f32::<4>,
            OutputFormat::Bgra8Unorm => emit_bgra8,
        }
    }

    pub fn emit(self, value: &[f32; 4], dst: &mut [u8]) {
        (self.emit_fn())(value, dst)
    }
}

#[inline]
fn read_u16(src: &[u8], i: usize) -> u16 {
    u16::from_le_bytes([src[i * 2], src[i * 2 + 1]])
}

#[inline]
fn read_u32(src: &[u8], i: usize) -> u32 {
    let o = i * 4;
    u32::from_le_bytes([src[o], src[o + 1], src[o + 2], src[o + 3]])
}

fn fetch_f32<const N: usize>(src: &[u8]) -> [f32; 4] {
    let mut out = DEFAULT;
    for (i, v) in out.iter_mut().take(N).enumerate() {
        *v = f32::from_bits(read_u32(src, i));
    }
    out
}

fn fetch_f16<const N: usize>(src: &[u8]) -> [f32; 4] {
    let mut out = DEFAULT;
    for (i, v) in out.iter_mut().take(N).enumerate() {
        *v = f16::from_bits(read_u16(src, i)).to_f32();
    }
    out
}

fn fetch_unorm8x4(src: &[u8]) -> [f32; 4] {
    [
        f32::from(src[0]) / 255.0,
        f32::from(src[1]) / 255.0,
        f32::from(src[2]) / 255.0,
        f32::from(src[3]) / 255.0,
    ]
}

fn fetch_bgra8(src: &[u8]) -> [f32; 4] {
    [
        f32::from(src[2]) / 255.0,
        f32::from(src[1]) / 255.0,
        f32::from(src[0]) / 255.0,
        f32::from(src[3]) / 255.0,
    ]
}

fn fetch_uint8x4(src: &[u8]) -> [f32; 4] {
    [
        f32::from(src[0]),
        f32::from(src[1]),
        f32::from(src[2]),
        f32::from(src[3]),
    ]
}

fn fetch_snorm16<const N: usize>(src: &[u8]) -> [f32; 4] {
    let mut out = DEFAULT;
    for (i, v) in out.iter_mut().take(N).enumerate() {
        let raw = read_u16(src, i) as i16;
        *v = (f32::from(raw) / 32767.0).max(-1.0);
    }
    out
}

fn fetch_unorm16<const N: usize>(src: &[u8]) -> [f32; 4] {
    let mut out = DEFAULT;
    for (i, v) in out.iter_mut().take(N).enumerate() {
        *v = f32::from(read_u16(src, i)) / 65535.0;
    }
    out
}

fn fetch_sint16<const N: usize>(src: &[u8]) -> [f32; 4] {
    let mut out = DEFAULT;
    for (i, v) in out.iter_mut().take(N).enumerate() {
        *v = f32::from(read_u16(src, i) as i16);
    }
    out
}

fn fetch_uint32(src: &[u8]) -> [f32; 4] {
    let mut out = DEFAULT;
    out[0] = read_u32(src, 0) as f32;
    out
}

fn emit_f32<const N: usize>(value: &[f32; 4], dst: &mut [u8]) {
    for (i, v) in value.iter().take(N).enumerate() {
        dst[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
    }
}

/// Clamp to `[0, 1]` and scale to a byte, rounding to nearest.
#[inline]
pub(crate) fn float_to_ubyte(v: f32) -> u8 {
    // NaN falls through `clamp` unchanged and `as u8` maps it to 0.
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

fn emit_bgra8(value: &[f32; 4], dst: &mut [u8]) {
    dst[0] = float_to_ubyte(value[2]);
    dst[1] = float_to_ubyte(value[1]);
    dst[2] = float_to_ubyte(value[0]);
    dst[3] = float_to_ubyte(value[3]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_components_default_to_zero_zero_zero_one() {
        let bytes = 2.5f32.to_le_bytes();
        assert_eq!(VertexFormat::Float32x1.fetch(&bytes), [2.5, 0.0, 0.0, 1.0]);

        let mut two = Vec::new();
        two.extend_from_slice(&f16::from_f32(0.5).to_bits().to_le_bytes());
        two.extend_from_slice(&f16::from_f32(-2.0).to_bits().to_le_bytes());
        assert_eq!(VertexFormat::Float16x2.fetch(&two), [0.5, -2.0, 0.0, 1.0]);
    }

    #[test]
    fn byte_formats_normalize_and_swizzle() {
        let bgra = [0u8, 51, 255, 255];
        assert_eq!(VertexFormat::Bgra8Unorm.fetch(&bgra), [1.0, 0.2, 0.0, 1.0]);
        assert_eq!(VertexFormat::Unorm8x4.fetch(&bgra), [0.0, 0.2, 1.0, 1.0]);
        assert_eq!(VertexFormat::Uint8x4.fetch(&bgra), [0.0, 51.0, 255.0, 255.0]);
    }

    #[test]
    fn short_formats() {
        let mut src = Vec::new();
        for v in [i16::MIN, i16::MAX] {
            src.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(VertexFormat::Snorm16x2.fetch(&src), [-1.0, 1.0, 0.0, 1.0]);
        assert_eq!(VertexFormat::Sint16x2.fetch(&src), [-32768.0, 32767.0, 0.0, 1.0]);
        assert_eq!(
            VertexFormat::Unorm16x2.fetch(&src),
            [32768.0 / 65535.0, 32767.0 / 65535.0, 0.0, 1.0]
        );
    }

    #[test]
    fn bgra8_output_clamps_and_rounds() {
        let mut dst = [0u8; 4];
        OutputFormat::Bgra8Unorm.emit(&[1.5, 0.5, -1.0, f32::NAN], &mut dst);
        assert_eq!(dst, [0, 128, 255, 0]);
    }

    #[test]
    fn float_outputs_write_little_endian() {
        let mut dst = [0u8; 8];
        OutputFormat::Float32x2.emit(&[1.0, -1.0, 9.0, 9.0], &mut dst);
        assert_eq!(&dst[..4], &1.0f32.to_le_bytes());
        assert_eq!(&dst[4..], &(-1.0f32).to_le_bytes());
    }
}
