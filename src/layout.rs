//! Byte-level unpacking of frame buffers into caller-facing planes.
//!
//! Two traversal conventions coexist and must not be unified:
//! - *column-major* (image extraction): element `k = x * height + y`, the
//!   layout a column-major numeric array expects for an `height x width` image.
//! - *pixel order* (point clouds): element `i = y * width + x`, the sensor's
//!   native scan order.
//!
//! Multi-channel outputs are planar: plane `c` occupies `[c * n, (c + 1) * n)`
//! where `n = width * height`.

use crate::{KinzError, Result};

/// Geometry of a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: usize,
    pub height: usize,
    /// Bytes per row, including padding.
    pub stride: usize,
}

impl Geometry {
    pub fn new(width: u32, height: u32, stride: u32) -> Self {
        Geometry {
            width: width as usize,
            height: height as usize,
            stride: stride as usize,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    fn check_source(&self, src: &[u8], bytes_per_pixel: usize) -> Result<()> {
        if self.stride < self.width * bytes_per_pixel {
            return Err(KinzError::InvalidImage(format!(
                "stride {} below {} bytes per row",
                self.stride,
                self.width * bytes_per_pixel
            )));
        }
        let needed = self.stride * self.height;
        if src.len() < needed {
            return Err(KinzError::BufferSize {
                expected: needed,
                actual: src.len(),
            });
        }
        Ok(())
    }
}

pub(crate) fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(KinzError::BufferSize { expected, actual });
    }
    Ok(())
}

/// BGRA pixels into R, G, B planes, column-major. Alpha is dropped.
pub fn bgra_to_rgb_column_major(src: &[u8], geom: Geometry, out: &mut [u8]) -> Result<()> {
    geom.check_source(src, 4)?;
    let n = geom.pixel_count();
    check_len(3 * n, out.len())?;

    let (r, rest) = out.split_at_mut(n);
    let (g, b) = rest.split_at_mut(n);
    let mut k = 0;
    for x in 0..geom.width {
        for y in 0..geom.height {
            let idx = y * geom.stride + x * 4;
            b[k] = src[idx];
            g[k] = src[idx + 1];
            r[k] = src[idx + 2];
            k += 1;
        }
    }
    Ok(())
}

/// Little-endian 16-bit pixels into one column-major plane.
pub fn le16_column_major(src: &[u8], geom: Geometry, out: &mut [u16]) -> Result<()> {
    geom.check_source(src, 2)?;
    check_len(geom.pixel_count(), out.len())?;

    let mut k = 0;
    for x in 0..geom.width {
        for y in 0..geom.height {
            let idx = y * geom.stride + x * 2;
            let lsb = src[idx] as u16;
            let msb = src[idx + 1] as u16;
            out[k] = msb * 256 + lsb;
            k += 1;
        }
    }
    Ok(())
}

/// Packed i16 X, Y, Z triples into X, Y, Z planes, pixel order.
pub fn xyz_to_planes_pixel_order(src: &[u8], geom: Geometry, out: &mut [i16]) -> Result<()> {
    geom.check_source(src, 6)?;
    let n = geom.pixel_count();
    check_len(3 * n, out.len())?;

    for y in 0..geom.height {
        let row = &src[y * geom.stride..];
        for x in 0..geom.width {
            let i = y * geom.width + x;
            let px = &row[x * 6..x * 6 + 6];
            out[i] = i16::from_le_bytes([px[0], px[1]]);
            out[n + i] = i16::from_le_bytes([px[2], px[3]]);
            out[2 * n + i] = i16::from_le_bytes([px[4], px[5]]);
        }
    }
    Ok(())
}

/// BGRA pixels into R, G, B planes, pixel order.
pub fn bgra_to_rgb_pixel_order(src: &[u8], geom: Geometry, out: &mut [u8]) -> Result<()> {
    geom.check_source(src, 4)?;
    let n = geom.pixel_count();
    check_len(3 * n, out.len())?;

    for y in 0..geom.height {
        let row = &src[y * geom.stride..];
        for x in 0..geom.width {
            let i = y * geom.width + x;
            let px = &row[x * 4..x * 4 + 4];
            out[i] = px[2];
            out[n + i] = px[1];
            out[2 * n + i] = px[0];
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra_column_major_2x2() {
        // Row 0: (0,0) (1,0); row 1: (0,1) (1,1)
        #[rustfmt::skip]
        let src = [
            10, 20, 30, 0,   11, 21, 31, 0,
            12, 22, 32, 0,   13, 23, 33, 0,
        ];
        let mut out = [0u8; 12];
        bgra_to_rgb_column_major(&src, Geometry::new(2, 2, 8), &mut out).unwrap();
        // Column x=0 first: (0,0), (0,1); then x=1: (1,0), (1,1)
        assert_eq!(&out[0..4], &[30, 32, 31, 33]);
        assert_eq!(&out[4..8], &[20, 22, 21, 23]);
        assert_eq!(&out[8..12], &[10, 12, 11, 13]);
    }

    #[test]
    fn test_le16_reconstruction() {
        let src = [0x34, 0x12];
        let mut out = [0u16; 1];
        le16_column_major(&src, Geometry::new(1, 1, 2), &mut out).unwrap();
        assert_eq!(out[0], 0x1234);
        assert_eq!(out[0], 4660);
    }

    #[test]
    fn test_le16_column_major_skips_padding() {
        // 3x2 image, stride 8 (2 bytes padding per row)
        #[rustfmt::skip]
        let src = [
            1, 0, 2, 0, 3, 0, 0xff, 0xff,
            4, 0, 5, 0, 6, 0, 0xff, 0xff,
        ];
        let mut out = [0u16; 6];
        le16_column_major(&src, Geometry::new(3, 2, 8), &mut out).unwrap();
        assert_eq!(out, [1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_xyz_pixel_order() {
        let mut src = Vec::new();
        for v in [[1i16, 2, 3], [-4, 5, 600]] {
            for c in v {
                src.extend_from_slice(&c.to_le_bytes());
            }
        }
        let mut out = [0i16; 6];
        xyz_to_planes_pixel_order(&src, Geometry::new(2, 1, 12), &mut out).unwrap();
        assert_eq!(out, [1, -4, 2, 5, 3, 600]);
    }

    #[test]
    fn test_bgra_pixel_order_differs_from_column_major() {
        #[rustfmt::skip]
        let src = [
            1, 0, 0, 0,   2, 0, 0, 0,
            3, 0, 0, 0,   4, 0, 0, 0,
        ];
        let geom = Geometry::new(2, 2, 8);
        let mut pixel = [0u8; 12];
        let mut column = [0u8; 12];
        bgra_to_rgb_pixel_order(&src, geom, &mut pixel).unwrap();
        bgra_to_rgb_column_major(&src, geom, &mut column).unwrap();
        assert_eq!(&pixel[8..12], &[1, 2, 3, 4]);
        assert_eq!(&column[8..12], &[1, 3, 2, 4]);
    }

    #[test]
    fn test_output_size_mismatch() {
        let src = [0u8; 8];
        let mut out = [0u16; 3];
        assert!(matches!(
            le16_column_major(&src, Geometry::new(2, 2, 4), &mut out),
            Err(KinzError::BufferSize {
                expected: 4,
                actual: 3
            })
        ));
    }
}
