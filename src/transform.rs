use crate::calibration::Calibration;
use crate::image::{Image, ImageFormat};
use crate::sdk::Transformation;
use crate::{KinzError, Result};

/// Pinhole reprojection between the depth and color cameras.
///
/// Invalid pixels (no depth, or projecting outside the target grid) are zero.
pub struct PinholeTransformation {
    calibration: Calibration,
}

impl PinholeTransformation {
    pub fn new(calibration: &Calibration) -> Result<Self> {
        if !calibration.depth_camera.is_enabled() {
            return Err(KinzError::Transformation(
                "depth camera calibration has an empty grid".into(),
            ));
        }
        Ok(PinholeTransformation {
            calibration: calibration.clone(),
        })
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    fn check_depth(&self, depth: &Image) -> Result<()> {
        depth.expect_format(ImageFormat::Depth16)?;
        let cam = &self.calibration.depth_camera;
        check_grid("depth", depth, cam.width, cam.height)
    }

    fn check_color_grid(&self, image: &Image) -> Result<()> {
        let cam = &self.calibration.color_camera;
        if !cam.is_enabled() {
            return Err(KinzError::Transformation("color camera is disabled".into()));
        }
        check_grid("color", image, cam.width, cam.height)
    }
}

fn check_grid(name: &str, image: &Image, width: u32, height: u32) -> Result<()> {
    if image.width() != width || image.height() != height {
        return Err(KinzError::Transformation(format!(
            "{} image is {}x{}, calibration expects {}x{}",
            name,
            image.width(),
            image.height(),
            width,
            height
        )));
    }
    Ok(())
}

fn pixel_index(x: f32, y: f32, width: u32, height: u32) -> Option<(u32, u32)> {
    let (u, v) = (x.round(), y.round());
    if u < 0.0 || v < 0.0 || u >= width as f32 || v >= height as f32 {
        return None;
    }
    Some((u as u32, v as u32))
}

impl Transformation for PinholeTransformation {
    fn depth_to_color(&self, depth: &Image, out: &mut Image) -> Result<()> {
        self.check_depth(depth)?;
        out.expect_format(ImageFormat::Depth16)?;
        self.check_color_grid(out)?;

        let depth_k = &self.calibration.depth_camera.intrinsics;
        let color = &self.calibration.color_camera;
        out.buffer_mut().fill(0);

        for y in 0..depth.height() {
            for x in 0..depth.width() {
                let d = depth.get_u16(x, y);
                if d == 0 {
                    continue;
                }
                let p_depth = depth_k.unproject(x as f32, y as f32, d as f32);
                let p_color = self.calibration.depth_to_color.apply(&p_depth);
                let Some(px) = color.intrinsics.project(&p_color) else {
                    continue;
                };
                let Some((u, v)) = pixel_index(px.x, px.y, color.width, color.height) else {
                    continue;
                };
                let z = p_color.z.round().clamp(1.0, u16::MAX as f32) as u16;
                // Nearest surface wins on collisions.
                let current = out.get_u16(u, v);
                if current == 0 || z < current {
                    out.set_u16(u, v, z);
                }
            }
        }
        Ok(())
    }

    fn color_to_depth(&self, depth: &Image, color: &Image, out: &mut Image) -> Result<()> {
        self.check_depth(depth)?;
        color.expect_format(ImageFormat::ColorBgra32)?;
        self.check_color_grid(color)?;
        out.expect_format(ImageFormat::ColorBgra32)?;
        check_grid("output", out, depth.width(), depth.height())?;

        let depth_k = &self.calibration.depth_camera.intrinsics;
        let color_cam = &self.calibration.color_camera;
        out.buffer_mut().fill(0);

        for y in 0..depth.height() {
            for x in 0..depth.width() {
                let d = depth.get_u16(x, y);
                if d == 0 {
                    continue;
                }
                let p_color = self
                    .calibration
                    .depth_to_color
                    .apply(&depth_k.unproject(x as f32, y as f32, d as f32));
                let Some(px) = color_cam.intrinsics.project(&p_color) else {
                    continue;
                };
                if let Some((u, v)) = pixel_index(px.x, px.y, color_cam.width, color_cam.height) {
                    out.set_bgra(x, y, color.get_bgra(u, v));
                }
            }
        }
        Ok(())
    }

    fn depth_to_point_cloud(&self, depth: &Image, out: &mut Image) -> Result<()> {
        self.check_depth(depth)?;
        out.expect_format(ImageFormat::PointCloudXyz16)?;
        check_grid("point cloud", out, depth.width(), depth.height())?;

        let k = &self.calibration.depth_camera.intrinsics;
        for y in 0..depth.height() {
            for x in 0..depth.width() {
                let d = depth.get_u16(x, y);
                let xyz = if d == 0 {
                    [0, 0, 0]
                } else {
                    let p = k.unproject(x as f32, y as f32, d as f32);
                    [to_i16(p.x), to_i16(p.y), to_i16(p.z)]
                };
                out.set_xyz(x, y, xyz);
            }
        }
        Ok(())
    }
}

fn to_i16(v: f32) -> i16 {
    v.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

impl std::fmt::Debug for PinholeTransformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinholeTransformation")
            .field("depth_mode", &self.calibration.depth_mode)
            .field("color_resolution", &self.calibration.color_resolution)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CameraCalibration, Intrinsics};
    use crate::types::{ColorResolution, DepthMode};

    /// Two co-located 4x4 cameras with identical intrinsics.
    fn colocated() -> Calibration {
        let cam = CameraCalibration {
            intrinsics: Intrinsics {
                fx: 2.0,
                fy: 2.0,
                cx: 1.5,
                cy: 1.5,
            },
            width: 4,
            height: 4,
        };
        Calibration {
            depth_mode: DepthMode::NfovBinned,
            color_resolution: ColorResolution::R720p,
            depth_camera: cam,
            color_camera: cam,
            depth_to_color: crate::calibration::Extrinsics::identity(),
        }
    }

    fn flat_depth(width: u32, height: u32, mm: u16) -> Image {
        let mut img = Image::create(ImageFormat::Depth16, width, height).unwrap();
        for y in 0..height {
            for x in 0..width {
                img.set_u16(x, y, mm);
            }
        }
        img
    }

    #[test]
    fn test_identity_depth_to_color() {
        let t = PinholeTransformation::new(&colocated()).unwrap();
        let depth = flat_depth(4, 4, 1000);
        let mut out = Image::create(ImageFormat::Depth16, 4, 4).unwrap();
        t.depth_to_color(&depth, &mut out).unwrap();
        assert_eq!(out, flat_depth(4, 4, 1000));
    }

    #[test]
    fn test_identity_color_to_depth_samples_same_pixel() {
        let t = PinholeTransformation::new(&colocated()).unwrap();
        let mut depth = flat_depth(4, 4, 500);
        depth.set_u16(0, 0, 0);
        let mut color = Image::create(ImageFormat::ColorBgra32, 4, 4).unwrap();
        color.set_bgra(2, 1, [1, 2, 3, 255]);
        let mut out = Image::create(ImageFormat::ColorBgra32, 4, 4).unwrap();
        t.color_to_depth(&depth, &color, &mut out).unwrap();
        assert_eq!(out.get_bgra(2, 1), [1, 2, 3, 255]);
        assert_eq!(out.get_bgra(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_point_cloud_center_ray() {
        let t = PinholeTransformation::new(&colocated()).unwrap();
        let mut depth = flat_depth(4, 4, 0);
        depth.set_u16(3, 1, 1000);
        let mut out = Image::create(ImageFormat::PointCloudXyz16, 4, 4).unwrap();
        t.depth_to_point_cloud(&depth, &mut out).unwrap();

        let px = &out.buffer()[(4 + 3) * 6..(4 + 3) * 6 + 6];
        let x = i16::from_le_bytes([px[0], px[1]]);
        let y = i16::from_le_bytes([px[2], px[3]]);
        let z = i16::from_le_bytes([px[4], px[5]]);
        // (3 - 1.5) * 1000 / 2 = 750, (1 - 1.5) * 1000 / 2 = -250
        assert_eq!((x, y, z), (750, -250, 1000));
        assert!(out.buffer()[..6].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wrong_grid_is_rejected() {
        let t = PinholeTransformation::new(&colocated()).unwrap();
        let depth = flat_depth(4, 4, 1000);
        let mut out = Image::create(ImageFormat::Depth16, 8, 8).unwrap();
        assert!(matches!(
            t.depth_to_color(&depth, &mut out),
            Err(KinzError::Transformation(_))
        ));
    }

    #[test]
    fn test_nominal_alignment_hits_color_grid() {
        let cal = Calibration::nominal(DepthMode::NfovBinned, ColorResolution::R720p);
        let t = PinholeTransformation::new(&cal).unwrap();
        let depth = flat_depth(320, 288, 2000);
        let mut out = Image::create(ImageFormat::Depth16, 1280, 720).unwrap();
        t.depth_to_color(&depth, &mut out).unwrap();
        let hits = (0..720u32)
            .flat_map(|y| (0..1280u32).map(move |x| (x, y)))
            .filter(|&(x, y)| out.get_u16(x, y) != 0)
            .count();
        assert!(hits > 0);
    }
}
