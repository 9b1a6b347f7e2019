//! Depth to 3D reconstruction.
//!
//! Output planes are in the depth sensor's native scan order
//! (`i = y * width + x`), not the column-major order used by frame
//! extraction. Callers index the two differently.

use crate::align;
use crate::image::{Image, ImageFormat};
use crate::layout::{self, Geometry};
use crate::sdk::Transformation;
use crate::session::Session;
use crate::types::Modality;
use crate::{KinzError, Result};

/// Per-pixel X, Y, Z in millimeters (depth camera frame), optionally with RGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointCloud {
    pub width: u32,
    pub height: u32,
    /// X plane, then Y plane, then Z plane.
    pub points: Vec<i16>,
    /// R, G, B planes co-indexed with `points`; `None` if not requested or
    /// color alignment failed.
    pub colors: Option<Vec<u8>>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point `i` in scan order.
    pub fn point(&self, i: usize) -> [i16; 3] {
        let n = self.len();
        [self.points[i], self.points[n + i], self.points[2 * n + i]]
    }
}

/// What a successful [`Session::point_cloud_into`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloudFill {
    /// True if the color planes were written.
    pub colored: bool,
}

fn reconstruction_error(e: KinzError) -> KinzError {
    match e {
        KinzError::Reconstruction(_) => e,
        other => KinzError::Reconstruction(other.to_string()),
    }
}

/// Compute the packed XYZ image for `depth`.
pub fn depth_to_xyz(transformation: &dyn Transformation, depth: &Image) -> Result<Image> {
    let mut xyz = Image::create(ImageFormat::PointCloudXyz16, depth.width(), depth.height())
        .map_err(reconstruction_error)?;
    transformation
        .depth_to_point_cloud(depth, &mut xyz)
        .map_err(reconstruction_error)?;
    Ok(xyz)
}

impl Session {
    /// Colors resampled onto the depth grid, or `None` when unavailable.
    fn cloud_colors(&self, depth: &Image) -> Option<Image> {
        let Some(color) = self.frames.color() else {
            log::debug!("No color frame held, point cloud will be uncolored");
            return None;
        };
        match align::color_to_depth(self.transformation.as_ref(), depth, color) {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("Point cloud color unavailable: {}", e);
                None
            }
        }
    }

    /// Reconstruct the current depth frame as a point cloud.
    pub fn point_cloud(&self, with_color: bool) -> Result<PointCloud> {
        let depth = self
            .frames
            .depth()
            .ok_or(KinzError::FrameUnavailable(Modality::Depth))?;
        let xyz = depth_to_xyz(self.transformation.as_ref(), depth)?;

        let geom = Geometry::new(xyz.width(), xyz.height(), xyz.stride());
        let mut points = vec![0i16; 3 * geom.pixel_count()];
        layout::xyz_to_planes_pixel_order(xyz.buffer(), geom, &mut points)
            .map_err(reconstruction_error)?;

        let colors = if with_color {
            self.cloud_colors(depth).and_then(|color| {
                let geom = Geometry::new(color.width(), color.height(), color.stride());
                let mut rgb = vec![0u8; 3 * geom.pixel_count()];
                layout::bgra_to_rgb_pixel_order(color.buffer(), geom, &mut rgb)
                    .ok()
                    .map(|_| rgb)
            })
        } else {
            None
        };

        Ok(PointCloud {
            width: xyz.width(),
            height: xyz.height(),
            points,
            colors,
        })
    }

    /// Reconstruct into caller buffers of `3 * depth pixels` each.
    ///
    /// `Ok(None)` if no depth frame is held. Mis-sized buffers are rejected
    /// before anything is written. On reconstruction failure the
    /// first three point entries are zeroed and nothing else is written.
    /// A color failure leaves `colors` untouched and reports `colored: false`.
    pub fn point_cloud_into(
        &self,
        with_color: bool,
        points: &mut [i16],
        colors: Option<&mut [u8]>,
    ) -> Result<Option<CloudFill>> {
        let Some(depth) = self.frames.depth() else {
            return Ok(None);
        };
        layout::check_len(3 * depth.pixel_count(), points.len())?;
        if let (true, Some(out)) = (with_color, colors.as_deref()) {
            layout::check_len(3 * depth.pixel_count(), out.len())?;
        }

        let xyz = match depth_to_xyz(self.transformation.as_ref(), depth) {
            Ok(xyz) => xyz,
            Err(e) => {
                log::warn!("Error getting point cloud: {}", e);
                let header = points.len().min(3);
                points[..header].fill(0);
                return Err(e);
            }
        };
        let geom = Geometry::new(xyz.width(), xyz.height(), xyz.stride());
        layout::xyz_to_planes_pixel_order(xyz.buffer(), geom, points)?;

        let mut colored = false;
        if let (true, Some(out)) = (with_color, colors) {
            if let Some(color) = self.cloud_colors(depth) {
                let geom = Geometry::new(color.width(), color.height(), color.stride());
                layout::bgra_to_rgb_pixel_order(color.buffer(), geom, out)?;
                colored = true;
            }
        }
        Ok(Some(CloudFill { colored }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::error::ErrorKind;
    use crate::sim::{SimCapture, SimFeed, SimSdk};
    use crate::types::Flags;

    fn session(flags: Flags, capture: impl FnOnce(SimCapture) -> SimCapture) -> (Session, SimFeed) {
        let mut sdk = SimSdk::new();
        let feed = sdk.attach("PC001");
        let mut session = Session::open(&sdk, flags, SessionConfig::default()).unwrap();
        feed.push(capture(
            SimCapture::synthetic(session.calibration(), 1000, 5).unwrap(),
        ));
        session.acquire(Flags::IMAGES);
        (session, feed)
    }

    #[test]
    fn test_sizes_without_color() {
        let (session, _feed) = session(Flags::C720 | Flags::D_BINNED, |c| c);
        let cloud = session.point_cloud(false).unwrap();
        assert_eq!(cloud.len(), 320 * 288);
        assert_eq!(cloud.points.len(), 3 * 320 * 288);
        assert!(cloud.colors.is_none());
        // Every pixel has depth, so every Z is 1000 mm
        assert!(cloud.points[2 * cloud.len()..].iter().all(|&z| z == 1000));
    }

    #[test]
    fn test_scan_order() {
        let (session, _feed) = session(Flags::C720 | Flags::D_BINNED, |c| c);
        let cloud = session.point_cloud(false).unwrap();
        let k = session.calibration().depth_camera.intrinsics;
        // Pixel (x=10, y=3) sits at index 3 * 320 + 10
        let [x, y, z] = cloud.point(3 * 320 + 10);
        assert_eq!(z, 1000);
        assert_eq!(x, ((10.0 - k.cx) * 1000.0 / k.fx).round() as i16);
        assert_eq!(y, ((3.0 - k.cy) * 1000.0 / k.fy).round() as i16);
    }

    #[test]
    fn test_with_color() {
        let (session, _feed) = session(Flags::C720 | Flags::D_BINNED, |c| c);
        let cloud = session.point_cloud(true).unwrap();
        let colors = cloud.colors.unwrap();
        assert_eq!(colors.len(), 3 * 320 * 288);
        assert!(colors.iter().any(|&c| c != 0));
    }

    #[test]
    fn test_color_failure_keeps_geometry() {
        let flags = Flags::C720 | Flags::D_BINNED;
        let (session, _feed) = session(flags, |c| c.without(Modality::Color));
        let n = 320 * 288;
        let mut points = vec![0i16; 3 * n];
        let mut colors = vec![9u8; 3 * n];
        let fill = session
            .point_cloud_into(true, &mut points, Some(&mut colors))
            .unwrap()
            .unwrap();
        assert!(!fill.colored);
        assert!(colors.iter().all(|&c| c == 9));
        assert!(points[2 * n..].iter().all(|&z| z == 1000));
    }

    #[test]
    fn test_missized_colors_leave_points_untouched() {
        let (session, _feed) = session(Flags::C720 | Flags::D_BINNED, |c| c);
        let n = 320 * 288;
        let mut points = vec![7i16; 3 * n];
        let mut colors = vec![9u8; 3 * n - 1];
        let err = session
            .point_cloud_into(true, &mut points, Some(&mut colors))
            .unwrap_err();
        assert!(matches!(
            err,
            KinzError::BufferSize {
                expected,
                actual
            } if expected == 3 * n && actual == 3 * n - 1
        ));
        assert!(points.iter().all(|&p| p == 7));
        assert!(colors.iter().all(|&c| c == 9));

        // Without color requested the colors buffer is not inspected
        assert!(session
            .point_cloud_into(false, &mut points, Some(&mut colors))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_transform_failure_zeroes_header() {
        let (session, feed) = session(Flags::C720 | Flags::D_BINNED, |c| c);
        feed.set_transform_failure(true);
        let n = 320 * 288;
        let mut points = vec![5i16; 3 * n];
        let err = session
            .point_cloud_into(false, &mut points, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReconstructionFailure);
        assert_eq!(&points[..4], &[0, 0, 0, 5]);
        assert!(session.point_cloud(false).is_err());
    }

    #[test]
    fn test_no_depth_frame() {
        let (session, _feed) = session(Flags::C720, |c| c.without(Modality::Depth));
        assert!(matches!(
            session.point_cloud(false),
            Err(KinzError::FrameUnavailable(Modality::Depth))
        ));
        let mut points = vec![0i16; 3];
        assert_eq!(session.point_cloud_into(false, &mut points, None).unwrap(), None);
    }
}
