//! Depth/color alignment.
//!
//! Aligned frames are transient: they are created per call, owned by the
//! caller and never retained by the session.

use crate::calibration::Calibration;
use crate::extract::{self, Plane16, RgbPlanes};
use crate::image::{Image, ImageFormat};
use crate::sdk::Transformation;
use crate::session::Session;
use crate::types::Modality;
use crate::{KinzError, Result};

fn alignment_error(e: KinzError) -> KinzError {
    match e {
        KinzError::Allocation { .. } | KinzError::Alignment(_) => e,
        other => KinzError::Alignment(other.to_string()),
    }
}

/// Reproject `depth` onto the color camera grid.
pub fn depth_to_color(
    transformation: &dyn Transformation,
    calibration: &Calibration,
    depth: &Image,
) -> Result<Image> {
    let color = &calibration.color_camera;
    if !color.is_enabled() {
        return Err(KinzError::Alignment("color camera is disabled".into()));
    }
    let mut out =
        Image::create(ImageFormat::Depth16, color.width, color.height).map_err(alignment_error)?;
    transformation
        .depth_to_color(depth, &mut out)
        .map_err(alignment_error)?;
    Ok(out)
}

/// Resample `color` onto the depth camera grid, positioned by `depth`.
pub fn color_to_depth(
    transformation: &dyn Transformation,
    depth: &Image,
    color: &Image,
) -> Result<Image> {
    let mut out = Image::create(ImageFormat::ColorBgra32, depth.width(), depth.height())
        .map_err(alignment_error)?;
    transformation
        .color_to_depth(depth, color, &mut out)
        .map_err(alignment_error)?;
    Ok(out)
}

impl Session {
    /// Depth frame of the current cycle reprojected onto the color grid.
    ///
    /// The result carries the color frame's timestamp, or the depth frame's
    /// if no color frame is held.
    pub fn align_depth_to_color(&self) -> Result<Image> {
        let depth = self
            .frames
            .depth()
            .ok_or(KinzError::FrameUnavailable(Modality::Depth))?;
        let ts = self.frames.color().unwrap_or(depth);
        let aligned = depth_to_color(self.transformation.as_ref(), self.calibration(), depth)
            .inspect_err(|e| log::warn!("Failed to align depth to color: {}", e))?;
        Ok(aligned.with_timestamps(ts.system_timestamp_ns(), ts.device_timestamp_us()))
    }

    /// Color frame of the current cycle resampled onto the depth grid.
    pub fn align_color_to_depth(&self) -> Result<Image> {
        let depth = self
            .frames
            .depth()
            .ok_or(KinzError::FrameUnavailable(Modality::Depth))?;
        let color = self
            .frames
            .color()
            .ok_or(KinzError::FrameUnavailable(Modality::Color))?;
        let aligned = color_to_depth(self.transformation.as_ref(), depth, color)
            .inspect_err(|e| log::warn!("Failed to align color to depth: {}", e))?;
        Ok(aligned.with_timestamps(depth.system_timestamp_ns(), depth.device_timestamp_us()))
    }

    pub fn depth_aligned(&self) -> Result<Plane16> {
        extract::plane16(&self.align_depth_to_color()?)
    }

    pub fn color_aligned(&self) -> Result<RgbPlanes> {
        extract::color_planes(&self.align_color_to_depth()?)
    }

    /// Aligned depth into a buffer sized to the color grid.
    ///
    /// `Ok(None)` if the current cycle holds no depth frame.
    pub fn depth_aligned_into(&self, out: &mut [u16]) -> Result<Option<u64>> {
        if self.frames.depth().is_none() {
            return Ok(None);
        }
        let aligned = self.align_depth_to_color()?;
        extract::plane16_into(&aligned, out).map(Some)
    }

    /// Aligned color into a buffer sized to three depth-grid planes.
    ///
    /// `Ok(None)` if the current cycle lacks a depth or color frame.
    pub fn color_aligned_into(&self, out: &mut [u8]) -> Result<Option<u64>> {
        if self.frames.depth().is_none() || self.frames.color().is_none() {
            return Ok(None);
        }
        let aligned = self.align_color_to_depth()?;
        extract::color_planes_into(&aligned, out).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::error::ErrorKind;
    use crate::sim::{SimCapture, SimSdk};
    use crate::types::Flags;

    fn session_with_frame(flags: Flags) -> (Session, crate::sim::SimFeed) {
        let mut sdk = SimSdk::new();
        let feed = sdk.attach("AL001");
        let mut session = Session::open(&sdk, flags, SessionConfig::default()).unwrap();
        feed.push(
            SimCapture::synthetic(session.calibration(), 1500, 42_000)
                .unwrap()
                .without(Modality::Infrared),
        );
        let report = session.acquire(Flags::IMAGES);
        assert!(report.captured);
        (session, feed)
    }

    #[test]
    fn test_aligned_grids() {
        let (session, _feed) = session_with_frame(Flags::C720 | Flags::D_BINNED);

        let depth_on_color = session.align_depth_to_color().unwrap();
        assert_eq!((depth_on_color.width(), depth_on_color.height()), (1280, 720));
        assert_eq!(depth_on_color.format(), ImageFormat::Depth16);
        assert_eq!(depth_on_color.system_timestamp_ns(), 42_000);

        let color_on_depth = session.align_color_to_depth().unwrap();
        assert_eq!((color_on_depth.width(), color_on_depth.height()), (320, 288));
        assert_eq!(color_on_depth.format(), ImageFormat::ColorBgra32);

        let planes = session.color_aligned().unwrap();
        assert_eq!(planes.data.len(), 3 * 320 * 288);
        let depth = session.depth_aligned().unwrap();
        assert_eq!(depth.data.len(), 1280 * 720);
        assert!(depth.data.iter().any(|&d| d != 0));
    }

    #[test]
    fn test_transform_failure_is_soft() {
        let (session, feed) = session_with_frame(Flags::C720 | Flags::D_BINNED);
        feed.set_transform_failure(true);

        let err = session.align_depth_to_color().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlignmentFailure);
        let mut out = vec![0u8; 3 * 320 * 288];
        assert!(session.color_aligned_into(&mut out).is_err());

        // Plain extraction from the same cycle is unaffected
        assert!(session.depth().is_ok());
        assert!(session.color().is_ok());

        feed.set_transform_failure(false);
        assert!(session.align_depth_to_color().is_ok());
    }

    #[test]
    fn test_missing_frames() {
        let mut sdk = SimSdk::new();
        let feed = sdk.attach("AL002");
        let mut session = Session::open(&sdk, Flags::C720, SessionConfig::default()).unwrap();
        feed.push(
            SimCapture::synthetic(session.calibration(), 800, 1)
                .unwrap()
                .without(Modality::Color),
        );
        session.acquire(Flags::IMAGES);

        assert!(matches!(
            session.align_color_to_depth(),
            Err(KinzError::FrameUnavailable(Modality::Color))
        ));
        let mut out = vec![7u8; 3 * 640 * 576];
        assert_eq!(session.color_aligned_into(&mut out).unwrap(), None);
        assert!(out.iter().all(|&b| b == 7));

        // Depth-to-color only needs the color grid, not a color frame
        let aligned = session.align_depth_to_color().unwrap();
        assert_eq!((aligned.width(), aligned.height()), (1280, 720));
        assert_eq!(aligned.system_timestamp_ns(), 1);
    }

    #[test]
    fn test_color_disabled() {
        let (session, _feed) = session_with_frame(Flags::D_BINNED);
        assert!(matches!(
            session.align_depth_to_color(),
            Err(KinzError::Alignment(_))
        ));
    }
}
