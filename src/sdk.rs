//! The hardware SDK seam.
//!
//! Device enumeration, blocking capture calls, calibration retrieval and the
//! calibration-driven reprojection all live behind these traits. A vendor SDK
//! binding implements them; [`crate::sim`] provides an in-process device.

use crate::calibration::Calibration;
use crate::image::{Capture, Image};
use crate::types::{ColorResolution, DepthMode, DeviceConfig, ImuSample};
use crate::Result;
use std::time::Duration;

/// Outcome of a bounded-wait SDK call.
#[derive(Debug)]
pub enum WaitResult<T> {
    Ready(T),
    Timeout,
    Failed(String),
}

impl<T> WaitResult<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            WaitResult::Ready(v) => Some(v),
            _ => None,
        }
    }
}

/// Entry point of a depth camera SDK.
pub trait DepthSdk: Send + Sync {
    /// Number of attached devices.
    fn installed_count(&self) -> u32;

    /// Open the device at `index`. The returned handle closes the device on drop.
    fn open(&self, index: u32) -> Result<Box<dyn DeviceHandle>>;
}

/// An opened device.
pub trait DeviceHandle: Send {
    fn serial_number(&self) -> Result<String>;

    fn calibration(
        &self,
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
    ) -> Result<Calibration>;

    /// Build the reprojection context for a calibration.
    fn create_transformation(&self, calibration: &Calibration) -> Result<Box<dyn Transformation>>;

    fn start_cameras(&mut self, config: &DeviceConfig) -> Result<()>;

    fn stop_cameras(&mut self);

    fn start_imu(&mut self) -> Result<()>;

    fn stop_imu(&mut self);

    /// Block up to `timeout` for the next synchronized capture.
    fn get_capture(&mut self, timeout: Duration) -> WaitResult<Capture>;

    /// Block up to `timeout` for the next inertial sample.
    fn get_imu_sample(&mut self, timeout: Duration) -> WaitResult<ImuSample>;
}

/// Calibration-driven reprojection between the depth and color grids.
pub trait Transformation: Send {
    /// Reproject `depth` into `out`, a `Depth16` image on the color grid.
    fn depth_to_color(&self, depth: &Image, out: &mut Image) -> Result<()>;

    /// Resample `color` onto the depth grid into `out` (`ColorBgra32`),
    /// using `depth` for each pixel's position.
    fn color_to_depth(&self, depth: &Image, color: &Image, out: &mut Image) -> Result<()>;

    /// Write X, Y, Z per depth pixel into `out` (`PointCloudXyz16`).
    fn depth_to_point_cloud(&self, depth: &Image, out: &mut Image) -> Result<()>;
}
