//! Camera intrinsics/extrinsics consumed by the transformation engine.
//!
//! Units are millimeters and pixels. The depth camera is the reference frame;
//! `depth_to_color` maps a depth-camera point into the color camera.

use crate::types::{ColorResolution, DepthMode};
use nalgebra::{Matrix3, Point2, Rotation3, Vector3};

/// Pinhole intrinsics in pixels.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl Intrinsics {
    /// Intrinsics for a centered principal point and the given field of view.
    pub fn from_fov(width: u32, height: u32, hfov_deg: f32, vfov_deg: f32) -> Self {
        let fx = width as f32 / 2.0 / (hfov_deg.to_radians() / 2.0).tan();
        let fy = height as f32 / 2.0 / (vfov_deg.to_radians() / 2.0).tan();
        Intrinsics {
            fx,
            fy,
            cx: (width as f32 - 1.0) / 2.0,
            cy: (height as f32 - 1.0) / 2.0,
        }
    }

    /// Point on the z = depth plane seen by pixel (u, v).
    pub fn unproject(&self, u: f32, v: f32, depth: f32) -> Vector3<f32> {
        Vector3::new(
            (u - self.cx) * depth / self.fx,
            (v - self.cy) * depth / self.fy,
            depth,
        )
    }

    /// Returns `None` for points on or behind the image plane.
    pub fn project(&self, p: &Vector3<f32>) -> Option<Point2<f32>> {
        if p.z <= 0.0 {
            return None;
        }
        Some(Point2::new(
            p.x / p.z * self.fx + self.cx,
            p.y / p.z * self.fy + self.cy,
        ))
    }
}

/// Rigid transform between two cameras.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrinsics {
    pub rotation: Matrix3<f32>,
    /// Translation in millimeters.
    pub translation: Vector3<f32>,
}

impl Extrinsics {
    pub fn identity() -> Self {
        Extrinsics {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn apply(&self, p: &Vector3<f32>) -> Vector3<f32> {
        self.rotation * p + self.translation
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.transpose();
        Extrinsics {
            rotation,
            translation: -(rotation * self.translation),
        }
    }
}

/// Intrinsics plus the sensor grid they apply to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraCalibration {
    pub intrinsics: Intrinsics,
    pub width: u32,
    pub height: u32,
}

impl CameraCalibration {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_enabled(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Full calibration for one (depth mode, color resolution) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub depth_mode: DepthMode,
    pub color_resolution: ColorResolution,
    pub depth_camera: CameraCalibration,
    /// Zero-sized when color is disabled.
    pub color_camera: CameraCalibration,
    pub depth_to_color: Extrinsics,
}

impl Calibration {
    /// Factory-nominal calibration: centered principal points, nominal fields
    /// of view, and the color camera about 32 mm beside the depth camera with
    /// the depth camera tilted 6 degrees down.
    pub fn nominal(depth_mode: DepthMode, color_resolution: ColorResolution) -> Self {
        let (dw, dh) = depth_mode.dims();
        let (dhfov, dvfov) = if depth_mode.is_wide() {
            (120.0, 120.0)
        } else {
            (75.0, 65.0)
        };

        let (cw, ch) = color_resolution.dims();
        let cvfov = if cw * 3 == ch * 4 { 74.3 } else { 59.0 };

        let rotation = Rotation3::from_euler_angles(6.0f32.to_radians(), 0.0, 0.0);
        Calibration {
            depth_mode,
            color_resolution,
            depth_camera: CameraCalibration {
                intrinsics: Intrinsics::from_fov(dw, dh, dhfov, dvfov),
                width: dw,
                height: dh,
            },
            color_camera: CameraCalibration {
                intrinsics: Intrinsics::from_fov(cw.max(1), ch.max(1), 90.0, cvfov),
                width: cw,
                height: ch,
            },
            depth_to_color: Extrinsics {
                rotation: *rotation.matrix(),
                translation: Vector3::new(-32.0, -2.0, 4.0),
            },
        }
    }
}
