//! # kinz - depth camera capture, alignment and point clouds
//!
//! Session layer over a depth camera SDK. Provides:
//! - Device open with capability flags, calibration and transformation setup
//! - Capture cycles with per-modality validity and IMU sampling
//! - Frame extraction into planar, column-major buffers
//! - Depth/color alignment and point cloud reconstruction
//! - C FFI for integration with numeric hosts
//!
//! ## Quick Start
//! ```no_run
//! use kinz::sim::{SimCapture, SimSdk};
//! use kinz::{Flags, Session, SessionConfig};
//!
//! let mut sdk = SimSdk::new();
//! let feed = sdk.attach("000123456789");
//!
//! let mut session = Session::open(
//!     &sdk,
//!     Flags::C720 | Flags::D_BINNED,
//!     SessionConfig::from_env(),
//! )
//! .unwrap();
//! feed.push(SimCapture::synthetic(session.calibration(), 1000, 0).unwrap());
//!
//! let report = session.acquire(Flags::IMAGES);
//! if report.all_valid {
//!     let depth = session.depth().unwrap();
//!     println!("depth {}x{}", depth.width, depth.height);
//! }
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod calibration;
pub mod image;
pub mod sdk;
pub mod layout;
pub mod transform;
pub mod session;
pub mod capture;
pub mod extract;
pub mod align;
pub mod point_cloud;
pub mod sim;
pub mod usb;
pub mod ffi;

pub use error::{Diagnostic, DiagnosticKind, ErrorKind, KinzError};
pub use types::*;
pub use config::{ModalityPolicy, SessionConfig};
pub use calibration::Calibration;
pub use image::{Capture, Image, ImageFormat};
pub use sdk::{DepthSdk, DeviceHandle, Transformation, WaitResult};
pub use session::{ImuStatus, Session};
pub use capture::{CycleReport, FrameStatus, InertialReading, Validity};
pub use extract::{Plane16, RgbPlanes};
pub use point_cloud::{CloudFill, PointCloud};

/// Result type alias for kinz operations.
pub type Result<T> = std::result::Result<T, KinzError>;
