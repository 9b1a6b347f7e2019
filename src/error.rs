use crate::types::Modality;
use std::fmt;

/// Errors that can occur while driving a depth camera session.
#[derive(Debug, thiserror::Error)]
pub enum KinzError {
    #[error("No depth camera found")]
    DeviceNotFound,

    #[error("Failed to open device: {0}")]
    DeviceOpen(String),

    #[error("Failed to get calibration: {0}")]
    Calibration(String),

    #[error("Failed to create transformation: {0}")]
    Transformation(String),

    #[error("Failed to start cameras: {0}")]
    CameraStart(String),

    #[error("Failed to start IMU: {0}")]
    ImuStart(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("No {0} frame held by the current capture")]
    FrameUnavailable(Modality),

    #[error("Failed to allocate {width}x{height} image ({bytes} bytes)")]
    Allocation { width: u32, height: u32, bytes: usize },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Alignment failed: {0}")]
    Alignment(String),

    #[error("Point cloud reconstruction failed: {0}")]
    Reconstruction(String),

    #[error("Output buffer has {actual} elements, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("No depth camera backend installed")]
    BackendNotInstalled,

    #[cfg(feature = "usb")]
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

/// Coarse classification of a [`KinzError`].
///
/// Only `DeviceUnavailable` and `ConfigurationError` are fatal to a session;
/// everything else degrades a single output for a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DeviceUnavailable,
    ConfigurationError,
    SoftCaptureFailure,
    AlignmentFailure,
    ReconstructionFailure,
    InertialSoftFailure,
    InvalidArgument,
}

impl KinzError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KinzError::DeviceNotFound | KinzError::DeviceOpen(_) | KinzError::BackendNotInstalled => {
                ErrorKind::DeviceUnavailable
            }
            KinzError::Calibration(_) | KinzError::Transformation(_) | KinzError::CameraStart(_) => {
                ErrorKind::ConfigurationError
            }
            KinzError::ImuStart(_) => ErrorKind::InertialSoftFailure,
            KinzError::CaptureFailed(_) | KinzError::FrameUnavailable(_) => {
                ErrorKind::SoftCaptureFailure
            }
            KinzError::Allocation { .. } | KinzError::Alignment(_) => ErrorKind::AlignmentFailure,
            KinzError::Reconstruction(_) => ErrorKind::ReconstructionFailure,
            KinzError::InvalidImage(_) | KinzError::BufferSize { .. } => ErrorKind::InvalidArgument,
            #[cfg(feature = "usb")]
            KinzError::Usb(_) => ErrorKind::DeviceUnavailable,
        }
    }

    /// True if the error leaves the session unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::DeviceUnavailable | ErrorKind::ConfigurationError
        )
    }
}

/// What went wrong during one acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    CaptureTimeout,
    CaptureFailed,
    FrameMissing(Modality),
    InertialTimeout,
    InertialFailed,
}

/// A soft condition recorded during a cycle, in place of console output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub(crate) fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &impl fmt::Display) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(KinzError::DeviceNotFound.is_fatal());
        assert!(KinzError::CameraStart("usb".into()).is_fatal());
        assert!(!KinzError::CaptureFailed("timeout".into()).is_fatal());
        assert!(!KinzError::ImuStart("busy".into()).is_fatal());
        assert_eq!(
            KinzError::FrameUnavailable(Modality::Depth).kind(),
            ErrorKind::SoftCaptureFailure
        );
        assert_eq!(
            KinzError::Reconstruction("xyz".into()).kind(),
            ErrorKind::ReconstructionFailure
        );
    }

    #[test]
    fn test_last_error_is_nul_terminated() {
        let slot = LastError::new();
        assert!(slot.as_ptr().is_null());
        slot.set(&KinzError::CaptureFailed("stalled".into()));
        let text = unsafe { std::ffi::CStr::from_ptr(slot.as_ptr()) };
        assert_eq!(text.to_str().unwrap(), "Capture failed: stalled");
        slot.clear();
        assert!(slot.as_ptr().is_null());
    }
}
