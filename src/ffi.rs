//! C FFI layer for kinz.
//!
//! Provides an opaque handle-based API for host environments. Output arrays
//! are caller-allocated; use `kz_color_dims` / `kz_depth_dims` to size them.
//! The generated C header is written to `include/kinz.h` by cbindgen.
//!
//! The SDK backing `kz_open` is installed from Rust with [`install_backend`].

use crate::error::LastError;
use crate::sdk::DepthSdk;
use crate::session::Session;
use crate::types::Flags;
use crate::{KinzError, Result, SessionConfig};
use std::ffi::c_char;
use std::ffi::c_int;
use std::sync::Mutex;

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

static BACKEND: Mutex<Option<Box<dyn DepthSdk>>> = Mutex::new(None);

/// Install the SDK used by `kz_open`, returning the previous one.
pub fn install_backend(sdk: Box<dyn DepthSdk>) -> Option<Box<dyn DepthSdk>> {
    match BACKEND.lock() {
        Ok(mut backend) => backend.replace(sdk),
        Err(poisoned) => poisoned.into_inner().replace(sdk),
    }
}

/// Opaque session handle for C consumers.
pub struct KzSession(Session);

/// Inertial sample in C-compatible layout.
#[repr(C)]
pub struct KzImuSample {
    pub temperature: f32,
    pub accelerometer: [f32; 3],
    pub acc_timestamp_us: u64,
    pub gyroscope: [f32; 3],
    pub gyro_timestamp_us: u64,
    /// True if read during the last cycle that requested it.
    pub fresh: bool,
}

/// Calibration in C-compatible layout. Intrinsics are [fx, fy, cx, cy].
#[repr(C)]
pub struct KzCalibration {
    pub depth_mode: u32,
    pub color_resolution: u32,
    pub depth_width: u32,
    pub depth_height: u32,
    pub depth_intrinsics: [f32; 4],
    pub color_width: u32,
    pub color_height: u32,
    pub color_intrinsics: [f32; 4],
    /// Depth-to-color rotation, flat row-major (9 elements).
    pub rotation: [f32; 9],
    /// Depth-to-color translation in millimeters.
    pub translation: [f32; 3],
}

fn fail(e: &KinzError) -> c_int {
    LAST_ERROR.set(e);
    -1
}

/// 1 = valid (timestamp written), 0 = no frame this cycle, -1 = error.
unsafe fn report_frame(result: Result<Option<u64>>, timestamp: *mut u64) -> c_int {
    match result {
        Ok(Some(ts)) => {
            if !timestamp.is_null() {
                timestamp.write(ts);
            }
            1
        }
        Ok(None) => 0,
        Err(e) => fail(&e),
    }
}

unsafe fn out_slice<'a, T>(ptr: *mut T, len: usize) -> Option<&'a mut [T]> {
    if ptr.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts_mut(ptr, len))
    }
}

/// Open the first device with the given capability flags.
/// Returns NULL on error (check kz_last_error()).
#[no_mangle]
pub extern "C" fn kz_open(flags: u16) -> *mut KzSession {
    LAST_ERROR.clear();
    let backend = match BACKEND.lock() {
        Ok(backend) => backend,
        Err(poisoned) => poisoned.into_inner(),
    };
    let Some(sdk) = backend.as_deref() else {
        fail(&KinzError::BackendNotInstalled);
        return std::ptr::null_mut();
    };

    match Session::open(sdk, Flags::from_bits_truncate(flags), SessionConfig::from_env()) {
        Ok(session) => Box::into_raw(Box::new(KzSession(session))),
        Err(e) => {
            fail(&e);
            std::ptr::null_mut()
        }
    }
}

/// Close a session and free its resources.
///
/// # Safety
/// `session` must be a pointer returned by `kz_open`, or null.
#[no_mangle]
pub unsafe extern "C" fn kz_close(session: *mut KzSession) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Run one capture cycle. Returns the validity mask, or -1 on a null handle.
/// The first diagnostic of the cycle, if any, is readable via kz_last_error().
///
/// # Safety
/// `session` must be a valid session pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn kz_acquire(session: *mut KzSession, modalities: u16) -> c_int {
    if session.is_null() {
        return -1;
    }
    let session = &mut *session;
    let report = session.0.acquire(Flags::from_bits_truncate(modalities));
    match report.diagnostics.first() {
        Some(diag) => LAST_ERROR.set(diag),
        None => LAST_ERROR.clear(),
    }
    report.validity().bits() as c_int
}

/// Color grid size (0x0 if color is disabled).
///
/// # Safety
/// All pointers must be valid, or null.
#[no_mangle]
pub unsafe extern "C" fn kz_color_dims(
    session: *const KzSession,
    width: *mut u32,
    height: *mut u32,
) -> c_int {
    if session.is_null() || width.is_null() || height.is_null() {
        return -1;
    }
    let (w, h) = (*session).0.color_dims();
    width.write(w);
    height.write(h);
    0
}

/// Depth and IR grid size.
///
/// # Safety
/// All pointers must be valid, or null.
#[no_mangle]
pub unsafe extern "C" fn kz_depth_dims(
    session: *const KzSession,
    width: *mut u32,
    height: *mut u32,
) -> c_int {
    if session.is_null() || width.is_null() || height.is_null() {
        return -1;
    }
    let (w, h) = (*session).0.depth_dims();
    width.write(w);
    height.write(h);
    0
}

/// Copy the color frame as R, G, B column-major planes (`len = 3 * w * h`).
///
/// # Safety
/// `out` must point to `len` writable bytes; other pointers valid or null.
#[no_mangle]
pub unsafe extern "C" fn kz_get_color(
    session: *const KzSession,
    out: *mut u8,
    len: usize,
    timestamp: *mut u64,
) -> c_int {
    let (Some(session), Some(out)) = (session.as_ref(), out_slice(out, len)) else {
        return -1;
    };
    report_frame(session.0.color_into(out), timestamp)
}

/// Copy the depth frame (millimeters) column-major (`len = w * h`).
///
/// # Safety
/// `out` must point to `len` writable values; other pointers valid or null.
#[no_mangle]
pub unsafe extern "C" fn kz_get_depth(
    session: *const KzSession,
    out: *mut u16,
    len: usize,
    timestamp: *mut u64,
) -> c_int {
    let (Some(session), Some(out)) = (session.as_ref(), out_slice(out, len)) else {
        return -1;
    };
    report_frame(session.0.depth_into(out), timestamp)
}

/// Copy the IR frame column-major (`len = w * h`).
///
/// # Safety
/// `out` must point to `len` writable values; other pointers valid or null.
#[no_mangle]
pub unsafe extern "C" fn kz_get_infrared(
    session: *const KzSession,
    out: *mut u16,
    len: usize,
    timestamp: *mut u64,
) -> c_int {
    let (Some(session), Some(out)) = (session.as_ref(), out_slice(out, len)) else {
        return -1;
    };
    report_frame(session.0.infrared_into(out), timestamp)
}

/// Copy depth reprojected onto the color grid (`len = color w * h`).
///
/// # Safety
/// `out` must point to `len` writable values; other pointers valid or null.
#[no_mangle]
pub unsafe extern "C" fn kz_get_depth_aligned(
    session: *const KzSession,
    out: *mut u16,
    len: usize,
    timestamp: *mut u64,
) -> c_int {
    let (Some(session), Some(out)) = (session.as_ref(), out_slice(out, len)) else {
        return -1;
    };
    report_frame(session.0.depth_aligned_into(out), timestamp)
}

/// Copy color resampled onto the depth grid (`len = 3 * depth w * h`).
///
/// # Safety
/// `out` must point to `len` writable bytes; other pointers valid or null.
#[no_mangle]
pub unsafe extern "C" fn kz_get_color_aligned(
    session: *const KzSession,
    out: *mut u8,
    len: usize,
    timestamp: *mut u64,
) -> c_int {
    let (Some(session), Some(out)) = (session.as_ref(), out_slice(out, len)) else {
        return -1;
    };
    report_frame(session.0.color_aligned_into(out), timestamp)
}

/// Reconstruct the point cloud as X, Y, Z planes in scan order
/// (`points_len = 3 * depth w * h`), optionally with R, G, B planes.
/// `colored` receives whether the color planes were written.
/// Returns 1 = valid, 0 = no depth frame, -1 = error.
///
/// # Safety
/// `points` must point to `points_len` writable values; `colors` to
/// `colors_len` writable bytes or be null; other pointers valid or null.
#[no_mangle]
pub unsafe extern "C" fn kz_get_point_cloud(
    session: *const KzSession,
    want_color: bool,
    points: *mut i16,
    points_len: usize,
    colors: *mut u8,
    colors_len: usize,
    colored: *mut bool,
) -> c_int {
    let (Some(session), Some(points)) = (session.as_ref(), out_slice(points, points_len)) else {
        return -1;
    };
    let colors = out_slice(colors, colors_len);
    match session.0.point_cloud_into(want_color, points, colors) {
        Ok(Some(fill)) => {
            if !colored.is_null() {
                colored.write(fill.colored);
            }
            1
        }
        Ok(None) => 0,
        Err(e) => fail(&e),
    }
}

/// Latest inertial sample. Returns 0 on success, -1 on error.
///
/// # Safety
/// Both pointers must be valid, or null.
#[no_mangle]
pub unsafe extern "C" fn kz_get_imu(session: *const KzSession, out: *mut KzImuSample) -> c_int {
    let Some(session) = session.as_ref() else {
        return -1;
    };
    if out.is_null() {
        return -1;
    }
    let reading = session.0.inertial_sample();
    out.write(KzImuSample {
        temperature: reading.sample.temperature,
        accelerometer: reading.sample.accelerometer,
        acc_timestamp_us: reading.sample.acc_timestamp_us,
        gyroscope: reading.sample.gyroscope,
        gyro_timestamp_us: reading.sample.gyro_timestamp_us,
        fresh: reading.fresh,
    });
    0
}

/// Session calibration. Returns 0 on success, -1 on error.
///
/// # Safety
/// Both pointers must be valid, or null.
#[no_mangle]
pub unsafe extern "C" fn kz_get_calibration(
    session: *const KzSession,
    out: *mut KzCalibration,
) -> c_int {
    let Some(session) = session.as_ref() else {
        return -1;
    };
    if out.is_null() {
        return -1;
    }
    let cal = session.0.calibration();
    let k = |i: &crate::calibration::Intrinsics| [i.fx, i.fy, i.cx, i.cy];
    let r = &cal.depth_to_color.rotation;
    let t = &cal.depth_to_color.translation;
    out.write(KzCalibration {
        depth_mode: cal.depth_mode as u32,
        color_resolution: cal.color_resolution as u32,
        depth_width: cal.depth_camera.width,
        depth_height: cal.depth_camera.height,
        depth_intrinsics: k(&cal.depth_camera.intrinsics),
        color_width: cal.color_camera.width,
        color_height: cal.color_camera.height,
        color_intrinsics: k(&cal.color_camera.intrinsics),
        rotation: [
            r[(0, 0)],
            r[(0, 1)],
            r[(0, 2)],
            r[(1, 0)],
            r[(1, 1)],
            r[(1, 2)],
            r[(2, 0)],
            r[(2, 1)],
            r[(2, 2)],
        ],
        translation: [t.x, t.y, t.z],
    });
    0
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next kinz API call.
#[no_mangle]
pub extern "C" fn kz_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Validity;
    use crate::sim::{SimCapture, SimSdk};
    use std::ffi::CStr;

    // One test drives the process-wide backend so nothing races on it.
    #[test]
    fn test_c_api_round_trip() {
        install_backend(Box::new(SimSdk::new()));
        assert!(kz_open(Flags::C720.bits()).is_null());
        let msg = unsafe { CStr::from_ptr(kz_last_error()) };
        assert_eq!(msg.to_str().unwrap(), "No depth camera found");

        let mut sdk = SimSdk::new();
        let feed = sdk.attach("FFI01");
        install_backend(Box::new(sdk));

        let session = kz_open((Flags::C720 | Flags::D_BINNED | Flags::IMU_ON).bits());
        assert!(!session.is_null());
        assert!(kz_last_error().is_null());

        unsafe {
            let (mut w, mut h) = (0u32, 0u32);
            assert_eq!(kz_depth_dims(session, &mut w, &mut h), 0);
            assert_eq!((w, h), (320, 288));
            let n = (w * h) as usize;

            let cal = (*session).0.calibration().clone();
            feed.push(SimCapture::synthetic(&cal, 1200, 77).unwrap());
            let mask = kz_acquire(session, (Flags::IMAGES | Flags::IMU_ON).bits());
            let validity = Validity::from_bits_truncate(mask as u8);
            assert!(validity.contains(Validity::ALL | Validity::DEPTH | Validity::COLOR));
            assert!(!validity.contains(Validity::INERTIAL));

            let mut depth = vec![0u16; n];
            let mut ts = 0u64;
            assert_eq!(kz_get_depth(session, depth.as_mut_ptr(), n, &mut ts), 1);
            assert_eq!(ts, 77);
            assert!(depth.iter().all(|&d| d == 1200));

            // Wrong size is an error, not a silent truncation
            assert_eq!(kz_get_depth(session, depth.as_mut_ptr(), n - 1, &mut ts), -1);
            assert!(!kz_last_error().is_null());

            let mut color = vec![0u8; 3 * 1280 * 720];
            assert_eq!(
                kz_get_color(session, color.as_mut_ptr(), color.len(), std::ptr::null_mut()),
                1
            );

            let mut points = vec![0i16; 3 * n];
            let mut colors = vec![0u8; 3 * n];
            let mut colored = false;
            assert_eq!(
                kz_get_point_cloud(
                    session,
                    true,
                    points.as_mut_ptr(),
                    points.len(),
                    colors.as_mut_ptr(),
                    colors.len(),
                    &mut colored,
                ),
                1
            );
            assert!(colored);
            assert!(points[2 * n..].iter().all(|&z| z == 1200));

            let mut imu = std::mem::MaybeUninit::<KzImuSample>::uninit();
            assert_eq!(kz_get_imu(session, imu.as_mut_ptr()), 0);
            assert!(!imu.assume_init().fresh);

            let mut calib = std::mem::MaybeUninit::<KzCalibration>::uninit();
            assert_eq!(kz_get_calibration(session, calib.as_mut_ptr()), 0);
            let calib = calib.assume_init();
            assert_eq!((calib.color_width, calib.color_height), (1280, 720));
            assert_eq!(calib.translation, [-32.0, -2.0, 4.0]);

            // Next cycle times out: frames are gone, call reports "no frame"
            assert_eq!(kz_acquire(session, Flags::IMAGES.bits()) & 0x0f, 0);
            let msg = CStr::from_ptr(kz_last_error()).to_str().unwrap();
            assert!(msg.starts_with("CaptureTimeout: no capture within"));
            assert_eq!(kz_get_depth(session, depth.as_mut_ptr(), n, &mut ts), 0);

            kz_close(session);
            kz_close(std::ptr::null_mut());
        }
        assert!(!feed.is_open());
        assert_eq!(feed.live_captures(), 0);
    }
}
