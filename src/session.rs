use crate::calibration::Calibration;
use crate::capture::{self, CycleReport, FrameSet, InertialReading};
use crate::config::SessionConfig;
use crate::sdk::{DepthSdk, DeviceHandle, Transformation};
use crate::types::{DeviceConfig, Flags};
use crate::{KinzError, Result};

/// State of the inertial sensor for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImuStatus {
    /// `IMU_ON` was not requested at open.
    Disabled,
    Running,
    /// Requested but failed to start; the session runs without it.
    StartFailed(String),
}

/// An opened, configured and started depth camera.
///
/// Owns the device, its calibration and the derived transformation for its
/// whole lifetime, plus the frames of the most recent capture cycle.
/// Dropping the session stops the sensors, releases held frames and closes
/// the device.
pub struct Session {
    flags: Flags,
    config: SessionConfig,
    device_config: DeviceConfig,
    serial: Option<String>,
    calibration: Calibration,
    imu_status: ImuStatus,
    pub(crate) frames: FrameSet,
    imu: InertialReading,
    pub(crate) transformation: Box<dyn Transformation>,
    device: Box<dyn DeviceHandle>,
}

impl Session {
    /// Open the first device with the capabilities selected by `flags`.
    ///
    /// Any failure before the cameras are running closes the device before
    /// returning. An IMU start failure is not fatal.
    pub fn open(sdk: &dyn DepthSdk, flags: Flags, config: SessionConfig) -> Result<Session> {
        log::debug!("Opening session with flags {:?}", flags);

        let count = sdk.installed_count();
        if count == 0 {
            log::warn!("No depth camera devices found");
            return Err(KinzError::DeviceNotFound);
        }

        let mut device = sdk.open(0)?;

        let serial = match device.serial_number() {
            Ok(serial) => Some(serial),
            Err(e) => {
                log::warn!("Could not read serial number: {}", e);
                None
            }
        };

        let device_config = DeviceConfig::from_flags(flags);
        log::info!(
            "Resolved config: color={:?} depth={:?} fps={:?}",
            device_config.color_resolution,
            device_config.depth_mode,
            device_config.camera_fps
        );

        // Early returns drop `device`, which closes it exactly once.
        let calibration =
            device.calibration(device_config.depth_mode, device_config.color_resolution)?;
        let transformation = device.create_transformation(&calibration)?;
        device.start_cameras(&device_config)?;

        let imu_status = if flags.contains(Flags::IMU_ON) {
            match device.start_imu() {
                Ok(()) => {
                    log::info!("IMU started");
                    ImuStatus::Running
                }
                Err(e) => {
                    log::warn!("IMU failed to start, continuing without it: {}", e);
                    ImuStatus::StartFailed(e.to_string())
                }
            }
        } else {
            ImuStatus::Disabled
        };

        log::info!(
            "Depth camera started (serial {})",
            serial.as_deref().unwrap_or("unknown")
        );

        Ok(Session {
            flags,
            config,
            device_config,
            serial,
            calibration,
            imu_status,
            frames: FrameSet::default(),
            imu: InertialReading::default(),
            transformation,
            device,
        })
    }

    /// Close this session and open a new one with different capabilities.
    ///
    /// Calibration and transformation are rebuilt for the new configuration.
    pub fn reconfigure(self, sdk: &dyn DepthSdk, flags: Flags) -> Result<Session> {
        let config = self.config.clone();
        drop(self);
        Session::open(sdk, flags, config)
    }

    /// Run one capture cycle for the modalities selected in `modalities`.
    ///
    /// Frames from the previous cycle are released before waiting for the
    /// next capture. Timeouts and missing frames are reported, not raised.
    pub fn acquire(&mut self, modalities: Flags) -> CycleReport {
        let imu_available = self.imu_status == ImuStatus::Running;
        capture::acquire(
            self.device.as_mut(),
            &self.config,
            modalities,
            imu_available,
            &mut self.frames,
            &mut self.imu,
        )
    }

    /// Release the frames held from the last cycle. Idempotent.
    pub fn release_frames(&mut self) {
        self.frames.release();
    }

    pub fn frames(&self) -> &FrameSet {
        &self.frames
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn device_config(&self) -> &DeviceConfig {
        &self.device_config
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn imu_status(&self) -> &ImuStatus {
        &self.imu_status
    }

    /// Latest inertial sample; `fresh` is false if the last read failed.
    pub fn inertial_sample(&self) -> InertialReading {
        self.imu
    }

    /// Color sensor grid as (width, height); (0, 0) if color is disabled.
    pub fn color_dims(&self) -> (u32, u32) {
        let c = &self.calibration.color_camera;
        (c.width, c.height)
    }

    /// Depth and IR sensor grid as (width, height).
    pub fn depth_dims(&self) -> (u32, u32) {
        let d = &self.calibration.depth_camera;
        (d.width, d.height)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.frames.release();
        if self.imu_status == ImuStatus::Running {
            self.device.stop_imu();
        }
        self.device.stop_cameras();
        log::info!("Depth camera session closed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("flags", &self.flags)
            .field("device_config", &self.device_config)
            .field("serial", &self.serial)
            .field("imu_status", &self.imu_status)
            .finish()
    }
}
