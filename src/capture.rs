use crate::config::{ModalityPolicy, SessionConfig};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::image::{Capture, Image};
use crate::sdk::{DeviceHandle, WaitResult};
use crate::types::{Flags, ImuSample, Modality};

bitflags::bitflags! {
    /// Per-cycle validity mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct Validity: u8 {
        /// Depth, color and IR all satisfied under the session's modality policy.
        const ALL      = 1 << 0;
        const COLOR    = 1 << 1;
        const DEPTH    = 1 << 2;
        const INFRARED = 1 << 3;
        /// A new inertial sample was read this cycle.
        const INERTIAL = 1 << 4;
    }
}

/// What happened to one modality during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Present,
    /// Requested, but the capture did not carry it (or no capture arrived).
    Missing,
    NotRequested,
}

/// Result of one acquisition cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// False if the blocking capture call timed out or failed.
    pub captured: bool,
    pub color: FrameStatus,
    pub depth: FrameStatus,
    pub infrared: FrameStatus,
    /// True if a fresh inertial sample was read.
    pub inertial: bool,
    pub all_valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl CycleReport {
    pub fn status(&self, modality: Modality) -> FrameStatus {
        match modality {
            Modality::Color => self.color,
            Modality::Depth => self.depth,
            Modality::Infrared => self.infrared,
        }
    }

    pub fn validity(&self) -> Validity {
        let mut v = Validity::empty();
        v.set(Validity::ALL, self.all_valid);
        v.set(Validity::COLOR, self.color == FrameStatus::Present);
        v.set(Validity::DEPTH, self.depth == FrameStatus::Present);
        v.set(Validity::INFRARED, self.infrared == FrameStatus::Present);
        v.set(Validity::INERTIAL, self.inertial);
        v
    }
}

/// Frames held from the most recent cycle.
///
/// Replaced wholesale on every acquisition; the previous set is released
/// before the next blocking capture call.
#[derive(Debug, Default)]
pub struct FrameSet {
    capture: Option<Capture>,
    color: Option<Image>,
    depth: Option<Image>,
    ir: Option<Image>,
}

impl FrameSet {
    pub fn color(&self) -> Option<&Image> {
        self.color.as_ref()
    }

    pub fn depth(&self) -> Option<&Image> {
        self.depth.as_ref()
    }

    pub fn infrared(&self) -> Option<&Image> {
        self.ir.as_ref()
    }

    pub fn get(&self, modality: Modality) -> Option<&Image> {
        match modality {
            Modality::Color => self.color(),
            Modality::Depth => self.depth(),
            Modality::Infrared => self.infrared(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.capture.is_none() && self.color.is_none() && self.depth.is_none() && self.ir.is_none()
    }

    /// Release every held frame and the capture. Idempotent.
    pub fn release(&mut self) {
        self.color = None;
        self.depth = None;
        self.ir = None;
        if let Some(mut capture) = self.capture.take() {
            capture.release();
        }
    }
}

/// Latest known inertial sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InertialReading {
    pub sample: ImuSample,
    /// True if `sample` was read during the most recent cycle that asked for it.
    pub fresh: bool,
}

/// Run one acquisition cycle against `device`, replacing `held`.
pub(crate) fn acquire(
    device: &mut dyn DeviceHandle,
    config: &SessionConfig,
    modalities: Flags,
    imu_available: bool,
    held: &mut FrameSet,
    imu: &mut InertialReading,
) -> CycleReport {
    held.release();

    let mut diagnostics = Vec::new();
    let mut next = FrameSet::default();

    let captured = match device.get_capture(config.timeout) {
        WaitResult::Ready(capture) => {
            next.capture = Some(capture);
            true
        }
        WaitResult::Timeout => {
            log::warn!("Timed out waiting for a capture ({:?})", config.timeout);
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::CaptureTimeout,
                format!("no capture within {:?}", config.timeout),
            ));
            false
        }
        WaitResult::Failed(msg) => {
            log::warn!("Failed to read a capture: {}", msg);
            diagnostics.push(Diagnostic::new(DiagnosticKind::CaptureFailed, msg));
            false
        }
    };

    let mut fetch = |modality: Modality, next: &mut FrameSet| -> FrameStatus {
        if !modalities.contains(modality.flag()) {
            return FrameStatus::NotRequested;
        }
        let Some(capture) = next.capture.as_mut() else {
            return FrameStatus::Missing;
        };
        let image = match modality {
            Modality::Color => capture.take_color(),
            Modality::Depth => capture.take_depth(),
            Modality::Infrared => capture.take_ir(),
        };
        match image {
            Some(image) => {
                match modality {
                    Modality::Color => next.color = Some(image),
                    Modality::Depth => next.depth = Some(image),
                    Modality::Infrared => next.ir = Some(image),
                }
                FrameStatus::Present
            }
            None => {
                log::debug!("Could not read {} image", modality);
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::FrameMissing(modality),
                    format!("capture carried no {} image", modality),
                ));
                FrameStatus::Missing
            }
        }
    };

    let depth = fetch(Modality::Depth, &mut next);
    let color = fetch(Modality::Color, &mut next);
    let infrared = fetch(Modality::Infrared, &mut next);

    let inertial = if modalities.contains(Flags::IMU_ON) && imu_available {
        read_inertial(device, config, imu, &mut diagnostics)
    } else {
        false
    };

    let satisfied = |status: FrameStatus| match config.modality_policy {
        ModalityPolicy::Compat => status != FrameStatus::Missing,
        ModalityPolicy::Strict => status == FrameStatus::Present,
    };
    let all_valid = captured && satisfied(depth) && satisfied(color) && satisfied(infrared);

    *held = next;

    CycleReport {
        captured,
        color,
        depth,
        infrared,
        inertial,
        all_valid,
        diagnostics,
    }
}

fn read_inertial(
    device: &mut dyn DeviceHandle,
    config: &SessionConfig,
    imu: &mut InertialReading,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    match device.get_imu_sample(config.imu_timeout) {
        WaitResult::Ready(sample) => {
            *imu = InertialReading {
                sample,
                fresh: true,
            };
            log::trace!("IMU sample: {:?}", sample);
            true
        }
        WaitResult::Timeout => {
            log::warn!("Timed out waiting for an IMU sample");
            imu.fresh = false;
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::InertialTimeout,
                format!("no IMU sample within {:?}", config.imu_timeout),
            ));
            false
        }
        WaitResult::Failed(msg) => {
            log::warn!("Failed to read an IMU sample: {}", msg);
            imu.fresh = false;
            diagnostics.push(Diagnostic::new(DiagnosticKind::InertialFailed, msg));
            false
        }
    }
}
