//! In-process simulated depth camera.
//!
//! Each [`SimDevice`] is driven by a [`SimFeed`]: captures and IMU samples are
//! pushed through bounded channels and handed out by the device's blocking
//! calls, and faults can be injected at every SDK step. The feed also counts
//! open handles and live captures.

use crate::calibration::Calibration;
use crate::image::{Capture, Image, ImageFormat};
use crate::sdk::{DepthSdk, DeviceHandle, Transformation, WaitResult};
use crate::transform::PinholeTransformation;
use crate::types::{ColorResolution, DepthMode, DeviceConfig, ImuSample, Modality};
use crate::{KinzError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const CHANNEL_CAPACITY: usize = 64;

enum Delivery<T> {
    Data(T),
    Failure(String),
}

/// Which SDK steps should fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimFaults {
    pub open: bool,
    pub serial: bool,
    pub calibration: bool,
    pub transformation: bool,
    pub start_cameras: bool,
    pub start_imu: bool,
}

/// The frames a simulated capture will carry.
#[derive(Debug, Clone, Default)]
pub struct SimCapture {
    pub color: Option<Image>,
    pub depth: Option<Image>,
    pub ir: Option<Image>,
}

impl SimCapture {
    /// Frames matching `calibration`: flat depth at `depth_mm`, a color
    /// gradient (B = x, G = y, R = x + y) and IR equal to `x + y`.
    pub fn synthetic(calibration: &Calibration, depth_mm: u16, timestamp_ns: u64) -> Result<Self> {
        let d = &calibration.depth_camera;
        let mut depth = Image::create(ImageFormat::Depth16, d.width, d.height)?;
        let mut ir = Image::create(ImageFormat::Ir16, d.width, d.height)?;
        for y in 0..d.height {
            for x in 0..d.width {
                depth.set_u16(x, y, depth_mm);
                ir.set_u16(x, y, (x + y) as u16);
            }
        }

        let c = &calibration.color_camera;
        let color = if c.is_enabled() {
            let mut color = Image::create(ImageFormat::ColorBgra32, c.width, c.height)?;
            for y in 0..c.height {
                for x in 0..c.width {
                    color.set_bgra(x, y, [x as u8, y as u8, (x + y) as u8, 255]);
                }
            }
            Some(color.with_timestamps(timestamp_ns, timestamp_ns / 1000))
        } else {
            None
        };

        Ok(SimCapture {
            color,
            depth: Some(depth.with_timestamps(timestamp_ns, timestamp_ns / 1000)),
            ir: Some(ir.with_timestamps(timestamp_ns, timestamp_ns / 1000)),
        })
    }

    pub fn without(mut self, modality: Modality) -> Self {
        match modality {
            Modality::Color => self.color = None,
            Modality::Depth => self.depth = None,
            Modality::Infrared => self.ir = None,
        }
        self
    }
}

struct SimShared {
    serial: String,
    captures: Receiver<Delivery<SimCapture>>,
    imu: Receiver<Delivery<ImuSample>>,
    faults: Mutex<SimFaults>,
    open: AtomicBool,
    opens: AtomicUsize,
    closes: AtomicUsize,
    live_captures: Arc<AtomicUsize>,
    peak_live_captures: AtomicUsize,
    captures_served: AtomicUsize,
    cameras_running: AtomicBool,
    imu_running: AtomicBool,
    started_config: Mutex<Option<DeviceConfig>>,
    transform_failure: Arc<AtomicBool>,
}

impl SimShared {
    fn faults(&self) -> SimFaults {
        self.faults.lock().map(|f| *f).unwrap_or_default()
    }
}

/// A simulated SDK with zero or more attached devices.
#[derive(Default)]
pub struct SimSdk {
    devices: Vec<Arc<SimShared>>,
}

impl SimSdk {
    /// An SDK with no devices attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device and return the feed that drives it.
    pub fn attach(&mut self, serial: &str) -> SimFeed {
        let (capture_tx, capture_rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let (imu_tx, imu_rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let shared = Arc::new(SimShared {
            serial: serial.to_string(),
            captures: capture_rx,
            imu: imu_rx,
            faults: Mutex::new(SimFaults::default()),
            open: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            live_captures: Arc::new(AtomicUsize::new(0)),
            peak_live_captures: AtomicUsize::new(0),
            captures_served: AtomicUsize::new(0),
            cameras_running: AtomicBool::new(false),
            imu_running: AtomicBool::new(false),
            started_config: Mutex::new(None),
            transform_failure: Arc::new(AtomicBool::new(false)),
        });
        self.devices.push(shared.clone());
        SimFeed {
            shared,
            captures: capture_tx,
            imu: imu_tx,
        }
    }
}

impl DepthSdk for SimSdk {
    fn installed_count(&self) -> u32 {
        self.devices.len() as u32
    }

    fn open(&self, index: u32) -> Result<Box<dyn DeviceHandle>> {
        let shared = self
            .devices
            .get(index as usize)
            .ok_or(KinzError::DeviceNotFound)?;
        if shared.faults().open {
            return Err(KinzError::DeviceOpen("injected open failure".into()));
        }
        if shared.open.swap(true, Ordering::SeqCst) {
            return Err(KinzError::DeviceOpen(format!(
                "device {} is already open",
                index
            )));
        }
        shared.opens.fetch_add(1, Ordering::SeqCst);
        log::debug!("Sim device {} opened", shared.serial);
        Ok(Box::new(SimDevice {
            shared: shared.clone(),
        }))
    }
}

/// Handle to an opened simulated device.
pub struct SimDevice {
    shared: Arc<SimShared>,
}

impl DeviceHandle for SimDevice {
    fn serial_number(&self) -> Result<String> {
        if self.shared.faults().serial {
            return Err(KinzError::DeviceOpen("injected serial failure".into()));
        }
        Ok(self.shared.serial.clone())
    }

    fn calibration(
        &self,
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
    ) -> Result<Calibration> {
        if self.shared.faults().calibration {
            return Err(KinzError::Calibration("injected calibration failure".into()));
        }
        Ok(Calibration::nominal(depth_mode, color_resolution))
    }

    fn create_transformation(&self, calibration: &Calibration) -> Result<Box<dyn Transformation>> {
        if self.shared.faults().transformation {
            return Err(KinzError::Transformation(
                "injected transformation failure".into(),
            ));
        }
        Ok(Box::new(SimTransformation {
            inner: PinholeTransformation::new(calibration)?,
            fail: self.shared.transform_failure.clone(),
        }))
    }

    fn start_cameras(&mut self, config: &DeviceConfig) -> Result<()> {
        if self.shared.faults().start_cameras {
            return Err(KinzError::CameraStart("injected start failure".into()));
        }
        if let Ok(mut started) = self.shared.started_config.lock() {
            *started = Some(*config);
        }
        self.shared.cameras_running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_cameras(&mut self) {
        self.shared.cameras_running.store(false, Ordering::SeqCst);
    }

    fn start_imu(&mut self) -> Result<()> {
        if self.shared.faults().start_imu {
            return Err(KinzError::ImuStart("injected IMU failure".into()));
        }
        if !self.shared.cameras_running.load(Ordering::SeqCst) {
            return Err(KinzError::ImuStart("cameras must be started first".into()));
        }
        self.shared.imu_running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_imu(&mut self) {
        self.shared.imu_running.store(false, Ordering::SeqCst);
    }

    fn get_capture(&mut self, timeout: Duration) -> WaitResult<Capture> {
        if !self.shared.cameras_running.load(Ordering::SeqCst) {
            return WaitResult::Failed("cameras are not running".into());
        }
        match self.shared.captures.recv_timeout(timeout) {
            Ok(Delivery::Data(frames)) => {
                let live = self.shared.live_captures.clone();
                let now_live = live.fetch_add(1, Ordering::SeqCst) + 1;
                self.shared
                    .peak_live_captures
                    .fetch_max(now_live, Ordering::SeqCst);
                self.shared.captures_served.fetch_add(1, Ordering::SeqCst);
                WaitResult::Ready(Capture::new(frames.color, frames.depth, frames.ir).on_release(
                    move || {
                        live.fetch_sub(1, Ordering::SeqCst);
                    },
                ))
            }
            Ok(Delivery::Failure(msg)) => WaitResult::Failed(msg),
            Err(RecvTimeoutError::Timeout) => WaitResult::Timeout,
            Err(RecvTimeoutError::Disconnected) => WaitResult::Failed("feed disconnected".into()),
        }
    }

    fn get_imu_sample(&mut self, timeout: Duration) -> WaitResult<ImuSample> {
        if !self.shared.imu_running.load(Ordering::SeqCst) {
            return WaitResult::Failed("IMU is not running".into());
        }
        match self.shared.imu.recv_timeout(timeout) {
            Ok(Delivery::Data(sample)) => WaitResult::Ready(sample),
            Ok(Delivery::Failure(msg)) => WaitResult::Failed(msg),
            Err(RecvTimeoutError::Timeout) => WaitResult::Timeout,
            Err(RecvTimeoutError::Disconnected) => WaitResult::Failed("feed disconnected".into()),
        }
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        self.shared.imu_running.store(false, Ordering::SeqCst);
        self.shared.cameras_running.store(false, Ordering::SeqCst);
        self.shared.open.store(false, Ordering::SeqCst);
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        log::debug!("Sim device {} closed", self.shared.serial);
    }
}

struct SimTransformation {
    inner: PinholeTransformation,
    fail: Arc<AtomicBool>,
}

impl SimTransformation {
    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(KinzError::Transformation("injected transform failure".into()));
        }
        Ok(())
    }
}

impl Transformation for SimTransformation {
    fn depth_to_color(&self, depth: &Image, out: &mut Image) -> Result<()> {
        self.check()?;
        self.inner.depth_to_color(depth, out)
    }

    fn color_to_depth(&self, depth: &Image, color: &Image, out: &mut Image) -> Result<()> {
        self.check()?;
        self.inner.color_to_depth(depth, color, out)
    }

    fn depth_to_point_cloud(&self, depth: &Image, out: &mut Image) -> Result<()> {
        self.check()?;
        self.inner.depth_to_point_cloud(depth, out)
    }
}

/// Producer side of a simulated device.
#[derive(Clone)]
pub struct SimFeed {
    shared: Arc<SimShared>,
    captures: Sender<Delivery<SimCapture>>,
    imu: Sender<Delivery<ImuSample>>,
}

impl SimFeed {
    /// Queue a capture. Returns false if the queue is full.
    pub fn push(&self, capture: SimCapture) -> bool {
        Self::offer(&self.captures, Delivery::Data(capture))
    }

    /// Make the next blocking capture call fail.
    pub fn push_capture_failure(&self, msg: &str) -> bool {
        Self::offer(&self.captures, Delivery::Failure(msg.to_string()))
    }

    pub fn push_imu(&self, sample: ImuSample) -> bool {
        Self::offer(&self.imu, Delivery::Data(sample))
    }

    pub fn push_imu_failure(&self, msg: &str) -> bool {
        Self::offer(&self.imu, Delivery::Failure(msg.to_string()))
    }

    fn offer<T>(sender: &Sender<Delivery<T>>, delivery: Delivery<T>) -> bool {
        match sender.try_send(delivery) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("Sim queue full, dropping delivery");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn set_faults(&self, faults: SimFaults) {
        if let Ok(mut f) = self.shared.faults.lock() {
            *f = faults;
        }
    }

    /// Make every transformation call fail (or succeed again).
    pub fn set_transform_failure(&self, fail: bool) {
        self.shared.transform_failure.store(fail, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub fn cameras_running(&self) -> bool {
        self.shared.cameras_running.load(Ordering::SeqCst)
    }

    pub fn imu_running(&self) -> bool {
        self.shared.imu_running.load(Ordering::SeqCst)
    }

    /// Configuration passed to the most recent camera start.
    pub fn started_config(&self) -> Option<DeviceConfig> {
        self.shared.started_config.lock().ok().and_then(|c| *c)
    }

    /// Captures handed out and not yet released.
    pub fn live_captures(&self) -> usize {
        self.shared.live_captures.load(Ordering::SeqCst)
    }

    /// Highest number of captures ever alive at once.
    pub fn peak_live_captures(&self) -> usize {
        self.shared.peak_live_captures.load(Ordering::SeqCst)
    }

    pub fn captures_served(&self) -> usize {
        self.shared.captures_served.load(Ordering::SeqCst)
    }

    /// Push synthetic captures (and IMU samples) at `fps` from a background thread.
    pub fn stream(&self, calibration: Calibration, depth_mm: u16, fps: u32) -> Result<SimStreamer> {
        SimStreamer::start(self.clone(), calibration, depth_mm, fps)
    }
}

/// Background producer emulating a free-running camera.
pub struct SimStreamer {
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl SimStreamer {
    fn start(feed: SimFeed, calibration: Calibration, depth_mm: u16, fps: u32) -> Result<Self> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();
        let period = Duration::from_secs(1) / fps.max(1);

        let thread = std::thread::Builder::new()
            .name("kinz-sim".into())
            .spawn(move || streamer_loop(feed, calibration, depth_mm, period, stop_clone))
            .map_err(|e| KinzError::CaptureFailed(format!("Failed to spawn sim thread: {}", e)))?;

        Ok(SimStreamer {
            stop_flag,
            thread: Some(thread),
        })
    }

    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop the producer and wait for its thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SimStreamer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn streamer_loop(
    feed: SimFeed,
    calibration: Calibration,
    depth_mm: u16,
    period: Duration,
    stop_flag: Arc<AtomicBool>,
) {
    let epoch = Instant::now();
    log::info!("Sim streamer started ({:?} per frame)", period);

    while !stop_flag.load(Ordering::Relaxed) {
        let ts = epoch.elapsed();
        let ts_ns = ts.as_nanos() as u64;
        let ts_us = ts.as_micros() as u64;

        match SimCapture::synthetic(&calibration, depth_mm, ts_ns) {
            Ok(capture) => {
                feed.push(capture);
            }
            Err(e) => {
                log::warn!("Sim streamer could not build frames: {}", e);
                break;
            }
        }
        feed.push_imu(ImuSample {
            temperature: 30.0,
            accelerometer: [0.0, 0.0, -9.81],
            acc_timestamp_us: ts_us,
            gyroscope: [0.0; 3],
            gyro_timestamp_us: ts_us,
        });

        std::thread::sleep(period);
    }
    log::info!("Sim streamer stopping");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_is_exclusive_and_closes_on_drop() {
        let mut sdk = SimSdk::new();
        let feed = sdk.attach("000001");
        let handle = sdk.open(0).unwrap();
        assert!(feed.is_open());
        assert!(matches!(sdk.open(0), Err(KinzError::DeviceOpen(_))));
        assert!(matches!(sdk.open(1), Err(KinzError::DeviceNotFound)));
        drop(handle);
        assert!(!feed.is_open());
        assert_eq!(feed.close_count(), 1);
    }

    #[test]
    fn test_capture_requires_running_cameras() {
        let mut sdk = SimSdk::new();
        let feed = sdk.attach("000002");
        let mut dev = sdk.open(0).unwrap();
        assert!(matches!(
            dev.get_capture(Duration::from_millis(1)),
            WaitResult::Failed(_)
        ));
        dev.start_cameras(&DeviceConfig::from_flags(crate::Flags::C720))
            .unwrap();
        assert!(matches!(
            dev.get_capture(Duration::from_millis(1)),
            WaitResult::Timeout
        ));
        assert!(feed.push_capture_failure("usb reset"));
        assert!(matches!(
            dev.get_capture(Duration::from_millis(1)),
            WaitResult::Failed(msg) if msg == "usb reset"
        ));
    }

    #[test]
    fn test_live_capture_accounting() {
        let mut sdk = SimSdk::new();
        let feed = sdk.attach("000003");
        let mut dev = sdk.open(0).unwrap();
        dev.start_cameras(&DeviceConfig::from_flags(crate::Flags::empty()))
            .unwrap();
        feed.push(SimCapture::default());
        feed.push(SimCapture::default());
        let a = dev.get_capture(Duration::from_millis(10)).ok().unwrap();
        let b = dev.get_capture(Duration::from_millis(10)).ok().unwrap();
        assert_eq!(feed.live_captures(), 2);
        drop(a);
        drop(b);
        assert_eq!(feed.live_captures(), 0);
        assert_eq!(feed.peak_live_captures(), 2);
    }

    #[test]
    fn test_synthetic_frames_match_calibration() {
        let cal = Calibration::nominal(DepthMode::NfovBinned, ColorResolution::R720p);
        let frames = SimCapture::synthetic(&cal, 1234, 99).unwrap();
        let depth = frames.depth.unwrap();
        assert_eq!((depth.width(), depth.height()), (320, 288));
        assert_eq!(depth.get_u16(5, 7), 1234);
        assert_eq!(depth.system_timestamp_ns(), 99);
        let color = frames.color.unwrap();
        assert_eq!(color.get_bgra(3, 4), [3, 4, 7, 255]);
        assert_eq!(frames.ir.unwrap().get_u16(3, 4), 7);

        let cal = Calibration::nominal(DepthMode::NfovBinned, ColorResolution::Off);
        assert!(SimCapture::synthetic(&cal, 1, 0).unwrap().color.is_none());
    }
}
