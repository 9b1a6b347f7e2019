use std::fmt;

bitflags::bitflags! {
    /// Capability flags passed at open, and modality selectors passed per cycle.
    ///
    /// The `C*` resolution tiers are mutually exclusive; when several are set
    /// the first in declaration order wins.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(C)]
    pub struct Flags: u16 {
        const COLOR    = 1 << 0;
        const DEPTH    = 1 << 1;
        const INFRARED = 1 << 2;
        const IMU_ON   = 1 << 3;
        const C720     = 1 << 4;
        const C1080    = 1 << 5;
        const C1440    = 1 << 6;
        const C1536    = 1 << 7;
        const C2160    = 1 << 8;
        const C3072    = 1 << 9;
        const D_BINNED = 1 << 10;
        const D_WFOV   = 1 << 11;

        /// All three image modalities.
        const IMAGES = Self::COLOR.bits() | Self::DEPTH.bits() | Self::INFRARED.bits();
    }
}

impl Flags {
    /// Color resolution tier selected by these flags.
    pub fn color_resolution(self) -> ColorResolution {
        const TIERS: [(Flags, ColorResolution); 6] = [
            (Flags::C720, ColorResolution::R720p),
            (Flags::C1080, ColorResolution::R1080p),
            (Flags::C1440, ColorResolution::R1440p),
            (Flags::C1536, ColorResolution::R1536p),
            (Flags::C2160, ColorResolution::R2160p),
            (Flags::C3072, ColorResolution::R3072p),
        ];
        TIERS
            .iter()
            .find(|(flag, _)| self.contains(*flag))
            .map(|(_, res)| *res)
            .unwrap_or(ColorResolution::Off)
    }

    /// Depth mode selected by the (wide FOV, binned) pair.
    pub fn depth_mode(self) -> DepthMode {
        match (self.contains(Flags::D_WFOV), self.contains(Flags::D_BINNED)) {
            (true, true) => DepthMode::WfovBinned,
            (true, false) => DepthMode::WfovUnbinned,
            (false, true) => DepthMode::NfovBinned,
            (false, false) => DepthMode::NfovUnbinned,
        }
    }
}

/// One sensor stream.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Color = 0,
    Depth = 1,
    Infrared = 2,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Depth, Modality::Color, Modality::Infrared];

    /// The per-cycle selector flag for this modality.
    pub fn flag(self) -> Flags {
        match self {
            Modality::Color => Flags::COLOR,
            Modality::Depth => Flags::DEPTH,
            Modality::Infrared => Flags::INFRARED,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modality::Color => "color",
            Modality::Depth => "depth",
            Modality::Infrared => "infrared",
        };
        f.write_str(name)
    }
}

/// Color camera resolution tier.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorResolution {
    Off = 0,
    R720p = 1,
    R1080p = 2,
    R1440p = 3,
    R1536p = 4,
    R2160p = 5,
    R3072p = 6,
}

impl ColorResolution {
    /// Sensor grid as (width, height). `Off` is 0x0.
    pub fn dims(self) -> (u32, u32) {
        match self {
            ColorResolution::Off => (0, 0),
            ColorResolution::R720p => (1280, 720),
            ColorResolution::R1080p => (1920, 1080),
            ColorResolution::R1440p => (2560, 1440),
            ColorResolution::R1536p => (2048, 1536),
            ColorResolution::R2160p => (3840, 2160),
            ColorResolution::R3072p => (4096, 3072),
        }
    }
}

/// Depth sensor mode: field of view and pixel binning.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthMode {
    NfovBinned = 1,
    NfovUnbinned = 2,
    WfovBinned = 3,
    WfovUnbinned = 4,
}

impl DepthMode {
    /// Depth (and IR) grid as (width, height).
    pub fn dims(self) -> (u32, u32) {
        match self {
            DepthMode::NfovBinned => (320, 288),
            DepthMode::NfovUnbinned => (640, 576),
            DepthMode::WfovBinned => (512, 512),
            DepthMode::WfovUnbinned => (1024, 1024),
        }
    }

    pub fn is_wide(self) -> bool {
        matches!(self, DepthMode::WfovBinned | DepthMode::WfovUnbinned)
    }
}

/// Camera frame rate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fps {
    Fps5 = 5,
    Fps15 = 15,
    Fps30 = 30,
}

/// Resolved camera configuration passed to the SDK on start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub color_resolution: ColorResolution,
    pub depth_mode: DepthMode,
    pub camera_fps: Fps,
    /// Only deliver captures where color and depth are both present.
    pub synchronized_images_only: bool,
}

impl DeviceConfig {
    /// Resolve the camera configuration from capability flags.
    ///
    /// Sensor bandwidth caps the frame rate: 3072p color runs at 15 fps and
    /// wide unbinned depth at 5 fps (the lower cap wins when both apply).
    pub fn from_flags(flags: Flags) -> DeviceConfig {
        let color_resolution = flags.color_resolution();
        let depth_mode = flags.depth_mode();

        let mut camera_fps = Fps::Fps30;
        if color_resolution == ColorResolution::R3072p {
            camera_fps = Fps::Fps15;
        }
        if depth_mode == DepthMode::WfovUnbinned {
            camera_fps = Fps::Fps5;
        }

        DeviceConfig {
            color_resolution,
            depth_mode,
            camera_fps,
            synchronized_images_only: color_resolution != ColorResolution::Off,
        }
    }
}

/// One accelerometer + gyroscope + temperature reading.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImuSample {
    /// Sensor temperature in degrees Celsius.
    pub temperature: f32,
    /// Accelerometer [x, y, z] in m/s^2.
    pub accelerometer: [f32; 3],
    pub acc_timestamp_us: u64,
    /// Gyroscope [x, y, z] in rad/s.
    pub gyroscope: [f32; 3],
    pub gyro_timestamp_us: u64,
}
