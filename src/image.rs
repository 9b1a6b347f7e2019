use crate::{KinzError, Result};

/// Pixel layout of an [`Image`] buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// 4 bytes per pixel: B, G, R, A.
    ColorBgra32,
    /// 2 bytes per pixel, little-endian millimeters.
    Depth16,
    /// 2 bytes per pixel, little-endian intensity.
    Ir16,
    /// 6 bytes per pixel: little-endian i16 X, Y, Z in millimeters.
    PointCloudXyz16,
}

impl ImageFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::ColorBgra32 => 4,
            ImageFormat::Depth16 | ImageFormat::Ir16 => 2,
            ImageFormat::PointCloudXyz16 => 6,
        }
    }
}

/// A 2D frame buffer owned by whoever holds it; dropping it releases it.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    format: ImageFormat,
    width: u32,
    height: u32,
    stride: u32,
    buffer: Vec<u8>,
    system_timestamp_ns: u64,
    device_timestamp_us: u64,
}

impl Image {
    /// Allocate a zeroed image with a tightly packed stride.
    pub fn create(format: ImageFormat, width: u32, height: u32) -> Result<Image> {
        let stride = width
            .checked_mul(format.bytes_per_pixel() as u32)
            .ok_or_else(|| KinzError::InvalidImage(format!("width {} overflows stride", width)))?;
        Self::create_with_stride(format, width, height, stride)
    }

    pub fn create_with_stride(
        format: ImageFormat,
        width: u32,
        height: u32,
        stride: u32,
    ) -> Result<Image> {
        validate_geometry(format, width, height, stride)?;
        let bytes = stride as usize * height as usize;
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(bytes).map_err(|_| KinzError::Allocation {
            width,
            height,
            bytes,
        })?;
        buffer.resize(bytes, 0);

        Ok(Image {
            format,
            width,
            height,
            stride,
            buffer,
            system_timestamp_ns: 0,
            device_timestamp_us: 0,
        })
    }

    /// Wrap an existing buffer. It must hold at least `stride * height` bytes.
    pub fn from_buffer(
        format: ImageFormat,
        width: u32,
        height: u32,
        stride: u32,
        buffer: Vec<u8>,
    ) -> Result<Image> {
        validate_geometry(format, width, height, stride)?;
        let needed = stride as usize * height as usize;
        if buffer.len() < needed {
            return Err(KinzError::InvalidImage(format!(
                "buffer holds {} bytes, {}x{} stride {} needs {}",
                buffer.len(),
                width,
                height,
                stride,
                needed
            )));
        }
        Ok(Image {
            format,
            width,
            height,
            stride,
            buffer,
            system_timestamp_ns: 0,
            device_timestamp_us: 0,
        })
    }

    pub fn with_timestamps(mut self, system_ns: u64, device_us: u64) -> Self {
        self.system_timestamp_ns = system_ns;
        self.device_timestamp_us = device_us;
        self
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Host clock timestamp in nanoseconds.
    pub fn system_timestamp_ns(&self) -> u64 {
        self.system_timestamp_ns
    }

    pub fn device_timestamp_us(&self) -> u64 {
        self.device_timestamp_us
    }

    /// Bytes of row `y`, without stride padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        &self.buffer[start..start + self.width as usize * self.format.bytes_per_pixel()]
    }

    /// Read the 16-bit value at (x, y). Only meaningful for 16-bit formats.
    pub fn get_u16(&self, x: u32, y: u32) -> u16 {
        let idx = y as usize * self.stride as usize + x as usize * 2;
        u16::from_le_bytes([self.buffer[idx], self.buffer[idx + 1]])
    }

    pub fn set_u16(&mut self, x: u32, y: u32, value: u16) {
        let idx = y as usize * self.stride as usize + x as usize * 2;
        self.buffer[idx..idx + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// The four BGRA bytes at (x, y).
    pub fn get_bgra(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = y as usize * self.stride as usize + x as usize * 4;
        [
            self.buffer[idx],
            self.buffer[idx + 1],
            self.buffer[idx + 2],
            self.buffer[idx + 3],
        ]
    }

    pub fn set_bgra(&mut self, x: u32, y: u32, bgra: [u8; 4]) {
        let idx = y as usize * self.stride as usize + x as usize * 4;
        self.buffer[idx..idx + 4].copy_from_slice(&bgra);
    }

    pub fn set_xyz(&mut self, x: u32, y: u32, xyz: [i16; 3]) {
        let idx = y as usize * self.stride as usize + x as usize * 6;
        for (i, v) in xyz.iter().enumerate() {
            self.buffer[idx + 2 * i..idx + 2 * i + 2].copy_from_slice(&v.to_le_bytes());
        }
    }

    pub(crate) fn expect_format(&self, format: ImageFormat) -> Result<()> {
        if self.format != format {
            return Err(KinzError::InvalidImage(format!(
                "expected {:?} image, got {:?}",
                format, self.format
            )));
        }
        Ok(())
    }
}

fn validate_geometry(format: ImageFormat, width: u32, height: u32, stride: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(KinzError::InvalidImage(format!(
            "empty {}x{} {:?} image",
            width, height, format
        )));
    }
    let min_stride = width as u64 * format.bytes_per_pixel() as u64;
    if (stride as u64) < min_stride {
        return Err(KinzError::InvalidImage(format!(
            "stride {} below {} bytes per row",
            stride, min_stride
        )));
    }
    Ok(())
}

/// The frames delivered by one blocking capture call.
///
/// Each frame may be independently absent. Dropping the capture runs its
/// release hook once, so SDK-side resources are never double-freed.
pub struct Capture {
    color: Option<Image>,
    depth: Option<Image>,
    ir: Option<Image>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl Capture {
    pub fn new(color: Option<Image>, depth: Option<Image>, ir: Option<Image>) -> Self {
        Capture {
            color,
            depth,
            ir,
            on_release: None,
        }
    }

    /// Register a hook run when the capture is released.
    pub fn on_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn take_color(&mut self) -> Option<Image> {
        self.color.take()
    }

    pub fn take_depth(&mut self) -> Option<Image> {
        self.depth.take()
    }

    pub fn take_ir(&mut self) -> Option<Image> {
        self.ir.take()
    }

    /// Release the capture's resources. Safe to call more than once.
    pub fn release(&mut self) {
        self.color = None;
        self.depth = None;
        self.ir = None;
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Capture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capture")
            .field("color", &self.color.is_some())
            .field("depth", &self.depth.is_some())
            .field("ir", &self.ir.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_create_rejects_empty() {
        assert!(matches!(
            Image::create(ImageFormat::Depth16, 0, 10),
            Err(KinzError::InvalidImage(_))
        ));
        let img = Image::create(ImageFormat::ColorBgra32, 3, 2).unwrap();
        assert_eq!(img.stride(), 12);
        assert_eq!(img.buffer().len(), 24);
    }

    #[test]
    fn test_from_buffer_checks_length() {
        assert!(Image::from_buffer(ImageFormat::Ir16, 2, 2, 4, vec![0; 7]).is_err());
        assert!(Image::from_buffer(ImageFormat::Ir16, 2, 2, 3, vec![0; 8]).is_err());
        assert!(Image::from_buffer(ImageFormat::Ir16, 2, 2, 6, vec![0; 12]).is_ok());
    }

    #[test]
    fn test_u16_accessors_honor_stride() {
        let mut img = Image::create_with_stride(ImageFormat::Depth16, 2, 2, 8).unwrap();
        img.set_u16(1, 1, 0x1234);
        assert_eq!(img.buffer()[10], 0x34);
        assert_eq!(img.buffer()[11], 0x12);
        assert_eq!(img.get_u16(1, 1), 4660);
        assert_eq!(img.row(1), &[0, 0, 0x34, 0x12]);
    }

    #[test]
    fn test_capture_release_is_idempotent() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let mut capture = Capture::new(None, None, None).on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        capture.release();
        capture.release();
        drop(capture);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
