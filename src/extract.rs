//! Frame extraction into column-major caller arrays.

use crate::image::{Image, ImageFormat};
use crate::layout::{self, Geometry};
use crate::session::Session;
use crate::types::Modality;
use crate::{KinzError, Result};

/// Three column-major planes (R, G, B) of `width * height` bytes each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbPlanes {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub timestamp_ns: u64,
}

impl RgbPlanes {
    /// Plane 0 = R, 1 = G, 2 = B.
    pub fn plane(&self, channel: usize) -> &[u8] {
        let n = self.width as usize * self.height as usize;
        &self.data[channel * n..(channel + 1) * n]
    }

    /// Value at column `x`, row `y`.
    pub fn at(&self, x: u32, y: u32, channel: usize) -> u8 {
        self.plane(channel)[x as usize * self.height as usize + y as usize]
    }
}

/// One column-major plane of 16-bit values (depth in mm, or IR intensity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane16 {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
    pub timestamp_ns: u64,
}

impl Plane16 {
    pub fn at(&self, x: u32, y: u32) -> u16 {
        self.data[x as usize * self.height as usize + y as usize]
    }
}

fn geometry(image: &Image) -> Geometry {
    Geometry::new(image.width(), image.height(), image.stride())
}

/// Unpack a BGRA frame into `out` (3 planes). Returns the frame timestamp.
pub fn color_planes_into(image: &Image, out: &mut [u8]) -> Result<u64> {
    image.expect_format(ImageFormat::ColorBgra32)?;
    layout::bgra_to_rgb_column_major(image.buffer(), geometry(image), out)?;
    Ok(image.system_timestamp_ns())
}

pub fn color_planes(image: &Image) -> Result<RgbPlanes> {
    let mut data = vec![0u8; 3 * image.pixel_count()];
    let timestamp_ns = color_planes_into(image, &mut data)?;
    Ok(RgbPlanes {
        width: image.width(),
        height: image.height(),
        data,
        timestamp_ns,
    })
}

/// Unpack a depth or IR frame into `out`. Returns the frame timestamp.
pub fn plane16_into(image: &Image, out: &mut [u16]) -> Result<u64> {
    if !matches!(image.format(), ImageFormat::Depth16 | ImageFormat::Ir16) {
        return Err(KinzError::InvalidImage(format!(
            "expected a 16-bit image, got {:?}",
            image.format()
        )));
    }
    layout::le16_column_major(image.buffer(), geometry(image), out)?;
    Ok(image.system_timestamp_ns())
}

pub fn plane16(image: &Image) -> Result<Plane16> {
    let mut data = vec![0u16; image.pixel_count()];
    let timestamp_ns = plane16_into(image, &mut data)?;
    Ok(Plane16 {
        width: image.width(),
        height: image.height(),
        data,
        timestamp_ns,
    })
}

impl Session {
    fn held(&self, modality: Modality) -> Result<&Image> {
        self.frames
            .get(modality)
            .ok_or(KinzError::FrameUnavailable(modality))
    }

    /// Color frame of the current cycle.
    pub fn color(&self) -> Result<RgbPlanes> {
        color_planes(self.held(Modality::Color)?)
    }

    pub fn depth(&self) -> Result<Plane16> {
        plane16(self.held(Modality::Depth)?)
    }

    pub fn infrared(&self) -> Result<Plane16> {
        plane16(self.held(Modality::Infrared)?)
    }

    /// Write the color frame into a pre-sized buffer of `3 * width * height`.
    ///
    /// Returns `Ok(None)` and leaves `out` untouched if no color frame is held.
    pub fn color_into(&self, out: &mut [u8]) -> Result<Option<u64>> {
        self.frames
            .color()
            .map(|image| color_planes_into(image, out))
            .transpose()
    }

    pub fn depth_into(&self, out: &mut [u16]) -> Result<Option<u64>> {
        self.frames
            .depth()
            .map(|image| plane16_into(image, out))
            .transpose()
    }

    pub fn infrared_into(&self, out: &mut [u16]) -> Result<Option<u64>> {
        self.frames
            .infrared()
            .map(|image| plane16_into(image, out))
            .transpose()
    }
}
