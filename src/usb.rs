//! USB discovery of attached depth cameras.
//!
//! This only answers "is something plugged in"; opening and streaming go
//! through a [`crate::sdk::DepthSdk`] implementation.

// -- USB identifiers --
pub const VID: u16 = 0x045E;
pub const PID_DEPTH: u16 = 0x097C;
pub const PID_COLOR: u16 = 0x097D;
pub const PID_AUDIO: u16 = 0x097E;

/// Which function of the camera a USB device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbFunction {
    Depth,
    Color,
    Audio,
}

/// Classify a (vendor, product) pair.
pub fn classify(vendor_id: u16, product_id: u16) -> Option<UsbFunction> {
    if vendor_id != VID {
        return None;
    }
    match product_id {
        PID_DEPTH => Some(UsbFunction::Depth),
        PID_COLOR => Some(UsbFunction::Color),
        PID_AUDIO => Some(UsbFunction::Audio),
        _ => None,
    }
}

/// One camera function found on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub function: UsbFunction,
    pub bus_number: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// List attached camera functions. Each physical camera shows up as one
/// depth, one color and one audio device.
#[cfg(feature = "usb")]
pub fn list_devices() -> crate::Result<Vec<UsbDeviceInfo>> {
    let mut found = Vec::new();
    for device in rusb::devices()?.iter() {
        let desc = match device.device_descriptor() {
            Ok(desc) => desc,
            Err(e) => {
                log::warn!(
                    "Failed to read descriptor at bus {} address {}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                continue;
            }
        };
        if let Some(function) = classify(desc.vendor_id(), desc.product_id()) {
            found.push(UsbDeviceInfo {
                function,
                bus_number: device.bus_number(),
                address: device.address(),
                vendor_id: desc.vendor_id(),
                product_id: desc.product_id(),
            });
        }
    }
    log::debug!("USB probe found {} camera functions", found.len());
    Ok(found)
}

/// Number of attached cameras (counted by their depth function).
#[cfg(feature = "usb")]
pub fn count_cameras() -> crate::Result<usize> {
    Ok(list_devices()?
        .iter()
        .filter(|d| d.function == UsbFunction::Depth)
        .count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(0x045E, 0x097C), Some(UsbFunction::Depth));
        assert_eq!(classify(0x045E, 0x097D), Some(UsbFunction::Color));
        assert_eq!(classify(0x045E, 0x097E), Some(UsbFunction::Audio));
        assert_eq!(classify(0x045E, 0x0001), None);
        assert_eq!(classify(0x040E, 0x097C), None);
    }
}
