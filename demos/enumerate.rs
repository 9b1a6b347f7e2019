//! List depth camera functions attached over USB.
//!
//! Usage: cargo run --example enumerate --features usb

fn main() {
    env_logger::init();

    match kinz::usb::list_devices() {
        Ok(devices) => {
            let cameras = devices
                .iter()
                .filter(|d| d.function == kinz::usb::UsbFunction::Depth)
                .count();
            println!("Found {} depth camera(s):", cameras);
            for (i, dev) in devices.iter().enumerate() {
                println!(
                    "  [{}] {:?}  VID={:04x} PID={:04x}  Bus={} Addr={}",
                    i, dev.function, dev.vendor_id, dev.product_id, dev.bus_number, dev.address
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
