//! Open a simulated camera and print its resolved configuration and calibration.
//!
//! Usage: cargo run --example info

use kinz::sim::SimSdk;
use kinz::{Flags, Session, SessionConfig};

fn main() {
    env_logger::init();

    let mut sdk = SimSdk::new();
    let _feed = sdk.attach("000000000001");

    let flags = Flags::C1080 | Flags::D_WFOV | Flags::D_BINNED | Flags::IMU_ON;
    let session = match Session::open(&sdk, flags, SessionConfig::from_env()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let cal = session.calibration();
    let config = session.device_config();
    println!("Serial:     {}", session.serial_number().unwrap_or("<unknown>"));
    println!("Color:      {:?} {:?}", config.color_resolution, session.color_dims());
    println!("Depth:      {:?} {:?}", config.depth_mode, session.depth_dims());
    println!("FPS:        {:?}", config.camera_fps);
    println!("Sync only:  {}", config.synchronized_images_only);
    println!("IMU:        {:?}", session.imu_status());
    println!("Depth K:    {:?}", cal.depth_camera.intrinsics);
    println!("Color K:    {:?}", cal.color_camera.intrinsics);
    println!("R:          {:?}", cal.depth_to_color.rotation);
    println!("t (mm):     {:?}", cal.depth_to_color.translation);
}
