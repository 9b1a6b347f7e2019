//! Run capture cycles against a simulated camera streaming in the background.
//!
//! Usage: cargo run --example stream
//! Press Ctrl+C to stop.

use kinz::sim::SimSdk;
use kinz::{Flags, Session, SessionConfig};
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let mut sdk = SimSdk::new();
    let feed = sdk.attach("000000000002");

    let mut session = match Session::open(
        &sdk,
        Flags::C720 | Flags::D_BINNED,
        SessionConfig::from_env(),
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open device: {}", e);
            std::process::exit(1);
        }
    };

    let fps = session.device_config().camera_fps as u32;
    let _streamer = match feed.stream(session.calibration().clone(), 1000, fps) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to start stream: {}", e);
            std::process::exit(1);
        }
    };

    println!("Streaming at {} fps (Ctrl+C to stop)...", fps);

    let start = Instant::now();
    let mut count: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        let report = session.acquire(Flags::IMAGES);
        if !report.captured {
            for diag in &report.diagnostics {
                eprintln!("{}", diag);
            }
            continue;
        }
        count += 1;

        if count % 30 == 1 {
            match session.point_cloud(true) {
                Ok(cloud) => {
                    let center = cloud.point(cloud.len() / 2 + cloud.width as usize / 2);
                    println!(
                        "cycle={:<6} validity={:?}  center=[{:+}, {:+}, {:+}] mm  colored={}",
                        count,
                        report.validity(),
                        center[0],
                        center[1],
                        center[2],
                        cloud.colors.is_some(),
                    );
                }
                Err(e) => eprintln!("Point cloud error: {}", e),
            }
        }

        let now = Instant::now();
        if now.duration_since(last_report) >= Duration::from_secs(3) {
            let elapsed = start.elapsed().as_secs_f64();
            println!(
                "--- {} cycles in {:.1}s ({:.1} Hz), peak live captures {} ---",
                count,
                elapsed,
                count as f64 / elapsed,
                feed.peak_live_captures()
            );
            last_report = now;
        }
    }
}
