// Lists capture devices and measures the raw frame rate of one of them.
use std::time::Instant;

use anyhow::Context;
use clap::Parser;

use attentiontracking::config::CameraConfig;
use attentiontracking::webcam::{list_devices, CameraProperty, FrameSource, OpenpnpCamera};

#[derive(Parser, Debug)]
#[command(about = "Inspect webcams available to openpnp-capture")]
struct ProbeArgs {
    /// Device to open; only lists devices when omitted
    #[arg(short, long)]
    camera: Option<u32>,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Frames to capture for the rate measurement
    #[arg(short, long, default_value_t = 100)]
    frames: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = ProbeArgs::parse();

    let devices = list_devices();
    println!("There are {} available cameras.", devices.len());
    for device in &devices {
        println!("[{}] {}", device.index, device.name);
        for format in &device.formats {
            println!(
                "    #{:<3} {}x{} @ {} fps {}",
                format.id,
                format.width,
                format.height,
                format.fps,
                format.fourcc_str()
            );
        }
    }

    let Some(index) = args.camera else {
        return Ok(());
    };

    let config = CameraConfig {
        device_index: index,
        width: args.width,
        height: args.height,
        ..CameraConfig::default()
    };
    let mut camera = OpenpnpCamera::open(&config).context("opening camera")?;
    let format = camera.format();
    println!(
        "Streaming {}x{} @ {} fps {}",
        format.width,
        format.height,
        format.fps,
        format.fourcc_str()
    );

    for property in CameraProperty::ALL {
        match camera.property_range(property) {
            Some(range) => println!(
                "{:?}: {} (default {}, range {}..={})",
                property, range.value, range.default, range.min, range.max
            ),
            None => println!("{:?}: unsupported", property),
        }
    }
    for property in [CameraProperty::Exposure, CameraProperty::WhiteBalance] {
        if let Some(auto) = camera.auto_property(property) {
            println!("auto {:?}: {}", property, auto);
        }
    }

    // rolling mean over the last 10 frame intervals
    let mut fps_vec: Vec<f32> = Vec::new();
    let mut last_frame_time = Instant::now();
    for _ in 0..args.frames {
        camera.read().context("capturing frame")?;

        let frame_delta = last_frame_time.elapsed().as_secs_f32();
        last_frame_time = Instant::now();
        fps_vec.push(1.0 / frame_delta);
        if fps_vec.len() > 10 {
            fps_vec.remove(0);
        }
    }

    if !fps_vec.is_empty() {
        let fps = fps_vec.iter().sum::<f32>() / fps_vec.len() as f32;
        println!("{}: {:.1} fps over the last {} frames", camera.name(), fps, fps_vec.len());
    }
    Ok(())
}
