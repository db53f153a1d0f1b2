//! demo - synthetic end-to-end pipeline run
//!
//! Runs the full capture -> scale -> detect -> overlay pipeline against
//! the synthetic source and stub backend, then prints a summary. No
//! hardware or model file required.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lookout::detect::{BackendRegistry, StubBackend};
use lookout::ingest::CameraConfig;
use lookout::session::CameraSession;
use lookout::settings::ThresholdStore;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Duration of the synthetic run in seconds.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Frames per second for the synthetic source.
    #[arg(long, default_value_t = 15)]
    fps: u32,
    /// Confidence threshold as a percentage.
    #[arg(long, default_value_t = 55.0)]
    confidence_pct: f64,
    /// IoU threshold as a percentage.
    #[arg(long, default_value_t = 60.0)]
    iou_pct: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    let store = Arc::new(ThresholdStore::new(args.confidence_pct, args.iou_pct)?);
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());

    let camera = CameraConfig {
        device: "stub://demo".to_string(),
        target_fps: args.fps,
        width: 640,
        height: 480,
    };
    let mut session = CameraSession::new(camera, store, Arc::new(registry));
    let preview = session.preview_handle();
    session.start()?;

    println!(
        "demo running for {}s at {} fps (confidence {}%, iou {}%)",
        args.seconds, args.fps, args.confidence_pct, args.iou_pct
    );

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut total_layers = 0usize;
    let mut passes_with_detections = 0u64;
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_secs(1));
        let state = preview.lock().expect("preview state lock poisoned");
        let layers = state.overlay.as_ref().map(|o| o.len()).unwrap_or(0);
        total_layers += layers;
        if layers > 0 {
            passes_with_detections += 1;
        }
        println!(
            "  processed={} dropped={} overlay_layers={} last_inference_ms={}",
            state.counters.frames_processed,
            state.counters.frames_dropped,
            layers,
            state
                .counters
                .last_inference_ms
                .map(|ms| format!("{ms:.1}"))
                .unwrap_or_else(|| "-".to_string()),
        );
        if let Some(overlay) = &state.overlay {
            for layer in &overlay.layers {
                let label = layer.text.replace('\n', " / ");
                println!(
                    "    [{:.0},{:.0} {:.0}x{:.0}] {}",
                    layer.rect.x, layer.rect.y, layer.rect.width, layer.rect.height, label
                );
            }
        }
    }

    session.stop();

    let state = preview.lock().expect("preview state lock poisoned");
    println!(
        "demo finished: {} frames processed, {} dropped, {} sampled overlay layers, {} sampled passes with detections",
        state.counters.frames_processed,
        state.counters.frames_dropped,
        total_layers,
        passes_with_detections
    );
    Ok(())
}
