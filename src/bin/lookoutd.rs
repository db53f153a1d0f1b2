//! lookoutd - live camera detection daemon
//!
//! This daemon:
//! 1. Loads configuration (file + environment + CLI overrides)
//! 2. Builds the configured detector backend
//! 3. Starts the camera session (capture thread + processing thread)
//! 4. Serves the control API (status, thresholds panel, PNG preview)
//! 5. Logs pipeline health periodically until shutdown

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lookout::api::{ApiConfig, ApiServer};
use lookout::config::LookoutConfig;
use lookout::detect::{coco_labels, load_labels, BackendRegistry, StubBackend};
use lookout::ingest::CameraConfig;
use lookout::session::CameraSession;
use lookout::settings::ThresholdStore;

/// Input size assumed for models that do not declare concrete dimensions.
#[cfg(feature = "backend-tract")]
const MODEL_FALLBACK_INPUT: (u32, u32) = (416, 416);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file path (JSON). Takes precedence over LOOKOUT_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Camera device path, or a stub:// synthetic source.
    #[arg(long)]
    device: Option<String>,
    /// ONNX model path; implies the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Some(path) = &args.config {
        std::env::set_var("LOOKOUT_CONFIG", path);
    }
    let mut cfg = LookoutConfig::load()?;
    if let Some(device) = args.device {
        cfg.camera.device = device;
    }
    if let Some(model) = args.model {
        cfg.model.path = Some(model);
        cfg.model.backend = "tract".to_string();
    }

    let labels = match &cfg.model.labels {
        Some(path) => load_labels(path)?,
        None => coco_labels(),
    };

    let registry = build_registry(&cfg, labels)?;
    let store = Arc::new(ThresholdStore::new(
        cfg.thresholds.confidence_pct,
        cfg.thresholds.iou_pct,
    )?);

    let camera = CameraConfig {
        device: cfg.camera.device.clone(),
        target_fps: cfg.camera.target_fps,
        width: cfg.camera.width,
        height: cfg.camera.height,
    };
    let mut session = CameraSession::new(camera, store.clone(), Arc::new(registry));

    // Camera startup failure keeps the daemon alive: the API stays up and
    // /status carries the failure string instead of a preview.
    if let Err(err) = session.start() {
        log::error!("camera session failed to start: {:#}", err);
    }

    let api_config = ApiConfig {
        addr: cfg.api.addr.clone(),
        token_path: cfg.api.token_path.clone(),
    };
    let api_handle = ApiServer::new(api_config, session.preview_handle(), store)
        .spawn()
        .context("start control api")?;
    log::info!("control api listening on {}", api_handle.addr);
    if let Some(path) = &api_handle.token_path {
        log::info!("control api capability token written to {}", path.display());
    } else {
        log::warn!(
            "control api capability token (handle securely): {}",
            api_handle.token
        );
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })
    .context("install shutdown handler")?;

    log::info!(
        "lookoutd running. device={} backend={}",
        cfg.camera.device,
        cfg.model.backend
    );

    let preview = session.preview_handle();
    let mut last_health_log = Instant::now();
    while running.load(Ordering::SeqCst) {
        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let state = preview.lock().expect("preview state lock poisoned");
            log::info!(
                "pipeline health={} captured={} processed={} dropped={} last_inference_ms={}",
                state.source_healthy,
                state.counters.frames_captured,
                state.counters.frames_processed,
                state.counters.frames_dropped,
                state
                    .counters
                    .last_inference_ms
                    .map(|ms| format!("{ms:.1}"))
                    .unwrap_or_else(|| "-".to_string()),
            );
            last_health_log = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    log::info!("shutting down");
    session.stop();
    api_handle.stop()?;
    Ok(())
}

/// Build a registry holding only the configured backend. A backend that
/// cannot be built leaves the registry empty; the session then runs
/// preview-only and reports why through its status string.
fn build_registry(cfg: &LookoutConfig, labels: Vec<String>) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    match cfg.model.backend.as_str() {
        "stub" => registry.register(StubBackend::with_labels(labels)),
        "tract" => {
            #[cfg(feature = "backend-tract")]
            {
                let path = cfg
                    .model
                    .path
                    .as_ref()
                    .context("the tract backend requires model.path")?;
                match lookout::detect::TractBackend::new(path, labels, MODEL_FALLBACK_INPUT) {
                    Ok(backend) => registry.register(backend),
                    Err(err) => log::warn!("model load failed: {:#}", err),
                }
            }
            #[cfg(not(feature = "backend-tract"))]
            log::warn!("tract backend requested but not compiled in (enable backend-tract)");
        }
        other => log::warn!("unknown detector backend '{}'", other),
    }
    Ok(registry)
}
