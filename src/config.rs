use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_DEVICE: &str = "stub://camera";
const DEFAULT_TARGET_FPS: u32 = 15;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8745";
const DEFAULT_CONFIDENCE_PCT: f64 = 70.0;
const DEFAULT_IOU_PCT: f64 = 60.0;

#[derive(Debug, Deserialize, Default)]
struct LookoutConfigFile {
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
    thresholds: Option<ThresholdConfigFile>,
    api: Option<ApiConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<PathBuf>,
    labels: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdConfigFile {
    confidence_pct: Option<f64>,
    iou_pct: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    token_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LookoutConfig {
    pub camera: CameraSettings,
    pub model: ModelSettings,
    pub thresholds: ThresholdSettings,
    pub api: ApiSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Detector backend name ("stub", "tract").
    pub backend: String,
    /// ONNX model path; required for the tract backend.
    pub path: Option<PathBuf>,
    /// Class labels file, one name per line; COCO-80 when unset.
    pub labels: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ThresholdSettings {
    pub confidence_pct: f64,
    pub iou_pct: f64,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub addr: String,
    pub token_path: Option<PathBuf>,
}

impl LookoutConfig {
    /// Load configuration: file named by LOOKOUT_CONFIG (JSON), then
    /// environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LOOKOUT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LookoutConfigFile) -> Self {
        let camera = CameraSettings {
            device: file
                .camera
                .as_ref()
                .and_then(|camera| camera.device.clone())
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            target_fps: file
                .camera
                .as_ref()
                .and_then(|camera| camera.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(DEFAULT_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|camera| camera.height)
                .unwrap_or(DEFAULT_HEIGHT),
        };
        let model = ModelSettings {
            backend: file
                .model
                .as_ref()
                .and_then(|model| model.backend.clone())
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            path: file.model.as_ref().and_then(|model| model.path.clone()),
            labels: file.model.and_then(|model| model.labels),
        };
        let thresholds = ThresholdSettings {
            confidence_pct: file
                .thresholds
                .as_ref()
                .and_then(|thresholds| thresholds.confidence_pct)
                .unwrap_or(DEFAULT_CONFIDENCE_PCT),
            iou_pct: file
                .thresholds
                .as_ref()
                .and_then(|thresholds| thresholds.iou_pct)
                .unwrap_or(DEFAULT_IOU_PCT),
        };
        let api = ApiSettings {
            addr: file
                .api
                .as_ref()
                .and_then(|api| api.addr.clone())
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            token_path: file.api.and_then(|api| api.token_path),
        };
        Self {
            camera,
            model,
            thresholds,
            api,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("LOOKOUT_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(path) = std::env::var("LOOKOUT_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(addr) = std::env::var("LOOKOUT_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api.addr = addr;
            }
        }
        if let Ok(path) = std::env::var("LOOKOUT_API_TOKEN_PATH") {
            if !path.trim().is_empty() {
                self.api.token_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(pct) = std::env::var("LOOKOUT_CONFIDENCE_PCT") {
            self.thresholds.confidence_pct = pct
                .parse()
                .map_err(|_| anyhow!("LOOKOUT_CONFIDENCE_PCT must be a number in 0-100"))?;
        }
        if let Ok(pct) = std::env::var("LOOKOUT_IOU_PCT") {
            self.thresholds.iou_pct = pct
                .parse()
                .map_err(|_| anyhow!("LOOKOUT_IOU_PCT must be a number in 0-100"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be greater than zero"));
        }
        for (name, pct) in [
            ("confidence_pct", self.thresholds.confidence_pct),
            ("iou_pct", self.thresholds.iou_pct),
        ] {
            if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
                return Err(anyhow!("{} must be a percentage in 0-100", name));
            }
        }
        if self.model.backend == "tract" && self.model.path.is_none() {
            return Err(anyhow!("the tract backend requires model.path"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<LookoutConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
