//! Local control API.
//!
//! Serves the live preview and the threshold settings panel over a
//! loopback HTTP listener:
//!
//! - `GET /health` (no auth)
//! - `GET /status`: counters, source health, current thresholds
//! - `GET /thresholds`: current values as percentages
//! - `POST /thresholds`: the panel's confirm action; percentage values
//!   (0-100, step 5) are validated, normalized, and applied to the store
//! - `GET /preview`: latest frame with the overlay rendered, as PNG
//!
//! All routes except /health require the bearer capability token printed
//! (or written to a file) at startup.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;

use crate::session::PreviewState;
use crate::settings::ThresholdStore;

const MAX_REQUEST_BYTES: usize = 8192;

/// Slider granularity of the settings panel.
pub const THRESHOLD_STEP_PCT: f64 = 5.0;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub token_path: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8745".to_string(),
            token_path: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    pub token: String,
    pub token_path: Option<PathBuf>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    preview: Arc<Mutex<PreviewState>>,
    store: Arc<ThresholdStore>,
}

impl ApiServer {
    pub fn new(
        cfg: ApiConfig,
        preview: Arc<Mutex<PreviewState>>,
        store: Arc<ThresholdStore>,
    ) -> Self {
        Self {
            cfg,
            preview,
            store,
        }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let token = generate_token();
        if let Some(path) = &self.cfg.token_path {
            write_token_file(path, &token)?;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let token_path = self.cfg.token_path.clone();
        let token_thread = token.clone();
        let preview = self.preview;
        let store = self.store;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, preview, store, token_thread, shutdown_thread) {
                log::error!("control api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            token,
            token_path,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    preview: Arc<Mutex<PreviewState>>,
    store: Arc<ThresholdStore>,
    token: String,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &preview, &store, &token) {
                    log::warn!("control api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    preview: &Mutex<PreviewState>,
    store: &ThresholdStore,
    token: &str,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;

    if request.method == "GET" && request.path == "/health" {
        write_json_response(&mut stream, 200, r#"{"status":"ok"}"#)?;
        return Ok(());
    }

    let presented = match request.bearer_token() {
        Some(presented) => presented,
        None => {
            write_json_response(&mut stream, 401, r#"{"error":"missing_token"}"#)?;
            return Ok(());
        }
    };
    if presented != token {
        write_json_response(&mut stream, 401, r#"{"error":"invalid_token"}"#)?;
        return Err(anyhow!("capability token invalid"));
    }

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/status") => handle_status(&mut stream, preview, store),
        ("GET", "/thresholds") => handle_thresholds_get(&mut stream, store),
        ("POST", "/thresholds") => handle_thresholds_post(&mut stream, &request, store),
        ("GET", "/preview") => handle_preview(&mut stream, preview),
        ("GET", _) | ("POST", _) => {
            write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)
        }
        _ => write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#),
    }
}

fn handle_status(
    stream: &mut TcpStream,
    preview: &Mutex<PreviewState>,
    store: &ThresholdStore,
) -> Result<()> {
    let thresholds = store.snapshot();
    let payload = {
        let state = preview.lock().expect("preview state lock poisoned");
        json!({
            "status": state.status.clone(),
            "source_healthy": state.source_healthy,
            "counters": state.counters.clone(),
            "overlay_layers": state.overlay.as_ref().map(|o| o.len()).unwrap_or(0),
            "thresholds": {
                "confidence_pct": thresholds.confidence_pct(),
                "iou_pct": thresholds.iou_pct(),
            },
        })
    };
    write_response(stream, 200, "application/json", &serde_json::to_vec(&payload)?)
}

fn handle_thresholds_get(stream: &mut TcpStream, store: &ThresholdStore) -> Result<()> {
    let thresholds = store.snapshot();
    let payload = json!({
        "confidence_pct": thresholds.confidence_pct(),
        "iou_pct": thresholds.iou_pct(),
    });
    write_response(stream, 200, "application/json", &serde_json::to_vec(&payload)?)
}

#[derive(Debug, Deserialize)]
struct ThresholdUpdate {
    confidence_pct: f64,
    iou_pct: f64,
}

fn handle_thresholds_post(
    stream: &mut TcpStream,
    request: &HttpRequest,
    store: &ThresholdStore,
) -> Result<()> {
    let update: ThresholdUpdate = match serde_json::from_slice(&request.body) {
        Ok(update) => update,
        Err(err) => {
            write_json_response(stream, 400, r#"{"error":"invalid_body"}"#)?;
            return Err(anyhow!("invalid threshold body: {}", err));
        }
    };

    for (name, pct) in [
        ("confidence_pct", update.confidence_pct),
        ("iou_pct", update.iou_pct),
    ] {
        if let Err(err) = validate_slider_step(pct) {
            let body = serde_json::to_vec(&json!({"error": "invalid_value", "field": name}))?;
            write_response(stream, 400, "application/json", &body)?;
            return Err(anyhow!("{}: {}", name, err));
        }
    }

    match store.apply_percent(update.confidence_pct, update.iou_pct) {
        Ok(applied) => {
            let payload = json!({
                "confidence_pct": applied.confidence_pct(),
                "iou_pct": applied.iou_pct(),
                "confidence": applied.confidence,
                "iou": applied.iou,
            });
            write_response(stream, 200, "application/json", &serde_json::to_vec(&payload)?)
        }
        Err(err) => {
            write_json_response(stream, 400, r#"{"error":"invalid_value"}"#)?;
            Err(err)
        }
    }
}

fn handle_preview(stream: &mut TcpStream, preview: &Mutex<PreviewState>) -> Result<()> {
    let (image, status) = {
        let state = preview.lock().expect("preview state lock poisoned");
        (state.annotated_rgba(), state.status.clone())
    };
    match image {
        Some(image) => {
            let mut buf = Vec::new();
            image.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
            write_response(stream, 200, "image/png", &buf)
        }
        None => {
            let body = serde_json::to_vec(&json!({"error": "no_frame", "status": status}))?;
            write_response(stream, 404, "application/json", &body)
        }
    }
}

/// Reject values off the settings panel's slider grid.
fn validate_slider_step(pct: f64) -> Result<()> {
    if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
        return Err(anyhow!("must be a percentage in 0-100"));
    }
    let remainder = pct % THRESHOLD_STEP_PCT;
    if remainder.abs() > 1e-9 && (THRESHOLD_STEP_PCT - remainder).abs() > 1e-9 {
        return Err(anyhow!(
            "must be a multiple of {} percent",
            THRESHOLD_STEP_PCT
        ));
    }
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let mut header_end = None;
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            header_end = Some(pos + 4);
            break;
        }
    }
    let header_end = header_end.ok_or_else(|| anyhow!("malformed request"))?;

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .map(|v| v.parse())
        .transpose()
        .map_err(|_| anyhow!("invalid content-length"))?
        .unwrap_or(0);
    if header_end + content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request too large"));
    }
    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        401 => "HTTP/1.1 401 Unauthorized",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn bearer_token(&self) -> Option<String> {
        if let Some(value) = self.headers.get("authorization") {
            let parts: Vec<&str> = value.split_whitespace().collect();
            if parts.len() == 2 && parts[0].eq_ignore_ascii_case("bearer") {
                return Some(parts[1].to_string());
            }
        }
        None
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn write_token_file(path: &Path, token: &str) -> Result<()> {
    std::fs::write(path, format!("{token}\n"))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}
