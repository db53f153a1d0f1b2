use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use lookout::api::{ApiConfig, ApiHandle, ApiServer};
use lookout::detect::{BackendRegistry, StubBackend};
use lookout::ingest::CameraConfig;
use lookout::session::CameraSession;
use lookout::settings::ThresholdStore;

struct TestApi {
    session: CameraSession,
    api_handle: Option<ApiHandle>,
    store: Arc<ThresholdStore>,
}

impl TestApi {
    fn new(start_session: bool) -> Result<Self> {
        let store = Arc::new(ThresholdStore::new(70.0, 60.0)?);
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());
        let mut session = CameraSession::new(
            CameraConfig {
                device: "stub://api-test".to_string(),
                target_fps: 30,
                width: 64,
                height: 48,
            },
            store.clone(),
            Arc::new(registry),
        );
        if start_session {
            session.start()?;
        }

        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            token_path: None,
        };
        let api_handle =
            ApiServer::new(api_config, session.preview_handle(), store.clone()).spawn()?;

        Ok(Self {
            session,
            api_handle: Some(api_handle),
            store,
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
    }

    fn get(&self, path: &str, token: Option<&str>) -> Result<(String, String)> {
        let mut stream = TcpStream::connect(self.handle().addr)?;
        let auth = token
            .map(|t| format!("Authorization: Bearer {t}\r\n"))
            .unwrap_or_default();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n{auth}\r\n");
        stream.write_all(request.as_bytes())?;
        read_response(&mut stream)
    }

    fn post(&self, path: &str, token: &str, body: &str) -> Result<(String, String)> {
        let mut stream = TcpStream::connect(self.handle().addr)?;
        let request = format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer {token}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(request.as_bytes())?;
        read_response(&mut stream)
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        self.session.stop();
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

fn read_response(stream: &mut TcpStream) -> Result<(String, String)> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

#[test]
fn health_needs_no_token() -> Result<()> {
    let api = TestApi::new(false)?;
    let (headers, body) = api.get("/health", None)?;
    assert!(headers.contains("200 OK"));
    assert!(body.contains("ok"));
    Ok(())
}

#[test]
fn thresholds_require_a_valid_token() -> Result<()> {
    let api = TestApi::new(false)?;

    let (headers, _) = api.get("/thresholds", None)?;
    assert!(headers.contains("401 Unauthorized"));

    let bogus = "0".repeat(64);
    let (headers, _) = api.get("/thresholds", Some(&bogus))?;
    assert!(headers.contains("401 Unauthorized"));
    Ok(())
}

#[test]
fn threshold_round_trip_normalizes_percentages() -> Result<()> {
    let api = TestApi::new(false)?;
    let token = api.handle().token.clone();

    let (headers, body) = api.get("/thresholds", Some(&token))?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["confidence_pct"].as_f64().unwrap(), 70.0);
    assert_eq!(value["iou_pct"].as_f64().unwrap(), 60.0);

    let (headers, body) = api.post(
        "/thresholds",
        &token,
        r#"{"confidence_pct": 85, "iou_pct": 45}"#,
    )?;
    assert!(headers.contains("200 OK"), "unexpected response: {headers}");
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["confidence_pct"].as_f64().unwrap(), 85.0);
    assert!((value["confidence"].as_f64().unwrap() - 0.85).abs() < 1e-6);

    let stored = api.store.snapshot();
    assert!((stored.confidence - 0.85).abs() < 1e-6);
    assert!((stored.iou - 0.45).abs() < 1e-6);
    Ok(())
}

#[test]
fn off_step_threshold_values_are_rejected() -> Result<()> {
    let api = TestApi::new(false)?;
    let token = api.handle().token.clone();

    let (headers, _) = api.post(
        "/thresholds",
        &token,
        r#"{"confidence_pct": 82, "iou_pct": 60}"#,
    )?;
    assert!(headers.contains("400 Bad Request"));

    let (headers, _) = api.post(
        "/thresholds",
        &token,
        r#"{"confidence_pct": 70, "iou_pct": 101}"#,
    )?;
    assert!(headers.contains("400 Bad Request"));

    // Store unchanged after rejected updates.
    let stored = api.store.snapshot();
    assert!((stored.confidence - 0.70).abs() < 1e-6);
    assert!((stored.iou - 0.60).abs() < 1e-6);
    Ok(())
}

#[test]
fn preview_without_a_frame_reports_status() -> Result<()> {
    let api = TestApi::new(false)?;
    let token = api.handle().token.clone();

    let (headers, body) = api.get("/preview", Some(&token))?;
    assert!(headers.contains("404 Not Found"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["error"].as_str().unwrap(), "no_frame");
    assert!(value["status"].is_string());
    Ok(())
}

#[test]
fn preview_serves_png_once_frames_flow() -> Result<()> {
    let api = TestApi::new(true)?;
    let token = api.handle().token.clone();

    // Wait for the pipeline to publish at least one frame.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let (headers, body) = api.get("/status", Some(&token))?;
        assert!(headers.contains("200 OK"));
        let value: Value = serde_json::from_str(&body)?;
        if value["counters"]["frames_processed"].as_u64().unwrap_or(0) >= 1 {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "pipeline made no progress"
        );
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    let mut stream = TcpStream::connect(api.handle().addr)?;
    let request = format!(
        "GET /preview HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer {token}\r\n\r\n"
    );
    stream.write_all(request.as_bytes())?;
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw)?;
    let header_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response headers");
    let headers = String::from_utf8_lossy(&raw[..header_end]);
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("image/png"));
    // PNG magic bytes.
    assert_eq!(&raw[header_end + 4..header_end + 8], b"\x89PNG");
    Ok(())
}
