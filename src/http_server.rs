use anyhow::{bail, Context, Result};
use log::{debug, info, log_enabled, warn, Level};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, UNIX_EPOCH};

use crate::animation::AnimationDriver;
use crate::config::HttpConfig;
use crate::controller::{ControllerError, DeviceController};
use crate::pages;
use crate::pixel_format::Rgb;
use crate::presets::{self, PRESETS};
use crate::system_stats::SystemStats;

const MAX_HEAD_SIZE: usize = 8 * 1024;
const MAX_BODY_SIZE: usize = 64 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const STATS_INTERVAL: Duration = Duration::from_secs(5);

const WHITE: Rgb = Rgb::new(255, 255, 255);

/// Parsed HTTP request line, query and body
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    fn text(status: u16, body: &str) -> Self {
        Response {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.as_bytes().to_vec(),
        }
    }

    fn html(body: String) -> Self {
        Response {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.into_bytes(),
        }
    }

    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec_pretty(value) {
            Ok(body) => Response {
                status,
                content_type: "application/json",
                body,
            },
            Err(e) => Response::text(500, &format!("Failed to encode response: {}", e)),
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Response::json(status, &ErrorBody { error: message.into() })
    }

    fn ok() -> Self {
        Response::text(200, "OK")
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write!(
            writer,
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len()
        )?;
        writer.write_all(&self.body)?;
        writer.flush()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct PixelsBody {
    pixels: Vec<[i64; 3]>,
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    server_uptime_seconds: f64,
    server_uptime: String,
    server_started: u64,
    updates_processed: u64,
    requests_served: u64,
    num_leds: usize,
    brightness: u8,
    current_color: Rgb,
    animation: Option<&'static str>,
    last_error: Option<String>,
    system: SystemStats,
}

/// Everything a request handler needs, shared by all connection threads
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<DeviceController>,
    pub animations: Arc<AnimationDriver>,
    pub requests_served: Arc<AtomicU64>,
}

/// HTTP control surface: one thread per connection, all sharing one controller
pub struct HttpServer {
    listener: TcpListener,
    state: AppState,
    running: Arc<AtomicBool>,
}

impl HttpServer {
    /// Bind the listener; `run` serves until `running` is cleared
    pub fn bind(
        config: &HttpConfig,
        controller: Arc<DeviceController>,
        animations: Arc<AnimationDriver>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener =
            TcpListener::bind(&addr).context(format!("Failed to bind to {}", addr))?;

        // Set nonblocking so accept() can check running flag periodically
        listener.set_nonblocking(true)?;

        Ok(HttpServer {
            listener,
            state: AppState {
                controller,
                animations,
                requests_served: Arc::new(AtomicU64::new(0)),
            },
            running,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the running flag is cleared
    pub fn run(&self) -> Result<()> {
        info!("✓ HTTP server listening on http://{}", self.local_addr()?);

        if log_enabled!(Level::Debug) {
            self.spawn_stats_thread();
        }

        while self.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    let state = self.state.clone();
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, peer_addr, &state) {
                            debug!("Error handling {}: {:#}", peer_addr, e);
                        }
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    // No connection ready, sleep briefly to avoid busy-waiting
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    warn!("Error accepting connection: {}", e);
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }

        info!("HTTP server stopped");
        Ok(())
    }

    /// Log request and LED update rates while running
    fn spawn_stats_thread(&self) {
        let requests = Arc::clone(&self.state.requests_served);
        let controller = Arc::clone(&self.state.controller);
        let running = Arc::clone(&self.running);

        thread::spawn(move || {
            let mut last_requests = 0u64;
            let mut last_updates = 0u64;
            let secs = STATS_INTERVAL.as_secs_f64();

            while running.load(Ordering::Relaxed) {
                thread::sleep(STATS_INTERVAL);

                let current_requests = requests.load(Ordering::Relaxed);
                let current_updates = controller.snapshot().updates;
                debug!(
                    "[Stats] Requests: {:.1}/s, LED updates: {:.1}/s",
                    (current_requests - last_requests) as f64 / secs,
                    (current_updates - last_updates) as f64 / secs
                );
                last_requests = current_requests;
                last_updates = current_updates;
            }
        });
    }
}

fn handle_connection(mut stream: TcpStream, peer_addr: SocketAddr, state: &AppState) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream
        .set_read_timeout(Some(READ_TIMEOUT))
        .context("Failed to set read timeout")?;

    let response = match read_request(&mut stream) {
        Ok(Some(request)) => {
            state.requests_served.fetch_add(1, Ordering::Relaxed);
            let response = route(&request, state);
            if response.status == 200 {
                debug!("{} {} from {} -> 200", request.method, request.path, peer_addr);
            } else {
                info!(
                    "{} {} from {} -> {}",
                    request.method, request.path, peer_addr, response.status
                );
            }
            response
        }
        Ok(None) => return Ok(()),
        Err(e) => Response::error(400, format!("Bad request: {}", e)),
    };

    response
        .write_to(&mut stream)
        .context("Failed to write response")
}

/// Read one request; `None` if the peer closed without sending anything
pub fn read_request<R: Read>(reader: &mut R) -> Result<Option<Request>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = find_subslice(&buffer, b"\r\n\r\n") {
            break pos;
        }
        if buffer.len() > MAX_HEAD_SIZE {
            bail!("request head exceeds {} bytes", MAX_HEAD_SIZE);
        }
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            bail!("connection closed mid-request");
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let head = std::str::from_utf8(&buffer[..head_end]).context("request head is not UTF-8")?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        bail!("malformed request line {:?}", request_line);
    };

    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().context("invalid Content-Length")?;
            }
        }
    }
    if content_length > MAX_BODY_SIZE {
        bail!("request body exceeds {} bytes", MAX_BODY_SIZE);
    }

    let mut body = buffer[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            bail!("connection closed mid-body");
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    Ok(Some(Request {
        method: method.to_ascii_uppercase(),
        path: percent_decode(path),
        query: parse_query(query),
        body,
    }))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            other => out.push(other),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Dispatch a parsed request to its handler
pub fn route(request: &Request, state: &AppState) -> Response {
    let method = request.method.as_str();
    let expected = match request.path.as_str() {
        "/pixels" => "POST",
        "/" | "/update" | "/clear" | "/brightness" | "/health" | "/presets" | "/api/docs"
        | "/animation/rainbow" | "/animation/breathing" | "/animation/stop" => "GET",
        _ => return Response::error(404, format!("No route for {}", request.path)),
    };
    if method != expected {
        return Response::error(405, format!("{} expects {}", request.path, expected));
    }

    let result = match request.path.as_str() {
        "/" => Ok(Response::html(pages::control_page(
            &state.controller.snapshot(),
        ))),
        "/api/docs" => Ok(Response::html(pages::API_DOCS.to_string())),
        "/health" => Ok(health(state)),
        "/presets" => Ok(preset_list()),
        "/update" => update(request, state),
        "/clear" => {
            state.animations.cancel();
            state.controller.clear().map(|()| Response::ok())
        }
        "/brightness" => brightness(request, state),
        "/pixels" => pixels(request, state),
        "/animation/rainbow" => {
            state.animations.start_rainbow();
            Ok(Response::ok())
        }
        "/animation/breathing" => {
            resolve_color(request, WHITE).map(|color| {
                state.animations.start_breathing(color);
                Response::ok()
            })
        }
        "/animation/stop" => {
            let stopped = state.animations.cancel();
            Ok(Response::json(200, &BTreeMap::from([("stopped", stopped)])))
        }
        _ => unreachable!("path matched above"),
    };

    result.unwrap_or_else(error_response)
}

fn error_response(err: ControllerError) -> Response {
    match err {
        ControllerError::InvalidPixelData(reason) => {
            Response::error(400, format!("Bad request: {}", reason))
        }
        ControllerError::Transport(e) => {
            Response::error(500, format!("Failed to update LEDs: {}", e))
        }
        ControllerError::Closed => Response::error(503, "LED controller is shutting down"),
    }
}

fn int_param(request: &Request, name: &str) -> Result<Option<i64>, ControllerError> {
    request
        .param(name)
        .map(|value| {
            value.trim().parse::<i64>().map_err(|_| {
                ControllerError::InvalidPixelData(format!("{} must be an integer, got {:?}", name, value))
            })
        })
        .transpose()
}

/// Color from `color=<preset>`, or from `r`/`g`/`b` clamped to 0..=255 with
/// missing channels taken from `fallback`
fn resolve_color(request: &Request, fallback: Rgb) -> Result<Rgb, ControllerError> {
    if let Some(name) = request.param("color") {
        return presets::lookup(name)
            .ok_or_else(|| ControllerError::InvalidPixelData(format!("unknown color {:?}", name)));
    }

    let r = int_param(request, "r")?.unwrap_or(fallback.r as i64);
    let g = int_param(request, "g")?.unwrap_or(fallback.g as i64);
    let b = int_param(request, "b")?.unwrap_or(fallback.b as i64);
    Ok(Rgb::clamped(r, g, b))
}

fn update(request: &Request, state: &AppState) -> Result<Response, ControllerError> {
    let current = state.controller.snapshot().current_color();
    let color = resolve_color(request, current)?;

    state.animations.cancel();
    state.controller.set_uniform_color(color)?;
    Ok(Response::ok())
}

fn brightness(request: &Request, state: &AppState) -> Result<Response, ControllerError> {
    let value = int_param(request, "value")?
        .ok_or_else(|| ControllerError::InvalidPixelData("missing value".to_string()))?;

    state.controller.set_brightness(value.clamp(0, 255) as u8)?;
    Ok(Response::ok())
}

fn pixels(request: &Request, state: &AppState) -> Result<Response, ControllerError> {
    let body: PixelsBody = serde_json::from_slice(&request.body)
        .map_err(|e| ControllerError::InvalidPixelData(format!("invalid JSON body: {}", e)))?;
    let pixels = body
        .pixels
        .iter()
        .map(|&[r, g, b]| Rgb::from_channels(r, g, b))
        .collect::<Result<Vec<_>, _>>()?;

    state.animations.cancel();
    state.controller.set_pixels(&pixels)?;
    Ok(Response::ok())
}

fn preset_list() -> Response {
    let presets: BTreeMap<&str, [u8; 3]> = PRESETS
        .iter()
        .map(|&(name, color)| (name, [color.r, color.g, color.b]))
        .collect();
    Response::json(200, &presets)
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn health(state: &AppState) -> Response {
    let device = state.controller.snapshot();

    let report = HealthReport {
        status: if device.last_error.is_some() { "degraded" } else { "ok" },
        server_uptime_seconds: (device.uptime.as_secs_f64() * 100.0).round() / 100.0,
        server_uptime: format_uptime(device.uptime),
        server_started: device
            .started_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
        updates_processed: device.updates,
        requests_served: state.requests_served.load(Ordering::Relaxed),
        num_leds: device.led_count,
        brightness: device.brightness,
        current_color: device.current_color(),
        animation: state.animations.active(),
        last_error: device.last_error,
        system: SystemStats::collect(),
    };

    Response::json(200, &report)
}
