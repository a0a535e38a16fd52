//! HTTP stats server for engine monitoring.
//!
//! Provides a simple `/stats` endpoint that returns the engine's
//! [`StatsSnapshot`] as JSON, plus the server uptime.
//!
//! # Example Response
//!
//! ```json
//! {
//!   "uptime_secs": 3600,
//!   "duplicate_rate": 0.75,
//!   "packets_received": 14,
//!   "packets_duplicate": 42,
//!   "packets_invalid": 0,
//!   "packets_rejected": 0,
//!   "streams_completed": 1,
//!   "streams_timeout": 0,
//!   "streams_malformed": 0,
//!   "active_streams": 0,
//!   "dedup_cache_size": 14,
//!   "completed_pending": 1
//! }
//! ```

use crate::engine::{Engine, StatsSnapshot};
use log::{error, info, warn};
use serde::Serialize;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tiny_http::{Header, Method, Response, Server};

/// Default port for the stats server.
pub const DEFAULT_STATS_PORT: u16 = 8080;

#[derive(Serialize)]
struct StatsBody {
    uptime_secs: u64,
    duplicate_rate: f64,
    #[serde(flatten)]
    stats: StatsSnapshot,
}

/// Render the `/stats` body for an engine.
fn render(engine: &Engine, started: Instant) -> Result<String, serde_json::Error> {
    let stats = engine.stats();
    serde_json::to_string(&StatsBody {
        uptime_secs: started.elapsed().as_secs(),
        duplicate_rate: stats.duplicate_rate(),
        stats,
    })
}

fn static_header(field: &str, value: &str) -> io::Result<Header> {
    Header::from_bytes(field.as_bytes(), value.as_bytes()).map_err(|()| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("bad header {}: {}", field, value),
        )
    })
}

/// Headers reused for every response.
struct Headers {
    content_type: Header,
    location: Header,
    allow_get: Header,
}

/// HTTP stats server.
///
/// Runs in a background thread and serves engine statistics as JSON.
pub struct StatsServer {
    /// Server thread handle.
    handle: Option<thread::JoinHandle<()>>,
    /// Flag to signal shutdown.
    shutdown: Arc<AtomicBool>,
    /// Bound address.
    local_addr: Option<SocketAddr>,
}

impl StatsServer {
    /// Start the stats server.
    ///
    /// # Arguments
    ///
    /// * `bind_addr` - IP address to bind to (use `None` for 0.0.0.0)
    /// * `port` - Port to listen on (0 picks a free port)
    /// * `engine` - Engine whose statistics are served
    ///
    /// # Returns
    ///
    /// A handle to the running server. Drop it to stop the server.
    pub fn start(bind_addr: Option<IpAddr>, port: u16, engine: Arc<Engine>) -> io::Result<Self> {
        let addr = match bind_addr {
            Some(ip) => format!("{}:{}", ip, port),
            None => format!("0.0.0.0:{}", port),
        };

        let headers = Headers {
            content_type: static_header("Content-Type", "application/json")?,
            location: static_header("Location", "/stats")?,
            allow_get: static_header("Allow", "GET")?,
        };

        let server = Server::http(&addr)
            .map_err(|e| io::Error::new(io::ErrorKind::AddrInUse, format!("{}", e)))?;
        let local_addr = server.server_addr().to_ip();

        info!(
            "Stats server listening on http://{}/stats",
            local_addr.map_or(addr, |a| a.to_string())
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let handle = thread::spawn(move || {
            Self::run_server(server, engine, headers, shutdown_clone);
        });

        Ok(Self {
            handle: Some(handle),
            shutdown,
            local_addr,
        })
    }

    /// Get the address the server is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn run_server(
        server: Server,
        engine: Arc<Engine>,
        headers: Headers,
        shutdown: Arc<AtomicBool>,
    ) {
        let started = Instant::now();

        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("Stats server shutting down");
                break;
            }

            match server.recv_timeout(Duration::from_millis(100)) {
                Ok(Some(request)) => {
                    if request.method() != &Method::Get {
                        let response = Response::from_string("Method Not Allowed")
                            .with_status_code(405)
                            .with_header(headers.allow_get.clone());
                        let _ = request.respond(response);
                        continue;
                    }

                    let path = request.url();

                    if path == "/stats" || path == "/stats/" {
                        let response = match render(&engine, started) {
                            Ok(json) => Response::from_string(json)
                                .with_header(headers.content_type.clone())
                                .with_status_code(200),
                            Err(e) => {
                                error!("Failed to serialize stats: {}", e);
                                Response::from_string("Internal Server Error").with_status_code(500)
                            }
                        };

                        if let Err(e) = request.respond(response) {
                            warn!("Failed to send response: {}", e);
                        }
                    } else if path == "/" {
                        let response = Response::from_string("See /stats for engine statistics")
                            .with_status_code(302)
                            .with_header(headers.location.clone());

                        if let Err(e) = request.respond(response) {
                            warn!("Failed to send redirect: {}", e);
                        }
                    } else {
                        let response = Response::from_string("Not Found").with_status_code(404);

                        if let Err(e) = request.respond(response) {
                            warn!("Failed to send 404: {}", e);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Server error: {}", e);
                    break;
                }
            }
        }
    }

    /// Stop the server.
    ///
    /// Note: May take up to 100ms due to polling interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::frame::{DeviceId, Frame, VERSION_RAW};
    use crate::samples::ProtocolRegistry;
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpStream};

    fn engine() -> Arc<Engine> {
        Arc::new(Engine::new(EngineConfig::default(), ProtocolRegistry::default()).unwrap())
    }

    fn request(addr: SocketAddr, method: &str, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        write!(
            stream,
            "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            method, path
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    fn start(engine: Arc<Engine>) -> (StatsServer, SocketAddr) {
        let server = StatsServer::start(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), 0, engine).unwrap();
        let addr = server.local_addr().unwrap();
        (server, addr)
    }

    #[test]
    fn test_render_includes_counters_and_uptime() {
        let engine = engine();
        let device = DeviceId::new("AA:BB:CC:DD:EE:FF");
        let raw = Frame::new(VERSION_RAW, 1, 0, 14, vec![0; 12]).to_bytes();
        let _ = engine.ingest(&device, &raw);
        let _ = engine.ingest(&device, &raw);

        let json: serde_json::Value =
            serde_json::from_str(&render(&engine, Instant::now()).unwrap()).unwrap();
        assert_eq!(json["uptime_secs"], 0);
        assert_eq!(json["packets_received"], 1);
        assert_eq!(json["packets_duplicate"], 1);
        assert_eq!(json["active_streams"], 1);
        assert_eq!(json["duplicate_rate"], 0.5);
    }

    #[test]
    fn test_stats_endpoint() {
        let (_server, addr) = start(engine());
        let response = request(addr, "GET", "/stats");
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.contains("application/json"));
        assert!(response.contains("\"uptime_secs\":"));
        assert!(response.contains("\"dedup_cache_size\":0"));
    }

    #[test]
    fn test_root_redirects() {
        let (_server, addr) = start(engine());
        let response = request(addr, "GET", "/");
        assert!(response.starts_with("HTTP/1.1 302"), "{}", response);
        assert!(response.contains("Location: /stats"));
    }

    #[test]
    fn test_other_paths_and_methods() {
        let (_server, addr) = start(engine());
        assert!(request(addr, "GET", "/metrics").starts_with("HTTP/1.1 404"));
        assert!(request(addr, "POST", "/stats").starts_with("HTTP/1.1 405"));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut server, _addr) = start(engine());
        server.stop();
        server.stop();
    }
}
