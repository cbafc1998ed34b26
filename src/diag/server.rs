//! HTTP endpoint serving connectivity counters.
//!
//! `GET /stats` returns [`ConnectivityStats`] as JSON, `/` redirects there.
//! Runs on its own thread with `tiny_http` so it never touches the event loop.
//!
//! # Example Response
//!
//! ```json
//! {
//!   "uptime_secs": 3600,
//!   "scans": { "started": 42, "skipped": 7, "failed": 1, "retried": 1,
//!              "abandoned": 0, "background": 3 },
//!   "connections": { "selections": 40, "no_candidate": 12, "connects": 4, ... }
//! }
//! ```

use super::ConnectivityStats;
use log::{error, info, warn};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};

/// Default port for the stats server.
pub const DEFAULT_STATS_PORT: u16 = 8080;

/// HTTP stats server. Drop it to stop the server.
pub struct StatsServer {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    port: u16,
}

impl StatsServer {
    /// Start serving `stats` on `bind_addr:port` (`None` binds 0.0.0.0).
    ///
    /// Port 0 picks a free port, see [`Self::port`].
    pub fn start(
        bind_addr: Option<IpAddr>,
        port: u16,
        stats: Arc<ConnectivityStats>,
    ) -> Result<Self, std::io::Error> {
        let addr = match bind_addr {
            Some(ip) => format!("{}:{}", ip, port),
            None => format!("0.0.0.0:{}", port),
        };

        let server = Server::http(&addr)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::AddrInUse, format!("{}", e)))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|a| a.port())
            .unwrap_or(port);

        info!("Stats server listening on http://{}/stats", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = thread::spawn(move || {
            Self::run_server(server, stats, shutdown_clone);
        });

        Ok(Self {
            handle: Some(handle),
            shutdown,
            port,
        })
    }

    /// Port the server is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    fn run_server(server: Server, stats: Arc<ConnectivityStats>, shutdown: Arc<AtomicBool>) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("Stats server shutting down");
                break;
            }

            match server.recv_timeout(Duration::from_millis(100)) {
                Ok(Some(request)) => Self::respond(request, &stats),
                Ok(None) => {}
                Err(e) => {
                    error!("Stats server error: {}", e);
                    break;
                }
            }
        }
    }

    fn respond(request: Request, stats: &ConnectivityStats) {
        if request.method() != &Method::Get {
            let mut response = Response::from_string("Method Not Allowed").with_status_code(405);
            if let Ok(allow) = Header::from_bytes(&b"Allow"[..], &b"GET"[..]) {
                response = response.with_header(allow);
            }
            if let Err(e) = request.respond(response) {
                warn!("Failed to send 405: {}", e);
            }
            return;
        }

        let path = request.url().to_string();
        let result = match path.as_str() {
            "/stats" | "/stats/" => {
                let mut response = Response::from_string(stats.to_json()).with_status_code(200);
                if let Ok(content_type) =
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                {
                    response = response.with_header(content_type);
                }
                request.respond(response)
            }
            "/" => {
                let mut response =
                    Response::from_string("See /stats for connectivity statistics")
                        .with_status_code(302);
                if let Ok(location) = Header::from_bytes(&b"Location"[..], &b"/stats"[..]) {
                    response = response.with_header(location);
                }
                request.respond(response)
            }
            _ => request.respond(Response::from_string("Not Found").with_status_code(404)),
        };
        if let Err(e) = result {
            warn!("Failed to send response: {}", e);
        }
    }

    /// Stop the server. May take up to 100ms due to the polling interval.
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
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpStream};

    fn get(port: u16, method: &str, path: &str) -> String {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        write!(
            stream,
            "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            method, path
        )
        .unwrap();
        let mut body = String::new();
        stream.read_to_string(&mut body).unwrap();
        body
    }

    #[test]
    fn test_serves_stats_and_errors() {
        let stats = Arc::new(ConnectivityStats::new());
        crate::diag::stats::bump(&stats.connections.connects);
        let server =
            StatsServer::start(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), 0, stats).unwrap();
        let port = server.port();

        let ok = get(port, "GET", "/stats");
        assert!(ok.starts_with("HTTP/1.1 200"));
        assert!(ok.contains("\"connects\":1"));

        assert!(get(port, "GET", "/").starts_with("HTTP/1.1 302"));
        assert!(get(port, "GET", "/nope").starts_with("HTTP/1.1 404"));
        assert!(get(port, "POST", "/stats").starts_with("HTTP/1.1 405"));
    }
}
