//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves a fixed set of paths, records every request it sees, and can be told
//! to block HEAD, misreport lengths, withhold or ignore ranges, or fail a
//! number of times before answering.
//! Every response closes the connection.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use vidget_engine::{RetryPolicy, TransportConfig};

/// What the server does for one path.
#[derive(Debug, Clone)]
pub struct Resource {
    body: Vec<u8>,
    content_type: &'static str,
    head_allowed: bool,
    /// `Content-Length` sent on HEAD instead of the real body length.
    head_length: Option<u64>,
    /// Send `Accept-Ranges: bytes`.
    advertise_ranges: bool,
    /// Answer `Range` requests with 206.
    support_ranges: bool,
    /// Status returned instead of the body while `failures` is non-zero.
    failure_status: u16,
    /// `None` fails forever.
    failures: Option<u32>,
}

impl Resource {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            content_type: "application/octet-stream",
            head_allowed: true,
            head_length: None,
            advertise_ranges: true,
            support_ranges: true,
            failure_status: 503,
            failures: Some(0),
        }
    }

    pub fn playlist(text: &str) -> Self {
        Self {
            content_type: "application/vnd.apple.mpegurl",
            ..Self::new(text.as_bytes().to_vec())
        }
    }

    pub fn without_ranges(mut self) -> Self {
        self.advertise_ranges = false;
        self.support_ranges = false;
        self
    }

    /// Advertise `Accept-Ranges: bytes` but answer ranged GETs with 200.
    pub fn ignoring_ranges(mut self) -> Self {
        self.advertise_ranges = true;
        self.support_ranges = false;
        self
    }

    pub fn head_length(mut self, length: u64) -> Self {
        self.head_length = Some(length);
        self
    }

    pub fn head_blocked(mut self) -> Self {
        self.head_allowed = false;
        self
    }

    pub fn always_failing(status: u16) -> Self {
        Self {
            failure_status: status,
            failures: None,
            ..Self::new(Vec::new())
        }
    }

    /// Answer the first `times` requests with 503.
    pub fn failing_times(mut self, times: u32) -> Self {
        self.failures = Some(times);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub range: Option<String>,
}

pub struct TestServer {
    base: String,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    /// Start serving `routes` on an ephemeral port. Runs until the process exits.
    pub fn start(routes: Vec<(&str, Resource)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let routes: HashMap<String, Resource> = routes
            .into_iter()
            .map(|(path, resource)| (path.to_string(), resource))
            .collect();
        let routes = Arc::new(Mutex::new(routes));
        let log = Arc::new(Mutex::new(Vec::new()));

        let server_log = Arc::clone(&log);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let routes = Arc::clone(&routes);
                let log = Arc::clone(&server_log);
                thread::spawn(move || handle(stream, &routes, &log));
            }
        });

        Self {
            base: format!("http://127.0.0.1:{port}"),
            log,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn gets(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "GET" && r.path == path)
            .collect()
    }
}

/// Transport settings that never pick up a proxy from the environment.
pub fn local_transport() -> TransportConfig {
    TransportConfig {
        use_system_proxy: false,
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(5),
        ..TransportConfig::default()
    }
}

/// Millisecond backoff without jitter.
pub fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1)).with_max_jitter(Duration::ZERO)
}

fn handle(
    mut stream: TcpStream,
    routes: &Mutex<HashMap<String, Resource>>,
    log: &Mutex<Vec<RecordedRequest>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(head) = read_head(&mut stream) else {
        return;
    };
    let request = parse_request(&head);
    log.lock().unwrap().push(request.clone());

    let resource = {
        let mut routes = routes.lock().unwrap();
        let Some(resource) = routes.get_mut(&request.path) else {
            drop(routes);
            respond(&mut stream, "404 Not Found", &[], &[]);
            return;
        };
        match resource.failures {
            None => Err(resource.failure_status),
            Some(n) if n > 0 => {
                resource.failures = Some(n - 1);
                Err(resource.failure_status)
            }
            Some(_) => Ok(resource.clone()),
        }
    };

    let resource = match resource {
        Ok(resource) => resource,
        Err(status) => {
            respond(&mut stream, &status_line(status), &[], &[]);
            return;
        }
    };

    let total = resource.body.len() as u64;
    let mut headers = vec![("Content-Type".to_string(), resource.content_type.to_string())];
    if resource.advertise_ranges {
        headers.push(("Accept-Ranges".to_string(), "bytes".to_string()));
    }

    if request.method == "HEAD" {
        if !resource.head_allowed {
            respond(&mut stream, "405 Method Not Allowed", &[], &[]);
            return;
        }
        let length = resource.head_length.unwrap_or(total);
        headers.push(("Content-Length".to_string(), length.to_string()));
        respond_head(&mut stream, "200 OK", &headers);
        return;
    }

    let range = request
        .range
        .as_deref()
        .and_then(parse_range)
        .filter(|_| resource.support_ranges);
    match range {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start >= total || start > end_incl {
                headers.push(("Content-Range".to_string(), format!("bytes */{total}")));
                respond(&mut stream, "416 Range Not Satisfiable", &headers, &[]);
                return;
            }
            let slice = &resource.body[start as usize..=end_incl as usize];
            headers.push((
                "Content-Range".to_string(),
                format!("bytes {start}-{end_incl}/{total}"),
            ));
            respond(&mut stream, "206 Partial Content", &headers, slice);
        }
        None => respond(&mut stream, "200 OK", &headers, &resource.body),
    }
}

fn status_line(status: u16) -> String {
    let reason = match status {
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Error",
    };
    format!("{status} {reason}")
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while !data.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return None,
            Ok(n) => data.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8(data).ok()
}

fn parse_request(head: &str) -> RecordedRequest {
    let mut lines = head.lines();
    let mut first = lines.next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("").to_ascii_uppercase();
    let target = first.next().unwrap_or("/");
    let path = target.split('?').next().unwrap_or("/").to_string();
    let mut range = None;
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("range")
        {
            range = Some(value.trim().to_string());
        }
    }
    RecordedRequest {
        method,
        path,
        range,
    }
}

/// `bytes=X-` or `bytes=X-Y` as (start, end inclusive).
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let spec = value.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = match end.trim() {
        "" => u64::MAX,
        end => end.parse().ok()?,
    };
    Some((start, end))
}

fn respond(stream: &mut TcpStream, status: &str, headers: &[(String, String)], body: &[u8]) {
    let mut response = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\n", body.len());
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("Connection: close\r\n\r\n");
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}

fn respond_head(stream: &mut TcpStream, status: &str, headers: &[(String, String)]) {
    let mut response = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("Connection: close\r\n\r\n");
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
