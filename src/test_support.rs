//! Test fixtures
//!
//! A tiny HTTP responder with canned routes, archive builders and fake
//! server executables shared by the unit tests.

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// One canned HTTP response
#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Value of `Content-Length`; `None` omits the header
    pub content_length: Option<usize>,
}

impl Route {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: vec![],
            content_length: Some(body.len()),
            body,
        }
    }

    pub fn json(body: &str) -> Self {
        let mut route = Self::ok(body.as_bytes().to_vec());
        route.headers.push(("Content-Type".into(), "application/json".into()));
        route
    }

    /// Declares `declared` bytes but sends only `body` before closing
    pub fn truncated(body: Vec<u8>, declared: usize) -> Self {
        Self {
            status: 200,
            headers: vec![],
            body,
            content_length: Some(declared),
        }
    }

    /// Body delimited by connection close
    pub fn without_length(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: vec![],
            body,
            content_length: None,
        }
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self {
            status,
            headers: vec![("Location".into(), location.into())],
            body: vec![],
            content_length: Some(0),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: vec![],
            body: vec![],
            content_length: Some(0),
        }
    }
}

/// In-process HTTP/1.1 server answering from a route table
pub struct TestServer {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, Route>>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<Mutex<HashMap<String, Route>>> = Arc::default();

        let table = routes.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let table = table.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let head = String::from_utf8_lossy(&request);
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let route = table.lock().get(&path).cloned().unwrap_or_else(|| Route::status(404));

                    let mut response = format!("HTTP/1.1 {} {}\r\n", route.status, reason(route.status));
                    if let Some(len) = route.content_length {
                        response.push_str(&format!("Content-Length: {}\r\n", len));
                    }
                    for (name, value) in &route.headers {
                        response.push_str(&format!("{}: {}\r\n", name, value));
                    }
                    response.push_str("Connection: close\r\n\r\n");

                    if socket.write_all(response.as_bytes()).await.is_err() {
                        return;
                    }
                    let _ = socket.write_all(&route.body).await;
                    let _ = socket.flush().await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, routes }
    }

    pub fn route(&self, path: &str, route: Route) {
        self.routes.lock().insert(path.to_string(), route);
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Zip archive holding the given `(path, contents)` entries
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    zip_with_links(&[], entries)
}

/// Gzipped tar archive holding the given `(path, contents)` entries
pub fn tar_gz_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    tar_gz_with_links(&[], entries)
}

/// Zip archive with `(link, target)` symlinks written ahead of the files
pub fn zip_with_links(links: &[(&str, &str)], files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default().unix_permissions(0o755);
    for (link, target) in links {
        writer.add_symlink(*link, *target, options).unwrap();
    }
    for (name, contents) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Gzipped tar with `(link, target)` symlinks written ahead of the files
pub fn tar_gz_with_links(links: &[(&str, &str)], files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (link, target) in links {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, *link, *target).unwrap();
    }
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        builder.append_data(&mut header, *name, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Deterministic filler bytes
pub fn noise(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 7919) % 251) as u8).collect()
}

/// Sorted file names directly inside `dir`
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Write an executable shell script standing in for `llama-server`
#[cfg(unix)]
pub fn write_fake_server(binaries_dir: &Path, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(binaries_dir).unwrap();
    let path = crate::setup::paths::server_executable(binaries_dir);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
