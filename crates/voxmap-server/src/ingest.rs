//! HTTP endpoint that accepts raw chunk uploads from the world exporter.

use crate::server::ServerState;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use tiny_http::{Method, Request, Response, Server, StatusCode};
use tokio::runtime::Handle;
use voxmap_common::types::{ChunkCoordinate, ChunkRaw, Result, CHUNK_DATA_SIZE};
use voxmap_common::VoxmapError;
use voxmap_logger::log::log;
use voxmap_logger::severity::LogSeverity::{Debug, Warning};

pub const UPLOAD_PATH: &str = "/api/set-chunk";

/// Splits a request target into path and query string.
pub fn split_url(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn parse_coordinate(query: &str, name: &str) -> Result<i32> {
    let value = query_param(query, name)
        .ok_or_else(|| VoxmapError::InvalidCoordinates(format!("missing {}", name)))?;
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| VoxmapError::InvalidCoordinates(format!("{}={}", name, value)))
}

/// Validates an upload's coordinates and then its method, in that order.
pub fn check_upload_request(method: &Method, query: &str) -> Result<ChunkCoordinate> {
    let x = parse_coordinate(query, "x")?;
    let z = parse_coordinate(query, "z")?;

    if *method != Method::Post {
        return Err(VoxmapError::InvalidMethod(method.to_string()));
    }
    Ok(ChunkCoordinate::new(x, z))
}

/// Status code and body text for a rejected upload
pub fn status_for(err: &VoxmapError) -> (u16, &'static str) {
    match err {
        VoxmapError::InvalidCoordinates(_) => (400, "Invalid chunk coordinates"),
        VoxmapError::InvalidMethod(_) => (405, "Invalid request method"),
        VoxmapError::ChunkSizeMismatch { .. } => (400, "Invalid chunk data"),
        _ => (500, "Internal server error"),
    }
}

/// Reads at most one byte past a full chunk, so oversized bodies are rejected
/// without buffering them.
fn read_chunk_body(request: &mut Request) -> Result<ChunkRaw> {
    let mut body = Vec::with_capacity(CHUNK_DATA_SIZE);
    request
        .as_reader()
        .take(CHUNK_DATA_SIZE as u64 + 1)
        .read_to_end(&mut body)?;
    ChunkRaw::new(body)
}

pub struct IngestServer {
    server: Server,
}

impl IngestServer {
    pub fn bind(address: &str) -> Result<Self> {
        let server = Server::http(address).map_err(|e| {
            VoxmapError::ServerError(format!("Failed to bind upload endpoint {}: {}", address, e))
        })?;
        Ok(Self { server })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serves requests one at a time on the calling thread until `unblock` is
    /// called. Must not be called from inside the async runtime.
    pub fn serve(&self, state: &Arc<ServerState>, runtime: &Handle) -> Result<()> {
        for request in self.server.incoming_requests() {
            if let Err(e) = Self::handle_request(request, state, runtime) {
                log(format!("Upload endpoint error: {}", e), Warning);
            }
        }
        Ok(())
    }

    pub fn unblock(&self) {
        self.server.unblock();
    }

    fn handle_request(
        mut request: Request,
        state: &Arc<ServerState>,
        runtime: &Handle,
    ) -> Result<()> {
        let (path, query) = split_url(request.url());
        if path != UPLOAD_PATH {
            let response = Response::from_string("Not Found").with_status_code(404);
            request.respond(response)?;
            return Ok(());
        }

        let outcome = check_upload_request(request.method(), query)
            .and_then(|coord| Ok((coord, read_chunk_body(&mut request)?)));

        let response = match outcome {
            Ok((coord, blocks)) => {
                let report = runtime.block_on(state.publish_chunk(coord, blocks));
                log(
                    format!(
                        "Received chunk {}, {} chunks stored, {} clients updated",
                        coord,
                        report.retained,
                        report.broadcast.delivered()
                    ),
                    Debug,
                );
                Response::from_string("").with_status_code(StatusCode(200))
            }
            Err(err) => {
                let (code, text) = status_for(&err);
                log(format!("Rejected chunk upload: {}", err), Debug);
                Response::from_string(text).with_status_code(StatusCode(code))
            }
        };

        request.respond(response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_split_url() {
        assert_eq!(split_url("/api/set-chunk?x=1&z=2"), ("/api/set-chunk", "x=1&z=2"));
        assert_eq!(split_url("/index.html"), ("/index.html", ""));
    }

    #[test]
    fn test_coordinates_checked_before_method() {
        assert_matches!(
            check_upload_request(&Method::Get, "x=abc&z=1"),
            Err(VoxmapError::InvalidCoordinates(_))
        );
        assert_matches!(
            check_upload_request(&Method::Post, "z=1"),
            Err(VoxmapError::InvalidCoordinates(_))
        );
        assert_matches!(
            check_upload_request(&Method::Get, "x=1&z=1"),
            Err(VoxmapError::InvalidMethod(_))
        );
    }

    #[test]
    fn test_valid_upload_request() {
        let coord = check_upload_request(&Method::Post, "z=-7&x=12").unwrap();
        assert_eq!(coord, ChunkCoordinate::new(12, -7));
    }

    #[test]
    fn test_non_integer_coordinates() {
        assert!(check_upload_request(&Method::Post, "x=1.5&z=0").is_err());
        assert!(check_upload_request(&Method::Post, "x=&z=0").is_err());
        assert!(check_upload_request(&Method::Post, "x=99999999999&z=0").is_err());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(status_for(&VoxmapError::InvalidCoordinates("x".into())).0, 400);
        assert_eq!(status_for(&VoxmapError::InvalidMethod("GET".into())).0, 405);
        assert_eq!(
            status_for(&VoxmapError::ChunkSizeMismatch {
                expected: CHUNK_DATA_SIZE,
                actual: 3
            }),
            (400, "Invalid chunk data")
        );
        assert_eq!(status_for(&VoxmapError::QueueFull).0, 500);
    }
}
