//! Response compression.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue, VARY};
use tracing::warn;

use super::{Middleware, Next};
use crate::handler::{BoxFuture, Outcome};
use crate::request::Request;
use crate::response::Response;

/// Gzips response bodies of at least `minimum_size` bytes (default 1000)
/// for clients that send `Accept-Encoding: gzip`.
///
/// Left alone: bodies below the threshold, responses that already carry a
/// `Content-Encoding`, and `text/event-stream`. Compressed responses get
/// `Content-Encoding: gzip` and `Vary: Accept-Encoding`.
pub struct Gzip {
    minimum_size: usize,
    level: u32,
}

impl Gzip {
    pub fn new() -> Self {
        Self { minimum_size: 1000, level: 9 }
    }

    pub fn minimum_size(mut self, bytes: usize) -> Self {
        self.minimum_size = bytes;
        self
    }

    /// Compression level, 0 (none) to 9 (best). Values above 9 are clamped.
    pub fn level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    fn eligible(&self, response: &Response) -> bool {
        if response.body().len() < self.minimum_size || response.headers().contains_key(CONTENT_ENCODING) {
            return false;
        }
        let content_type = response.headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        !content_type.starts_with("text/event-stream")
    }

    fn compress(&self, body: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::new(self.level));
        encoder.write_all(body)?;
        encoder.finish()
    }
}

impl Default for Gzip {
    fn default() -> Self { Self::new() }
}

impl Middleware for Gzip {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let accepts_gzip = req.headers()
                .get_all(ACCEPT_ENCODING)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .any(accepts_gzip);

            let mut response = next.run(req).await?;
            if !accepts_gzip || !self.eligible(&response) {
                return Ok(response);
            }

            match self.compress(response.body()) {
                Ok(compressed) => {
                    response.set_body(compressed);
                    let headers = response.headers_mut();
                    headers.remove(CONTENT_LENGTH);
                    headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                    headers.append(VARY, HeaderValue::from_static("Accept-Encoding"));
                }
                Err(e) => warn!("gzip failed, sending uncompressed: {e}"),
            }
            Ok(response)
        })
    }
}

/// `true` when an `Accept-Encoding` value lists `gzip` without `q=0`.
fn accepts_gzip(header: &str) -> bool {
    header.split(',').any(|coding| {
        let mut parts = coding.split(';').map(str::trim);
        let name = parts.next().unwrap_or("");
        let refused = parts.any(|p| {
            p.strip_prefix("q=")
                .and_then(|q| q.parse::<f32>().ok())
                .is_some_and(|q| q == 0.0)
        });
        name.eq_ignore_ascii_case("gzip") && !refused
    })
}
