//! The recommended stack in one call.

use serde::Deserialize;

use super::{Cors, ErrorHandling, Gzip, Logging, RequestId, RequestTiming, SecurityHeaders};
use crate::router::Router;

/// Configuration for [`Router::with_essentials`].
///
/// Every field has a default, so a config file only needs the ones it
/// changes:
///
/// ```rust
/// use guardrail::middleware::Essentials;
///
/// let config: Essentials = serde_json::from_str(r#"{
///     "cors_origins": ["https://app.example.com"],
///     "logger_name": "billing"
/// }"#).unwrap();
/// assert!(config.enable_gzip);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Essentials {
    pub cors_origins: Vec<String>,
    /// Adds the fault's traceback to 500 bodies. Development only.
    pub include_traceback: bool,
    pub logger_name: String,
    pub skip_paths: Vec<String>,
    pub enable_gzip: bool,
    pub gzip_minimum_size: usize,
}

impl Default for Essentials {
    fn default() -> Self {
        Self {
            cors_origins: vec!["*".to_owned()],
            include_traceback: false,
            logger_name: "guardrail".to_owned(),
            skip_paths: vec!["/health".to_owned(), "/metrics".to_owned()],
            enable_gzip: true,
            gzip_minimum_size: 1000,
        }
    }
}

impl Essentials {
    /// Wraps `router` so that, outermost first, the layers are: error
    /// handling, CORS, security headers, request id, timing, logging, gzip.
    pub(crate) fn apply(self, router: Router) -> Router {
        let router = if self.enable_gzip {
            router.layer(Gzip::new().minimum_size(self.gzip_minimum_size))
        } else {
            router
        };

        router
            .layer(Logging::new().logger_name(self.logger_name).skip_paths(self.skip_paths))
            .layer(RequestTiming::new())
            .layer(RequestId::new())
            .layer(SecurityHeaders::new())
            .layer(Cors::new().allow_origins(self.cors_origins))
            .layer(ErrorHandling::new().include_traceback(self.include_traceback))
    }
}
