//! Request logging and CORS for the MindEase API.

use actix_cors::Cors;
use actix_web::middleware::Logger;

/// Access log line per request:
/// remote-ip "request-line" status-code response-size "referrer" "user-agent"
pub fn standard_middleware() -> Logger {
    Logger::default()
}

pub fn cors_policy() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "PATCH", "DELETE"])
        .allow_any_header()
        .max_age(3600)
}
